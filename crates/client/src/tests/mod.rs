pub(crate) mod hilfen;
