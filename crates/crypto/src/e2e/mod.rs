//! E2E Verschluesselung (End-to-End) fuer Direktnachrichten
//!
//! Client <-> Client Verschluesselung. Der Server speichert und leitet
//! nur Ciphertexte weiter.
//!
//! ## Ablauf
//! 1. Jeder Client hat ein X25519 Langzeit-Schluessel-Paar
//! 2. Der oeffentliche Schluessel wird auf dem Server hinterlegt
//! 3. Session-Key pro Peer: X25519(eigener Secret, Peer-Public) -> HKDF-SHA256
//! 4. Nachrichten werden mit XChaCha20-Poly1305 und frischer 24-Byte-Nonce verschluesselt

pub mod decrypt;
pub mod encrypt;
pub mod key_agreement;

pub use decrypt::open_xchacha;
pub use encrypt::seal_xchacha;
pub use key_agreement::{
    derive_session_key, generate_static_keypair, hkdf_derive, keypair_pruefen,
};
