//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Auth-Tag stimmt nicht (falscher Schluessel oder manipulierte Daten)
    #[error("Entschluesselung fehlgeschlagen: Auth-Tag ungueltig")]
    Authentifizierung,

    #[error("Ungueltige Nonce-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeNonce { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Cipher-Suite '{0}' ist unsicher und nicht freigegeben")]
    UnsichereSuiteNichtErlaubt(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige_schluessellaenge() {
        let e = CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: 31,
        };
        assert_eq!(
            e.to_string(),
            "Ungueltige Schluessel-Laenge: erwartet 32, erhalten 31"
        );
    }
}
