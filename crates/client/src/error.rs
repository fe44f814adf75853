//! Fehlertypen fuer den E2EE-Client

use fluesterpost_core::PeerId;
use thiserror::Error;

use crate::transport::TransportError;

/// Client-Fehlertypen
#[derive(Debug, Error)]
pub enum ClientError {
    /// RNG- oder Speicherfehler beim Anlegen des eigenen Schluessel-Paars (fatal)
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    /// Peer-Key nicht erreichbar; die Operation wird zurueckgestellt
    #[error("Public Key von {peer} nicht abrufbar: {grund}")]
    SchluesselAbruf { peer: PeerId, grund: String },

    /// Peer-Key hat falsches Format oder falsche Laenge; kein automatischer Retry
    #[error("Public Key von {peer} ungueltig: {grund}")]
    SchluesselFormat { peer: PeerId, grund: String },

    #[error("Keine Session mit {peer}: {grund}")]
    Session { peer: PeerId, grund: String },

    /// Auth-Tag ungueltig; die Nachricht wurde zurueckgestellt
    #[error("Nachricht von {peer} nicht authentisch oder noch nicht entschluesselbar")]
    Authentifizierung { peer: PeerId },

    #[error("Public Key konnte nicht veroeffentlicht werden: {0}")]
    Veroeffentlichung(String),

    #[error("Transport-Fehler: {0}")]
    Transport(#[from] TransportError),

    #[error("E2EE-Kontext ist nicht initialisiert")]
    NichtInitialisiert,

    /// Verschluesselung fehlgeschlagen und keine Freigabe fuer Klartext
    #[error("Klartext-Versand an {peer} verweigert: {grund}")]
    KlartextVerweigert { peer: PeerId, grund: String },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Speicher-Fehler: {0}")]
    Speicher(String),

    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] fluesterpost_crypto::CryptoError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Fehler, nach denen ein spaeterer Versuch sinnvoll ist
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(
            self,
            Self::SchluesselAbruf { .. }
                | Self::Session { .. }
                | Self::Authentifizierung { .. }
                | Self::Transport(_)
        )
    }
}
