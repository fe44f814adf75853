//! Transport-Schnittstelle zum Chat-Server
//!
//! Logischer Vertrag (siehe `HttpTransport` fuer die konkreten Pfade):
//! - `POST store_public_key {public_key}` -> `{success}`
//! - `GET users/{id}/public_key` -> `{public_key}`
//! - `POST direct_messages {recipient_id, content, ...}` -> `{success, message_id, created_at}`
//!
//! Der Kern spricht den Server nur ueber `TransportClient` an. Die
//! Offline-Schicht ist selbst ein `TransportClient`, der einen anderen
//! umhuellt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fluesterpost_core::PeerId;
use fluesterpost_crypto::PublicKey;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Fehler an der Transport-Grenze
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Netzwerk nicht erreichbar: {0}")]
    Netzwerk(String),

    #[error("Zeitlimit ueberschritten")]
    Zeitlimit,

    #[error("Server antwortete mit Status {status}: {nachricht}")]
    Server { status: u16, nachricht: String },

    #[error("Antwort nicht dekodierbar: {0}")]
    Dekodierung(String),

    /// Offline-Warteschlange konnte nicht geschrieben werden
    #[error("Offline-Warteschlange nicht beschreibbar: {0}")]
    Warteschlange(String),
}

impl TransportError {
    /// Ob die Offline-Schicht diesen Fehler abfangen darf
    ///
    /// Netzwerkfehler, Zeitlimits und jeder Status >= 400 werden absorbiert.
    /// Dekodierfehler deuten auf einen inkompatiblen Server und werden
    /// weitergereicht.
    pub fn ist_absorbierbar(&self) -> bool {
        match self {
            Self::Netzwerk(_) | Self::Zeitlimit => true,
            Self::Server { status, .. } => *status >= 400,
            Self::Dekodierung(_) | Self::Warteschlange(_) => false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Ausgehende Direktnachricht (Nutzlast fuer `direct_messages`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: PeerId,
    /// Envelope-JSON, oder Klartext wenn `encrypted == false`
    pub content: String,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn neu(recipient_id: PeerId, content: String, encrypted: bool) -> Self {
        Self {
            recipient_id,
            content,
            encrypted,
            created_at: Utc::now(),
        }
    }
}

/// Antwort auf `store_public_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeroeffentlichungsAntwort {
    pub success: bool,
    /// Gesetzt, wenn die Offline-Schicht die Antwort erzeugt hat
    #[serde(default)]
    pub offline: bool,
}

/// Antwort auf `users/{id}/public_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerKeyAntwort {
    /// Base64; `None` wenn der Peer keinen Schluessel hinterlegt hat
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub offline: bool,
}

/// Antwort auf `direct_messages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendeAntwort {
    pub success: bool,
    #[serde(default, deserialize_with = "id_als_string")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub offline: bool,
}

/// Server-IDs kommen als Zahl oder als String
fn id_als_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let wert = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match wert {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Abstrakte Verbindung zum Chat-Server
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Eigenen Public Key hinterlegen
    async fn public_key_hochladen(&self, key: &PublicKey) -> TransportResult<VeroeffentlichungsAntwort>;

    /// Public Key eines Peers abrufen
    async fn peer_key_abrufen(&self, peer: &PeerId) -> TransportResult<PeerKeyAntwort>;

    /// Direktnachricht zustellen
    async fn nachricht_senden(&self, nachricht: &OutboundMessage) -> TransportResult<SendeAntwort>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorbierbare_fehler() {
        assert!(TransportError::Netzwerk("dns".into()).ist_absorbierbar());
        assert!(TransportError::Zeitlimit.ist_absorbierbar());
        assert!(TransportError::Server {
            status: 404,
            nachricht: String::new()
        }
        .ist_absorbierbar());
        assert!(TransportError::Server {
            status: 503,
            nachricht: String::new()
        }
        .ist_absorbierbar());
        assert!(!TransportError::Server {
            status: 302,
            nachricht: String::new()
        }
        .ist_absorbierbar());
        assert!(!TransportError::Dekodierung("x".into()).ist_absorbierbar());
    }

    #[test]
    fn sende_antwort_akzeptiert_numerische_id() {
        let antwort: SendeAntwort =
            serde_json::from_str(r#"{"success":true,"message_id":812,"created_at":"2024-05-01T10:00:00"}"#)
                .unwrap();
        assert_eq!(antwort.message_id.as_deref(), Some("812"));
        assert!(!antwort.offline);
    }

    #[test]
    fn sende_antwort_ohne_optionale_felder() {
        let antwort: SendeAntwort = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(antwort.message_id, None);
        assert_eq!(antwort.created_at, None);
    }

    #[test]
    fn outbound_message_json_form() {
        let msg = OutboundMessage::neu(PeerId::new("9"), "hallo".into(), false);
        let wert = serde_json::to_value(&msg).unwrap();
        assert_eq!(wert["recipient_id"], "9");
        assert_eq!(wert["encrypted"], false);
    }
}
