//! Gemeinsame Identifikationstypen fuer Fluesterpost
//!
//! Peer-IDs kommen vom Chat-Server (Benutzer-IDs) und werden unveraendert
//! in URLs und Cache-Schluesseln verwendet. Das Newtype-Pattern verhindert
//! Verwechslungen mit Nachrichten-IDs oder Inhalten.

use serde::{Deserialize, Serialize};

/// Eindeutige Peer-ID (Benutzer-ID des Gegenuebers auf dem Server)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Erstellt eine PeerId aus der Server-Benutzer-ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt die rohe ID zurueck (fuer URLs und Speicher-Schluessel)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leere IDs sind nie gueltig
    pub fn ist_gueltig(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for PeerId {
    fn from(id: u64) -> Self {
        Self::new(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display() {
        let id = PeerId::new("42");
        assert_eq!(id.to_string(), "peer:42");
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn peer_id_aus_zahl() {
        assert_eq!(PeerId::from(7u64), PeerId::new("7"));
    }

    #[test]
    fn leere_peer_id_ungueltig() {
        assert!(!PeerId::new("  ").ist_gueltig());
        assert!(PeerId::new("alice").ist_gueltig());
    }

    #[test]
    fn peer_id_ist_transparent_serialisiert() {
        let id = PeerId::new("1337");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1337\"");
        let id2: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}
