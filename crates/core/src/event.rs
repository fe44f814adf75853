//! Ereignisse des E2EE-Kerns
//!
//! Der Kern meldet asynchrone Ergebnisse (nachgeholte Entschluesselungen,
//! Verbindungswechsel, Sync-Abschluesse) ueber einen tokio-Broadcast-Kanal.
//! Die UI-Schicht abonniert diese Ereignisse, statt den Kern zu pollen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PeerId;

/// Alle Ereignisse, die der E2EE-Kern an seine Abonnenten verteilt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KernEvent {
    /// Eine zurueckgestellte Nachricht konnte nachtraeglich entschluesselt werden
    NachrichtEntschluesselt {
        sender: PeerId,
        klartext: String,
        empfangen_am: DateTime<Utc>,
    },
    /// Die Verbindung zum Server ist wieder verfuegbar
    Online,
    /// Die Verbindung zum Server ist verloren
    Offline,
    /// Ein Sync-Durchlauf wurde abgeschlossen
    SyncAbgeschlossen { zugestellt: usize, verbleibend: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = KernEvent::NachrichtEntschluesselt {
            sender: PeerId::new("7"),
            klartext: "Hallo".into(),
            empfangen_am: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: KernEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            decoded,
            KernEvent::NachrichtEntschluesselt { ref klartext, .. } if klartext == "Hallo"
        ));
    }
}
