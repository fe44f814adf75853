//! Dauerhafte Warteschlange fuer offline gesendete Nachrichten
//!
//! Gespeichert als JSON-Liste unter `fp.offline_messages`. Jede Aenderung
//! wird sofort gesichert. Eintraege werden erst entfernt, nachdem der Server
//! sie bestaetigt hat (at-least-once).
//!
//! Ablauf eines Sync-Durchlaufs:
//! 1. `schnappschuss()` liefert alle noch nicht bestaetigten Eintraege
//! 2. `bestaetigen(id)` markiert einen zugestellten Eintrag als `synced`
//! 3. `bereinigen()` entfernt alle `synced`-Eintraege
//!
//! Eintraege, die waehrend des Durchlaufs hinzukommen, bleiben unberuehrt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ClientResult;
use crate::storage::KeyValueStore;
use crate::transport::OutboundMessage;

pub(crate) const QUEUE_SCHLUESSEL: &str = "fp.offline_messages";

/// Ein Eintrag der Offline-Warteschlange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEintrag {
    pub id: Uuid,
    pub nachricht: OutboundMessage,
    pub eingereiht_am: DateTime<Utc>,
    pub synced: bool,
}

pub struct OutboundQueue {
    eintraege: Mutex<Vec<QueueEintrag>>,
    store: Arc<dyn KeyValueStore>,
}

impl OutboundQueue {
    /// Laedt die gesicherte Warteschlange
    ///
    /// Unlesbare Daten werden geloggt und beim naechsten Schreiben
    /// ueberschrieben.
    pub async fn laden(store: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        let eintraege = match store.get(QUEUE_SCHLUESSEL).await? {
            Some(json) => match serde_json::from_str::<Vec<QueueEintrag>>(&json) {
                Ok(liste) => liste,
                Err(e) => {
                    tracing::error!(fehler = %e, "Offline-Warteschlange unlesbar, beginne leer");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if !eintraege.is_empty() {
            tracing::info!(eintraege = eintraege.len(), "Offline-Warteschlange geladen");
        }
        Ok(Self {
            eintraege: Mutex::new(eintraege),
            store,
        })
    }

    async fn sichern(&self, eintraege: &[QueueEintrag]) -> ClientResult<()> {
        let json = serde_json::to_string(eintraege)?;
        self.store.set(QUEUE_SCHLUESSEL, &json).await
    }

    /// Haengt eine Nachricht an und sichert die Warteschlange
    ///
    /// Schlaegt das Sichern fehl, bleibt die Warteschlange unveraendert.
    pub async fn einreihen(&self, nachricht: OutboundMessage) -> ClientResult<QueueEintrag> {
        let eintrag = QueueEintrag {
            id: Uuid::new_v4(),
            nachricht,
            eingereiht_am: Utc::now(),
            synced: false,
        };

        let mut eintraege = self.eintraege.lock().await;
        eintraege.push(eintrag.clone());
        if let Err(e) = self.sichern(&eintraege).await {
            eintraege.pop();
            return Err(e);
        }
        tracing::debug!(
            id = %eintrag.id,
            peer = %eintrag.nachricht.recipient_id,
            laenge = eintraege.len(),
            "Nachricht eingereiht"
        );
        Ok(eintrag)
    }

    /// Alle noch nicht bestaetigten Eintraege in Einreihungs-Reihenfolge
    pub async fn schnappschuss(&self) -> Vec<QueueEintrag> {
        self.eintraege
            .lock()
            .await
            .iter()
            .filter(|e| !e.synced)
            .cloned()
            .collect()
    }

    /// Markiert einen Eintrag als vom Server bestaetigt
    pub async fn bestaetigen(&self, id: Uuid) -> ClientResult<bool> {
        let mut eintraege = self.eintraege.lock().await;
        let Some(eintrag) = eintraege.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        eintrag.synced = true;
        self.sichern(&eintraege).await?;
        Ok(true)
    }

    /// Entfernt alle bestaetigten Eintraege, liefert deren Anzahl
    pub async fn bereinigen(&self) -> ClientResult<usize> {
        let mut eintraege = self.eintraege.lock().await;
        let vorher = eintraege.len();
        eintraege.retain(|e| !e.synced);
        let entfernt = vorher - eintraege.len();
        if entfernt > 0 {
            self.sichern(&eintraege).await?;
        }
        Ok(entfernt)
    }

    pub async fn len(&self) -> usize {
        self.eintraege.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.eintraege.lock().await.is_empty()
    }

    /// Kopie aller Eintraege inkl. bestaetigter
    pub async fn eintraege(&self) -> Vec<QueueEintrag> {
        self.eintraege.lock().await.clone()
    }
}
