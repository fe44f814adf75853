//! Veroeffentlichung des eigenen Public Keys
//!
//! Best effort: scheitert der Upload nach allen Versuchen, wird nur der
//! Status `NichtHochgeladen` gespeichert. Ver- und Entschluesselung mit dem
//! lokalen Paar funktionieren unabhaengig davon weiter; der naechste
//! `public_keys_synchronisieren` holt den Upload nach.

use std::sync::Arc;

use fluesterpost_crypto::PublicKey;
use fluesterpost_observability::FluesterpostMetrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;
use crate::storage::KeyValueStore;
use crate::transport::TransportClient;

pub(crate) const STATUS_SCHLUESSEL: &str = "fp.public_key_uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VeroeffentlichungsStatus {
    Hochgeladen,
    NichtHochgeladen,
}

pub struct PublicationService {
    transport: Arc<dyn TransportClient>,
    policy: RetryPolicy,
    store: Arc<dyn KeyValueStore>,
    status: RwLock<VeroeffentlichungsStatus>,
    metrics: Arc<FluesterpostMetrics>,
}

impl PublicationService {
    /// Erstellt den Dienst und liest den zuletzt gespeicherten Status
    pub async fn neu(
        transport: Arc<dyn TransportClient>,
        policy: RetryPolicy,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<FluesterpostMetrics>,
    ) -> Self {
        let status = match store.get(STATUS_SCHLUESSEL).await {
            Ok(Some(wert)) => serde_json::from_str(&wert)
                .unwrap_or(VeroeffentlichungsStatus::NichtHochgeladen),
            _ => VeroeffentlichungsStatus::NichtHochgeladen,
        };
        Self {
            transport,
            policy,
            store,
            status: RwLock::new(status),
            metrics,
        }
    }

    pub fn status(&self) -> VeroeffentlichungsStatus {
        *self.status.read()
    }

    async fn status_setzen(&self, status: VeroeffentlichungsStatus) {
        *self.status.write() = status;
        let ergebnis = match serde_json::to_string(&status) {
            Ok(json) => self.store.set(STATUS_SCHLUESSEL, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = ergebnis {
            tracing::warn!(fehler = %e, "Veroeffentlichungs-Status nicht gespeichert");
        }
    }

    /// Laedt den Key mit Wiederholung hoch; wirft nie
    pub async fn veroeffentlichen(&self, key: &PublicKey) -> VeroeffentlichungsStatus {
        match self
            .veroeffentlichen_ueber(self.transport.as_ref(), key, &self.policy)
            .await
        {
            Ok(()) => VeroeffentlichungsStatus::Hochgeladen,
            Err(e) => {
                tracing::warn!(
                    fehler = %e,
                    "Public Key nicht veroeffentlicht, lokale Nutzung geht weiter"
                );
                VeroeffentlichungsStatus::NichtHochgeladen
            }
        }
    }

    /// Upload ueber einen bestimmten Transport mit einer bestimmten Strategie
    ///
    /// Eine Antwort der Offline-Schicht zaehlt als nicht hochgeladen und wird
    /// nicht wiederholt.
    pub async fn veroeffentlichen_ueber(
        &self,
        transport: &dyn TransportClient,
        key: &PublicKey,
        policy: &RetryPolicy,
    ) -> ClientResult<()> {
        let ergebnis = policy
            .ausfuehren_wenn(
                "public_key_hochladen",
                |v: &Versuch| matches!(v, Versuch::Wiederholen(_)),
                move |versuch| async move {
                    let antwort = transport
                        .public_key_hochladen(key)
                        .await
                        .map_err(|e| Versuch::Wiederholen(e.to_string()))?;
                    if antwort.offline {
                        return Err(Versuch::Abbrechen("offline".to_string()));
                    }
                    if !antwort.success {
                        return Err(Versuch::Wiederholen(format!(
                            "Server lehnte Upload ab (Versuch {versuch})"
                        )));
                    }
                    Ok(())
                },
            )
            .await;

        match ergebnis {
            Ok(()) => {
                self.status_setzen(VeroeffentlichungsStatus::Hochgeladen).await;
                tracing::info!(public_key = ?key, "Public Key veroeffentlicht");
                Ok(())
            }
            Err(Versuch::Abbrechen(grund)) => {
                self.status_setzen(VeroeffentlichungsStatus::NichtHochgeladen)
                    .await;
                Err(ClientError::Veroeffentlichung(grund))
            }
            Err(Versuch::Wiederholen(grund)) => {
                self.metrics.veroeffentlichung_fehlgeschlagen.inc();
                self.status_setzen(VeroeffentlichungsStatus::NichtHochgeladen)
                    .await;
                Err(ClientError::Veroeffentlichung(grund))
            }
        }
    }
}

/// Ausgang eines einzelnen Upload-Versuchs
enum Versuch {
    Wiederholen(String),
    Abbrechen(String),
}

impl std::fmt::Display for Versuch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wiederholen(grund) | Self::Abbrechen(grund) => f.write_str(grund),
        }
    }
}
