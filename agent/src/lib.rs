//! fluesterpost-agent – Bibliotheks-Root
//!
//! Der Agent haelt einen `E2eeKontext` am Leben und treibt die Arbeit an,
//! die der Kern nicht selbst plant: periodischer Sync der Offline-
//! Warteschlange und erneute Versuche fuer zurueckgestellte Nachrichten.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use fluesterpost_client::{ClientConfig, E2eeKontext, SyncErgebnis};
use fluesterpost_core::KernEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Interval, MissedTickBehavior};

/// Haelt den laufenden Agent-Zustand zusammen
pub struct Agent {
    pub config: ClientConfig,
    kontext: Arc<E2eeKontext>,
}

impl Agent {
    /// Baut den Kontext aus der Konfiguration (HTTP-Transport, DiskStore)
    pub async fn neu(config: ClientConfig) -> Result<Self> {
        let kontext = E2eeKontext::aus_konfiguration(&config).await?;
        Ok(Self::mit_kontext(config, Arc::new(kontext)))
    }

    pub fn mit_kontext(config: ClientConfig, kontext: Arc<E2eeKontext>) -> Self {
        Self { config, kontext }
    }

    pub fn kontext(&self) -> &Arc<E2eeKontext> {
        &self.kontext
    }

    /// Initialisiert den Kern und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Schluessel-Paar laden oder erzeugen, Public Key veroeffentlichen
    /// 2. Einmal synchronisieren (Reste aus der letzten Sitzung)
    /// 3. Periodischer Sync und Nachentschluesselung
    /// 4. Auf Ctrl-C warten
    pub async fn starten(self) -> Result<()> {
        if !self.kontext.initialisierung_sicherstellen().await {
            bail!("E2EE-Kern konnte nicht initialisiert werden");
        }
        tracing::info!(
            server = %self.config.server.basis_url,
            suite = ?self.config.krypto.suite,
            vertraulich = self.kontext.ist_vertraulich(),
            "Agent gestartet"
        );

        sync_protokollieren(&self.kontext.synchronisieren().await);

        let ereignisse = tokio::spawn(ereignisse_protokollieren(self.kontext.clone()));

        let mut sync_takt = takt(self.config.synchronisation.intervall_sek);
        let mut entschluesselungs_takt =
            takt(self.config.synchronisation.pending_decrypt_intervall_sek);

        tracing::info!("Agent laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        loop {
            tokio::select! {
                _ = naechster_tick(&mut sync_takt) => {
                    sync_protokollieren(&self.kontext.synchronisieren().await);
                }
                _ = naechster_tick(&mut entschluesselungs_takt) => {
                    let nachgeholt = self.kontext.ausstehende_verarbeiten().await;
                    if nachgeholt > 0 {
                        tracing::info!(nachgeholt, "Zurueckgestellte Nachrichten entschluesselt");
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
            }
        }

        tracing::info!(
            warteschlange = self.kontext.warteschlangen_laenge().await,
            ausstehend = self.kontext.ausstehende_entschluesselungen(),
            "Shutdown-Signal empfangen, Agent wird beendet"
        );
        ereignisse.abort();
        Ok(())
    }
}

/// Intervall fuer periodische Arbeit; `0` deaktiviert sie
pub fn takt(sekunden: u64) -> Option<Interval> {
    if sekunden == 0 {
        return None;
    }
    let dauer = Duration::from_secs(sekunden);
    let mut intervall = tokio::time::interval_at(tokio::time::Instant::now() + dauer, dauer);
    intervall.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(intervall)
}

/// Wartet auf den naechsten Tick; ein deaktivierter Takt wartet ewig
async fn naechster_tick(intervall: &mut Option<Interval>) {
    match intervall {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn sync_protokollieren(ergebnis: &SyncErgebnis) {
    match ergebnis {
        SyncErgebnis::Abgeschlossen(bericht) => tracing::info!(
            zugestellt = bericht.zugestellt,
            verbleibend = bericht.verbleibend,
            key_hochgeladen = bericht.key_hochgeladen,
            aufgeloeste_peers = bericht.aufgeloeste_peers.len(),
            "Sync abgeschlossen"
        ),
        SyncErgebnis::Uebersprungen(grund) => {
            tracing::debug!(?grund, "Sync uebersprungen")
        }
    }
}

async fn ereignisse_protokollieren(kontext: Arc<E2eeKontext>) {
    let mut rx = kontext.abonnieren();
    loop {
        match rx.recv().await {
            Ok(KernEvent::NachrichtEntschluesselt { sender, .. }) => {
                tracing::info!(peer = %sender, "Nachricht nachtraeglich entschluesselt");
            }
            Ok(KernEvent::Online) => tracing::info!("Verbindung wiederhergestellt"),
            Ok(KernEvent::Offline) => tracing::warn!("Verbindung verloren"),
            Ok(KernEvent::SyncAbgeschlossen { .. }) => {}
            Err(RecvError::Lagged(verpasst)) => {
                tracing::warn!(verpasst, "Ereignisse verpasst");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sekunden_deaktiviert_takt() {
        assert!(takt(0).is_none());
        assert!(takt(30).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn takt_feuert_erst_nach_einem_intervall() {
        let start = tokio::time::Instant::now();
        let mut t = takt(60);
        naechster_tick(&mut t).await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn deaktivierter_takt_wartet_ewig() {
        let mut t = None;
        let ergebnis =
            tokio::time::timeout(Duration::from_secs(3600), naechster_tick(&mut t)).await;
        assert!(ergebnis.is_err());
    }
}
