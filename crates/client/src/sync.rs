//! Sync-Koordinator: holt offline Verpasstes ueber den echten Transport nach
//!
//! Single-flight: laeuft bereits ein Sync, wird jeder weitere Ausloeser
//! ignoriert statt einen zweiten, parallelen Durchlauf zu starten. Ein
//! gemeinsames Flag gilt fuer Nachrichten-, Key- und Gesamt-Sync.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fluesterpost_core::{KernEvent, PeerId};
use fluesterpost_observability::FluesterpostMetrics;
use tokio::sync::broadcast;

use crate::connectivity::Connectivity;
use crate::offline::OfflineFallbackLayer;
use crate::outbound_queue::OutboundQueue;
use crate::peer_directory::PeerDirectory;
use crate::publication::{PublicationService, VeroeffentlichungsStatus};
use crate::retry::RetryPolicy;
use crate::session::SessionManager;

/// Warum ein Sync nicht gelaufen ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UebersprungGrund {
    /// Ein anderer Sync laeuft gerade
    LaeuftBereits,
    Offline,
}

/// Ergebnis eines Sync-Aufrufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncErgebnis {
    Uebersprungen(UebersprungGrund),
    Abgeschlossen(SyncBericht),
}

impl SyncErgebnis {
    pub fn ist_gelaufen(&self) -> bool {
        matches!(self, Self::Abgeschlossen(_))
    }

    pub fn bericht(&self) -> Option<&SyncBericht> {
        match self {
            Self::Abgeschlossen(bericht) => Some(bericht),
            Self::Uebersprungen(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBericht {
    /// Vom Server bestaetigte Nachrichten
    pub zugestellt: usize,
    /// Nachrichten, die im naechsten Durchlauf erneut versucht werden
    pub fehlgeschlagen: usize,
    /// Laenge der Warteschlange nach dem Durchlauf
    pub verbleibend: usize,
    /// Eigener Key in diesem Durchlauf hochgeladen
    pub key_hochgeladen: bool,
    /// Peers, deren Key nachtraeglich abgerufen wurde
    pub aufgeloeste_peers: Vec<PeerId>,
}

/// Setzt das Single-flight-Flag beim Drop zurueck
struct LaufGuard<'a>(&'a AtomicBool);

impl Drop for LaufGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncCoordinator {
    offline: Arc<OfflineFallbackLayer>,
    queue: Arc<OutboundQueue>,
    connectivity: Arc<Connectivity>,
    verzeichnis: Arc<PeerDirectory>,
    publication: Arc<PublicationService>,
    sessions: Arc<SessionManager>,
    events: broadcast::Sender<KernEvent>,
    metrics: Arc<FluesterpostMetrics>,
    laeuft: AtomicBool,
}

impl SyncCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn neu(
        offline: Arc<OfflineFallbackLayer>,
        queue: Arc<OutboundQueue>,
        connectivity: Arc<Connectivity>,
        verzeichnis: Arc<PeerDirectory>,
        publication: Arc<PublicationService>,
        sessions: Arc<SessionManager>,
        events: broadcast::Sender<KernEvent>,
        metrics: Arc<FluesterpostMetrics>,
    ) -> Self {
        Self {
            offline,
            queue,
            connectivity,
            verzeichnis,
            publication,
            sessions,
            events,
            metrics,
            laeuft: AtomicBool::new(false),
        }
    }

    pub fn laeuft(&self) -> bool {
        self.laeuft.load(Ordering::SeqCst)
    }

    fn starten(&self) -> Result<LaufGuard<'_>, UebersprungGrund> {
        if !self.connectivity.ist_online() {
            return Err(UebersprungGrund::Offline);
        }
        self.laeuft
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| LaufGuard(&self.laeuft))
            .map_err(|_| UebersprungGrund::LaeuftBereits)
    }

    fn uebersprungen(&self, grund: UebersprungGrund) -> SyncErgebnis {
        tracing::debug!(?grund, "Sync uebersprungen");
        self.metrics.sync_zaehlen("skipped");
        SyncErgebnis::Uebersprungen(grund)
    }

    fn abschliessen(&self, bericht: SyncBericht) -> SyncErgebnis {
        self.metrics.sync_zaehlen("ok");
        self.metrics.warteschlange_laenge.set(bericht.verbleibend as i64);
        let _ = self.events.send(KernEvent::SyncAbgeschlossen {
            zugestellt: bericht.zugestellt,
            verbleibend: bericht.verbleibend,
        });
        SyncErgebnis::Abgeschlossen(bericht)
    }

    /// Stellt die Offline-Warteschlange zu
    pub async fn offline_nachrichten_synchronisieren(&self) -> SyncErgebnis {
        let _guard = match self.starten() {
            Ok(guard) => guard,
            Err(grund) => return self.uebersprungen(grund),
        };
        let mut bericht = SyncBericht::default();
        self.nachrichten_durchlauf(&mut bericht).await;
        self.abschliessen(bericht)
    }

    /// Holt Key-Upload und verpasste Peer-Key-Abfragen nach
    pub async fn public_keys_synchronisieren(&self) -> SyncErgebnis {
        let _guard = match self.starten() {
            Ok(guard) => guard,
            Err(grund) => return self.uebersprungen(grund),
        };
        let mut bericht = SyncBericht::default();
        self.key_durchlauf(&mut bericht).await;
        bericht.verbleibend = self.queue.len().await;
        self.abschliessen(bericht)
    }

    /// Erst Keys, dann Nachrichten, unter einem gemeinsamen Guard
    pub async fn synchronisieren(&self) -> SyncErgebnis {
        let _guard = match self.starten() {
            Ok(guard) => guard,
            Err(grund) => return self.uebersprungen(grund),
        };
        let mut bericht = SyncBericht::default();
        self.key_durchlauf(&mut bericht).await;
        self.nachrichten_durchlauf(&mut bericht).await;
        self.abschliessen(bericht)
    }

    async fn key_durchlauf(&self, bericht: &mut SyncBericht) {
        let echt = self.offline.inner().as_ref();

        if self.publication.status() == VeroeffentlichungsStatus::NichtHochgeladen {
            if let Some(eigener_key) = self.sessions.public_key() {
                bericht.key_hochgeladen = self
                    .publication
                    .veroeffentlichen_ueber(echt, &eigener_key, &RetryPolicy::einmalig())
                    .await
                    .is_ok();
            }
        }

        for peer in self.offline.offene_abfragen() {
            let vorher = self.verzeichnis.bekannt(&peer);
            match self.verzeichnis.vom_server_abrufen(echt, &peer).await {
                Ok(key) => {
                    self.offline.abfrage_erledigt(&peer);
                    if vorher.is_some_and(|alt| alt != key) {
                        tracing::warn!(
                            peer = %peer,
                            "Peer-Key hat sich geaendert, Session verworfen"
                        );
                        self.sessions.session_verwerfen(&peer);
                    }
                    bericht.aufgeloeste_peers.push(peer);
                }
                Err(e) => {
                    tracing::debug!(peer = %peer, fehler = %e, "Peer-Key weiterhin nicht abrufbar");
                }
            }
        }
    }

    async fn nachrichten_durchlauf(&self, bericht: &mut SyncBericht) {
        let echt = self.offline.inner().as_ref();
        let snapshot = self.queue.schnappschuss().await;
        if snapshot.is_empty() {
            bericht.verbleibend = self.queue.len().await;
            return;
        }
        tracing::info!(eintraege = snapshot.len(), "Offline-Nachrichten werden synchronisiert");

        // Nach einem Fehler fuer einen Peer werden dessen spaetere Nachrichten
        // in diesem Durchlauf nicht gesendet (FIFO pro Peer)
        let mut blockiert: HashSet<PeerId> = HashSet::new();

        for eintrag in snapshot {
            let peer = eintrag.nachricht.recipient_id.clone();
            if blockiert.contains(&peer) {
                bericht.fehlgeschlagen += 1;
                continue;
            }

            match echt.nachricht_senden(&eintrag.nachricht).await {
                Ok(antwort) if antwort.success => {
                    if let Err(e) = self.queue.bestaetigen(eintrag.id).await {
                        tracing::error!(
                            id = %eintrag.id,
                            fehler = %e,
                            "Bestaetigung nicht gesichert"
                        );
                    }
                    bericht.zugestellt += 1;
                }
                Ok(_) => {
                    tracing::warn!(peer = %peer, id = %eintrag.id, "Server lehnte Nachricht ab");
                    blockiert.insert(peer);
                    bericht.fehlgeschlagen += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        peer = %peer,
                        id = %eintrag.id,
                        fehler = %e,
                        "Zustellung fehlgeschlagen"
                    );
                    blockiert.insert(peer);
                    bericht.fehlgeschlagen += 1;
                }
            }
        }

        if let Err(e) = self.queue.bereinigen().await {
            tracing::error!(fehler = %e, "Warteschlange konnte nicht bereinigt werden");
        }
        self.metrics
            .nachrichten_nachgeliefert
            .inc_by(bericht.zugestellt as u64);
        bericht.verbleibend = self.queue.len().await;
        tracing::info!(
            zugestellt = bericht.zugestellt,
            fehlgeschlagen = bericht.fehlgeschlagen,
            verbleibend = bericht.verbleibend,
            "Offline-Sync abgeschlossen"
        );
    }
}
