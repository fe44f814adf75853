//! `E2eeKontext` – die oeffentliche Schnittstelle des E2EE-Kerns
//!
//! Wird einmal beim Start gebaut und an die UI-/Transport-Schicht
//! weitergereicht. Mehrere unabhaengige Kontexte im selben Prozess sind
//! moeglich (z.B. in Tests).
//!
//! Die einfachen Methoden liefern `bool`/`Option` und loggen den Fehler;
//! die `*_detailliert`-Varianten geben den typisierten `ClientResult` zurueck.

use std::sync::Arc;

use fluesterpost_core::{KernEvent, PeerId};
use fluesterpost_crypto::{suite_waehlen, CipherSuite, CryptoError, EncryptedEnvelope, PublicKey};
use fluesterpost_observability::FluesterpostMetrics;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::connectivity::{Connectivity, Uebergang};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpTransport;
use crate::keystore::KeyStore;
use crate::offline::OfflineFallbackLayer;
use crate::outbound_queue::OutboundQueue;
use crate::peer_directory::{PeerDirectory, PeerKeyCache};
use crate::pending_decrypt::PendingDecryptBuffer;
use crate::publication::{PublicationService, VeroeffentlichungsStatus};
use crate::retry::RetryPolicy;
use crate::session::{SessionManager, SessionZustand};
use crate::storage::{DiskStore, KeyValueStore};
use crate::sync::{SyncCoordinator, SyncErgebnis};
use crate::transport::{OutboundMessage, SendeAntwort, TransportClient};

/// Kapazitaet des Ereignis-Kanals
const EVENT_KAPAZITAET: usize = 256;

/// Zustimmung des Benutzers, bei fehlgeschlagener Verschluesselung im
/// Klartext zu senden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KlartextFreigabe {
    #[default]
    Verweigert,
    Erteilt,
}

pub struct E2eeKontext {
    keystore: KeyStore,
    sessions: Arc<SessionManager>,
    publication: Arc<PublicationService>,
    offline: Arc<OfflineFallbackLayer>,
    sync: Arc<SyncCoordinator>,
    connectivity: Arc<Connectivity>,
    queue: Arc<OutboundQueue>,
    events: broadcast::Sender<KernEvent>,
    metrics: Arc<FluesterpostMetrics>,
    init_sperre: tokio::sync::Mutex<()>,
}

impl E2eeKontext {
    /// Baut den Kontext aus seinen Kollaborateuren
    ///
    /// `transport` ist der echte Server-Transport; die Offline-Schicht wird
    /// hier darum gelegt.
    pub async fn neu(
        transport: Arc<dyn TransportClient>,
        store: Arc<dyn KeyValueStore>,
        suite: Arc<dyn CipherSuite>,
        policy: RetryPolicy,
        metrics: Arc<FluesterpostMetrics>,
    ) -> ClientResult<Self> {
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        let connectivity = Arc::new(Connectivity::default());
        let queue = Arc::new(OutboundQueue::laden(store.clone()).await?);
        let peer_keys = Arc::new(PeerKeyCache::laden(store.clone()).await);

        let offline = Arc::new(OfflineFallbackLayer::neu(
            transport.clone(),
            connectivity.clone(),
            queue.clone(),
            peer_keys.clone(),
            metrics.clone(),
        ));
        let umhuellt: Arc<dyn TransportClient> = offline.clone();

        let verzeichnis = Arc::new(PeerDirectory::neu(peer_keys, umhuellt, metrics.clone()));
        let sessions = Arc::new(SessionManager::neu(
            suite,
            verzeichnis.clone(),
            Arc::new(PendingDecryptBuffer::neu()),
            events.clone(),
            metrics.clone(),
        ));
        // Wiederholung direkt am echten Transport; offline entscheidet der Kontext
        let publication = Arc::new(
            PublicationService::neu(transport, policy, store.clone(), metrics.clone()).await,
        );
        let sync = Arc::new(SyncCoordinator::neu(
            offline.clone(),
            queue.clone(),
            connectivity.clone(),
            verzeichnis,
            publication.clone(),
            sessions.clone(),
            events.clone(),
            metrics.clone(),
        ));

        metrics.warteschlange_laenge.set(queue.len().await as i64);

        Ok(Self {
            keystore: KeyStore::neu(store),
            sessions,
            publication,
            offline,
            sync,
            connectivity,
            queue,
            events,
            metrics,
            init_sperre: tokio::sync::Mutex::new(()),
        })
    }

    /// Baut den Kontext mit HTTP-Transport und DiskStore aus der Konfiguration
    pub async fn aus_konfiguration(config: &ClientConfig) -> ClientResult<Self> {
        config.pruefen()?;
        let suite = suite_waehlen(config.krypto.suite, config.krypto.unsichere_suite_erlauben)?;
        let transport = Arc::new(HttpTransport::neu(
            &config.server.basis_url,
            config.server_timeout(),
        )?);
        let store = Arc::new(DiskStore::new(&config.speicher.verzeichnis));
        let metrics = Arc::new(
            FluesterpostMetrics::neu().map_err(|e| ClientError::Konfiguration(e.to_string()))?,
        );
        Self::neu(transport, store, suite, config.retry_policy(), metrics).await
    }

    // -----------------------------------------------------------------------
    // Initialisierung
    // -----------------------------------------------------------------------

    /// Stellt sicher, dass ein Schluessel-Paar existiert; `true` wenn bereit
    pub async fn initialisierung_sicherstellen(&self) -> bool {
        match self.initialisierung_sicherstellen_detailliert().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(fehler = %e, "E2EE-Initialisierung fehlgeschlagen");
                false
            }
        }
    }

    /// Laedt oder erzeugt das Paar und veroeffentlicht den Public Key
    ///
    /// Nur `SchluesselGenerierung` ist fatal; ein gescheiterter Upload wird
    /// als `NichtHochgeladen` vermerkt.
    pub async fn initialisierung_sicherstellen_detailliert(&self) -> ClientResult<()> {
        if self.sessions.public_key().is_some() {
            return Ok(());
        }
        let _init = self.init_sperre.lock().await;
        if self.sessions.public_key().is_some() {
            return Ok(());
        }

        let (pair, neu_erzeugt) = match self.keystore.laden().await {
            Some(pair) => (pair, false),
            None => {
                let pair = self.keystore.generieren(self.sessions.suite().as_ref())?;
                self.keystore
                    .speichern(&pair)
                    .await
                    .map_err(|e| ClientError::SchluesselGenerierung(e.to_string()))?;
                (pair, true)
            }
        };
        let public_key = pair.public_key;
        self.sessions.schluessel_setzen(pair);
        tracing::info!(neu_erzeugt, suite = self.sessions.suite().name(), "E2EE initialisiert");

        if neu_erzeugt || self.publication.status() == VeroeffentlichungsStatus::NichtHochgeladen {
            self.veroeffentlichen(&public_key).await;
        }
        Ok(())
    }

    async fn veroeffentlichen(&self, key: &PublicKey) {
        if self.connectivity.ist_online() {
            self.publication.veroeffentlichen(key).await;
            return;
        }
        // Offline-Schicht beantwortet den Upload; der naechste Sync holt ihn nach
        let _ = self
            .publication
            .veroeffentlichen_ueber(self.offline.as_ref(), key, &RetryPolicy::einmalig())
            .await;
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.sessions.public_key()
    }

    pub fn veroeffentlichungs_status(&self) -> VeroeffentlichungsStatus {
        self.publication.status()
    }

    /// Ob die aktive Suite Vertraulichkeit bietet
    pub fn ist_vertraulich(&self) -> bool {
        self.sessions.suite().is_confidential()
    }

    // -----------------------------------------------------------------------
    // Sessions, Ver- und Entschluesselung
    // -----------------------------------------------------------------------

    pub async fn session_aufbauen(&self, peer: &PeerId) -> bool {
        match self.session_aufbauen_detailliert(peer).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Session-Aufbau fehlgeschlagen");
                false
            }
        }
    }

    pub async fn session_aufbauen_detailliert(&self, peer: &PeerId) -> ClientResult<()> {
        self.initialisierung_sicherstellen_detailliert().await?;
        self.sessions.session_holen_oder_aufbauen(peer).await?;
        Ok(())
    }

    pub fn session_zustand(&self, peer: &PeerId) -> SessionZustand {
        self.sessions.zustand(peer)
    }

    pub async fn verschluesseln(&self, klartext: &str, peer: &PeerId) -> Option<EncryptedEnvelope> {
        match self.verschluesseln_detailliert(klartext, peer).await {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Verschluesselung fehlgeschlagen");
                None
            }
        }
    }

    pub async fn verschluesseln_detailliert(
        &self,
        klartext: &str,
        peer: &PeerId,
    ) -> ClientResult<EncryptedEnvelope> {
        self.initialisierung_sicherstellen_detailliert().await?;
        self.sessions.verschluesseln(klartext.as_bytes(), peer).await
    }

    pub async fn entschluesseln(&self, envelope: &EncryptedEnvelope, peer: &PeerId) -> Option<String> {
        match self.entschluesseln_detailliert(envelope, peer).await {
            Ok(klartext) => Some(klartext),
            Err(e) => {
                tracing::debug!(peer = %peer, fehler = %e, "Entschluesselung fehlgeschlagen");
                None
            }
        }
    }

    pub async fn entschluesseln_detailliert(
        &self,
        envelope: &EncryptedEnvelope,
        peer: &PeerId,
    ) -> ClientResult<String> {
        self.initialisierung_sicherstellen_detailliert().await?;
        let bytes = self.sessions.entschluesseln(envelope, peer).await?;
        utf8_klartext(bytes)
    }

    /// Einmal-Verschluesselung an einen beliebigen Public Key
    ///
    /// Laeuft an Verzeichnis und Sessions vorbei; nichts wird gecacht.
    pub async fn an_public_key_verschluesseln(
        &self,
        klartext: &str,
        empfaenger: &PublicKey,
    ) -> ClientResult<EncryptedEnvelope> {
        self.initialisierung_sicherstellen_detailliert().await?;
        let eigenes = self.sessions.eigenes_paar()?;
        Ok(self
            .sessions
            .suite()
            .seal_to(&eigenes, empfaenger, klartext.as_bytes())?)
    }

    /// Oeffnet eine Einmal-Box mit dem eigenen privaten Schluessel
    ///
    /// Der Absender-Key kommt aus dem Envelope; der Klartext ist nur
    /// gegenueber diesem Key authentisch.
    pub async fn mit_privatem_key_entschluesseln(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> ClientResult<String> {
        self.initialisierung_sicherstellen_detailliert().await?;
        let absender = envelope.sender_public_key.ok_or_else(|| {
            ClientError::Krypto(CryptoError::UngueltigeDaten(
                "Envelope ohne Absender-Key".into(),
            ))
        })?;
        let eigenes = self.sessions.eigenes_paar()?;
        let bytes = self.sessions.suite().open_from(
            &eigenes,
            &absender,
            &envelope.nonce,
            &envelope.ciphertext,
        )?;
        utf8_klartext(bytes)
    }

    /// Versucht zurueckgestellte Nachrichten erneut; liefert die Anzahl Erfolge
    pub async fn ausstehende_verarbeiten(&self) -> usize {
        if self.sessions.ausstehend().is_empty() {
            return 0;
        }
        if let Err(e) = self.initialisierung_sicherstellen_detailliert().await {
            tracing::warn!(fehler = %e, "Ausstehende Nachrichten: nicht initialisiert");
            return 0;
        }
        self.sessions.ausstehende_verarbeiten().await
    }

    pub fn ausstehende_entschluesselungen(&self) -> usize {
        self.sessions.ausstehend().len()
    }

    // -----------------------------------------------------------------------
    // Senden und Offline-Betrieb
    // -----------------------------------------------------------------------

    /// Verschluesselt und sendet eine Direktnachricht
    ///
    /// Ohne Verbindung wird die Nachricht eingereiht und eine Antwort mit
    /// `offline: true` geliefert. Schlaegt die Verschluesselung fehl, wird
    /// nur mit `KlartextFreigabe::Erteilt` im Klartext gesendet.
    pub async fn nachricht_senden(
        &self,
        peer: &PeerId,
        klartext: &str,
        freigabe: KlartextFreigabe,
    ) -> ClientResult<SendeAntwort> {
        let nachricht = match self.verschluesseln_detailliert(klartext, peer).await {
            Ok(envelope) => OutboundMessage::neu(peer.clone(), envelope.to_json(), true),
            Err(e) => match freigabe {
                KlartextFreigabe::Erteilt => {
                    tracing::warn!(
                        peer = %peer,
                        fehler = %e,
                        "Verschluesselung fehlgeschlagen, sende mit Freigabe im KLARTEXT"
                    );
                    OutboundMessage::neu(peer.clone(), klartext.to_string(), false)
                }
                KlartextFreigabe::Verweigert => {
                    return Err(ClientError::KlartextVerweigert {
                        peer: peer.clone(),
                        grund: e.to_string(),
                    });
                }
            },
        };
        Ok(self.offline.nachricht_senden(&nachricht).await?)
    }

    /// Meldet einen Verbindungswechsel der Plattform
    ///
    /// `Offline -> Online` loest genau einen Sync aus.
    pub async fn verbindung_setzen(&self, online: bool) -> Uebergang {
        let uebergang = self.connectivity.setzen(online);
        match uebergang {
            Uebergang::WiederOnline => {
                let _ = self.events.send(KernEvent::Online);
                self.synchronisieren().await;
            }
            Uebergang::Getrennt => {
                let _ = self.events.send(KernEvent::Offline);
            }
            Uebergang::Unveraendert => {}
        }
        uebergang
    }

    pub fn ist_online(&self) -> bool {
        self.connectivity.ist_online()
    }

    /// Stellt nur die Offline-Warteschlange zu
    pub async fn offline_nachrichten_synchronisieren(&self) -> SyncErgebnis {
        self.sync.offline_nachrichten_synchronisieren().await
    }

    /// Holt nur Key-Upload und verpasste Peer-Keys nach
    pub async fn public_keys_synchronisieren(&self) -> SyncErgebnis {
        let ergebnis = self.sync.public_keys_synchronisieren().await;
        self.nach_key_sync(&ergebnis).await;
        ergebnis
    }

    /// Voller Sync: Keys, dann Nachrichten
    pub async fn synchronisieren(&self) -> SyncErgebnis {
        let ergebnis = self.sync.synchronisieren().await;
        self.nach_key_sync(&ergebnis).await;
        ergebnis
    }

    /// Neu aufgeloeste Peers koennen gepufferte Nachrichten freischalten
    async fn nach_key_sync(&self, ergebnis: &SyncErgebnis) {
        let aufgeloest = ergebnis
            .bericht()
            .is_some_and(|b| !b.aufgeloeste_peers.is_empty());
        if aufgeloest {
            self.ausstehende_verarbeiten().await;
        }
    }

    pub async fn warteschlangen_laenge(&self) -> usize {
        self.queue.len().await
    }

    pub fn sync_laeuft(&self) -> bool {
        self.sync.laeuft()
    }

    // -----------------------------------------------------------------------
    // Ereignisse und Metriken
    // -----------------------------------------------------------------------

    /// Empfaenger fuer Kern-Ereignisse (nachgeholte Entschluesselungen usw.)
    pub fn abonnieren(&self) -> broadcast::Receiver<KernEvent> {
        self.events.subscribe()
    }

    pub fn metriken(&self) -> &Arc<FluesterpostMetrics> {
        &self.metrics
    }

    /// Prometheus-Textformat
    pub fn metriken_exportieren(&self) -> ClientResult<String> {
        self.metrics
            .exportieren()
            .map_err(|e| ClientError::Konfiguration(format!("Metriken-Export: {e}")))
    }
}

fn utf8_klartext(bytes: Vec<u8>) -> ClientResult<String> {
    String::from_utf8(bytes).map_err(|e| {
        ClientError::Krypto(CryptoError::UngueltigeDaten(format!(
            "Klartext ist kein UTF-8: {e}"
        )))
    })
}
