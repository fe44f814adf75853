//! Session-Manager: Session-Keys pro Peer, Ver- und Entschluesselung
//!
//! Zustandsautomat pro Peer:
//! ```text
//! KeineSession --(erste Anfrage)--> WirdAufgebaut --(Key abgerufen, abgeleitet)--> Aufgebaut
//!                                        |
//!                                        +--(Abruf/Format-Fehler)--> KeineSession
//! ```
//! Nebenlaeufige Anfragen fuer denselben Peer warten auf einen einzigen
//! Aufbau; es gibt pro Peer hoechstens einen Netzwerk-Abruf gleichzeitig.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use fluesterpost_core::{KernEvent, PeerId};
use fluesterpost_crypto::{
    CipherSuite, CryptoError, EncryptedEnvelope, KeyPair, PublicKey, SessionKey,
};
use fluesterpost_observability::FluesterpostMetrics;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::{ClientError, ClientResult};
use crate::peer_directory::PeerDirectory;
use crate::pending_decrypt::{AusstehendeEntschluesselung, PendingDecryptBuffer};

/// Zustand der Session mit einem Peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    KeineSession,
    WirdAufgebaut,
    Aufgebaut,
}

type AufbauSperren = Mutex<HashMap<PeerId, Arc<tokio::sync::Mutex<()>>>>;

/// Entfernt die Aufbau-Markierung auch bei Abbruch des Futures
struct AufbauMarke<'a> {
    im_aufbau: &'a DashSet<PeerId>,
    peer: PeerId,
}

impl Drop for AufbauMarke<'_> {
    fn drop(&mut self) {
        self.im_aufbau.remove(&self.peer);
    }
}

/// Raeumt die Aufbau-Sperre eines Peers ab, sobald niemand mehr auf sie wartet
struct SperreAufraeumen<'a> {
    aufbau_sperren: &'a AufbauSperren,
    peer: PeerId,
}

impl Drop for SperreAufraeumen<'_> {
    fn drop(&mut self) {
        // Map und der eigene Task halten je eine Referenz
        let mut sperren = self.aufbau_sperren.lock();
        if sperren
            .get(&self.peer)
            .is_some_and(|sperre| Arc::strong_count(sperre) <= 2)
        {
            sperren.remove(&self.peer);
        }
    }
}

pub struct SessionManager {
    suite: Arc<dyn CipherSuite>,
    verzeichnis: Arc<PeerDirectory>,
    eigenes_paar: RwLock<Option<Arc<KeyPair>>>,
    sessions: DashMap<PeerId, SessionKey>,
    im_aufbau: DashSet<PeerId>,
    aufbau_sperren: AufbauSperren,
    ausstehend: Arc<PendingDecryptBuffer>,
    events: broadcast::Sender<KernEvent>,
    metrics: Arc<FluesterpostMetrics>,
}

impl SessionManager {
    pub fn neu(
        suite: Arc<dyn CipherSuite>,
        verzeichnis: Arc<PeerDirectory>,
        ausstehend: Arc<PendingDecryptBuffer>,
        events: broadcast::Sender<KernEvent>,
        metrics: Arc<FluesterpostMetrics>,
    ) -> Self {
        Self {
            suite,
            verzeichnis,
            eigenes_paar: RwLock::new(None),
            sessions: DashMap::new(),
            im_aufbau: DashSet::new(),
            aufbau_sperren: Mutex::new(HashMap::new()),
            ausstehend,
            events,
            metrics,
        }
    }

    pub fn suite(&self) -> &Arc<dyn CipherSuite> {
        &self.suite
    }

    /// Setzt das eigene Schluessel-Paar; bestehende Sessions werden verworfen
    pub fn schluessel_setzen(&self, pair: KeyPair) {
        *self.eigenes_paar.write() = Some(Arc::new(pair));
        self.sessions.clear();
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.eigenes_paar.read().as_ref().map(|p| p.public_key)
    }

    pub(crate) fn eigenes_paar(&self) -> ClientResult<Arc<KeyPair>> {
        self.eigenes_paar
            .read()
            .clone()
            .ok_or(ClientError::NichtInitialisiert)
    }

    pub fn zustand(&self, peer: &PeerId) -> SessionZustand {
        if self.sessions.contains_key(peer) {
            SessionZustand::Aufgebaut
        } else if self.im_aufbau.contains(peer) {
            SessionZustand::WirdAufgebaut
        } else {
            SessionZustand::KeineSession
        }
    }

    pub fn anzahl_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Anzahl der Aufbau-Sperren, die noch in der Map liegen
    pub(crate) fn aufbau_sperren_anzahl(&self) -> usize {
        self.aufbau_sperren.lock().len()
    }

    /// Verwirft die Session (z.B. nachdem sich der Peer-Key geaendert hat)
    pub fn session_verwerfen(&self, peer: &PeerId) -> bool {
        self.sessions.remove(peer).is_some()
    }

    fn aufbau_sperre(&self, peer: &PeerId) -> Arc<tokio::sync::Mutex<()>> {
        self.aufbau_sperren
            .lock()
            .entry(peer.clone())
            .or_default()
            .clone()
    }

    fn gecachte_session(&self, peer: &PeerId) -> Option<SessionKey> {
        self.sessions.get(peer).map(|k| k.value().clone())
    }

    /// Liefert den Session-Key, baut die Session bei Bedarf auf
    ///
    /// Der Peer-Key kommt ausschliesslich aus dem Verzeichnis (Cache oder
    /// Server). Fehler: `SchluesselAbruf` (Peer-Key nicht erreichbar),
    /// `SchluesselFormat` (Peer-Key ungueltig), `Session` (Ableitung fehlgeschlagen).
    /// Nach einem Fehler bleibt der Peer in `KeineSession`.
    pub async fn session_holen_oder_aufbauen(&self, peer: &PeerId) -> ClientResult<SessionKey> {
        if let Some(key) = self.gecachte_session(peer) {
            return Ok(key);
        }
        let eigenes = self.eigenes_paar()?;

        let sperre = self.aufbau_sperre(peer);
        let _aufraeumen = SperreAufraeumen {
            aufbau_sperren: &self.aufbau_sperren,
            peer: peer.clone(),
        };
        let _gesperrt = sperre.lock().await;

        // Ein anderer Task war schneller
        if let Some(key) = self.gecachte_session(peer) {
            return Ok(key);
        }

        self.im_aufbau.insert(peer.clone());
        let _marke = AufbauMarke {
            im_aufbau: &self.im_aufbau,
            peer: peer.clone(),
        };

        let peer_key = self.verzeichnis.abrufen(peer).await.map_err(|e| {
            tracing::warn!(peer = %peer, fehler = %e, "Session-Aufbau fehlgeschlagen");
            e
        })?;

        let key = self
            .suite
            .derive_session_key(&eigenes, &peer_key)
            .map_err(|e| {
                tracing::warn!(peer = %peer, fehler = %e, "Session-Key-Ableitung fehlgeschlagen");
                ClientError::Session {
                    peer: peer.clone(),
                    grund: e.to_string(),
                }
            })?;

        self.sessions.insert(peer.clone(), key.clone());
        tracing::info!(peer = %peer, suite = self.suite.name(), "Session aufgebaut");
        Ok(key)
    }

    /// Verschluesselt fuer einen Peer mit frischer Nonce
    pub async fn verschluesseln(
        &self,
        klartext: &[u8],
        peer: &PeerId,
    ) -> ClientResult<EncryptedEnvelope> {
        let eigenes = self.eigenes_paar()?;
        let key = self
            .session_holen_oder_aufbauen(peer)
            .await
            .map_err(|e| match e {
                ClientError::NichtInitialisiert | ClientError::Session { .. } => e,
                andere => ClientError::Session {
                    peer: peer.clone(),
                    grund: andere.to_string(),
                },
            })?;

        let (nonce, ciphertext) = self.suite.seal(&key, klartext)?;
        Ok(EncryptedEnvelope {
            ciphertext,
            nonce,
            sender_public_key: Some(eigenes.public_key),
        })
    }

    /// Entschluesselt eine Nachricht von `peer`
    ///
    /// Schlaegt das fehl, weil noch keine Session existiert oder der
    /// Auth-Tag nicht passt, wird die Nachricht zurueckgestellt und bei
    /// `ausstehende_verarbeiten` erneut versucht.
    pub async fn entschluesseln(
        &self,
        envelope: &EncryptedEnvelope,
        peer: &PeerId,
    ) -> ClientResult<Vec<u8>> {
        match self.entschluesseln_intern(envelope, peer).await {
            Ok(klartext) => Ok(klartext),
            Err(e) => {
                if matches!(
                    e,
                    ClientError::Authentifizierung { .. } | ClientError::Session { .. }
                ) {
                    let neu = self
                        .ausstehend
                        .hinzufuegen(AusstehendeEntschluesselung::neu(envelope.clone(), peer.clone()));
                    self.metrics
                        .ausstehende_entschluesselungen
                        .set(self.ausstehend.len() as i64);
                    tracing::debug!(peer = %peer, neu, fehler = %e, "Nachricht zurueckgestellt");
                }
                Err(e)
            }
        }
    }

    async fn entschluesseln_intern(
        &self,
        envelope: &EncryptedEnvelope,
        peer: &PeerId,
    ) -> ClientResult<Vec<u8>> {
        // Der Absender-Key im Envelope ist nicht authentisch und dient nur als Hinweis
        if let (Some(angegeben), Some(bekannt)) =
            (envelope.sender_public_key, self.verzeichnis.bekannt(peer))
        {
            if angegeben != bekannt {
                tracing::warn!(peer = %peer, "Absender-Key im Envelope weicht vom Verzeichnis ab");
            }
        }

        let key = self
            .session_holen_oder_aufbauen(peer)
            .await
            .map_err(|e| match e {
                ClientError::SchluesselAbruf { grund, .. } => ClientError::Session {
                    peer: peer.clone(),
                    grund,
                },
                andere => andere,
            })?;

        self.suite
            .open(&key, &envelope.nonce, &envelope.ciphertext)
            .map_err(|e| match e {
                CryptoError::Authentifizierung => {
                    tracing::warn!(peer = %peer, "Auth-Tag ungueltig");
                    ClientError::Authentifizierung { peer: peer.clone() }
                }
                andere => andere.into(),
            })
    }

    /// Versucht alle zurueckgestellten Nachrichten erneut (aeltester zuerst)
    ///
    /// Erfolge werden als `KernEvent::NachrichtEntschluesselt` verteilt,
    /// Fehlschlaege bleiben fuer den naechsten Durchlauf im Puffer. Liefert
    /// die Anzahl erfolgreich entschluesselter Nachrichten.
    pub async fn ausstehende_verarbeiten(&self) -> usize {
        let eintraege = self.ausstehend.alle_entnehmen();
        if eintraege.is_empty() {
            return 0;
        }

        let gesamt = eintraege.len();
        let mut erfolgreich = 0;
        let mut fehlgeschlagen = Vec::new();
        // Peers ohne Session nur einmal pro Durchlauf anfragen
        let mut ohne_session: HashSet<PeerId> = HashSet::new();

        for mut eintrag in eintraege {
            if ohne_session.contains(&eintrag.sender) {
                eintrag.versuche += 1;
                fehlgeschlagen.push(eintrag);
                continue;
            }

            match self.entschluesseln_intern(&eintrag.envelope, &eintrag.sender).await {
                Ok(bytes) => {
                    erfolgreich += 1;
                    let klartext = match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(peer = %eintrag.sender, "Klartext ist kein gueltiges UTF-8");
                            String::from_utf8_lossy(e.as_bytes()).into_owned()
                        }
                    };
                    // Ohne Abonnenten ist send() ein Fehler, das ist kein Problem
                    let _ = self.events.send(KernEvent::NachrichtEntschluesselt {
                        sender: eintrag.sender,
                        klartext,
                        empfangen_am: eintrag.empfangen_am,
                    });
                }
                Err(e) => {
                    if !matches!(e, ClientError::Authentifizierung { .. }) {
                        ohne_session.insert(eintrag.sender.clone());
                    }
                    eintrag.versuche += 1;
                    fehlgeschlagen.push(eintrag);
                }
            }
        }

        self.ausstehend.zurueckstellen(fehlgeschlagen);
        self.metrics
            .entschluesselungen_nachgeholt
            .inc_by(erfolgreich as u64);
        self.metrics
            .ausstehende_entschluesselungen
            .set(self.ausstehend.len() as i64);
        tracing::debug!(
            gesamt,
            erfolgreich,
            verbleibend = self.ausstehend.len(),
            "Ausstehende Nachrichten verarbeitet"
        );
        erfolgreich
    }

    pub fn ausstehend(&self) -> &Arc<PendingDecryptBuffer> {
        &self.ausstehend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_directory::PeerKeyCache;
    use crate::storage::MemoryStore;
    use crate::tests::hilfen::SkriptTransport;
    use fluesterpost_crypto::X25519XChaCha20Suite;

    async fn manager(transport: Arc<SkriptTransport>) -> SessionManager {
        let metrics = Arc::new(FluesterpostMetrics::neu().unwrap());
        let cache = Arc::new(PeerKeyCache::laden(Arc::new(MemoryStore::new())).await);
        let verzeichnis = Arc::new(PeerDirectory::neu(cache, transport, metrics.clone()));
        let (events, _) = broadcast::channel(8);
        let manager = SessionManager::neu(
            Arc::new(X25519XChaCha20Suite),
            verzeichnis,
            Arc::new(PendingDecryptBuffer::neu()),
            events,
            metrics,
        );
        manager.schluessel_setzen(X25519XChaCha20Suite.generate_keypair().unwrap());
        manager
    }

    #[tokio::test]
    async fn fehlgeschlagener_aufbau_hinterlaesst_keine_sperre() {
        let transport = Arc::new(SkriptTransport::neu());
        let m = manager(transport.clone()).await;

        for i in 0..5 {
            let peer = PeerId::new(format!("fehlt{i}"));
            assert!(m.session_holen_oder_aufbauen(&peer).await.is_err());
            assert_eq!(m.zustand(&peer), SessionZustand::KeineSession);
        }
        assert_eq!(m.aufbau_sperren_anzahl(), 0);
    }

    #[tokio::test]
    async fn wartende_aufbauten_raeumen_sperre_ab() {
        let transport = Arc::new(SkriptTransport::neu());
        let peer_key = X25519XChaCha20Suite.generate_keypair().unwrap().public_key;
        transport.peer_key_setzen("da", &peer_key);
        let m = manager(transport.clone()).await;
        let peer = PeerId::new("da");

        let (eins, zwei, drei) = tokio::join!(
            m.session_holen_oder_aufbauen(&peer),
            m.session_holen_oder_aufbauen(&peer),
            m.session_holen_oder_aufbauen(&peer),
        );
        assert!(eins.is_ok() && zwei.is_ok() && drei.is_ok());
        assert_eq!(transport.key_abrufe(), 1);
        assert_eq!(m.aufbau_sperren_anzahl(), 0);
    }

    #[tokio::test]
    async fn absender_key_im_envelope_ersetzt_kein_verzeichnis() {
        let transport = Arc::new(SkriptTransport::neu());
        let m = manager(transport.clone()).await;
        let faelscher = X25519XChaCha20Suite.generate_keypair().unwrap();
        let eigener = m.public_key().unwrap();

        let key = X25519XChaCha20Suite.derive_session_key(&faelscher, &eigener).unwrap();
        let (nonce, ciphertext) = X25519XChaCha20Suite.seal(&key, b"gefaelscht").unwrap();
        let envelope = EncryptedEnvelope {
            ciphertext,
            nonce,
            sender_public_key: Some(faelscher.public_key),
        };

        let peer = PeerId::new("m");
        let result = m.entschluesseln(&envelope, &peer).await;
        assert!(matches!(result, Err(ClientError::Session { .. })));
        assert_eq!(m.zustand(&peer), SessionZustand::KeineSession);
        assert!(m.verzeichnis.bekannt(&peer).is_none());
        assert_eq!(m.ausstehend().len(), 1);
    }
}
