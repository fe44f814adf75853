//! Peer-Verzeichnis: Cache der oeffentlichen Schluessel anderer Clients
//!
//! Der Server ist autoritativ, der Cache ist nur eine Abkuerzung. Eintraege
//! laufen nicht ab und werden im lokalen Speicher gesichert, damit ein
//! Neustart im Offline-Zustand bekannte Schluessel nicht verliert.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use fluesterpost_core::PeerId;
use fluesterpost_crypto::PublicKey;
use fluesterpost_observability::FluesterpostMetrics;

use crate::error::{ClientError, ClientResult};
use crate::storage::KeyValueStore;
use crate::transport::TransportClient;

pub(crate) const PEER_KEYS_SCHLUESSEL: &str = "fp.peer_keys";

/// Prozessweiter Cache `PeerId -> PublicKey` mit Persistenz
pub struct PeerKeyCache {
    keys: DashMap<PeerId, PublicKey>,
    store: Arc<dyn KeyValueStore>,
}

impl PeerKeyCache {
    /// Laedt den gesicherten Cache; unlesbare Daten ergeben einen leeren Cache
    pub async fn laden(store: Arc<dyn KeyValueStore>) -> Self {
        let mut keys = DashMap::new();
        match store.get(PEER_KEYS_SCHLUESSEL).await {
            Ok(Some(json)) => match serde_json::from_str::<BTreeMap<PeerId, PublicKey>>(&json) {
                Ok(map) => {
                    tracing::debug!(eintraege = map.len(), "Peer-Key-Cache geladen");
                    keys.extend(map);
                }
                Err(e) => tracing::warn!(fehler = %e, "Peer-Key-Cache verworfen"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(fehler = %e, "Peer-Key-Cache nicht lesbar"),
        }
        Self { keys, store }
    }

    pub fn get(&self, peer: &PeerId) -> Option<PublicKey> {
        self.keys.get(peer).map(|k| *k.value())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Eintrag setzen und den ganzen Cache sichern
    ///
    /// Ein Speicherfehler wird geloggt; der Eintrag bleibt im Speicher gueltig.
    pub(crate) async fn einfuegen(&self, peer: PeerId, key: PublicKey) {
        self.keys.insert(peer, key);
        let snapshot: BTreeMap<PeerId, PublicKey> = self
            .keys
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let ergebnis = match serde_json::to_string(&snapshot) {
            Ok(json) => self.store.set(PEER_KEYS_SCHLUESSEL, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = ergebnis {
            tracing::warn!(fehler = %e, "Peer-Key-Cache konnte nicht gesichert werden");
        }
    }
}

/// Liefert Peer-Keys aus dem Cache oder vom Server
pub struct PeerDirectory {
    cache: Arc<PeerKeyCache>,
    transport: Arc<dyn TransportClient>,
    metrics: Arc<FluesterpostMetrics>,
}

impl PeerDirectory {
    pub fn neu(
        cache: Arc<PeerKeyCache>,
        transport: Arc<dyn TransportClient>,
        metrics: Arc<FluesterpostMetrics>,
    ) -> Self {
        Self {
            cache,
            transport,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<PeerKeyCache> {
        &self.cache
    }

    /// Nur Cache, keine Netzwerk-Anfrage
    pub fn bekannt(&self, peer: &PeerId) -> Option<PublicKey> {
        self.cache.get(peer)
    }

    /// Cache zuerst, sonst Abruf ueber den eingestellten Transport
    pub async fn abrufen(&self, peer: &PeerId) -> ClientResult<PublicKey> {
        if let Some(key) = self.cache.get(peer) {
            return Ok(key);
        }
        self.vom_server_abrufen(self.transport.as_ref(), peer).await
    }

    /// Abruf ueber einen bestimmten Transport, ohne Cache-Pruefung
    ///
    /// Der Sync-Koordinator nutzt das mit dem echten Transport, um
    /// offline verpasste Abfragen nachzuholen.
    pub async fn vom_server_abrufen(
        &self,
        transport: &dyn TransportClient,
        peer: &PeerId,
    ) -> ClientResult<PublicKey> {
        if !peer.ist_gueltig() {
            return Err(ClientError::SchluesselAbruf {
                peer: peer.clone(),
                grund: "leere Peer-ID".into(),
            });
        }

        self.metrics.peer_key_abrufe.inc();
        let antwort = transport
            .peer_key_abrufen(peer)
            .await
            .map_err(|e| ClientError::SchluesselAbruf {
                peer: peer.clone(),
                grund: e.to_string(),
            })?;

        let kodiert = antwort.public_key.ok_or_else(|| ClientError::SchluesselAbruf {
            peer: peer.clone(),
            grund: if antwort.offline {
                "offline und nicht im Cache".into()
            } else {
                "kein Schluessel hinterlegt".into()
            },
        })?;

        let key = PublicKey::from_base64(&kodiert).map_err(|e| {
            tracing::error!(peer = %peer, fehler = %e, "Peer-Key hat ungueltiges Format");
            ClientError::SchluesselFormat {
                peer: peer.clone(),
                grund: e.to_string(),
            }
        })?;

        self.cache.einfuegen(peer.clone(), key).await;
        tracing::debug!(peer = %peer, offline = antwort.offline, "Peer-Key uebernommen");
        Ok(key)
    }
}
