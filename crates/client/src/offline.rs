//! Offline-Schicht um den echten Transport
//!
//! Macht Netzwerkausfaelle fuer Session-Manager und Sende-Pfad transparent.
//! Ist die Verbindung als offline markiert oder liefert der echte Transport
//! einen absorbierbaren Fehler, dann
//! - landen Direktnachrichten in der dauerhaften Warteschlange,
//! - werden Peer-Keys aus dem lokalen Cache beantwortet (verpasste Abfragen
//!   werden fuer den naechsten Sync vermerkt),
//! - wird der eigene Key-Upload als `offline` beantwortet,
//!
//! und der Aufrufer erhaelt eine Antwort in derselben Form wie vom Server,
//! markiert mit `offline: true`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use fluesterpost_core::PeerId;
use fluesterpost_crypto::PublicKey;
use fluesterpost_observability::FluesterpostMetrics;

use crate::connectivity::Connectivity;
use crate::outbound_queue::OutboundQueue;
use crate::peer_directory::PeerKeyCache;
use crate::transport::{
    OutboundMessage, PeerKeyAntwort, SendeAntwort, TransportClient, TransportError,
    TransportResult, VeroeffentlichungsAntwort,
};

/// Warum die Offline-Antwort verwendet wird
enum Ausweichgrund<'a> {
    Offline,
    Fehler(&'a TransportError),
}

impl std::fmt::Display for Ausweichgrund<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::Fehler(e) => write!(f, "{e}"),
        }
    }
}

pub struct OfflineFallbackLayer {
    inner: Arc<dyn TransportClient>,
    connectivity: Arc<Connectivity>,
    queue: Arc<OutboundQueue>,
    peer_keys: Arc<PeerKeyCache>,
    offene_abfragen: DashSet<PeerId>,
    metrics: Arc<FluesterpostMetrics>,
}

impl OfflineFallbackLayer {
    pub fn neu(
        inner: Arc<dyn TransportClient>,
        connectivity: Arc<Connectivity>,
        queue: Arc<OutboundQueue>,
        peer_keys: Arc<PeerKeyCache>,
        metrics: Arc<FluesterpostMetrics>,
    ) -> Self {
        Self {
            inner,
            connectivity,
            queue,
            peer_keys,
            offene_abfragen: DashSet::new(),
            metrics,
        }
    }

    /// Der umhuellte, echte Transport (fuer den Sync)
    pub fn inner(&self) -> &Arc<dyn TransportClient> {
        &self.inner
    }

    /// Peers, deren Key-Abfrage ohne Treffer blieb (offline oder vom Server)
    pub fn offene_abfragen(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.offene_abfragen.iter().map(|p| p.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn abfrage_erledigt(&self, peer: &PeerId) {
        self.offene_abfragen.remove(peer);
    }

    /// Fuehrt `aufruf` aus, wenn online; liefert den Ausweichgrund sonst
    async fn versuchen<T, F>(&self, aufruf: F) -> Result<TransportResult<T>, TransportError>
    where
        F: std::future::Future<Output = TransportResult<T>>,
    {
        if !self.connectivity.ist_online() {
            return Ok(Err(TransportError::Netzwerk("offline".into())));
        }
        match aufruf.await {
            Err(e) if !e.ist_absorbierbar() => Err(e),
            ergebnis => Ok(ergebnis),
        }
    }

    fn ausweichgrund<'a, T>(&self, ergebnis: &'a TransportResult<T>) -> Option<Ausweichgrund<'a>> {
        match ergebnis {
            Ok(_) => None,
            Err(_) if !self.connectivity.ist_online() => Some(Ausweichgrund::Offline),
            Err(e) => Some(Ausweichgrund::Fehler(e)),
        }
    }
}

#[async_trait]
impl TransportClient for OfflineFallbackLayer {
    async fn public_key_hochladen(&self, key: &PublicKey) -> TransportResult<VeroeffentlichungsAntwort> {
        let ergebnis = self.versuchen(self.inner.public_key_hochladen(key)).await?;
        if let Some(grund) = self.ausweichgrund(&ergebnis) {
            tracing::info!(grund = %grund, "Key-Upload zurueckgestellt bis zum naechsten Sync");
            return Ok(VeroeffentlichungsAntwort {
                success: true,
                offline: true,
            });
        }
        ergebnis
    }

    async fn peer_key_abrufen(&self, peer: &PeerId) -> TransportResult<PeerKeyAntwort> {
        let ergebnis = self.versuchen(self.inner.peer_key_abrufen(peer)).await?;
        if let Some(grund) = self.ausweichgrund(&ergebnis) {
            let lokal = self.peer_keys.get(peer).map(|k| k.to_base64());
            if lokal.is_none() {
                self.offene_abfragen.insert(peer.clone());
            }
            tracing::debug!(
                peer = %peer,
                grund = %grund,
                lokal_bekannt = lokal.is_some(),
                "Peer-Key-Abfrage aus lokalem Cache beantwortet"
            );
            return Ok(PeerKeyAntwort {
                public_key: lokal,
                offline: true,
            });
        }
        match &ergebnis {
            Ok(PeerKeyAntwort {
                public_key: Some(_),
                ..
            }) => {
                self.offene_abfragen.remove(peer);
            }
            // Server kennt den Peer (noch) nicht: beim naechsten Sync erneut fragen
            Ok(PeerKeyAntwort { public_key: None, .. }) => {
                self.offene_abfragen.insert(peer.clone());
            }
            Err(_) => {}
        }
        ergebnis
    }

    async fn nachricht_senden(&self, nachricht: &OutboundMessage) -> TransportResult<SendeAntwort> {
        let ergebnis = self.versuchen(self.inner.nachricht_senden(nachricht)).await?;
        let Some(grund) = self.ausweichgrund(&ergebnis) else {
            return ergebnis;
        };

        let eintrag = self
            .queue
            .einreihen(nachricht.clone())
            .await
            .map_err(|e| TransportError::Warteschlange(e.to_string()))?;
        self.metrics.nachrichten_eingereiht.inc();
        self.metrics
            .warteschlange_laenge
            .set(self.queue.len().await as i64);
        tracing::info!(
            peer = %nachricht.recipient_id,
            id = %eintrag.id,
            grund = %grund,
            "Nachricht offline eingereiht"
        );

        Ok(SendeAntwort {
            success: true,
            message_id: Some(format!("offline_{}", Utc::now().timestamp_millis())),
            created_at: Some(nachricht.created_at.to_rfc3339()),
            offline: true,
        })
    }
}
