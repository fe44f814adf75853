//! Test-Doubles: skriptbarer Transport und Kontext-Fabrik

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fluesterpost_core::PeerId;
use fluesterpost_crypto::{PublicKey, X25519XChaCha20Suite};
use fluesterpost_observability::FluesterpostMetrics;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::kontext::E2eeKontext;
use crate::retry::RetryPolicy;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{
    OutboundMessage, PeerKeyAntwort, SendeAntwort, TransportClient, TransportError,
    TransportResult, VeroeffentlichungsAntwort,
};

/// Schluessel-Verzeichnis des simulierten Servers, von mehreren Clients geteilt
pub type ServerVerzeichnis = Arc<DashMap<String, String>>;

/// Haelt die naechste angenommene Nachricht an, bevor die Antwort zurueckgeht
#[derive(Clone, Default)]
pub struct SendeTor {
    /// Wird benachrichtigt, sobald der Server die Nachricht angenommen hat
    pub erreicht: Arc<Notify>,
    /// Gibt die Antwort frei
    pub weiter: Arc<Notify>,
}

/// Transport ohne Netzwerk, dessen Verhalten der Test steuert
///
/// Jeder Aufruf gibt einmal an den Scheduler ab, damit nebenlaeufige
/// Aufrufe in `tokio::join!` tatsaechlich verschraenkt laufen.
pub struct SkriptTransport {
    eigene_id: Option<String>,
    verzeichnis: ServerVerzeichnis,
    upload_fehler: AtomicU32,
    senden_gestoert: AtomicBool,
    gesperrte_empfaenger: Mutex<HashSet<String>>,
    key_abrufe: AtomicUsize,
    uploads: AtomicUsize,
    sendeversuche: AtomicUsize,
    gesendet: Mutex<Vec<OutboundMessage>>,
    sende_tor: Mutex<Option<SendeTor>>,
}

impl SkriptTransport {
    pub fn neu() -> Self {
        Self::gemeinsam(None, Arc::new(DashMap::new()))
    }

    /// Transport fuer Client `eigene_id` an einem geteilten Server
    pub fn gemeinsam(eigene_id: Option<&str>, verzeichnis: ServerVerzeichnis) -> Self {
        Self {
            eigene_id: eigene_id.map(str::to_string),
            verzeichnis,
            upload_fehler: AtomicU32::new(0),
            senden_gestoert: AtomicBool::new(false),
            gesperrte_empfaenger: Mutex::new(HashSet::new()),
            key_abrufe: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            sendeversuche: AtomicUsize::new(0),
            gesendet: Mutex::new(Vec::new()),
            sende_tor: Mutex::new(None),
        }
    }

    pub fn peer_key_setzen(&self, id: &str, key: &PublicKey) {
        self.peer_key_roh_setzen(id, &key.to_base64());
    }

    pub fn peer_key_roh_setzen(&self, id: &str, kodiert: &str) {
        self.verzeichnis.insert(id.to_string(), kodiert.to_string());
    }

    /// Die naechsten `anzahl` Uploads scheitern (`u32::MAX` = immer)
    pub fn upload_fehlschlagen_lassen(&self, anzahl: u32) {
        self.upload_fehler.store(anzahl, Ordering::SeqCst);
    }

    pub fn senden_stoeren(&self, gestoert: bool) {
        self.senden_gestoert.store(gestoert, Ordering::SeqCst);
    }

    /// Nachrichten an diesen Empfaenger lehnt der Server mit 503 ab
    pub fn empfaenger_sperren(&self, id: &str, gesperrt: bool) {
        let mut gesperrte = self.gesperrte_empfaenger.lock();
        if gesperrt {
            gesperrte.insert(id.to_string());
        } else {
            gesperrte.remove(id);
        }
    }

    /// Die naechste angenommene Nachricht wartet auf `SendeTor::weiter`
    pub fn sende_tor_setzen(&self) -> SendeTor {
        let tor = SendeTor::default();
        *self.sende_tor.lock() = Some(tor.clone());
        tor
    }

    pub fn key_abrufe(&self) -> usize {
        self.key_abrufe.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn sendeversuche(&self) -> usize {
        self.sendeversuche.load(Ordering::SeqCst)
    }

    /// Vom Server angenommene Nachrichten in Empfangsreihenfolge
    pub fn gesendet(&self) -> Vec<OutboundMessage> {
        self.gesendet.lock().clone()
    }
}

#[async_trait]
impl TransportClient for SkriptTransport {
    async fn public_key_hochladen(&self, key: &PublicKey) -> TransportResult<VeroeffentlichungsAntwort> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let verbleibend = self.upload_fehler.load(Ordering::SeqCst);
        if verbleibend > 0 {
            if verbleibend != u32::MAX {
                self.upload_fehler.store(verbleibend - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Netzwerk("Verbindung zurueckgesetzt".into()));
        }
        if let Some(id) = &self.eigene_id {
            self.verzeichnis.insert(id.clone(), key.to_base64());
        }
        Ok(VeroeffentlichungsAntwort {
            success: true,
            offline: false,
        })
    }

    async fn peer_key_abrufen(&self, peer: &PeerId) -> TransportResult<PeerKeyAntwort> {
        self.key_abrufe.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(PeerKeyAntwort {
            public_key: self.verzeichnis.get(peer.as_str()).map(|k| k.value().clone()),
            offline: false,
        })
    }

    async fn nachricht_senden(&self, nachricht: &OutboundMessage) -> TransportResult<SendeAntwort> {
        let nummer = self.sendeversuche.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;

        if self.senden_gestoert.load(Ordering::SeqCst) {
            return Err(TransportError::Netzwerk("Verbindung abgelehnt".into()));
        }
        if self
            .gesperrte_empfaenger
            .lock()
            .contains(nachricht.recipient_id.as_str())
        {
            return Err(TransportError::Server {
                status: 503,
                nachricht: "Service Unavailable".into(),
            });
        }
        self.gesendet.lock().push(nachricht.clone());

        let tor = self.sende_tor.lock().take();
        if let Some(tor) = tor {
            tor.erreicht.notify_one();
            tor.weiter.notified().await;
        }
        Ok(SendeAntwort {
            success: true,
            message_id: Some(nummer.to_string()),
            created_at: Some(Utc::now().to_rfc3339()),
            offline: false,
        })
    }
}

/// Kontext mit MemoryStore, Standard-Suite und Standard-Wiederholung
pub async fn kontext(transport: Arc<SkriptTransport>) -> E2eeKontext {
    kontext_mit_store(transport, Arc::new(MemoryStore::new())).await
}

pub async fn kontext_mit_store(
    transport: Arc<SkriptTransport>,
    store: Arc<dyn KeyValueStore>,
) -> E2eeKontext {
    E2eeKontext::neu(
        transport,
        store,
        Arc::new(X25519XChaCha20Suite),
        RetryPolicy::default(),
        Arc::new(FluesterpostMetrics::neu().expect("Metriken")),
    )
    .await
    .expect("Kontext konnte nicht gebaut werden")
}

/// Initialisierter Client an einem gegebenen Server
///
/// Ohne `eigene_id` landet der eigene Key nie im Server-Verzeichnis.
pub async fn client_am_server(
    eigene_id: Option<&str>,
    server: &ServerVerzeichnis,
) -> (E2eeKontext, Arc<SkriptTransport>) {
    let transport = Arc::new(SkriptTransport::gemeinsam(eigene_id, server.clone()));
    let ctx = kontext(transport.clone()).await;
    assert!(ctx.initialisierung_sicherstellen().await);
    (ctx, transport)
}

/// Zwei initialisierte Clients `a` und `b` an einem gemeinsamen Server
pub async fn zwei_clients() -> (
    (E2eeKontext, Arc<SkriptTransport>),
    (E2eeKontext, Arc<SkriptTransport>),
) {
    let server: ServerVerzeichnis = Arc::new(DashMap::new());
    let a = client_am_server(Some("a"), &server).await;
    let b = client_am_server(Some("b"), &server).await;
    (a, b)
}
