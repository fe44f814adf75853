//! fluesterpost-client – E2EE-Kern mit Offline-Faehigkeit
//!
//! Dieses Crate implementiert:
//! - KeyStore: eigenes Schluessel-Paar laden, erzeugen, sichern
//! - PeerDirectory: Peer-Keys vom Server mit dauerhaftem Cache
//! - SessionManager: Session-Keys pro Peer, Ver- und Entschluesselung
//! - PublicationService: Upload des eigenen Public Keys mit Wiederholung
//! - OfflineFallbackLayer + OutboundQueue: Offline-Betrieb mit Warteschlange
//! - SyncCoordinator: Nachlieferung nach Reconnect (single-flight)
//! - E2eeKontext: die oeffentliche Schnittstelle, die alles verdrahtet
//!
//! # Beispiel
//!
//! ```no_run
//! use fluesterpost_client::{ClientConfig, E2eeKontext, KlartextFreigabe};
//! use fluesterpost_core::PeerId;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::laden("fluesterpost.toml").unwrap();
//!     let kontext = E2eeKontext::aus_konfiguration(&config).await.unwrap();
//!     kontext.initialisierung_sicherstellen().await;
//!
//!     let antwort = kontext
//!         .nachricht_senden(&PeerId::new("42"), "Hallo", KlartextFreigabe::Verweigert)
//!         .await
//!         .unwrap();
//!     println!("offline eingereiht: {}", antwort.offline);
//! }
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod keystore;
pub mod kontext;
pub mod offline;
pub mod outbound_queue;
pub mod peer_directory;
pub mod pending_decrypt;
pub mod publication;
pub mod retry;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use config::ClientConfig;
pub use connectivity::{Connectivity, Uebergang};
pub use error::{ClientError, ClientResult};
pub use http::HttpTransport;
pub use keystore::KeyStore;
pub use kontext::{E2eeKontext, KlartextFreigabe};
pub use offline::OfflineFallbackLayer;
pub use outbound_queue::{OutboundQueue, QueueEintrag};
pub use peer_directory::{PeerDirectory, PeerKeyCache};
pub use pending_decrypt::{AusstehendeEntschluesselung, PendingDecryptBuffer};
pub use publication::{PublicationService, VeroeffentlichungsStatus};
pub use retry::{Backoff, RetryPolicy};
pub use session::{SessionManager, SessionZustand};
pub use storage::{DiskStore, KeyValueStore, MemoryStore};
pub use sync::{SyncBericht, SyncCoordinator, SyncErgebnis, UebersprungGrund};
pub use transport::{
    OutboundMessage, PeerKeyAntwort, SendeAntwort, TransportClient, TransportError,
    TransportResult, VeroeffentlichungsAntwort,
};
