//! fluesterpost-core – Gemeinsame Typen und Ereignisse
//!
//! Dieses Crate stellt die Bausteine bereit, die vom Krypto-Crate, vom
//! Client-Kern und vom Agent gemeinsam genutzt werden.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::KernEvent;
pub use types::PeerId;
