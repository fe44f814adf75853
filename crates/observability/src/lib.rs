//! # fluesterpost-observability
//!
//! Observability-Crate fuer Fluesterpost:
//! - Prometheus-kompatible Zaehler fuer Warteschlange, Sync und Schluessel
//! - Structured JSON/Text Logging via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::FluesterpostMetrics;
