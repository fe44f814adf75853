//! Prometheus-kompatible Metriken fuer Fluesterpost
//!
//! Registrierte Metriken:
//! - `fluesterpost_offline_messages_queued_total` – Counter: Offline eingereihte Nachrichten
//! - `fluesterpost_offline_messages_synced_total` – Counter: Nachgelieferte Nachrichten
//! - `fluesterpost_offline_queue_length` – Gauge: Aktuelle Laenge der Warteschlange
//! - `fluesterpost_sync_passes_total` – Counter: Sync-Durchlaeufe (result = ok/skipped)
//! - `fluesterpost_pending_decrypts` – Gauge: Zurueckgestellte Entschluesselungen
//! - `fluesterpost_decrypts_recovered_total` – Counter: Nachtraeglich entschluesselt
//! - `fluesterpost_key_publication_failures_total` – Counter: Fehlgeschlagene Key-Uploads
//! - `fluesterpost_peer_key_fetches_total` – Counter: Peer-Key-Abrufe beim Server

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Fluesterpost-Prometheus-Metriken
///
/// Jede Instanz hat eine eigene Registry, mehrere Kontexte im selben
/// Prozess kollidieren daher nicht.
#[derive(Clone)]
pub struct FluesterpostMetrics {
    pub registry: Arc<Registry>,

    // Offline-Warteschlange
    pub nachrichten_eingereiht: IntCounter,
    pub nachrichten_nachgeliefert: IntCounter,
    pub warteschlange_laenge: IntGauge,
    pub sync_durchlaeufe: IntCounterVec,

    // Entschluesselung
    pub ausstehende_entschluesselungen: IntGauge,
    pub entschluesselungen_nachgeholt: IntCounter,

    // Schluessel
    pub veroeffentlichung_fehlgeschlagen: IntCounter,
    pub peer_key_abrufe: IntCounter,
}

impl FluesterpostMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let nachrichten_eingereiht = IntCounter::with_opts(Opts::new(
            "fluesterpost_offline_messages_queued_total",
            "Nachrichten, die wegen fehlender Verbindung eingereiht wurden",
        ))?;
        registry.register(Box::new(nachrichten_eingereiht.clone()))?;

        let nachrichten_nachgeliefert = IntCounter::with_opts(Opts::new(
            "fluesterpost_offline_messages_synced_total",
            "Eingereihte Nachrichten, die der Server bestaetigt hat",
        ))?;
        registry.register(Box::new(nachrichten_nachgeliefert.clone()))?;

        let warteschlange_laenge = IntGauge::with_opts(Opts::new(
            "fluesterpost_offline_queue_length",
            "Aktuelle Laenge der Offline-Warteschlange",
        ))?;
        registry.register(Box::new(warteschlange_laenge.clone()))?;

        let sync_durchlaeufe = IntCounterVec::new(
            Opts::new("fluesterpost_sync_passes_total", "Sync-Durchlaeufe"),
            &["result"],
        )?;
        registry.register(Box::new(sync_durchlaeufe.clone()))?;

        let ausstehende_entschluesselungen = IntGauge::with_opts(Opts::new(
            "fluesterpost_pending_decrypts",
            "Nachrichten, die auf eine Session warten",
        ))?;
        registry.register(Box::new(ausstehende_entschluesselungen.clone()))?;

        let entschluesselungen_nachgeholt = IntCounter::with_opts(Opts::new(
            "fluesterpost_decrypts_recovered_total",
            "Zurueckgestellte Nachrichten, die spaeter entschluesselt wurden",
        ))?;
        registry.register(Box::new(entschluesselungen_nachgeholt.clone()))?;

        let veroeffentlichung_fehlgeschlagen = IntCounter::with_opts(Opts::new(
            "fluesterpost_key_publication_failures_total",
            "Public-Key-Uploads, die nach allen Versuchen gescheitert sind",
        ))?;
        registry.register(Box::new(veroeffentlichung_fehlgeschlagen.clone()))?;

        let peer_key_abrufe = IntCounter::with_opts(Opts::new(
            "fluesterpost_peer_key_fetches_total",
            "Peer-Key-Abrufe, die nicht aus dem Cache bedient wurden",
        ))?;
        registry.register(Box::new(peer_key_abrufe.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            nachrichten_eingereiht,
            nachrichten_nachgeliefert,
            warteschlange_laenge,
            sync_durchlaeufe,
            ausstehende_entschluesselungen,
            entschluesselungen_nachgeholt,
            veroeffentlichung_fehlgeschlagen,
            peer_key_abrufe,
        })
    }

    /// Sync-Durchlauf zaehlen (`ok` oder `skipped`)
    pub fn sync_zaehlen(&self, ergebnis: &str) {
        self.sync_durchlaeufe.with_label_values(&[ergebnis]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
