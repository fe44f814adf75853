//! Structured Logging Setup via tracing-subscriber
//!
//! Die Konfigurationsdatei liefert Level und Format, Umgebungsvariablen
//! haben Vorrang:
//! - `FP_LOG_LEVEL`: Filter-Direktive (z.B. `info`, `fluesterpost_client=debug`)
//! - `FP_LOG_FORMAT`: `text` oder `json`
//!
//! Schluesselmaterial wird nie geloggt; Peers erscheinen als `peer = %peer`.

use tracing_subscriber::{fmt, EnvFilter};

const ENV_LEVEL: &str = "FP_LOG_LEVEL";
const ENV_FORMAT: &str = "FP_LOG_FORMAT";

/// Initialisiert das globale Logging.
///
/// Ein zweiter Aufruf im selben Prozess ist wirkungslos und liefert `false`.
pub fn logging_initialisieren(level: &str, format: &str) -> bool {
    let filter = EnvFilter::try_from_env(ENV_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = log_format_aus_env().unwrap_or_else(|| format.to_string());

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.is_ok()
}

/// Log-Format aus `FP_LOG_FORMAT`, sofern gesetzt und gueltig
pub fn log_format_aus_env() -> Option<String> {
    std::env::var(ENV_FORMAT)
        .ok()
        .filter(|f| log_format_gueltig(f))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
