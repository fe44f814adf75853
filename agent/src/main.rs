//! Fluesterpost Agent – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Agent.

use anyhow::Result;
use fluesterpost_agent::Agent;
use fluesterpost_client::ClientConfig;
use fluesterpost_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("FLUESTERPOST_CONFIG").unwrap_or_else(|_| "fluesterpost.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Fluesterpost Agent wird initialisiert"
    );

    let agent = Agent::neu(config).await?;
    agent.starten().await?;

    Ok(())
}
