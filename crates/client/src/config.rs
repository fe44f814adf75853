//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use std::time::Duration;

use fluesterpost_crypto::SuiteArt;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::retry::{Backoff, RetryPolicy};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat-Server
    pub server: ServerEinstellungen,
    /// Lokaler Speicher fuer Schluessel und Warteschlange
    pub speicher: SpeicherEinstellungen,
    /// Wiederholung beim Key-Upload
    pub wiederholung: WiederholungsEinstellungen,
    /// Periodischer Sync
    pub synchronisation: SyncEinstellungen,
    /// Cipher-Suite
    pub krypto: KryptoEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Basis-URL der REST-API, ohne abschliessenden Schraegstrich
    pub basis_url: String,
    /// Zeitlimit pro Anfrage in Millisekunden
    pub timeout_ms: u64,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            basis_url: "http://127.0.0.1:5000".into(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeicherEinstellungen {
    /// Verzeichnis fuer den DiskStore
    pub verzeichnis: String,
}

impl Default for SpeicherEinstellungen {
    fn default() -> Self {
        Self {
            verzeichnis: "fluesterpost-daten".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WiederholungsEinstellungen {
    pub max_versuche: u32,
    pub basis_verzoegerung_ms: u64,
    pub backoff: Backoff,
}

impl Default for WiederholungsEinstellungen {
    fn default() -> Self {
        Self {
            max_versuche: 3,
            basis_verzoegerung_ms: 2000,
            backoff: Backoff::Linear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncEinstellungen {
    /// Abstand zwischen periodischen Syncs in Sekunden (0 = nur bei Reconnect)
    pub intervall_sek: u64,
    /// Abstand zwischen Durchlaeufen des Entschluesselungs-Puffers
    pub pending_decrypt_intervall_sek: u64,
}

impl Default for SyncEinstellungen {
    fn default() -> Self {
        Self {
            intervall_sek: 60,
            pending_decrypt_intervall_sek: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    pub suite: SuiteArt,
    /// Muss zusaetzlich gesetzt sein, damit `integrity-only` startet
    pub unsichere_suite_erlauben: bool,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> ClientResult<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt).map_err(|e| {
                    ClientError::Konfiguration(format!("Konfigurationsfehler in '{pfad}': {e}"))
                })?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(ClientError::Konfiguration(format!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            ))),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> ClientResult<()> {
        if self.server.basis_url.trim().is_empty() {
            return Err(ClientError::Konfiguration("server.basis_url ist leer".into()));
        }
        if self.wiederholung.max_versuche == 0 {
            return Err(ClientError::Konfiguration(
                "wiederholung.max_versuche muss mindestens 1 sein".into(),
            ));
        }
        if self.speicher.verzeichnis.trim().is_empty() {
            return Err(ClientError::Konfiguration("speicher.verzeichnis ist leer".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_versuche: self.wiederholung.max_versuche,
            basis_verzoegerung: Duration::from_millis(self.wiederholung.basis_verzoegerung_ms),
            backoff: self.wiederholung.backoff,
        }
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.wiederholung.max_versuche, 3);
        assert_eq!(cfg.krypto.suite, SuiteArt::X25519XChaCha20Poly1305);
        assert!(!cfg.krypto.unsichere_suite_erlauben);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            basis_url = "https://chat.example.org"

            [wiederholung]
            backoff = "exponentiell"

            [krypto]
            suite = "integrity-only"
            unsichere_suite_erlauben = true
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.basis_url, "https://chat.example.org");
        assert_eq!(cfg.wiederholung.backoff, Backoff::Exponentiell);
        assert_eq!(cfg.krypto.suite, SuiteArt::IntegrityOnly);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.timeout_ms, 10_000);
        assert_eq!(cfg.wiederholung.max_versuche, 3);
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ClientConfig::laden("/gibt/es/nicht/fluesterpost.toml").unwrap();
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn null_versuche_sind_ungueltig() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("fp.toml");
        std::fs::write(&pfad, "[wiederholung]\nmax_versuche = 0\n").unwrap();
        let result = ClientConfig::laden(pfad.to_str().unwrap());
        assert!(matches!(result, Err(ClientError::Konfiguration(_))));
    }
}
