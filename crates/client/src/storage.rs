//! Dauerhafter lokaler Key-Value-Speicher
//!
//! Das `KeyValueStore`-Trait abstrahiert den konkreten Speicher. Der Kern
//! legt darin das eigene Schluessel-Paar, den Peer-Key-Cache und die
//! Offline-Warteschlange ab, damit ein Neustart im Offline-Zustand nichts
//! verliert.

use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;

use crate::error::{ClientError, ClientResult};

/// Abstrakter Key-Value-Speicher (Werte sind UTF-8-Strings, meist JSON)
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Wert lesen; `None` wenn der Schluessel nicht existiert
    async fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Wert atomar ersetzen
    async fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Wert loeschen (nicht vorhandene Schluessel sind kein Fehler)
    async fn remove(&self, key: &str) -> ClientResult<()>;
}

/// Disk-basierter Speicher
///
/// Jeder Schluessel liegt in `verzeichnis/<key>.json`. Schreiben erfolgt
/// ueber eine temporaere Datei und `rename`, ein halb geschriebener Wert ist
/// fuer `get` nie sichtbar.
#[derive(Debug, Clone)]
pub struct DiskStore {
    verzeichnis: PathBuf,
}

impl DiskStore {
    /// Neuer DiskStore mit dem angegebenen Basisverzeichnis
    pub fn new(verzeichnis: impl Into<PathBuf>) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
        }
    }

    fn pfad(&self, key: &str) -> ClientResult<PathBuf> {
        let gueltig = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !gueltig {
            return Err(ClientError::Speicher(format!(
                "ungueltiger Speicher-Schluessel: '{key}'"
            )));
        }
        Ok(self.verzeichnis.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for DiskStore {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let pfad = self.pfad(key)?;
        match tokio::fs::read_to_string(&pfad).await {
            Ok(inhalt) => Ok(Some(inhalt)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let pfad = self.pfad(key)?;
        tokio::fs::create_dir_all(&self.verzeichnis).await?;

        let tmp = pfad.with_extension("json.tmp");
        let mut datei = tokio::fs::File::create(&tmp).await?;
        datei.write_all(value.as_bytes()).await?;
        datei.sync_all().await?;
        drop(datei);

        tokio::fs::rename(&tmp, &pfad).await?;
        tracing::debug!(pfad = %pfad.display(), bytes = value.len(), "Wert gespeichert");
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        let pfad = self.pfad(key)?;
        match tokio::fs::remove_file(&pfad).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fluechtiger Speicher fuer Tests und kurzlebige Kontexte
#[derive(Debug, Default)]
pub struct MemoryStore {
    werte: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.werte.len()
    }

    pub fn is_empty(&self) -> bool {
        self.werte.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.werte.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.werte.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        self.werte.remove(key);
        Ok(())
    }
}
