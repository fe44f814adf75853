//! Persistenz des eigenen Langzeit-Schluessel-Paars
//!
//! Gespeichertes Format (JSON unter `fp.keypair`):
//! ```text
//! {"publicKey": "<base64>", "secretKey": "<base64>", "updatedAt": "<RFC 3339>"}
//! ```
//! Der private Schluessel verlaesst nur in dieser Form den Prozess, und nur
//! Richtung lokaler Speicher.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use fluesterpost_crypto::{keypair_pruefen, CipherSuite, KeyPair, PublicKey, SCHLUESSEL_LAENGE};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{ClientError, ClientResult};
use crate::storage::KeyValueStore;

pub(crate) const KEYPAIR_SCHLUESSEL: &str = "fp.keypair";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GespeichertesPaar {
    public_key: String,
    secret_key: String,
    updated_at: DateTime<Utc>,
}

/// Laedt, erzeugt und speichert das Schluessel-Paar des lokalen Clients
#[derive(Clone)]
pub struct KeyStore {
    store: Arc<dyn KeyValueStore>,
}

impl KeyStore {
    pub fn neu(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Erzeugt ein neues Paar mit frischer Entropie
    pub fn generieren(&self, suite: &dyn CipherSuite) -> ClientResult<KeyPair> {
        suite
            .generate_keypair()
            .map_err(|e| ClientError::SchluesselGenerierung(e.to_string()))
    }

    /// Speichert das Paar (ersetzt ein vorhandenes als Ganzes)
    pub async fn speichern(&self, pair: &KeyPair) -> ClientResult<()> {
        let gespeichert = GespeichertesPaar {
            public_key: pair.public_key.to_base64(),
            secret_key: B64.encode(pair.secret_key().as_bytes()),
            updated_at: pair.updated_at,
        };
        let json = serde_json::to_string(&gespeichert)?;
        self.store.set(KEYPAIR_SCHLUESSEL, &json).await?;
        tracing::info!(public_key = ?pair.public_key, "Schluessel-Paar gespeichert");
        Ok(())
    }

    /// Laedt ein gespeichertes Paar
    ///
    /// Liefert `None` wenn keines existiert oder das gespeicherte unlesbar
    /// ist. Der Aufrufer erzeugt dann ein neues.
    pub async fn laden(&self) -> Option<KeyPair> {
        let json = match self.store.get(KEYPAIR_SCHLUESSEL).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(fehler = %e, "Schluessel-Speicher nicht lesbar");
                return None;
            }
        };

        match Self::dekodieren(&json) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!(fehler = %e, "Gespeichertes Schluessel-Paar verworfen");
                None
            }
        }
    }

    fn dekodieren(json: &str) -> ClientResult<KeyPair> {
        let gespeichert: GespeichertesPaar = serde_json::from_str(json)?;
        let public_key = PublicKey::from_base64(&gespeichert.public_key)?;

        let secret_bytes = Zeroizing::new(
            B64.decode(gespeichert.secret_key.trim())
                .map_err(fluesterpost_crypto::CryptoError::from)?,
        );
        let secret: Zeroizing<[u8; SCHLUESSEL_LAENGE]> =
            Zeroizing::new(secret_bytes.as_slice().try_into().map_err(|_| {
                fluesterpost_crypto::CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: secret_bytes.len(),
                }
            })?);

        let pair = KeyPair::new(public_key, *secret, gespeichert.updated_at);
        keypair_pruefen(&pair)?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use fluesterpost_crypto::X25519XChaCha20Suite;

    fn keystore() -> (KeyStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (KeyStore::neu(store.clone()), store)
    }

    #[tokio::test]
    async fn laden_ohne_paar_liefert_none() {
        let (ks, _) = keystore();
        assert!(ks.laden().await.is_none());
    }

    #[tokio::test]
    async fn speichern_und_laden() {
        let (ks, _) = keystore();
        let pair = ks.generieren(&X25519XChaCha20Suite).unwrap();
        ks.speichern(&pair).await.unwrap();

        let geladen = ks.laden().await.unwrap();
        assert_eq!(geladen.public_key, pair.public_key);
        assert_eq!(geladen.secret_key().as_bytes(), pair.secret_key().as_bytes());
        assert_eq!(geladen.updated_at, pair.updated_at);
    }

    #[tokio::test]
    async fn gespeichertes_format_nutzt_camel_case() {
        let (ks, store) = keystore();
        let pair = ks.generieren(&X25519XChaCha20Suite).unwrap();
        ks.speichern(&pair).await.unwrap();

        let json = store.get(KEYPAIR_SCHLUESSEL).await.unwrap().unwrap();
        let wert: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(wert.get("publicKey").is_some());
        assert!(wert.get("secretKey").is_some());
        assert!(wert.get("updatedAt").is_some());
    }

    #[tokio::test]
    async fn kaputter_eintrag_liefert_none() {
        let (ks, store) = keystore();
        store.set(KEYPAIR_SCHLUESSEL, "{nicht json").await.unwrap();
        assert!(ks.laden().await.is_none());

        store
            .set(
                KEYPAIR_SCHLUESSEL,
                r#"{"publicKey":"AAAA","secretKey":"AAAA","updatedAt":"2024-01-01T00:00:00Z"}"#,
            )
            .await
            .unwrap();
        assert!(ks.laden().await.is_none());
    }

    #[tokio::test]
    async fn inkonsistentes_paar_wird_verworfen() {
        let (ks, store) = keystore();
        let a = ks.generieren(&X25519XChaCha20Suite).unwrap();
        let b = ks.generieren(&X25519XChaCha20Suite).unwrap();

        let json = serde_json::json!({
            "publicKey": b.public_key.to_base64(),
            "secretKey": B64.encode(a.secret_key().as_bytes()),
            "updatedAt": Utc::now(),
        });
        store
            .set(KEYPAIR_SCHLUESSEL, &json.to_string())
            .await
            .unwrap();
        assert!(ks.laden().await.is_none());
    }

    #[tokio::test]
    async fn generierte_paare_sind_unabhaengig() {
        let (ks, _) = keystore();
        let a = ks.generieren(&X25519XChaCha20Suite).unwrap();
        let b = ks.generieren(&X25519XChaCha20Suite).unwrap();
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.secret_key().as_bytes(), b.secret_key().as_bytes());
    }
}
