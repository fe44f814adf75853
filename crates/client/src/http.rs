//! HTTP-Implementierung von `TransportClient` (reqwest)

use std::time::Duration;

use async_trait::async_trait;
use fluesterpost_core::PeerId;
use fluesterpost_crypto::PublicKey;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};
use crate::transport::{
    OutboundMessage, PeerKeyAntwort, SendeAntwort, TransportClient, TransportError,
    TransportResult, VeroeffentlichungsAntwort,
};

/// Maximale Laenge des Fehlertexts aus einer Server-Antwort
const MAX_FEHLERTEXT: usize = 200;

/// Verbindung zum Chat-Server ueber dessen REST-API
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    basis_url: String,
}

impl HttpTransport {
    pub fn neu(basis_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fluesterpost/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Konfiguration(format!("HTTP-Client: {e}")))?;
        Ok(Self {
            client,
            basis_url: basis_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, pfad: &str) -> String {
        format!("{}{}", self.basis_url, pfad)
    }

    async fn auswerten<T: DeserializeOwned>(antwort: reqwest::Response) -> TransportResult<T> {
        let status = antwort.status();
        if !status.is_success() {
            let mut nachricht = antwort.text().await.unwrap_or_default();
            if nachricht.len() > MAX_FEHLERTEXT {
                let mut ende = MAX_FEHLERTEXT;
                while !nachricht.is_char_boundary(ende) {
                    ende -= 1;
                }
                nachricht.truncate(ende);
            }
            return Err(TransportError::Server {
                status: status.as_u16(),
                nachricht,
            });
        }
        antwort
            .json::<T>()
            .await
            .map_err(|e| TransportError::Dekodierung(e.to_string()))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Zeitlimit
        } else if e.is_decode() {
            TransportError::Dekodierung(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Server {
                status: status.as_u16(),
                nachricht: e.to_string(),
            }
        } else {
            TransportError::Netzwerk(e.to_string())
        }
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn public_key_hochladen(&self, key: &PublicKey) -> TransportResult<VeroeffentlichungsAntwort> {
        let antwort = self
            .client
            .post(self.url("/api/crypto/store_public_key"))
            .json(&serde_json::json!({ "public_key": key.to_base64() }))
            .send()
            .await?;
        Self::auswerten(antwort).await
    }

    async fn peer_key_abrufen(&self, peer: &PeerId) -> TransportResult<PeerKeyAntwort> {
        let antwort = self
            .client
            .get(self.url(&format!("/api/users/{}/public_key", peer.as_str())))
            .send()
            .await?;
        if antwort.status() == StatusCode::NO_CONTENT {
            return Ok(PeerKeyAntwort {
                public_key: None,
                offline: false,
            });
        }
        Self::auswerten(antwort).await
    }

    async fn nachricht_senden(&self, nachricht: &OutboundMessage) -> TransportResult<SendeAntwort> {
        let antwort = self
            .client
            .post(self.url("/api/direct_messages/send"))
            .json(nachricht)
            .send()
            .await?;
        Self::auswerten(antwort).await
    }
}
