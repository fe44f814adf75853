//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

/// Laenge oeffentlicher und privater X25519-Schluessel sowie des Session-Schluessels
pub const SCHLUESSEL_LAENGE: usize = 32;
/// Laenge der XChaCha20-Nonce
pub const NONCE_LAENGE: usize = 24;
/// Laenge des Poly1305-Auth-Tags
pub const TAG_LAENGE: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

impl Zeroize for SecretBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Kopiert den Inhalt in ein 32-Byte-Array (fuer X25519)
    pub(crate) fn als_schluessel_array(&self) -> CryptoResult<[u8; SCHLUESSEL_LAENGE]> {
        self.0
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                erwartet: SCHLUESSEL_LAENGE,
                erhalten: self.0.len(),
            })
    }
}

/// Oeffentlicher X25519-Schluessel (32 Bytes)
///
/// Auf dem Draht und im Speicher immer Base64 (Standard-Alphabet, mit Padding).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; SCHLUESSEL_LAENGE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; SCHLUESSEL_LAENGE]) -> Self {
        Self(bytes)
    }

    /// Prueft die Laenge; alles ausser exakt 32 Bytes ist ein Formatfehler
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SCHLUESSEL_LAENGE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = B64.decode(encoded.trim())?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b64 = self.to_base64();
        write!(f, "PublicKey({}..)", &b64[..8])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Langzeit-Schluessel-Paar des lokalen Clients
///
/// Wird nie in-place veraendert, nur als Ganzes ersetzt. Der private
/// Schluessel verlaesst das Geraet nicht.
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    secret_key: SecretBytes,
    pub updated_at: DateTime<Utc>,
}

impl KeyPair {
    pub fn new(
        public_key: PublicKey,
        secret_key: [u8; SCHLUESSEL_LAENGE],
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            public_key,
            secret_key: SecretBytes::new(secret_key.to_vec()),
            updated_at,
        }
    }

    pub fn secret_key(&self) -> &SecretBytes {
        &self.secret_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("secret_key", &self.secret_key)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Abgeleiteter symmetrischer Session-Schluessel fuer genau einen Peer
#[derive(Debug, Clone)]
pub struct SessionKey(SecretBytes);

impl SessionKey {
    pub fn new(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != SCHLUESSEL_LAENGE {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: SCHLUESSEL_LAENGE,
                erhalten: bytes.len(),
            });
        }
        Ok(Self(SecretBytes::new(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Eine 24-Byte-Nonce (Number used once)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LAENGE]);

impl Nonce {
    /// Erzeugt eine frische Nonce aus dem OS-CSPRNG
    pub fn zufaellig() -> CryptoResult<Self> {
        let mut bytes = [0u8; NONCE_LAENGE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Verschluesselung(format!("RNG nicht verfuegbar: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; NONCE_LAENGE] =
            bytes.try_into().map_err(|_| CryptoError::UngueltigeNonce {
                erwartet: NONCE_LAENGE,
                erhalten: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LAENGE] {
        &self.0
    }
}

/// Verschluesselte Direktnachricht (Ciphertext + Nonce + optional Absender-Key)
///
/// Wire-Format (JSON, alle Felder Base64):
/// ```text
/// {"ciphertext": "...", "nonce": "...", "sender_public_key": "..." | null}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeWire", into = "EnvelopeWire")]
pub struct EncryptedEnvelope {
    /// Ciphertext inkl. 16 Bytes Auth-Tag (angehaengt)
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
    pub sender_public_key: Option<PublicKey>,
}

impl EncryptedEnvelope {
    /// Serialisiert fuer das `content`-Feld einer Direktnachricht
    pub fn to_json(&self) -> String {
        // Alle Felder sind Strings, die Serialisierung kann nicht fehlschlagen
        serde_json::to_string(&EnvelopeWire::from(self.clone())).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json).map_err(|e| CryptoError::UngueltigeDaten(e.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct EnvelopeWire {
    ciphertext: String,
    nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_public_key: Option<String>,
}

impl From<EncryptedEnvelope> for EnvelopeWire {
    fn from(envelope: EncryptedEnvelope) -> Self {
        Self {
            ciphertext: B64.encode(&envelope.ciphertext),
            nonce: B64.encode(envelope.nonce.as_bytes()),
            sender_public_key: envelope.sender_public_key.map(|k| k.to_base64()),
        }
    }
}

impl TryFrom<EnvelopeWire> for EncryptedEnvelope {
    type Error = CryptoError;

    fn try_from(wire: EnvelopeWire) -> CryptoResult<Self> {
        let ciphertext = B64.decode(&wire.ciphertext)?;
        if ciphertext.len() < TAG_LAENGE {
            return Err(CryptoError::UngueltigeDaten(format!(
                "Ciphertext zu kurz: {} Bytes",
                ciphertext.len()
            )));
        }
        let nonce = Nonce::from_slice(&B64.decode(&wire.nonce)?)?;
        let sender_public_key = wire
            .sender_public_key
            .as_deref()
            .map(PublicKey::from_base64)
            .transpose()?;
        Ok(Self {
            ciphertext,
            nonce,
            sender_public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_falsche_laenge() {
        let result = PublicKey::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 32,
                erhalten: 31
            })
        ));
    }

    #[test]
    fn public_key_base64() {
        let key = PublicKey::from_bytes([7u8; 32]);
        let restored = PublicKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn public_key_ungueltiges_base64() {
        assert!(matches!(
            PublicKey::from_base64("kein base64!"),
            Err(CryptoError::Base64(_))
        ));
    }

    #[test]
    fn secret_bytes_debug_ist_redigiert() {
        let secret = SecretBytes::new(vec![0xAB; 32]);
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn secret_bytes_werden_genullt() {
        let mut secret = SecretBytes::new(vec![0xAB; 32]);
        secret.zeroize();
        assert!(secret.is_empty());
        assert!(secret.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn keypair_debug_verraet_keinen_privaten_schluessel() {
        let pair = KeyPair::new(PublicKey::from_bytes([1u8; 32]), [0x5Au8; 32], Utc::now());
        let debug = format!("{:?}", pair);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("90, 90"));
    }

    #[test]
    fn nonces_sind_verschieden() {
        let a = Nonce::zufaellig().unwrap();
        let b = Nonce::zufaellig().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn nonce_falsche_laenge() {
        assert!(matches!(
            Nonce::from_slice(&[0u8; 12]),
            Err(CryptoError::UngueltigeNonce {
                erwartet: 24,
                erhalten: 12
            })
        ));
    }

    #[test]
    fn session_key_braucht_32_bytes() {
        assert!(SessionKey::new(vec![0u8; 16]).is_err());
        assert!(SessionKey::new(vec![0u8; 32]).is_ok());
    }

    #[test]
    fn envelope_json_validiert_nonce() {
        let json = r#"{"ciphertext":"AAAAAAAAAAAAAAAAAAAAAA==","nonce":"AAAA"}"#;
        assert!(matches!(
            EncryptedEnvelope::from_json(json),
            Err(CryptoError::UngueltigeDaten(_))
        ));
    }

    #[test]
    fn envelope_json_ohne_absender() {
        let envelope = EncryptedEnvelope {
            ciphertext: vec![9u8; 20],
            nonce: Nonce::from_slice(&[3u8; 24]).unwrap(),
            sender_public_key: None,
        };
        let json = envelope.to_json();
        assert!(!json.contains("sender_public_key"));
        assert_eq!(EncryptedEnvelope::from_json(&json).unwrap(), envelope);
    }
}
