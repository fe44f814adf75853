//! Cipher-Suites (Capability-Interface)
//!
//! Die Suite wird genau einmal beim Start aus der Konfiguration gewaehlt und
//! in den Session-Manager injiziert. Zur Laufzeit wird nie geprueft, welche
//! Primitive "gerade verfuegbar" sind.
//!
//! | Suite | Vertraulichkeit | Integritaet |
//! |---|---|---|
//! | `X25519XChaCha20Suite` | ja | ja (Poly1305) |
//! | `IntegrityOnlySuite` | **nein** | ja (HMAC-SHA256-Tag) |

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::e2e::{derive_session_key, generate_static_keypair, open_xchacha, seal_xchacha};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedEnvelope, KeyPair, Nonce, PublicKey, SessionKey, TAG_LAENGE};

type HmacSha256 = Hmac<Sha256>;

/// Austauschbare Krypto-Faehigkeiten des E2EE-Kerns
pub trait CipherSuite: Send + Sync + std::fmt::Debug {
    /// Stabiler Name (fuer Logs und Konfiguration)
    fn name(&self) -> &'static str;

    /// `false` wenn Ciphertexte den Klartext offenlegen
    fn is_confidential(&self) -> bool;

    fn generate_keypair(&self) -> CryptoResult<KeyPair>;

    fn derive_session_key(&self, own: &KeyPair, peer_public: &PublicKey) -> CryptoResult<SessionKey>;

    /// Verschluesselt mit frisch erzeugter Nonce
    fn seal(&self, key: &SessionKey, plaintext: &[u8]) -> CryptoResult<(Nonce, Vec<u8>)>;

    /// Entschluesselt; Tag-Fehler ergeben `CryptoError::Authentifizierung`
    fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Einmal-Box an einen beliebigen Public Key, ohne Session
    ///
    /// Der Empfaenger braucht nur das Envelope: der eigene Public Key wird
    /// als Absender mitgeliefert.
    fn seal_to(
        &self,
        own: &KeyPair,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> CryptoResult<EncryptedEnvelope> {
        let key = self.derive_session_key(own, recipient)?;
        let (nonce, ciphertext) = self.seal(&key, plaintext)?;
        Ok(EncryptedEnvelope {
            ciphertext,
            nonce,
            sender_public_key: Some(own.public_key),
        })
    }

    /// Oeffnet eine Einmal-Box mit dem eigenen privaten Schluessel
    ///
    /// Authentisch ist der Inhalt nur gegenueber `sender`; wem dieser Key
    /// gehoert, muss der Aufrufer selbst wissen.
    fn open_from(
        &self,
        own: &KeyPair,
        sender: &PublicKey,
        nonce: &Nonce,
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let key = self.derive_session_key(own, sender)?;
        self.open(&key, nonce, ciphertext)
    }
}

/// Auswahl der Suite in der Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteArt {
    #[default]
    #[serde(rename = "x25519-xchacha20poly1305")]
    X25519XChaCha20Poly1305,
    IntegrityOnly,
}

/// Erstellt die konfigurierte Suite
///
/// `IntegrityOnly` wird nur mit ausdruecklicher Freigabe gebaut.
pub fn suite_waehlen(art: SuiteArt, unsicher_erlaubt: bool) -> CryptoResult<Arc<dyn CipherSuite>> {
    match art {
        SuiteArt::X25519XChaCha20Poly1305 => Ok(Arc::new(X25519XChaCha20Suite)),
        SuiteArt::IntegrityOnly if unsicher_erlaubt => {
            tracing::error!(
                suite = IntegrityOnlySuite::NAME,
                "UNSICHERE Cipher-Suite aktiv: Nachrichten sind NICHT vertraulich"
            );
            Ok(Arc::new(IntegrityOnlySuite))
        }
        SuiteArt::IntegrityOnly => Err(CryptoError::UnsichereSuiteNichtErlaubt(
            IntegrityOnlySuite::NAME.to_string(),
        )),
    }
}

/// Standard-Suite: X25519 + HKDF-SHA256 + XChaCha20-Poly1305
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519XChaCha20Suite;

impl CipherSuite for X25519XChaCha20Suite {
    fn name(&self) -> &'static str {
        "x25519-xchacha20poly1305"
    }

    fn is_confidential(&self) -> bool {
        true
    }

    fn generate_keypair(&self) -> CryptoResult<KeyPair> {
        generate_static_keypair()
    }

    fn derive_session_key(&self, own: &KeyPair, peer_public: &PublicKey) -> CryptoResult<SessionKey> {
        derive_session_key(own, peer_public)
    }

    fn seal(&self, key: &SessionKey, plaintext: &[u8]) -> CryptoResult<(Nonce, Vec<u8>)> {
        let nonce = Nonce::zufaellig()?;
        let ciphertext = seal_xchacha(plaintext, key, &nonce)?;
        Ok((nonce, ciphertext))
    }

    fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        open_xchacha(ciphertext, key, nonce)
    }
}

/// UNSICHER: Klartext + 16-Byte-Tag, keine Vertraulichkeit
///
/// Nur fuer Umgebungen ohne funktionierende AEAD-Implementierung. Die
/// Schluesselvereinbarung ist echt, der Tag (HMAC-SHA256 ueber Nonce und
/// Klartext, auf 16 Bytes gekuerzt) erkennt Manipulation durch Dritte ohne
/// Session-Key.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrityOnlySuite;

impl IntegrityOnlySuite {
    pub const NAME: &'static str = "integrity-only";

    fn mac(key: &SessionKey, nonce: &Nonce, plaintext: &[u8]) -> CryptoResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;
        mac.update(nonce.as_bytes());
        mac.update(plaintext);
        Ok(mac)
    }
}

impl CipherSuite for IntegrityOnlySuite {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_confidential(&self) -> bool {
        false
    }

    fn generate_keypair(&self) -> CryptoResult<KeyPair> {
        generate_static_keypair()
    }

    fn derive_session_key(&self, own: &KeyPair, peer_public: &PublicKey) -> CryptoResult<SessionKey> {
        derive_session_key(own, peer_public)
    }

    fn seal(&self, key: &SessionKey, plaintext: &[u8]) -> CryptoResult<(Nonce, Vec<u8>)> {
        let nonce = Nonce::zufaellig()?;
        let tag = Self::mac(key, &nonce, plaintext)?.finalize().into_bytes();
        let mut out = Vec::with_capacity(plaintext.len() + TAG_LAENGE);
        out.extend_from_slice(plaintext);
        out.extend_from_slice(&tag[..TAG_LAENGE]);
        Ok((nonce, out))
    }

    fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < TAG_LAENGE {
            return Err(CryptoError::Authentifizierung);
        }
        let (plaintext, tag) = ciphertext.split_at(ciphertext.len() - TAG_LAENGE);
        Self::mac(key, nonce, plaintext)?
            .verify_truncated_left(tag)
            .map_err(|_| CryptoError::Authentifizierung)?;
        Ok(plaintext.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn session_fuer(suite: &dyn CipherSuite) -> SessionKey {
        let a = suite.generate_keypair().unwrap();
        let b = suite.generate_keypair().unwrap();
        suite.derive_session_key(&a, &b.public_key).unwrap()
    }

    #[test]
    fn standard_suite_ist_default() {
        let suite = suite_waehlen(SuiteArt::default(), false).unwrap();
        assert_eq!(suite.name(), "x25519-xchacha20poly1305");
        assert!(suite.is_confidential());
    }

    #[test]
    fn unsichere_suite_braucht_freigabe() {
        let result = suite_waehlen(SuiteArt::IntegrityOnly, false);
        assert!(matches!(result, Err(CryptoError::UnsichereSuiteNichtErlaubt(_))));

        let suite = suite_waehlen(SuiteArt::IntegrityOnly, true).unwrap();
        assert!(!suite.is_confidential());
    }

    #[test]
    fn xchacha_suite_roundtrip() {
        let suite = X25519XChaCha20Suite;
        let key = session_fuer(&suite);
        let (nonce, ct) = suite.seal(&key, b"hallo").unwrap();
        assert_eq!(suite.open(&key, &nonce, &ct).unwrap(), b"hallo");
    }

    #[test]
    fn integrity_only_erkennt_manipulation() {
        let suite = IntegrityOnlySuite;
        let key = session_fuer(&suite);
        let (nonce, mut ct) = suite.seal(&key, b"nicht vertraulich").unwrap();
        assert_eq!(suite.open(&key, &nonce, &ct).unwrap(), b"nicht vertraulich");

        ct[0] ^= 0x01;
        assert!(matches!(
            suite.open(&key, &nonce, &ct),
            Err(CryptoError::Authentifizierung)
        ));
    }

    #[test]
    fn integrity_only_tag_ist_hmac() {
        let suite = IntegrityOnlySuite;
        let key = session_fuer(&suite);
        let (nonce, ct) = suite.seal(&key, b"abc").unwrap();

        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(nonce.as_bytes());
        mac.update(b"abc");
        let erwartet = mac.finalize().into_bytes();
        assert_eq!(&ct[3..], &erwartet[..TAG_LAENGE]);

        // Abgeschnittener Tag ist kein gueltiger Tag
        assert!(matches!(
            suite.open(&key, &nonce, &ct[..ct.len() - 1]),
            Err(CryptoError::Authentifizierung)
        ));
    }

    #[test]
    fn einmal_box_an_public_key() {
        for suite in [
            &X25519XChaCha20Suite as &dyn CipherSuite,
            &IntegrityOnlySuite as &dyn CipherSuite,
        ] {
            let absender = suite.generate_keypair().unwrap();
            let empfaenger = suite.generate_keypair().unwrap();
            let fremder = suite.generate_keypair().unwrap();

            let envelope = suite
                .seal_to(&absender, &empfaenger.public_key, b"nur fuer dich")
                .unwrap();
            assert_eq!(envelope.sender_public_key, Some(absender.public_key));

            let klartext = suite
                .open_from(&empfaenger, &absender.public_key, &envelope.nonce, &envelope.ciphertext)
                .unwrap();
            assert_eq!(klartext, b"nur fuer dich");

            // Falscher Empfaenger oder falscher Absender: Tag passt nicht
            assert!(matches!(
                suite.open_from(&fremder, &absender.public_key, &envelope.nonce, &envelope.ciphertext),
                Err(CryptoError::Authentifizierung)
            ));
            assert!(matches!(
                suite.open_from(&empfaenger, &fremder.public_key, &envelope.nonce, &envelope.ciphertext),
                Err(CryptoError::Authentifizierung)
            ));
        }
    }

    #[test]
    fn suite_art_aus_konfiguration() {
        #[derive(Deserialize)]
        struct K {
            suite: SuiteArt,
        }
        let k: K = serde_json::from_str(r#"{"suite":"x25519-xchacha20poly1305"}"#).unwrap();
        assert_eq!(k.suite, SuiteArt::X25519XChaCha20Poly1305);
        let k: K = serde_json::from_str(r#"{"suite":"integrity-only"}"#).unwrap();
        assert_eq!(k.suite, SuiteArt::IntegrityOnly);
    }
}
