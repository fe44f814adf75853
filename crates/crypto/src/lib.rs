//! # fluesterpost-crypto
//!
//! E2E-Verschluesselung fuer Fluesterpost-Direktnachrichten.
//!
//! ## Module
//! - `e2e` - Schluesselvereinbarung (X25519 + HKDF) und AEAD (XChaCha20-Poly1305)
//! - `suite` - Austauschbare Cipher-Suites (Capability-Interface)
//! - `types` - Gemeinsame Typen (KeyPair, PublicKey, Nonce, Envelope, etc.)
//! - `error` - Fehlertypen

pub mod e2e;
pub mod error;
pub mod suite;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use suite::{suite_waehlen, CipherSuite, IntegrityOnlySuite, SuiteArt, X25519XChaCha20Suite};
pub use types::{
    EncryptedEnvelope, KeyPair, Nonce, PublicKey, SecretBytes, SessionKey, NONCE_LAENGE,
    SCHLUESSEL_LAENGE, TAG_LAENGE,
};

pub use e2e::{
    derive_session_key, generate_static_keypair, hkdf_derive, keypair_pruefen, open_xchacha,
    seal_xchacha,
};
