//! Payload-Verschluesselung fuer Direktnachrichten
//!
//! ## Format
//! ```text
//! [ciphertext + auth_tag(16)]   Nonce (24) wird separat im Envelope gefuehrt
//! ```
//!
//! ## AAD (Authenticated Additional Data)
//! ```text
//! "fluesterpost-dm-v1"
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{Nonce, SessionKey, SCHLUESSEL_LAENGE};

/// Kontext-Bindung aller Direktnachrichten
pub const DM_AAD: &[u8] = b"fluesterpost-dm-v1";

/// Verschluesselt einen Klartext mit dem Session-Key eines Peers
///
/// Die Nonce muss vom Aufrufer frisch erzeugt sein (`Nonce::zufaellig`).
pub fn seal_xchacha(plaintext: &[u8], key: &SessionKey, nonce: &Nonce) -> CryptoResult<Vec<u8>> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key_bytes.len(),
        });
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key_bytes)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;
    let nonce = XNonce::from_slice(nonce.as_bytes());

    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: DM_AAD,
            },
        )
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
