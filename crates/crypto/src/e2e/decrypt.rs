//! Payload-Entschluesselung fuer Direktnachrichten
//!
//! Verifiziert dabei den Poly1305-Auth-Tag und die AAD. Jeder
//! Verifikationsfehler wird als `CryptoError::Authentifizierung` gemeldet,
//! ein verfaelschter Klartext wird nie zurueckgegeben.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::e2e::encrypt::DM_AAD;
use crate::error::{CryptoError, CryptoResult};
use crate::types::{Nonce, SessionKey, SCHLUESSEL_LAENGE, TAG_LAENGE};

/// Entschluesselt einen Ciphertext mit dem Session-Key eines Peers
pub fn open_xchacha(ciphertext: &[u8], key: &SessionKey, nonce: &Nonce) -> CryptoResult<Vec<u8>> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key_bytes.len(),
        });
    }
    if ciphertext.len() < TAG_LAENGE {
        return Err(CryptoError::Authentifizierung);
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key_bytes)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;
    let nonce = XNonce::from_slice(nonce.as_bytes());

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: DM_AAD,
            },
        )
        .map_err(|_| CryptoError::Authentifizierung)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
