//! X25519 Diffie-Hellman Schluesselvereinbarung
//!
//! Beide Seiten leiten denselben Session-Key ab, ohne ihn zu uebertragen:
//! ```text
//! A: X25519(secA, pubB)  ==  B: X25519(secB, pubA)
//! ```
//! Der DH-Output wird per HKDF-SHA256 zum Session-Key verarbeitet. Als Salt
//! dienen beide oeffentlichen Schluessel in sortierter Reihenfolge, damit die
//! Ableitung unabhaengig davon ist, wer sie anstoesst.

use chrono::Utc;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{KeyPair, PublicKey, SessionKey, SCHLUESSEL_LAENGE};

const SESSION_INFO: &[u8] = b"fluesterpost-session-key-v1";

/// Generiert ein neues statisches X25519-Schluessel-Paar aus dem OS-CSPRNG
///
/// Jeder Aufruf zieht frische Entropie; RNG-Fehler werden als
/// `SchluesselGenerierung` gemeldet statt zu paniken.
pub fn generate_static_keypair() -> CryptoResult<KeyPair> {
    let mut secret_bytes = Zeroizing::new([0u8; SCHLUESSEL_LAENGE]);
    OsRng
        .try_fill_bytes(secret_bytes.as_mut_slice())
        .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;

    let secret = StaticSecret::from(*secret_bytes);
    let public = X25519PublicKey::from(&secret);
    Ok(KeyPair::new(
        PublicKey::from_bytes(public.to_bytes()),
        *secret_bytes,
        Utc::now(),
    ))
}

/// Leitet den Session-Key mit einem Peer ab
///
/// # Parameter
/// - `own`: Eigenes Langzeit-Schluessel-Paar
/// - `peer_public`: Oeffentlicher Schluessel des Peers (32 Bytes, bereits validiert)
pub fn derive_session_key(own: &KeyPair, peer_public: &PublicKey) -> CryptoResult<SessionKey> {
    let roh = Zeroizing::new(own.secret_key().als_schluessel_array()?);
    let secret = StaticSecret::from(*roh);
    let peer_pk = X25519PublicKey::from(*peer_public.as_bytes());
    let dh_output = secret.diffie_hellman(&peer_pk);

    // Low-Order-Punkte liefern einen bekannten DH-Output
    if !dh_output.was_contributory() {
        return Err(CryptoError::KeyDerivation(
            "Peer-Schluessel ist ein Low-Order-Punkt".to_string(),
        ));
    }

    // Salt = min(pubA, pubB) || max(pubA, pubB)
    let (erster, zweiter) = if own.public_key <= *peer_public {
        (own.public_key, *peer_public)
    } else {
        (*peer_public, own.public_key)
    };
    let mut salt = [0u8; 2 * SCHLUESSEL_LAENGE];
    salt[..SCHLUESSEL_LAENGE].copy_from_slice(erster.as_bytes());
    salt[SCHLUESSEL_LAENGE..].copy_from_slice(zweiter.as_bytes());

    let okm = hkdf_derive(dh_output.as_bytes(), &salt, SESSION_INFO, SCHLUESSEL_LAENGE)?;
    SessionKey::new(okm)
}

/// Prueft, ob der oeffentliche Schluessel zum privaten passt
///
/// Schuetzt vor inkonsistent gespeicherten Paaren (z.B. manuell editierter Speicher).
pub fn keypair_pruefen(pair: &KeyPair) -> CryptoResult<()> {
    let roh = Zeroizing::new(pair.secret_key().als_schluessel_array()?);
    let secret = StaticSecret::from(*roh);
    let erwartet = X25519PublicKey::from(&secret);
    if erwartet.as_bytes() != pair.public_key.as_bytes() {
        return Err(CryptoError::UngueltigeDaten(
            "oeffentlicher Schluessel passt nicht zum privaten".to_string(),
        ));
    }
    Ok(())
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beide_seiten_leiten_gleichen_session_key_ab() {
        let alice = generate_static_keypair().unwrap();
        let bob = generate_static_keypair().unwrap();

        let von_alice = derive_session_key(&alice, &bob.public_key).unwrap();
        let von_bob = derive_session_key(&bob, &alice.public_key).unwrap();

        // Beide Seiten muessen identische Schluessel ableiten
        assert_eq!(von_alice.as_bytes(), von_bob.as_bytes());
        assert_eq!(von_alice.as_bytes().len(), 32);
    }

    #[test]
    fn verschiedene_peers_ergeben_verschiedene_keys() {
        let alice = generate_static_keypair().unwrap();
        let bob = generate_static_keypair().unwrap();
        let carol = generate_static_keypair().unwrap();

        let ab = derive_session_key(&alice, &bob.public_key).unwrap();
        let ac = derive_session_key(&alice, &carol.public_key).unwrap();
        assert_ne!(ab.as_bytes(), ac.as_bytes());
    }

    #[test]
    fn schluessel_paare_sind_unabhaengig() {
        let a = generate_static_keypair().unwrap();
        let b = generate_static_keypair().unwrap();
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.secret_key().as_bytes(), b.secret_key().as_bytes());
        assert_ne!(a.public_key.as_bytes().as_slice(), a.secret_key().as_bytes());
    }

    #[test]
    fn low_order_punkt_wird_abgelehnt() {
        let alice = generate_static_keypair().unwrap();
        // Der Nullpunkt hat kleine Ordnung
        let null = PublicKey::from_bytes([0u8; 32]);
        let result = derive_session_key(&alice, &null);
        assert!(matches!(result, Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn keypair_pruefen_erkennt_fremden_public_key() {
        let a = generate_static_keypair().unwrap();
        let b = generate_static_keypair().unwrap();
        assert!(keypair_pruefen(&a).is_ok());

        let gemischt = KeyPair::new(
            b.public_key,
            a.secret_key().als_schluessel_array().unwrap(),
            Utc::now(),
        );
        assert!(matches!(
            keypair_pruefen(&gemischt),
            Err(CryptoError::UngueltigeDaten(_))
        ));
    }

    #[test]
    fn hkdf_derive_deterministisch() {
        let key1 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        let key2 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 32);
    }

    #[test]
    fn hkdf_verschiedene_infos_geben_verschiedene_keys() {
        let key1 = hkdf_derive(b"gleicher-ikm", b"salt", b"info-1", 32).unwrap();
        let key2 = hkdf_derive(b"gleicher-ikm", b"salt", b"info-2", 32).unwrap();
        assert_ne!(key1, key2);
    }
}
