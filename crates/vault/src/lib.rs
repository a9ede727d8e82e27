//! Token Vault (C1): authenticated symmetric encryption for per-user OAuth
//! tokens at rest. Grounded on `aerogramme`'s `cryptoblob` module — same
//! `seal`/`open` shape over `sodiumoxide::crypto::secretbox`, minus the
//! zstd framing (tokens are short, compression buys nothing).
//!
//! Wire format: `base64(nonce || secretbox_ciphertext)`. secretbox already
//! appends its Poly1305 tag to the ciphertext, so the three logical
//! segments (IV, tag, ciphertext) are carried as two concatenated byte
//! ranges rather than three separately-delimited ones.

use base64::Engine as _;
use once_cell::sync::OnceCell;
use sodiumoxide::crypto::secretbox::{self, Key, Nonce, KEYBYTES, NONCEBYTES};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("ciphertext is truncated or tag verification failed")]
    Corrupt,
    #[error("encryption key must be exactly {KEYBYTES} bytes, got {0}")]
    BadKeyLength(usize),
}

static KEY: OnceCell<Key> = OnceCell::new();

/// Installs the process key, decoded from the base64 `ENCRYPTION_KEY`
/// setting. Must run once at startup; fails fast (`ErrConfig`) rather than
/// letting a malformed key surface later as silent decrypt failures.
pub fn init(encoded_key: &str) -> Result<(), VaultError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded_key)
        .map_err(|_| VaultError::BadKeyLength(0))?;
    if raw.len() != KEYBYTES {
        return Err(VaultError::BadKeyLength(raw.len()));
    }
    let key = Key::from_slice(&raw).expect("length checked above");
    let _ = KEY.set(key);
    Ok(())
}

fn key() -> &'static Key {
    KEY.get()
        .expect("vault::init must run before seal/open are called")
}

/// Encrypts `plaintext`, returning a base64 blob. Uses a fresh random
/// nonce every call, so the output is never the same twice for the same
/// input.
pub fn seal(plaintext: &[u8]) -> String {
    let nonce = secretbox::gen_nonce();
    let ciphertext = secretbox::seal(plaintext, &nonce, key());

    let mut out = Vec::with_capacity(NONCEBYTES + ciphertext.len());
    out.extend_from_slice(nonce.as_ref());
    out.extend_from_slice(&ciphertext);

    base64::engine::general_purpose::STANDARD.encode(out)
}

/// Decrypts a blob produced by [`seal`]. Returns [`VaultError::Corrupt`]
/// if the base64 envelope, nonce framing, or authentication tag don't
/// check out.
pub fn open(blob: &str) -> Result<Vec<u8>, VaultError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(blob)
        .map_err(|_| VaultError::Corrupt)?;

    if raw.len() < NONCEBYTES {
        return Err(VaultError::Corrupt);
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCEBYTES);
    let nonce = Nonce::from_slice(nonce_bytes).ok_or(VaultError::Corrupt)?;

    secretbox::open(ciphertext, &nonce, key()).map_err(|_| VaultError::Corrupt)
}

pub fn open_string(blob: &str) -> Result<String, VaultError> {
    let bytes = open(blob)?;
    String::from_utf8(bytes).map_err(|_| VaultError::Corrupt)
}

pub fn seal_string(plaintext: &str) -> String {
    seal(plaintext.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ensure_key() {
        let _ = sodiumoxide::init();
        if KEY.get().is_none() {
            let raw = [7u8; KEYBYTES];
            let _ = KEY.set(Key::from_slice(&raw).unwrap());
        }
    }

    #[test]
    fn round_trips_known_value() {
        ensure_key();
        let sealed = seal_string("refresh-token-xyz");
        assert_eq!(open_string(&sealed).unwrap(), "refresh-token-xyz");
    }

    #[test]
    fn seal_is_randomized() {
        ensure_key();
        let a = seal_string("same plaintext");
        let b = seal_string("same plaintext");
        assert_ne!(a, b);
        assert_eq!(open_string(&a).unwrap(), open_string(&b).unwrap());
    }

    #[test]
    fn open_rejects_garbage() {
        ensure_key();
        assert!(matches!(open("not-base64-!!!"), Err(VaultError::Corrupt)));
        assert!(matches!(
            open(&base64::engine::general_purpose::STANDARD.encode(b"short")),
            Err(VaultError::Corrupt)
        ));
    }

    proptest! {
        #[test]
        fn open_seal_roundtrip(data: Vec<u8>) {
            ensure_key();
            let sealed = seal(&data);
            prop_assert_eq!(open(&sealed).unwrap(), data);
        }
    }
}
