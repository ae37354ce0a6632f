use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::Error;
use crate::Result;

pub mod key;

pub use key::{box_open, box_seal, KeyPair, PublicKey};

pub const KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 24;

type MacaroonHmac = Hmac<Sha256>;

/// HMAC-SHA256 of `data` under `key`. Keys may be any length; root keys in
/// particular are arbitrary byte strings.
pub fn keyed_hash(key: &[u8], data: &[u8]) -> [u8; KEY_BYTES] {
    let mut mac =
        <MacaroonHmac as Mac>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// One HMAC fed `data1` then `data2`, the caveat-chain step: the running
/// signature absorbs the verification id followed by the caveat id.
pub fn keyed_hash2(key: &[u8; KEY_BYTES], data1: &[u8], data2: &[u8]) -> [u8; KEY_BYTES] {
    let mut mac =
        <MacaroonHmac as Mac>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data1);
    mac.update(data2);
    mac.finalize().into_bytes().into()
}

/// Secretbox with a fresh random nonce, nonce prepended to the ciphertext.
pub fn encrypt(key: &[u8; KEY_BYTES], plain: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::from(nonce_bytes);
    let sealed = cipher
        .encrypt(&nonce, plain)
        .map_err(|_| Error::Crypto("could not encrypt"))?;

    let mut out = Vec::with_capacity(NONCE_BYTES + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`encrypt`]; fails on any tampering or truncation.
pub fn decrypt(key: &[u8; KEY_BYTES], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_BYTES {
        return Err(Error::DecryptionFailed);
    }
    let (nonce_bytes, sealed) = data.split_at(NONCE_BYTES);

    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| Error::DecryptionFailed)
}

/// 24 uniform random bytes from the OS CSPRNG.
pub fn new_nonce() -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_BYTES];
        let plain = b"four and twenty blackbirds";
        let sealed = encrypt(&key, plain).unwrap();
        assert_ne!(&sealed[NONCE_BYTES..], plain.as_ref());
        let opened = decrypt(&key, &sealed).unwrap();
        assert_eq!(opened, plain);
    }

    #[test]
    fn decrypt_rejects_tampering() {
        let key = [7u8; KEY_BYTES];
        let mut sealed = encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(matches!(
            decrypt(&key, &sealed),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn decrypt_rejects_wrong_key() {
        let sealed = encrypt(&[7u8; KEY_BYTES], b"payload").unwrap();
        assert!(matches!(
            decrypt(&[8u8; KEY_BYTES], &sealed),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn decrypt_rejects_truncation() {
        let key = [7u8; KEY_BYTES];
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_BYTES - 1]),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn keyed_hash2_is_one_hmac_over_both_parts() {
        let key = [3u8; KEY_BYTES];
        let joined: Vec<u8> = [b"left".as_ref(), b"right".as_ref()].concat();
        assert_eq!(
            keyed_hash2(&key, b"left", b"right"),
            keyed_hash(&key, &joined)
        );
    }

    #[test]
    fn nonces_are_distinct() {
        assert_ne!(new_nonce(), new_nonce());
    }
}
