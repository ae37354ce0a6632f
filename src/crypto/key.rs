use std::fmt;

use crypto_box::aead::Aead;
use crypto_box::{SalsaBox, SecretKey};
use rand::rngs::OsRng;

use crate::crypto::NONCE_BYTES;
use crate::error::Error;
use crate::Result;

/// A Curve25519 public key: the half of a [`KeyPair`] a service publishes
/// so that first parties can seal caveat ids to it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> PublicKey {
        PublicKey(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// Curve25519 key pair used for public-key authenticated encryption of
/// third-party caveat ids.
///
/// The secret half never leaves this process; `Debug` prints only the
/// public key.
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> KeyPair {
        let secret = SecretKey::generate(&mut OsRng);
        KeyPair {
            public: PublicKey(*secret.public_key().as_bytes()),
            secret,
        }
    }

    /// Rebuild a key pair from a stored secret key.
    pub fn from_secret(secret: SecretKey) -> KeyPair {
        KeyPair {
            public: PublicKey(*secret.public_key().as_bytes()),
            secret,
        }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// NaCl box: authenticated public-key encryption of `plain` from the holder
/// of `our_secret` to the holder of `their_public`.
pub fn box_seal(
    plain: &[u8],
    nonce: &[u8; NONCE_BYTES],
    their_public: &PublicKey,
    our_secret: &SecretKey,
) -> Result<Vec<u8>> {
    let their_public = crypto_box::PublicKey::from(*their_public.as_bytes());
    let sbox = SalsaBox::new(&their_public, our_secret);
    sbox.encrypt(&crypto_box::Nonce::from(*nonce), plain)
        .map_err(|_| Error::Crypto("could not seal"))
}

/// Inverse of [`box_seal`], run by the recipient.
pub fn box_open(
    sealed: &[u8],
    nonce: &[u8; NONCE_BYTES],
    their_public: &PublicKey,
    our_secret: &SecretKey,
) -> Result<Vec<u8>> {
    let their_public = crypto_box::PublicKey::from(*their_public.as_bytes());
    let sbox = SalsaBox::new(&their_public, our_secret);
    sbox.decrypt(&crypto_box::Nonce::from(*nonce), sealed)
        .map_err(|_| Error::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::new_nonce;

    #[test]
    fn seal_open_roundtrip() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let nonce = new_nonce();

        let sealed = box_seal(b"the root key", &nonce, bob.public(), alice.secret()).unwrap();
        let opened = box_open(&sealed, &nonce, alice.public(), bob.secret()).unwrap();
        assert_eq!(opened, b"the root key");
    }

    #[test]
    fn open_fails_for_wrong_recipient() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();
        let nonce = new_nonce();

        let sealed = box_seal(b"the root key", &nonce, bob.public(), alice.secret()).unwrap();
        assert!(matches!(
            box_open(&sealed, &nonce, alice.public(), eve.secret()),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let pair = KeyPair::generate();
        let printed = format!("{pair:?}");
        assert!(printed.contains("public"));
        assert!(!printed.contains("secret"));
    }
}
