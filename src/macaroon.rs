use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::caveat::Caveat;
use crate::crypto;
use crate::error::Error;
use crate::Result;

pub const SIGNATURE_BYTES: usize = 32;

/// A macaroon: a bearer credential carrying an ordered chain of caveats
/// bound together by an HMAC chain, as described in the Stanford macaroons
/// paper.
///
/// Macaroons are mutable until published; clone before attenuating a
/// credential you have already handed out. Verification takes a shared
/// reference and may run concurrently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Macaroon {
    pub(crate) location: String,
    pub(crate) id: String,
    pub(crate) caveats: Vec<Caveat>,
    pub(crate) signature: [u8; SIGNATURE_BYTES],
}

/// Candidate discharges keyed by caveat id. Several candidates may share an
/// id; verification tries each and accepts the first that verifies.
pub type Discharges = HashMap<String, Vec<Macaroon>>;

/// The plaintext sealed inside a shared-secret third-party caveat id:
/// the discharge root key and the condition the third party must check.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThirdPartyPayload {
    #[serde(rename = "RootKey", with = "crate::serialization::base64_bytes")]
    pub root_key: Vec<u8>,
    #[serde(rename = "Caveat")]
    pub caveat: String,
}

impl Macaroon {
    /// Mints a new macaroon with the given root key, identifier and location
    /// hint. The initial signature is `HMAC(root_key, id)`.
    pub fn new(root_key: &[u8], id: &str, location: &str) -> Result<Macaroon> {
        if id.is_empty() {
            return Err(Error::BadMacaroon("no macaroon identifier"));
        }
        Ok(Macaroon {
            location: String::from(location),
            id: String::from(id),
            caveats: Vec::new(),
            signature: crypto::keyed_hash(root_key, id.as_bytes()),
        })
    }

    /// Location hint of the minting service; advisory, not authenticated.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.signature
    }

    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    fn append_caveat(&mut self, caveat: Caveat) {
        self.signature = caveat.sign(&self.signature);
        self.caveats.push(caveat);
    }

    /// Adds a caveat that the target service verifies locally.
    pub fn add_first_party_caveat(&mut self, condition: &str) {
        self.append_caveat(Caveat::first_party(String::from(condition)));
    }

    /// Adds a third-party caveat using a secret shared with the third party.
    ///
    /// A fresh nonce doubles as the discharge root key: the caveat id is the
    /// secretbox of `{root_key, condition}` under the shared secret, and the
    /// verification id encrypts the nonce under the current signature.
    /// Returns the encoded caveat id the client hands to the third party.
    pub fn add_third_party_caveat(
        &mut self,
        third_party_secret: &[u8; 32],
        condition: &str,
        location: &str,
    ) -> Result<String> {
        let nonce = crypto::new_nonce();
        let payload = ThirdPartyPayload {
            root_key: nonce.to_vec(),
            caveat: String::from(condition),
        };
        let sealed = crypto::encrypt(third_party_secret, &serde_json::to_vec(&payload)?)?;
        let caveat_id = STANDARD.encode(sealed);
        self.add_third_party_caveat_with_id(&nonce, &caveat_id, location)?;
        Ok(caveat_id)
    }

    /// Adds a third-party caveat whose id was produced elsewhere (for
    /// instance by a caveat id encoder). `root_key` is the root key the
    /// discharge macaroon will be minted with; it is encrypted under the
    /// current signature to become the verification id.
    pub fn add_third_party_caveat_with_id(
        &mut self,
        root_key: &[u8],
        caveat_id: &str,
        location: &str,
    ) -> Result<()> {
        let verifier_id = crypto::encrypt(&self.signature, root_key)?;
        self.append_caveat(Caveat::third_party(
            String::from(caveat_id),
            verifier_id,
            String::from(location),
        ));
        Ok(())
    }

    /// Binds this macaroon, as a discharge, to the signature of the primary
    /// macaroon it discharges. Must be applied before the discharge is
    /// passed to [`Macaroon::verify`]; an unbound discharge fails
    /// verification, and a bound one cannot be replayed against a different
    /// primary.
    pub fn bind(&mut self, root_sig: &[u8; SIGNATURE_BYTES]) {
        self.signature = bind_for_request(root_sig, &self.signature);
    }

    /// Verifies the macaroon against the root key it was minted with.
    ///
    /// `check` is called for each first-party caveat with the full condition
    /// string; `Ok(())` satisfies the caveat, `Err(CaveatNotRecognized)`
    /// means the checker could not decide, and any other error fails
    /// verification. Discharge macaroons must already be bound to this
    /// macaroon's signature.
    pub fn verify<C>(&self, root_key: &[u8], check: &C, discharges: &Discharges) -> Result<()>
    where
        C: Fn(&str) -> Result<()> + ?Sized,
    {
        self.verify_inner(&self.signature, root_key, check, discharges, &mut Vec::new())
    }

    fn verify_inner<C>(
        &self,
        root_sig: &[u8; SIGNATURE_BYTES],
        root_key: &[u8],
        check: &C,
        discharges: &Discharges,
        active: &mut Vec<String>,
    ) -> Result<()>
    where
        C: Fn(&str) -> Result<()> + ?Sized,
    {
        let mut caveat_sig = crypto::keyed_hash(root_key, self.id.as_bytes());
        for caveat in &self.caveats {
            if caveat.is_third_party() {
                let caveat_key = crypto::decrypt(&caveat_sig, &caveat.verifier_id)?;
                self.verify_discharge(root_sig, &caveat_key, &caveat.id, check, discharges, active)?;
            } else {
                check(&caveat.id)?;
            }
            caveat_sig = caveat.sign(&caveat_sig);
        }
        // Discharges bind to the top-level root signature, never to their
        // parent, so a discharge cannot be replayed under another primary.
        let bound = bind_for_request(root_sig, &caveat_sig);
        if bool::from(bound.as_slice().ct_eq(self.signature.as_slice())) {
            Ok(())
        } else {
            Err(Error::SignatureMismatch)
        }
    }

    fn verify_discharge<C>(
        &self,
        root_sig: &[u8; SIGNATURE_BYTES],
        caveat_key: &[u8],
        caveat_id: &str,
        check: &C,
        discharges: &Discharges,
        active: &mut Vec<String>,
    ) -> Result<()>
    where
        C: Fn(&str) -> Result<()> + ?Sized,
    {
        let missing = || Error::DischargeMissing {
            caveat_id: String::from(caveat_id),
        };
        let candidates = discharges
            .get(caveat_id)
            .filter(|ms| !ms.is_empty())
            .ok_or_else(missing)?;
        // A discharge already under verification higher up the chain cannot
        // vouch for itself again.
        if active.iter().any(|id| id == caveat_id) {
            log::info!("discharge cycle detected for caveat id {caveat_id:?}");
            return Err(missing());
        }
        active.push(String::from(caveat_id));
        let mut outcome = Err(missing());
        for discharge in candidates {
            outcome = discharge.verify_inner(root_sig, caveat_key, check, discharges, active);
            if outcome.is_ok() {
                break;
            }
        }
        active.pop();
        outcome
    }
}

/// Decodes and decrypts a shared-secret third-party caveat id, recovering
/// the discharge root key and condition. This is the third-party side of
/// [`Macaroon::add_third_party_caveat`].
pub fn decrypt_third_party_caveat_id(secret: &[u8; 32], id: &str) -> Result<ThirdPartyPayload> {
    let sealed = STANDARD
        .decode(id)
        .map_err(|err| Error::Deserialization(format!("cannot base64-decode caveat id: {err}")))?;
    let plain = crypto::decrypt(secret, &sealed)?;
    Ok(serde_json::from_slice(&plain)?)
}

/// Replaces a discharge signature with `sha256(root_sig || discharge_sig)`;
/// the identity when the two are equal.
pub(crate) fn bind_for_request(
    root_sig: &[u8; SIGNATURE_BYTES],
    discharge_sig: &[u8; SIGNATURE_BYTES],
) -> [u8; SIGNATURE_BYTES] {
    if root_sig == discharge_sig {
        return *root_sig;
    }
    let mut hash = Sha256::new();
    hash.update(root_sig);
    hash.update(discharge_sig);
    hash.finalize().into()
}
