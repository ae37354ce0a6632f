use crate::crypto;

/// A caveat as embedded in a macaroon.
///
/// `verifier_id` is non-empty iff the caveat is third-party; its plaintext
/// is the root key of the discharge macaroon, encrypted under the signature
/// the macaroon carried at the moment the caveat was added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caveat {
    pub(crate) id: String,
    pub(crate) verifier_id: Vec<u8>,
    pub(crate) location: String,
}

impl Caveat {
    pub(crate) fn first_party(id: String) -> Caveat {
        Caveat {
            id,
            verifier_id: Vec::new(),
            location: String::new(),
        }
    }

    pub(crate) fn third_party(id: String, verifier_id: Vec<u8>, location: String) -> Caveat {
        Caveat {
            id,
            verifier_id,
            location,
        }
    }

    /// The caveat id: a condition string for first-party caveats, an opaque
    /// encoded id for third-party ones.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn verifier_id(&self) -> &[u8] {
        &self.verifier_id
    }

    /// Location hint of the discharging service; empty for first-party
    /// caveats.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_third_party(&self) -> bool {
        !self.verifier_id.is_empty()
    }

    /// Extends the signature chain over this caveat.
    pub(crate) fn sign(&self, sig: &[u8; 32]) -> [u8; 32] {
        crypto::keyed_hash2(sig, &self.verifier_id, self.id.as_bytes())
    }
}
