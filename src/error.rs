use crate::macaroon::Macaroon;
use thiserror::Error;

/// Everything that can go wrong minting, discharging or verifying a
/// macaroon.
///
/// Verification stops at the first failure. A [`Error::CaveatNotSatisfied`]
/// or [`Error::SignatureMismatch`] is definitive; a
/// [`Error::CaveatNotRecognized`] means the verifier could not decide the
/// caveat either way.
#[derive(Debug, Error)]
pub enum Error {
    /// Sentinel consumed by composite checkers for fall-through; a checker
    /// returns it when the condition is not in its vocabulary.
    #[error("caveat not recognized")]
    CaveatNotRecognized,

    /// A first-party check returned false.
    #[error("caveat not satisfied: {condition:?}: {reason}")]
    CaveatNotSatisfied { condition: String, reason: String },

    /// No discharge macaroon was presented for a third-party caveat.
    #[error("cannot find discharge macaroon for caveat {caveat_id:?}")]
    DischargeMissing { caveat_id: String },

    /// The operation needs discharges the client has not supplied yet. The
    /// embedded macaroon must be discharged and re-presented.
    #[error("macaroon discharge required")]
    DischargeRequired(Box<Macaroon>),

    /// The signature chain did not reproduce; the credential was tampered
    /// with or a discharge was bound to the wrong primary.
    #[error("signature mismatch after caveat verification")]
    SignatureMismatch,

    /// Authenticated decryption failed.
    #[error("decryption failure")]
    DecryptionFailed,

    /// An encrypted caveat id was sealed for a different service.
    #[error("public key mismatch")]
    PublicKeyMismatch,

    /// A third-party caveat id envelope could not be decoded.
    #[error("bad third-party caveat id: {0}")]
    BadEnvelope(String),

    /// A condition string could not be parsed.
    #[error("cannot parse caveat {0:?}")]
    BadCaveat(String),

    #[error("bad macaroon: {0}")]
    BadMacaroon(&'static str),

    /// Umbrella verification failure. `required_capability` lets a target
    /// service pick the caveats for a freshly minted macaroon.
    #[error("verification failed: {reason}")]
    Verification {
        reason: String,
        required_capability: Option<String>,
    },

    /// Storage has no item under the requested key.
    #[error("item not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("cannot marshal json data: {0}")]
    Marshal(#[from] serde_json::Error),

    #[error("cannot deserialize macaroon: {0}")]
    Deserialization(String),

    /// A cryptographic primitive failed outside of decryption.
    #[error("crypto failure: {0}")]
    Crypto(&'static str),
}

impl Error {
    /// The capability a fresh macaroon would need to carry for the failed
    /// check to pass, if the failure exposes one.
    pub fn required_capability(&self) -> Option<&str> {
        match self {
            Error::Verification {
                required_capability,
                ..
            } => required_capability.as_deref(),
            _ => None,
        }
    }
}
