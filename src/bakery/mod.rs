//! The bakery: an authorization service built on the macaroon primitive.
//!
//! A [`Service`] mints macaroons for capabilities and checks bundles of
//! client-supplied macaroons; a [`Discharger`] is the third-party side that
//! turns a caveat id into a discharge macaroon. The HTTP transport is the
//! caller's concern; [`wire`] contracts the message shapes.

pub mod checkers;
pub mod wire;

mod caveat_id;
mod discharge;
mod service;
mod storage;

pub use caveat_id::{CaveatIdDecoder, CaveatIdEncoder, ThirdPartyCaveatId};
pub use discharge::Discharger;
pub use service::{Request, Service, ServiceParams};
pub use storage::{MemStorage, Storage};

use crate::Result;

/// A condition that must hold for a check to complete successfully.
///
/// If `location` is non-empty the caveat must be discharged by a third
/// party at that location; otherwise the target service checks the
/// condition itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caveat {
    pub location: String,
    pub condition: String,
}

impl Caveat {
    /// A caveat the target service checks locally.
    pub fn first_party(condition: impl Into<String>) -> Caveat {
        Caveat {
            location: String::new(),
            condition: condition.into(),
        }
    }

    /// A caveat discharged by the third party at `location`.
    pub fn third_party(location: impl Into<String>, condition: impl Into<String>) -> Caveat {
        Caveat {
            location: location.into(),
            condition: condition.into(),
        }
    }

    pub fn is_third_party(&self) -> bool {
        !self.location.is_empty()
    }
}

/// Checks first-party caveats for validity.
///
/// Returning [`Error::CaveatNotRecognized`](crate::Error::CaveatNotRecognized)
/// signals that the condition is outside this checker's vocabulary, which
/// composite checkers use for fall-through.
pub trait FirstPartyChecker: Send + Sync {
    fn check_first_party_caveat(&self, caveat: &str) -> Result<()>;
}

impl<F> FirstPartyChecker for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn check_first_party_caveat(&self, caveat: &str) -> Result<()> {
        self(caveat)
    }
}

/// Checks third-party caveats for validity. A successful check may return
/// extra caveats that will be added to the discharge macaroon; the extras
/// may themselves be third-party.
pub trait ThirdPartyChecker: Send + Sync {
    fn check_third_party_caveat(&self, condition: &str) -> Result<Vec<Caveat>>;
}

impl<F> ThirdPartyChecker for F
where
    F: Fn(&str) -> Result<Vec<Caveat>> + Send + Sync,
{
    fn check_third_party_caveat(&self, condition: &str) -> Result<Vec<Caveat>> {
        self(condition)
    }
}
