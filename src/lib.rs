//! Macaroons — bearer credentials with contextual caveats — and the bakery
//! built on them, after the paper "Macaroons: Cookies with Contextual
//! Caveats for Decentralized Authorization in the Cloud"
//! (<http://theory.stanford.edu/~ataly/Papers/macaroons.pdf>).
//!
//! The [`Macaroon`] primitive mints credentials, attenuates them with
//! first- and third-party caveats, binds discharges and verifies the
//! resulting HMAC chain. The [`bakery`] module layers an authorization
//! service on top: minting primaries for capabilities, checking presented
//! bundles, encoding third-party caveat ids and discharging them.
//!
//! ```
//! use macaroon_bakery::{Error, Macaroon};
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Error> {
//! let root_key = b"super secret root key";
//! let mut m = Macaroon::new(root_key, "keyid", "http://target/")?;
//! m.add_first_party_caveat("account = 3735928559");
//!
//! m.verify(
//!     root_key,
//!     &|condition: &str| {
//!         if condition == "account = 3735928559" {
//!             Ok(())
//!         } else {
//!             Err(Error::CaveatNotRecognized)
//!         }
//!     },
//!     &HashMap::new(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod bakery;

mod caveat;
mod crypto;
mod error;
mod macaroon;
mod serialization;

pub use crate::caveat::Caveat;
pub use crate::crypto::{KeyPair, PublicKey};
pub use crate::error::Error;
pub use crate::macaroon::{
    decrypt_third_party_caveat_id, Discharges, Macaroon, ThirdPartyPayload, SIGNATURE_BYTES,
};

pub type Result<T> = std::result::Result<T, Error>;
