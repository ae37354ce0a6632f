use std::sync::Arc;

use log::debug;

use super::caveat_id::CaveatIdDecoder;
use super::service::Service;
use super::ThirdPartyChecker;
use crate::macaroon::Macaroon;
use crate::Result;

/// The third-party side of a third-party caveat: turns a caveat id into a
/// discharge macaroon.
pub struct Discharger {
    checker: Box<dyn ThirdPartyChecker>,
    decoder: CaveatIdDecoder,
    factory: Arc<Service>,
}

impl Discharger {
    /// `factory` both decodes caveat ids addressed to it and mints the
    /// discharge; `checker` judges the decoded condition.
    pub fn new(factory: Arc<Service>, checker: Box<dyn ThirdPartyChecker>) -> Discharger {
        let decoder = factory.caveat_id_decoder();
        Discharger {
            checker,
            decoder,
            factory,
        }
    }

    /// Creates a macaroon that discharges the third-party caveat with the
    /// given id. The checker may contribute extra caveats, which are added
    /// to the discharge. The discharge is returned, never stored.
    pub fn discharge(&self, id: &str) -> Result<Macaroon> {
        let (root_key, condition) = self.decoder.decode_caveat_id(id)?;
        let caveats = self.checker.check_third_party_caveat(&condition)?;
        debug!(
            "discharging condition {condition:?} with {} extra caveat(s)",
            caveats.len()
        );
        self.factory.mint_discharge(&root_key, id, &caveats)
    }
}
