use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::caveat_id::{CaveatIdDecoder, CaveatIdEncoder};
use super::storage::Storage;
use super::{Caveat, FirstPartyChecker};
use crate::crypto::{self, KeyPair, PublicKey};
use crate::error::Error;
use crate::macaroon::{Discharges, Macaroon};
use crate::Result;

/// Parameters for [`Service::new`].
pub struct ServiceParams {
    /// Location minted macaroons will carry.
    pub location: String,
    /// Where root-key records are kept.
    pub store: Arc<dyn Storage>,
    /// Default first-party checker for requests.
    pub checker: Arc<dyn FirstPartyChecker>,
    /// The service's key pair; generated when absent.
    pub key: Option<KeyPair>,
}

/// The record stored under a minted macaroon's id.
#[derive(Serialize, Deserialize)]
struct RootKeyRecord {
    #[serde(rename = "RootKey", with = "crate::serialization::base64_bytes")]
    root_key: Vec<u8>,
    #[serde(rename = "Capability")]
    capability: String,
}

/// A service that delegates authorization checks to macaroons: it mints
/// primary macaroons for capabilities, checks bundles of client-supplied
/// macaroons, and can act as the minting side of a discharge endpoint.
pub struct Service {
    location: String,
    store: Arc<dyn Storage>,
    checker: Arc<dyn FirstPartyChecker>,
    encoder: CaveatIdEncoder,
    key: KeyPair,
}

impl Service {
    pub fn new(params: ServiceParams) -> Service {
        let key = params.key.unwrap_or_else(KeyPair::generate);
        Service {
            location: params.location,
            store: params.store,
            checker: params.checker,
            encoder: CaveatIdEncoder::new(key.clone()),
            key,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn store(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.store)
    }

    pub fn checker(&self) -> Arc<dyn FirstPartyChecker> {
        Arc::clone(&self.checker)
    }

    pub fn public_key(&self) -> &PublicKey {
        self.key.public()
    }

    /// Associates a third party's public key with a location; caveat ids for
    /// matching locations will be encrypted instead of round-tripped through
    /// the third party's `/create` endpoint. With `prefix` set, any location
    /// starting with `location` matches, longest match winning.
    pub fn add_public_key_for_location(&self, location: &str, prefix: bool, key: &PublicKey) {
        self.encoder.add_public_key_for_location(location, prefix, key);
    }

    /// A decoder for caveat ids addressed to this service.
    pub fn caveat_id_decoder(&self) -> CaveatIdDecoder {
        CaveatIdDecoder::new(self.store(), self.key.clone())
    }

    /// Mints a new macaroon authorizing `capability`, carrying the given
    /// caveats. A random id is chosen when `id` is empty. The fresh root key
    /// is stored under the id so the service can verify the macaroon later.
    pub fn new_macaroon(&self, id: &str, capability: &str, caveats: &[Caveat]) -> Result<Macaroon> {
        let root_key = crypto::new_nonce();
        let id = if id.is_empty() {
            hex::encode(crypto::new_nonce())
        } else {
            String::from(id)
        };
        let record = serde_json::to_string(&RootKeyRecord {
            root_key: root_key.to_vec(),
            capability: String::from(capability),
        })?;
        self.store.put(&id, &record)?;

        let mut macaroon = Macaroon::new(&root_key, &id, &self.location)?;
        self.add_caveats(&mut macaroon, caveats)?;
        debug!("minted macaroon {id:?} for capability {capability:?}");
        Ok(macaroon)
    }

    /// Appends caveats to a macaroon: first-party conditions directly,
    /// third-party ones through the caveat id encoder with a fresh discharge
    /// root key each.
    pub(crate) fn add_caveats(&self, macaroon: &mut Macaroon, caveats: &[Caveat]) -> Result<()> {
        for caveat in caveats {
            if caveat.is_third_party() {
                let discharge_root_key = crypto::new_nonce();
                let caveat_id = self.encoder.new_caveat_id(caveat, &discharge_root_key)?;
                macaroon.add_third_party_caveat_with_id(
                    &discharge_root_key,
                    &caveat_id,
                    &caveat.location,
                )?;
            } else {
                macaroon.add_first_party_caveat(&caveat.condition);
            }
        }
        Ok(())
    }

    /// Mints a discharge macaroon for a decoded third-party caveat. The
    /// root key comes from the caveat id, so the discharge is never stored.
    pub(crate) fn mint_discharge(
        &self,
        root_key: &[u8],
        id: &str,
        caveats: &[Caveat],
    ) -> Result<Macaroon> {
        let mut macaroon = Macaroon::new(root_key, id, "")?;
        self.add_caveats(&mut macaroon, caveats)?;
        Ok(macaroon)
    }

    /// Starts an authorization check. `checker` overrides the service's
    /// first-party checker for this request.
    pub fn new_request(&self, checker: Option<Arc<dyn FirstPartyChecker>>) -> Request<'_> {
        Request {
            service: self,
            checker: checker.unwrap_or_else(|| Arc::clone(&self.checker)),
            macaroons: Vec::new(),
            client_id: None,
        }
    }
}

/// One authorization check: the client-supplied macaroons plus the checker
/// to judge their first-party caveats against.
pub struct Request<'a> {
    service: &'a Service,
    checker: Arc<dyn FirstPartyChecker>,
    macaroons: Vec<Macaroon>,
    client_id: Option<String>,
}

impl Request<'_> {
    /// Identifies the client principal. Reserved for caching third-party
    /// caveat ids across requests from the same principal; carries no
    /// correctness role.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Associates a client-supplied macaroon with the request. Every
    /// presented macaroon is kept; when several share an id, each is tried
    /// as a discharge candidate.
    pub fn add_client_macaroon(&mut self, macaroon: Macaroon) {
        self.macaroons.push(macaroon);
    }

    pub fn add_client_macaroons(&mut self, macaroons: impl IntoIterator<Item = Macaroon>) {
        self.macaroons.extend(macaroons);
    }

    /// Checks whether the presented macaroons authorize `capability`.
    ///
    /// The primary is the presented macaroon whose stored record matches the
    /// capability; every other macaroon is a candidate discharge, bound here
    /// (not by the client) to the primary's signature. First-party caveats
    /// are walked before any third-party work so that trivially failing ones
    /// short-circuit; a third-party caveat with no matching discharge yields
    /// [`Error::DischargeRequired`] carrying the primary macaroon.
    pub fn check(&self, capability: &str) -> Result<()> {
        let (primary_index, root_key) = self.find_primary(capability)?;
        let primary = &self.macaroons[primary_index];

        for caveat in primary.caveats().iter().filter(|c| !c.is_third_party()) {
            self.checker.check_first_party_caveat(caveat.id())?;
        }

        let discharges = self.bind_discharges(primary_index);
        for caveat in primary.caveats().iter().filter(|c| c.is_third_party()) {
            if !discharges.contains_key(caveat.id()) {
                info!(
                    "discharge required for capability {capability:?}, caveat at {:?}",
                    caveat.location()
                );
                return Err(Error::DischargeRequired(Box::new(primary.clone())));
            }
        }

        let checker = &self.checker;
        match primary.verify(
            &root_key,
            &|condition: &str| checker.check_first_party_caveat(condition),
            &discharges,
        ) {
            // A discharge can demand further discharges; those surface here
            // rather than in the walk above.
            Err(Error::DischargeMissing { .. }) => {
                Err(Error::DischargeRequired(Box::new(primary.clone())))
            }
            outcome => outcome,
        }
    }

    fn find_primary(&self, capability: &str) -> Result<(usize, Vec<u8>)> {
        for (index, macaroon) in self.macaroons.iter().enumerate() {
            let record_json = match self.service.store.get(macaroon.id()) {
                Ok(item) => item,
                Err(Error::NotFound) => continue,
                Err(err) => return Err(err),
            };
            let record: RootKeyRecord = serde_json::from_str(&record_json)?;
            if record.capability == capability {
                return Ok((index, record.root_key));
            }
        }
        Err(Error::Verification {
            reason: format!("no macaroon found for capability {capability:?}"),
            required_capability: Some(String::from(capability)),
        })
    }

    fn bind_discharges(&self, primary_index: usize) -> Discharges {
        let primary_sig = *self.macaroons[primary_index].signature();
        let mut discharges: Discharges = HashMap::new();
        for (index, macaroon) in self.macaroons.iter().enumerate() {
            if index == primary_index {
                continue;
            }
            let mut bound = macaroon.clone();
            bound.bind(&primary_sig);
            discharges
                .entry(String::from(bound.id()))
                .or_default()
                .push(bound);
        }
        discharges
    }
}
