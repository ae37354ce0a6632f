//! Message shapes of the bakery protocol.
//!
//! The HTTP transport itself lives outside this crate; handlers wrap these
//! types. A target service answers an unauthorized request with status 407
//! and a [`DischargeRequiredResponse`]; a third party serves `/discharge`
//! (wrap [`Discharger::discharge`]), `/create` ([`serve_create`]) and
//! `/publickey` ([`PublicKeyResponse`]).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::caveat_id::CaveatIdRecord;
use super::discharge::Discharger;
use super::storage::Storage;
use crate::crypto::{self, PublicKey};
use crate::error::Error;
use crate::macaroon::Macaroon;
use crate::Result;

/// HTTP status a target service uses for a discharge-required response.
pub const STATUS_DISCHARGE_REQUIRED: u16 = 407;

/// The `Code` value of a discharge-required response.
pub const CODE_DISCHARGE_REQUIRED: &str = "macaroon discharge required";

/// Body of a 407 response from a target service: the macaroon the client
/// must discharge and re-present.
#[derive(Debug, Serialize, Deserialize)]
pub struct DischargeRequiredResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Macaroon")]
    pub macaroon: Macaroon,
    #[serde(rename = "Info", skip_serializing_if = "Option::is_none", default)]
    pub info: Option<String>,
}

impl DischargeRequiredResponse {
    pub fn new(macaroon: Macaroon) -> DischargeRequiredResponse {
        DischargeRequiredResponse {
            code: String::from(CODE_DISCHARGE_REQUIRED),
            macaroon,
            info: None,
        }
    }

    /// Builds the response for an [`Error::DischargeRequired`], if that is
    /// what `err` is.
    pub fn from_error(err: &Error) -> Option<DischargeRequiredResponse> {
        match err {
            Error::DischargeRequired(macaroon) => {
                Some(DischargeRequiredResponse::new((**macaroon).clone()))
            }
            _ => None,
        }
    }
}

/// Body of a successful `/discharge` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DischargeResponse {
    #[serde(rename = "Macaroon")]
    pub macaroon: Macaroon,
}

/// Body of a successful `/create` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    #[serde(rename = "CaveatId")]
    pub caveat_id: String,
}

/// Body of a `/publickey` response. Key expiry is not implemented yet.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "PublicKey", with = "crate::serialization::base64_bytes")]
    pub public_key: Vec<u8>,
}

impl From<&PublicKey> for PublicKeyResponse {
    fn from(key: &PublicKey) -> PublicKeyResponse {
        PublicKeyResponse {
            public_key: key.as_bytes().to_vec(),
        }
    }
}

/// The `/discharge` protocol: turns the `id` form field into a discharge
/// macaroon. Failures map to HTTP 403 at the transport.
pub fn serve_discharge(discharger: &Discharger, id: &str) -> Result<DischargeResponse> {
    Ok(DischargeResponse {
        macaroon: discharger.discharge(id)?,
    })
}

/// The `/create` protocol: persists a `{root key, condition}` record for a
/// caveat the first party could not encrypt, returning the opaque id the
/// first party wraps into a stored caveat id envelope.
pub fn serve_create(
    store: &dyn Storage,
    condition: &str,
    root_key_b64: &str,
) -> Result<CreateResponse> {
    if condition.is_empty() || root_key_b64.is_empty() {
        return Err(Error::BadCaveat(String::from(
            "empty values for condition or root key",
        )));
    }
    let root_key = STANDARD.decode(root_key_b64).map_err(|err| {
        Error::Deserialization(format!("cannot base64-decode root key: {err}"))
    })?;
    let caveat_id = hex::encode(crypto::new_nonce());
    let record = serde_json::to_string(&CaveatIdRecord {
        root_key,
        condition: String::from(condition),
    })?;
    store.put(&format!("third-party-{caveat_id}"), &record)?;
    Ok(CreateResponse { caveat_id })
}
