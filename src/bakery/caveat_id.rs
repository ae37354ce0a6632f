//! Encoding and decoding of third-party caveat ids.
//!
//! A caveat id either carries its own payload, sealed to the third party's
//! public key, or is an opaque handle to a record the third party stored
//! when the first party called its `/create` endpoint. The encoder decides
//! per location: a registered public key means the encrypted form, anything
//! else goes through `/create`.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};

use super::storage::Storage;
use super::wire::CreateResponse;
use super::Caveat;
use crate::crypto::{self, box_open, box_seal, KeyPair, PublicKey, NONCE_BYTES};
use crate::error::Error;
use crate::Result;

/// A third-party caveat id, decoded.
///
/// On the wire this is a JSON object with optional fields, base64url-encoded
/// as a whole; the presence of the public-key fields selects the variant.
#[derive(Clone, Debug, PartialEq)]
pub enum ThirdPartyCaveatId {
    /// Self-contained: the caveat record is sealed to the third party's
    /// public key.
    Encrypted {
        third_party_public_key: PublicKey,
        first_party_public_key: PublicKey,
        nonce: [u8; NONCE_BYTES],
        sealed: Vec<u8>,
    },
    /// Opaque: the third party holds the record in its own storage.
    Stored { id: String },
}

#[derive(Serialize, Deserialize)]
struct CaveatIdJson {
    #[serde(
        rename = "ThirdPartyPublicKey",
        with = "crate::serialization::base64_bytes_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    third_party_public_key: Option<Vec<u8>>,
    #[serde(
        rename = "FirstPartyPublicKey",
        with = "crate::serialization::base64_bytes_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    first_party_public_key: Option<Vec<u8>>,
    #[serde(
        rename = "Nonce",
        with = "crate::serialization::base64_bytes_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    nonce: Option<Vec<u8>>,
    #[serde(rename = "Id")]
    id: String,
}

/// The record both envelope variants resolve to: the discharge root key and
/// the condition the third party must check.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CaveatIdRecord {
    #[serde(rename = "RootKey", with = "crate::serialization::base64_bytes")]
    pub root_key: Vec<u8>,
    #[serde(rename = "Condition")]
    pub condition: String,
}

fn public_key_from_bytes(bytes: &[u8], what: &str) -> Result<PublicKey> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::BadEnvelope(format!("bad {what} length")))?;
    Ok(PublicKey::from(arr))
}

impl ThirdPartyCaveatId {
    /// Encodes the envelope: JSON, then base64url.
    pub fn encode(&self) -> Result<String> {
        let json = match self {
            ThirdPartyCaveatId::Encrypted {
                third_party_public_key,
                first_party_public_key,
                nonce,
                sealed,
            } => CaveatIdJson {
                third_party_public_key: Some(third_party_public_key.as_bytes().to_vec()),
                first_party_public_key: Some(first_party_public_key.as_bytes().to_vec()),
                nonce: Some(nonce.to_vec()),
                id: STANDARD.encode(sealed),
            },
            ThirdPartyCaveatId::Stored { id } => CaveatIdJson {
                third_party_public_key: None,
                first_party_public_key: None,
                nonce: None,
                id: id.clone(),
            },
        };
        Ok(URL_SAFE.encode(serde_json::to_vec(&json)?))
    }

    /// Decodes an envelope, rejecting malformed or partially populated ones.
    pub fn decode(encoded: &str) -> Result<ThirdPartyCaveatId> {
        let data = URL_SAFE
            .decode(encoded)
            .map_err(|err| Error::BadEnvelope(format!("cannot base64-decode caveat id: {err}")))?;
        let json: CaveatIdJson = serde_json::from_slice(&data)
            .map_err(|err| Error::BadEnvelope(format!("cannot unmarshal caveat id: {err}")))?;

        let Some(third_party) = json.third_party_public_key else {
            if json.first_party_public_key.is_some() || json.nonce.is_some() {
                return Err(Error::BadEnvelope(String::from(
                    "stored caveat id carries key material",
                )));
            }
            return Ok(ThirdPartyCaveatId::Stored { id: json.id });
        };
        let first_party = json
            .first_party_public_key
            .ok_or_else(|| Error::BadEnvelope(String::from("no first party public key")))?;
        let nonce_bytes = json
            .nonce
            .ok_or_else(|| Error::BadEnvelope(String::from("no nonce")))?;
        let nonce: [u8; NONCE_BYTES] = nonce_bytes
            .try_into()
            .map_err(|_| Error::BadEnvelope(String::from("bad nonce length")))?;
        let sealed = STANDARD.decode(&json.id).map_err(|err| {
            Error::BadEnvelope(format!("cannot base64-decode encrypted caveat id: {err}"))
        })?;
        Ok(ThirdPartyCaveatId::Encrypted {
            third_party_public_key: public_key_from_bytes(&third_party, "third party public key")?,
            first_party_public_key: public_key_from_bytes(&first_party, "first party public key")?,
            nonce,
            sealed,
        })
    }
}

struct PublicKeyRecord {
    location: String,
    prefix: bool,
    key: PublicKey,
}

/// Makes third-party caveat ids, preferring public-key encryption when the
/// third party's key is registered for the caveat's location and falling
/// back to the third party's `/create` endpoint otherwise.
pub struct CaveatIdEncoder {
    key: KeyPair,
    // Guards only the registry, never any I/O.
    public_keys: Mutex<Vec<PublicKeyRecord>>,
}

impl CaveatIdEncoder {
    pub fn new(key: KeyPair) -> CaveatIdEncoder {
        CaveatIdEncoder {
            key,
            public_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        self.key.public()
    }

    /// Associates a third-party public key with a location. With `prefix`
    /// set, any location starting with `location` matches.
    pub fn add_public_key_for_location(&self, location: &str, prefix: bool, key: &PublicKey) {
        let mut keys = self.public_keys.lock().expect("public key registry lock poisoned");
        keys.push(PublicKeyRecord {
            location: String::from(location),
            prefix,
            key: *key,
        });
    }

    /// Looks up the key for a location: an exact non-prefix entry wins,
    /// otherwise the longest matching prefix, ties going to the most
    /// recently added entry.
    pub fn public_key_for_location(&self, location: &str) -> Option<PublicKey> {
        let keys = self.public_keys.lock().expect("public key registry lock poisoned");
        let mut longest: Option<&PublicKeyRecord> = None;
        for record in keys.iter().rev() {
            if !record.prefix {
                if record.location == location {
                    return Some(record.key);
                }
                continue;
            }
            if location.starts_with(&record.location)
                && longest.map_or(true, |best| record.location.len() > best.location.len())
            {
                longest = Some(record);
            }
        }
        longest.map(|record| record.key)
    }

    /// Produces the caveat id for a third-party caveat. `root_key` is the
    /// root key the discharge macaroon will be minted with.
    pub fn new_caveat_id(&self, caveat: &Caveat, root_key: &[u8]) -> Result<String> {
        if caveat.location.is_empty() {
            return Err(Error::BadCaveat(String::from(
                "cannot make caveat id for first party caveat",
            )));
        }
        let envelope = match self.public_key_for_location(&caveat.location) {
            Some(their_public) => self.new_encrypted_caveat_id(caveat, root_key, &their_public)?,
            None => self.new_stored_caveat_id(caveat, root_key)?,
        };
        envelope.encode()
    }

    fn new_encrypted_caveat_id(
        &self,
        caveat: &Caveat,
        root_key: &[u8],
        their_public: &PublicKey,
    ) -> Result<ThirdPartyCaveatId> {
        let nonce = crypto::new_nonce();
        let record = CaveatIdRecord {
            root_key: root_key.to_vec(),
            condition: caveat.condition.clone(),
        };
        let plain = serde_json::to_vec(&record)?;
        let sealed = box_seal(&plain, &nonce, their_public, self.key.secret())?;
        Ok(ThirdPartyCaveatId::Encrypted {
            third_party_public_key: *their_public,
            first_party_public_key: *self.key.public(),
            nonce,
            sealed,
        })
    }

    fn new_stored_caveat_id(&self, caveat: &Caveat, root_key: &[u8]) -> Result<ThirdPartyCaveatId> {
        let url = append_url_elem(&caveat.location, "create");
        debug!("creating stored caveat id through {url}");
        let root_key_b64 = STANDARD.encode(root_key);
        let body = ureq::post(&url)
            .send_form(&[
                ("condition", caveat.condition.as_str()),
                ("root-key", root_key_b64.as_str()),
            ])
            .map_err(|err| {
                Error::Transport(format!("cannot create caveat id through {url:?}: {err}"))
            })?
            .into_string()
            .map_err(|err| {
                Error::Transport(format!("failed to read caveat id from {url:?}: {err}"))
            })?;
        let response: CreateResponse = serde_json::from_str(&body)
            .map_err(|err| Error::BadEnvelope(format!("cannot unmarshal response: {err}")))?;
        if response.caveat_id.is_empty() {
            return Err(Error::BadEnvelope(format!(
                "empty caveat id returned from {url:?}"
            )));
        }
        Ok(ThirdPartyCaveatId::Stored {
            id: response.caveat_id,
        })
    }
}

/// Recovers the discharge root key and condition from a caveat id, on the
/// third-party side.
pub struct CaveatIdDecoder {
    store: Arc<dyn Storage>,
    key: KeyPair,
}

impl CaveatIdDecoder {
    pub fn new(store: Arc<dyn Storage>, key: KeyPair) -> CaveatIdDecoder {
        CaveatIdDecoder { store, key }
    }

    pub fn decode_caveat_id(&self, id: &str) -> Result<(Vec<u8>, String)> {
        let record_data = match ThirdPartyCaveatId::decode(id)? {
            ThirdPartyCaveatId::Encrypted {
                third_party_public_key,
                first_party_public_key,
                nonce,
                sealed,
            } => {
                if &third_party_public_key != self.key.public() {
                    return Err(Error::PublicKeyMismatch);
                }
                box_open(&sealed, &nonce, &first_party_public_key, self.key.secret())?
            }
            ThirdPartyCaveatId::Stored { id } => {
                self.store.get(&format!("third-party-{id}"))?.into_bytes()
            }
        };
        let record: CaveatIdRecord = serde_json::from_slice(&record_data).map_err(|err| {
            Error::BadEnvelope(format!("cannot decode third party caveat record: {err}"))
        })?;
        Ok((record.root_key, record.condition))
    }
}

fn append_url_elem(url: &str, elem: &str) -> String {
    if url.ends_with('/') {
        format!("{url}{elem}")
    } else {
        format!("{url}/{elem}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bakery::MemStorage;

    fn encoder_for(third_party: &KeyPair, location: &str, prefix: bool) -> CaveatIdEncoder {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        encoder.add_public_key_for_location(location, prefix, third_party.public());
        encoder
    }

    #[test]
    fn exact_match_beats_prefix_match() {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        let prefix_key = KeyPair::generate();
        let exact_key = KeyPair::generate();
        encoder.add_public_key_for_location("http://auth/", true, prefix_key.public());
        encoder.add_public_key_for_location("http://auth/x", false, exact_key.public());

        assert_eq!(
            encoder.public_key_for_location("http://auth/x").as_ref(),
            Some(exact_key.public())
        );
        assert_eq!(
            encoder.public_key_for_location("http://auth/y").as_ref(),
            Some(prefix_key.public())
        );
    }

    #[test]
    fn longest_prefix_wins() {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        let short = KeyPair::generate();
        let long = KeyPair::generate();
        encoder.add_public_key_for_location("http://auth/", true, short.public());
        encoder.add_public_key_for_location("http://auth/deep/", true, long.public());

        assert_eq!(
            encoder
                .public_key_for_location("http://auth/deep/path")
                .as_ref(),
            Some(long.public())
        );
        assert_eq!(
            encoder.public_key_for_location("http://auth/other").as_ref(),
            Some(short.public())
        );
        assert_eq!(encoder.public_key_for_location("http://elsewhere/"), None);
    }

    #[test]
    fn equal_length_prefixes_tie_to_most_recent() {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        let first = KeyPair::generate();
        let second = KeyPair::generate();
        encoder.add_public_key_for_location("http://auth/", true, first.public());
        encoder.add_public_key_for_location("http://auth/", true, second.public());

        assert_eq!(
            encoder.public_key_for_location("http://auth/x").as_ref(),
            Some(second.public())
        );
    }

    #[test]
    fn exact_entries_do_not_match_other_locations() {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        let key = KeyPair::generate();
        encoder.add_public_key_for_location("http://auth/", false, key.public());
        assert_eq!(encoder.public_key_for_location("http://auth/x"), None);
    }

    #[test]
    fn caveat_id_for_first_party_caveat_is_refused() {
        let encoder = CaveatIdEncoder::new(KeyPair::generate());
        let err = encoder.new_caveat_id(&Caveat::first_party("account = 42"), b"root key");
        assert!(matches!(err, Err(Error::BadCaveat(_))));
    }

    #[test]
    fn encrypted_roundtrip_through_decoder() {
        let third_party = KeyPair::generate();
        let encoder = encoder_for(&third_party, "http://auth/", true);
        let caveat = Caveat::third_party("http://auth/discharge-me", "access-allowed");
        let id = encoder.new_caveat_id(&caveat, b"discharge root key").unwrap();

        let decoder = CaveatIdDecoder::new(Arc::new(MemStorage::new()), third_party);
        let (root_key, condition) = decoder.decode_caveat_id(&id).unwrap();
        assert_eq!(root_key, b"discharge root key");
        assert_eq!(condition, "access-allowed");
    }

    #[test]
    fn decoder_rejects_id_sealed_for_someone_else() {
        let third_party = KeyPair::generate();
        let encoder = encoder_for(&third_party, "http://auth/", true);
        let caveat = Caveat::third_party("http://auth/", "access-allowed");
        let id = encoder.new_caveat_id(&caveat, b"discharge root key").unwrap();

        let other = KeyPair::generate();
        let decoder = CaveatIdDecoder::new(Arc::new(MemStorage::new()), other);
        assert!(matches!(
            decoder.decode_caveat_id(&id),
            Err(Error::PublicKeyMismatch)
        ));
    }

    #[test]
    fn stored_roundtrip_through_decoder() {
        let store = Arc::new(MemStorage::new());
        let record = serde_json::to_string(&CaveatIdRecord {
            root_key: b"discharge root key".to_vec(),
            condition: String::from("access-allowed"),
        })
        .unwrap();
        store.put("third-party-abc123", &record).unwrap();

        let id = ThirdPartyCaveatId::Stored {
            id: String::from("abc123"),
        }
        .encode()
        .unwrap();
        let decoder = CaveatIdDecoder::new(store, KeyPair::generate());
        let (root_key, condition) = decoder.decode_caveat_id(&id).unwrap();
        assert_eq!(root_key, b"discharge root key");
        assert_eq!(condition, "access-allowed");
    }

    #[test]
    fn stored_id_with_no_record_is_not_found() {
        let id = ThirdPartyCaveatId::Stored {
            id: String::from("missing"),
        }
        .encode()
        .unwrap();
        let decoder = CaveatIdDecoder::new(Arc::new(MemStorage::new()), KeyPair::generate());
        assert!(matches!(
            decoder.decode_caveat_id(&id),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn envelope_roundtrips_both_variants() {
        let stored = ThirdPartyCaveatId::Stored {
            id: String::from("handle"),
        };
        assert_eq!(
            ThirdPartyCaveatId::decode(&stored.encode().unwrap()).unwrap(),
            stored
        );

        let pair = KeyPair::generate();
        let encrypted = ThirdPartyCaveatId::Encrypted {
            third_party_public_key: *pair.public(),
            first_party_public_key: *pair.public(),
            nonce: [7u8; NONCE_BYTES],
            sealed: vec![1, 2, 3],
        };
        assert_eq!(
            ThirdPartyCaveatId::decode(&encrypted.encode().unwrap()).unwrap(),
            encrypted
        );
    }

    #[test]
    fn partial_envelopes_are_rejected() {
        let pair = KeyPair::generate();
        let json = serde_json::json!({
            "ThirdPartyPublicKey": STANDARD.encode(pair.public().as_bytes()),
            "Id": "x",
        });
        let encoded = URL_SAFE.encode(serde_json::to_vec(&json).unwrap());
        assert!(matches!(
            ThirdPartyCaveatId::decode(&encoded),
            Err(Error::BadEnvelope(_))
        ));

        assert!(matches!(
            ThirdPartyCaveatId::decode("not base64!"),
            Err(Error::BadEnvelope(_))
        ));
    }
}
