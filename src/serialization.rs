//! JSON codec for macaroons.
//!
//! The wire shape is `{location, identifier, caveats, signature}` with the
//! signature and verification ids hex-encoded; `vid` is the empty string for
//! first-party caveats. Round-tripping a macaroon through this codec yields
//! a value equal to the original.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::caveat::Caveat;
use crate::macaroon::{Macaroon, SIGNATURE_BYTES};
use crate::Result;

#[derive(Serialize, Deserialize)]
struct MacaroonJson {
    location: String,
    identifier: String,
    caveats: Vec<CaveatJson>,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct CaveatJson {
    cid: String,
    vid: String,
    location: String,
}

impl Serialize for Macaroon {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let caveats = self
            .caveats()
            .iter()
            .map(|caveat| CaveatJson {
                cid: String::from(caveat.id()),
                vid: hex::encode(caveat.verifier_id()),
                location: String::from(caveat.location()),
            })
            .collect();
        MacaroonJson {
            location: String::from(self.location()),
            identifier: String::from(self.id()),
            caveats,
            signature: hex::encode(self.signature()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Macaroon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = MacaroonJson::deserialize(deserializer)?;
        let sig_bytes = hex::decode(&json.signature)
            .map_err(|err| de::Error::custom(format!("cannot decode macaroon signature: {err}")))?;
        let signature: [u8; SIGNATURE_BYTES] = sig_bytes
            .try_into()
            .map_err(|_| de::Error::custom("macaroon signature has wrong length"))?;
        if json.identifier.is_empty() {
            return Err(de::Error::custom("no macaroon identifier"));
        }
        let mut caveats = Vec::with_capacity(json.caveats.len());
        for caveat in json.caveats {
            let verifier_id = hex::decode(&caveat.vid)
                .map_err(|err| de::Error::custom(format!("cannot decode verification id: {err}")))?;
            caveats.push(Caveat {
                id: caveat.cid,
                verifier_id,
                location: caveat.location,
            });
        }
        Ok(Macaroon {
            location: json.location,
            id: json.identifier,
            caveats,
            signature,
        })
    }
}

impl Macaroon {
    /// Serializes the macaroon to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a macaroon from its JSON wire form.
    pub fn from_json(data: &str) -> Result<Macaroon> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Serde adapter encoding `Vec<u8>` as a standard-base64 string, the way Go
/// marshals byte slices in JSON.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}

/// Like [`base64_bytes`], for optional fields.
pub(crate) mod base64_bytes_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::macaroon::Macaroon;

    #[test]
    fn json_roundtrip_preserves_every_field() {
        let mut macaroon = Macaroon::new(b"the root key", "keyid", "http://example.org/").unwrap();
        macaroon.add_first_party_caveat("account = 3735928559");
        macaroon
            .add_third_party_caveat(&[4u8; 32], "access-allowed", "http://auth.example.org/")
            .unwrap();

        let json = macaroon.to_json().unwrap();
        let decoded = Macaroon::from_json(&json).unwrap();
        assert_eq!(macaroon, decoded);
    }

    #[test]
    fn first_party_vid_is_empty_string() {
        let mut macaroon = Macaroon::new(b"the root key", "keyid", "loc").unwrap();
        macaroon.add_first_party_caveat("user = alice");
        let json = macaroon.to_json().unwrap();
        assert!(json.contains("\"vid\":\"\""));
        assert!(json.contains("\"cid\":\"user = alice\""));
    }

    #[test]
    fn signature_is_hex_encoded() {
        let macaroon = Macaroon::new(b"the root key", "keyid", "loc").unwrap();
        let json = macaroon.to_json().unwrap();
        let expected = hex::encode(macaroon.signature());
        assert!(json.contains(&expected));
    }

    #[test]
    fn bad_signature_hex_is_rejected() {
        let err = Macaroon::from_json(
            "{\"location\":\"\",\"identifier\":\"m\",\"caveats\":[],\"signature\":\"zz\"}",
        );
        assert!(err.is_err());
    }

    #[test]
    fn wrong_signature_length_is_rejected() {
        let err = Macaroon::from_json(
            "{\"location\":\"\",\"identifier\":\"m\",\"caveats\":[],\"signature\":\"abcd\"}",
        );
        assert!(err.is_err());
    }
}
