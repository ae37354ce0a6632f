// End-to-end scenarios for the macaroon primitive, checked against the
// standard condition vocabulary.

use macaroon_bakery::bakery::checkers;
use macaroon_bakery::bakery::FirstPartyChecker;
use macaroon_bakery::{Discharges, Error, Macaroon};

fn std_check(condition: &str) -> macaroon_bakery::Result<()> {
    checkers::std().check_first_party_caveat(condition)
}

#[test]
fn mint_and_verify_with_future_expiry() {
    let root_key = [0u8; 32];
    let mut macaroon = Macaroon::new(&root_key, "m1", "http://target/").unwrap();
    macaroon.add_first_party_caveat("time-before 2999-01-01T00:00:00Z");
    macaroon
        .verify(&root_key, &std_check, &Discharges::new())
        .unwrap();
}

#[test]
fn expired_macaroon_is_not_satisfied() {
    let root_key = [0u8; 32];
    let mut macaroon = Macaroon::new(&root_key, "m1", "http://target/").unwrap();
    macaroon.add_first_party_caveat("time-before 2000-01-01T00:00:00Z");
    let err = macaroon
        .verify(&root_key, &std_check, &Discharges::new())
        .unwrap_err();
    assert!(matches!(err, Error::CaveatNotSatisfied { .. }));
    assert!(err.to_string().starts_with("caveat not satisfied"));
}

#[test]
fn unknown_condition_with_empty_checker_is_not_recognized() {
    let root_key = [0u8; 32];
    let mut macaroon = Macaroon::new(&root_key, "m1", "http://target/").unwrap();
    macaroon.add_first_party_caveat("frobnicate");
    let empty = checkers::Map::new();
    let err = macaroon
        .verify(
            &root_key,
            &|condition: &str| empty.check_first_party_caveat(condition),
            &Discharges::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::CaveatNotRecognized));
    assert_eq!(err.to_string(), "caveat not recognized");
}

#[test]
fn tampered_signature_fails_with_signature_mismatch() {
    let root_key = [0u8; 32];
    let mut macaroon = Macaroon::new(&root_key, "m1", "http://target/").unwrap();
    macaroon.add_first_party_caveat("time-before 2999-01-01T00:00:00Z");

    // Flip the last nibble of the hex signature on the wire.
    let mut value: serde_json::Value = serde_json::from_str(&macaroon.to_json().unwrap()).unwrap();
    let mut signature = value["signature"].as_str().unwrap().to_string();
    let last = signature.pop().unwrap();
    signature.push(if last == '0' { '1' } else { '0' });
    value["signature"] = serde_json::Value::String(signature);

    let tampered = Macaroon::from_json(&value.to_string()).unwrap();
    let err = tampered
        .verify(&root_key, &std_check, &Discharges::new())
        .unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch));
    assert_eq!(
        err.to_string(),
        "signature mismatch after caveat verification"
    );
}

#[test]
fn json_roundtrip_preserves_verifiability() {
    let root_key = [0u8; 32];
    let mut macaroon = Macaroon::new(&root_key, "m1", "http://target/").unwrap();
    macaroon.add_first_party_caveat("time-before 2999-01-01T00:00:00Z");

    let copy = Macaroon::from_json(&macaroon.to_json().unwrap()).unwrap();
    assert_eq!(macaroon, copy);
    copy.verify(&root_key, &std_check, &Discharges::new())
        .unwrap();
}
