//! The first-party condition vocabulary.
//!
//! A condition string is `"<identifier> <rest>"`: the identifier is
//! everything before the first space and selects the checker. [`Map`]
//! dispatches on the identifier; [`push_first_party_checker`] composes two
//! checkers with fall-through on
//! [`Error::CaveatNotRecognized`](crate::Error::CaveatNotRecognized).

use std::collections::HashMap;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{Caveat, FirstPartyChecker};
use crate::error::Error;
use crate::Result;

/// Splits a condition into its identifier and argument. The identifier is
/// everything before the first space; an empty condition is invalid.
pub fn parse_caveat(caveat: &str) -> Result<(&str, &str)> {
    if caveat.is_empty() {
        return Err(Error::BadCaveat(String::from("")));
    }
    if caveat.starts_with(' ') {
        return Err(Error::BadCaveat(String::from(caveat)));
    }
    match caveat.split_once(' ') {
        Some((identifier, rest)) => Ok((identifier, rest)),
        None => Ok((caveat, "")),
    }
}

type CheckFn = Box<dyn Fn(&str, &str) -> Result<()> + Send + Sync>;

/// A first-party checker dispatching on the condition's identifier.
/// Conditions whose identifier has no entry are not recognized.
#[derive(Default)]
pub struct Map {
    checkers: HashMap<String, CheckFn>,
}

impl Map {
    pub fn new() -> Map {
        Map::default()
    }

    /// Registers a checker for an identifier. The checker receives the full
    /// condition and the argument after the identifier.
    pub fn register<F>(&mut self, identifier: &str, check: F)
    where
        F: Fn(&str, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.checkers.insert(String::from(identifier), Box::new(check));
    }
}

impl FirstPartyChecker for Map {
    fn check_first_party_caveat(&self, caveat: &str) -> Result<()> {
        let (identifier, rest) = parse_caveat(caveat)?;
        match self.checkers.get(identifier) {
            Some(check) => check(caveat, rest),
            None => Err(Error::CaveatNotRecognized),
        }
    }
}

/// The standard checker map. Recognizes `time-before <RFC3339>`.
pub fn std() -> Map {
    let mut map = Map::new();
    map.register("time-before", time_before);
    map
}

fn time_before(caveat: &str, rest: &str) -> Result<()> {
    let when = OffsetDateTime::parse(rest, &Rfc3339).map_err(|err| Error::CaveatNotSatisfied {
        condition: String::from(caveat),
        reason: format!("cannot parse timestamp: {err}"),
    })?;
    if OffsetDateTime::now_utc() < when {
        Ok(())
    } else {
        Err(Error::CaveatNotSatisfied {
            condition: String::from(caveat),
            reason: String::from("after expiry time"),
        })
    }
}

/// A first-party caveat requiring the wall clock to be strictly before `t`.
pub fn expires_before(t: OffsetDateTime) -> Result<Caveat> {
    let stamp = t
        .format(&Rfc3339)
        .map_err(|_| Error::BadCaveat(String::from("unrepresentable expiry time")))?;
    Ok(Caveat::first_party(format!("time-before {stamp}")))
}

/// Composes two checkers: `c0` first, falling back to `c1` only when `c0`
/// does not recognize the condition.
pub fn push_first_party_checker<A, B>(c0: A, c1: B) -> impl FirstPartyChecker
where
    A: FirstPartyChecker,
    B: FirstPartyChecker,
{
    Push(c0, c1)
}

struct Push<A, B>(A, B);

impl<A, B> FirstPartyChecker for Push<A, B>
where
    A: FirstPartyChecker,
    B: FirstPartyChecker,
{
    fn check_first_party_caveat(&self, caveat: &str) -> Result<()> {
        match self.0.check_first_party_caveat(caveat) {
            Err(Error::CaveatNotRecognized) => self.1.check_first_party_caveat(caveat),
            outcome => outcome,
        }
    }
}
