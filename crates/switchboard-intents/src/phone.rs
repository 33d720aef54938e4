//! Phone number normalization to E.164.
//!
//! Parsing and validation use libphonenumber's numbering-plan metadata via
//! the `phonenumber` crate. Numbers written without a country code are read
//! in the configured default region.

use phonenumber::country;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// E.164 caps a number at 15 digits including the country code.
const MAX_E164_DIGITS: usize = 15;

/// Shortest digit run in free text treated as a phone number.
const MIN_SPOKEN_DIGITS: usize = 10;

/// Runs of digits in free text, with an optional leading `+`.
static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d+").expect("digit run pattern is valid"));

/// Default region used to interpret numbers written without a country code.
///
/// Accepts any ISO 3166-1 alpha-2 code known to the numbering-plan metadata,
/// case-insensitively, plus `UK` as an alias for `GB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(country::Id);

impl Region {
    pub const US: Region = Region(country::Id::US);
    pub const CA: Region = Region(country::Id::CA);
    pub const GB: Region = Region(country::Id::GB);
    pub const AU: Region = Region(country::Id::AU);

    pub fn id(self) -> country::Id {
        self.0
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::US
    }
}

impl From<country::Id> for Region {
    fn from(id: country::Id) -> Self {
        Self(id)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let code = if code == "UK" { "GB".to_string() } else { code };
        code.parse::<country::Id>()
            .map(Self)
            .map_err(|_| format!("unsupported default region: {code}"))
    }
}

impl TryFrom<String> for Region {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.to_string()
    }
}

/// Normalizes `raw` to E.164 (`+<country><number>`), or `None` if it is not a
/// valid phone number.
///
/// Numbers without an international prefix are read in `default_region`.
/// Normalizing an already-normalized number returns it unchanged.
pub fn normalize(raw: &str, default_region: Region) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let number = phonenumber::parse(Some(default_region.id()), raw).ok()?;
    if !phonenumber::is_valid(&number) {
        return None;
    }
    Some(number.format().mode(Mode::E164).to_string())
}

/// Finds a candidate phone number embedded in free text.
///
/// Separators are removed first, so "201 555-0123" and "(201) 555.0123" are
/// both found. Digit runs shorter than ten or longer than E.164 allows are
/// skipped whole. The candidate is not validated; pass it to [`normalize`].
pub fn extract_digits(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect();
    DIGIT_RUN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .find(|run| {
            let digits = run.trim_start_matches('+').len();
            (MIN_SPOKEN_DIGITS..=MAX_E164_DIGITS).contains(&digits)
        })
        .map(str::to_string)
}
