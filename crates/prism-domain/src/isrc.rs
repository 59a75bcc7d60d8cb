// SPDX-License-Identifier: GPL-3.0-or-later

//! International Standard Recording Code handling.
//!
//! An ISRC is twelve characters: a two letter country code, a three character
//! alphanumeric registrant code, a two digit year of reference and a five
//! digit designation code. Input is accepted in any case and with hyphens or
//! whitespace between the groups (`us-rc1-76-07839`).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref ISRC_PATTERN: Regex =
        Regex::new(r"^[A-Z]{2}[A-Z0-9]{3}[0-9]{7}$").expect("isrc regex is valid");

    // Loose form used when scanning free text: separators allowed between groups.
    static ref ISRC_IN_TEXT: Regex = Regex::new(
        r"\b[A-Z]{2}[-\s]?[A-Z0-9]{3}[-\s]?[0-9]{2}[-\s]?[0-9]{5}\b"
    )
    .expect("isrc scan regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsrcError {
    #[error("ISRC is empty")]
    Empty,

    #[error("Invalid ISRC format: {0}")]
    InvalidFormat(String),
}

/// Uppercase and strip hyphens and whitespace.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// True iff `normalized` has the `{2 letters}{3 alphanumeric}{7 digits}` shape.
pub fn validate(normalized: &str) -> bool {
    ISRC_PATTERN.is_match(normalized)
}

/// Scan free text (CSV cells, pasted lists, descriptions) for ISRCs.
///
/// Every candidate is normalized and validated; the result is deduplicated
/// and sorted.
pub fn extract_all(text: &str) -> BTreeSet<String> {
    let upper = text.to_uppercase();
    ISRC_IN_TEXT
        .find_iter(&upper)
        .map(|m| normalize(m.as_str()))
        .filter(|candidate| validate(candidate))
        .collect()
}

/// A validated, normalized ISRC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isrc(String);

impl Isrc {
    pub fn parse(raw: &str) -> Result<Self, IsrcError> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(IsrcError::Empty);
        }
        if !validate(&normalized) {
            return Err(IsrcError::InvalidFormat(raw.trim().to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn country_code(&self) -> &str {
        &self.0[0..2]
    }

    pub fn registrant_code(&self) -> &str {
        &self.0[2..5]
    }

    pub fn year_of_reference(&self) -> &str {
        &self.0[5..7]
    }

    pub fn designation_code(&self) -> &str {
        &self.0[7..12]
    }
}

impl fmt::Display for Isrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isrc {
    type Err = IsrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Isrc {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Isrc {
    type Error = IsrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isrc> for String {
    fn from(value: Isrc) -> Self {
        value.0
    }
}
