//! AMS net id validation
//!
//! An AMS net id is six dot-separated integer groups, each in 0..=255
//! (e.g. `192.168.0.10.1.1`). Validation is synchronous, side-effect-free
//! and runs exactly once, at connection construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AdsClientError, Result};

/// Number of dot-separated groups in a valid AMS net id
const NET_ID_GROUPS: usize = 6;

/// A validated AMS net id. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AmsNetId {
    groups: [u8; NET_ID_GROUPS],
}

impl AmsNetId {
    /// Parse and validate a candidate net id string.
    ///
    /// Fails with an address error naming the violated rule: wrong group
    /// count, or a numeral outside 0..=255 (empty and non-numeric groups
    /// fall under the latter).
    pub fn parse(candidate: &str) -> Result<Self> {
        let parts: Vec<&str> = candidate.split('.').collect();
        if parts.len() != NET_ID_GROUPS {
            return Err(AdsClientError::address(format!(
                "'{candidate}': expected {NET_ID_GROUPS} dot-separated groups, found {}",
                parts.len()
            )));
        }

        let mut groups = [0u8; NET_ID_GROUPS];
        for (i, part) in parts.iter().enumerate() {
            groups[i] = part.parse::<u8>().map_err(|_| {
                AdsClientError::address(format!(
                    "'{candidate}': group '{part}' is not an integer within 0-255"
                ))
            })?;
        }

        Ok(Self { groups })
    }

    /// The normalized dotted form
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.groups;
        write!(f, "{}.{}.{}.{}.{}.{}", g[0], g[1], g[2], g[3], g[4], g[5])
    }
}

impl TryFrom<String> for AmsNetId {
    type Error = AdsClientError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<AmsNetId> for String {
    fn from(id: AmsNetId) -> Self {
        id.to_string()
    }
}

impl std::str::FromStr for AmsNetId {
    type Err = AdsClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
