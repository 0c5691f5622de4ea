//! Account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, immutable account identifier.
///
/// Identifiers are assigned at account creation and never change. The derived
/// `Ord` gives the total order used to acquire multiple account locks without
/// deadlock: two-account operations always lock the smaller id first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}
