// src/id.rs

//! Opaque catalog identifiers
//!
//! Ids are assigned by storage and carry no meaning beyond uniqueness.
//! Every caller-supplied id is checked against `^[0-9a-zA-Z]{16,32}$`
//! before it reaches storage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest accepted identifier
pub const MIN_ID_LEN: usize = 16;
/// Longest accepted identifier
pub const MAX_ID_LEN: usize = 32;

/// Check an identifier against the lexical shape
///
/// # Examples
/// ```
/// use sideload::id::validate;
///
/// assert!(validate("A1b2C3d4E5f6G7h8").is_ok());
/// assert!(validate("abc").is_err());
/// ```
pub fn validate(id: &str) -> Result<()> {
    let len_ok = (MIN_ID_LEN..=MAX_ID_LEN).contains(&id.len());
    if len_ok && id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier)
    }
}

/// A validated catalog identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Validate and wrap a caller-supplied id
    pub fn parse(id: &str) -> Result<Self> {
        validate(id)?;
        Ok(Self(id.to_string()))
    }

    /// Mint a fresh id (32 lowercase hex chars)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PackageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
