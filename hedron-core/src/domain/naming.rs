//! Deterministic child naming
//!
//! A child's name is a pure function of its parent's identity and the value
//! that distinguishes it. Re-running reconciliation therefore always addresses
//! the same object, and "does the child exist?" is a single get-by-name.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::meta::MetaError;

/// Longest object name the store accepts
pub const MAX_NAME_LEN: usize = 253;

/// Resolved identifier of one source snapshot (a commit id)
///
/// Always lower-case hexadecimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(raw: &str) -> Result<Self, MetaError> {
        let hash = raw.trim().to_ascii_lowercase();

        if hash.is_empty() {
            return Err(MetaError::InvalidContentHash {
                hash: raw.to_string(),
                reason: "hash is empty".to_string(),
            });
        }

        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MetaError::InvalidContentHash {
                hash: raw.to_string(),
                reason: "hash must be hexadecimal".to_string(),
            });
        }

        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = MetaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentHash::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Name of the Revision holding `hash` for `project`
pub fn revision_name(project: &str, hash: &ContentHash) -> Result<String, MetaError> {
    let name = format!("{}-{}", project, hash);
    validate_name(&name)?;
    Ok(name)
}

/// Name of the Job executing `revision`
///
/// A Revision has exactly one Job, so the Job simply shares its name.
pub fn job_name(revision: &str) -> String {
    revision.to_string()
}

/// Checks that `name` is usable as an object name
///
/// Lower-case alphanumerics, `-` and `.`, starting and ending with an
/// alphanumeric, at most [`MAX_NAME_LEN`] characters.
pub fn validate_name(name: &str) -> Result<(), MetaError> {
    let invalid = |reason: &str| MetaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 253 characters"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "only lower-case alphanumerics, '-' and '.' are allowed",
        ));
    }

    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.starts_with(alnum) || !name.ends_with(alnum) {
        return Err(invalid("must start and end with an alphanumeric character"));
    }

    Ok(())
}
