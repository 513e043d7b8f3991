// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit names and their validation rules.
//!
//! A unit name is shaped like a relative filesystem path: slash-separated
//! segments of letters, digits, `.`, `_`, space, `-`, and high-bit bytes.
//! Segments may not begin or end with `.`, space, or `-`, and two of those
//! characters may not be adjacent. The whole name must fit in a directory
//! entry (NAME_MAX applies to each segment; the original loader also caps
//! the full name).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest permitted unit name, matching the filesystem's NAME_MAX - 1.
pub const NAME_MAX: usize = 254;

/// Runlevel units are synthesised under this prefix: `system/runlevel <name>`.
pub const RUNLEVEL_PREFIX: &str = "system/runlevel ";

/// Dependency references on runlevels are written as `system/<runlevel>`.
pub const SYSTEM_PREFIX: &str = "system/";

/// Errors from unit name validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("unit name is empty")]
    Empty,

    #[error("unit name exceeds {NAME_MAX} bytes")]
    TooLong,

    #[error("invalid character {0:?} in unit name")]
    BadCharacter(char),

    #[error("empty path segment in unit name")]
    EmptySegment,

    #[error("path segment may not begin or end with '.', ' ', or '-'")]
    BadSegmentEdge,

    #[error("adjacent '.', ' ', or '-' characters in unit name")]
    AdjacentSpecial,
}

/// A validated unit name.
///
/// Names order lexicographically; the scheduler's circular-dependency break
/// relies on this ordering being deterministic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitName(String);

fn is_special(c: char) -> bool {
    matches!(c, '.' | ' ' | '-')
}

fn is_permitted(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-' | '/') || !c.is_ascii()
}

fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > NAME_MAX {
        return Err(NameError::TooLong);
    }
    if let Some(c) = name.chars().find(|&c| !is_permitted(c)) {
        return Err(NameError::BadCharacter(c));
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(NameError::EmptySegment);
        }
        let first = segment.chars().next().unwrap_or('/');
        let last = segment.chars().next_back().unwrap_or('/');
        if is_special(first) || is_special(last) {
            return Err(NameError::BadSegmentEdge);
        }
        let mut prev_special = false;
        for c in segment.chars() {
            let special = is_special(c);
            if special && prev_special {
                return Err(NameError::AdjacentSpecial);
            }
            prev_special = special;
        }
    }
    Ok(())
}

impl UnitName {
    /// Validate and construct a unit name.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// The synthesised unit name for a runlevel: `system/runlevel <name>`.
    pub fn runlevel(runlevel: &str) -> Self {
        Self(format!("{RUNLEVEL_PREFIX}{runlevel}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a synthesised runlevel unit name.
    pub fn is_runlevel(&self) -> bool {
        self.0.starts_with(RUNLEVEL_PREFIX)
    }

    /// The bare runlevel name, if this is a runlevel unit.
    pub fn runlevel_name(&self) -> Option<&str> {
        self.0.strip_prefix(RUNLEVEL_PREFIX)
    }

    /// The directory portion of the name, used to resolve relative
    /// dependency references. Empty for a top-level unit.
    pub fn directory(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[..pos],
            None => "",
        }
    }

    /// Resolve a dependency reference declared by this unit.
    ///
    /// A leading `/` marks the absolute form and is stripped; anything else
    /// resolves relative to this unit's directory. A reference of the form
    /// `system/<name>` where `<name>` is a configured runlevel resolves to
    /// the runlevel unit itself.
    pub fn resolve_reference(
        &self,
        reference: &str,
        is_runlevel: impl Fn(&str) -> bool,
    ) -> Result<UnitName, NameError> {
        let absolute;
        let resolved = if let Some(stripped) = reference.strip_prefix('/') {
            stripped
        } else if self.directory().is_empty() {
            reference
        } else {
            absolute = format!("{}/{}", self.directory(), reference);
            &absolute
        };

        if let Some(runlevel) = resolved.strip_prefix(SYSTEM_PREFIX) {
            if is_runlevel(runlevel) {
                return Ok(UnitName::runlevel(runlevel));
            }
        }
        UnitName::new(resolved)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FromStr for UnitName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UnitName {
    type Error = NameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UnitName> for String {
    fn from(name: UnitName) -> String {
        name.0
    }
}

impl Borrow<str> for UnitName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for UnitName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UnitName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
