// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runlevel configuration.
//!
//! Runlevels are keyed by their primary name ("single", "multi-user", ...).
//! Each carries a set of aliases (the single-character init codes plus the
//! special aliases `default` and `override`) and the names of predecessor
//! runlevels it requires. The `override` alias wins over `default` exactly
//! once per boot; the daemon removes it from the persisted configuration
//! after consuming it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One runlevel: aliases plus predecessor runlevels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runlevel {
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub requires: BTreeSet<String>,
}

/// The full runlevel table, keyed by primary name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runlevels(pub BTreeMap<String, Runlevel>);

impl Runlevels {
    /// The built-in table used when no runlevel configuration exists.
    pub fn builtin() -> Self {
        let mut map = BTreeMap::new();
        let mut insert = |name: &str, aliases: &[&str], requires: &[&str]| {
            map.insert(
                name.to_string(),
                Runlevel {
                    aliases: aliases.iter().map(|a| a.to_string()).collect(),
                    requires: requires.iter().map(|r| r.to_string()).collect(),
                },
            );
        };
        insert("boot", &[], &[]);
        insert("single", &["1", "s", "S"], &[]);
        insert("multi-user", &["2"], &[]);
        insert("networking", &["3", "default"], &["multi-user"]);
        insert("graphical", &["4"], &["networking"]);
        Self(map)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Runlevel> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Runlevel)> {
        self.0.iter()
    }

    /// Resolve a requested runlevel, a primary name or an alias, to the
    /// primary name. Requests for `default` prefer a configured `override`
    /// alias; the boolean reports whether the override was used.
    pub fn resolve<'a>(&'a self, request: &'a str) -> Option<(&'a str, bool)> {
        if self.0.contains_key(request) {
            return Some((request, false));
        }
        if request == "default" {
            if let Some(name) = self.find_alias("override") {
                return Some((name, true));
            }
        }
        self.find_alias(request).map(|name| (name, false))
    }

    fn find_alias(&self, alias: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, rl)| rl.aliases.contains(alias))
            .map(|(name, _)| name.as_str())
    }

    /// The short code reported in the `RUNLEVEL` environment variable: the
    /// first single-character alias, or the primary name when none exists.
    pub fn code<'a>(&'a self, primary: &'a str) -> &'a str {
        self.0
            .get(primary)
            .and_then(|rl| rl.aliases.iter().find(|a| a.len() == 1))
            .map(String::as_str)
            .unwrap_or(primary)
    }

    /// Drop the `override` alias everywhere. Returns true if one was found.
    pub fn remove_override(&mut self) -> bool {
        let mut removed = false;
        for rl in self.0.values_mut() {
            removed |= rl.aliases.remove("override");
        }
        removed
    }
}

#[cfg(test)]
#[path = "runlevel_tests.rs"]
mod tests;
