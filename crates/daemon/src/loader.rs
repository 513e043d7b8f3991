// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML unit loader.
//!
//! Unit files live in a directory tree; a unit's name is its relative
//! path. Files must carry `version: 1`. A load either produces the full
//! spec set or fails with every problem found; a failed reload leaves the
//! previously installed set running.
//!
//! ```yaml
//! version: 1
//! name: net/dhcp
//! description: DHCP client
//! requires:
//!   - lease
//! required-by:
//!   - /system/networking
//! starting:
//!   command: /sbin/dhcpcd
//!   type: forking
//!   timeout: 30
//! stopping:
//!   type: target
//! respawn:
//!   attempts: 3
//!   limit: 30
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use warden_core::{Runlevels, SigtermNotify, UnitName, UnitSpec};

/// Errors from loading the unit configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{}", messages.join("; "))]
    Invalid { messages: Vec<String> },
}

/// Accepts both `key: value` and `key: [a, b]` forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

fn to_vec(field: Option<OneOrMany>) -> Vec<String> {
    field.map(OneOrMany::into_vec).unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    command: Option<String>,
    timeout: Option<u32>,
    before: Option<OneOrMany>,
    after: Option<OneOrMany>,
    #[serde(rename = "type")]
    phase_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRespawn {
    attempts: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUnit {
    version: u32,
    name: Option<String>,
    description: Option<String>,
    requires: Option<OneOrMany>,
    #[serde(rename = "required-by")]
    required_by: Option<OneOrMany>,
    enabled: Option<bool>,
    starting: Option<RawPhase>,
    stopping: Option<RawPhase>,
    restart: Option<String>,
    reload: Option<String>,
    respawn: Option<RawRespawn>,
    #[serde(rename = "alternative-group")]
    alternative_group: Option<String>,
    #[serde(rename = "sigterm-notify")]
    sigterm_notify: Option<String>,
}

/// Load every unit file under `dir`.
pub fn load_units(dir: &Path, runlevels: &Runlevels) -> Result<Vec<UnitSpec>, LoadError> {
    let mut units = Vec::new();
    let mut errors = Vec::new();
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files, &mut errors);
    files.sort();

    for (path, relative) in files {
        match load_unit_file(&path, &relative, runlevels) {
            Ok(spec) => units.push(spec),
            Err(message) => errors.push(message),
        }
    }

    if errors.is_empty() {
        Ok(units)
    } else {
        Err(LoadError::Invalid { messages: errors })
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut Vec<(PathBuf, String)>,
    errors: &mut Vec<String>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            errors.push(format!("{}: {err}", dir.display()));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_files(root, &path, files, errors);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().into_owned();
        // Partial installs and editor droppings have invalid names; they
        // are skipped, not errors.
        if UnitName::new(relative.clone()).is_ok() {
            files.push((path, relative));
        }
    }
}

fn load_unit_file(
    path: &Path,
    relative: &str,
    runlevels: &Runlevels,
) -> Result<UnitSpec, String> {
    let content =
        std::fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let raw: RawUnit = serde_yaml::from_str(&content)
        .map_err(|err| format!("{}: {err}", path.display()))?;

    if raw.version != 1 {
        return Err(format!(
            "{}: unsupported version {}",
            path.display(),
            raw.version
        ));
    }

    let name = UnitName::new(relative).map_err(|err| format!("{relative}: {err}"))?;
    if let Some(declared) = &raw.name {
        if declared != relative {
            return Err(format!(
                "{relative}: declared name {declared:?} does not match its path"
            ));
        }
    }

    let mut spec = UnitSpec::new(name);
    spec.description = raw.description.unwrap_or_default();
    spec.enabled = raw.enabled.unwrap_or(true);
    spec.alternative_group = raw.alternative_group;
    spec.restarting_command = raw.restart;
    spec.reloading_command = raw.reload;

    if let Some(notify) = raw.sigterm_notify {
        spec.sigterm_notify = match notify.as_str() {
            "all" => SigtermNotify::All,
            "parents" => SigtermNotify::Parents,
            other => return Err(format!("{relative}: unknown sigterm-notify: {other}")),
        };
    }

    if let Some(starting) = raw.starting {
        spec.starting_command = starting.command;
        if let Some(timeout) = starting.timeout {
            spec.starting_timeout = timeout;
        }
        if let Some(phase_type) = starting.phase_type {
            spec.start_type = phase_type
                .parse()
                .map_err(|err| format!("{relative}: {err}"))?;
        }
        spec.starts_before = resolve_refs(&spec.name, to_vec(starting.before), runlevels)
            .map_err(|err| format!("{relative}: {err}"))?;
        spec.starts_after = resolve_refs(&spec.name, to_vec(starting.after), runlevels)
            .map_err(|err| format!("{relative}: {err}"))?;
    }

    if let Some(stopping) = raw.stopping {
        spec.stopping_command = stopping.command;
        if let Some(timeout) = stopping.timeout {
            spec.stopping_timeout = timeout;
        }
        if let Some(phase_type) = stopping.phase_type {
            spec.stop_type = phase_type
                .parse()
                .map_err(|err| format!("{relative}: {err}"))?;
        }
        spec.stops_before = resolve_refs(&spec.name, to_vec(stopping.before), runlevels)
            .map_err(|err| format!("{relative}: {err}"))?;
        spec.stops_after = resolve_refs(&spec.name, to_vec(stopping.after), runlevels)
            .map_err(|err| format!("{relative}: {err}"))?;
    }

    if let Some(respawn) = raw.respawn {
        spec.start_type = warden_core::StartType::Respawn;
        if let Some(attempts) = respawn.attempts {
            spec.respawn_attempts = attempts;
        }
        if let Some(limit) = respawn.limit {
            spec.respawn_window = limit;
        }
    }

    spec.requires = resolve_refs(&spec.name, to_vec(raw.requires), runlevels)
        .map_err(|err| format!("{relative}: {err}"))?;
    spec.required_by = resolve_refs(&spec.name, to_vec(raw.required_by), runlevels)
        .map_err(|err| format!("{relative}: {err}"))?;

    Ok(spec)
}

fn resolve_refs(
    unit: &UnitName,
    references: Vec<String>,
    runlevels: &Runlevels,
) -> Result<BTreeSet<UnitName>, String> {
    let mut resolved = BTreeSet::new();
    for reference in references {
        let name = unit
            .resolve_reference(&reference, |runlevel| runlevels.contains(runlevel))
            .map_err(|err| format!("{reference}: {err}"))?;
        resolved.insert(name);
    }
    Ok(resolved)
}

/// Load the runlevel configuration, falling back to the built-in table.
pub fn load_runlevels(path: &Path) -> Runlevels {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(runlevels) => runlevels,
            Err(err) => {
                tracing::warn!(
                    "{}: unable to parse, using built-in default: {err}",
                    path.display()
                );
                Runlevels::builtin()
            }
        },
        Err(_) => Runlevels::builtin(),
    }
}

/// Persist the runlevel configuration; used to drop a consumed one-shot
/// `override` alias.
pub fn save_runlevels(path: &Path, runlevels: &Runlevels) -> Result<(), LoadError> {
    let content = serde_yaml::to_string(runlevels).map_err(|err| LoadError::Invalid {
        messages: vec![err.to_string()],
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
