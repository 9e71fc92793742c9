//! On-disk lock layouts and the migration ladder between them.
//!
//! ```text
//! v1, v2   version: 2
//!          resources:
//!            - type: package
//!              id: brew:jq
//!              metadata: { manager: brew, name: jq, version: "1.7" }
//!
//! v3       version: 3
//!          packages:
//!            brew:
//!              - jq
//!              - { name: ripgrep, version: "14.1.0" }
//! ```
//!
//! A missing `version` key reads as v1. Unknown keys are ignored on read and
//! never written. Hand-edited files often leave names and versions unquoted
//! (`2048`, `1.7`), so any YAML scalar is read as a string.
use std::collections::BTreeMap;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use super::{CURRENT_VERSION, Lock, LockEntry};
use crate::error::LockError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyLock {
    resources: Vec<LegacyResource>,
    /// Some v1 writers grouped packages by manager already.
    packages: BTreeMap<String, Vec<PackageEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyResource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(deserialize_with = "lenient_string")]
    name: String,
    #[serde(deserialize_with = "optional_string")]
    version: Option<String>,
    metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct LockV3 {
    version: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    packages: BTreeMap<String, Vec<PackageEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum PackageEntry {
    Name(#[serde(deserialize_with = "scalar_string")] String),
    Full(FullEntry),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
struct FullEntry {
    #[serde(deserialize_with = "lenient_string")]
    name: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string"
    )]
    version: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
}

impl PackageEntry {
    fn into_entry(self, manager: &str) -> Option<LockEntry> {
        let (name, version, metadata) = match self {
            Self::Name(name) => (name, None, BTreeMap::new()),
            Self::Full(full) => (full.name, full.version, full.metadata),
        };
        if name.is_empty() {
            return None;
        }
        Some(LockEntry {
            manager: manager.to_string(),
            name,
            version,
            metadata,
        })
    }

    fn from_entry(entry: &LockEntry) -> Self {
        if entry.version.is_none() && entry.metadata.is_empty() {
            Self::Name(entry.name.clone())
        } else {
            Self::Full(FullEntry {
                name: entry.name.clone(),
                version: entry.version.clone(),
                metadata: entry.metadata.clone(),
            })
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_str(value: Option<&Value>) -> Option<String> {
    value.and_then(scalar).filter(|s| !s.is_empty())
}

/// Any scalar as a string; other values are an error so an untagged enum
/// can move on to its next variant.
fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar(&value)
        .ok_or_else(|| D::Error::custom(format!("expected a scalar, found {value:?}")))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar(&Value::deserialize(d)?).unwrap_or_default())
}

fn optional_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_str(Some(&Value::deserialize(d)?)))
}

impl LegacyResource {
    fn into_entry(mut self) -> Option<LockEntry> {
        if self.kind != "package" {
            return None;
        }
        let manager = value_str(self.metadata.remove("manager").as_ref())?;
        let name = value_str(self.metadata.remove("name").as_ref())
            .or_else(|| (!self.name.is_empty()).then(|| self.name.clone()))
            .or_else(|| {
                let id = self.id.as_str();
                let bare = id.strip_prefix(&format!("{manager}:")).unwrap_or(id);
                (!bare.is_empty()).then(|| bare.to_string())
            })?;
        let version = value_str(self.metadata.remove("version").as_ref()).or(self.version);
        Some(LockEntry {
            manager,
            name,
            version,
            metadata: self.metadata,
        })
    }
}

fn corrupt(path: &Path, message: impl Into<String>) -> LockError {
    LockError::Corrupt {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Parse lock file text of any supported version into a [`Lock`].
///
/// # Errors
///
/// Returns [`LockError::Corrupt`] for malformed YAML or an invalid version
/// field and [`LockError::UnsupportedVersion`] for versions newer than
/// [`CURRENT_VERSION`].
pub fn parse(path: &Path, text: &str) -> Result<Lock, LockError> {
    if text.trim().is_empty() {
        return Ok(Lock::new());
    }
    let value: Value = serde_yaml::from_str(text).map_err(|e| corrupt(path, e.to_string()))?;
    let map = match &value {
        Value::Null => return Ok(Lock::new()),
        Value::Mapping(map) => map,
        _ => return Err(corrupt(path, "top level must be a mapping")),
    };

    let version = match map.get("version") {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| corrupt(path, format!("invalid version {n}")))?,
        Some(other) => return Err(corrupt(path, format!("invalid version {other:?}"))),
    };
    if version > CURRENT_VERSION {
        return Err(LockError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    let entries: Vec<LockEntry> = if version < CURRENT_VERSION {
        let legacy: LegacyLock =
            serde_yaml::from_value(value).map_err(|e| corrupt(path, e.to_string()))?;
        let grouped = grouped_entries(legacy.packages);
        legacy
            .resources
            .into_iter()
            .filter_map(LegacyResource::into_entry)
            .chain(grouped)
            .collect()
    } else {
        let current: LockV3 =
            serde_yaml::from_value(value).map_err(|e| corrupt(path, e.to_string()))?;
        grouped_entries(current.packages)
    };
    Ok(Lock::from_entries(version, entries))
}

fn grouped_entries(packages: BTreeMap<String, Vec<PackageEntry>>) -> Vec<LockEntry> {
    packages
        .into_iter()
        .flat_map(|(manager, entries)| {
            entries
                .into_iter()
                .filter_map(move |e| e.into_entry(&manager))
        })
        .collect()
}

/// Serialize `lock` in the current schema, entries sorted by manager then
/// name.
///
/// # Errors
///
/// Returns the serializer's message if YAML encoding fails.
pub fn serialize(lock: &Lock) -> Result<String, String> {
    let mut packages: BTreeMap<String, Vec<PackageEntry>> = BTreeMap::new();
    for entry in lock.entries() {
        packages
            .entry(entry.manager.clone())
            .or_default()
            .push(PackageEntry::from_entry(entry));
    }
    serde_yaml::to_string(&LockV3 {
        version: CURRENT_VERSION,
        packages,
    })
    .map_err(|e| e.to_string())
}
