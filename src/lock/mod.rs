//! Versioned persistence of the packages under management.
//!
//! The lock file is the desired state for the package domain. Readers accept
//! every schema version up to [`CURRENT_VERSION`]; writers always emit the
//! current one, so a lock file migrates forward the first time it is
//! written.
pub mod schema;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::LockError;
pub use store::YamlLockStore;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 3;

/// One package under management.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LockEntry {
    /// Package manager name.
    pub manager: String,
    /// Package name.
    pub name: String,
    /// Version recorded at install time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Extra data carried through unchanged.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl LockEntry {
    /// Entry without version or metadata.
    #[must_use]
    pub fn new(manager: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a version.
    #[must_use]
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }
}

/// In-memory lock contents, always in the current shape regardless of the
/// schema version it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    /// Schema version found on disk ([`CURRENT_VERSION`] for new locks).
    pub version: u32,
    entries: Vec<LockEntry>,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Empty lock at the current version.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            entries: Vec::new(),
        }
    }

    /// Lock read from `version` with `entries`; duplicates collapse to the
    /// last occurrence.
    #[must_use]
    pub fn from_entries(version: u32, entries: impl IntoIterator<Item = LockEntry>) -> Self {
        let mut lock = Self {
            version,
            entries: Vec::new(),
        };
        for entry in entries {
            lock.add(entry);
        }
        lock
    }

    /// Entries sorted by manager, then name.
    #[must_use]
    pub const fn entries(&self) -> &[LockEntry] {
        self.entries.as_slice()
    }

    /// Number of packages.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no package is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct manager names, sorted.
    #[must_use]
    pub fn managers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().map(|e| e.manager.as_str()).collect();
        names.dedup();
        names
    }

    /// Entries recorded for `manager`.
    pub fn packages_for<'a>(&'a self, manager: &'a str) -> impl Iterator<Item = &'a LockEntry> {
        self.entries.iter().filter(move |e| e.manager == manager)
    }

    /// Upsert by `(manager, name)`.
    pub fn add(&mut self, entry: LockEntry) {
        match self.position(&entry.manager, &entry.name) {
            Ok(i) => {
                if let Some(slot) = self.entries.get_mut(i) {
                    *slot = entry;
                }
            }
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove `(manager, name)`. Returns whether an entry was removed.
    pub fn remove(&mut self, manager: &str, name: &str) -> bool {
        self.position(manager, name)
            .map(|i| self.entries.remove(i))
            .is_ok()
    }

    /// Look up `(manager, name)`.
    #[must_use]
    pub fn find(&self, manager: &str, name: &str) -> Option<&LockEntry> {
        self.position(manager, name)
            .ok()
            .and_then(|i| self.entries.get(i))
    }

    /// Returns `true` if `(manager, name)` is recorded.
    #[must_use]
    pub fn contains(&self, manager: &str, name: &str) -> bool {
        self.position(manager, name).is_ok()
    }

    /// Managers that record a package called `name`.
    #[must_use]
    pub fn managers_of(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.manager.as_str())
            .collect()
    }

    fn position(&self, manager: &str, name: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| (e.manager.as_str(), e.name.as_str()).cmp(&(manager, name)))
    }
}

/// Persistent storage for a [`Lock`].
///
/// The provided methods are read-modify-write helpers; callers that change
/// several entries should read once, edit the [`Lock`] and write once.
#[cfg_attr(test, mockall::automock)]
pub trait LockStore: Send + Sync + std::fmt::Debug {
    /// Location of the lock file.
    fn path(&self) -> PathBuf;

    /// Read and migrate the lock file. A missing file is an empty lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Corrupt`] for malformed content,
    /// [`LockError::UnsupportedVersion`] for newer schemas and
    /// [`LockError::Read`] for I/O failures.
    fn read(&self) -> Result<Lock, LockError>;

    /// Write `lock` in the current schema.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Write`] if serialization or the atomic write fails.
    fn write(&self, lock: &Lock) -> Result<(), LockError>;

    /// Upsert one entry.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read) and [`write`](Self::write).
    fn add_package(&self, entry: LockEntry) -> Result<(), LockError> {
        let mut lock = self.read()?;
        lock.add(entry);
        self.write(&lock)
    }

    /// Remove one entry. Removing an absent entry is a no-op that does not
    /// touch the file.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read) and [`write`](Self::write).
    fn remove_package(&self, manager: &str, name: &str) -> Result<bool, LockError> {
        let mut lock = self.read()?;
        if !lock.remove(manager, name) {
            return Ok(false);
        }
        self.write(&lock)?;
        Ok(true)
    }

    /// Whether `(manager, name)` is recorded.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    fn has_package(&self, manager: &str, name: &str) -> Result<bool, LockError> {
        Ok(self.read()?.contains(manager, name))
    }

    /// The entry for `(manager, name)`, if recorded.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    fn find_package(&self, manager: &str, name: &str) -> Result<Option<LockEntry>, LockError> {
        Ok(self.read()?.find(manager, name).cloned())
    }
}
