//! Package manager capabilities, the manager registry, and lock-driven
//! package reconciliation and apply.
pub mod apply;
pub mod classify;
pub mod command;
pub mod operations;
pub mod provider;
pub mod registry;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::PackageError;
pub use classify::{CommandOutcome, Operation, OutputClass};
pub use command::CommandManager;
pub use registry::ManagerRegistry;

/// A package reported by a manager's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    /// Package name as the manager spells it.
    pub name: String,
    /// Installed version, when the listing includes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl InstalledPackage {
    /// Package without a version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Attach a version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Uniform capability surface over one external package manager.
///
/// Every method takes a [`CancelToken`]; implementations check it before
/// spawning a process and kill the process when it fires.
pub trait PackageManager: Send + Sync + std::fmt::Debug {
    /// Registry name (`brew`, `npm`, ...).
    fn name(&self) -> &str;

    /// Whether the manager's binary is on `PATH` and runs.
    ///
    /// A binary that is missing or exits non-zero is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Interrupted`] when the probe was cancelled or
    /// timed out, so callers can tell "not installed" from "did not answer".
    fn is_available(&self, cancel: &CancelToken) -> Result<bool, PackageError>;

    /// Every package the manager reports as installed.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] if the listing fails or cannot be parsed.
    fn list_installed(&self, cancel: &CancelToken) -> Result<Vec<InstalledPackage>, PackageError>;

    /// Install one package. Already-installed is success.
    ///
    /// # Errors
    ///
    /// Returns the classified [`PackageError`] on failure.
    fn install(&self, cancel: &CancelToken, name: &str) -> Result<CommandOutcome, PackageError>;

    /// Uninstall one package. Not-installed is success.
    ///
    /// # Errors
    ///
    /// Returns the classified [`PackageError`] on failure.
    fn uninstall(&self, cancel: &CancelToken, name: &str) -> Result<CommandOutcome, PackageError>;

    /// Upgrade one installed package. Already-current is success.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Unsupported`] unless the manager overrides
    /// this, else the classified [`PackageError`] on failure.
    fn upgrade(&self, _cancel: &CancelToken, _name: &str) -> Result<CommandOutcome, PackageError> {
        Err(PackageError::Unsupported {
            manager: self.name().to_string(),
            operation: Operation::Upgrade.to_string(),
        })
    }

    /// Search the manager's index.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Unsupported`] if the manager has no search
    /// command, or the failure of the search command.
    fn search(&self, cancel: &CancelToken, query: &str) -> Result<Vec<String>, PackageError>;

    /// Whether `name` appears in [`list_installed`](Self::list_installed).
    ///
    /// # Errors
    ///
    /// See [`list_installed`](Self::list_installed).
    fn is_installed(&self, cancel: &CancelToken, name: &str) -> Result<bool, PackageError> {
        Ok(self.list_installed(cancel)?.iter().any(|p| p.name == name))
    }

    /// Installed version of `name`, if installed and reported.
    ///
    /// # Errors
    ///
    /// See [`list_installed`](Self::list_installed).
    fn installed_version(
        &self,
        cancel: &CancelToken,
        name: &str,
    ) -> Result<Option<String>, PackageError> {
        Ok(self
            .list_installed(cancel)?
            .into_iter()
            .find(|p| p.name == name)
            .and_then(|p| p.version))
    }
}

/// Split `manager:name` into its parts. A bare name has no manager.
#[must_use]
pub fn parse_package_spec(spec: &str) -> (Option<&str>, &str) {
    match spec.split_once(':') {
        Some((manager, name)) if !manager.is_empty() && !name.is_empty() => (Some(manager), name),
        _ => (None, spec),
    }
}
