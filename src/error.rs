//! Domain-specific error types for the reconciliation engine.
//!
//! Internal modules return typed errors built with [`thiserror`]; command
//! handlers and the orchestration layer wrap them in [`anyhow::Error`] with
//! context. The two fatal categories ([`PathError`] and
//! [`LockError::Corrupt`]) stay typed inside the `anyhow` chain so callers can
//! recover them with `downcast_ref`.
//!
//! # Error hierarchy
//!
//! ```text
//! ErrorKind (taxonomy, via kind() / kind_of())
//! ├── PathError      : traversal, NUL bytes, config-dir targets
//! ├── LockError      : lock file I/O, corruption, unsupported version
//! ├── PackageError   : manager availability and command failures
//! ├── TemplateError  : template read, variables, rendering
//! ├── ExecError      : subprocess spawn and exit failures
//! └── Interrupted    : cancellation and deadlines
//! ```

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packages::classify::{Operation, OutputClass};

/// Error taxonomy shared by every typed error and by per-item results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// A path escapes the home directory or targets the config directory.
    PathValidation,
    /// A source or destination was expected to exist but does not.
    FileNotFound,
    /// Reading, writing or changing permissions of a file failed.
    FileIo,
    /// The package manager binary is missing or does not run.
    ManagerUnavailable,
    /// The package manager does not know the requested package.
    PackageNotFound,
    /// The package is already installed (treated as success on install).
    PackageAlreadyInstalled,
    /// The package is not installed (treated as success on uninstall).
    PackageNotInstalled,
    /// Elevated privileges are required.
    PermissionDenied,
    /// Another package manager process holds its database lock.
    DatabaseLocked,
    /// A command exited non-zero without a recognised pattern.
    CommandExecution,
    /// The operation was cancelled by the user.
    Cancelled,
    /// The operation exceeded its deadline.
    TimedOut,
    /// The lock file could not be parsed.
    LockCorrupt,
    /// A template could not be rendered.
    Template,
    /// The configuration is invalid.
    Config,
}

impl ErrorKind {
    /// Stable kebab-case name used in logs and serialized results.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathValidation => "path-validation",
            Self::FileNotFound => "file-not-found",
            Self::FileIo => "file-io",
            Self::ManagerUnavailable => "manager-unavailable",
            Self::PackageNotFound => "package-not-found",
            Self::PackageAlreadyInstalled => "package-already-installed",
            Self::PackageNotInstalled => "package-not-installed",
            Self::PermissionDenied => "permission-denied",
            Self::DatabaseLocked => "database-locked",
            Self::CommandExecution => "command-execution",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed-out",
            Self::LockCorrupt => "lock-corrupt",
            Self::Template => "template",
            Self::Config => "config",
        }
    }

    /// Kinds that always propagate to the caller of a whole operation
    /// instead of being recorded as a per-item failure.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::PathValidation | Self::LockCorrupt)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy kind of the first typed error in an `anyhow` chain.
///
/// Returns `None` when the chain carries only untyped context.
#[must_use]
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<PathError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<LockError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<PackageError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<TemplateError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<ExecError>() {
            Some(e.kind())
        } else {
            cause.downcast_ref::<Interrupted>().map(|e| e.kind())
        }
    })
}

/// Cooperative cancellation outcome reported by [`CancelToken::check`](crate::cancel::CancelToken::check).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interrupted {
    /// The token was cancelled (e.g. Ctrl-C).
    #[error("operation cancelled")]
    Cancelled,
    /// The token's deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl Interrupted {
    /// Taxonomy kind.
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded => ErrorKind::TimedOut,
        }
    }
}

/// Path-validation errors. Always fatal for the enclosing operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path contains a NUL byte.
    #[error("path contains null bytes: {0:?}")]
    NulByte(String),

    /// The resolved path is not inside the home directory.
    #[error("path is outside home directory: {}", .path.display())]
    OutsideHome {
        /// Offending path after resolution.
        path: PathBuf,
    },

    /// The resolved path is inside the tool's own config directory.
    #[error("cannot manage the dotkeeper configuration directory: {}", .path.display())]
    ConfigDirectory {
        /// Offending path after resolution.
        path: PathBuf,
    },

    /// A destination that is neither `~/`-relative nor absolute.
    #[error("destination {0} must start with ~/ or be absolute")]
    InvalidDestination(String),

    /// The home directory could not be determined.
    #[error("home directory could not be determined: {0}")]
    HomeUnavailable(String),
}

impl PathError {
    /// Taxonomy kind (always [`ErrorKind::PathValidation`]).
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::PathValidation
    }
}

/// Lock store errors.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock file exists but could not be read.
    #[error("failed to read lock file {}: {source}", .path.display())]
    Read {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The lock file could not be serialized or written.
    #[error("failed to write lock file {}: {message}", .path.display())]
    Write {
        /// Lock file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The lock file is not valid YAML or does not match any known schema.
    #[error("lock file {} is corrupt: {message}", .path.display())]
    Corrupt {
        /// Lock file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The lock file was written by a newer release.
    #[error(
        "lock file {} has version {found}, newer than supported version {supported}",
        .path.display()
    )]
    UnsupportedVersion {
        /// Lock file path.
        path: PathBuf,
        /// Version found on disk.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },
}

impl LockError {
    /// Taxonomy kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Read { .. } | Self::Write { .. } => ErrorKind::FileIo,
            Self::Corrupt { .. } | Self::UnsupportedVersion { .. } => ErrorKind::LockCorrupt,
        }
    }
}

/// Template processing errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template source could not be read.
    #[error("failed to read template {}: {source}", .path.display())]
    Read {
        /// Template path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The variables file could not be read or parsed.
    #[error("failed to load template variables from {}: {message}", .path.display())]
    Variables {
        /// Variables file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The template references a variable that is not defined.
    #[error("template '{template}' requires variable '{variable}' which is not defined in {vars_file}")]
    MissingVariable {
        /// Template file name.
        template: String,
        /// Dotted variable path without the leading dot.
        variable: String,
        /// Variables file, relative to the config directory.
        vars_file: String,
    },

    /// The variable exists but is a list or a map.
    #[error("template '{template}' cannot render non-scalar variable '{variable}'")]
    NonScalar {
        /// Template file name.
        template: String,
        /// Dotted variable path without the leading dot.
        variable: String,
    },

    /// The template text is malformed.
    #[error("template parse error in '{template}' at line {line}: {message}")]
    Parse {
        /// Template file name.
        template: String,
        /// One-based line of the offending action.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}

impl TemplateError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Read { source, .. } if matches!(source.kind(), io::ErrorKind::NotFound) => {
                ErrorKind::FileNotFound
            }
            Self::Read { .. } => ErrorKind::FileIo,
            _ => ErrorKind::Template,
        }
    }
}

/// Subprocess errors.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The program was killed because the token was cancelled or expired.
    #[error("{program} interrupted: {reason}")]
    Interrupted {
        /// Program name.
        program: String,
        /// Why the program was stopped.
        reason: Interrupted,
    },

    /// The program exited non-zero (only from checked runs).
    #[error("{program} failed (exit {code}): {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit code, `-1` when terminated by a signal.
        code: i32,
        /// Trimmed standard error.
        stderr: String,
    },
}

impl ExecError {
    /// Taxonomy kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } | Self::Failed { .. } => ErrorKind::CommandExecution,
            Self::Interrupted { reason, .. } => reason.kind(),
        }
    }
}

/// Package manager errors.
#[derive(Error, Debug)]
pub enum PackageError {
    /// No manager with this name is registered.
    #[error("unknown package manager '{0}'")]
    UnknownManager(String),

    /// The manager binary is missing or does not run.
    #[error("package manager '{0}' is not available")]
    ManagerUnavailable(String),

    /// The manager does not know the package.
    #[error("package '{package}' not found in {manager}")]
    NotFound {
        /// Manager name.
        manager: String,
        /// Package name.
        package: String,
    },

    /// The manager requires elevated privileges.
    #[error("permission denied running {manager} {operation} {package}: {detail}")]
    PermissionDenied {
        /// Manager name.
        manager: String,
        /// Operation attempted.
        operation: Operation,
        /// Package name.
        package: String,
        /// Trailing command output.
        detail: String,
    },

    /// Another process holds the manager's database lock.
    #[error("{manager} database is locked during {operation} {package}: {detail}")]
    DatabaseLocked {
        /// Manager name.
        manager: String,
        /// Operation attempted.
        operation: Operation,
        /// Package name.
        package: String,
        /// Trailing command output.
        detail: String,
    },

    /// The command failed without a recognised success pattern.
    #[error("{manager} {operation} {package} failed (exit {code}): {detail}")]
    CommandFailed {
        /// Manager name.
        manager: String,
        /// Operation attempted.
        operation: Operation,
        /// Package name.
        package: String,
        /// Exit code, `-1` when terminated by a signal.
        code: i32,
        /// Raw classification of the output.
        class: OutputClass,
        /// Trailing command output.
        detail: String,
    },

    /// The manager definition has no command for this operation.
    #[error("{manager} does not support {operation}")]
    Unsupported {
        /// Manager name.
        manager: String,
        /// Operation name.
        operation: String,
    },

    /// The manager's listing could not be parsed.
    #[error("failed to parse {manager} output: {message}")]
    Parse {
        /// Manager name.
        manager: String,
        /// Parser message.
        message: String,
    },

    /// The manager binary could not be executed.
    #[error("failed to run {manager}: {message}")]
    Exec {
        /// Manager name.
        manager: String,
        /// Description of the failure.
        message: String,
    },

    /// The command was stopped by cancellation or a deadline.
    #[error("{manager} interrupted: {reason}")]
    Interrupted {
        /// Manager name.
        manager: String,
        /// Why the command was stopped.
        reason: Interrupted,
    },
}

impl PackageError {
    /// Convert an executor failure into a package error for `manager`.
    #[must_use]
    pub fn from_exec(manager: &str, err: ExecError) -> Self {
        match err {
            ExecError::Interrupted { reason, .. } => Self::Interrupted {
                manager: manager.to_string(),
                reason,
            },
            other => Self::Exec {
                manager: manager.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Taxonomy kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownManager(_) | Self::ManagerUnavailable(_) => ErrorKind::ManagerUnavailable,
            Self::NotFound { .. } => ErrorKind::PackageNotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::DatabaseLocked { .. } => ErrorKind::DatabaseLocked,
            Self::CommandFailed { .. }
            | Self::Unsupported { .. }
            | Self::Parse { .. }
            | Self::Exec { .. } => ErrorKind::CommandExecution,
            Self::Interrupted { reason, .. } => reason.kind(),
        }
    }

    /// Returns `true` when the user cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Interrupted {
                reason: Interrupted::Cancelled,
                ..
            }
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // PathError
    // -----------------------------------------------------------------------

    #[test]
    fn path_error_outside_home_display() {
        let e = PathError::OutsideHome {
            path: PathBuf::from("/etc/passwd"),
        };
        assert_eq!(e.to_string(), "path is outside home directory: /etc/passwd");
        assert_eq!(e.kind(), ErrorKind::PathValidation);
        assert!(e.kind().is_fatal());
    }

    #[test]
    fn path_error_invalid_destination_display() {
        let e = PathError::InvalidDestination("zshrc".to_string());
        assert_eq!(e.to_string(), "destination zshrc must start with ~/ or be absolute");
    }

    // -----------------------------------------------------------------------
    // LockError
    // -----------------------------------------------------------------------

    #[test]
    fn lock_error_corrupt_is_fatal() {
        let e = LockError::Corrupt {
            path: PathBuf::from("/cfg/dotkeeper.lock"),
            message: "did not find expected key".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "lock file /cfg/dotkeeper.lock is corrupt: did not find expected key"
        );
        assert!(e.kind().is_fatal());
    }

    #[test]
    fn lock_error_read_has_source() {
        use std::error::Error as StdError;
        let e = LockError::Read {
            path: PathBuf::from("/cfg/dotkeeper.lock"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(e.source().is_some());
        assert_eq!(e.kind(), ErrorKind::FileIo);
    }

    #[test]
    fn lock_error_unsupported_version_display() {
        let e = LockError::UnsupportedVersion {
            path: PathBuf::from("dotkeeper.lock"),
            found: 9,
            supported: 3,
        };
        assert_eq!(
            e.to_string(),
            "lock file dotkeeper.lock has version 9, newer than supported version 3"
        );
    }

    // -----------------------------------------------------------------------
    // TemplateError
    // -----------------------------------------------------------------------

    #[test]
    fn template_error_missing_variable_display() {
        let e = TemplateError::MissingVariable {
            template: "gitconfig.tmpl".to_string(),
            variable: "email".to_string(),
            vars_file: ".dotkeeper/local.yaml".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "template 'gitconfig.tmpl' requires variable 'email' which is not defined in .dotkeeper/local.yaml"
        );
    }

    #[test]
    fn template_error_read_not_found_kind() {
        let e = TemplateError::Read {
            path: PathBuf::from("a.tmpl"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(e.kind(), ErrorKind::FileNotFound);
    }

    // -----------------------------------------------------------------------
    // PackageError
    // -----------------------------------------------------------------------

    #[test]
    fn package_error_from_exec_keeps_cancellation() {
        let e = PackageError::from_exec(
            "brew",
            ExecError::Interrupted {
                program: "brew".to_string(),
                reason: Interrupted::Cancelled,
            },
        );
        assert!(e.is_cancelled());
        assert_eq!(e.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn package_error_timeout_is_not_cancellation() {
        let e = PackageError::from_exec(
            "npm",
            ExecError::Interrupted {
                program: "npm".to_string(),
                reason: Interrupted::DeadlineExceeded,
            },
        );
        assert!(!e.is_cancelled());
        assert_eq!(e.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn package_error_command_failed_display() {
        let e = PackageError::CommandFailed {
            manager: "cargo".to_string(),
            operation: Operation::Install,
            package: "ripgrep".to_string(),
            code: 101,
            class: OutputClass::Unrecognized,
            detail: "error: linker failed".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "cargo install ripgrep failed (exit 101): error: linker failed"
        );
        assert_eq!(e.kind(), ErrorKind::CommandExecution);
    }

    // -----------------------------------------------------------------------
    // anyhow chains
    // -----------------------------------------------------------------------

    #[test]
    fn kind_of_finds_typed_cause() {
        let err = anyhow::Error::new(Interrupted::DeadlineExceeded).context("installing jq");
        assert_eq!(kind_of(&err), Some(ErrorKind::TimedOut));
        assert_eq!(kind_of(&anyhow::anyhow!("plain")), None);
    }

    #[test]
    fn typed_errors_survive_anyhow_wrapping() {
        let err: anyhow::Error = anyhow::Error::new(PathError::OutsideHome {
            path: PathBuf::from("/etc"),
        })
        .context("resolving destination");
        let path_err = err
            .downcast_ref::<PathError>()
            .expect("path error should be recoverable");
        assert_eq!(path_err.kind(), ErrorKind::PathValidation);
    }

    #[test]
    fn error_kind_serializes_kebab_case() {
        assert_eq!(ErrorKind::DatabaseLocked.to_string(), "database-locked");
        assert_eq!(ErrorKind::PackageNotFound.as_str(), "package-not-found");
    }

    // -----------------------------------------------------------------------
    // Send + Sync bounds
    // -----------------------------------------------------------------------

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<PathError>();
        assert_send_sync::<LockError>();
        assert_send_sync::<TemplateError>();
        assert_send_sync::<ExecError>();
        assert_send_sync::<PackageError>();
    }
}
