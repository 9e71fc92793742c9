//! Best-effort classification of package manager output.
//!
//! Managers report "already installed", "not found" and friends as free
//! text that changes between releases. The patterns here are a heuristic;
//! the raw [`OutputClass`] is kept on every result so a misclassification
//! is visible rather than silent.
use serde::Serialize;

use crate::error::PackageError;
use crate::exec::ExecResult;

/// Mutating package operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Install one package.
    Install,
    /// Uninstall one package.
    Uninstall,
    /// Upgrade one installed package.
    Upgrade,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Uninstall => write!(f, "uninstall"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Category recognised in a command's combined output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputClass {
    /// Another process holds the manager's database lock.
    DatabaseLocked,
    /// Elevated privileges are required.
    PermissionDenied,
    /// The package is not installed.
    NotInstalled,
    /// The package is already installed.
    AlreadyInstalled,
    /// The manager does not know the package.
    NotFound,
    /// No pattern matched.
    Unrecognized,
}

impl std::fmt::Display for OutputClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DatabaseLocked => "database-locked",
            Self::PermissionDenied => "permission-denied",
            Self::NotInstalled => "not-installed",
            Self::AlreadyInstalled => "already-installed",
            Self::NotFound => "not-found",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(s)
    }
}

/// Patterns in match order. Lowercase.
const PATTERNS: &[(OutputClass, &[&str])] = &[
    (
        OutputClass::DatabaseLocked,
        &[
            "could not get lock",
            "unable to lock",
            "database is locked",
            "lock file exists",
            "waiting for cache lock",
            "dpkg was interrupted",
        ],
    ),
    (
        OutputClass::PermissionDenied,
        &[
            "permission denied",
            "are you root",
            "could not open lock file",
            "access is denied",
            "access denied",
            "requires sudo",
            "operation not permitted",
            "eacces",
        ],
    ),
    (
        OutputClass::NotInstalled,
        &[
            "not installed",
            "cannot uninstall",
            "no such keg",
            "no such package installed",
        ],
    ),
    (
        OutputClass::AlreadyInstalled,
        &[
            "already installed",
            "is already the newest version",
            "already satisfied",
            "already up-to-date",
            "already up to date",
            "nothing to install",
        ],
    ),
    (
        OutputClass::NotFound,
        &[
            "not found",
            "unable to locate",
            "no such package",
            "could not find",
            "has no installation candidate",
            "no matching distribution",
            "unable to find",
            "no packages found",
            "no available formula",
            "no formulae found",
            "no crates found",
        ],
    ),
];

/// Classify `output` for `operation`.
///
/// Manager-specific `idempotent` patterns are checked first and map to
/// [`OutputClass::AlreadyInstalled`] for installs and upgrades and
/// [`OutputClass::NotInstalled`] for uninstalls.
#[must_use]
pub fn classify(output: &str, operation: Operation, idempotent: &[String]) -> OutputClass {
    let lower = output.to_lowercase();
    if idempotent
        .iter()
        .any(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
    {
        return match operation {
            Operation::Install | Operation::Upgrade => OutputClass::AlreadyInstalled,
            Operation::Uninstall => OutputClass::NotInstalled,
        };
    }
    PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map_or(OutputClass::Unrecognized, |(class, _)| *class)
}

/// Outcome of a successful install, uninstall or upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Raw classification of the output.
    pub class: OutputClass,
    /// Process exit code, `-1` when killed by a signal.
    pub exit_code: i32,
}

impl CommandOutcome {
    /// Returns `true` when the command did nothing because the package was
    /// already in the requested state.
    #[must_use]
    pub const fn was_noop(&self) -> bool {
        matches!(
            self.class,
            OutputClass::AlreadyInstalled | OutputClass::NotInstalled
        )
    }
}

/// Decide whether a finished package command succeeded.
///
/// Already-installed on install or upgrade is a success, as is
/// not-installed or not-found on uninstall: the package is absent either
/// way. Otherwise a zero exit is a success unless a not-found, permission
/// or lock pattern was recognised.
///
/// # Errors
///
/// Returns the [`PackageError`] matching the classification.
pub fn interpret(
    manager: &str,
    operation: Operation,
    package: &str,
    result: &ExecResult,
    idempotent: &[String],
) -> Result<CommandOutcome, PackageError> {
    let output = result.combined();
    let class = classify(&output, operation, idempotent);
    let exit_code = result.code.unwrap_or(-1);
    let outcome = CommandOutcome { class, exit_code };

    match (class, operation) {
        (OutputClass::AlreadyInstalled, Operation::Install | Operation::Upgrade)
        | (OutputClass::NotInstalled | OutputClass::NotFound, Operation::Uninstall) => {
            return Ok(outcome);
        }
        _ => {}
    }
    let hard_failure = matches!(
        class,
        OutputClass::NotFound | OutputClass::PermissionDenied | OutputClass::DatabaseLocked
    );
    if result.success && !hard_failure {
        return Ok(outcome);
    }

    let detail = tail(&output);
    let (manager, package) = (manager.to_string(), package.to_string());
    Err(match class {
        OutputClass::NotFound => PackageError::NotFound { manager, package },
        OutputClass::PermissionDenied => PackageError::PermissionDenied {
            manager,
            operation,
            package,
            detail,
        },
        OutputClass::DatabaseLocked => PackageError::DatabaseLocked {
            manager,
            operation,
            package,
            detail,
        },
        _ => PackageError::CommandFailed {
            manager,
            operation,
            package,
            code: exit_code,
            class,
            detail,
        },
    })
}

/// Last few non-empty lines of `output`, for error messages.
fn tail(output: &str) -> String {
    const MAX_LINES: usize = 5;
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines.get(start..).unwrap_or_default().join("\n")
}
