//! Per-item apply results and batch totals.
use std::path::PathBuf;

use serde::Serialize;

use super::Domain;
use crate::error::{ErrorKind, Interrupted};
use crate::logging::{ActionStatus, Log};
use crate::packages::classify::OutputClass;

/// What happened to one item during apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    /// Created or installed.
    Added,
    /// Overwritten to match the source.
    Updated,
    /// Uninstalled or removed from the lock.
    Removed,
    /// Deliberately not applied.
    Skipped,
    /// Attempted and failed.
    Failed,
    /// Dry-run: would be created or installed.
    WouldAdd,
    /// Dry-run: would be overwritten.
    WouldUpdate,
    /// Dry-run: would be removed.
    WouldRemove,
}

impl OperationStatus {
    /// Stable kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::WouldAdd => "would-add",
            Self::WouldUpdate => "would-update",
            Self::WouldRemove => "would-remove",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    /// Item name.
    pub name: String,
    /// Item domain.
    pub domain: Domain,
    /// Package manager; empty for dotfiles.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manager: String,
    /// Outcome.
    pub status: OperationStatus,
    /// Error or note text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Taxonomy kind of `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Raw output classification from the package manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<OutputClass>,
    /// Destination path for dotfiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl OperationResult {
    /// A result with only name, domain, manager and status set.
    #[must_use]
    pub fn new(domain: Domain, manager: &str, name: &str, status: OperationStatus) -> Self {
        Self {
            name: name.to_string(),
            domain,
            manager: manager.to_string(),
            status,
            error: None,
            error_kind: None,
            classification: None,
            path: None,
        }
    }

    /// Mark as failed with `kind`.
    #[must_use]
    pub fn failed(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.status = OperationStatus::Failed;
        self.error = Some(message.into());
        self.error_kind = Some(kind);
        self
    }

    /// Attach a destination path.
    #[must_use]
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Attach a classification.
    #[must_use]
    pub const fn with_classification(mut self, class: OutputClass) -> Self {
        self.classification = Some(class);
        self
    }

    /// Display label: `manager:name` for packages, the name for dotfiles.
    #[must_use]
    pub fn label(&self) -> String {
        if self.manager.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.manager, self.name)
        }
    }
}

/// Print `result` and add it to the run summary.
pub fn record(log: &dyn Log, result: &OperationResult) {
    let label = result.label();
    let line = match &result.error {
        Some(error) => format!("{} {label}: {error}", result.status),
        None => format!("{} {label}", result.status),
    };
    match result.status {
        OperationStatus::Failed => log.error(&line),
        OperationStatus::Skipped => log.warn(&line),
        OperationStatus::WouldAdd | OperationStatus::WouldUpdate | OperationStatus::WouldRemove => {
            log.dry_run(&line);
        }
        OperationStatus::Added | OperationStatus::Updated | OperationStatus::Removed => {
            log.info(&line);
        }
    }
    log.record(
        &label,
        ActionStatus::from(result.status),
        result.error.as_deref(),
    );
}

/// Totals for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ApplySummary {
    /// Added (including would-add).
    pub added: usize,
    /// Updated (including would-update).
    pub updated: usize,
    /// Removed (including would-remove).
    pub removed: usize,
    /// Skipped.
    pub skipped: usize,
    /// Failed.
    pub failed: usize,
    /// Already converged and left untouched.
    pub unchanged: usize,
}

impl ApplySummary {
    /// Total the results; `unchanged` is supplied by the caller.
    #[must_use]
    pub fn from_results(results: &[OperationResult], unchanged: usize) -> Self {
        let mut summary = Self {
            unchanged,
            ..Self::default()
        };
        for r in results {
            match r.status {
                OperationStatus::Added | OperationStatus::WouldAdd => summary.added += 1,
                OperationStatus::Updated | OperationStatus::WouldUpdate => summary.updated += 1,
                OperationStatus::Removed | OperationStatus::WouldRemove => summary.removed += 1,
                OperationStatus::Skipped => summary.skipped += 1,
                OperationStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Add another summary's counts to this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.unchanged += other.unchanged;
    }
}

impl std::fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed, {} unchanged, {} skipped, {} failed",
            self.added, self.updated, self.removed, self.unchanged, self.skipped, self.failed
        )
    }
}

/// Why a batch stopped before visiting every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Fail-fast was requested and an item failed.
    FailFast,
    /// The run was cancelled or hit its deadline.
    Interrupted(Interrupted),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "stopped after first failure"),
            Self::Interrupted(reason) => write!(f, "{reason}"),
        }
    }
}

/// Result of one domain's apply pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplyResult {
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Per-item results, in application order.
    pub results: Vec<OperationResult>,
    /// Totals.
    pub summary: ApplySummary,
    /// Non-fatal warnings (e.g. templates with missing variables).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Set when the batch did not visit every item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<StopReason>,
}

impl ApplyResult {
    /// Build a result and compute its summary.
    #[must_use]
    pub fn new(dry_run: bool, results: Vec<OperationResult>, unchanged: usize) -> Self {
        let summary = ApplySummary::from_results(&results, unchanged);
        Self {
            dry_run,
            results,
            summary,
            warnings: Vec::new(),
            stopped: None,
        }
    }

    /// Returns `true` if any item failed.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

/// Combined result of [`engine::apply`](crate::engine::apply).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplyReport {
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Package pass, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<ApplyResult>,
    /// Dotfile pass, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotfiles: Option<ApplyResult>,
}

impl ApplyReport {
    /// Totals across both passes.
    #[must_use]
    pub fn summary(&self) -> ApplySummary {
        let mut total = ApplySummary::default();
        for pass in [&self.packages, &self.dotfiles].into_iter().flatten() {
            total.absorb(&pass.summary);
        }
        total
    }

    /// Returns `true` if any item in either pass failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        [&self.packages, &self.dotfiles]
            .into_iter()
            .flatten()
            .any(ApplyResult::has_failures)
    }

    /// Warnings from both passes.
    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        [&self.packages, &self.dotfiles]
            .into_iter()
            .flatten()
            .flat_map(|p| p.warnings.iter())
    }
}
