//! Core logging types: action entries, status, and the [`Log`] trait.
use crate::reconcile::OperationStatus;

/// Result of a single apply action, kept for the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    /// Item name, e.g. `brew:ripgrep` or `~/.zshrc`.
    pub name: String,
    /// Final status of the action.
    pub status: ActionStatus,
    /// Optional detail message (e.g., skip reason or error description).
    pub message: Option<String>,
}

/// Summary status of a completed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The change was applied.
    Ok,
    /// The item was skipped (e.g. a template with missing variables).
    Skipped,
    /// Dry-run mode; the change would have been applied.
    DryRun,
    /// The action failed.
    Failed,
}

impl From<OperationStatus> for ActionStatus {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Added | OperationStatus::Updated | OperationStatus::Removed => {
                Self::Ok
            }
            OperationStatus::WouldAdd
            | OperationStatus::WouldUpdate
            | OperationStatus::WouldRemove => Self::DryRun,
            OperationStatus::Skipped => Self::Skipped,
            OperationStatus::Failed => Self::Failed,
        }
    }
}

/// Abstraction over logging backends.
///
/// Engine code logs through `&dyn Log` so tests and embedders can supply
/// their own sink.
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record an action result for the summary.
    fn record(&self, name: &str, status: ActionStatus, message: Option<&str>);
}
