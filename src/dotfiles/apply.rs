//! Brings missing and drifted dotfiles in line with the config directory.
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use super::compare::ContentComparator;
use super::deploy::deploy;
use super::provider::DotfileProvider;
use super::template::{TemplateProcessor, VARS_FILE, missing_variable_from_message};
use crate::cancel::CancelToken;
use crate::context::Context;
use crate::error::{ErrorKind, TemplateError, kind_of};
use crate::reconcile::outcome::record;
use crate::reconcile::{
    ApplyResult, Domain, Item, OperationResult, OperationStatus, StopReason,
};

/// Destinations an apply is restricted to. Empty means everything.
///
/// Entries are absolute, lexically cleaned destination paths. A directory
/// entry selects every item below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet(BTreeSet<PathBuf>);

impl FilterSet {
    /// Filter from already-normalized paths.
    #[must_use]
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self(paths.into_iter().collect())
    }

    /// Returns `true` when no restriction applies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `item` is selected.
    #[must_use]
    pub fn selects(&self, item: &Item) -> bool {
        self.0.is_empty()
            || item
                .path
                .as_ref()
                .is_some_and(|p| self.0.iter().any(|f| p.starts_with(f)))
    }
}

/// YAML snippet defining a dotted variable, e.g. `git.email` becomes
/// `git:\n  email: <value>`.
#[must_use]
pub fn variable_snippet(variable: &str) -> String {
    let mut out = String::new();
    let parts: Vec<&str> = variable.split('.').collect();
    let last = parts.len().saturating_sub(1);
    for (depth, part) in parts.iter().enumerate() {
        out.push_str(&"  ".repeat(depth));
        out.push_str(part);
        if depth == last {
            out.push_str(": <value>");
        } else {
            out.push_str(":\n");
        }
    }
    out
}

/// Warning text for a template that does not validate. A missing variable
/// gets a snippet to paste into the variables file.
#[must_use]
pub fn template_warning(item: &Item, err: &TemplateError) -> String {
    match missing_variable_from_message(&err.to_string()) {
        Some(variable) => format!(
            "{}: {err}\nadd it to {VARS_FILE}:\n{}",
            item.destination,
            variable_snippet(&variable)
        ),
        None => format!("{}: {err}", item.destination),
    }
}

fn error_kind(err: &anyhow::Error) -> ErrorKind {
    if let Some(kind) = kind_of(err) {
        return kind;
    }
    let not_found = err
        .chain()
        .filter_map(|c| c.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::NotFound);
    if not_found {
        ErrorKind::FileNotFound
    } else {
        ErrorKind::FileIo
    }
}

fn result_for(item: &Item, status: OperationStatus) -> OperationResult {
    let result = OperationResult::new(Domain::Dotfile, "", &item.destination, status);
    match &item.path {
        Some(path) => result.with_path(path.clone()),
        None => result,
    }
}

fn apply_item(
    ctx: &Context,
    templates: &dyn TemplateProcessor,
    item: &Item,
    warnings: &mut Vec<String>,
) -> OperationResult {
    let missing = item.path.as_deref().is_none_or(|p| p.symlink_metadata().is_err());
    if let Some(source) = item.source.as_deref().filter(|s| templates.is_template(s))
        && let Err(e) = templates.validate_template(source)
    {
        let warning = template_warning(item, &e);
        ctx.log.warn(&warning);
        warnings.push(warning);
        let mut result = result_for(item, OperationStatus::Skipped);
        result.error = Some(e.to_string());
        result.error_kind = Some(e.kind());
        return result;
    }
    if ctx.dry_run {
        let status = if missing {
            OperationStatus::WouldAdd
        } else {
            OperationStatus::WouldUpdate
        };
        return result_for(item, status);
    }
    let status = if missing {
        OperationStatus::Added
    } else {
        OperationStatus::Updated
    };
    match deploy(item, templates, ctx.config.backup_on_overwrite) {
        Ok(()) => result_for(item, status),
        Err(e) => result_for(item, status).failed(error_kind(&e), format!("{e:#}")),
    }
}

/// Deploy every missing or drifted dotfile selected by `filter`.
///
/// Items already in sync count as unchanged and are not touched, so a
/// second run performs no writes.
///
/// # Errors
///
/// Returns the [`PathError`](crate::error::PathError) when a destination
/// escapes home, or the scan error. Per-item failures are results.
pub fn apply_dotfiles(
    ctx: &Context,
    cancel: &CancelToken,
    filter: &FilterSet,
    fail_fast: bool,
) -> Result<ApplyResult> {
    let templates = Arc::clone(&ctx.templates);
    let provider = DotfileProvider::new(&ctx.paths, ctx.config.as_ref(), templates.as_ref());
    let reconciled = provider.reconcile(&ContentComparator::new(Arc::clone(&templates)))?;

    let unchanged = reconciled
        .managed
        .iter()
        .filter(|i| !i.is_degraded() && filter.selects(i))
        .count();
    let pending: BTreeMap<&str, &Item> = reconciled
        .missing
        .iter()
        .chain(reconciled.degraded())
        .filter(|i| filter.selects(i))
        .map(|i| (i.name.as_str(), i))
        .collect();

    let mut results = Vec::new();
    let mut warnings = Vec::new();
    let mut stopped = None;
    for item in pending.into_values() {
        if let Err(reason) = cancel.check() {
            stopped = Some(StopReason::Interrupted(reason));
            break;
        }
        let result = apply_item(ctx, templates.as_ref(), item, &mut warnings);
        record(ctx.log.as_ref(), &result);
        let failed = result.status == OperationStatus::Failed;
        results.push(result);
        if failed && fail_fast {
            stopped = Some(StopReason::FailFast);
            break;
        }
    }

    let mut result = ApplyResult::new(ctx.dry_run, results, unchanged);
    result.warnings = warnings;
    result.stopped = stopped;
    Ok(result)
}

/// Normalize user-supplied paths into a [`FilterSet`].
#[must_use]
pub fn filter_from_args(ctx: &Context, args: &[String], cwd: &Path) -> FilterSet {
    FilterSet::new(args.iter().map(|a| ctx.paths.normalize(a, cwd)))
}
