//! Install every locked package that is missing.
use std::collections::BTreeMap;

use anyhow::Result;

use super::provider::reconcile_packages;
use super::{OutputClass, PackageManager};
use crate::cancel::CancelToken;
use crate::config::Timeout;
use crate::context::Context;
use crate::error::{ErrorKind, Interrupted, PackageError};
use crate::lock::{Lock, LockEntry};
use crate::reconcile::outcome::record;
use crate::reconcile::{
    ApplyResult, Domain, Item, OperationResult, OperationStatus, StopReason,
};

/// Raw output class carried by a package error, if any.
#[must_use]
pub const fn error_class(err: &PackageError) -> Option<OutputClass> {
    match err {
        PackageError::CommandFailed { class, .. } => Some(*class),
        PackageError::NotFound { .. } => Some(OutputClass::NotFound),
        PackageError::PermissionDenied { .. } => Some(OutputClass::PermissionDenied),
        PackageError::DatabaseLocked { .. } => Some(OutputClass::DatabaseLocked),
        _ => None,
    }
}

/// Per-item result for a failed package operation.
#[must_use]
pub fn failure(manager: &str, name: &str, err: &PackageError) -> OperationResult {
    let result = OperationResult::new(Domain::Package, manager, name, OperationStatus::Failed)
        .failed(err.kind(), err.to_string());
    match error_class(err) {
        Some(class) => result.with_classification(class),
        None => result,
    }
}

/// Install `name` with `pm` and record it in the lock.
///
/// `cancel` is the batch token; the install itself runs under a child token
/// limited by `package_timeout`.
///
/// # Errors
///
/// Returns a fatal lock error (corrupt or unsupported lock file) when the
/// lock cannot be updated. Every other failure is a failed result.
pub(crate) fn install_and_lock(
    ctx: &Context,
    cancel: &CancelToken,
    pm: &dyn PackageManager,
    name: &str,
    previous: Option<&LockEntry>,
) -> Result<OperationResult> {
    let manager = pm.name();
    let token = ctx.deadline(cancel, Timeout::Package);
    let outcome = match pm.install(&token, name) {
        Ok(outcome) => outcome,
        Err(e) => return Ok(failure(manager, name, &e)),
    };
    if outcome.was_noop() {
        ctx.log.debug(&format!("{manager}:{name} was already installed"));
    }

    let version = match pm.installed_version(cancel, name) {
        Ok(version) => version,
        Err(e) => {
            ctx.log.debug(&format!("could not read {manager}:{name} version: {e}"));
            None
        }
    };
    let mut entry = previous
        .cloned()
        .unwrap_or_else(|| LockEntry::new(manager, name));
    if version.is_some() {
        entry.version = version;
    }
    let result = OperationResult::new(Domain::Package, manager, name, OperationStatus::Added)
        .with_classification(outcome.class);
    match ctx.lock.add_package(entry) {
        Ok(()) => Ok(result),
        Err(e) if e.kind().is_fatal() => Err(anyhow::Error::new(e)),
        Err(e) => Ok(result.failed(e.kind(), format!("installed, but {e}"))),
    }
}

enum Flow {
    Continue,
    Stop(StopReason),
}

/// Install every missing locked package.
///
/// Packages are grouped by manager in sorted order and installed one at a
/// time. Cancellation is checked before each item. Already-installed
/// packages count as unchanged.
///
/// # Errors
///
/// Returns the lock error when the lock file is corrupt or from a newer
/// release.
pub fn apply_packages(ctx: &Context, cancel: &CancelToken, fail_fast: bool) -> Result<ApplyResult> {
    let lock = ctx.lock.read().map_err(anyhow::Error::new)?;
    let reconciled = match reconcile_packages(&ctx.registry, &lock, cancel, ctx.log.as_ref()) {
        Ok(r) => r,
        Err(PackageError::Interrupted { reason, .. }) => {
            let mut result = ApplyResult::new(ctx.dry_run, Vec::new(), 0);
            result.stopped = Some(StopReason::Interrupted(reason));
            return Ok(result);
        }
        Err(e) => return Err(anyhow::Error::new(e)),
    };

    let mut by_manager: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in reconciled.missing {
        by_manager.entry(item.manager.clone()).or_default().push(item);
    }
    if by_manager.is_empty() {
        ctx.log.debug("all locked packages are installed");
    }

    let mut results = Vec::new();
    let mut stopped = None;
    for (manager, items) in &by_manager {
        let flow = apply_manager(ctx, cancel, &lock, manager, items, fail_fast, &mut results)?;
        if let Flow::Stop(reason) = flow {
            stopped = Some(reason);
            break;
        }
    }

    let mut result = ApplyResult::new(ctx.dry_run, results, reconciled.managed.len());
    result.stopped = stopped;
    Ok(result)
}

fn apply_manager(
    ctx: &Context,
    cancel: &CancelToken,
    lock: &Lock,
    manager: &str,
    items: &[Item],
    fail_fast: bool,
    results: &mut Vec<OperationResult>,
) -> Result<Flow> {
    if let Err(reason) = cancel.check() {
        return Ok(Flow::Stop(StopReason::Interrupted(reason)));
    }
    let pm = match ctx.registry.available_manager(cancel, manager) {
        Ok(pm) => Some(pm),
        Err(PackageError::Interrupted { reason, .. }) => {
            return Ok(Flow::Stop(StopReason::Interrupted(reason)));
        }
        Err(e) if ctx.dry_run => {
            ctx.log.warn(&format!("{e}"));
            None
        }
        Err(e) => {
            for item in items {
                let result = failure(manager, &item.name, &e);
                record(ctx.log.as_ref(), &result);
                results.push(result);
                if fail_fast {
                    return Ok(Flow::Stop(StopReason::FailFast));
                }
            }
            return Ok(Flow::Continue);
        }
    };

    for item in items {
        if let Err(reason) = cancel.check() {
            return Ok(Flow::Stop(StopReason::Interrupted(reason)));
        }
        let result = match &pm {
            Some(pm) if !ctx.dry_run => install_and_lock(
                ctx,
                cancel,
                pm.as_ref(),
                &item.name,
                lock.find(manager, &item.name),
            )?,
            _ => OperationResult::new(
                Domain::Package,
                manager,
                &item.name,
                OperationStatus::WouldAdd,
            ),
        };
        record(ctx.log.as_ref(), &result);
        let failed = result.status == OperationStatus::Failed;
        let cancelled = result.error_kind == Some(ErrorKind::Cancelled);
        results.push(result);
        if cancelled && cancel.is_cancelled() {
            return Ok(Flow::Stop(StopReason::Interrupted(Interrupted::Cancelled)));
        }
        if failed && fail_fast {
            return Ok(Flow::Stop(StopReason::FailFast));
        }
    }
    Ok(Flow::Continue)
}
