//! Package reconciliation: the lock is the desired state, manager listings
//! are the actual state.
use super::ManagerRegistry;
use crate::cancel::CancelToken;
use crate::error::PackageError;
use crate::lock::{Lock, LockEntry};
use crate::logging::Log;
use crate::reconcile::{Domain, Item, NoComparison, ReconcileResult, reconcile_items};

/// Desired item for one lock entry.
#[must_use]
pub fn desired_item(entry: &LockEntry) -> Item {
    let mut item = Item::package(&entry.manager, &entry.name);
    item.version.clone_from(&entry.version);
    item.metadata.clone_from(&entry.metadata);
    item
}

/// Installed packages of `manager` as actual items.
///
/// An unknown or unavailable manager, or one whose listing fails, reports
/// nothing (with a warning), so every locked package of that manager shows
/// up as missing.
///
/// # Errors
///
/// Returns [`PackageError::Interrupted`] if the probe or listing was
/// cancelled or timed out.
pub fn actual_items(
    registry: &ManagerRegistry,
    cancel: &CancelToken,
    manager: &str,
    log: &dyn Log,
) -> Result<Vec<Item>, PackageError> {
    let pm = match registry.available_manager(cancel, manager) {
        Ok(pm) => pm,
        Err(e @ PackageError::Interrupted { .. }) => return Err(e),
        Err(e) => {
            log.debug(&format!("{e}"));
            return Ok(Vec::new());
        }
    };
    match pm.list_installed(cancel) {
        Ok(installed) => Ok(installed
            .into_iter()
            .map(|p| {
                let mut item = Item::package(manager, p.name);
                item.version = p.version;
                item
            })
            .collect()),
        Err(e @ PackageError::Interrupted { .. }) => Err(e),
        Err(e) => {
            log.warn(&format!("could not list {manager} packages: {e}"));
            Ok(Vec::new())
        }
    }
}

/// Reconcile every manager referenced by `lock`.
///
/// Managers are reconciled separately so that the same package name under
/// two managers stays two items. The merged result is sorted by manager,
/// then name.
///
/// # Errors
///
/// Returns [`PackageError::Interrupted`] if any probe or listing was
/// cancelled or timed out.
pub fn reconcile_packages(
    registry: &ManagerRegistry,
    lock: &Lock,
    cancel: &CancelToken,
    log: &dyn Log,
) -> Result<ReconcileResult, PackageError> {
    let mut result = ReconcileResult {
        domain: Domain::Package,
        ..ReconcileResult::default()
    };
    for manager in lock.managers() {
        cancel.check().map_err(|reason| PackageError::Interrupted {
            manager: manager.to_string(),
            reason,
        })?;
        let items = lock.packages_for(manager).map(desired_item).collect();
        let actual = actual_items(registry, cancel, manager, log)?;
        let reconciled = reconcile_items(items, actual, &NoComparison);
        let part = ReconcileResult::from_items(Domain::Package, manager, reconciled);
        log.debug(&format!(
            "{manager}: {} managed, {} missing, {} untracked",
            part.managed.len(),
            part.missing.len(),
            part.untracked.len()
        ));
        result.merge(part);
    }
    Ok(result)
}
