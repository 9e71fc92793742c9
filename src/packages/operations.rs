//! Single-package operations that keep the lock in step with the system.
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::apply::{failure, install_and_lock};
use super::{PackageManager, parse_package_spec};
use crate::cancel::CancelToken;
use crate::config::Timeout;
use crate::context::Context;
use crate::error::{ErrorKind, PackageError};
use crate::lock::{Lock, LockEntry};
use crate::reconcile::outcome::record;
use crate::reconcile::{ApplyResult, Domain, OperationResult, OperationStatus, StopReason};

fn result(manager: &str, name: &str, status: OperationStatus) -> OperationResult {
    OperationResult::new(Domain::Package, manager, name, status)
}

fn skipped(manager: &str, name: &str, note: &str) -> OperationResult {
    let mut r = result(manager, name, OperationStatus::Skipped);
    r.error = Some(note.to_string());
    r
}

/// Install `spec` (`name` or `manager:name`) and add it to the lock.
///
/// The manager is taken from `spec`, else `manager`, else the configured
/// default. A package already in the lock is skipped.
///
/// # Errors
///
/// Returns the lock error when the lock file is corrupt or from a newer
/// release. Every other failure is a failed result.
pub fn install_package(
    ctx: &Context,
    cancel: &CancelToken,
    spec: &str,
    manager: Option<&str>,
) -> Result<OperationResult> {
    let (from_spec, name) = parse_package_spec(spec);
    let default = ctx.config.default_manager.as_str();
    let manager = from_spec.or(manager).unwrap_or(default);

    if let Err(e) = ctx.registry.get(manager) {
        return Ok(failure(manager, name, &e));
    }
    let lock = ctx.lock.read().map_err(anyhow::Error::new)?;
    if lock.contains(manager, name) {
        return Ok(skipped(manager, name, "already managed"));
    }
    if ctx.dry_run {
        return Ok(result(manager, name, OperationStatus::WouldAdd));
    }
    let pm = match ctx.registry.available_manager(cancel, manager) {
        Ok(pm) => pm,
        Err(e) => return Ok(failure(manager, name, &e)),
    };
    install_and_lock(ctx, cancel, pm.as_ref(), name, None)
}

/// Remove `name` from the lock and uninstall it.
///
/// Without `manager`, the manager is the one recording `name` in the lock,
/// else the configured default. The lock entry is removed first; if the
/// uninstall then fails, the result is still `removed` but carries the
/// error.
///
/// # Errors
///
/// Returns the lock error when the lock file is corrupt or from a newer
/// release. Every other failure is a failed result.
pub fn uninstall_package(
    ctx: &Context,
    cancel: &CancelToken,
    name: &str,
    manager: Option<&str>,
) -> Result<OperationResult> {
    let lock = ctx.lock.read().map_err(anyhow::Error::new)?;
    let manager = match manager {
        Some(m) => m.to_string(),
        None => match lock.managers_of(name).as_slice() {
            [] => ctx.config.default_manager.clone(),
            [only] => (*only).to_string(),
            several => {
                let message = format!(
                    "managed by {}; pass --manager to choose",
                    several.join(", ")
                );
                return Ok(result("", name, OperationStatus::Failed)
                    .failed(ErrorKind::CommandExecution, message));
            }
        },
    };
    let manager = manager.as_str();

    if let Err(e) = ctx.registry.get(manager) {
        return Ok(failure(manager, name, &e));
    }
    if ctx.dry_run {
        return Ok(result(manager, name, OperationStatus::WouldRemove));
    }

    let removed = match ctx.lock.remove_package(manager, name) {
        Ok(removed) => removed,
        Err(e) if e.kind().is_fatal() => return Err(anyhow::Error::new(e)),
        Err(e) => {
            return Ok(result(manager, name, OperationStatus::Failed)
                .failed(e.kind(), e.to_string()));
        }
    };

    let outcome = ctx
        .registry
        .available_manager(cancel, manager)
        .and_then(|pm| pm.uninstall(&ctx.deadline(cancel, Timeout::Package), name));
    match outcome {
        Ok(outcome) => Ok(result(manager, name, OperationStatus::Removed)
            .with_classification(outcome.class)),
        Err(e) if removed => {
            let mut r = failure(manager, name, &e);
            r.status = OperationStatus::Removed;
            r.error = Some(format!("removed from lock, but {e}"));
            Ok(r)
        }
        Err(e) => Ok(failure(manager, name, &e)),
    }
}

/// Locked packages named by `targets`, sorted by manager then name.
///
/// A target is `manager:name`, a manager name (every package it records) or
/// a bare package name (every manager recording it). No targets selects the
/// whole lock.
///
/// # Errors
///
/// Returns an error for a malformed target or one the lock does not record.
pub fn select_upgrades(lock: &Lock, targets: &[String]) -> Result<Vec<LockEntry>> {
    if targets.is_empty() {
        return Ok(lock.entries().to_vec());
    }
    let mut selected: BTreeMap<(String, String), LockEntry> = BTreeMap::new();
    for target in targets {
        let matches: Vec<&LockEntry> = match parse_package_spec(target) {
            (Some(manager), name) => lock.find(manager, name).into_iter().collect(),
            (None, _) if target.contains(':') => {
                anyhow::bail!("invalid package spec '{target}': expected manager:name")
            }
            (None, name) if lock.managers().contains(&name) => lock.packages_for(name).collect(),
            (None, name) => lock.entries().iter().filter(|e| e.name == name).collect(),
        };
        if matches.is_empty() {
            anyhow::bail!("package '{target}' is not managed");
        }
        for entry in matches {
            selected.insert((entry.manager.clone(), entry.name.clone()), entry.clone());
        }
    }
    Ok(selected.into_values().collect())
}

/// Upgrade locked packages and record their new versions.
///
/// A package whose version is unchanged after the upgrade is skipped as
/// already current; an unknown version counts as updated. Every package of
/// an unavailable manager fails. Stops early when `cancel` fires.
///
/// # Errors
///
/// Returns the lock error when the lock file is corrupt or from a newer
/// release, or a selection error from [`select_upgrades`].
pub fn upgrade_packages(
    ctx: &Context,
    cancel: &CancelToken,
    targets: &[String],
) -> Result<ApplyResult> {
    let lock = ctx.lock.read().map_err(anyhow::Error::new)?;
    let entries = select_upgrades(&lock, targets)?;

    let mut results = Vec::new();
    let mut stopped = None;
    let mut managers: BTreeMap<&str, Result<Arc<dyn PackageManager>, PackageError>> =
        BTreeMap::new();
    for entry in &entries {
        if let Err(reason) = cancel.check() {
            stopped = Some(StopReason::Interrupted(reason));
            break;
        }
        let (manager, name) = (entry.manager.as_str(), entry.name.as_str());
        let pm = managers
            .entry(manager)
            .or_insert_with(|| ctx.registry.available_manager(cancel, manager));
        let result = match &*pm {
            Err(PackageError::Interrupted { reason, .. }) => {
                stopped = Some(StopReason::Interrupted(*reason));
                break;
            }
            Err(e) => failure(manager, name, e),
            Ok(_) if ctx.dry_run => result(manager, name, OperationStatus::WouldUpdate),
            Ok(pm) => upgrade_and_lock(ctx, cancel, pm.as_ref(), entry)?,
        };
        record(ctx.log.as_ref(), &result);
        results.push(result);
    }

    let mut applied = ApplyResult::new(ctx.dry_run, results, 0);
    applied.stopped = stopped;
    Ok(applied)
}

fn upgrade_and_lock(
    ctx: &Context,
    cancel: &CancelToken,
    pm: &dyn PackageManager,
    entry: &LockEntry,
) -> Result<OperationResult> {
    let (manager, name) = (pm.name(), entry.name.as_str());
    let version = |phase: &str| match pm.installed_version(cancel, name) {
        Ok(version) => version,
        Err(e) => {
            ctx.log.debug(&format!("could not read {manager}:{name} version {phase}: {e}"));
            None
        }
    };

    let before = version("before upgrade");
    let outcome = match pm.upgrade(&ctx.deadline(cancel, Timeout::Package), name) {
        Ok(outcome) => outcome,
        Err(e) => return Ok(failure(manager, name, &e)),
    };
    let after = version("after upgrade");

    if outcome.was_noop() || (after.is_some() && after == before) {
        let mut r = skipped(manager, name, "already up to date");
        r.classification = Some(outcome.class);
        return Ok(r);
    }
    ctx.log.debug(&format!(
        "{manager}:{name} {} -> {}",
        before.as_deref().unwrap_or("?"),
        after.as_deref().unwrap_or("?")
    ));

    let updated =
        result(manager, name, OperationStatus::Updated).with_classification(outcome.class);
    if after.is_none() || after == entry.version {
        return Ok(updated);
    }
    match ctx.lock.add_package(entry.clone().with_version(after)) {
        Ok(()) => Ok(updated),
        Err(e) if e.kind().is_fatal() => Err(anyhow::Error::new(e)),
        Err(e) => Ok(updated.failed(e.kind(), format!("upgraded, but {e}"))),
    }
}

/// Search hits from one manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Manager name.
    pub manager: String,
    /// Matching package names, in the manager's order.
    pub packages: Vec<String>,
    /// Why the search failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Search `query` in `manager`, or in every available manager that
/// supports search.
///
/// # Errors
///
/// Returns [`PackageError::Interrupted`] if cancelled. When a single
/// manager is requested, an unknown or unavailable manager is an error too.
pub fn search_packages(
    ctx: &Context,
    cancel: &CancelToken,
    query: &str,
    manager: Option<&str>,
) -> Result<Vec<SearchResult>, PackageError> {
    if let Some(manager) = manager {
        let pm = ctx.registry.available_manager(cancel, manager)?;
        let packages = pm.search(cancel, query)?;
        return Ok(vec![SearchResult {
            manager: manager.to_string(),
            packages,
            error: None,
        }]);
    }

    let mut out = Vec::new();
    for name in ctx.registry.names() {
        cancel.check().map_err(|reason| PackageError::Interrupted {
            manager: name.clone(),
            reason,
        })?;
        if !ctx.registry.is_available(cancel, &name)? {
            ctx.log.debug(&format!("skipping {name}: not available"));
            continue;
        }
        let pm = ctx.registry.get(&name)?;
        match pm.search(cancel, query) {
            Ok(packages) => out.push(SearchResult {
                manager: name,
                packages,
                error: None,
            }),
            Err(PackageError::Unsupported { .. }) => {}
            Err(e @ PackageError::Interrupted { .. }) => return Err(e),
            Err(e) => out.push(SearchResult {
                manager: name,
                packages: Vec::new(),
                error: Some(e.to_string()),
            }),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::test_helpers::TestEnv;
    use crate::lock::{Lock, LockEntry, LockStore};
    use crate::packages::ManagerRegistry;
    use crate::packages::OutputClass;
    use crate::packages::test_helpers::{FakeManager, LATEST};

    fn registry(managers: Vec<FakeManager>) -> ManagerRegistry {
        let mut registry = ManagerRegistry::new();
        for m in managers {
            registry.register(Arc::new(m));
        }
        registry
    }

    #[test]
    fn install_uses_spec_manager_and_records_lock() {
        let env = TestEnv::new();
        let ctx = env
            .context(false)
            .with_registry(registry(vec![FakeManager::new("npm")]));
        let r = install_package(&ctx, &ctx.cancel, "npm:prettier", None).unwrap();
        assert_eq!(r.status, OperationStatus::Added);
        assert_eq!(r.label(), "npm:prettier");
        let entry = ctx.lock.find_package("npm", "prettier").unwrap().unwrap();
        assert_eq!(entry.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn install_defaults_to_configured_manager() {
        let env = TestEnv::new();
        let ctx = env
            .context(false)
            .with_registry(registry(vec![FakeManager::new("brew")]));
        let r = install_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.label(), "brew:jq");
        assert!(ctx.lock.has_package("brew", "jq").unwrap());
    }

    #[test]
    fn install_already_locked_is_skipped() {
        let env = TestEnv::new();
        let fake = Arc::new(FakeManager::new("brew"));
        let mut reg = ManagerRegistry::new();
        reg.register(fake.clone());
        let ctx = env.context(false).with_registry(reg);
        ctx.lock.add_package(LockEntry::new("brew", "jq")).unwrap();

        let r = install_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::Skipped);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn install_already_installed_is_added_to_lock() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew").with_installed("jq", Some("1.7.1")),
        ]));
        let r = install_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::Added);
        assert_eq!(r.classification, Some(OutputClass::AlreadyInstalled));
        let entry = ctx.lock.find_package("brew", "jq").unwrap().unwrap();
        assert_eq!(entry.version.as_deref(), Some("1.7.1"));
    }

    #[test]
    fn install_dry_run_and_unknown_manager() {
        let env = TestEnv::new();
        let ctx = env
            .context(true)
            .with_registry(registry(vec![FakeManager::new("brew")]));
        let r = install_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::WouldAdd);
        assert!(ctx.lock.read().unwrap().is_empty());

        let r = install_package(&ctx, &ctx.cancel, "apt:curl", None).unwrap();
        assert_eq!(r.status, OperationStatus::Failed);
        assert_eq!(r.error_kind, Some(ErrorKind::ManagerUnavailable));
    }

    #[test]
    fn install_unavailable_manager_fails() {
        let env = TestEnv::new();
        let ctx = env
            .context(false)
            .with_registry(registry(vec![FakeManager::unavailable("gem")]));
        let r = install_package(&ctx, &ctx.cancel, "gem:rake", None).unwrap();
        assert_eq!(r.status, OperationStatus::Failed);
        assert!(!ctx.lock.has_package("gem", "rake").unwrap());
    }

    #[test]
    fn uninstall_resolves_manager_from_lock() {
        let env = TestEnv::new();
        let pipx = Arc::new(FakeManager::new("pipx").with_installed("black", None));
        let mut reg = ManagerRegistry::new();
        reg.register(Arc::new(FakeManager::new("brew")));
        reg.register(pipx.clone());
        let ctx = env.context(false).with_registry(reg);
        ctx.lock.add_package(LockEntry::new("pipx", "black")).unwrap();

        let r = uninstall_package(&ctx, &ctx.cancel, "black", None).unwrap();
        assert_eq!(r.label(), "pipx:black");
        assert_eq!(r.status, OperationStatus::Removed);
        assert_eq!(pipx.calls(), ["uninstall black"]);
        assert!(ctx.lock.read().unwrap().is_empty());
    }

    #[test]
    fn uninstall_not_installed_is_success() {
        let env = TestEnv::new();
        let ctx = env
            .context(false)
            .with_registry(registry(vec![FakeManager::new("brew")]));
        let r = uninstall_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::Removed);
        assert_eq!(r.classification, Some(OutputClass::NotInstalled));
    }

    #[test]
    fn uninstall_failure_after_lock_removal_is_removed_with_note() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew").fail_next(PackageError::PermissionDenied {
                manager: "brew".into(),
                operation: crate::packages::Operation::Uninstall,
                package: "jq".into(),
                detail: "Permission denied".into(),
            }),
        ]));
        ctx.lock.add_package(LockEntry::new("brew", "jq")).unwrap();

        let r = uninstall_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::Removed);
        assert_eq!(r.error_kind, Some(ErrorKind::PermissionDenied));
        assert!(r.error.unwrap().starts_with("removed from lock"));
        assert!(!ctx.lock.has_package("brew", "jq").unwrap());
    }

    #[test]
    fn uninstall_ambiguous_name_needs_manager() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew"),
            FakeManager::new("pipx"),
        ]));
        ctx.lock
            .write(&Lock::from_entries(
                3,
                [LockEntry::new("brew", "black"), LockEntry::new("pipx", "black")],
            ))
            .unwrap();
        let r = uninstall_package(&ctx, &ctx.cancel, "black", None).unwrap();
        assert_eq!(r.status, OperationStatus::Failed);
        assert!(r.error.unwrap().contains("brew, pipx"));

        let r = uninstall_package(&ctx, &ctx.cancel, "black", Some("pipx")).unwrap();
        assert_eq!(r.label(), "pipx:black");
        assert!(ctx.lock.has_package("brew", "black").unwrap());
    }

    #[test]
    fn uninstall_dry_run_keeps_lock() {
        let env = TestEnv::new();
        let ctx = env
            .context(true)
            .with_registry(registry(vec![FakeManager::new("brew")]));
        ctx.lock.add_package(LockEntry::new("brew", "jq")).unwrap();
        let r = uninstall_package(&ctx, &ctx.cancel, "jq", None).unwrap();
        assert_eq!(r.status, OperationStatus::WouldRemove);
        assert!(ctx.lock.has_package("brew", "jq").unwrap());
    }

    fn locked(ctx: &Context, entries: &[(&str, &str, Option<&str>)]) {
        let lock = Lock::from_entries(
            3,
            entries.iter().map(|(m, n, v)| {
                LockEntry::new(*m, *n).with_version(v.map(str::to_string))
            }),
        );
        ctx.lock.write(&lock).unwrap();
    }

    #[test]
    fn select_upgrades_by_spec_manager_and_name() {
        let lock = Lock::from_entries(
            3,
            [
                LockEntry::new("brew", "jq"),
                LockEntry::new("brew", "fd"),
                LockEntry::new("pipx", "black"),
                LockEntry::new("uv", "black"),
            ],
        );
        let labels = |targets: &[&str]| -> Vec<String> {
            let targets: Vec<String> = targets.iter().map(|t| (*t).to_string()).collect();
            select_upgrades(&lock, &targets)
                .unwrap()
                .iter()
                .map(|e| format!("{}:{}", e.manager, e.name))
                .collect()
        };
        assert_eq!(labels(&[]).len(), 4);
        assert_eq!(labels(&["brew"]), ["brew:fd", "brew:jq"]);
        assert_eq!(labels(&["black"]), ["pipx:black", "uv:black"]);
        assert_eq!(labels(&["uv:black", "jq", "brew:jq"]), ["brew:jq", "uv:black"]);

        let target = |t: &str| vec![t.to_string()];
        let err = select_upgrades(&lock, &target("ripgrep")).unwrap_err();
        assert!(err.to_string().contains("not managed"));
        assert!(select_upgrades(&lock, &target("npm:prettier")).is_err());
        let err = select_upgrades(&lock, &target("brew:")).unwrap_err();
        assert!(err.to_string().contains("invalid package spec"));
    }

    #[test]
    fn upgrade_records_new_version() {
        let env = TestEnv::new();
        let brew = Arc::new(FakeManager::new("brew").with_installed("jq", Some("1.6")));
        let mut reg = ManagerRegistry::new();
        reg.register(brew.clone());
        let ctx = env.context(false).with_registry(reg);
        locked(&ctx, &[("brew", "jq", Some("1.6"))]);

        let result = upgrade_packages(&ctx, &ctx.cancel, &[]).unwrap();
        assert_eq!(result.summary.updated, 1);
        assert_eq!(brew.calls(), ["upgrade jq"]);
        let entry = ctx.lock.find_package("brew", "jq").unwrap().unwrap();
        assert_eq!(entry.version.as_deref(), Some(LATEST));
    }

    #[test]
    fn upgrade_already_current_is_skipped() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew").with_installed("jq", Some(LATEST)),
        ]));
        locked(&ctx, &[("brew", "jq", Some(LATEST))]);

        let result = upgrade_packages(&ctx, &ctx.cancel, &["jq".to_string()]).unwrap();
        assert_eq!(result.results[0].status, OperationStatus::Skipped);
        assert_eq!(result.results[0].classification, Some(OutputClass::AlreadyInstalled));
        assert_eq!(result.summary.skipped, 1);
    }

    #[test]
    fn upgrade_failures_are_per_package() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew").with_installed("jq", Some("1.6")),
            FakeManager::unavailable("gem"),
        ]));
        locked(
            &ctx,
            &[
                ("brew", "fd", None),
                ("brew", "jq", Some("1.6")),
                ("gem", "rake", None),
            ],
        );

        let result = upgrade_packages(&ctx, &ctx.cancel, &[]).unwrap();
        let statuses: Vec<(String, OperationStatus)> = result
            .results
            .iter()
            .map(|r| (r.label(), r.status))
            .collect();
        assert_eq!(
            statuses,
            [
                ("brew:fd".to_string(), OperationStatus::Failed),
                ("brew:jq".to_string(), OperationStatus::Updated),
                ("gem:rake".to_string(), OperationStatus::Failed),
            ]
        );
        assert_eq!(result.results[2].error_kind, Some(ErrorKind::ManagerUnavailable));
        assert_eq!(result.summary.failed, 2);
    }

    #[test]
    fn upgrade_dry_run_changes_nothing() {
        let env = TestEnv::new();
        let brew = Arc::new(FakeManager::new("brew").with_installed("jq", Some("1.6")));
        let mut reg = ManagerRegistry::new();
        reg.register(brew.clone());
        let ctx = env.context(true).with_registry(reg);
        locked(&ctx, &[("brew", "jq", Some("1.6"))]);

        let result = upgrade_packages(&ctx, &ctx.cancel, &[]).unwrap();
        assert_eq!(result.results[0].status, OperationStatus::WouldUpdate);
        assert!(brew.calls().is_empty());
        let entry = ctx.lock.find_package("brew", "jq").unwrap().unwrap();
        assert_eq!(entry.version.as_deref(), Some("1.6"));
    }

    #[test]
    fn search_skips_unavailable_managers() {
        let env = TestEnv::new();
        let ctx = env.context(false).with_registry(registry(vec![
            FakeManager::new("brew"),
            FakeManager::unavailable("gem"),
        ]));
        let hits = search_packages(&ctx, &ctx.cancel, "rg", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].manager, "brew");
        assert_eq!(hits[0].packages, ["rg-cli", "rg"]);

        let err = search_packages(&ctx, &ctx.cancel, "rg", Some("gem")).unwrap_err();
        assert!(matches!(err, PackageError::ManagerUnavailable(_)));
    }
}
