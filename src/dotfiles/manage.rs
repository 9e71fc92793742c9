//! Bring home files under management and release them again.
//!
//! `add` copies a file from home into the config directory, where it
//! becomes a source; `remove` deletes the source and leaves the home copy
//! alone.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use walkdir::WalkDir;

use super::atomic::copy_file;
use super::filter::IgnoreFilter;
use super::paths::target_to_source;
use super::scanner::config_targets;
use crate::cancel::CancelToken;
use crate::context::Context;
use crate::error::ErrorKind;
use crate::reconcile::outcome::record;
use crate::reconcile::{ApplyResult, Domain, OperationResult, OperationStatus, StopReason};

fn result(name: &str, status: OperationStatus) -> OperationResult {
    OperationResult::new(Domain::Dotfile, "", name, status)
}

fn skipped(name: &str, note: impl Into<String>) -> OperationResult {
    let mut r = result(name, OperationStatus::Skipped);
    r.error = Some(note.into());
    r
}

/// Resolve a user-supplied path to a home path.
///
/// `~/` is expanded and absolute paths are kept. A relative path is taken
/// against `cwd` when that exists, else against home.
#[must_use]
pub fn resolve_home_path(ctx: &Context, arg: &str, cwd: &Path) -> PathBuf {
    let path = ctx.paths.normalize(arg, cwd);
    let relative = !arg.starts_with('~') && Path::new(arg).is_relative();
    if relative && path.symlink_metadata().is_err() {
        return ctx.paths.normalize(&format!("~/{arg}"), cwd);
    }
    path
}

/// Home files named by `arg`: the file itself, or every file below a
/// directory that the ignore patterns keep.
fn expand(ctx: &Context, path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let filter = IgnoreFilter::new(&ctx.config.ignore_patterns).excluding(ctx.paths.config_dir());
    let home = ctx.paths.home();
    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !filter.is_excluded(e.path())
                && e.path()
                    .strip_prefix(home)
                    .is_ok_and(|rel| !filter.is_ignored(rel, e.file_type().is_dir()))
        });
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to scan {}", path.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn run_each<F>(
    ctx: &Context,
    cancel: &CancelToken,
    paths: Vec<PathBuf>,
    mut each: F,
) -> Result<ApplyResult>
where
    F: FnMut(&Path) -> Result<OperationResult>,
{
    let mut results = Vec::new();
    let mut stopped = None;
    for path in paths {
        if let Err(reason) = cancel.check() {
            stopped = Some(StopReason::Interrupted(reason));
            break;
        }
        let result = each(&path)?;
        record(ctx.log.as_ref(), &result);
        results.push(result);
    }
    let mut applied = ApplyResult::new(ctx.dry_run, results, 0);
    applied.stopped = stopped;
    Ok(applied)
}

/// Copy home files into the config directory so they become sources.
///
/// Directories are added file by file. A file that already has a source
/// is refreshed (`updated`); one rendered from a template is skipped, since
/// its source is the template.
///
/// # Errors
///
/// Returns an error if the config directory or a named directory cannot be
/// scanned. Per-file problems are failed results.
pub fn add_dotfiles(
    ctx: &Context,
    cancel: &CancelToken,
    args: &[String],
    cwd: &Path,
) -> Result<ApplyResult> {
    let templates: Vec<(String, String)> = ctx
        .templates
        .list_templates()?
        .into_iter()
        .map(|t| (ctx.templates.template_name(&t), t))
        .collect();

    let mut paths = Vec::new();
    let mut early = Vec::new();
    for arg in args {
        let path = resolve_home_path(ctx, arg, cwd);
        if let Err(e) = ctx.paths.validate(&path) {
            early.push(result(arg, OperationStatus::Failed).failed(e.kind(), e.to_string()));
        } else if path.symlink_metadata().is_err() {
            early.push(
                result(arg, OperationStatus::Failed)
                    .failed(ErrorKind::FileNotFound, format!("{} does not exist", path.display())),
            );
        } else {
            paths.extend(expand(ctx, &path)?);
        }
    }
    for r in &early {
        record(ctx.log.as_ref(), r);
    }

    let mut applied = run_each(ctx, cancel, paths, |path| {
        let Some(destination) = ctx.paths.to_tilde(path) else {
            return Ok(result(&path.display().to_string(), OperationStatus::Failed)
                .failed(ErrorKind::PathValidation, "not inside the home directory"));
        };
        let source = target_to_source(&destination);
        if source == destination {
            return Ok(result(&destination, OperationStatus::Failed).failed(
                ErrorKind::PathValidation,
                "only hidden entries of the home directory can be managed",
            ));
        }
        if let Some((_, template)) = templates.iter().find(|(name, _)| *name == source) {
            return Ok(skipped(&destination, format!("rendered from template {template}")));
        }

        let source_path = ctx.paths.source_path(&source);
        let exists = source_path.symlink_metadata().is_ok();
        let status = match (exists, ctx.dry_run) {
            (true, true) => OperationStatus::WouldUpdate,
            (true, false) => OperationStatus::Updated,
            (false, true) => OperationStatus::WouldAdd,
            (false, false) => OperationStatus::Added,
        };
        let r = result(&destination, status).with_path(path.to_path_buf());
        if ctx.dry_run {
            return Ok(r);
        }
        match copy_file(path, &source_path) {
            Ok(()) => {
                ctx.log.debug(&format!("{destination} -> {}", source_path.display()));
                Ok(r)
            }
            Err(e) => Ok(r.failed(ErrorKind::FileIo, format!("{e:#}"))),
        }
    })?;

    let count = early.len();
    early.append(&mut applied.results);
    applied.results = early;
    applied.summary.failed += count;
    Ok(applied)
}

/// Stop managing dotfiles: delete their sources from the config directory.
///
/// A directory argument releases every source below it. The home files are
/// left in place. Unmanaged paths are skipped.
///
/// # Errors
///
/// Returns an error if the config directory cannot be scanned.
pub fn remove_dotfiles(
    ctx: &Context,
    cancel: &CancelToken,
    args: &[String],
    cwd: &Path,
) -> Result<ApplyResult> {
    let filter = IgnoreFilter::new(&ctx.config.ignore_patterns);
    let targets = config_targets(ctx.paths.config_dir(), &filter, ctx.templates.as_ref())?;

    let mut sources: Vec<PathBuf> = Vec::new();
    let mut unmanaged = Vec::new();
    for arg in args {
        let path = resolve_home_path(ctx, arg, cwd);
        let Some(destination) = ctx.paths.to_tilde(&path) else {
            unmanaged.push(skipped(arg, "not inside the home directory"));
            continue;
        };
        let below = format!("{destination}/");
        let matched: Vec<PathBuf> = targets
            .iter()
            .filter(|(_, d)| **d == destination || d.starts_with(&below))
            .map(|(s, _)| ctx.paths.source_path(s))
            .collect();
        if matched.is_empty() {
            unmanaged.push(skipped(&destination, "not managed"));
        }
        for source in matched {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
    }
    for r in &unmanaged {
        record(ctx.log.as_ref(), r);
    }

    let mut applied = run_each(ctx, cancel, sources, |source| {
        let rel = source
            .strip_prefix(ctx.paths.config_dir())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let destination = targets.get(&rel).cloned().unwrap_or(rel);
        if ctx.dry_run {
            return Ok(result(&destination, OperationStatus::WouldRemove));
        }
        let r = result(&destination, OperationStatus::Removed).with_path(source.to_path_buf());
        if let Err(e) = fs::remove_file(source) {
            return Ok(r.failed(ErrorKind::FileIo, format!("failed to remove {}: {e}", source.display())));
        }
        prune_empty_parents(source, ctx.paths.config_dir());
        Ok(r)
    })?;

    let count = unmanaged.len();
    unmanaged.append(&mut applied.results);
    applied.results = unmanaged;
    applied.summary.skipped += count;
    Ok(applied)
}

/// Remove directories left empty between `path` and `root`.
fn prune_empty_parents(path: &Path, root: &Path) {
    for dir in path.ancestors().skip(1) {
        if dir == root || !dir.starts_with(root) || fs::remove_dir(dir).is_err() {
            break;
        }
        tracing::trace!("removed empty {}", dir.display());
    }
}
