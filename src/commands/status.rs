//! Status command implementation.
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, StatusOpts};
use crate::engine::{self, Scope};
use crate::logging::Logger;
use crate::reconcile::{Domain, DriftStatus, Item, ReconcileResult};

fn label(item: &Item) -> String {
    match item.domain {
        Domain::Package => format!("{}:{}", item.manager, item.name),
        Domain::Dotfile => item.destination.clone(),
    }
}

fn managed_line(item: &Item) -> String {
    match (item.drift, &item.error) {
        (Some(DriftStatus::Error), Some(error)) => format!("drifted    {} ({error})", label(item)),
        (Some(_), _) => format!("drifted    {}", label(item)),
        (None, _) => match &item.version {
            Some(version) => format!("ok         {} {version}", label(item)),
            None => format!("ok         {}", label(item)),
        },
    }
}

/// Lines to print for one domain's reconcile result.
#[must_use]
pub fn render(result: &ReconcileResult, show_untracked: bool) -> Vec<String> {
    let mut lines: Vec<String> = result.managed.iter().map(managed_line).collect();
    lines.extend(
        result
            .missing
            .iter()
            .map(|i| format!("missing    {}", label(i))),
    );
    if show_untracked {
        lines.extend(
            result
                .untracked
                .iter()
                .map(|i| format!("untracked  {}", label(i))),
        );
    }
    let s = result.summary();
    lines.push(format!(
        "{} managed ({} drifted), {} missing, {} untracked",
        s.managed, s.degraded, s.missing, s.untracked
    ));
    lines
}

/// Run the status command.
///
/// # Errors
///
/// Returns an error if setup fails or reconciliation hits a fatal error.
pub fn run(
    global: &GlobalOpts,
    opts: &StatusOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let scope = Scope::from_flags(opts.domains.packages, opts.domains.dotfiles);

    if scope != Scope::Dotfiles {
        log.stage("Packages");
        let result = engine::reconcile(&setup.ctx, Domain::Package)?;
        for line in render(&result, opts.untracked) {
            log.info(&line);
        }
    }
    if scope != Scope::Packages {
        log.stage("Dotfiles");
        let result = engine::reconcile(&setup.ctx, Domain::Dotfile)?;
        for line in render(&result, opts.untracked) {
            log.info(&line);
        }
    }
    Ok(())
}
