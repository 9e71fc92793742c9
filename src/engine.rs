//! Top-level reconcile and apply across both domains.
use anyhow::{Context as _, Result};

use crate::config::Timeout;
use crate::context::Context;
use crate::dotfiles::apply::{FilterSet, apply_dotfiles};
use crate::dotfiles::compare::ContentComparator;
use crate::dotfiles::provider::DotfileProvider;
use crate::hooks::{HookPhase, run_hooks};
use crate::packages::apply::apply_packages;
use crate::packages::provider::reconcile_packages;
use crate::reconcile::{ApplyReport, Domain, ReconcileResult};

/// Which domains an apply touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Packages, then dotfiles.
    #[default]
    All,
    /// Packages only.
    Packages,
    /// Dotfiles only.
    Dotfiles,
}

impl Scope {
    /// Scope from the mutually exclusive `--packages` / `--dotfiles` flags.
    #[must_use]
    pub const fn from_flags(packages: bool, dotfiles: bool) -> Self {
        match (packages, dotfiles) {
            (true, false) => Self::Packages,
            (false, true) => Self::Dotfiles,
            _ => Self::All,
        }
    }

    const fn includes(self, domain: Domain) -> bool {
        matches!(
            (self, domain),
            (Self::All, _) | (Self::Packages, Domain::Package) | (Self::Dotfiles, Domain::Dotfile)
        )
    }
}

/// Options for [`apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Stop each pass after its first failed item.
    pub fail_fast: bool,
    /// Restrict the dotfile pass to these destinations.
    pub filter: FilterSet,
    /// Domains to apply.
    pub scope: Scope,
}

/// Reconcile one domain.
///
/// # Errors
///
/// Returns a fatal error: an unreadable or corrupt lock file, a destination
/// escaping home, or cancellation while probing managers.
pub fn reconcile(ctx: &Context, domain: Domain) -> Result<ReconcileResult> {
    match domain {
        Domain::Dotfile => {
            let provider =
                DotfileProvider::new(&ctx.paths, ctx.config.as_ref(), ctx.templates.as_ref());
            provider.reconcile(&ContentComparator::new(ctx.templates.clone()))
        }
        Domain::Package => {
            let lock = ctx.lock.read().map_err(anyhow::Error::new)?;
            reconcile_packages(&ctx.registry, &lock, &ctx.cancel, ctx.log.as_ref())
                .context("failed to reconcile packages")
        }
    }
}

/// Apply packages and then dotfiles, per `opts.scope`.
///
/// Packages go first so that tools installed by them are present before
/// their configuration is deployed. The dotfile pass runs under the
/// configured dotfile timeout. Pre-apply hooks run before both passes and
/// post-apply hooks after them, unless the run was cancelled.
///
/// # Errors
///
/// Returns the fatal errors described for [`reconcile`] and failing hooks.
/// Per-item failures are reported in the returned [`ApplyReport`].
pub fn apply(ctx: &Context, opts: &ApplyOptions) -> Result<ApplyReport> {
    let mut report = ApplyReport {
        dry_run: ctx.dry_run,
        ..ApplyReport::default()
    };
    run_hooks(ctx, HookPhase::PreApply)?;

    if opts.scope.includes(Domain::Package) {
        ctx.log.stage("Applying packages");
        report.packages = Some(apply_packages(ctx, &ctx.cancel, opts.fail_fast)?);
    }

    if opts.scope.includes(Domain::Dotfile) {
        if ctx.cancel.is_cancelled() {
            return Ok(report);
        }
        ctx.log.stage("Applying dotfiles");
        let cancel = ctx.deadline(&ctx.cancel, Timeout::Dotfile);
        report.dotfiles = Some(apply_dotfiles(ctx, &cancel, &opts.filter, opts.fail_fast)?);
    }

    if !ctx.cancel.is_cancelled() {
        run_hooks(ctx, HookPhase::PostApply)?;
    }
    Ok(report)
}
