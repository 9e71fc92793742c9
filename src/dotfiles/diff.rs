//! Shows how drifted dotfiles differ from what `apply` would write.
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tempfile::NamedTempFile;

use super::apply::FilterSet;
use super::compare::ContentComparator;
use super::provider::DotfileProvider;
use crate::cancel::CancelToken;
use crate::context::Context;
use crate::reconcile::Item;

/// Diff tool output for one drifted dotfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotfileDiff {
    /// `~/` destination.
    pub destination: String,
    /// Combined output of the diff tool.
    pub output: String,
}

/// Drifted dotfiles selected by `filter`.
///
/// # Errors
///
/// Returns the reconcile error.
pub fn drifted(ctx: &Context, filter: &FilterSet) -> Result<Vec<Item>> {
    let provider = DotfileProvider::new(&ctx.paths, ctx.config.as_ref(), ctx.templates.as_ref());
    let reconciled = provider.reconcile(&ContentComparator::new(Arc::clone(&ctx.templates)))?;
    Ok(reconciled
        .degraded()
        .filter(|i| filter.selects(i))
        .cloned()
        .collect())
}

fn render_to_temp(ctx: &Context, source: &Path) -> Result<NamedTempFile> {
    let rendered = ctx.templates.render_to_bytes(source)?;
    let mut file = NamedTempFile::new().context("failed to create temp file")?;
    file.write_all(&rendered)
        .context("failed to write rendered template")?;
    Ok(file)
}

/// Run the configured `diff_tool` on every drifted dotfile, source first.
///
/// Template sources are rendered into a temporary file, so the diff shows
/// the content `apply` would deploy. Exit status 1 means "files differ".
///
/// # Errors
///
/// Returns an error if `diff_tool` is empty, a template fails to render, or
/// the tool cannot run or exits with a status above 1.
pub fn diff_dotfiles(
    ctx: &Context,
    cancel: &CancelToken,
    filter: &FilterSet,
) -> Result<Vec<DotfileDiff>> {
    let mut tool = ctx.config.diff_tool.split_whitespace();
    let Some(program) = tool.next() else {
        bail!("diff_tool is empty");
    };
    let base: Vec<&str> = tool.collect();

    let mut diffs = Vec::new();
    for item in drifted(ctx, filter)? {
        let (Some(source), Some(destination)) = (&item.source, &item.path) else {
            continue;
        };
        let rendered = if ctx.templates.is_template(source) {
            Some(render_to_temp(ctx, source)?)
        } else {
            None
        };
        let from = rendered
            .as_ref()
            .map_or(source.as_path(), NamedTempFile::path)
            .to_string_lossy()
            .into_owned();
        let to = destination.to_string_lossy().into_owned();

        let mut args = base.clone();
        args.extend([from.as_str(), to.as_str()]);
        let result = ctx.executor.run_unchecked(cancel, program, &args)?;
        if result.code.is_some_and(|c| c > 1) {
            bail!(
                "{program} failed on {}: {}",
                item.destination,
                result.stderr.trim()
            );
        }
        diffs.push(DotfileDiff {
            destination: item.destination.clone(),
            output: result.combined(),
        });
    }
    Ok(diffs)
}
