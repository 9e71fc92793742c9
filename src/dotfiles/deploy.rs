//! Writes one dotfile item from the config directory into home.
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Local};

use super::atomic::{copy_file, write_atomic};
use super::template::TemplateProcessor;
use crate::reconcile::Item;

/// `<dest>.<YYYYMMDD-HHMMSS>.backup`.
#[must_use]
pub fn backup_path(destination: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(format!(".{}.backup", at.format("%Y%m%d-%H%M%S")));
    PathBuf::from(name)
}

/// Copy an existing destination file aside. Returns the backup path, or
/// `None` when there was nothing to back up.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup(destination: &Path) -> Result<Option<PathBuf>> {
    if !destination.is_file() {
        return Ok(None);
    }
    let target = backup_path(destination, Local::now());
    copy_file(destination, &target)
        .with_context(|| format!("failed to back up {}", destination.display()))?;
    tracing::debug!("backed up {} to {}", destination.display(), target.display());
    Ok(Some(target))
}

/// Deploy `item` to its destination, backing up an existing file first
/// when `backup_existing` is set.
///
/// Templates are rendered in memory, everything else is copied. Both keep
/// the source's permission bits.
///
/// # Errors
///
/// Returns an error if the item has no source or destination, a template
/// fails to render, or any write fails. A failed write leaves the previous
/// destination content in place.
pub fn deploy(item: &Item, templates: &dyn TemplateProcessor, backup_existing: bool) -> Result<()> {
    let (Some(source), Some(destination)) = (&item.source, &item.path) else {
        bail!("{} has no source or destination", item.name);
    };
    if backup_existing {
        backup(destination)?;
    }
    if templates.is_template(source) {
        let rendered = templates.render_to_bytes(source)?;
        write_atomic(destination, 0, Some(source), |f| f.write_all(&rendered))
    } else {
        copy_file(source, destination)
    }
}
