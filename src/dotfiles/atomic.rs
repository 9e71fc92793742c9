//! Atomic file replacement: temp file in the destination directory, fsync,
//! chmod, rename.
//!
//! Readers observe either the old or the new content, never a partial write.
//! The temp file lives in the destination's directory so the final rename
//! never crosses a filesystem boundary; [`tempfile::NamedTempFile`] removes
//! it on every early return.
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::Path;

use anyhow::{Context as _, Result};

/// Default mode for new files when neither a mode nor a mode source is given.
pub const DEFAULT_MODE: u32 = 0o644;

/// Atomically replace `destination` with the bytes `write_fn` produces.
///
/// `mode` sets the final permission bits. A `mode` of `0` copies the mode of
/// `mode_source` (falling back to [`DEFAULT_MODE`]), which keeps executable
/// bits on scripts.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, `write_fn`
/// fails, or the temp file cannot be synced, chmodded or renamed. The
/// destination is untouched and no temp file remains in every error case.
pub fn write_atomic<F>(
    destination: &Path,
    mode: u32,
    mode_source: Option<&Path>,
    write_fn: F,
) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let base = destination
        .file_name()
        .map_or_else(|| "file".into(), |n| n.to_string_lossy());
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".tmp-{base}-"))
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;

    write_fn(temp.as_file_mut())
        .with_context(|| format!("failed to write content for {}", destination.display()))?;
    temp.as_file_mut()
        .flush()
        .and_then(|()| temp.as_file().sync_all())
        .with_context(|| format!("failed to sync temp file for {}", destination.display()))?;

    let mode = resolve_mode(mode, mode_source);
    set_mode(temp.path(), mode)
        .with_context(|| format!("failed to set permissions for {}", destination.display()))?;

    temp.persist(destination)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to rename temp file to {}", destination.display()))?;
    tracing::trace!("wrote {} (mode {mode:o})", destination.display());
    Ok(())
}

/// Atomically copy `source` to `destination`, preserving the source mode.
///
/// # Errors
///
/// Returns an error if the source cannot be opened, plus everything
/// [`write_atomic`] returns.
pub fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    let mut input =
        File::open(source).with_context(|| format!("failed to open {}", source.display()))?;
    write_atomic(destination, 0, Some(source), |out| {
        io::copy(&mut input, out).map(drop)
    })
}

fn resolve_mode(mode: u32, mode_source: Option<&Path>) -> u32 {
    if mode != 0 {
        return mode;
    }
    mode_source
        .and_then(|p| fs::metadata(p).ok())
        .map_or(DEFAULT_MODE, |m| file_mode(&m))
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        DEFAULT_MODE
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}
