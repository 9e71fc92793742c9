//! SHA-256 content comparison, plain and template-aware.
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use sha2::{Digest, Sha256};

use super::template::TemplateProcessor;
use crate::reconcile::{Comparator, ComparisonMode, Item};

/// SHA-256 digest of a file, streamed.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hasher.finalize().into())
}

/// Returns `Ok(false)` when `destination` does not exist, otherwise whether
/// both files have the same SHA-256.
///
/// # Errors
///
/// Returns an error if the source cannot be read, or the destination exists
/// but cannot be read.
pub fn compare_files(source: &Path, destination: &Path) -> Result<bool> {
    if !destination_exists(destination)? {
        return Ok(false);
    }
    Ok(hash_file(source)? == hash_file(destination)?)
}

/// Compare an in-memory buffer (e.g. a rendered template) against a file.
///
/// # Errors
///
/// Returns an error if the destination exists but cannot be read.
pub fn compare_rendered(rendered: &[u8], destination: &Path) -> Result<bool> {
    if !destination_exists(destination)? {
        return Ok(false);
    }
    let expected: [u8; 32] = Sha256::digest(rendered).into();
    Ok(expected == hash_file(destination)?)
}

fn destination_exists(path: &Path) -> Result<bool> {
    match path.symlink_metadata() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Resolves dotfile [`ComparisonMode`]s against the filesystem.
#[derive(Debug, Clone)]
pub struct ContentComparator {
    templates: Arc<dyn TemplateProcessor>,
}

impl ContentComparator {
    /// Comparator rendering templates through `templates`.
    #[must_use]
    pub fn new(templates: Arc<dyn TemplateProcessor>) -> Self {
        Self { templates }
    }
}

impl Comparator for ContentComparator {
    fn identical(&self, item: &Item) -> Result<bool> {
        let (Some(source), Some(destination)) = (&item.source, &item.path) else {
            return Ok(true);
        };
        match item.comparison {
            ComparisonMode::None => Ok(true),
            ComparisonMode::ContentHash => compare_files(source, destination),
            ComparisonMode::TemplateHash => {
                let rendered = self.templates.render_to_bytes(source)?;
                compare_rendered(&rendered, destination)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dotfiles::template::LocalTemplates;
    use std::fs;

    #[test]
    fn identical_files_match() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();
        assert!(compare_files(&a, &b).unwrap());
    }

    #[test]
    fn one_byte_difference_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        fs::write(&a, "same").unwrap();
        fs::write(&b, "samf").unwrap();
        assert!(!compare_files(&a, &b).unwrap());
    }

    #[test]
    fn missing_destination_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, "x").unwrap();
        assert!(!compare_files(&a, &dir.path().join("nope")).unwrap());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b");
        fs::write(&b, "x").unwrap();
        assert!(compare_files(&dir.path().join("nope"), &b).is_err());
    }

    #[test]
    fn rendered_bytes_compare_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b");
        fs::write(&b, "hello").unwrap();
        assert!(compare_rendered(b"hello", &b).unwrap());
        assert!(!compare_rendered(b"hellO", &b).unwrap());
    }

    #[test]
    fn template_comparison_leaves_no_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gitconfig.tmpl");
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join(".gitconfig");
        fs::write(&src, "plain text").unwrap();
        fs::write(&dest, "plain text").unwrap();

        let cmp = ContentComparator::new(Arc::new(LocalTemplates::new(dir.path())));
        let item = Item {
            source: Some(src),
            path: Some(dest),
            comparison: ComparisonMode::TemplateHash,
            ..Item::dotfile("gitconfig")
        };
        assert!(cmp.identical(&item).unwrap());
        assert_eq!(fs::read_dir(dest_dir.path()).unwrap().count(), 1);
    }
}
