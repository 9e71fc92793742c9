//! Mapping between dotfile names, config-directory sources and home
//! destinations, with traversal-safe validation.
//!
//! [`PathResolver`] is the only place that turns a logical name or a
//! `~/`-relative destination into an absolute path.
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Prefix of every home-relative destination.
pub const HOME_PREFIX: &str = "~/";

/// `zshrc` → `~/.zshrc`, `config/nvim/init.lua` → `~/.config/nvim/init.lua`.
#[must_use]
pub fn source_to_target(source: &str) -> String {
    format!("{HOME_PREFIX}.{source}")
}

/// Inverse of [`source_to_target`]: `~/.zshrc` → `zshrc`.
///
/// Destinations that do not start with `~/.` are returned unchanged.
#[must_use]
pub fn target_to_source(target: &str) -> String {
    target
        .strip_prefix("~/.")
        .map_or_else(|| target.to_string(), str::to_string)
}

/// Logical item name for a destination: `~/.zshrc` → `zshrc`,
/// `~/.config/nvim/init.lua` → `config/nvim/init.lua`.
#[must_use]
pub fn dotfile_name(destination: &str) -> String {
    let rel = destination.strip_prefix(HOME_PREFIX).unwrap_or(destination);
    rel.strip_prefix('.').unwrap_or(rel).to_string()
}

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// preceding normal components. Leading `..` on a relative path is kept.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Resolves dotfile names against a home directory and a config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    home: PathBuf,
    config_dir: PathBuf,
}

impl PathResolver {
    /// Create a resolver. Both directories are lexically cleaned.
    #[must_use]
    pub fn new(home: &Path, config_dir: &Path) -> Self {
        Self {
            home: clean_path(home),
            config_dir: clean_path(config_dir),
        }
    }

    /// Home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Config directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Absolute source path for a config-relative source.
    #[must_use]
    pub fn source_path(&self, source: &str) -> PathBuf {
        self.config_dir.join(source)
    }

    /// Absolute, validated destination path.
    ///
    /// Accepts `~/`-relative, absolute, or bare relative (treated as
    /// home-relative) destinations.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the destination contains a NUL byte, resolves
    /// outside the home directory, or resolves into the config directory.
    pub fn destination_path(&self, destination: &str) -> Result<PathBuf, PathError> {
        if destination.contains('\0') {
            return Err(PathError::NulByte(destination.to_string()));
        }
        let path = self.expand(destination);
        self.validate(&path)?;
        Ok(path)
    }

    /// Check that `path` lies strictly inside the home directory and outside
    /// the config directory.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] describing the violated rule.
    pub fn validate(&self, path: &Path) -> Result<(), PathError> {
        if path.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(PathError::NulByte(path.display().to_string()));
        }
        let cleaned = clean_path(path);
        if !cleaned.is_absolute() || cleaned == self.home || !cleaned.starts_with(&self.home) {
            return Err(PathError::OutsideHome { path: cleaned });
        }
        if cleaned.starts_with(&self.config_dir) {
            return Err(PathError::ConfigDirectory { path: cleaned });
        }
        Ok(())
    }

    /// Normalize a user-supplied path for filter matching: `~` expanded,
    /// relative paths resolved against `cwd`, lexically cleaned.
    #[must_use]
    pub fn normalize(&self, path: &str, cwd: &Path) -> PathBuf {
        if path == "~" {
            return self.home.clone();
        }
        if let Some(rest) = path.strip_prefix(HOME_PREFIX) {
            return clean_path(&self.home.join(rest));
        }
        let p = Path::new(path);
        if p.is_absolute() {
            clean_path(p)
        } else {
            clean_path(&cwd.join(p))
        }
    }

    /// `~/`-form of an absolute path inside home, if it is inside home.
    #[must_use]
    pub fn to_tilde(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.home).ok()?;
        Some(format!("{HOME_PREFIX}{}", rel.to_string_lossy()))
    }

    fn expand(&self, destination: &str) -> PathBuf {
        let raw = destination.strip_prefix(HOME_PREFIX).map_or_else(
            || {
                let p = Path::new(destination);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    self.home.join(p)
                }
            },
            |rest| self.home.join(rest),
        );
        clean_path(&raw)
    }
}
