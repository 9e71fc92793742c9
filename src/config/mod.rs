//! Configuration loaded from `dotkeeper.toml` in the config directory.
//!
//! The file is optional: every field has a default, so a fresh config
//! directory works without one.
pub mod managers;
pub mod toml_loader;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::dotfiles::filter::CONFIG_FILE;
pub use managers::ManagerDefinition;

const MAX_OPERATION_TIMEOUT: u64 = 3600;
const MAX_PACKAGE_TIMEOUT: u64 = 1800;
const MAX_DOTFILE_TIMEOUT: u64 = 600;
const MAX_AVAILABILITY_TIMEOUT: u64 = 60;
const DEFAULT_HOOK_TIMEOUT: u64 = 600;

/// Settings the dotfile scanner consumes.
pub trait DotfileSettings {
    /// Patterns excluded from both the config directory and home.
    fn ignore_patterns(&self) -> &[String];
    /// Home subdirectories walked file by file instead of listed whole.
    fn expand_directories(&self) -> &[String];
    /// Extra patterns applied only when discovering untracked files inside
    /// expanded directories.
    fn unmanaged_filters(&self) -> &[String];
}

/// Which configured timeout to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// List and search commands.
    Operation,
    /// A single install or uninstall.
    Package,
    /// The whole dotfile apply pass.
    Dotfile,
    /// A manager availability probe.
    Availability,
}

/// Contents of `dotkeeper.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manager used when none is given on the command line.
    pub default_manager: String,
    /// Seconds allowed for list and search commands; `0` disables.
    pub operation_timeout: u64,
    /// Seconds allowed for one install or uninstall; `0` disables.
    pub package_timeout: u64,
    /// Seconds allowed for the dotfile apply pass; `0` disables.
    pub dotfile_timeout: u64,
    /// Seconds allowed for a manager availability probe; `0` disables.
    pub availability_timeout: u64,
    /// Home subdirectories scanned file by file.
    pub expand_directories: Vec<String>,
    /// Ignore patterns for sources and home entries.
    pub ignore_patterns: Vec<String>,
    /// Patterns hiding noise inside expanded directories.
    pub unmanaged_filters: Vec<String>,
    /// Copy an existing destination aside before overwriting it.
    pub backup_on_overwrite: bool,
    /// Manager overrides and additions keyed by name.
    pub managers: BTreeMap<String, ManagerDefinition>,
    /// Command `diff` runs; source and destination paths are appended.
    pub diff_tool: String,
    /// Commands run around `apply`.
    pub hooks: Hooks,
}

/// `[hooks]` table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hooks {
    /// Run before the package pass.
    pub pre_apply: Vec<Hook>,
    /// Run after the dotfile pass.
    pub post_apply: Vec<Hook>,
}

/// One shell command run by `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hook {
    /// Passed to `sh -c`.
    pub command: String,
    /// Seconds allowed; `0` disables.
    pub timeout: u64,
    /// Log a failure and carry on instead of aborting the apply.
    pub continue_on_error: bool,
}

impl Default for Hook {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
            continue_on_error: false,
        }
    }
}

impl Hook {
    /// Hook running `command` with default settings.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Configured timeout; `None` when disabled with `0`.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout))
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_manager: "brew".to_string(),
            operation_timeout: 300,
            package_timeout: 180,
            dotfile_timeout: 60,
            availability_timeout: 10,
            expand_directories: strings(&[".config"]),
            ignore_patterns: strings(&[
                ".DS_Store",
                ".Trash",
                ".CFUserTextEncoding",
                ".cups",
                ".git",
                "*.backup",
                "*.tmp",
                "*.swp",
                "dotkeeper.lock",
                ".cache",
                ".npm",
                ".gem",
                ".cargo",
                ".rustup",
                ".bundle",
                ".local",
                ".ollama",
                "*_history",
                "*.lesshst",
                ".cursor",
                ".lima",
                ".colima",
                ".cdk",
                ".magefile",
                ".ssh",
                ".gnupg",
                "*_token",
                "*.pem",
                "*.key",
            ]),
            unmanaged_filters: strings(&[
                "*.log",
                "*.lock",
                "*.db",
                "*.cache",
                "*.map",
                "*.pid",
                "*.sock",
                "*.socket",
                "*.sqlite",
                "*.sqlite3",
                "*.wasm",
                "*.idx",
                "*.pack",
                "**/node_modules/**",
                "**/plugins/**",
                "**/extensions/**",
                "**/__pycache__/**",
                "**/logs/**",
                "**/tmp/**",
                "**/temp/**",
                "**/dist/**",
                "**/build/**",
                "**/out/**",
                "**/.git/**",
                "**/*cache*/**",
                "**/Cache/**",
                "**/Caches/**",
                "**/*-*-*-*-*/**",
                "**/*state*",
                "**/*session*",
                "**/*State*",
                "**/hooks/**",
                "**/objects/**",
                "**/refs/**",
            ]),
            backup_on_overwrite: true,
            managers: BTreeMap::new(),
            diff_tool: "git diff --no-index".to_string(),
            hooks: Hooks::default(),
        }
    }
}

impl Config {
    /// Load `dotkeeper.toml` from `config_dir`, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let config: Self = toml_loader::load_config(&path)
            .with_context(|| format!("loading {CONFIG_FILE}"))?;
        tracing::debug!(
            "loaded config from {} ({} manager overrides)",
            path.display(),
            config.managers.len()
        );
        Ok(config)
    }

    /// Configured timeout; `None` when disabled with `0`.
    #[must_use]
    pub const fn timeout(&self, which: Timeout) -> Option<Duration> {
        let secs = match which {
            Timeout::Operation => self.operation_timeout,
            Timeout::Package => self.package_timeout,
            Timeout::Dotfile => self.dotfile_timeout,
            Timeout::Availability => self.availability_timeout,
        };
        if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        }
    }

    /// Built-in manager definitions merged with `[managers.*]` overrides.
    #[must_use]
    pub fn manager_definitions(&self) -> BTreeMap<String, ManagerDefinition> {
        managers::merge_definitions(&self.managers)
    }

    /// Check the configuration for likely mistakes.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let defs = self.manager_definitions();

        if !self.default_manager.is_empty() && !defs.contains_key(&self.default_manager) {
            warnings.push(ValidationWarning::new(
                "default_manager",
                format!("unknown package manager '{}'", self.default_manager),
            ));
        }

        for (name, def) in &defs {
            if def.binary.trim().is_empty() {
                warnings.push(ValidationWarning::new(
                    format!("managers.{name}"),
                    "no binary configured",
                ));
            }
            if def.install.command.is_empty() {
                warnings.push(ValidationWarning::new(
                    format!("managers.{name}"),
                    "no install command configured",
                ));
            }
        }

        for (field, value, max) in [
            ("operation_timeout", self.operation_timeout, MAX_OPERATION_TIMEOUT),
            ("package_timeout", self.package_timeout, MAX_PACKAGE_TIMEOUT),
            ("dotfile_timeout", self.dotfile_timeout, MAX_DOTFILE_TIMEOUT),
            (
                "availability_timeout",
                self.availability_timeout,
                MAX_AVAILABILITY_TIMEOUT,
            ),
        ] {
            if value > max {
                warnings.push(ValidationWarning::new(
                    field,
                    format!("{value}s exceeds the maximum of {max}s"),
                ));
            }
        }

        if self.expand_directories.iter().any(|d| d.trim().is_empty()) {
            warnings.push(ValidationWarning::new(
                "expand_directories",
                "contains an empty entry",
            ));
        }

        if self.diff_tool.split_whitespace().next().is_none() {
            warnings.push(ValidationWarning::new("diff_tool", "is empty"));
        }

        for (phase, hooks) in [
            ("pre_apply", &self.hooks.pre_apply),
            ("post_apply", &self.hooks.post_apply),
        ] {
            for (i, hook) in hooks.iter().enumerate() {
                if hook.command.trim().is_empty() {
                    warnings.push(ValidationWarning::new(
                        format!("hooks.{phase}[{i}]"),
                        "empty command",
                    ));
                }
            }
        }

        warnings
    }
}

impl DotfileSettings for Config {
    fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    fn expand_directories(&self) -> &[String] {
        &self.expand_directories
    }

    fn unmanaged_filters(&self) -> &[String] {
        &self.unmanaged_filters
    }
}

/// A non-fatal problem found in `dotkeeper.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Key or table that triggered the warning.
    pub item: String,
    /// Human-readable message.
    pub message: String,
}

impl ValidationWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{CONFIG_FILE}: {}: {}", self.item, self.message)
    }
}
