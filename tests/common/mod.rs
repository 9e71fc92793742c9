// Shared helpers for integration tests.
//
// Provides temporary home and config directories, a fluent builder for
// their contents and a scripted `fakepm` package manager behind the real
// `Executor` trait, so the full command-driven manager stack runs without
// touching the host.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dotkeeper::cancel::CancelToken;
use dotkeeper::config::Config;
use dotkeeper::context::Context;
use dotkeeper::dotfiles::paths::PathResolver;
use dotkeeper::error::ExecError;
use dotkeeper::exec::{ExecResult, Executor};
use dotkeeper::logging::Logger;

/// `dotkeeper.toml` declaring `fakepm` as the default manager.
pub const FAKEPM_CONFIG: &str = r#"
default_manager = "fakepm"

[managers.fakepm]
binary = "fakepm"
list = { command = ["fakepm", "list"], parse = "lines" }
install = { command = ["fakepm", "install", "{package}"] }
uninstall = { command = ["fakepm", "uninstall", "{package}"] }
upgrade = { command = ["fakepm", "upgrade", "{package}"] }
search = { command = ["fakepm", "search", "{query}"] }
"#;

/// Packages `fakepm search` knows about.
const CATALOGUE: &[&str] = &["ripgrep", "ripgrep-all", "fd", "jq", "bat"];

/// Scripted package manager reachable as the `fakepm` program.
///
/// Installed packages live in memory. Names listed as unknown fail to
/// install with a "no available formula" message.
#[derive(Debug, Default)]
pub struct FakePackageSystem {
    installed: Mutex<BTreeMap<String, String>>,
    unknown: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakePackageSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, name: &str, version: &str) -> Self {
        self.installed
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn with_unknown(mut self, name: &str) -> Self {
        self.unknown.insert(name.to_string());
        self
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.lock().unwrap().contains_key(name)
    }

    /// Mutating commands run so far, as `"install jq"` strings.
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                ["install ", "uninstall ", "upgrade "]
                    .iter()
                    .any(|verb| c.starts_with(verb))
            })
            .cloned()
            .collect()
    }

    fn respond(&self, args: &[&str]) -> ExecResult {
        let ok = |stdout: String| ExecResult {
            stdout,
            success: true,
            code: Some(0),
            ..ExecResult::default()
        };
        let fail = |stderr: String| ExecResult {
            stderr,
            success: false,
            code: Some(1),
            ..ExecResult::default()
        };
        let mut installed = self.installed.lock().unwrap();
        match args {
            ["--version"] => ok("fakepm 1.0\n".to_string()),
            ["list"] => ok(installed
                .iter()
                .map(|(name, version)| format!("{name} {version}\n"))
                .collect()),
            ["install", name] if self.unknown.contains(*name) => {
                fail(format!("Error: No available formula with the name \"{name}\"."))
            }
            ["install", name] if installed.contains_key(*name) => {
                ok(format!("Warning: {name} already installed\n"))
            }
            ["install", name] => {
                installed.insert((*name).to_string(), "2.0.0".to_string());
                ok(format!("installed {name}\n"))
            }
            ["uninstall", name] => {
                if installed.remove(*name).is_some() {
                    ok(format!("uninstalled {name}\n"))
                } else {
                    fail(format!("Error: No such keg: {name}"))
                }
            }
            ["upgrade", name] => match installed.get_mut(*name) {
                Some(version) if version == "2.0.0" => {
                    ok(format!("Warning: {name} already up to date\n"))
                }
                Some(version) => {
                    *version = "2.0.0".to_string();
                    ok(format!("upgraded {name}\n"))
                }
                None => fail(format!("Error: No such keg: {name}")),
            },
            ["search", query] => ok(CATALOGUE
                .iter()
                .filter(|p| p.contains(query))
                .map(|p| format!("{p}\n"))
                .collect()),
            _ => fail(format!("unknown command: {}", args.join(" "))),
        }
    }
}

impl Executor for FakePackageSystem {
    fn run_unchecked(
        &self,
        cancel: &CancelToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        cancel.check().map_err(|reason| ExecError::Interrupted {
            program: program.to_string(),
            reason,
        })?;
        if program != "fakepm" {
            return Err(ExecError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        self.calls.lock().unwrap().push(args.join(" "));
        Ok(self.respond(args))
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        (program == "fakepm").then(|| PathBuf::from("/usr/local/bin/fakepm"))
    }
}

/// Temporary home and config directories.
///
/// Both are deleted when dropped.
pub struct Fixture {
    pub home: tempfile::TempDir,
    pub config: tempfile::TempDir,
    pub system: Arc<FakePackageSystem>,
}

impl Fixture {
    /// Home directory path.
    pub fn home(&self) -> &Path {
        self.home.path()
    }

    /// Config directory path.
    pub fn config_dir(&self) -> &Path {
        self.config.path()
    }

    /// Load `dotkeeper.toml` and build a context over the fixture.
    pub fn context(&self, dry_run: bool) -> Context {
        let config = Config::load(self.config_dir()).expect("load config");
        let paths = PathResolver::new(self.home(), self.config_dir());
        Context::new(
            config,
            paths,
            Arc::new(Logger::with_log_file(None)),
            self.system.clone(),
            dry_run,
        )
    }

    /// Read a file relative to home.
    pub fn read_home(&self, rel: &str) -> String {
        std::fs::read_to_string(self.home().join(rel)).expect("read home file")
    }

    /// Raw lock file text, empty if absent.
    pub fn lock_text(&self) -> String {
        std::fs::read_to_string(self.config_dir().join("dotkeeper.lock")).unwrap_or_default()
    }

    /// Every file under home, relative, sorted.
    pub fn home_files(&self) -> Vec<String> {
        walkdir::WalkDir::new(self.home())
            .sort_by_file_name()
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(self.home())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }
}

/// Fluent builder for [`Fixture`].
pub struct FixtureBuilder {
    fixture: Fixture,
    system: FakePackageSystem,
}

impl FixtureBuilder {
    /// Empty directories, `fakepm` configured as the default manager.
    pub fn new() -> Self {
        let fixture = Fixture {
            home: tempfile::tempdir().expect("create home"),
            config: tempfile::tempdir().expect("create config"),
            system: Arc::new(FakePackageSystem::new()),
        };
        let builder = Self {
            fixture,
            system: FakePackageSystem::new(),
        };
        builder.with_config(FAKEPM_CONFIG)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }

    /// Replace `dotkeeper.toml`.
    pub fn with_config(self, toml: &str) -> Self {
        Self::write(self.fixture.config.path(), "dotkeeper.toml", toml);
        self
    }

    /// Write a dotfile source into the config directory.
    pub fn with_source(self, rel: &str, content: &str) -> Self {
        Self::write(self.fixture.config.path(), rel, content);
        self
    }

    /// Write a file into home.
    pub fn with_home_file(self, rel: &str, content: &str) -> Self {
        Self::write(self.fixture.home.path(), rel, content);
        self
    }

    /// Write the lock file verbatim.
    pub fn with_lock(self, yaml: &str) -> Self {
        Self::write(self.fixture.config.path(), "dotkeeper.lock", yaml);
        self
    }

    /// Mark a package as installed in `fakepm`.
    pub fn with_installed(mut self, name: &str, version: &str) -> Self {
        self.system = self.system.with_installed(name, version);
        self
    }

    /// Make `fakepm install <name>` fail as an unknown package.
    pub fn with_unknown(mut self, name: &str) -> Self {
        self.system = self.system.with_unknown(name);
        self
    }

    /// Finish building.
    pub fn build(mut self) -> Fixture {
        self.fixture.system = Arc::new(self.system);
        self.fixture
    }
}
