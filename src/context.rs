//! Shared state for one invocation.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cancel::CancelToken;
use crate::config::{Config, Timeout};
use crate::dotfiles::paths::PathResolver;
use crate::dotfiles::template::{LocalTemplates, TemplateProcessor};
use crate::exec::Executor;
use crate::lock::{LockStore, YamlLockStore};
use crate::logging::Log;
use crate::packages::ManagerRegistry;
use crate::packages::command::ManagerTimeouts;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "DOTKEEPER_DIR";

/// Everything the engine needs, constructed once at process start and passed
/// by reference.
pub struct Context {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Home and config directory resolution.
    pub paths: PathResolver,
    /// Package managers available to this run.
    pub registry: Arc<ManagerRegistry>,
    /// Lock file access.
    pub lock: Arc<dyn LockStore>,
    /// Template rendering for dotfile sources.
    pub templates: Arc<dyn TemplateProcessor>,
    /// Logger for output and action recording.
    pub log: Arc<dyn Log>,
    /// Command executor shared by every manager.
    pub executor: Arc<dyn Executor>,
    /// Run-wide cancellation, fired by Ctrl-C.
    pub cancel: CancelToken,
    /// Whether to classify changes without performing them.
    pub dry_run: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &"<Config>")
            .field("paths", &self.paths)
            .field("registry", &self.registry.names())
            .field("lock", &self.lock.path())
            .field("templates", &"<dyn TemplateProcessor>")
            .field("log", &"<dyn Log>")
            .field("executor", &"<dyn Executor>")
            .field("cancel", &self.cancel)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Context {
    /// Build a context with the YAML lock store, local templates and one
    /// command-driven manager per configured definition.
    #[must_use]
    pub fn new(
        config: Config,
        paths: PathResolver,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        dry_run: bool,
    ) -> Self {
        let timeouts = ManagerTimeouts {
            availability: config.timeout(Timeout::Availability),
            operation: config.timeout(Timeout::Operation),
        };
        let registry =
            ManagerRegistry::from_definitions(&config.manager_definitions(), &executor, timeouts);
        let config_dir = paths.config_dir().to_path_buf();
        Self {
            config: Arc::new(config),
            paths,
            registry: Arc::new(registry),
            lock: Arc::new(YamlLockStore::new(&config_dir)),
            templates: Arc::new(LocalTemplates::new(&config_dir)),
            log,
            executor,
            cancel: CancelToken::new(),
            dry_run,
        }
    }

    /// Replace the manager registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ManagerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the lock store.
    #[must_use]
    pub fn with_lock_store(mut self, lock: Arc<dyn LockStore>) -> Self {
        self.lock = lock;
        self
    }

    /// Replace the command executor. Managers already in the registry keep
    /// the executor they were built with.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the run-wide cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Child of `parent` limited by the configured `which` timeout.
    #[must_use]
    pub fn deadline(&self, parent: &CancelToken, which: Timeout) -> CancelToken {
        self.config
            .timeout(which)
            .map_or_else(|| parent.clone(), |t| parent.with_timeout(t))
    }
}

/// Resolve the home and config directories from flags and the environment.
///
/// # Errors
///
/// Returns an error if no home directory is given and `$HOME` is unset.
pub fn resolve_paths(home: Option<PathBuf>, config_dir: Option<PathBuf>) -> Result<PathResolver> {
    let home = match home {
        Some(home) => home,
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .context("HOME environment variable is not set")?,
    };
    let config_dir = choose_config_dir(
        &home,
        config_dir,
        std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from),
    );
    Ok(PathResolver::new(&home, &config_dir))
}

fn choose_config_dir(home: &Path, flag: Option<PathBuf>, env: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| home.join(".config").join("dotkeeper"))
}

/// Context fixtures for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::sync::Arc;

    use super::Context;
    use crate::config::Config;
    use crate::dotfiles::paths::PathResolver;
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::Logger;
    use crate::packages::ManagerRegistry;

    /// Temporary home and config directories plus a context over them.
    ///
    /// The registry starts empty; tests register the managers they need.
    #[derive(Debug)]
    pub struct TestEnv {
        /// Home directory.
        pub home: tempfile::TempDir,
        /// Config directory.
        pub config: tempfile::TempDir,
    }

    impl Default for TestEnv {
        #[allow(clippy::expect_used)]
        fn default() -> Self {
            Self {
                home: tempfile::tempdir().expect("home dir"),
                config: tempfile::tempdir().expect("config dir"),
            }
        }
    }

    impl TestEnv {
        /// Fresh empty directories.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Context with default config.
        #[must_use]
        pub fn context(&self, dry_run: bool) -> Context {
            self.context_with(Config::default(), dry_run)
        }

        /// Context with `config`.
        #[must_use]
        pub fn context_with(&self, config: Config, dry_run: bool) -> Context {
            let paths = PathResolver::new(self.home.path(), self.config.path());
            Context::new(
                config,
                paths,
                Arc::new(Logger::with_log_file(None)),
                Arc::new(MockExecutor::new()),
                dry_run,
            )
            .with_registry(ManagerRegistry::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_precedence() {
        let home = Path::new("/home/u");
        assert_eq!(
            choose_config_dir(home, Some("/flag".into()), Some("/env".into())),
            PathBuf::from("/flag")
        );
        assert_eq!(
            choose_config_dir(home, None, Some("/env".into())),
            PathBuf::from("/env")
        );
        assert_eq!(
            choose_config_dir(home, None, Some(PathBuf::new())),
            PathBuf::from("/home/u/.config/dotkeeper")
        );
        assert_eq!(
            choose_config_dir(home, None, None),
            PathBuf::from("/home/u/.config/dotkeeper")
        );
    }

    #[test]
    fn context_uses_config_dir_for_lock() {
        let env = test_helpers::TestEnv::new();
        let ctx = env.context(false);
        assert_eq!(
            ctx.lock.path(),
            env.config.path().join(crate::dotfiles::filter::LOCK_FILE)
        );
        assert!(ctx.registry.names().is_empty());
    }

    #[test]
    fn deadline_is_skipped_for_zero_timeout() {
        let env = test_helpers::TestEnv::new();
        let config = Config {
            dotfile_timeout: 0,
            ..Config::default()
        };
        let ctx = env.context_with(config, false);
        assert!(ctx.deadline(&ctx.cancel, Timeout::Dotfile).remaining().is_none());
        assert!(ctx.deadline(&ctx.cancel, Timeout::Package).remaining().is_some());
    }
}
