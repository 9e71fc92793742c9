//! YAML lock file in the config directory.
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use super::{CURRENT_VERSION, Lock, LockStore, schema};
use crate::dotfiles::atomic::write_atomic;
use crate::dotfiles::filter::LOCK_FILE;
use crate::error::LockError;

/// [`LockStore`] backed by `<config_dir>/dotkeeper.lock`.
#[derive(Debug, Clone)]
pub struct YamlLockStore {
    path: PathBuf,
}

impl YamlLockStore {
    /// Store for the lock file inside `config_dir`.
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(LOCK_FILE),
        }
    }
}

impl LockStore for YamlLockStore {
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn read(&self) -> Result<Lock, LockError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lock::new()),
            Err(source) => {
                return Err(LockError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        schema::parse(&self.path, &text)
    }

    fn write(&self, lock: &Lock) -> Result<(), LockError> {
        let text = schema::serialize(lock).map_err(|message| LockError::Write {
            path: self.path.clone(),
            message,
        })?;
        if lock.version < CURRENT_VERSION {
            tracing::debug!(
                "migrating {} from version {} to {CURRENT_VERSION}",
                self.path.display(),
                lock.version
            );
        }
        write_atomic(&self.path, 0, Some(&self.path), |f| {
            f.write_all(text.as_bytes())
        })
        .map_err(|e| LockError::Write {
            path: self.path.clone(),
            message: format!("{e:#}"),
        })
    }
}
