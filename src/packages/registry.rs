//! Registry of package managers, built once per run and passed by reference.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use super::PackageManager;
use super::command::{CommandManager, ManagerTimeouts};
use crate::cancel::CancelToken;
use crate::config::ManagerDefinition;
use crate::error::PackageError;
use crate::exec::Executor;

/// Name-keyed package managers plus a per-run availability cache.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    managers: BTreeMap<String, Arc<dyn PackageManager>>,
    availability: Mutex<HashMap<String, bool>>,
}

impl ManagerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`CommandManager`] per definition, all sharing `executor`.
    #[must_use]
    pub fn from_definitions(
        definitions: &BTreeMap<String, ManagerDefinition>,
        executor: &Arc<dyn Executor>,
        timeouts: ManagerTimeouts,
    ) -> Self {
        let mut registry = Self::new();
        for (name, def) in definitions {
            registry.register(Arc::new(CommandManager::new(
                name,
                def.clone(),
                Arc::clone(executor),
                timeouts,
            )));
        }
        registry
    }

    /// Add or replace a manager under its own name.
    pub fn register(&mut self, manager: Arc<dyn PackageManager>) {
        let name = manager.name().to_string();
        if let Ok(mut cache) = self.availability.lock() {
            cache.remove(&name);
        }
        self.managers.insert(name, manager);
    }

    /// Look up a manager.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnknownManager`] if no manager has this name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn PackageManager>, PackageError> {
        self.managers
            .get(name)
            .cloned()
            .ok_or_else(|| PackageError::UnknownManager(name.to_string()))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.managers.keys().cloned().collect()
    }

    /// Whether `name` is available. Answers are cached for the registry's
    /// lifetime; errors are not.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnknownManager`] for unregistered names and
    /// the probe's error when it was interrupted.
    pub fn is_available(&self, cancel: &CancelToken, name: &str) -> Result<bool, PackageError> {
        if let Some(cached) = self
            .availability
            .lock()
            .ok()
            .and_then(|c| c.get(name).copied())
        {
            return Ok(cached);
        }
        let available = self.get(name)?.is_available(cancel)?;
        tracing::debug!("{name} available: {available}");
        if let Ok(mut cache) = self.availability.lock() {
            cache.insert(name.to_string(), available);
        }
        Ok(available)
    }

    /// The manager `name`, provided it is available.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::ManagerUnavailable`] when the probe says no,
    /// plus everything [`is_available`](Self::is_available) returns.
    pub fn available_manager(
        &self,
        cancel: &CancelToken,
        name: &str,
    ) -> Result<Arc<dyn PackageManager>, PackageError> {
        if self.is_available(cancel, name)? {
            self.get(name)
        } else {
            Err(PackageError::ManagerUnavailable(name.to_string()))
        }
    }
}
