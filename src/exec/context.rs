// src/exec/context.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::broker::ResourceBroker;
use crate::engine::CancelSignal;
use crate::errors::ExecutionError;
use crate::template::expand_strict;

/// Shared, read-only environment handed to every executor invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    framework_root: PathBuf,
    launcher: Option<PathBuf>,
    environment: Arc<BTreeMap<String, String>>,
    broker: ResourceBroker,
    cancel: CancelSignal,
}

impl TaskContext {
    pub fn new(framework_root: impl Into<PathBuf>) -> Self {
        Self {
            framework_root: framework_root.into(),
            launcher: None,
            environment: Arc::new(BTreeMap::new()),
            broker: ResourceBroker::new(),
            cancel: CancelSignal::never(),
        }
    }

    /// Launch every command through this wrapper; the real executable
    /// becomes its first argument.
    pub fn with_launcher(mut self, launcher: impl Into<PathBuf>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.environment).insert(key.into(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        Arc::make_mut(&mut self.environment).extend(environment);
        self
    }

    pub fn with_broker(mut self, broker: ResourceBroker) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_cancel(&self, cancel: CancelSignal) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn framework_root(&self) -> &Path {
        &self.framework_root
    }

    /// Launcher path, resolved against the framework root.
    pub fn launcher(&self) -> Option<PathBuf> {
        self.launcher.as_deref().map(|l| self.resolve_path(l))
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn broker(&self) -> &ResourceBroker {
        &self.broker
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Relative paths are taken relative to the framework root.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.framework_root.join(path)
        }
    }

    /// Expand `${NAME}` from the context environment.
    pub fn resolve(&self, token: &str) -> Result<String, ExecutionError> {
        self.resolve_with(token, &BTreeMap::new())
    }

    /// Expand `${NAME}`, preferring `overrides` over the context environment.
    pub fn resolve_with(
        &self,
        token: &str,
        overrides: &BTreeMap<String, String>,
    ) -> Result<String, ExecutionError> {
        expand_strict(token, |name| {
            overrides
                .get(name)
                .or_else(|| self.environment.get(name))
                .cloned()
        })
        .map_err(ExecutionError::UnresolvedPlaceholder)
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new(".")
    }
}
