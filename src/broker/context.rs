// src/broker/context.rs

use std::collections::BTreeMap;

use crate::template::expand_lenient;

/// Batch information visible to code running inside a task.
///
/// Bound into the run's process-scope session by the artifact executor;
/// task bodies obtain it with `broker.get::<ExecutionContext>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    user: String,
    batch_id: String,
    flow_id: String,
    stage_id: Option<String>,
    execution_id: String,
    batch_arguments: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(
        user: impl Into<String>,
        batch_id: impl Into<String>,
        flow_id: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            batch_id: batch_id.into(),
            flow_id: flow_id.into(),
            stage_id: None,
            execution_id: execution_id.into(),
            batch_arguments: BTreeMap::new(),
        }
    }

    pub fn with_stage_id(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    pub fn with_batch_arguments<I, K, V>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.batch_arguments
            .extend(arguments.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn stage_id(&self) -> Option<&str> {
        self.stage_id.as_deref()
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn batch_arguments(&self) -> &BTreeMap<String, String> {
        &self.batch_arguments
    }

    pub fn batch_argument(&self, key: &str) -> Option<&str> {
        self.batch_arguments.get(key).map(String::as_str)
    }

    /// Replace `${key}` with the matching batch argument; unknown keys are
    /// left as written.
    pub fn resolve_arguments(&self, input: &str) -> String {
        expand_lenient(input, |key| self.batch_arguments.get(key).cloned())
    }
}
