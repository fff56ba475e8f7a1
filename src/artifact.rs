// src/artifact.rs

//! Top-level entry point: run a compiled artifact inside a broker session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::broker::{ExecutionContext, Scope};
use crate::dag::TaskGraph;
use crate::engine::{CancelHandle, RunReport, Runtime, RuntimeOptions};
use crate::errors::Result;
use crate::exec::{ExecutorRegistry, TaskContext};

/// A compiled task graph plus the metadata identifying it.
#[derive(Debug, Clone)]
pub struct Artifact {
    batch_id: String,
    flow_id: String,
    stage_id: Option<String>,
    graph: TaskGraph,
}

impl Artifact {
    pub fn new(batch_id: impl Into<String>, flow_id: impl Into<String>, graph: TaskGraph) -> Self {
        Self {
            batch_id: batch_id.into(),
            flow_id: flow_id.into(),
            stage_id: None,
            graph,
        }
    }

    pub fn with_stage_id(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
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

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }
}

/// Runs artifacts.
///
/// For each run it:
/// - binds an [`ExecutionContext`] into a fresh process-scope session
/// - drives the [`Runtime`] through every phase
/// - closes the session on every exit path
#[derive(Debug, Clone)]
pub struct ArtifactExecutor {
    registry: Arc<ExecutorRegistry>,
    options: RuntimeOptions,
    cancel: CancelHandle,
    user: Option<String>,
    execution_id: Option<String>,
}

impl ArtifactExecutor {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: RuntimeOptions::default(),
            cancel: CancelHandle::new(),
            user: None,
            execution_id: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.options = RuntimeOptions::with_workers(workers);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Handle that cancels runs started by this executor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Run `artifact` to completion.
    ///
    /// Returns the report on success. A failed or cancelled run returns
    /// [`crate::errors::PhasedagError::RunFailed`] or
    /// [`crate::errors::PhasedagError::Cancelled`], both carrying the report.
    pub async fn execute(
        &self,
        ctx: &TaskContext,
        artifact: &Artifact,
        batch_arguments: BTreeMap<String, String>,
    ) -> Result<RunReport> {
        let execution_id = self
            .execution_id
            .clone()
            .unwrap_or_else(|| generate_execution_id(artifact.flow_id()));
        let user = self.user.clone().unwrap_or_else(default_user);

        let mut context = ExecutionContext::new(
            user,
            artifact.batch_id(),
            artifact.flow_id(),
            execution_id.as_str(),
        )
        .with_batch_arguments(batch_arguments);
        if let Some(stage) = artifact.stage_id() {
            context = context.with_stage_id(stage);
        }

        info!(
            run = %execution_id,
            batch = artifact.batch_id(),
            flow = artifact.flow_id(),
            user = context.user(),
            tasks = artifact.graph().len(),
            "starting artifact run"
        );

        let broker = ctx.broker();
        let mut session = broker.attach(Scope::Process, |bindings| {
            bindings.put(context);
            Ok(())
        })?;

        let run_ctx = ctx.with_cancel(self.cancel.signal());
        let result = Runtime::new(
            artifact.graph(),
            Arc::clone(&self.registry),
            run_ctx,
            self.options,
        )
        .with_execution_id(execution_id.as_str())
        .run()
        .await;

        session.close();
        if broker.depth(Scope::Local) > 0 {
            warn!(
                run = %execution_id,
                depth = broker.depth(Scope::Local),
                "local sessions still open after run"
            );
        }

        result
    }
}

/// `<flow>-<pid>-<nanos>`, unique enough for log correlation.
fn generate_execution_id(flow_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{flow_id}-{}-{nanos:x}", std::process::id())
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
