//! Stage definitions: how each pipeline step builds its task.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::context::{AnalysisContext, ExternalFacts};
use crate::backend::Backend;

/// Builds a stage's task text from the accumulated context and facts
pub type TaskBuilder =
    Arc<dyn Fn(&AnalysisContext, &ExternalFacts) -> anyhow::Result<String> + Send + Sync>;

/// What a stage sends to its backends ahead of the task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextSource {
    /// No prefix
    None,
    /// External facts as pretty JSON
    #[default]
    Facts,
    /// Every prior stage's role and consensus
    History,
}

/// One pipeline step
#[derive(Clone)]
pub struct StageDefinition {
    pub id: u32,
    pub role: String,
    builder: TaskBuilder,
    context: ContextSource,
    backends: Option<Vec<Arc<dyn Backend>>>,
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("context", &self.context)
            .field(
                "backends",
                &self
                    .backends
                    .as_ref()
                    .map(|b| b.iter().map(|b| b.name().to_string()).collect::<Vec<_>>()),
            )
            .finish()
    }
}

impl StageDefinition {
    pub fn new<F>(id: u32, role: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&AnalysisContext, &ExternalFacts) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            id,
            role: role.into(),
            builder: Arc::new(builder),
            context: ContextSource::default(),
            backends: None,
        }
    }

    /// Final stage whose task concatenates every prior stage's consensus
    pub fn synthesis(id: u32, role: impl Into<String>, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        Self::new(id, role, move |context, _facts| {
            Ok(format!(
                "Based on the following {} analysis results, produce a comprehensive report:\n\n{}\n\n{}",
                context.len(),
                context.render(),
                instructions
            ))
        })
        .with_context(ContextSource::History)
    }

    pub fn with_context(mut self, context: ContextSource) -> Self {
        self.context = context;
        self
    }

    /// Run this stage on its own backends instead of the pipeline's
    pub fn with_backends(mut self, backends: Vec<Arc<dyn Backend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn context_source(&self) -> ContextSource {
        self.context
    }

    pub fn backends(&self) -> Option<&[Arc<dyn Backend>]> {
        self.backends.as_deref()
    }

    /// Build the task text. A panicking builder is reported as an error.
    pub fn build_task(
        &self,
        context: &AnalysisContext,
        facts: &ExternalFacts,
    ) -> anyhow::Result<String> {
        match catch_unwind(AssertUnwindSafe(|| (self.builder)(context, facts))) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "task builder panicked: {}",
                panic_message(&*payload)
            )),
        }
    }

    /// Text placed ahead of the task for every backend call in this stage
    pub fn context_prefix(&self, context: &AnalysisContext, facts: &ExternalFacts) -> String {
        match self.context {
            ContextSource::None => String::new(),
            ContextSource::Facts if facts.is_empty() => String::new(),
            ContextSource::Facts => facts.to_json(),
            ContextSource::History => context.render(),
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
