//! Stage pipeline
//!
//! Runs a fixed, ordered list of stages. Each stage assembles a fresh team,
//! builds its task from the accumulated context, runs the consensus engine
//! and folds the winning response back into the context for later stages.
//!
//! A stage that errors or panics is skipped: it leaves no result, is
//! recorded as a failure, and the pipeline moves on.

pub mod catalog;
pub mod context;
pub mod report;
pub mod stage;

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, OllamaBackend};
use crate::config::{ConfigError, CouncilConfig};
use crate::engine::{ConsensusEngine, ConsensusError, ConsensusOutcome, TieBreaker};
use crate::events::{CouncilEvent, EventBus, SharedEventBus};
use crate::team::{Team, TeamError};

pub use catalog::security_analysis_stages;
pub use context::{AnalysisContext, ContextEntry, ExternalFacts};
pub use report::{PipelineReport, StageFailure, StageResult};
pub use stage::{ContextSource, StageDefinition, TaskBuilder};

/// Why a stage produced no result
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Failed to build task: {0:#}")]
    Task(anyhow::Error),

    #[error(transparent)]
    Team(#[from] TeamError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error("cancelled")]
    Cancelled,
}

/// Errors assembling a pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Duplicate stage id {0}")]
    DuplicateStage(u32),
}

/// Ordered stages sharing one engine, one backend pool and one event bus
pub struct Pipeline {
    config: CouncilConfig,
    backends: Vec<Arc<dyn Backend>>,
    stages: Vec<StageDefinition>,
    engine: ConsensusEngine,
    event_bus: SharedEventBus,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Assemble a pipeline over explicit backends
    pub fn new(
        config: CouncilConfig,
        backends: Vec<Arc<dyn Backend>>,
        stages: Vec<StageDefinition>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut seen = std::collections::HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id) {
                return Err(PipelineError::DuplicateStage(stage.id));
            }
        }

        let event_bus = EventBus::new().shared();
        let cancel = CancellationToken::new();
        let engine = ConsensusEngine::new(config.engine.clone())
            .with_event_bus(Arc::clone(&event_bus))
            .with_cancellation(cancel.clone());

        Ok(Self {
            config,
            backends,
            stages,
            engine,
            event_bus,
            cancel,
        })
    }

    /// Assemble a pipeline with one Ollama backend per configured model
    pub fn from_config(
        config: CouncilConfig,
        stages: Vec<StageDefinition>,
    ) -> Result<Self, PipelineError> {
        let backends = OllamaBackend::from_config(&config.backend)?
            .into_iter()
            .map(|b| Arc::new(b) as Arc<dyn Backend>)
            .collect();
        Self::new(config, backends, stages)
    }

    pub fn with_tie_breaker(mut self, tie_breaker: Arc<dyn TieBreaker>) -> Self {
        self.engine = self.engine.with_tie_breaker(tie_breaker);
        self
    }

    /// Publish to an existing bus instead of the pipeline's own
    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.engine = self.engine.with_event_bus(Arc::clone(&event_bus));
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> SharedEventBus {
        Arc::clone(&self.event_bus)
    }

    /// Token that aborts in-flight calls and skips remaining stages
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    fn publish(&self, event: CouncilEvent) {
        self.event_bus.publish(event);
    }

    /// Run every stage in order and collect the report
    pub async fn run(&self, facts: ExternalFacts) -> PipelineReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, stages = self.stages.len(), "Pipeline started");
        self.publish(CouncilEvent::PipelineStarted {
            run_id: run_id.clone(),
            stages: self.stages.len(),
            timestamp: started_at,
        });

        let mut context = AnalysisContext::new();
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut tournaments = Vec::new();

        for stage in &self.stages {
            match self.run_stage(stage, &context, &facts).await {
                Ok(outcome) => {
                    let result = StageResult::from_outcome(&stage.role, &outcome);
                    context.record(stage.id, &stage.role, &outcome.consensus);
                    info!(
                        stage_id = stage.id,
                        role = %stage.role,
                        winner = outcome.winner,
                        "Stage completed"
                    );
                    self.publish(CouncilEvent::StageCompleted {
                        stage_id: stage.id,
                        role: stage.role.clone(),
                        timestamp: result.timestamp,
                    });
                    results.push(result);
                    tournaments.push(outcome);
                }
                Err(e) => {
                    warn!(
                        stage_id = stage.id,
                        role = %stage.role,
                        error = %e,
                        "Stage failed; skipping"
                    );
                    self.publish(CouncilEvent::StageFailed {
                        stage_id: stage.id,
                        role: stage.role.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    failures.push(StageFailure {
                        stage_id: stage.id,
                        role: stage.role.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        info!(
            run_id = %run_id,
            completed = results.len(),
            failed = failures.len(),
            "Pipeline finished"
        );
        self.publish(CouncilEvent::PipelineCompleted {
            run_id: run_id.clone(),
            completed: results.len(),
            failed: failures.len(),
            timestamp: finished_at,
        });

        PipelineReport {
            run_id,
            results,
            failures,
            facts,
            models: self.backends.iter().map(|b| b.name().to_string()).collect(),
            tournaments,
            started_at,
            finished_at,
        }
    }

    /// One stage, isolated on its own task so a panic is contained
    async fn run_stage(
        &self,
        stage: &StageDefinition,
        context: &AnalysisContext,
        facts: &ExternalFacts,
    ) -> Result<ConsensusOutcome, StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let backends = stage.backends().unwrap_or(self.backends.as_slice());
        let team = Team::new(
            stage.id,
            stage.role.clone(),
            backends,
            self.config.engine.team_size,
        )?;
        let task = stage.build_task(context, facts).map_err(StageError::Task)?;
        let prefix = stage.context_prefix(context, facts);

        info!(
            stage_id = stage.id,
            role = %stage.role,
            team_size = team.size(),
            "Stage started"
        );
        self.publish(CouncilEvent::StageStarted {
            stage_id: stage.id,
            role: stage.role.clone(),
            team_size: team.size(),
            timestamp: Utc::now(),
        });

        let engine = self.engine.clone();
        let handle = tokio::spawn(async move { engine.run(&team, &task, &prefix).await });

        let outcome = match handle.await {
            Ok(result) => result?,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                return Err(StageError::Panicked(stage::panic_message(&*payload)));
            }
            Err(e) => return Err(StageError::Panicked(e.to_string())),
        };

        // Calls cut short by cancellation leave a hollow tournament
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        Ok(outcome)
    }
}
