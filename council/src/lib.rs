//! Elimination-voting council
//!
//! This library provides:
//! - Fail-soft text-generation backends (Ollama over HTTP, scripted replies)
//! - Agents and teams bound to a stage role
//! - A consensus engine: parallel generation followed by an elimination
//!   voting tournament that keeps exactly one response
//! - A stage pipeline that folds each stage's consensus into the context
//!   of later stages, plus a default nine-stage security-analysis catalog
//! - Structured events on a broadcast bus and `tracing` instrumentation
//!
//! # Usage
//!
//! ```no_run
//! use council::{CouncilConfig, ExternalFacts, Pipeline};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! council::telemetry::init_tracing();
//! let config = CouncilConfig::from_env()?;
//! let pipeline = Pipeline::from_config(config, council::security_analysis_stages())?;
//!
//! let facts = ExternalFacts::new().with("package_name", "com.example.app");
//! let report = pipeline.run(facts).await;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod backend;
pub mod config;
pub mod engine;
pub mod events;
pub mod pipeline;
pub mod team;
pub mod telemetry;

// Re-export key backend types
pub use backend::{Backend, BackendError, OllamaBackend, ScriptedBackend};

// Re-export key agent and team types
pub use agent::{Agent, AgentId, Ballot};
pub use team::{Team, TeamError};

// Re-export key config types
pub use config::{BackendConfig, ConfigError, ConfigResult, CouncilConfig, EngineConfig};

// Re-export key engine types
pub use engine::{
    Candidate, ConsensusEngine, ConsensusError, ConsensusOutcome, ConsensusResult, InvalidVote,
    ResolvedVote, RngTieBreaker, RoundRecord, TieBreaker, VoteChoice, VoteFallback,
};

// Re-export key event types
pub use events::{CouncilEvent, EventBus, SharedEventBus};

// Re-export key pipeline types
pub use pipeline::{
    security_analysis_stages, AnalysisContext, ContextSource, ExternalFacts, Pipeline,
    PipelineError, PipelineReport, StageDefinition, StageError, StageFailure, StageResult,
};
