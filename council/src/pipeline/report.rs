//! Pipeline output: stage results, failures and the tournament audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ExternalFacts;
use crate::engine::ConsensusOutcome;

/// The recorded outcome of one successful stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: u32,
    pub role: String,
    /// Responses in agent-id order
    pub individual_responses: Vec<String>,
    pub consensus: String,
    pub timestamp: DateTime<Utc>,
}

impl StageResult {
    pub fn from_outcome(role: impl Into<String>, outcome: &ConsensusOutcome) -> Self {
        Self {
            stage_id: outcome.stage_id,
            role: role.into(),
            individual_responses: outcome.responses.clone(),
            consensus: outcome.consensus.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A stage that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage_id: u32,
    pub role: String,
    pub error: String,
}

/// Everything a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    /// Successful stages in execution order
    pub results: Vec<StageResult>,
    pub failures: Vec<StageFailure>,
    /// Facts injected into the run, verbatim
    pub facts: ExternalFacts,
    /// Backend names used by the pipeline
    pub models: Vec<String>,
    /// Full tournament record per successful stage
    pub tournaments: Vec<ConsensusOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn result_for(&self, stage_id: u32) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_id == stage_id)
    }

    pub fn completed_stage_ids(&self) -> Vec<u32> {
        self.results.iter().map(|r| r.stage_id).collect()
    }

    /// Consensus of the last successful stage
    pub fn final_consensus(&self) -> Option<&str> {
        self.results.last().map(|r| r.consensus.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
