//! Event types for consensus runs and pipelines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// All council coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouncilEvent {
    /// A pipeline run began
    PipelineStarted {
        run_id: String,
        stages: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage's team was assembled and its task built
    StageStarted {
        stage_id: u32,
        role: String,
        team_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// The generation barrier was crossed
    ResponsesCollected {
        stage_id: u32,
        responses: usize,
        empty_responses: usize,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One elimination round finished
    RoundCompleted {
        stage_id: u32,
        round: u32,
        tally: Vec<(AgentId, u32)>,
        abstentions: u32,
        fallbacks: u32,
        total_tie: bool,
        eliminated: AgentId,
        timestamp: DateTime<Utc>,
    },

    /// A single candidate survived
    ConsensusReached {
        stage_id: u32,
        winner: AgentId,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A stage result was appended to history
    StageCompleted {
        stage_id: u32,
        role: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage was skipped after an error
    StageFailed {
        stage_id: u32,
        role: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// All stages were attempted
    PipelineCompleted {
        run_id: String,
        completed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CouncilEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CouncilEvent::PipelineStarted { timestamp, .. } => *timestamp,
            CouncilEvent::StageStarted { timestamp, .. } => *timestamp,
            CouncilEvent::ResponsesCollected { timestamp, .. } => *timestamp,
            CouncilEvent::RoundCompleted { timestamp, .. } => *timestamp,
            CouncilEvent::ConsensusReached { timestamp, .. } => *timestamp,
            CouncilEvent::StageCompleted { timestamp, .. } => *timestamp,
            CouncilEvent::StageFailed { timestamp, .. } => *timestamp,
            CouncilEvent::PipelineCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CouncilEvent::PipelineStarted { .. } => "pipeline_started",
            CouncilEvent::StageStarted { .. } => "stage_started",
            CouncilEvent::ResponsesCollected { .. } => "responses_collected",
            CouncilEvent::RoundCompleted { .. } => "round_completed",
            CouncilEvent::ConsensusReached { .. } => "consensus_reached",
            CouncilEvent::StageCompleted { .. } => "stage_completed",
            CouncilEvent::StageFailed { .. } => "stage_failed",
            CouncilEvent::PipelineCompleted { .. } => "pipeline_completed",
        }
    }

    /// Get the stage ID if this event is stage-scoped
    pub fn stage_id(&self) -> Option<u32> {
        match self {
            CouncilEvent::StageStarted { stage_id, .. }
            | CouncilEvent::ResponsesCollected { stage_id, .. }
            | CouncilEvent::RoundCompleted { stage_id, .. }
            | CouncilEvent::ConsensusReached { stage_id, .. }
            | CouncilEvent::StageCompleted { stage_id, .. }
            | CouncilEvent::StageFailed { stage_id, .. } => Some(*stage_id),
            CouncilEvent::PipelineStarted { .. } | CouncilEvent::PipelineCompleted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CouncilEvent::RoundCompleted {
            stage_id: 2,
            round: 1,
            tally: vec![(1, 3), (2, 2)],
            abstentions: 1,
            fallbacks: 0,
            total_tie: false,
            eliminated: 5,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"round_completed\""));

        let parsed: CouncilEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "round_completed");
        assert_eq!(parsed.stage_id(), Some(2));
    }

    #[test]
    fn test_pipeline_events_are_not_stage_scoped() {
        let event = CouncilEvent::PipelineCompleted {
            run_id: "run-1".to_string(),
            completed: 3,
            failed: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(event.stage_id(), None);
    }
}
