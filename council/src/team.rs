//! Teams: a fixed-size ordered set of agents assigned to one stage.

use std::sync::Arc;

use crate::agent::{Agent, AgentId};
use crate::backend::Backend;

/// Error type for team construction
#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    #[error("Team needs at least one agent")]
    Empty,

    #[error("No backends available for team '{0}'")]
    NoBackends(String),
}

/// Agents assigned to one stage
#[derive(Debug, Clone)]
pub struct Team {
    stage_id: u32,
    role: String,
    agents: Vec<Agent>,
}

impl Team {
    /// Build `size` agents with ids `1..=size`, assigning backends round-robin.
    pub fn new(
        stage_id: u32,
        role: impl Into<String>,
        backends: &[Arc<dyn Backend>],
        size: usize,
    ) -> Result<Self, TeamError> {
        let role = role.into();
        if size == 0 {
            return Err(TeamError::Empty);
        }
        if backends.is_empty() {
            return Err(TeamError::NoBackends(role));
        }

        let agents = (0..size)
            .map(|i| {
                Agent::new(
                    i as AgentId + 1,
                    role.clone(),
                    Arc::clone(&backends[i % backends.len()]),
                )
            })
            .collect();

        Ok(Self {
            stage_id,
            role,
            agents,
        })
    }

    pub fn stage_id(&self) -> u32 {
        self.stage_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn size(&self) -> usize {
        self.agents.len()
    }

    /// Backend names in agent order
    pub fn backend_names(&self) -> Vec<String> {
        self.agents
            .iter()
            .map(|a| a.backend_name().to_string())
            .collect()
    }
}
