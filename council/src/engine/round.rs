//! Candidates, tallies and the elimination decision for one round.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ballot::ResolvedVote;
use super::tiebreak::TieBreaker;
use crate::agent::AgentId;

/// One agent's response with its vote count for the current round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub agent_id: AgentId,
    pub response: String,
    pub votes: u32,
}

impl Candidate {
    pub fn new(agent_id: AgentId, response: impl Into<String>) -> Self {
        Self {
            agent_id,
            response: response.into(),
            votes: 0,
        }
    }
}

/// Everything decided in one elimination round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub round: u32,
    /// Live candidate ids at the start of the round
    pub live: Vec<AgentId>,
    /// One resolved vote per agent, in agent order
    pub votes: Vec<ResolvedVote>,
    /// Votes per live candidate, in candidate order
    pub tally: Vec<(AgentId, u32)>,
    /// Candidates sharing the minimum tally
    pub tie_set: Vec<AgentId>,
    /// Whether every live candidate shared the minimum
    pub total_tie: bool,
    pub eliminated: AgentId,
}

impl RoundRecord {
    pub fn abstentions(&self) -> u32 {
        self.votes.iter().filter(|v| v.is_abstention()).count() as u32
    }

    pub fn fallbacks(&self) -> u32 {
        self.votes.iter().filter(|v| v.is_fallback()).count() as u32
    }

    /// Sum of the tally
    pub fn tallied_votes(&self) -> u32 {
        self.tally.iter().map(|(_, n)| n).sum()
    }
}

/// Zero every candidate's vote counter
pub fn reset_votes(candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        candidate.votes = 0;
    }
}

/// Credit each vote to its live candidate. Abstentions count for nobody.
pub fn tally(candidates: &mut [Candidate], votes: &[ResolvedVote]) {
    for target in votes.iter().filter_map(ResolvedVote::target) {
        if let Some(candidate) = candidates.iter_mut().find(|c| c.agent_id == target) {
            candidate.votes += 1;
        }
    }
}

/// Candidates at the minimum tally, and whether that is the whole field
pub fn tie_set(candidates: &[Candidate]) -> (Vec<AgentId>, bool) {
    let Some(min) = candidates.iter().map(|c| c.votes).min() else {
        return (Vec::new(), false);
    };
    let tied: Vec<AgentId> = candidates
        .iter()
        .filter(|c| c.votes == min)
        .map(|c| c.agent_id)
        .collect();
    let total = tied.len() == candidates.len();
    (tied, total)
}

/// Choose exactly one candidate to eliminate.
///
/// A total tie draws from the whole live field; a partial tie draws from
/// the tie set; a unique minimum is taken as is.
pub fn choose_eliminated(
    candidates: &[Candidate],
    tie_breaker: &dyn TieBreaker,
) -> (AgentId, Vec<AgentId>, bool) {
    let (tied, total_tie) = tie_set(candidates);
    let eliminated = if total_tie {
        let live: Vec<AgentId> = candidates.iter().map(|c| c.agent_id).collect();
        checked_pick(tie_breaker, &live)
    } else if tied.len() > 1 {
        checked_pick(tie_breaker, &tied)
    } else {
        tied[0]
    };
    (eliminated, tied, total_tie)
}

/// A pick outside `options` falls back to the first option so every round
/// still removes a live candidate.
fn checked_pick(tie_breaker: &dyn TieBreaker, options: &[AgentId]) -> AgentId {
    let picked = tie_breaker.pick(options);
    if options.contains(&picked) {
        picked
    } else {
        warn!(picked, ?options, "Tie-breaker picked outside the tie set; using first option");
        options[0]
    }
}
