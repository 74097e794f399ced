//! Consensus engine: parallel generation followed by an elimination
//! voting tournament.
//!
//! # Protocol
//!
//! ```text
//! produce × N (concurrent) ──barrier──▶ N candidates
//!        │
//!        ▼
//! while live > 1:
//!     reset votes
//!     vote × N (concurrent, every agent) ──barrier──▶ resolve ballots
//!     tally ─▶ minimum ─▶ tie set ─▶ eliminate exactly one
//!        │
//!        ▼
//! survivor's response = consensus
//! ```
//!
//! Agents are never removed; an agent whose candidate is gone keeps voting.
//! A team of N finishes in exactly N-1 rounds.

pub mod ballot;
pub mod round;
pub mod tiebreak;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentId, Ballot};
use crate::config::EngineConfig;
use crate::events::{CouncilEvent, SharedEventBus};
use crate::team::Team;

pub use ballot::{resolve, validate, InvalidVote, ResolvedVote, VoteChoice, VoteFallback};
pub use round::{Candidate, RoundRecord};
pub use tiebreak::{RngTieBreaker, TieBreaker};

/// Error type for consensus runs
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Team for stage {0} has no agents")]
    EmptyTeam(u32),
}

/// Result type for consensus runs
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Full account of one consensus run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub stage_id: u32,
    /// Initial responses in agent-id order, including eliminated ones
    pub responses: Vec<String>,
    pub winner: AgentId,
    /// The winner's response
    pub consensus: String,
    pub rounds: Vec<RoundRecord>,
}

impl ConsensusOutcome {
    /// Agent ids in the order their candidates were eliminated
    pub fn elimination_order(&self) -> Vec<AgentId> {
        self.rounds.iter().map(|r| r.eliminated).collect()
    }

    pub fn total_abstentions(&self) -> u32 {
        self.rounds.iter().map(RoundRecord::abstentions).sum()
    }

    pub fn total_fallbacks(&self) -> u32 {
        self.rounds.iter().map(RoundRecord::fallbacks).sum()
    }
}

/// Runs the generation + elimination protocol for one team
#[derive(Clone)]
pub struct ConsensusEngine {
    settings: EngineConfig,
    tie_breaker: Arc<dyn TieBreaker>,
    event_bus: Option<SharedEventBus>,
    cancel: CancellationToken,
}

impl ConsensusEngine {
    /// Create an engine whose randomness follows `settings.seed`
    pub fn new(settings: EngineConfig) -> Self {
        let tie_breaker = Arc::new(RngTieBreaker::from_seed(settings.seed));
        Self {
            settings,
            tie_breaker,
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tie_breaker(mut self, tie_breaker: Arc<dyn TieBreaker>) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Share a cancellation token; once cancelled, pending calls resolve empty.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn publish(&self, event: CouncilEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Bound one agent call by the call timeout and the cancellation token.
    /// `None` means the call did not complete.
    async fn guarded<F>(&self, call: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.settings.call_timeout(), call) => result.ok(),
        }
    }

    /// Run the full protocol for `team` on `task`.
    pub async fn run(
        &self,
        team: &Team,
        task: &str,
        context: &str,
    ) -> ConsensusResult<ConsensusOutcome> {
        let stage_id = team.stage_id();
        let team_size = team.size();
        if team_size == 0 {
            return Err(ConsensusError::EmptyTeam(stage_id));
        }

        let responses = self.generate(team, task, context).await;

        let mut candidates: Vec<Candidate> = team
            .agents()
            .iter()
            .zip(responses.iter())
            .map(|(agent, response)| Candidate::new(agent.id(), response.clone()))
            .collect();

        let mut rounds = Vec::with_capacity(team_size.saturating_sub(1));
        while candidates.len() > 1 {
            let record = self
                .play_round(team, task, &mut candidates, rounds.len() as u32 + 1)
                .await;
            candidates.retain(|c| c.agent_id != record.eliminated);
            rounds.push(record);
        }

        let winner = candidates.remove(0);
        info!(
            stage_id,
            winner = winner.agent_id,
            rounds = rounds.len(),
            "Consensus reached"
        );
        self.publish(CouncilEvent::ConsensusReached {
            stage_id,
            winner: winner.agent_id,
            rounds: rounds.len() as u32,
            timestamp: Utc::now(),
        });

        Ok(ConsensusOutcome {
            stage_id,
            responses,
            winner: winner.agent_id,
            consensus: winner.response,
            rounds,
        })
    }

    /// Generation barrier: every agent answers before anything else happens.
    async fn generate(&self, team: &Team, task: &str, context: &str) -> Vec<String> {
        let start = Instant::now();
        let calls = team.agents().iter().map(|agent| async move {
            match self.guarded(agent.produce(task, context)).await {
                Some(response) => response,
                None => {
                    warn!(
                        stage_id = team.stage_id(),
                        agent_id = agent.id(),
                        "Generation did not complete; treating as empty"
                    );
                    String::new()
                }
            }
        });
        let responses: Vec<String> = join_all(calls).await;

        let empty = responses.iter().filter(|r| r.is_empty()).count();
        let latency_ms = start.elapsed().as_millis() as u64;
        if empty > 0 {
            warn!(
                stage_id = team.stage_id(),
                empty,
                total = responses.len(),
                "Some agents contributed no response"
            );
        }
        debug!(stage_id = team.stage_id(), latency_ms, "Responses collected");
        self.publish(CouncilEvent::ResponsesCollected {
            stage_id: team.stage_id(),
            responses: responses.len(),
            empty_responses: empty,
            latency_ms,
            timestamp: Utc::now(),
        });

        responses
    }

    /// One reset–vote–tally–eliminate cycle. Does not remove the loser.
    async fn play_round(
        &self,
        team: &Team,
        task: &str,
        candidates: &mut [Candidate],
        round: u32,
    ) -> RoundRecord {
        let stage_id = team.stage_id();
        let team_size = team.size();
        round::reset_votes(candidates);

        let live: Vec<AgentId> = candidates.iter().map(|c| c.agent_id).collect();
        let field: &[Candidate] = candidates;
        let preview_chars = self.settings.preview_chars;

        let calls = team.agents().iter().map(|agent| async move {
            match self
                .guarded(agent.vote(field, task, team_size, preview_chars))
                .await
            {
                Some(ballot) => (ballot, false),
                None => (Ballot::empty(agent.id()), true),
            }
        });
        let ballots: Vec<(Ballot, bool)> = join_all(calls).await;

        let votes: Vec<ResolvedVote> = ballots
            .iter()
            .map(|(ballot, timed_out)| {
                let vote = resolve(
                    ballot,
                    *timed_out,
                    team_size,
                    &live,
                    self.settings.vote_fallback,
                    self.tie_breaker.as_ref(),
                );
                if let Some(reason) = vote.rejected {
                    debug!(
                        stage_id,
                        round,
                        voter = vote.voter,
                        raw = ?vote.raw,
                        %reason,
                        resolved = ?vote.target(),
                        "Ballot not honoured as cast"
                    );
                }
                vote
            })
            .collect();

        round::tally(candidates, &votes);
        let (eliminated, tie_set, total_tie) =
            round::choose_eliminated(candidates, self.tie_breaker.as_ref());

        let record = RoundRecord {
            round,
            live,
            votes,
            tally: candidates.iter().map(|c| (c.agent_id, c.votes)).collect(),
            tie_set,
            total_tie,
            eliminated,
        };

        info!(
            stage_id,
            round,
            eliminated,
            remaining = candidates.len() - 1,
            total_tie,
            abstentions = record.abstentions(),
            "Elimination round complete"
        );
        self.publish(CouncilEvent::RoundCompleted {
            stage_id,
            round,
            tally: record.tally.clone(),
            abstentions: record.abstentions(),
            fallbacks: record.fallbacks(),
            total_tie,
            eliminated,
            timestamp: Utc::now(),
        });

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, ScriptedBackend};
    use crate::events::{drain, EventBus};
    use tiebreak::MockTieBreaker;

    fn settings(fallback: VoteFallback) -> EngineConfig {
        EngineConfig {
            vote_fallback: fallback,
            seed: Some(1),
            ..EngineConfig::default()
        }
    }

    /// One scripted backend per agent: a response, then one vote per round.
    fn scripted_team(scripts: Vec<Vec<&str>>) -> (Team, Vec<Arc<ScriptedBackend>>) {
        let scripted: Vec<Arc<ScriptedBackend>> = scripts
            .into_iter()
            .enumerate()
            .map(|(i, replies)| Arc::new(ScriptedBackend::new(format!("m{}", i + 1), replies)))
            .collect();
        let backends: Vec<Arc<dyn Backend>> = scripted
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn Backend>)
            .collect();
        let size = backends.len();
        (Team::new(1, "tester", &backends, size).unwrap(), scripted)
    }

    #[tokio::test]
    async fn test_single_agent_needs_no_rounds() {
        let (team, _) = scripted_team(vec![vec!["only answer"]]);
        let engine = ConsensusEngine::new(settings(VoteFallback::Abstain));

        let outcome = engine.run(&team, "task", "").await.unwrap();
        assert_eq!(outcome.winner, 1);
        assert_eq!(outcome.consensus, "only answer");
        assert!(outcome.rounds.is_empty());
    }

    #[tokio::test]
    async fn test_two_agents_unique_loser() {
        // Agent 1 votes 2, agent 2 votes 2 (self: rejected, abstains)
        let (team, _) = scripted_team(vec![vec!["A", "2"], vec!["B", "2"]]);
        let engine = ConsensusEngine::new(settings(VoteFallback::Abstain))
            .with_tie_breaker(Arc::new(MockTieBreaker::new()));

        let outcome = engine.run(&team, "task", "").await.unwrap();

        assert_eq!(outcome.rounds.len(), 1);
        let round = &outcome.rounds[0];
        assert_eq!(round.tally, vec![(1, 0), (2, 1)]);
        assert_eq!(round.abstentions(), 1);
        assert_eq!(round.votes[1].rejected, Some(InvalidVote::SelfVote));
        assert_eq!(outcome.winner, 2);
        assert_eq!(outcome.consensus, "B");
    }

    #[tokio::test]
    async fn test_scenario_round_one_partial_tie() {
        // Round 1 ballots [2,1,1,2,4,1], all valid: tallies 1->3, 2->2, 4->1.
        // Later rounds are left unparsable.
        let (team, _) = scripted_team(vec![
            vec!["r1", "2"],
            vec!["r2", "1"],
            vec!["r3", "1"],
            vec!["r4", "2"],
            vec!["r5", "4"],
            vec!["r6", "1"],
        ]);
        let mut tb = MockTieBreaker::new();
        tb.expect_pick().returning(|options| options[0]);
        let engine =
            ConsensusEngine::new(settings(VoteFallback::Abstain)).with_tie_breaker(Arc::new(tb));

        let outcome = engine.run(&team, "task", "").await.unwrap();
        let first = &outcome.rounds[0];

        assert!(first.votes.iter().all(|v| v.rejected.is_none()));
        assert_eq!(
            first.tally,
            vec![(1, 3), (2, 2), (3, 0), (4, 1), (5, 0), (6, 0)]
        );
        assert_eq!(first.tie_set, vec![3, 5, 6]);
        assert!(!first.total_tie);
        assert!([3, 5, 6].contains(&first.eliminated));
        assert_eq!(outcome.rounds[1].live.len(), 5);
        for survivor in [1, 2, 4] {
            assert!(outcome.rounds[1].live.contains(&survivor));
        }
        assert_eq!(outcome.rounds.len(), 5);
    }

    #[tokio::test]
    async fn test_self_vote_in_scenario_is_rejected() {
        // Agent 4 naming itself is abstained, so candidate 4 gets nothing
        let (team, _) = scripted_team(vec![
            vec!["r1", "2"],
            vec!["r2", "1"],
            vec!["r3", "1"],
            vec!["r4", "4"],
            vec!["r5", "2"],
            vec!["r6", "1"],
        ]);
        let mut tb = MockTieBreaker::new();
        tb.expect_pick().returning(|options| options[0]);
        let engine =
            ConsensusEngine::new(settings(VoteFallback::Abstain)).with_tie_breaker(Arc::new(tb));

        let outcome = engine.run(&team, "task", "").await.unwrap();
        let first = &outcome.rounds[0];

        assert_eq!(first.votes[3].rejected, Some(InvalidVote::SelfVote));
        assert_eq!(first.abstentions(), 1);
        assert_eq!(
            first.tally,
            vec![(1, 3), (2, 2), (3, 0), (4, 0), (5, 0), (6, 0)]
        );
        assert_eq!(first.tie_set, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_default_fallback_drops_rejected_votes_from_tally() {
        let script = || {
            vec![
                vec!["r1", "2"],
                vec!["r2", "1"],
                vec!["r3", "1"],
                vec!["r4", "4"],
                vec!["r5", "2"],
                vec!["r6", "1"],
            ]
        };
        let counted = |outcome: &ConsensusOutcome| -> u32 {
            outcome.rounds[0].tally.iter().map(|(_, votes)| votes).sum()
        };

        let (team, _) = scripted_team(script());
        let defaults = EngineConfig {
            seed: Some(1),
            ..EngineConfig::default()
        };
        assert_eq!(defaults.vote_fallback, VoteFallback::Abstain);
        let outcome = ConsensusEngine::new(defaults)
            .run(&team, "task", "")
            .await
            .unwrap();
        assert_eq!(counted(&outcome), 5);
        assert_eq!(outcome.rounds[0].abstentions(), 1);

        let (team, _) = scripted_team(script());
        let outcome = ConsensusEngine::new(settings(VoteFallback::Random))
            .run(&team, "task", "")
            .await
            .unwrap();
        assert_eq!(counted(&outcome), 6);
        assert_eq!(outcome.rounds[0].abstentions(), 0);
    }

    #[tokio::test]
    async fn test_out_of_set_tie_breaker_still_terminates() {
        let (team, _) = scripted_team(vec![vec!["a"], vec!["b"], vec!["c"]]);
        let mut tb = MockTieBreaker::new();
        tb.expect_pick().returning(|_| 99);
        let engine =
            ConsensusEngine::new(settings(VoteFallback::Abstain)).with_tie_breaker(Arc::new(tb));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.run(&team, "task", ""),
        )
        .await
        .expect("engine must terminate")
        .unwrap();

        assert_eq!(outcome.rounds.len(), 2);
        // Every round is a total tie, so the first live id goes each time
        assert_eq!(outcome.elimination_order(), vec![1, 2]);
        assert_eq!(outcome.winner, 3);
    }

    #[tokio::test]
    async fn test_publishes_round_events() {
        let (team, _) = scripted_team(vec![vec!["a"], vec!["b"], vec!["c"]]);
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let engine = ConsensusEngine::new(settings(VoteFallback::Random)).with_event_bus(bus);

        engine.run(&team, "task", "").await.unwrap();

        let kinds: Vec<&str> = drain(&mut rx).iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec![
                "responses_collected",
                "round_completed",
                "round_completed",
                "consensus_reached"
            ]
        );
    }

    #[tokio::test]
    async fn test_outcome_reports_totals() {
        let (team, _) = scripted_team(vec![vec!["a", "x"], vec!["b", "y"], vec!["c", "z"]]);
        let engine = ConsensusEngine::new(settings(VoteFallback::Random));

        let outcome = engine.run(&team, "task", "").await.unwrap();
        // Every ballot in every round is unparsable and replaced at random
        assert_eq!(outcome.total_fallbacks(), 6);
        assert_eq!(outcome.total_abstentions(), 0);
        assert_eq!(outcome.elimination_order().len(), 2);
    }
}
