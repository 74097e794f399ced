//! Vote validity rules and fallback resolution.
//!
//! A raw ballot is honoured only when its number lies in `[1, N]`, differs
//! from the voter's own id, and names a live candidate. Anything else is
//! resolved by the configured [`VoteFallback`].

use serde::{Deserialize, Serialize};

use super::tiebreak::TieBreaker;
use crate::agent::{AgentId, Ballot};

/// Policy for votes that cannot be honoured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteFallback {
    /// Record an abstention that counts for no candidate.
    #[default]
    Abstain,
    /// Substitute a uniform choice among live candidates other than the voter.
    Random,
}

impl std::fmt::Display for VoteFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abstain => write!(f, "abstain"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Why a raw ballot was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidVote {
    /// No integer in the reply
    Unparsable,
    /// Integer outside `[1, N]`
    OutOfRange,
    /// Voter named itself
    SelfVote,
    /// Candidate already eliminated
    Eliminated,
    /// Call timed out or was cancelled
    TimedOut,
}

impl std::fmt::Display for InvalidVote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparsable => write!(f, "unparsable"),
            Self::OutOfRange => write!(f, "out_of_range"),
            Self::SelfVote => write!(f, "self_vote"),
            Self::Eliminated => write!(f, "eliminated"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// What a resolved vote counts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "agent_id", rename_all = "snake_case")]
pub enum VoteChoice {
    Candidate(AgentId),
    Abstained,
}

/// A ballot after validity checks and fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVote {
    pub voter: AgentId,
    /// Number parsed from the reply, if any
    pub raw: Option<u64>,
    pub choice: VoteChoice,
    /// Set when the raw ballot was not honoured as cast
    pub rejected: Option<InvalidVote>,
}

impl ResolvedVote {
    /// Candidate this vote counts for
    pub fn target(&self) -> Option<AgentId> {
        match self.choice {
            VoteChoice::Candidate(id) => Some(id),
            VoteChoice::Abstained => None,
        }
    }

    pub fn is_abstention(&self) -> bool {
        self.choice == VoteChoice::Abstained
    }

    /// A rejected ballot replaced by a random choice
    pub fn is_fallback(&self) -> bool {
        self.rejected.is_some() && !self.is_abstention()
    }
}

/// Check a raw choice against the rules for `voter`
pub fn validate(
    raw: Option<u64>,
    voter: AgentId,
    team_size: usize,
    live: &[AgentId],
) -> Result<AgentId, InvalidVote> {
    let value = raw.ok_or(InvalidVote::Unparsable)?;
    if value < 1 || value > team_size as u64 {
        return Err(InvalidVote::OutOfRange);
    }
    let id = value as AgentId;
    if id == voter {
        return Err(InvalidVote::SelfVote);
    }
    if !live.contains(&id) {
        return Err(InvalidVote::Eliminated);
    }
    Ok(id)
}

/// Resolve one ballot. `timed_out` marks a call that never returned.
pub fn resolve(
    ballot: &Ballot,
    timed_out: bool,
    team_size: usize,
    live: &[AgentId],
    policy: VoteFallback,
    tie_breaker: &dyn TieBreaker,
) -> ResolvedVote {
    let verdict = if timed_out {
        Err(InvalidVote::TimedOut)
    } else {
        validate(ballot.choice, ballot.voter, team_size, live)
    };

    match verdict {
        Ok(id) => ResolvedVote {
            voter: ballot.voter,
            raw: ballot.choice,
            choice: VoteChoice::Candidate(id),
            rejected: None,
        },
        Err(reason) => {
            let options: Vec<AgentId> = live
                .iter()
                .copied()
                .filter(|id| *id != ballot.voter)
                .collect();
            let choice = match policy {
                VoteFallback::Random if !options.is_empty() => {
                    VoteChoice::Candidate(tie_breaker.pick(&options))
                }
                _ => VoteChoice::Abstained,
            };
            ResolvedVote {
                voter: ballot.voter,
                raw: ballot.choice,
                choice,
                rejected: Some(reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tiebreak::{MockTieBreaker, RngTieBreaker};

    fn ballot(voter: AgentId, choice: Option<u64>) -> Ballot {
        Ballot {
            voter,
            choice,
            reply: String::new(),
        }
    }

    #[test]
    fn test_validate_rules() {
        let live = [1, 2, 4];
        assert_eq!(validate(Some(2), 1, 6, &live), Ok(2));
        assert_eq!(validate(None, 1, 6, &live), Err(InvalidVote::Unparsable));
        assert_eq!(validate(Some(0), 1, 6, &live), Err(InvalidVote::OutOfRange));
        assert_eq!(validate(Some(7), 1, 6, &live), Err(InvalidVote::OutOfRange));
        assert_eq!(validate(Some(1), 1, 6, &live), Err(InvalidVote::SelfVote));
        assert_eq!(validate(Some(3), 1, 6, &live), Err(InvalidVote::Eliminated));
    }

    #[test]
    fn test_valid_vote_kept() {
        let tb = MockTieBreaker::new();
        let vote = resolve(
            &ballot(3, Some(1)),
            false,
            3,
            &[1, 2, 3],
            VoteFallback::Random,
            &tb,
        );
        assert_eq!(vote.choice, VoteChoice::Candidate(1));
        assert_eq!(vote.rejected, None);
        assert!(!vote.is_fallback());
    }

    #[test]
    fn test_abstain_policy() {
        let tb = MockTieBreaker::new();
        let vote = resolve(
            &ballot(2, Some(2)),
            false,
            3,
            &[1, 2, 3],
            VoteFallback::Abstain,
            &tb,
        );
        assert!(vote.is_abstention());
        assert_eq!(vote.rejected, Some(InvalidVote::SelfVote));
        assert_eq!(vote.raw, Some(2));
    }

    #[test]
    fn test_random_policy_excludes_voter() {
        let mut tb = MockTieBreaker::new();
        tb.expect_pick()
            .withf(|options| options.to_vec() == vec![1, 3])
            .times(1)
            .returning(|options| options[1]);

        let vote = resolve(
            &ballot(2, None),
            false,
            3,
            &[1, 2, 3],
            VoteFallback::Random,
            &tb,
        );
        assert_eq!(vote.choice, VoteChoice::Candidate(3));
        assert_eq!(vote.rejected, Some(InvalidVote::Unparsable));
        assert!(vote.is_fallback());
    }

    #[test]
    fn test_random_fallback_never_self() {
        let tb = RngTieBreaker::seeded(5);
        for voter in 1..=6 {
            for _ in 0..50 {
                let vote = resolve(
                    &ballot(voter, Some(voter as u64)),
                    false,
                    6,
                    &[1, 2, 3, 4, 5, 6],
                    VoteFallback::Random,
                    &tb,
                );
                assert_ne!(vote.target(), Some(voter));
                assert!(vote.target().is_some());
            }
        }
    }

    #[test]
    fn test_eliminated_voter_may_pick_any_live() {
        let mut tb = MockTieBreaker::new();
        tb.expect_pick()
            .withf(|options| options.to_vec() == vec![2, 4])
            .returning(|options| options[0]);

        let vote = resolve(
            &ballot(5, Some(5)),
            false,
            6,
            &[2, 4],
            VoteFallback::Random,
            &tb,
        );
        assert_eq!(vote.rejected, Some(InvalidVote::SelfVote));
        assert_eq!(vote.target(), Some(2));
    }

    #[test]
    fn test_timeout_overrides_parsed_choice() {
        let tb = MockTieBreaker::new();
        let vote = resolve(
            &ballot(1, Some(2)),
            true,
            3,
            &[1, 2, 3],
            VoteFallback::Abstain,
            &tb,
        );
        assert_eq!(vote.rejected, Some(InvalidVote::TimedOut));
        assert!(vote.is_abstention());
    }

    #[test]
    fn test_fallback_serde() {
        let json = serde_json::to_string(&VoteFallback::Random).unwrap();
        assert_eq!(json, "\"random\"");
        assert_eq!(VoteFallback::default(), VoteFallback::Abstain);
    }
}
