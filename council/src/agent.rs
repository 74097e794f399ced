//! Agents: a backend bound to a role and a stable numeric identity.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use crate::backend::Backend;
use crate::engine::Candidate;

/// Agent identity within a team, 1-based
pub type AgentId = u32;

/// A raw vote as produced by the backend, before validity checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    /// Who voted
    pub voter: AgentId,
    /// First integer found in the reply, if any
    pub choice: Option<u64>,
    /// The reply text the choice was parsed from
    pub reply: String,
}

impl Ballot {
    pub fn from_reply(voter: AgentId, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            voter,
            choice: parse_vote(&reply),
            reply,
        }
    }

    /// Ballot for a call that never returned
    pub fn empty(voter: AgentId) -> Self {
        Self {
            voter,
            choice: None,
            reply: String::new(),
        }
    }
}

/// One team member
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    role: String,
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Agent {
    pub fn new(id: AgentId, role: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            id,
            role: role.into(),
            backend,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Fixed preamble identifying this agent to its backend
    pub fn role_announcement(&self) -> String {
        format!(
            "You are member #{} of the security analysis team; your specialty is [{}].\n\n",
            self.id, self.role
        )
    }

    /// Answer `task`; an empty string means the backend contributed nothing.
    pub async fn produce(&self, task: &str, context: &str) -> String {
        let prompt = format!("{}{}", self.role_announcement(), task);
        self.backend.generate(&prompt, context).await
    }

    /// Build the ballot prompt listing every candidate except our own
    pub fn vote_prompt(
        &self,
        candidates: &[Candidate],
        task: &str,
        team_size: usize,
        preview_chars: usize,
    ) -> String {
        let mut prompt = format!(
            "Task under analysis: {}\n\nBelow are the analyses from the other team members:\n",
            task
        );

        for candidate in candidates.iter().filter(|c| c.agent_id != self.id) {
            prompt.push_str(&format!(
                "\nAnalysis #{} (from expert #{}):\n{}\n",
                candidate.agent_id,
                candidate.agent_id,
                preview(&candidate.response, preview_chars)
            ));
        }

        prompt.push_str(&format!(
            "\nYou are expert #{id}. Vote for the analysis you consider the most professional and thorough.\n\
             You may not vote for yourself (analysis #{id}).\n\n\
             Reply with a single number between 1 and {n}: the analysis you choose.\n\
             Your vote:",
            id = self.id,
            n = team_size
        ));
        prompt
    }

    /// Ask the backend for a vote. Validity is judged by the engine.
    pub async fn vote(
        &self,
        candidates: &[Candidate],
        task: &str,
        team_size: usize,
        preview_chars: usize,
    ) -> Ballot {
        let prompt = self.vote_prompt(candidates, task, team_size, preview_chars);
        let reply = self.backend.generate(&prompt, "").await;
        Ballot::from_reply(self.id, reply)
    }
}

/// First `max_chars` characters of `text`, marked when cut short
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// First code point of each decimal digit block accepted in votes:
/// ASCII, Arabic-Indic, extended Arabic-Indic, Devanagari, Bengali, fullwidth.
const DIGIT_ZEROS: [u32; 6] = [0x30, 0x660, 0x6F0, 0x966, 0x9E6, 0xFF10];

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let class: String = DIGIT_ZEROS
            .iter()
            .map(|zero| format!("\\x{{{:X}}}-\\x{{{:X}}}", zero, zero + 9))
            .collect();
        Regex::new(&format!("[{}]+", class)).expect("static pattern")
    })
}

fn digit_value(c: char) -> Option<u64> {
    let code = c as u32;
    DIGIT_ZEROS
        .iter()
        .find(|zero| (**zero..=**zero + 9).contains(&code))
        .map(|zero| u64::from(code - zero))
}

/// Extract the first integer literal anywhere in `reply`.
///
/// Fullwidth and other common decimal digits read as their values.
/// Literals too large for `u64` saturate so they still read as out of range.
pub fn parse_vote(reply: &str) -> Option<u64> {
    let literal = integer_pattern().find(reply)?;
    let value = literal.as_str().chars().try_fold(0u64, |acc, c| {
        let digit = digit_value(c)?;
        acc.checked_mul(10)?.checked_add(digit)
    });
    Some(value.unwrap_or(u64::MAX))
}
