//! Scripted backend that replays canned replies.
//!
//! Useful for dry runs and deterministic tests: each call pops the next
//! reply from the queue, an exhausted queue yields the empty string.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{compose_prompt, Backend};

pub struct ScriptedBackend {
    name: String,
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(name: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Append a reply to the end of the queue
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply.into());
    }

    /// Every full prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, context: &str) -> String {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(compose_prompt(prompt, context));
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .map(|r| r.trim().to_string())
            .unwrap_or_default()
    }
}
