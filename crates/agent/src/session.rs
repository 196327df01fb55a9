//! A user's conversation with the runtime.
//!
//! The session owns the history and remembers which persona answers user
//! input. It is what the CLI drives: free text → [`Session::process`],
//! `reset` → [`Session::reset`], `/persona <id>` → [`Session::switch_persona`].

use std::sync::Arc;

use handoff_core::error::TurnError;
use handoff_core::message::ConversationHistory;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::loop_runner::{AgentLoop, TurnContext};

/// Point-in-time summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub user_id: String,
    pub active_persona: String,
    pub messages: usize,
    pub turns: u64,
    pub estimated_tokens: usize,
}

pub struct Session {
    id: String,
    user_id: String,
    active_persona: String,
    history: ConversationHistory,
    agent: Arc<AgentLoop>,
    turns: u64,
}

impl Session {
    /// Start a session on the runtime's default persona.
    pub fn new(agent: Arc<AgentLoop>, user_id: impl Into<String>) -> Self {
        let active_persona = agent.personas().default_id().to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            active_persona,
            history: ConversationHistory::new(),
            agent,
            turns: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_persona(&self) -> &str {
        &self.active_persona
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run one user turn under the active persona.
    pub async fn process(&mut self, user_input: &str) -> Result<String, TurnError> {
        self.process_with_cancel(user_input, CancellationToken::new())
            .await
    }

    /// Like [`Session::process`], abandoning the turn at the next suspension
    /// point once `cancel` fires.
    pub async fn process_with_cancel(
        &mut self,
        user_input: &str,
        cancel: CancellationToken,
    ) -> Result<String, TurnError> {
        let ctx = TurnContext::new(&self.id, &self.user_id).with_cancel(cancel);
        self.turns += 1;
        self.agent
            .process_turn(&mut self.history, user_input, &self.active_persona, &ctx)
            .await
    }

    /// Forget the conversation. Sequence indices keep counting up.
    pub fn reset(&mut self) {
        info!(session_id = %self.id, messages = self.history.len(), "Resetting conversation");
        self.history.reset();
    }

    /// Make `persona_id` answer subsequent user input. History is kept.
    pub fn switch_persona(&mut self, persona_id: &str) -> Result<(), TurnError> {
        let persona = self.agent.personas().get(persona_id)?;
        info!(
            session_id = %self.id,
            from = %self.active_persona,
            to = %persona.id,
            "Switching persona"
        );
        self.active_persona = persona.id.clone();
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            active_persona: self.active_persona.clone(),
            messages: self.history.len(),
            turns: self.turns,
            estimated_tokens: self.history.estimated_tokens(),
        }
    }
}
