// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use quorum_model::Message;
use serde::Serialize;
use uuid::Uuid;

/// Workflow phase of a coordination session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Coordinating,
    Presenting,
    Completed,
    Timeout,
}

/// Owns the identity and budget of a single coordination call.
///
/// Exclusively owned by one coordination call at a time; never shared
/// across concurrent callers (see the Non-goals around partial-order
/// streaming to multiple concurrent callers).
#[derive(Debug)]
pub struct Session {
    pub id: String,
    /// The current user task under coordination.
    pub task: String,
    /// Conversation context preceding the task (ordered, role-tagged).
    pub messages: Vec<Message>,
    pub token_count: usize,
    pub max_tokens: usize,
    pub started_at: DateTime<Utc>,
    pub max_duration_seconds: u64,
    pub phase: Phase,
}

impl Session {
    pub fn new(task: impl Into<String>, max_tokens: usize, max_duration_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            started_at: Utc::now(),
            max_duration_seconds,
            phase: Phase::Idle,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Fraction of context window consumed (0.0-1.0).
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    /// Seconds elapsed since coordination started.
    pub fn elapsed_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    pub fn is_timed_out(&self) -> bool {
        self.elapsed_seconds() as u64 >= self.max_duration_seconds
    }

    /// Clear conversation-scoped state for a fresh coordination call on the
    /// same session identity. `voting_weight` on `AgentState` lives outside
    /// the session and is preserved by the caller (the registry is not
    /// touched here).
    pub fn reset(&mut self, task: impl Into<String>) {
        self.task = task.into();
        self.messages.clear();
        self.token_count = 0;
        self.started_at = Utc::now();
        self.phase = Phase::Idle;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_unique_id() {
        let a = Session::new("task", 1000, 600);
        let b = Session::new("task", 1000, 600);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn new_session_starts_idle_and_empty() {
        let s = Session::new("task", 1000, 600);
        assert!(s.messages.is_empty());
        assert_eq!(s.token_count, 0);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn push_increments_token_count() {
        let mut s = Session::new("task", 1000, 600);
        s.push(Message::user("12345678"));
        assert_eq!(s.token_count, 2);
    }

    #[test]
    fn context_fraction_zero_when_max_tokens_zero() {
        let s = Session::new("task", 0, 600);
        assert_eq!(s.context_fraction(), 0.0);
    }

    #[test]
    fn not_timed_out_immediately_after_creation() {
        let s = Session::new("task", 1000, 600);
        assert!(!s.is_timed_out());
    }

    #[test]
    fn timed_out_when_duration_is_zero() {
        let s = Session::new("task", 1000, 0);
        assert!(s.is_timed_out());
    }

    #[test]
    fn reset_clears_messages_and_resets_phase() {
        let mut s = Session::new("first task", 1000, 600);
        s.push(Message::user("hi"));
        s.phase = Phase::Completed;
        s.reset("second task");
        assert_eq!(s.task, "second task");
        assert!(s.messages.is_empty());
        assert_eq!(s.token_count, 0);
        assert_eq!(s.phase, Phase::Idle);
    }
}
