// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};

/// An agent's cast vote, recorded against its live `AgentState`.
#[derive(Debug, Clone)]
pub struct Vote {
    pub target_anonymous_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-agent coordination state. One instance per registered agent, created
/// at registry-build time and reused across restart waves within a session.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub answer: Option<String>,
    pub vote: Option<Vote>,
    pub has_voted: bool,
    pub restart_pending: bool,
    pub killed: bool,
    pub voting_weight: f64,
    pub update_count: u64,
    pub answer_history: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(voting_weight: f64) -> Self {
        Self {
            answer: None,
            vote: None,
            has_voted: false,
            restart_pending: true,
            killed: false,
            voting_weight,
            update_count: 0,
            answer_history: Vec::new(),
            started_at: None,
        }
    }

    /// Apply an accepted `new_answer`. Invariant 5 (no duplicate answers) is
    /// enforced by the caller before this is invoked.
    pub fn accept_answer(&mut self, content: String) {
        if let Some(prev) = self.answer.take() {
            self.answer_history.push(prev);
        }
        self.answer = Some(content);
        self.update_count += 1;
    }

    /// Apply an accepted vote. Invariant 1 (`has_voted => vote.is_some()`)
    /// holds by construction.
    pub fn accept_vote(&mut self, target_anonymous_id: String, reason: String) {
        self.has_voted = true;
        self.vote = Some(Vote { target_anonymous_id, reason, timestamp: Utc::now() });
    }

    /// Apply the reset half of a delta-apply wave (invariant 2): every
    /// agent's vote is wiped and it is flagged to restart.
    pub fn apply_wave_reset(&mut self) {
        self.has_voted = false;
        self.vote = None;
        self.restart_pending = true;
    }

    /// Clear `restart_pending` at the start of this agent's next attempt.
    pub fn begin_attempt(&mut self) {
        self.restart_pending = false;
        self.started_at.get_or_insert_with(Utc::now);
    }

    pub fn is_done(&self) -> bool {
        self.has_voted || self.killed
    }
}

/// Append-only vote log entry, used for session export. Not consulted by the
/// resolver, which reads live `AgentState.vote` fields.
#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub voter_id: String,
    pub target_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
