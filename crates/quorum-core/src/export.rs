// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::AgentRegistry;
use crate::session::{Phase, Session};
use crate::state::{AgentState, VoteRecord};

/// A structured coordination event, recorded independently of what is
/// streamed to the caller as chunks (§11.2).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    AnswerUpdated { agent_id: String, at: DateTime<Utc> },
    VoteCast { voter_id: String, target_id: String, at: DateTime<Utc> },
    AgentSelected { agent_id: String, at: DateTime<Utc> },
    CoordinationTimeout { at: DateTime<Utc> },
}

/// In-memory ordered event log for one coordination session.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Vec<Event>);

impl EventLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn answer_updated(&mut self, agent_id: impl Into<String>) {
        self.0.push(Event::AnswerUpdated { agent_id: agent_id.into(), at: Utc::now() });
    }

    pub fn vote_cast(&mut self, voter_id: impl Into<String>, target_id: impl Into<String>) {
        self.0.push(Event::VoteCast { voter_id: voter_id.into(), target_id: target_id.into(), at: Utc::now() });
    }

    pub fn agent_selected(&mut self, agent_id: impl Into<String>) {
        self.0.push(Event::AgentSelected { agent_id: agent_id.into(), at: Utc::now() });
    }

    pub fn coordination_timeout(&mut self) {
        self.0.push(Event::CoordinationTimeout { at: Utc::now() });
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub answer_length: usize,
    pub update_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub has_voted: bool,
    pub killed: bool,
}

/// Full session export document (§11.1), matching the original's
/// `export_session_log` shape.
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport {
    pub session_id: String,
    pub task: String,
    pub selected_agent: Option<String>,
    pub agent_summaries: Vec<AgentSummary>,
    pub votes: Vec<VoteRecordExport>,
    pub events: Vec<Event>,
    pub vote_distribution: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteRecordExport {
    pub voter_id: String,
    pub target_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
}

impl From<&VoteRecord> for VoteRecordExport {
    fn from(v: &VoteRecord) -> Self {
        Self { voter_id: v.voter_id.clone(), target_id: v.target_id.clone(), reason: v.reason.clone(), timestamp: v.timestamp, phase: v.phase.clone() }
    }
}

/// Build the full export document for a finished (or in-progress) session.
pub fn build_export(
    session: &Session,
    registry: &AgentRegistry,
    states: &HashMap<String, AgentState>,
    vote_records: &[VoteRecord],
    events: &EventLog,
    selected_agent: Option<&str>,
    vote_distribution: HashMap<String, f64>,
) -> SessionExport {
    let agent_summaries = registry
        .ids()
        .iter()
        .filter_map(|id| states.get(id).map(|s| (id, s)))
        .map(|(id, s)| AgentSummary {
            agent_id: id.clone(),
            answer_length: s.answer.as_ref().map(|a| a.chars().count()).unwrap_or(0),
            update_count: s.update_count,
            started_at: s.started_at,
            has_voted: s.has_voted,
            killed: s.killed,
        })
        .collect();

    SessionExport {
        session_id: session.id.clone(),
        task: session.task.clone(),
        selected_agent: selected_agent.map(str::to_string),
        agent_summaries,
        votes: vote_records.iter().map(VoteRecordExport::from).collect(),
        events: events.events().to_vec(),
        vote_distribution,
    }
}

/// A single agent's status, for polling callers (§11.3).
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub has_voted: bool,
    pub killed: bool,
    pub has_answer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub elapsed_seconds: i64,
    pub agents: Vec<AgentStatus>,
}

/// Cheap, non-streaming read of current coordination progress.
pub fn status(session: &Session, registry: &AgentRegistry, states: &HashMap<String, AgentState>) -> StatusSnapshot {
    let agents = registry
        .ids()
        .iter()
        .filter_map(|id| states.get(id).map(|s| (id, s)))
        .map(|(id, s)| AgentStatus { agent_id: id.clone(), has_voted: s.has_voted, killed: s.killed, has_answer: s.answer.is_some() })
        .collect();

    StatusSnapshot { phase: session.phase, elapsed_seconds: session.elapsed_seconds(), agents }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
