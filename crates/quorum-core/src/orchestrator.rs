// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use quorum_config::Config;
use quorum_model::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::chunk::Chunk;
use crate::errors::OrchestratorError;
use crate::export::{build_export, status, EventLog, SessionExport, StatusSnapshot};
use crate::multiplexer::run_coordination;
use crate::presenter::present;
use crate::registry::{AgentRegistry, AnonymousIdentity};
use crate::session::{Phase, Session};
use crate::snapshot::SnapshotBridge;
use crate::state::{AgentState, VoteRecord};
use crate::vote_resolver::resolve;

/// Everything a finished (or in-flight) coordination call leaves behind for
/// `status`/`export` to read back. Lives behind a `Mutex` because the actual
/// coordination work runs inside a `'static` background task spawned from
/// `chat`, which cannot hold a `&mut Orchestrator` borrow across its
/// lifetime — see DESIGN.md for the rationale.
struct Inner {
    session: Session,
    states: HashMap<String, AgentState>,
    anon: AnonymousIdentity,
    vote_log: Vec<VoteRecord>,
    events: EventLog,
    selected_agent: Option<String>,
}

/// Top-level orchestrator: wires the registry, session, configuration, and
/// (optional) Snapshot Bridge together behind the single `chat` entry point
/// (§6).
pub struct Orchestrator {
    registry: AgentRegistry,
    config: Config,
    snapshot: Option<Arc<dyn SnapshotBridge>>,
    inner: Arc<Mutex<Inner>>,
}

impl Orchestrator {
    /// Construct a new orchestrator. Validates `config` against the
    /// registered agent ids; a `ConfigError` here is fatal (§7 rule 5) and
    /// is surfaced before any coordination work begins.
    pub fn new(registry: AgentRegistry, config: Config, max_tokens: usize) -> Result<Self, OrchestratorError> {
        let ids: Vec<&str> = registry.ids().iter().map(String::as_str).collect();
        config.validate(&ids)?;

        let states = registry
            .ids()
            .iter()
            .map(|id| {
                let weight = *config.agent_weights.get(id).unwrap_or(&1.0);
                (id.clone(), AgentState::new(weight))
            })
            .collect();

        let max_duration_seconds = config.max_duration_seconds;
        let snapshot = config.snapshot_storage_path.clone().zip(config.agent_temporary_workspace_path.clone()).map(
            |(snap, work)| Arc::new(crate::snapshot::FilesystemSnapshotBridge::new(snap, work)) as Arc<dyn SnapshotBridge>,
        );

        let inner = Inner {
            session: Session::new(String::new(), max_tokens, max_duration_seconds),
            states,
            anon: AnonymousIdentity::build(&[]),
            vote_log: Vec::new(),
            events: EventLog::new(),
            selected_agent: None,
        };

        Ok(Self { registry, config, snapshot, inner: Arc::new(Mutex::new(inner)) })
    }

    /// Caller-facing chat API (§6). Extracts the latest user message as the
    /// task; earlier messages become conversation context. Returns a lazy
    /// chunk stream; coordination runs as a background task feeding it, and
    /// writes its result back through the shared `Inner` once resolved.
    pub fn chat(
        &mut self,
        mut messages: Vec<Message>,
        reset_chat: bool,
        clear_history: bool,
    ) -> Result<BoxStream<'static, Chunk>, OrchestratorError> {
        let task = messages
            .pop()
            .and_then(|m| m.as_text().map(str::to_string))
            .unwrap_or_default();
        let history: Option<String> = if messages.is_empty() {
            None
        } else {
            Some(messages.iter().filter_map(|m| m.as_text()).collect::<Vec<_>>().join("\n"))
        };

        {
            let mut inner = self.inner.lock().unwrap();
            if clear_history {
                inner.session.messages.clear();
            }
            if reset_chat {
                inner.vote_log.clear();
                inner.events = EventLog::new();
                inner.selected_agent = None;
            }
            inner.session.reset(task.clone());
            inner.session.phase = Phase::Coordinating;
        }

        let registry = self.registry.clone_handles();
        let config = self.config.clone();
        let snapshot = self.snapshot.clone();
        let inner = self.inner.clone();
        let (out_tx, out_rx) = mpsc::channel::<Chunk>(256);

        tokio::spawn(async move {
            let (cc_tx, mut cc_rx) = mpsc::channel::<Chunk>(256);
            let forward_task = tokio::spawn({
                let out_tx = out_tx.clone();
                async move {
                    while let Some(c) = cc_rx.recv().await {
                        if out_tx.send(c).await.is_err() {
                            break;
                        }
                    }
                }
            });

            let result = run_coordination(&registry, &config, &task, history.as_deref(), None, snapshot.clone(), cc_tx).await;
            let _ = forward_task.await;

            if result.timed_out {
                let _ = out_tx.send(Chunk::agent_status("orchestrator", "coordination timed out")).await;
            }

            let resolution = resolve(&registry, &result.states, &result.anon, &config);
            let selected = resolution.as_ref().map(|r| r.winner.clone());

            {
                let mut guard = inner.lock().unwrap();
                guard.states = result.states.clone();
                guard.anon = result.anon.clone();
                guard.vote_log = result.vote_log.clone();
                guard.events = result.events.clone();
                guard.selected_agent = selected.clone();
                guard.session.phase = if result.timed_out { Phase::Timeout } else { Phase::Presenting };
            }
            if let Some(id) = &selected {
                inner.lock().unwrap().events.agent_selected(id.clone());
                info!(agent_id = %id, "agent selected to present the final answer");
            }

            match resolution {
                Some(res) => {
                    let (present_tx, mut present_rx) = mpsc::channel::<Chunk>(256);
                    let snapshot_ref = snapshot.clone();
                    let task_for_present = task.clone();
                    let registry_for_present = registry.clone_handles();
                    let states = result.states.clone();
                    let anon = result.anon.clone();
                    let present_task = tokio::spawn(async move {
                        let bridge_ref: Option<&dyn SnapshotBridge> = snapshot_ref.as_deref();
                        let _ = present(&registry_for_present, &states, &anon, &res, &task_for_present, bridge_ref, present_tx).await;
                    });
                    while let Some(c) = present_rx.recv().await {
                        if out_tx.send(c).await.is_err() {
                            break;
                        }
                    }
                    let _ = present_task.await;
                }
                None => {
                    let _ = out_tx.send(Chunk::error("orchestrator", "no agent produced an answer")).await;
                }
            }

            inner.lock().unwrap().session.phase = Phase::Completed;
        });

        Ok(Box::pin(ReceiverStream::new(out_rx)))
    }

    /// Cheap, non-streaming progress read (§11.3).
    pub fn status(&self) -> StatusSnapshot {
        let inner = self.inner.lock().unwrap();
        status(&inner.session, &self.registry, &inner.states)
    }

    /// Full session export document (§11.1).
    pub fn export(&self) -> SessionExport {
        let inner = self.inner.lock().unwrap();
        let distribution: HashMap<String, f64> = inner
            .states
            .values()
            .filter_map(|s| s.vote.as_ref())
            .fold(HashMap::new(), |mut acc, vote| {
                *acc.entry(vote.target_anonymous_id.clone()).or_insert(0.0) += 1.0;
                acc
            });
        build_export(
            &inner.session,
            &self.registry,
            &inner.states,
            &inner.vote_log,
            &inner.events,
            inner.selected_agent.as_deref(),
            distribution,
        )
    }

    /// Clear conversation-scoped state for a fresh coordination call,
    /// preserving each agent's `voting_weight` (§3 "Lifecycles", §11.4).
    pub fn reset(&mut self, task: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.session.reset(task);
        for state in inner.states.values_mut() {
            let weight = state.voting_weight;
            *state = AgentState::new(weight);
        }
        inner.anon = AnonymousIdentity::build(&[]);
        inner.vote_log.clear();
        inner.events = EventLog::new();
        inner.selected_agent = None;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
