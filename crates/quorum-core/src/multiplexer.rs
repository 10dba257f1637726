// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quorum_config::Config;
use quorum_model::Agent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::export::EventLog;
use crate::registry::{AgentRegistry, AnonymousIdentity};
use crate::runner::{self, AttemptContext, RunnerMessage, RunnerOutcome};
use crate::snapshot::SnapshotBridge;
use crate::state::{AgentState, VoteRecord};

/// Everything the Stream Multiplexer produced by the time coordination
/// stopped, handed to the Vote Resolver / Final Presenter (§4.5, §4.6).
pub struct CoordinationResult {
    pub states: HashMap<String, AgentState>,
    pub anon: AnonymousIdentity,
    pub timed_out: bool,
    pub vote_log: Vec<VoteRecord>,
    pub events: EventLog,
}

/// Drive every registered agent's Runner concurrently, fan their chunks into
/// `chunk_tx`, and apply each attempt's terminal outcome as a single atomic
/// delta before deciding what runs next (§4.5).
///
/// Completion: `all(has_voted || killed) || timed_out`.
#[allow(clippy::too_many_arguments)]
pub async fn run_coordination(
    registry: &AgentRegistry,
    config: &Config,
    task: &str,
    history: Option<&str>,
    original_system_message: Option<&str>,
    snapshot: Option<Arc<dyn SnapshotBridge>>,
    chunk_tx: mpsc::Sender<Chunk>,
) -> CoordinationResult {
    let mut states: HashMap<String, AgentState> = registry
        .ids()
        .iter()
        .map(|id| {
            let weight = *config.agent_weights.get(id).unwrap_or(&1.0);
            (id.clone(), AgentState::new(weight))
        })
        .collect();

    let mut anon = current_anonymous_identity(registry, &states);
    let (msg_tx, mut msg_rx) = mpsc::channel::<RunnerMessage>(256);
    let mut handles: HashMap<String, JoinHandle<()>> = HashMap::new();
    let mut restart_signals: HashMap<String, watch::Sender<bool>> = HashMap::new();
    let mut vote_log: Vec<VoteRecord> = Vec::new();
    let mut events = EventLog::new();

    let deadline = Instant::now() + Duration::from_secs(config.max_duration_seconds);
    let mut timed_out = false;

    loop {
        if registry.is_empty() || states.values().all(|s| s.is_done()) {
            break;
        }

        spawn_pending(
            registry,
            config,
            task,
            history,
            original_system_message,
            &anon,
            &mut states,
            snapshot.as_ref(),
            &msg_tx,
            &mut handles,
            &mut restart_signals,
        )
        .await;

        if handles.is_empty() {
            // Nothing left that can make progress (everyone killed/voted).
            break;
        }

        let first = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                timed_out = true;
                None
            }
            m = msg_rx.recv() => m,
        };

        if timed_out {
            warn!(elapsed = config.max_duration_seconds, "coordination deadline reached");
            for (id, agent) in registry.ids().iter().filter_map(|id| registry.get(id).map(|a| (id.clone(), a))) {
                if handles.contains_key(&id) {
                    agent.cancel().await;
                }
            }
            for (_, h) in handles.drain() {
                h.abort();
            }
            events.coordination_timeout();
            break;
        }

        let Some(first) = first else { break };
        let mut batch = vec![first];
        while let Ok(m) = msg_rx.try_recv() {
            batch.push(m);
        }

        apply_batch(
            batch,
            &mut states,
            &mut handles,
            &restart_signals,
            snapshot.as_ref(),
            registry,
            &mut vote_log,
            &mut events,
            &chunk_tx,
        )
        .await;

        let new_anon = current_anonymous_identity(registry, &states);
        if new_anon != anon {
            anon = new_anon;
        }
    }

    CoordinationResult { states, anon, timed_out, vote_log, events }
}

fn current_anonymous_identity(registry: &AgentRegistry, states: &HashMap<String, AgentState>) -> AnonymousIdentity {
    let holders: Vec<String> = registry
        .ids()
        .iter()
        .filter(|id| states.get(*id).map(|s| s.answer.is_some()).unwrap_or(false))
        .cloned()
        .collect();
    AnonymousIdentity::build(&holders)
}

/// Start a fresh Runner for every agent flagged `restart_pending` and not
/// already running. Clears the flag via `begin_attempt` at the moment the
/// attempt is handed off, and — for filesystem-affine agents — materializes
/// a combined reference view before the Runner's first message goes out
/// (§4.7 step 3, §4.8).
#[allow(clippy::too_many_arguments)]
async fn spawn_pending(
    registry: &AgentRegistry,
    config: &Config,
    task: &str,
    history: Option<&str>,
    original_system_message: Option<&str>,
    anon: &AnonymousIdentity,
    states: &mut HashMap<String, AgentState>,
    snapshot: Option<&Arc<dyn SnapshotBridge>>,
    msg_tx: &mpsc::Sender<RunnerMessage>,
    handles: &mut HashMap<String, JoinHandle<()>>,
    restart_signals: &mut HashMap<String, watch::Sender<bool>>,
) {
    let existing_answers: Vec<String> = states.values().filter_map(|s| s.answer.clone()).collect();
    let current_answers: Vec<(String, String)> = anon
        .ordered_anon_ids()
        .iter()
        .map(|aid| {
            let real = anon.real_of(aid).unwrap_or_default();
            let summary = states.get(real).and_then(|s| s.answer.clone()).unwrap_or_default();
            (aid.to_string(), summary)
        })
        .collect();

    let ids: Vec<String> = registry.ids().to_vec();
    for id in ids {
        let should_spawn = states
            .get(&id)
            .map(|s| !s.is_done() && !handles.contains_key(&id) && s.restart_pending)
            .unwrap_or(false);
        if !should_spawn {
            continue;
        }
        let Some(agent) = registry.get(&id).cloned() else { continue };

        let mut reference_workspace = None;
        if let (Some(bridge), Some(_)) = (snapshot, agent.working_dir()) {
            let pairs: Vec<(String, String)> = anon
                .ordered_anon_ids()
                .iter()
                .map(|aid| (aid.clone(), anon.real_of(aid).unwrap_or_default().to_string()))
                .collect();
            if let Ok(path) = bridge.materialize_reference(&id, &pairs).await {
                agent.set_reference_workspace(&path).await;
                reference_workspace = Some(path);
            }
        }

        if let Some(state) = states.get_mut(&id) {
            state.begin_attempt();
        }
        debug!(agent_id = %id, "starting attempt");

        let (restart_tx, restart_rx) = watch::channel(false);
        restart_signals.insert(id.clone(), restart_tx);

        let ctx = AttemptContext {
            agent_id: id.clone(),
            task: task.to_string(),
            history: history.map(str::to_string),
            original_system_message: original_system_message.map(str::to_string),
            current_answers: current_answers.clone(),
            valid_anonymous_ids: anon.ordered_anon_ids().to_vec(),
            existing_answers: existing_answers.clone(),
            max_attempts: config.max_attempts_per_round,
            reference_workspace,
        };
        let tx = msg_tx.clone();
        let handle = tokio::spawn(runner::run_attempt(agent, ctx, tx, restart_rx));
        handles.insert(id.clone(), handle);
    }
}

#[allow(clippy::too_many_arguments)]
async fn apply_batch(
    batch: Vec<RunnerMessage>,
    states: &mut HashMap<String, AgentState>,
    handles: &mut HashMap<String, JoinHandle<()>>,
    restart_signals: &HashMap<String, watch::Sender<bool>>,
    snapshot: Option<&Arc<dyn SnapshotBridge>>,
    registry: &AgentRegistry,
    vote_log: &mut Vec<VoteRecord>,
    events: &mut EventLog,
    chunk_tx: &mpsc::Sender<Chunk>,
) {
    let mut answered_this_tick: Vec<(String, String)> = Vec::new();
    let mut dones: Vec<(String, RunnerOutcome)> = Vec::new();

    for msg in batch {
        match msg {
            RunnerMessage::Chunk { agent_id, kind } => {
                let _ = chunk_tx.send(Chunk::new(kind, agent_id)).await;
            }
            RunnerMessage::Done { agent_id, outcome } => {
                dones.push((agent_id, outcome));
            }
        }
    }

    // Apply answers first so a same-tick vote from the same agent is
    // superseded (new answer wins over same-tick vote, §4.5). Invariant 5
    // (no two agents hold byte-equal current answers) is enforced here, not
    // just in the Runner's pre-tick validation: two agents can each pass
    // their own stale `existing_answers` snapshot by emitting the same new
    // content in the same tick, so the sync point re-checks against every
    // other agent's current answer plus every answer already accepted this
    // tick, and drops the duplicate instead of applying it.
    for (agent_id, outcome) in &dones {
        if let RunnerOutcome::Answer(content) = outcome {
            let duplicate = states
                .iter()
                .any(|(id, s)| id != agent_id && s.answer.as_deref() == Some(content.as_str()))
                || answered_this_tick
                    .iter()
                    .any(|(id, accepted): &(String, String)| id != agent_id && accepted == content);
            if duplicate {
                debug!(agent_id = %agent_id, "dropping same-tick answer that duplicates another agent's current answer");
                handles.remove(agent_id);
                continue;
            }

            if let Some(state) = states.get_mut(agent_id) {
                state.accept_answer(content.clone());
            }
            answered_this_tick.push((agent_id.clone(), content.clone()));
            events.answer_updated(agent_id.clone());
            handles.remove(agent_id);

            if let (Some(bridge), Some(agent)) = (snapshot, registry.get(agent_id)) {
                if let Some(working_dir) = agent.working_dir().map(|p| p.to_path_buf()) {
                    if let Err(e) = bridge.save_snapshot(agent_id, &working_dir).await {
                        warn!(agent_id = %agent_id, error = %e, "failed to save snapshot");
                    }
                }
            }
        }
    }

    // Invariant 2: a new answer wipes every other agent's vote and flags it
    // to restart. Agents still mid-attempt are signaled live so they stop
    // promptly instead of racing on stale anonymous ids (§4.1 cancellation
    // contract).
    if !answered_this_tick.is_empty() {
        for (id, state) in states.iter_mut() {
            if state.killed {
                continue;
            }
            if answered_this_tick.iter().any(|(answered_id, _)| answered_id == id) {
                state.restart_pending = true;
                continue;
            }
            state.apply_wave_reset();
            if handles.contains_key(id) {
                if let Some(tx) = restart_signals.get(id) {
                    let _ = tx.send(true);
                }
            }
        }
    }

    for (agent_id, outcome) in dones {
        match outcome {
            RunnerOutcome::Answer(_) => {}
            RunnerOutcome::Vote { agent_id: target, reason } => {
                let stale = states.get(&agent_id).map(|s| s.restart_pending).unwrap_or(true);
                if stale {
                    debug!(agent_id = %agent_id, "dropping vote cast under a restart wave");
                } else if let Some(state) = states.get_mut(&agent_id) {
                    state.accept_vote(target.clone(), reason.clone());
                    vote_log.push(VoteRecord {
                        voter_id: agent_id.clone(),
                        target_id: target.clone(),
                        reason,
                        timestamp: chrono::Utc::now(),
                        phase: "coordinating".to_string(),
                    });
                    events.vote_cast(agent_id.clone(), target);
                }
                handles.remove(&agent_id);
            }
            RunnerOutcome::Killed => {
                if let Some(state) = states.get_mut(&agent_id) {
                    state.killed = true;
                }
                let _ = chunk_tx.send(Chunk::agent_status(agent_id.clone(), "killed: retries exhausted")).await;
                handles.remove(&agent_id);
            }
            RunnerOutcome::Restarted => {
                handles.remove(&agent_id);
            }
            RunnerOutcome::TransportError(message) => {
                if let Some(state) = states.get_mut(&agent_id) {
                    state.killed = true;
                }
                let _ = chunk_tx.send(Chunk::error(agent_id.clone(), message)).await;
                handles.remove(&agent_id);
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_model::ScriptedAgent;

    fn test_config() -> Config {
        Config { max_duration_seconds: 5, ..Config::default() }
    }

    #[tokio::test]
    async fn single_agent_answer_then_vote_reaches_consensus() {
        let mut registry = AgentRegistry::new();
        registry.register("a", Arc::new(ScriptedAgent::new("a", vec![
            vec![quorum_model::ResponseEvent::ToolCall { id: "1".into(), name: "new_answer".into(), arguments: r#"{"content":"42"}"#.into() }, quorum_model::ResponseEvent::Done],
            vec![quorum_model::ResponseEvent::ToolCall { id: "2".into(), name: "vote".into(), arguments: r#"{"agent_id":"agent1","reason":"mine"}"#.into() }, quorum_model::ResponseEvent::Done],
        ])));

        let (tx, mut rx) = mpsc::channel(64);
        let result = run_coordination(&registry, &test_config(), "2+2", None, None, None, tx).await;
        drop(result.states.get("a"));
        while rx.try_recv().is_ok() {}

        let state = result.states.get("a").unwrap();
        assert!(state.has_voted);
        assert_eq!(state.answer.as_deref(), Some("42"));
        assert!(!result.timed_out);
        assert_eq!(result.vote_log.len(), 1);
    }

    #[tokio::test]
    async fn agent_with_no_tool_call_ever_is_killed_and_counts_done() {
        let mut registry = AgentRegistry::new();
        registry.register("a", Arc::new(ScriptedAgent::always_text("a", "no tool here")));
        let mut config = test_config();
        config.max_attempts_per_round = 1;

        let (tx, _rx) = mpsc::channel(64);
        let result = run_coordination(&registry, &config, "task", None, None, None, tx).await;
        let state = result.states.get("a").unwrap();
        assert!(state.killed);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn stale_vote_from_a_restart_flagged_agent_is_dropped() {
        // "slow" cast a vote in the same batch that "fast" submitted a brand
        // new answer; the wave-reset branch runs first and flags "slow" to
        // restart, so its vote outcome must be dropped rather than counted.
        let mut registry = AgentRegistry::new();
        registry.register("fast", Arc::new(ScriptedAgent::always_text("fast", "n/a")));
        registry.register("slow", Arc::new(ScriptedAgent::always_text("slow", "n/a")));

        let mut states: HashMap<String, AgentState> =
            [("fast".to_string(), AgentState::new(1.0)), ("slow".to_string(), AgentState::new(1.0))].into();
        for s in states.values_mut() {
            s.begin_attempt();
        }
        let mut handles: HashMap<String, JoinHandle<()>> = HashMap::new();
        let restart_signals: HashMap<String, watch::Sender<bool>> = HashMap::new();
        let mut vote_log = Vec::new();
        let mut events = EventLog::new();
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);

        let batch = vec![
            RunnerMessage::Done { agent_id: "fast".to_string(), outcome: RunnerOutcome::Answer("new take".to_string()) },
            RunnerMessage::Done {
                agent_id: "slow".to_string(),
                outcome: RunnerOutcome::Vote { agent_id: "agent1".to_string(), reason: "stale".to_string() },
            },
        ];

        apply_batch(batch, &mut states, &mut handles, &restart_signals, None, &registry, &mut vote_log, &mut events, &chunk_tx).await;
        while chunk_rx.try_recv().is_ok() {}

        let slow_state = states.get("slow").unwrap();
        assert!(!slow_state.has_voted);
        assert!(slow_state.restart_pending);
        assert!(vote_log.is_empty());

        let fast_state = states.get("fast").unwrap();
        assert_eq!(fast_state.answer.as_deref(), Some("new take"));
    }

    #[tokio::test]
    async fn same_tick_byte_equal_answers_are_deduped_at_the_sync_point() {
        // Neither "Z" is present at spawn, so both agents pass the Runner's
        // stale-snapshot validation; the sync point must still reject one.
        let mut registry = AgentRegistry::new();
        registry.register("a", Arc::new(ScriptedAgent::always_text("a", "n/a")));
        registry.register("b", Arc::new(ScriptedAgent::always_text("b", "n/a")));

        let mut states: HashMap<String, AgentState> =
            [("a".to_string(), AgentState::new(1.0)), ("b".to_string(), AgentState::new(1.0))].into();
        for s in states.values_mut() {
            s.begin_attempt();
        }
        let mut handles: HashMap<String, JoinHandle<()>> = HashMap::new();
        let restart_signals: HashMap<String, watch::Sender<bool>> = HashMap::new();
        let mut vote_log = Vec::new();
        let mut events = EventLog::new();
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);

        let batch = vec![
            RunnerMessage::Done { agent_id: "a".to_string(), outcome: RunnerOutcome::Answer("Z".to_string()) },
            RunnerMessage::Done { agent_id: "b".to_string(), outcome: RunnerOutcome::Answer("Z".to_string()) },
        ];

        apply_batch(batch, &mut states, &mut handles, &restart_signals, None, &registry, &mut vote_log, &mut events, &chunk_tx).await;
        while chunk_rx.try_recv().is_ok() {}

        let with_answer = states.values().filter(|s| s.answer.as_deref() == Some("Z")).count();
        assert_eq!(with_answer, 1, "invariant 5: at most one agent may hold this answer");
    }
}
