// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use quorum_model::{Agent, Message, ResponseEvent};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::chunk::ChunkKind;
use crate::errors::AgentProtocolError;
use crate::templater::MessageTemplater;
use crate::tool_protocol::{self, standard_tools, AgentTool};

/// What an Agent Runner reports back to the Stream Multiplexer when its
/// attempt cycle terminates (§4.4 `emit_result` / `emit_error`).
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Answer(String),
    Vote { agent_id: String, reason: String },
    /// Retries exhausted without a valid tool call; the agent is killed for
    /// this round.
    Killed,
    /// The runner observed `restart_pending` and is yielding gracefully;
    /// the multiplexer will start a fresh Runner for this agent.
    Restarted,
    /// The backend stream itself failed (AgentTransportError).
    TransportError(String),
}

/// A single message forwarded from a Runner to the multiplexer: either a
/// chunk to relay to the caller, or the attempt's terminal outcome.
pub enum RunnerMessage {
    Chunk { agent_id: String, kind: ChunkKind },
    Done { agent_id: String, outcome: RunnerOutcome },
}

/// Per-attempt input: everything the Runner needs to build its first
/// message and validate tool calls, without reaching back into shared
/// coordination state (§9 "no cyclic references").
pub struct AttemptContext {
    pub agent_id: String,
    pub task: String,
    pub history: Option<String>,
    pub original_system_message: Option<String>,
    /// (anonymous_id, answer_summary) pairs in anonymous-ID order.
    pub current_answers: Vec<(String, String)>,
    pub valid_anonymous_ids: Vec<String>,
    pub existing_answers: Vec<String>,
    pub max_attempts: u32,
    /// Absolute path to this agent's materialized reference workspace, if
    /// the Snapshot Bridge produced one for this attempt (§4.8). Delivered
    /// through `Agent::set_reference_workspace`, never inline in a message.
    pub reference_workspace: Option<PathBuf>,
}

/// Run one full attempt cycle for `agent`: build the initial message,
/// stream, validate, enforce-and-retry up to `ctx.max_attempts`, and report
/// exactly one [`RunnerOutcome`] (§4.4 state machine table).
///
/// `restart_pending` is polled between every suspension point; when it
/// flips to `true` the Runner calls `agent.cancel()` and reports
/// `Restarted` promptly.
pub async fn run_attempt(
    agent: Arc<dyn Agent>,
    ctx: AttemptContext,
    tx: mpsc::Sender<RunnerMessage>,
    mut restart_pending: watch::Receiver<bool>,
) {
    let agent_id = ctx.agent_id.clone();
    let tools = standard_tools(&ctx.valid_anonymous_ids);

    if let Some(path) = &ctx.reference_workspace {
        agent.set_reference_workspace(path).await;
    }

    let system = MessageTemplater::evaluation_system_message(ctx.original_system_message.as_deref());
    let user = MessageTemplater::build_user_message(&ctx.task, ctx.history.as_deref(), &ctx.current_answers);
    let mut messages = vec![Message::system(system), Message::user(user)];
    let mut reset = true;
    let mut attempts_left = ctx.max_attempts;

    async fn restart_gracefully(agent: &Arc<dyn Agent>, agent_id: String, tx: &mpsc::Sender<RunnerMessage>) {
        debug!(agent_id = %agent_id, "restart_pending observed, cancelling attempt");
        agent.cancel().await;
        let _ = tx
            .send(RunnerMessage::Chunk { agent_id: agent_id.clone(), kind: ChunkKind::AgentStatus("gracefully restarting".into()) })
            .await;
        let _ = tx.send(RunnerMessage::Done { agent_id, outcome: RunnerOutcome::Restarted }).await;
    }

    loop {
        if *restart_pending.borrow() {
            restart_gracefully(&agent, agent_id, &tx).await;
            return;
        }

        let stream_result = agent.stream(messages.clone(), tools.clone(), reset).await;
        let mut stream = match stream_result {
            Ok(s) => s,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "agent transport failed to open stream");
                let _ = tx
                    .send(RunnerMessage::Done {
                        agent_id: agent_id.clone(),
                        outcome: RunnerOutcome::TransportError(e.to_string()),
                    })
                    .await;
                return;
            }
        };

        let mut text_buf = String::new();
        let mut tool_calls: Vec<(String, String, String)> = Vec::new(); // (id, name, arguments)
        let mut transport_error: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = restart_pending.changed() => {
                    if *restart_pending.borrow() {
                        restart_gracefully(&agent, agent_id.clone(), &tx).await;
                        return;
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(ResponseEvent::TextDelta(t))) => {
                            text_buf.push_str(&t);
                            let _ = tx.send(RunnerMessage::Chunk { agent_id: agent_id.clone(), kind: ChunkKind::Content(t) }).await;
                        }
                        Some(Ok(ResponseEvent::ThinkingDelta(t))) => {
                            let _ = tx.send(RunnerMessage::Chunk { agent_id: agent_id.clone(), kind: ChunkKind::Reasoning(t) }).await;
                        }
                        Some(Ok(ResponseEvent::ToolCall { id, name, arguments })) => {
                            let _ = tx.send(RunnerMessage::Chunk {
                                agent_id: agent_id.clone(),
                                kind: ChunkKind::ToolCall(format!("using {name}")),
                            }).await;
                            tool_calls.push((id, name, arguments));
                        }
                        Some(Ok(ResponseEvent::Usage { .. })) => {}
                        Some(Ok(ResponseEvent::Error(msg))) => {
                            let _ = tx.send(RunnerMessage::Chunk { agent_id: agent_id.clone(), kind: ChunkKind::Error(msg) }).await;
                        }
                        Some(Ok(ResponseEvent::Done)) => break,
                        Some(Err(e)) => {
                            transport_error = Some(e.to_string());
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(msg) = transport_error {
            warn!(agent_id = %agent_id, error = %msg, "agent transport failed mid-stream");
            let _ = tx.send(RunnerMessage::Done { agent_id: agent_id.clone(), outcome: RunnerOutcome::TransportError(msg) }).await;
            return;
        }

        if *restart_pending.borrow() {
            restart_gracefully(&agent, agent_id, &tx).await;
            return;
        }

        let outcome_result: Result<AgentTool, AgentProtocolError> = match tool_calls.len() {
            0 => Err(AgentProtocolError::NoToolCall),
            1 => {
                let (_id, name, arguments) = &tool_calls[0];
                validate(name, arguments, &ctx.valid_anonymous_ids, &ctx.existing_answers)
            }
            _ => {
                warn!(agent_id = %agent_id, count = tool_calls.len(), "agent emitted more than one tool call effect");
                Err(AgentProtocolError::MultipleToolCalls)
            }
        };

        match outcome_result {
            Ok(tool) => {
                let outcome = match tool {
                    AgentTool::NewAnswer { content } => RunnerOutcome::Answer(content),
                    AgentTool::Vote { agent_id: target, reason } => RunnerOutcome::Vote { agent_id: target, reason },
                };
                debug!(agent_id = %agent_id, "attempt produced a valid tool call");
                let _ = tx.send(RunnerMessage::Done { agent_id, outcome }).await;
                return;
            }
            Err(protocol_err) => {
                warn!(agent_id = %agent_id, error = %protocol_err, attempts_left, "protocol violation, enforcing and retrying");
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 {
                    let _ = tx.send(RunnerMessage::Done { agent_id, outcome: RunnerOutcome::Killed }).await;
                    return;
                }
                messages = if tool_calls.is_empty() {
                    vec![Message::user(MessageTemplater::enforcement_message())]
                } else {
                    tool_calls
                        .iter()
                        .map(|(id, ..)| Message::tool_result(id.clone(), format!("error: {protocol_err}")))
                        .collect()
                };
                reset = false;
                continue;
            }
        }
    }
}

/// Apply the §4.2 validation rules to a single parsed tool call.
fn validate(
    name: &str,
    arguments: &str,
    valid_anonymous_ids: &[String],
    existing_answers: &[String],
) -> Result<AgentTool, AgentProtocolError> {
    let tool = tool_protocol::parse_tool_call(name, arguments)?;
    match &tool {
        AgentTool::NewAnswer { content } => {
            if existing_answers.iter().any(|a| a == content) {
                return Err(AgentProtocolError::DuplicateAnswer);
            }
        }
        AgentTool::Vote { agent_id, .. } => {
            if valid_anonymous_ids.is_empty() {
                return Err(AgentProtocolError::VoteWithNoAnswers);
            }
            if !valid_anonymous_ids.iter().any(|v| v == agent_id) {
                return Err(AgentProtocolError::InvalidVoteTarget(agent_id.clone()));
            }
        }
    }
    Ok(tool)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
