// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{agent::ResponseStream, Agent, Message, ResponseEvent, ToolSchema};

/// Deterministic test double that echoes the last user message back as an
/// assistant text reply. Never emits a tool call; useful for exercising the
/// enforcement-retry path.
pub struct EchoAgent {
    id: String,
}

impl EchoAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn stream(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolSchema>,
        _reset: bool,
    ) -> anyhow::Result<ResponseStream> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("ECHO: {reply}"))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted test-double agent. Each call to `stream` pops the next
/// response script from the front of the queue, letting tests drive exact
/// event sequences — including tool calls — deterministically.
pub struct ScriptedAgent {
    id: String,
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    /// The last request this agent was asked to stream, for test assertions.
    pub last_messages: Arc<Mutex<Option<Vec<Message>>>>,
    /// Declared working directory; `None` means no filesystem affinity, so
    /// the Snapshot Bridge skips this agent (§4.8).
    working_dir: Option<PathBuf>,
    /// Reference workspace path last delivered via `set_reference_workspace`,
    /// for test assertions.
    pub last_reference_workspace: Arc<Mutex<Option<PathBuf>>>,
}

impl ScriptedAgent {
    /// Build an agent from a list of response scripts. The outer `Vec` is the
    /// ordered list of calls; the inner `Vec` is the sequence of
    /// [`ResponseEvent`]s emitted for that call.
    pub fn new(id: impl Into<String>, scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            id: id.into(),
            scripts: Arc::new(Mutex::new(scripts)),
            last_messages: Arc::new(Mutex::new(None)),
            working_dir: None,
            last_reference_workspace: Arc::new(Mutex::new(None)),
        }
    }

    /// Declare a working directory, opting this agent into Snapshot Bridge
    /// coverage the way a filesystem-affine backend would.
    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Convenience: agent that always replies with a single text answer.
    pub fn always_text(id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(id, vec![vec![ResponseEvent::TextDelta(reply.into()), ResponseEvent::Done]])
    }

    /// Convenience: agent that calls `new_answer` with the given content.
    pub fn new_answer(id: impl Into<String>, call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let args = serde_json::json!({ "content": content.into() }).to_string();
        Self::new(
            id,
            vec![vec![
                ResponseEvent::ToolCall { id: call_id.into(), name: "new_answer".into(), arguments: args },
                ResponseEvent::Done,
            ]],
        )
    }

    /// Convenience: agent that emits two tool calls in a single response
    /// (violates the binary-decision invariant, §4.2 rule 1).
    pub fn two_tool_calls(id: impl Into<String>) -> Self {
        let new_answer_args = serde_json::json!({ "content": "first" }).to_string();
        let vote_args = serde_json::json!({ "agent_id": "agent1", "reason": "second" }).to_string();
        Self::new(
            id,
            vec![vec![
                ResponseEvent::ToolCall { id: "call-1".into(), name: "new_answer".into(), arguments: new_answer_args },
                ResponseEvent::ToolCall { id: "call-2".into(), name: "vote".into(), arguments: vote_args },
                ResponseEvent::Done,
            ]],
        )
    }

    /// Convenience: agent that calls `vote` for `target` with `reason`.
    pub fn vote(
        id: impl Into<String>,
        call_id: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let args = serde_json::json!({ "agent_id": target.into(), "reason": reason.into() }).to_string();
        Self::new(
            id,
            vec![vec![
                ResponseEvent::ToolCall { id: call_id.into(), name: "vote".into(), arguments: args },
                ResponseEvent::Done,
            ]],
        )
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn stream(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolSchema>,
        _reset: bool,
    ) -> anyhow::Result<ResponseStream> {
        *self.last_messages.lock().unwrap() = Some(messages);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![ResponseEvent::TextDelta("[no more scripts]".into()), ResponseEvent::Done]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    async fn set_reference_workspace(&self, path: &Path) {
        *self.last_reference_workspace.lock().unwrap() = Some(path.to_path_buf());
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
