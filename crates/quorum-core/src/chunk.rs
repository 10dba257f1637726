// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};

/// The unit of the merged output stream the orchestrator emits to its caller.
///
/// Chunks are immutable once emitted; each carries the agent identifier (or
/// `"orchestrator"`) that produced it so callers can attribute content.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Chunk {
    pub fn new(kind: ChunkKind, source: impl Into<String>) -> Self {
        Self { kind, source: source.into(), timestamp: Utc::now() }
    }

    pub fn content(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Content(text.into()), source)
    }

    pub fn reasoning(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Reasoning(text.into()), source)
    }

    pub fn agent_status(source: impl Into<String>, status: impl Into<String>) -> Self {
        Self::new(ChunkKind::AgentStatus(status.into()), source)
    }

    pub fn tool_call(source: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ChunkKind::ToolCall(description.into()), source)
    }

    pub fn debug(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Debug(text.into()), source)
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ChunkKind::Error(message.into()), source)
    }

    pub fn done(source: impl Into<String>) -> Self {
        Self::new(ChunkKind::Done, source)
    }
}

/// The payload of a [`Chunk`].
#[derive(Debug, Clone)]
pub enum ChunkKind {
    Content(String),
    Reasoning(String),
    /// Human-readable "using X" indicator synthesized for a tool call; tool
    /// calls are never forwarded as content (§4.4).
    ToolCall(String),
    /// A status update about coordination progress (e.g. "answer provided").
    AgentStatus(String),
    Debug(String),
    Error(String),
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
