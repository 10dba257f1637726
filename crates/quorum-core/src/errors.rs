// SPDX-License-Identifier: MIT
use thiserror::Error;

pub use quorum_config::ConfigError;

/// The orchestrator's error taxonomy (see propagation policy in DESIGN.md).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// An agent violated the tool protocol. Recovered locally via
    /// enforcement + retry up to `max_attempts_per_round`; never propagated
    /// past the Agent Runner that produced it.
    #[error("agent protocol violation: {0}")]
    AgentProtocol(#[from] AgentProtocolError),

    /// A backend failed mid-stream. Forwarded as an `error` chunk tagged
    /// with the source; terminates only that agent's Runner.
    #[error("agent transport error from {source}: {message}")]
    AgentTransport { source: String, message: String },

    /// The global wall-clock deadline fired.
    #[error("coordination timed out after {elapsed_seconds}s")]
    TimeoutReached { elapsed_seconds: i64 },

    /// Timeout (or natural completion) with zero answers ever produced.
    #[error("no agent produced an answer")]
    NoAnswersAvailable,

    /// Invalid configuration, raised only during orchestrator construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Reasons an agent's tool call is rejected during validation (§4.2).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentProtocolError {
    #[error("more than one tool call effect in a single response")]
    MultipleToolCalls,
    #[error("vote requires at least one existing answer")]
    VoteWithNoAnswers,
    #[error("vote target {0:?} is not a valid anonymous id")]
    InvalidVoteTarget(String),
    #[error("new_answer content duplicates an existing answer")]
    DuplicateAnswer,
    #[error("new_answer content must be non-empty")]
    EmptyAnswer,
    #[error("no tool call was made")]
    NoToolCall,
    #[error("malformed tool call arguments: {0}")]
    MalformedArguments(String),
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
}
