// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

use crate::{Message, ResponseEvent, ToolSchema};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The capability the orchestrator consumes from a coordination participant.
///
/// Implementations wrap a concrete backend (an LLM API, a scripted test
/// double, …) behind a uniform streaming interface so the orchestrator core
/// never needs to know which backend is behind a given agent id.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier for this agent within its registry.
    fn id(&self) -> &str;

    /// Send `messages` and return a lazy, finite, non-restartable stream of
    /// response events.
    ///
    /// `reset = true` replaces the agent's conversational context with
    /// exactly `messages`, discarding anything prior. `reset = false`
    /// appends `messages` to the agent's existing context (used for
    /// enforcement retries within one round).
    async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        reset: bool,
    ) -> anyhow::Result<ResponseStream>;

    /// Request that any in-flight stream for this agent stop promptly.
    ///
    /// The default implementation is a no-op: dropping the returned
    /// `ResponseStream` is sufficient cancellation for backends with no
    /// external in-flight request to abort. Backends that hold a live
    /// network request should override this to cancel it explicitly.
    async fn cancel(&self) {}

    /// This agent's working directory, if its backend has filesystem
    /// affinity. `None` (the default) means the Snapshot Bridge skips this
    /// agent entirely for both `save_snapshot` and `materialize_reference`
    /// (§4.8).
    fn working_dir(&self) -> Option<&Path> {
        None
    }

    /// Deliver the absolute path of a materialized reference workspace
    /// through a backend-specific side channel, never inside the message
    /// payload (§4.7 step 3). Default no-op for backends with no filesystem
    /// affinity.
    async fn set_reference_workspace(&self, _path: &Path) {}
}
