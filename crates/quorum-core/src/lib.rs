// SPDX-License-Identifier: MIT
mod chunk;
mod errors;
mod export;
mod multiplexer;
mod orchestrator;
mod presenter;
mod registry;
mod runner;
mod session;
mod snapshot;
mod state;
mod templater;
mod tool_protocol;
mod vote_resolver;

pub use chunk::{Chunk, ChunkKind};
pub use errors::{AgentProtocolError, OrchestratorError};
pub use export::{AgentStatus, AgentSummary, Event, EventLog, SessionExport, StatusSnapshot, VoteRecordExport};
pub use orchestrator::Orchestrator;
pub use registry::{AgentRegistry, AnonymousIdentity};
pub use session::{Phase, Session};
pub use snapshot::{FilesystemSnapshotBridge, SnapshotBridge};
pub use state::{AgentState, Vote, VoteRecord};
pub use templater::MessageTemplater;
pub use tool_protocol::{new_answer_schema, standard_tools, vote_schema, AgentTool};
pub use vote_resolver::Resolution;

pub use quorum_config::Config;
pub use quorum_model::{Agent, Message, ResponseEvent, ResponseStream, ToolSchema};
