// SPDX-License-Identifier: MIT
mod agent;
mod mock;
mod types;

pub use agent::{Agent, ResponseStream};
pub use mock::{EchoAgent, ScriptedAgent};
pub use types::*;
