// SPDX-License-Identifier: MIT
use quorum_model::ToolSchema;

use crate::errors::AgentProtocolError;

/// The two tools exposed to coordinating agents, as a closed sum type.
///
/// The original system discovers tool calls by string-name lookup against an
/// open registry; here the dispatch is exhaustive at compile time, so a new
/// tool can't silently fail to be validated.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTool {
    NewAnswer { content: String },
    Vote { agent_id: String, reason: String },
}

pub const NEW_ANSWER: &str = "new_answer";
pub const VOTE: &str = "vote";

/// Build the `new_answer` tool schema (§4.2).
pub fn new_answer_schema() -> ToolSchema {
    ToolSchema {
        name: NEW_ANSWER.into(),
        description: "Provide an improved answer to the original task".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Your improved answer." }
            },
            "required": ["content"]
        }),
    }
}

/// Build the `vote` tool schema, constraining `agent_id` to the current
/// anonymous-ID enum (§4.2, §4.3).
pub fn vote_schema(valid_anonymous_ids: &[String]) -> ToolSchema {
    ToolSchema {
        name: VOTE.into(),
        description: "Vote for the best agent to present the final answer".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "agent_id": {
                    "type": "string",
                    "description": "Anonymous agent ID to vote for (e.g. 'agent1', 'agent2')",
                    "enum": valid_anonymous_ids,
                },
                "reason": { "type": "string", "description": "Brief reason why this agent has the best answer" }
            },
            "required": ["agent_id", "reason"]
        }),
    }
}

pub fn standard_tools(valid_anonymous_ids: &[String]) -> Vec<ToolSchema> {
    vec![new_answer_schema(), vote_schema(valid_anonymous_ids)]
}

/// Parse a single raw tool call (name + JSON argument string) into the
/// closed sum type. Unknown tool names and malformed JSON are rejected here;
/// semantic validation (duplicate answers, invalid vote targets, …) happens
/// in the caller, which has access to coordination state this module
/// doesn't.
pub fn parse_tool_call(name: &str, arguments_json: &str) -> Result<AgentTool, AgentProtocolError> {
    let value: serde_json::Value = serde_json::from_str(arguments_json)
        .map_err(|e| AgentProtocolError::MalformedArguments(e.to_string()))?;

    match name {
        NEW_ANSWER => {
            let content = value
                .get("content")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AgentProtocolError::MalformedArguments("missing content".into()))?
                .to_string();
            if content.is_empty() {
                return Err(AgentProtocolError::EmptyAnswer);
            }
            Ok(AgentTool::NewAnswer { content })
        }
        VOTE => {
            let agent_id = value
                .get("agent_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AgentProtocolError::MalformedArguments("missing agent_id".into()))?
                .to_string();
            let reason = value.get("reason").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(AgentTool::Vote { agent_id, reason })
        }
        other => Err(AgentProtocolError::UnknownTool(other.to_string())),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
