//! End-to-end coordination scenarios driven entirely through `Orchestrator`:
//! consensus with a silent second agent, duplicate answers, invalid vote
//! targets corrected on retry, and timeout with partial state. Each scenario
//! is built to be free of cross-agent scheduling races: at most one agent
//! ever casts a vote, and its own prior answer (not another agent's) is what
//! makes that vote valid, so the result does not depend on tokio's task
//! interleaving order.

use std::sync::Arc;

use futures::Stream;
use quorum_config::Config;
use quorum_core::{Agent, AgentRegistry, Chunk, ChunkKind, Orchestrator, ResponseEvent, ResponseStream};
use quorum_model::{Message, ScriptedAgent};
use tokio_stream::StreamExt as _;

fn tool_call(id: &str, name: &str, arguments: &str) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::ToolCall { id: id.into(), name: name.into(), arguments: arguments.into() },
        ResponseEvent::Done,
    ]
}

async fn collect_content(mut stream: std::pin::Pin<Box<dyn Stream<Item = Chunk> + Send>>) -> String {
    let mut out = String::new();
    while let Some(c) = stream.next().await {
        if let ChunkKind::Content(t) = c.kind {
            out.push_str(&t);
        }
    }
    out
}

#[tokio::test]
async fn two_agents_one_vote_reaches_consensus() {
    let mut registry = AgentRegistry::new();
    registry.register(
        "alice",
        Arc::new(ScriptedAgent::new(
            "alice",
            vec![
                tool_call("1", "new_answer", r#"{"content":"42"}"#),
                tool_call("2", "vote", r#"{"agent_id":"agent1","reason":"mine is right"}"#),
            ],
        )),
    );
    // bob never answers or votes; he is killed for silence, leaving alice's
    // self-vote as the only one ever cast.
    registry.register("bob", Arc::new(ScriptedAgent::new("bob", vec![])));

    let mut config = Config::default();
    config.max_duration_seconds = 5;
    config.max_attempts_per_round = 2;
    let mut orchestrator = Orchestrator::new(registry, config, 10_000).unwrap();

    let stream = orchestrator.chat(vec![Message::user("what is 6*7?")], false, false).unwrap();
    let content = collect_content(stream).await;
    assert!(content.contains("42"));

    let export = orchestrator.export();
    assert_eq!(export.selected_agent.as_deref(), Some("alice"));
    assert_eq!(export.votes.len(), 1);
    assert_eq!(export.votes[0].voter_id, "alice");

    let status = orchestrator.status();
    let bob = status.agents.iter().find(|a| a.agent_id == "bob").unwrap();
    assert!(bob.killed);
}

#[tokio::test]
async fn duplicate_answer_does_not_corrupt_state_and_agent_is_eventually_killed() {
    let mut registry = AgentRegistry::new();
    registry.register("solo", Arc::new(ScriptedAgent::new_answer("solo", "1", "first answer")));

    let mut config = Config::default();
    config.max_duration_seconds = 5;
    config.max_attempts_per_round = 2;
    let mut orchestrator = Orchestrator::new(registry, config, 10_000).unwrap();

    let stream = orchestrator.chat(vec![Message::user("task")], false, false).unwrap();
    let _ = collect_content(stream).await;

    // The agent's only answer was accepted once; it has no second script
    // entry so every later attempt finds no tool call and it is eventually
    // killed, but its original answer must still stand (never overwritten
    // by a duplicate or cleared on kill).
    let status = orchestrator.status();
    let solo = &status.agents[0];
    assert!(solo.has_answer);
    assert!(solo.killed);

    let export = orchestrator.export();
    assert_eq!(export.agent_summaries[0].answer_length, "first answer".chars().count());
}

#[tokio::test]
async fn invalid_vote_target_is_rejected_then_corrected_on_retry() {
    let mut registry = AgentRegistry::new();
    registry.register(
        "alice",
        Arc::new(ScriptedAgent::new(
            "alice",
            vec![
                tool_call("1", "new_answer", r#"{"content":"draft"}"#),
                tool_call("2", "vote", r#"{"agent_id":"agent9","reason":"typo'd target"}"#),
                tool_call("3", "vote", r#"{"agent_id":"agent1","reason":"corrected"}"#),
            ],
        )),
    );

    let mut config = Config::default();
    config.max_duration_seconds = 5;
    config.max_attempts_per_round = 3;
    let mut orchestrator = Orchestrator::new(registry, config, 10_000).unwrap();

    let stream = orchestrator.chat(vec![Message::user("task")], false, false).unwrap();
    let _ = collect_content(stream).await;

    let export = orchestrator.export();
    assert_eq!(export.selected_agent.as_deref(), Some("alice"));
    assert_eq!(export.votes.len(), 1);
    assert_eq!(export.votes[0].reason, "corrected");
}

/// An agent whose stream never resolves, used to force the global deadline
/// rather than natural completion to end coordination.
struct HangingAgent;

#[async_trait::async_trait]
impl Agent for HangingAgent {
    fn id(&self) -> &str {
        "stuck"
    }

    async fn stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<quorum_core::ToolSchema>,
        _reset: bool,
    ) -> anyhow::Result<ResponseStream> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

#[tokio::test]
async fn timeout_still_resolves_from_partial_state() {
    let mut registry = AgentRegistry::new();
    registry.register("quick", Arc::new(ScriptedAgent::new_answer("quick", "1", "partial answer")));
    registry.register("stuck", Arc::new(HangingAgent));

    let mut config = Config::default();
    config.max_duration_seconds = 1;
    let mut orchestrator = Orchestrator::new(registry, config, 10_000).unwrap();

    let stream = orchestrator.chat(vec![Message::user("task")], false, false).unwrap();
    let _ = collect_content(stream).await;

    let export = orchestrator.export();
    assert_eq!(export.selected_agent.as_deref(), Some("quick"));
    assert!(export.votes.is_empty());
}
