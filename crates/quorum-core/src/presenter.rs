// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use quorum_model::{Agent, Message, ResponseEvent};
use tokio::sync::mpsc;
use tracing::warn;

use crate::chunk::Chunk;
use crate::registry::{AgentRegistry, AnonymousIdentity};
use crate::snapshot::SnapshotBridge;
use crate::state::AgentState;
use crate::vote_resolver::Resolution;

/// Compose the final-presentation messages and stream the winner's answer
/// as the orchestrator's output (§4.7).
pub async fn present(
    registry: &AgentRegistry,
    states: &HashMap<String, AgentState>,
    anon: &AnonymousIdentity,
    resolution: &Resolution,
    task: &str,
    snapshot: Option<&(dyn SnapshotBridge)>,
    chunk_tx: mpsc::Sender<Chunk>,
) -> anyhow::Result<()> {
    let winner_id = &resolution.winner;
    let Some(agent) = registry.get(winner_id).cloned() else {
        let _ = chunk_tx.send(Chunk::error("orchestrator", format!("winner {winner_id:?} not registered"))).await;
        return Ok(());
    };

    let reference_path = if let (Some(bridge), Some(_)) = (snapshot, agent.working_dir()) {
        let pairs: Vec<(String, String)> = anon
            .ordered_anon_ids()
            .iter()
            .map(|aid| (aid.clone(), anon.real_of(aid).unwrap_or_default().to_string()))
            .collect();
        bridge.materialize_reference(winner_id, &pairs).await.ok()
    } else {
        None
    };
    if let Some(path) = &reference_path {
        agent.set_reference_workspace(path).await;
    }

    let user_message = compose_user_message(task, states, anon, resolution);
    let system_message = compose_system_message(reference_path.as_deref());

    let messages = vec![Message::system(system_message), Message::user(user_message)];
    stream_final_answer(agent, messages, states.get(winner_id), winner_id, chunk_tx).await
}

fn compose_user_message(
    task: &str,
    states: &HashMap<String, AgentState>,
    anon: &AnonymousIdentity,
    resolution: &Resolution,
) -> String {
    let mut lines = vec![format!("<ORIGINAL MESSAGE> {task} <END OF ORIGINAL MESSAGE>"), String::new(), "<VOTING SUMMARY>".to_string()];
    for anon_id in anon.ordered_anon_ids() {
        let real = anon.real_of(anon_id).unwrap_or_default();
        let votes = resolution.tally.get(real).copied().unwrap_or(0.0);
        lines.push(format!("{anon_id}: {votes} vote(s)"));
    }
    if let Some(broken_by) = &resolution.tie_broken_by {
        lines.push(format!("Tie broken by: {broken_by:?}"));
    }
    lines.push("<END OF VOTING SUMMARY>".to_string());
    lines.push(String::new());
    lines.push("<AGENT ANSWERS>".to_string());
    for anon_id in anon.ordered_anon_ids() {
        let real = anon.real_of(anon_id).unwrap_or_default();
        let answer = states.get(real).and_then(|s| s.answer.clone()).unwrap_or_default();
        let marker = if real == resolution.winner { " (SELECTED)" } else { "" };
        lines.push(format!("<{anon_id}{marker}> {answer} <end of {anon_id}>"));
    }
    lines.push("<END OF AGENT ANSWERS>".to_string());
    lines.join("\n")
}

fn compose_system_message(reference_path: Option<&std::path::Path>) -> String {
    let mut msg = "You were selected by the group's vote. Present the best possible final answer, \
        drawing on the combined work of all agents as needed."
        .to_string();
    if let Some(path) = reference_path {
        msg.push_str(&format!(
            "\n\nA read-only reference workspace containing every agent's last snapshot is available at {}. \
            Treat its contents as reference material only; do not modify it.",
            path.display()
        ));
    }
    msg
}

async fn stream_final_answer(
    agent: Arc<dyn Agent>,
    messages: Vec<Message>,
    fallback_state: Option<&AgentState>,
    winner_id: &str,
    chunk_tx: mpsc::Sender<Chunk>,
) -> anyhow::Result<()> {
    let mut stream = match agent.stream(messages, vec![], true).await {
        Ok(s) => s,
        Err(e) => {
            warn!(agent_id = %winner_id, error = %e, "winner failed to stream final answer, falling back to stored answer");
            let _ = chunk_tx.send(Chunk::error(winner_id, e.to_string())).await;
            return emit_fallback(fallback_state, winner_id, &chunk_tx).await;
        }
    };

    let mut produced_any = false;
    while let Some(event) = stream.next().await {
        match event {
            Ok(ResponseEvent::TextDelta(t)) => {
                produced_any = true;
                let _ = chunk_tx.send(Chunk::content(winner_id, t)).await;
            }
            Ok(ResponseEvent::ThinkingDelta(t)) => {
                let _ = chunk_tx.send(Chunk::reasoning(winner_id, t)).await;
            }
            Ok(ResponseEvent::Done) => break,
            Ok(ResponseEvent::Error(msg)) => {
                let _ = chunk_tx.send(Chunk::error(winner_id, msg)).await;
            }
            Ok(ResponseEvent::ToolCall { .. }) | Ok(ResponseEvent::Usage { .. }) => {}
            Err(e) => {
                let _ = chunk_tx.send(Chunk::error(winner_id, e.to_string())).await;
                break;
            }
        }
    }

    if !produced_any {
        emit_fallback(fallback_state, winner_id, &chunk_tx).await?;
    } else {
        let _ = chunk_tx.send(Chunk::done(winner_id)).await;
    }
    Ok(())
}

async fn emit_fallback(state: Option<&AgentState>, winner_id: &str, chunk_tx: &mpsc::Sender<Chunk>) -> anyhow::Result<()> {
    if let Some(answer) = state.and_then(|s| s.answer.clone()) {
        let _ = chunk_tx.send(Chunk::content(winner_id, answer)).await;
    }
    let _ = chunk_tx.send(Chunk::done(winner_id)).await;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quorum_model::ScriptedAgent;

    use super::*;

    fn registry_with(id: &str, agent: Arc<dyn Agent>) -> AgentRegistry {
        let mut r = AgentRegistry::new();
        r.register(id, agent);
        r
    }

    #[tokio::test]
    async fn presents_winners_streamed_answer() {
        let agent: Arc<dyn Agent> = Arc::new(ScriptedAgent::always_text("a", "final combined answer"));
        let registry = registry_with("a", agent);
        let anon = AnonymousIdentity::build(&["a".to_string()]);
        let mut states = HashMap::new();
        let mut s = AgentState::new(1.0);
        s.accept_answer("draft".into());
        states.insert("a".to_string(), s);
        let resolution = Resolution { winner: "a".to_string(), tally: HashMap::from([("a".to_string(), 1.0)]), tie_broken_by: None };

        let (tx, mut rx) = mpsc::channel(32);
        present(&registry, &states, &anon, &resolution, "task", None, tx).await.unwrap();

        let mut contents = Vec::new();
        while let Ok(c) = rx.try_recv() {
            if let crate::chunk::ChunkKind::Content(t) = c.kind {
                contents.push(t);
            }
        }
        assert!(contents.iter().any(|c| c.contains("final combined answer")));
    }

    #[tokio::test]
    async fn falls_back_to_stored_answer_on_empty_response() {
        let anon = AnonymousIdentity::build(&["a".to_string()]);
        let mut states = HashMap::new();
        let mut s = AgentState::new(1.0);
        s.accept_answer("the stored answer".into());
        states.insert("a".to_string(), s);
        let resolution = Resolution { winner: "a".to_string(), tally: HashMap::new(), tie_broken_by: None };

        let mut registry_empty = AgentRegistry::new();
        registry_empty.register("a", Arc::new(EmptyAgent) as Arc<dyn Agent>);
        let (tx, mut rx) = mpsc::channel(32);
        present(&registry_empty, &states, &anon, &resolution, "task", None, tx).await.unwrap();

        let mut contents = Vec::new();
        while let Ok(c) = rx.try_recv() {
            if let crate::chunk::ChunkKind::Content(t) = c.kind {
                contents.push(t);
            }
        }
        assert!(contents.iter().any(|c| c.contains("the stored answer")));
    }

    struct EmptyAgent;
    #[async_trait::async_trait]
    impl Agent for EmptyAgent {
        fn id(&self) -> &str {
            "a"
        }
        async fn stream(&self, _messages: Vec<Message>, _tools: Vec<quorum_model::ToolSchema>, _reset: bool) -> anyhow::Result<quorum_model::ResponseStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(ResponseEvent::Done)])))
        }
    }
}
