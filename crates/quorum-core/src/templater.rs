// SPDX-License-Identifier: MIT
use chrono::Utc;

/// Builds the system/user messages an agent sees at the start of each
/// coordination attempt (§4.3).
pub struct MessageTemplater;

impl MessageTemplater {
    /// The binary-decision system message. If the agent has its own system
    /// instructions, they are prepended and the coordination instruction is
    /// appended last, so the model sees the most recent directive.
    pub fn evaluation_system_message(original_system_message: Option<&str>) -> String {
        let instructions = format!(
            "You are evaluating answers from multiple agents for a final response to a task. \
             Does the best CURRENT ANSWER address the ORIGINAL MESSAGE?\n\n\
             If YES, use the `vote` tool to record your vote and skip the `new_answer` tool. \
             Otherwise, do additional work first, then use the `new_answer` tool to record a \
             better answer to the ORIGINAL MESSAGE. Make sure you actually call one of the two \
             tools.\n\n\
             Current time: {}",
            Utc::now().to_rfc3339()
        );

        match original_system_message {
            Some(original) => format!("{original}\n\nCOORDINATION CONTEXT:\n{instructions}"),
            None => instructions,
        }
    }

    pub fn format_original_message(task: &str) -> String {
        format!("<ORIGINAL MESSAGE> {task} <END OF ORIGINAL MESSAGE>")
    }

    pub fn format_current_answers_empty() -> String {
        "<CURRENT ANSWERS from the agents>\n(no answers available yet)\n<END OF CURRENT ANSWERS>"
            .to_string()
    }

    /// `summaries` must already be in anonymous-ID order (`agent1`, `agent2`, …).
    pub fn format_current_answers(summaries: &[(String, String)]) -> String {
        let mut lines = vec!["<CURRENT ANSWERS from the agents>".to_string()];
        for (anon_id, summary) in summaries {
            lines.push(format!("<{anon_id}> {summary} <end of {anon_id}>"));
        }
        lines.push("<END OF CURRENT ANSWERS>".to_string());
        lines.join("\n")
    }

    pub fn format_conversation_history(history: &str) -> String {
        format!("<CONVERSATION_HISTORY>\n{history}\n<END OF CONVERSATION_HISTORY>")
    }

    /// Enforcement instruction injected when an agent emits no tool call
    /// (§4.2 rule 5).
    pub fn enforcement_message() -> &'static str {
        "Finish your work above by making a tool call of `vote` or `new_answer`. Make sure you actually call the tool."
    }

    /// Build the user message for a coordination attempt. `history`, when
    /// non-empty, is placed before the task per the fixed ordering this
    /// template guarantees: history, then task, then current answers.
    pub fn build_user_message(task: &str, history: Option<&str>, summaries: &[(String, String)]) -> String {
        let answers_block = if summaries.is_empty() {
            Self::format_current_answers_empty()
        } else {
            Self::format_current_answers(summaries)
        };

        let mut parts = Vec::new();
        if let Some(h) = history {
            if !h.is_empty() {
                parts.push(Self::format_conversation_history(h));
            }
        }
        parts.push(Self::format_original_message(task));
        parts.push(answers_block);
        parts.join("\n\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_without_original_is_bare_instructions() {
        let msg = MessageTemplater::evaluation_system_message(None);
        assert!(msg.contains("`vote`"));
        assert!(msg.contains("`new_answer`"));
        assert!(!msg.contains("COORDINATION CONTEXT"));
    }

    #[test]
    fn system_message_with_original_appends_coordination_last() {
        let msg = MessageTemplater::evaluation_system_message(Some("You are a helpful assistant."));
        let orig_pos = msg.find("You are a helpful assistant.").unwrap();
        let coord_pos = msg.find("COORDINATION CONTEXT").unwrap();
        assert!(orig_pos < coord_pos, "coordination instructions must come last");
    }

    #[test]
    fn original_message_wraps_task() {
        let s = MessageTemplater::format_original_message("2+2=?");
        assert_eq!(s, "<ORIGINAL MESSAGE> 2+2=? <END OF ORIGINAL MESSAGE>");
    }

    #[test]
    fn empty_answers_block_has_placeholder() {
        let s = MessageTemplater::format_current_answers_empty();
        assert!(s.contains("no answers available yet"));
    }

    #[test]
    fn current_answers_formats_each_agent_block() {
        let summaries = vec![("agent1".to_string(), "4".to_string()), ("agent2".to_string(), "four".to_string())];
        let s = MessageTemplater::format_current_answers(&summaries);
        assert!(s.contains("<agent1> 4 <end of agent1>"));
        assert!(s.contains("<agent2> four <end of agent2>"));
    }

    #[test]
    fn user_message_orders_history_task_answers() {
        let msg = MessageTemplater::build_user_message("task", Some("past turn"), &[]);
        let hist_pos = msg.find("CONVERSATION_HISTORY").unwrap();
        let task_pos = msg.find("ORIGINAL MESSAGE").unwrap();
        let answers_pos = msg.find("CURRENT ANSWERS").unwrap();
        assert!(hist_pos < task_pos && task_pos < answers_pos);
    }

    #[test]
    fn user_message_omits_history_block_when_absent() {
        let msg = MessageTemplater::build_user_message("task", None, &[]);
        assert!(!msg.contains("CONVERSATION_HISTORY"));
    }

    #[test]
    fn enforcement_message_mentions_both_tools() {
        let msg = MessageTemplater::enforcement_message();
        assert!(msg.contains("vote"));
        assert!(msg.contains("new_answer"));
    }
}
