// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use quorum_model::Agent;

/// Maps agent identifier to an Agent handle. Insertion order defines
/// registration rank, used for tie-breaking and anonymous-ID numbering.
/// Immutable during a single coordination call.
pub struct AgentRegistry {
    order: Vec<String>,
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { order: Vec::new(), agents: HashMap::new() }
    }

    /// Register an agent under `id`. Returns `false` (no-op) if `id` is
    /// already registered.
    pub fn register(&mut self, id: impl Into<String>, agent: Arc<dyn Agent>) -> bool {
        let id = id.into();
        if self.agents.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.agents.insert(id, agent);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(id)
    }

    /// Registered agent ids in registration-rank order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Zero-based registration rank of `id`, if registered.
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Shallow clone: a new registry referencing the same `Arc<dyn Agent>`
    /// handles, for handing off to a spawned coordination task without
    /// holding a borrow across an `.await`.
    pub fn clone_handles(&self) -> Self {
        Self { order: self.order.clone(), agents: self.agents.clone() }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The `agentN` numbering agents see in the vote tool's enum and in the
/// current-answers block. Rebuilt deterministically whenever the set of
/// answer-holders changes; real IDs never appear in the voting surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnonymousIdentity {
    /// real id -> anonymous id ("agent1", "agent2", ...), in registration order.
    real_to_anon: HashMap<String, String>,
    /// anonymous id -> real id.
    anon_to_real: HashMap<String, String>,
    /// anonymous ids in numbering order.
    ordered: Vec<String>,
}

impl AnonymousIdentity {
    /// Build the mapping from the set of answer-holders, in registration
    /// rank order (as returned by `AgentRegistry::ids`).
    pub fn build(answer_holder_ids_in_rank_order: &[String]) -> Self {
        let mut real_to_anon = HashMap::new();
        let mut anon_to_real = HashMap::new();
        let mut ordered = Vec::new();
        for (i, real_id) in answer_holder_ids_in_rank_order.iter().enumerate() {
            let anon = format!("agent{}", i + 1);
            real_to_anon.insert(real_id.clone(), anon.clone());
            anon_to_real.insert(anon.clone(), real_id.clone());
            ordered.push(anon);
        }
        Self { real_to_anon, anon_to_real, ordered }
    }

    pub fn anon_of(&self, real_id: &str) -> Option<&str> {
        self.real_to_anon.get(real_id).map(String::as_str)
    }

    pub fn real_of(&self, anon_id: &str) -> Option<&str> {
        self.anon_to_real.get(anon_id).map(String::as_str)
    }

    /// Anonymous ids in numbering order, suitable for the vote tool's enum.
    pub fn ordered_anon_ids(&self) -> &[String] {
        &self.ordered
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_model::EchoAgent;

    #[test]
    fn registry_preserves_insertion_order() {
        let mut r = AgentRegistry::new();
        r.register("b", Arc::new(EchoAgent::new("b")));
        r.register("a", Arc::new(EchoAgent::new("a")));
        assert_eq!(r.ids(), &["b".to_string(), "a".to_string()]);
        assert_eq!(r.rank_of("b"), Some(0));
        assert_eq!(r.rank_of("a"), Some(1));
    }

    #[test]
    fn registry_rejects_duplicate_registration() {
        let mut r = AgentRegistry::new();
        assert!(r.register("a", Arc::new(EchoAgent::new("a"))));
        assert!(!r.register("a", Arc::new(EchoAgent::new("a"))));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn anonymous_identity_numbers_in_rank_order() {
        let ids = vec!["b".to_string(), "a".to_string()];
        let anon = AnonymousIdentity::build(&ids);
        assert_eq!(anon.anon_of("b"), Some("agent1"));
        assert_eq!(anon.anon_of("a"), Some("agent2"));
        assert_eq!(anon.real_of("agent1"), Some("b"));
    }

    #[test]
    fn anonymous_identity_stable_for_same_holder_set() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let first = AnonymousIdentity::build(&ids);
        let second = AnonymousIdentity::build(&ids);
        assert_eq!(first, second);
    }

    #[test]
    fn anonymous_identity_empty_when_no_answers() {
        let anon = AnonymousIdentity::build(&[]);
        assert!(anon.is_empty());
        assert!(anon.ordered_anon_ids().is_empty());
    }
}
