use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_max_duration_seconds() -> u64 {
    600
}

fn default_max_attempts_per_round() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

/// Fixed so that `Config::default()` stays deterministic; override in YAML
/// to vary the `random` tie-breaking stream across sessions.
fn default_random_seed() -> u64 {
    0x5EED
}

/// Vote aggregation strategy. See [`VotingConfig::strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoteStrategy {
    #[default]
    SimpleMajority,
    WeightedVote,
}

/// Tie-breaking method applied when the vote resolver finds more than one
/// agent with the winning score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaking {
    #[default]
    RegistrationOrder,
    Random,
    OldestAnswer,
    NewestAnswer,
    LongestAnswer,
    HighestWeight,
}

/// Voting behavior for a coordination session.
///
/// ```yaml
/// voting:
///   strategy: weighted_vote
///   tie_breaking: highest_weight
///   include_vote_counts: true
///   include_vote_reasons: true
///   anonymous_voting: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VotingConfig {
    pub strategy: VoteStrategy,
    pub tie_breaking: TieBreaking,
    #[serde(default = "default_true")]
    pub include_vote_counts: bool,
    #[serde(default = "default_true")]
    pub include_vote_reasons: bool,
    #[serde(default = "default_true")]
    pub anonymous_voting: bool,
    /// Seed for the `TieBreaking::Random` strategy's PRNG (§4.6: "uniform
    /// over tied agents using a seeded PRNG"). Fixed per session so a
    /// resolution is reproducible given the same votes and seed.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            strategy: VoteStrategy::default(),
            tie_breaking: TieBreaking::default(),
            include_vote_counts: true,
            include_vote_reasons: true,
            anonymous_voting: true,
            random_seed: default_random_seed(),
        }
    }
}

/// Top-level orchestrator configuration.
///
/// Every field here corresponds to a configuration item the coordination
/// core reads; nothing about agent backends, transport credentials, or CLI
/// presentation lives in this crate.
///
/// ```yaml
/// max_duration_seconds: 600
/// max_attempts_per_round: 3
/// voting:
///   strategy: simple_majority
///   tie_breaking: registration_order
/// agent_weights:
///   researcher: 2.0
/// snapshot_storage_path: /var/lib/quorum/snapshots
/// agent_temporary_workspace_path: /tmp/quorum/workspaces
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_max_duration_seconds")]
    pub max_duration_seconds: u64,
    #[serde(default = "default_max_attempts_per_round")]
    pub max_attempts_per_round: u32,
    pub voting: VotingConfig,
    /// Per-agent voting weight, consulted only when `voting.strategy` is
    /// `weighted_vote`. Keys not present default to 1.0.
    pub agent_weights: HashMap<String, f64>,
    /// Root directory snapshots are copied into. `None` disables the
    /// Snapshot Bridge entirely.
    pub snapshot_storage_path: Option<String>,
    /// Root directory reference workspaces are materialized under.
    pub agent_temporary_workspace_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_duration_seconds: default_max_duration_seconds(),
            max_attempts_per_round: default_max_attempts_per_round(),
            voting: VotingConfig::default(),
            agent_weights: HashMap::new(),
            snapshot_storage_path: None,
            agent_temporary_workspace_path: None,
        }
    }
}

impl Config {
    /// Validate cross-field invariants a plain `Deserialize` can't express:
    /// every weighted agent must be a known registered id, and weights and
    /// timing budgets must be positive.
    ///
    /// `known_agent_ids` is the full set of ids registered with the
    /// orchestrator at construction time.
    pub fn validate(&self, known_agent_ids: &[&str]) -> Result<(), crate::ConfigError> {
        for agent_id in self.agent_weights.keys() {
            if !known_agent_ids.contains(&agent_id.as_str()) {
                return Err(crate::ConfigError::UnknownWeightedAgent(agent_id.clone()));
            }
        }
        if self.agent_weights.values().any(|w| *w <= 0.0) {
            return Err(crate::ConfigError::NonPositiveWeight);
        }
        if self.max_duration_seconds == 0 {
            return Err(crate::ConfigError::InvalidDuration);
        }
        if self.max_attempts_per_round == 0 {
            return Err(crate::ConfigError::InvalidAttempts);
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
