// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use quorum_config::{Config, TieBreaking, VoteStrategy};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::registry::{AgentRegistry, AnonymousIdentity};
use crate::state::AgentState;

/// The winning agent, by real id, plus the tally that produced it. `None`
/// means no votes and no answers were ever produced (§4.6 terminal case).
#[derive(Debug, Clone)]
pub struct Resolution {
    pub winner: String,
    pub tally: HashMap<String, f64>,
    pub tie_broken_by: Option<TieBreaking>,
}

/// Score every anonymous candidate's votes, then resolve ties per
/// `config.voting`. Falls back to the earliest-registered answer-holder when
/// votes never arrived but at least one answer exists (§4.6).
pub fn resolve(
    registry: &AgentRegistry,
    states: &HashMap<String, AgentState>,
    anon: &AnonymousIdentity,
    config: &Config,
) -> Option<Resolution> {
    let tally = tally_votes(states, anon, config);

    if tally.values().all(|v| *v == 0.0) {
        let fallback = fallback_to_earliest_answer(registry, states);
        if let Some(winner) = &fallback {
            debug!(winner = %winner, "no votes cast, falling back to earliest answer holder");
        }
        return fallback.map(|winner| Resolution { winner, tally, tie_broken_by: None });
    }

    let max_score = tally.values().cloned().fold(f64::MIN, f64::max);
    let mut leaders: Vec<&String> = tally
        .iter()
        .filter(|(_, v)| (**v - max_score).abs() < f64::EPSILON)
        .map(|(k, _)| k)
        .collect();
    leaders.sort();

    if leaders.len() == 1 {
        return Some(Resolution { winner: leaders[0].clone(), tally, tie_broken_by: None });
    }

    info!(candidates = ?leaders, strategy = ?config.voting.tie_breaking, "vote tied, breaking by configured strategy");
    let winner = break_tie(&leaders, registry, states, config.voting.tie_breaking, config.voting.random_seed);
    winner.map(|w| Resolution { winner: w, tally, tie_broken_by: Some(config.voting.tie_breaking) })
}

fn tally_votes(
    states: &HashMap<String, AgentState>,
    anon: &AnonymousIdentity,
    config: &Config,
) -> HashMap<String, f64> {
    let mut tally: HashMap<String, f64> =
        anon.ordered_anon_ids().iter().map(|id| (anon.real_of(id).unwrap_or_default().to_string(), 0.0)).collect();

    for (voter_id, state) in states {
        let Some(vote) = &state.vote else { continue };
        let Some(target_real) = anon.real_of(&vote.target_anonymous_id) else { continue };
        let weight = match config.voting.strategy {
            VoteStrategy::SimpleMajority => 1.0,
            VoteStrategy::WeightedVote => states.get(voter_id).map(|s| s.voting_weight).unwrap_or(1.0),
        };
        *tally.entry(target_real.to_string()).or_insert(0.0) += weight;
    }
    tally
}

fn fallback_to_earliest_answer(registry: &AgentRegistry, states: &HashMap<String, AgentState>) -> Option<String> {
    registry.ids().iter().find(|id| states.get(*id).map(|s| s.answer.is_some()).unwrap_or(false)).cloned()
}

fn break_tie(
    leaders: &[&String],
    registry: &AgentRegistry,
    states: &HashMap<String, AgentState>,
    strategy: TieBreaking,
    random_seed: u64,
) -> Option<String> {
    if leaders.is_empty() {
        return None;
    }
    match strategy {
        TieBreaking::RegistrationOrder => {
            leaders.iter().min_by_key(|id| registry.rank_of(id).unwrap_or(usize::MAX)).map(|s| (*s).clone())
        }
        TieBreaking::Random => {
            let mut rng = StdRng::seed_from_u64(random_seed);
            leaders.choose(&mut rng).map(|s| (*s).clone())
        }
        TieBreaking::OldestAnswer => leaders
            .iter()
            .min_by_key(|id| states.get(id.as_str()).and_then(|s| s.started_at).unwrap_or_default())
            .map(|s| (*s).clone()),
        TieBreaking::NewestAnswer => leaders
            .iter()
            .max_by_key(|id| states.get(id.as_str()).and_then(|s| s.started_at).unwrap_or_default())
            .map(|s| (*s).clone()),
        TieBreaking::LongestAnswer => leaders
            .iter()
            .max_by_key(|id| states.get(id.as_str()).and_then(|s| s.answer.as_ref()).map(|a| a.chars().count()).unwrap_or(0))
            .map(|s| (*s).clone()),
        TieBreaking::HighestWeight => leaders
            .iter()
            .max_by(|a, b| {
                let wa = states.get(a.as_str()).map(|s| s.voting_weight).unwrap_or(1.0);
                let wb = states.get(b.as_str()).map(|s| s.voting_weight).unwrap_or(1.0);
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|s| (*s).clone()),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
