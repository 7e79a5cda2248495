//! Activation propagation engine.
//!
//! Pure, deterministic diffusion of commit values through weighted links.
//! Activation is always recomputed from scratch — the previous values are
//! discarded before the first round, so the function is not a fixed-point
//! iteration and re-running it on its own output changes nothing as long as
//! the commit values are unchanged.

use crate::graph::models::GoalNode;
use std::collections::HashMap;

/// Tuning parameters for the diffusion.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Number of simultaneous-update rounds.
    pub rounds: u32,
    /// Rate at which already-accumulated activation feeds forward.
    pub alpha: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            rounds: 4,
            alpha: 0.2,
        }
    }
}

/// Recompute activation for the whole node set.
///
/// Never mutates its input. Each round computes, for every directed edge
/// `s → t` with weight `w`, the increment
/// `w * (commit(s) + activation(s) * alpha) / rounds`, accumulated per
/// target against the activations observed at the start of the round
/// (increments within a round never see each other). After the edge pass,
/// every node adds its accumulated increment plus `commit / rounds`.
/// Edges whose target is absent from the set are skipped.
///
/// Identical inputs and configuration produce bit-identical output: nodes
/// are processed in input order and each node's links in `BTreeMap` order.
pub fn propagate(nodes: &[GoalNode], config: &ActivationConfig) -> Vec<GoalNode> {
    let rounds = config.rounds.max(1) as f64;
    let mut result: Vec<GoalNode> = nodes.to_vec();

    for node in &mut result {
        node.activation = 0.0;
    }

    let index: HashMap<String, usize> = result
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    for _ in 0..config.rounds.max(1) {
        let mut increments = vec![0.0_f64; result.len()];

        for source in &result {
            for (target_id, &weight) in &source.links {
                // Dangling targets are tolerated, never errors.
                if let Some(&ti) = index.get(target_id) {
                    increments[ti] +=
                        weight as f64 * (source.commit as f64 + source.activation * config.alpha)
                            / rounds;
                }
            }
        }

        for (node, increment) in result.iter_mut().zip(increments) {
            node.activation += increment;
            node.activation += node.commit as f64 / rounds;
        }
    }

    result
}
