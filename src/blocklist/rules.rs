use std::collections::BTreeSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
}

/// One network-blocking rule in the shape the browser's declarative rule API
/// expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompiledRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl CompiledRule {
    pub fn block(id: u32, pattern: &str) -> Self {
        Self {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction {
                kind: RuleActionType::Block,
            },
            condition: RuleCondition {
                url_filter: pattern.to_string(),
            },
        }
    }

    pub fn pattern(&self) -> &str {
        &self.condition.url_filter
    }
}

/// Ids are assigned `1..=N` in list order.
pub fn compile_rules(patterns: &[String]) -> Vec<CompiledRule> {
    patterns
        .iter()
        .zip(1u32..)
        .map(|(pattern, id)| CompiledRule::block(id, pattern))
        .collect()
}

/// A full replacement of the installed rule set: every id in `remove_rule_ids`
/// goes first, then `add_rules` are installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub remove_rule_ids: Vec<u32>,
    pub add_rules: Vec<CompiledRule>,
}

impl RuleUpdate {
    /// Removes the union of the previously installed ids and the ids about to
    /// be added, so no add can collide with a rule that is still installed.
    pub fn replace_all(previously_installed: &[u32], add_rules: Vec<CompiledRule>) -> Self {
        let remove_rule_ids: BTreeSet<u32> = previously_installed
            .iter()
            .copied()
            .chain(add_rules.iter().map(|rule| rule.id))
            .collect();

        Self {
            remove_rule_ids: remove_rule_ids.into_iter().collect(),
            add_rules,
        }
    }

    pub fn installed_ids(&self) -> Vec<u32> {
        self.add_rules.iter().map(|rule| rule.id).collect()
    }
}

/// The network layer that actually cancels matching requests.
pub trait RuleSink: Send + Sync {
    fn apply(&self, update: &RuleUpdate) -> Result<()>;
}
