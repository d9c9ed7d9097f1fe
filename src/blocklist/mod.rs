pub mod normalize;
pub mod rules;

pub use normalize::normalize_site;
pub use rules::{compile_rules, CompiledRule, RuleSink, RuleUpdate};
