//! Rule engine, repository, generator, and goal-alignment checker (spec
//! components C and D).

pub mod engine;
pub mod eval;
pub mod generator;
pub mod repository;

pub use engine::{Rule, RuleCondition, RuleEngine, RuleViolation};
pub use generator::{GoalAlignmentChecker, RuleGenerator, UserInputSpec};
pub use repository::{DuplicateRuleError, EnhancedRule, EnhancedRuleRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rule's subject-matter category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleCategory {
    Behavior,
    Tool,
    Data,
    Execution,
    Goal,
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleSource {
    User,
    System,
    Tool,
    Generated,
}

/// The action a triggered rule requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    LogWarning,
    SuggestCorrection,
    RejectDecision,
    ForceTerminate,
}

/// Parses a rule-configuration-file action tag (spec §6, rule config YAML),
/// defaulting unrecognized values to `LogWarning` per spec.
pub fn parse_config_action(tag: &str) -> RuleAction {
    match tag {
        "suggest" => RuleAction::SuggestCorrection,
        "reject" => RuleAction::RejectDecision,
        "terminate" => RuleAction::ForceTerminate,
        _ => RuleAction::LogWarning,
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Free-form metadata a rule carries — correction hints (`suggestion`,
/// `correction_type`) and whatever a generator chooses to attach
/// (extracted keywords, source config). Using `serde_json::Map` rather than
/// a fixed struct mirrors the teacher's convention for free-form payloads.
pub type RuleMetadata = Map<String, Value>;
