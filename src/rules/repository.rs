//! The enhanced rule repository: category/source filtering over the base
//! engine, plus the shipped default rule set (spec §4.3).

use super::engine::{Rule, RuleCondition, RuleEngineError, RuleViolation};
use super::{RuleAction, RuleCategory, RuleSource};
use serde_json::{Map, Value};

pub use super::engine::RuleEngineError as DuplicateRuleError;

/// A [`Rule`] as stored in the repository. Distinct type alias rather than
/// a fresh struct: the repository adds query surface (category/source
/// filtering), not new fields.
pub type EnhancedRule = Rule;

/// Dict-keyed-in-spirit rule store (here: a `RuleEngine` plus derived
/// indices aren't needed since the rule count stays small — linear scan is
/// fine and keeps the invariant "one source of truth for ordering" simple).
#[derive(Debug, Default)]
pub struct EnhancedRuleRepository {
    engine: super::RuleEngine,
}

impl EnhancedRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository preloaded with the four default rules spec §4.3 names:
    /// max iterations, max tokens, goal alignment, per-node timeout.
    pub fn with_default_rules(cfg: &crate::config::CoordinatorConfig) -> Self {
        let mut repo = Self::new();
        for rule in default_rule_set(cfg) {
            repo.add_rule(rule).expect("default rule ids are unique");
        }
        repo
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), RuleEngineError> {
        self.engine.add_rule(rule)
    }

    pub fn remove_rule(&mut self, id: &str) -> Result<Rule, RuleEngineError> {
        self.engine.remove_rule(id)
    }

    pub fn update_rule(&mut self, id: &str, f: impl FnOnce(&mut Rule)) -> Result<(), RuleEngineError> {
        self.engine.update_rule(id, f)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.engine.get(id)
    }

    pub fn list(&self) -> &[Rule] {
        self.engine.list()
    }

    pub fn list_by_category(&self, category: RuleCategory) -> Vec<&Rule> {
        self.engine
            .list()
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn list_by_source(&self, source: RuleSource) -> Vec<&Rule> {
        self.engine
            .list()
            .iter()
            .filter(|r| r.source == source)
            .collect()
    }

    pub fn evaluate(&self, context: &Map<String, Value>) -> Vec<RuleViolation> {
        self.engine.evaluate(context)
    }

    /// Evaluates only enabled rules of `category`, in priority order.
    pub fn evaluate_by_category(
        &self,
        category: RuleCategory,
        context: &Map<String, Value>,
    ) -> Vec<RuleViolation> {
        self.engine
            .list()
            .iter()
            .filter(|r| r.enabled && r.category == category)
            .filter(|r| r.condition.evaluate(context))
            .map(|r| RuleViolation {
                rule_id: r.id.clone(),
                rule_name: r.name.clone(),
                action: r.action,
                context_snapshot: Value::Object(context.clone()),
                message: r.description.clone(),
                timestamp: super::now(),
            })
            .collect()
    }

    pub fn load_from_config(&mut self, yaml: &str) -> Result<(), crate::error::CoordinatorError> {
        self.engine.load_from_config(yaml)
    }
}

fn default_rule_set(cfg: &crate::config::CoordinatorConfig) -> Vec<Rule> {
    use serde_json::json;

    let max_iterations_rule = Rule::new(
        "default_max_iterations",
        "Maximum iterations exceeded",
        RuleCategory::Execution,
        RuleSource::System,
        RuleCondition::expr(format!("iteration_count > {}", cfg.max_iterations)),
        RuleAction::ForceTerminate,
        10,
    )
    .with_description("Forces termination once the ReAct loop exceeds the configured iteration budget.")
    .with_metadata(
        json!({"suggestion": "reduce iteration count or raise max_iterations"})
            .as_object()
            .unwrap()
            .clone(),
    );

    let max_tokens_rule = Rule::new(
        "default_max_tokens",
        "Maximum tokens exceeded",
        RuleCategory::Execution,
        RuleSource::System,
        RuleCondition::expr(format!("token_count > {}", cfg.max_tokens)),
        RuleAction::ForceTerminate,
        10,
    )
    .with_description("Forces termination once cumulative token usage exceeds the configured budget.")
    .with_metadata(
        json!({"suggestion": "summarize context or raise max_tokens"})
            .as_object()
            .unwrap()
            .clone(),
    );

    let goal_alignment_rule = Rule::new(
        "default_goal_alignment",
        "Goal alignment below threshold",
        RuleCategory::Goal,
        RuleSource::System,
        RuleCondition::expr(format!(
            "alignment_score < {}",
            cfg.goal_alignment_threshold
        )),
        RuleAction::SuggestCorrection,
        20,
    )
    .with_description("Suggests a correction when the proposed action's goal alignment score falls below threshold.")
    .with_metadata(
        json!({
            "suggestion": "re-check the action against the stated goal",
            "correction_type": "goal_realignment",
        })
        .as_object()
        .unwrap()
        .clone(),
    );

    let node_timeout_rule = Rule::new(
        "default_node_timeout",
        "Per-node timeout exceeded",
        RuleCategory::Execution,
        RuleSource::System,
        RuleCondition::expr(format!(
            "node_duration_seconds > {}",
            cfg.node_timeout_seconds
        )),
        RuleAction::ForceTerminate,
        10,
    )
    .with_description("Forces termination of a node that runs past its wall-clock budget.")
    .with_metadata(
        json!({"suggestion": "investigate the slow node or raise node_timeout_seconds"})
            .as_object()
            .unwrap()
            .clone(),
    );

    vec![
        max_iterations_rule,
        max_tokens_rule,
        goal_alignment_rule,
        node_timeout_rule,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_set_fires_on_breach() {
        let cfg = crate::config::CoordinatorConfig::default();
        let repo = EnhancedRuleRepository::with_default_rules(&cfg);
        let mut ctx = Map::new();
        ctx.insert("iteration_count".into(), 11.into());
        let violations = repo.evaluate_by_category(RuleCategory::Execution, &ctx);
        assert!(violations.iter().any(|v| v.rule_id == "default_max_iterations"));
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let cfg = crate::config::CoordinatorConfig::default();
        let repo = EnhancedRuleRepository::with_default_rules(&cfg);
        let mut ctx = Map::new();
        ctx.insert("alignment_score".into(), 0.1.into());
        let violations = repo.evaluate_by_category(RuleCategory::Execution, &ctx);
        assert!(!violations.iter().any(|v| v.rule_id == "default_goal_alignment"));
    }
}
