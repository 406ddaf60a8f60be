//! The base rule engine: a priority-sorted rule list, CRUD, and restricted
//! expression evaluation (spec component C).

use super::eval;
use super::{now, RuleAction, RuleCategory, RuleMetadata, RuleSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A rule's guard: either a restricted expression string (spec's
/// restricted evaluator, see [`crate::rules::eval`]) or an opaque predicate
/// supplied at runtime (e.g. by [`crate::rules::RuleGenerator`]). Represented
/// as a sum type per the design notes — the expression evaluator lives
/// beside the interpreter of this sum, in `evaluate`.
#[derive(Clone)]
pub enum RuleCondition {
    Expression(String),
    Predicate(Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>),
}

impl RuleCondition {
    pub fn expr(expr: impl Into<String>) -> Self {
        RuleCondition::Expression(expr.into())
    }

    pub fn predicate(f: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static) -> Self {
        RuleCondition::Predicate(Arc::new(f))
    }

    /// Evaluation never propagates an error: expression failures are
    /// swallowed to `false` by [`eval::evaluate`]; a predicate is a plain
    /// Rust closure and is trusted to be total.
    pub fn evaluate(&self, context: &Map<String, Value>) -> bool {
        match self {
            RuleCondition::Expression(expr) => eval::evaluate(expr, context),
            RuleCondition::Predicate(f) => f(context),
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCondition::Expression(expr) => write!(f, "Expression({expr:?})"),
            RuleCondition::Predicate(_) => write!(f, "Predicate(<opaque>)"),
        }
    }
}

/// A guard on a decision or execution state (spec §3).
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub category: RuleCategory,
    pub source: RuleSource,
    pub description: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
    pub priority: i32,
    pub enabled: bool,
    pub metadata: RuleMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: RuleCategory,
        source: RuleSource,
        condition: RuleCondition,
        action: RuleAction,
        priority: i32,
    ) -> Self {
        let now = now();
        Self {
            id: id.into(),
            name: name.into(),
            category,
            source,
            description: String::new(),
            condition,
            action,
            priority,
            enabled: true,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: RuleMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A fired rule's record, produced by [`RuleEngine::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub rule_name: String,
    pub action: RuleAction,
    pub context_snapshot: Value,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum RuleEngineError {
    #[error("rule with id {0} already exists")]
    #[diagnostic(code(coordinator::rules::duplicate_id))]
    DuplicateId(String),
    #[error("no rule with id {0}")]
    #[diagnostic(code(coordinator::rules::not_found))]
    NotFound(String),
}

/// Holds a priority-sorted rule list (smaller `priority` sorts first,
/// i.e. evaluates first) and evaluates it against a caller-built context.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding a rule whose id already exists is an error and leaves the
    /// engine unchanged (spec testable property 3).
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), RuleEngineError> {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(RuleEngineError::DuplicateId(rule.id));
        }
        self.rules.push(rule);
        self.resort();
        Ok(())
    }

    pub fn remove_rule(&mut self, id: &str) -> Result<Rule, RuleEngineError> {
        let idx = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RuleEngineError::NotFound(id.to_string()))?;
        Ok(self.rules.remove(idx))
    }

    pub fn update_rule(&mut self, id: &str, f: impl FnOnce(&mut Rule)) -> Result<(), RuleEngineError> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RuleEngineError::NotFound(id.to_string()))?;
        f(rule);
        rule.updated_at = now();
        self.resort();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    fn resort(&mut self) {
        self.rules.sort_by_key(|r| r.priority);
    }

    /// Walks enabled rules in priority order, evaluating each condition
    /// against `context`. A rule whose condition errors is treated as
    /// untriggered and evaluation continues — never aborts the pass (spec
    /// §7 propagation policy).
    pub fn evaluate(&self, context: &Map<String, Value>) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            if rule.condition.evaluate(context) {
                violations.push(RuleViolation {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    action: rule.action,
                    context_snapshot: Value::Object(context.clone()),
                    message: rule.description.clone(),
                    timestamp: now(),
                });
            }
        }
        violations
    }

    /// Loads rules from a rule-configuration YAML document (spec §6):
    /// top-level key `rules`, each a `{id, name, description, priority,
    /// condition, action, enabled}` object. `type` (`static`/`dynamic`) is
    /// accepted but not otherwise interpreted by the engine.
    pub fn load_from_config(&mut self, yaml: &str) -> Result<(), crate::error::CoordinatorError> {
        #[derive(Deserialize)]
        struct ConfigFile {
            rules: Vec<ConfigRule>,
        }
        #[derive(Deserialize)]
        struct ConfigRule {
            id: String,
            name: String,
            #[serde(default)]
            description: String,
            priority: i32,
            condition: String,
            #[serde(default = "default_action")]
            action: String,
            #[serde(default = "default_enabled")]
            enabled: bool,
        }
        fn default_action() -> String {
            "log_warning".to_string()
        }
        fn default_enabled() -> bool {
            true
        }

        let parsed: ConfigFile = serde_yaml::from_str(yaml)?;
        for cr in parsed.rules {
            let mut rule = Rule::new(
                cr.id,
                cr.name,
                RuleCategory::Behavior,
                RuleSource::User,
                RuleCondition::expr(cr.condition),
                super::parse_config_action(&cr.action),
                cr.priority,
            )
            .with_description(cr.description);
            rule.enabled = cr.enabled;
            // Replacing an existing id from config is allowed (re-load);
            // only the programmatic `add_rule` enforces uniqueness.
            if let Err(RuleEngineError::DuplicateId(id)) = self.add_rule(rule.clone()) {
                let _ = self.remove_rule(&id);
                self.add_rule(rule).expect("id just removed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rule(id: &str, priority: i32) -> Rule {
        Rule::new(
            id,
            id,
            RuleCategory::Behavior,
            RuleSource::System,
            RuleCondition::expr("true"),
            RuleAction::LogWarning,
            priority,
        )
    }

    #[test]
    fn duplicate_id_rejected_and_engine_unchanged() {
        let mut engine = RuleEngine::new();
        engine.add_rule(make_rule("r1", 10)).unwrap();
        let err = engine.add_rule(make_rule("r1", 5)).unwrap_err();
        assert!(matches!(err, RuleEngineError::DuplicateId(_)));
        assert_eq!(engine.list().len(), 1);
        assert_eq!(engine.list()[0].priority, 10);
    }

    #[test]
    fn evaluation_is_priority_ordered_and_stable() {
        let mut engine = RuleEngine::new();
        engine.add_rule(make_rule("b", 5)).unwrap();
        engine.add_rule(make_rule("a", 5)).unwrap();
        engine.add_rule(make_rule("c", 1)).unwrap();
        let ids: Vec<_> = engine.list().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn malformed_condition_is_swallowed_not_fatal() {
        let mut engine = RuleEngine::new();
        let mut rule = make_rule("bad", 1);
        rule.condition = RuleCondition::expr("(((");
        engine.add_rule(rule).unwrap();
        engine.add_rule(make_rule("good", 2)).unwrap();
        let violations = engine.evaluate(&Map::new());
        // "good"'s condition `true` fires; "bad" silently does not.
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "good");
    }
}
