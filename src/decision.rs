//! The decision validator: applies repository rules and goal alignment to a
//! proposed decision (spec component E).

use crate::rules::{EnhancedRuleRepository, GoalAlignmentChecker, RuleAction, RuleCategory, RuleViolation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The outcome of [`DecisionValidator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Approved,
    Modified,
    Rejected,
    Escalated,
}

/// A structured action proposed by the planner, screened before the
/// Workflow Agent acts on it.
#[derive(Debug, Clone, Default)]
pub struct DecisionRequest {
    pub session_id: String,
    pub decision_id: String,
    pub goal: Option<String>,
    pub context: Map<String, Value>,
    pub payload: Map<String, Value>,
}

/// Result of screening a [`DecisionRequest`] against the rule repository and
/// goal checker.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub violations: Vec<RuleViolation>,
    pub suggestions: Vec<String>,
    pub modified_payload: Option<Map<String, Value>>,
}

const CATEGORIES: [RuleCategory; 4] = [
    RuleCategory::Behavior,
    RuleCategory::Tool,
    RuleCategory::Data,
    RuleCategory::Execution,
];

/// Validates proposed decisions against an [`EnhancedRuleRepository`] and,
/// when a goal is set, a [`GoalAlignmentChecker`].
pub struct DecisionValidator<'a> {
    repository: &'a EnhancedRuleRepository,
    goal_checker: Option<GoalAlignmentChecker>,
}

impl<'a> DecisionValidator<'a> {
    pub fn new(repository: &'a EnhancedRuleRepository) -> Self {
        Self {
            repository,
            goal_checker: None,
        }
    }

    pub fn with_goal_checker(mut self, checker: GoalAlignmentChecker) -> Self {
        self.goal_checker = Some(checker);
        self
    }

    fn build_eval_context(&self, request: &DecisionRequest) -> Map<String, Value> {
        let mut ctx = request.context.clone();
        for (k, v) in &request.payload {
            ctx.insert(k.clone(), v.clone());
        }
        ctx.insert("session_id".into(), Value::String(request.session_id.clone()));
        ctx.insert("decision_id".into(), Value::String(request.decision_id.clone()));
        ctx
    }

    fn check_rules_by_category(&self, context: &Map<String, Value>) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for category in CATEGORIES {
            violations.extend(self.repository.evaluate_by_category(category, context));
        }
        violations
    }

    fn check_goal_alignment(&self, request: &DecisionRequest) -> Option<RuleViolation> {
        let goal = request.goal.as_ref()?;
        let checker = self.goal_checker?;
        let action_description = request
            .payload
            .get("action_description")
            .and_then(Value::as_str)
            .unwrap_or("");
        let score = checker.check_alignment(goal, action_description, Some(&request.context));
        if score >= checker.threshold {
            return None;
        }
        Some(RuleViolation {
            rule_id: "goal_alignment_check".to_string(),
            rule_name: "Goal alignment check".to_string(),
            action: RuleAction::SuggestCorrection,
            context_snapshot: Value::Object(request.context.clone()),
            message: format!("alignment score {score:.2} below threshold {:.2}", checker.threshold),
            timestamp: chrono::Utc::now(),
        })
    }

    fn collect_suggestions(&self, violations: &[RuleViolation]) -> Vec<String> {
        let mut suggestions = Vec::new();
        for violation in violations {
            if let Some(rule) = self.repository.get(&violation.rule_id) {
                if let Some(suggestion) = rule.metadata.get("suggestion").and_then(Value::as_str) {
                    suggestions.push(suggestion.to_string());
                    continue;
                }
            }
            suggestions.push(violation.message.clone());
        }
        suggestions.sort();
        suggestions.dedup();
        suggestions
    }

    fn determine_status(violations: &[RuleViolation]) -> ValidationStatus {
        if violations.is_empty() {
            return ValidationStatus::Approved;
        }
        if violations
            .iter()
            .any(|v| matches!(v.action, RuleAction::RejectDecision | RuleAction::ForceTerminate))
        {
            return ValidationStatus::Rejected;
        }
        if violations
            .iter()
            .all(|v| matches!(v.action, RuleAction::SuggestCorrection | RuleAction::LogWarning))
        {
            return ValidationStatus::Modified;
        }
        ValidationStatus::Rejected
    }

    /// Attempts auto-correction using rule metadata hints. Currently
    /// recognizes `correction_type = "field_restriction"`, which marks the
    /// modified payload with `_needs_field_restriction` (spec §4.4 step 6);
    /// unrecognized hints leave the payload untouched beyond the marker-free
    /// copy.
    fn try_auto_correct(
        &self,
        request: &DecisionRequest,
        violations: &[RuleViolation],
    ) -> Map<String, Value> {
        let mut payload = request.payload.clone();
        for violation in violations {
            let Some(rule) = self.repository.get(&violation.rule_id) else {
                continue;
            };
            if rule.metadata.get("correction_type").and_then(Value::as_str)
                == Some("field_restriction")
            {
                payload.insert("_needs_field_restriction".into(), Value::Bool(true));
            }
        }
        payload
    }

    /// Screens `request` per spec §4.4's six-step algorithm.
    pub fn validate(&self, request: &DecisionRequest) -> ValidationResult {
        let context = self.build_eval_context(request);
        let mut violations = self.check_rules_by_category(&context);
        if let Some(goal_violation) = self.check_goal_alignment(request) {
            violations.push(goal_violation);
        }

        let suggestions = self.collect_suggestions(&violations);
        let status = Self::determine_status(&violations);

        let modified_payload = if status == ValidationStatus::Modified {
            Some(self.try_auto_correct(request, &violations))
        } else {
            None
        };

        ValidationResult {
            status,
            violations,
            suggestions,
            modified_payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::rules::{EnhancedRuleRepository, GoalAlignmentChecker};

    #[test]
    fn no_violations_is_approved() {
        let cfg = CoordinatorConfig::default();
        let repo = EnhancedRuleRepository::with_default_rules(&cfg);
        let validator = DecisionValidator::new(&repo);
        let request = DecisionRequest {
            session_id: "s1".into(),
            decision_id: "d1".into(),
            goal: None,
            context: Map::new(),
            payload: Map::new(),
        };
        let result = validator.validate(&request);
        assert_eq!(result.status, ValidationStatus::Approved);
    }

    #[test]
    fn force_terminate_violation_rejects() {
        let cfg = CoordinatorConfig::default();
        let repo = EnhancedRuleRepository::with_default_rules(&cfg);
        let validator = DecisionValidator::new(&repo);
        let mut context = Map::new();
        context.insert("iteration_count".into(), 99.into());
        let request = DecisionRequest {
            session_id: "s1".into(),
            decision_id: "d1".into(),
            goal: None,
            context,
            payload: Map::new(),
        };
        let result = validator.validate(&request);
        assert_eq!(result.status, ValidationStatus::Rejected);
    }

    #[test]
    fn low_goal_alignment_suggests_correction() {
        let cfg = CoordinatorConfig::default();
        let repo = EnhancedRuleRepository::new();
        let validator =
            DecisionValidator::new(&repo).with_goal_checker(GoalAlignmentChecker::new(cfg.goal_alignment_threshold));
        let mut payload = Map::new();
        payload.insert("action_description".into(), "完全不相关的操作".into());
        let request = DecisionRequest {
            session_id: "s1".into(),
            decision_id: "d1".into(),
            goal: Some("生成销售报表".into()),
            context: Map::new(),
            payload,
        };
        let result = validator.validate(&request);
        assert_eq!(result.status, ValidationStatus::Modified);
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == "goal_alignment_check"));
    }
}
