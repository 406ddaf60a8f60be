//! Goal-alignment scoring and rule generation from user-supplied input
//! (spec component D, supplemented with `RuleGenerator`'s tool/execution/
//! behavior generators from `original_source/rule_generator.py`).

use super::engine::{Rule, RuleCondition};
use super::{RuleAction, RuleCategory, RuleSource};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

/// Curated synonym groups used by [`GoalAlignmentChecker`] when exact
/// substring matching between a goal keyword and an action keyword fails.
/// Mirrors `rule_generator.py`'s hand-curated clusters.
fn synonym_groups() -> &'static [&'static [&'static str]] {
    &[
        &["销售", "订单", "交易", "营收", "收入"],
        &["客户", "用户", "顾客", "customer", "user"],
        &["报表", "报告", "report", "summary"],
        &["分析", "统计", "analysis", "analytics"],
    ]
}

/// Verbs that make an action dangerous regardless of surface alignment
/// with the goal (spec §4.3: "if the action contains a dangerous verb ...
/// and the goal does not, multiply base by 0.3").
const DANGER_KEYWORDS: &[&str] = &["删除", "清空", "drop", "delete", "truncate"];

const PRIVACY_KEYWORDS: &[&str] = &[
    "密码",
    "password",
    "身份证",
    "id_card",
    "信用卡",
    "credit_card",
    "手机号",
    "phone_number",
    "邮箱",
    "email",
];

const TIME_KEYWORDS: &[&str] = &["截止日期", "deadline", "限时", "urgent", "紧急", "time_limit"];

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF)
}

/// Splits `text` into a lowercased keyword set. ASCII runs are tokenized on
/// non-alphanumeric boundaries; CJK runs (no word boundaries) are tokenized
/// as overlapping bigrams, matching `extract_chinese_keywords`.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    let mut keywords = HashSet::new();
    let mut ascii_buf = String::new();
    let mut cjk_buf: Vec<char> = Vec::new();

    let flush_ascii = |buf: &mut String, out: &mut HashSet<String>| {
        if buf.len() >= 2 {
            out.insert(buf.to_lowercase());
        }
        buf.clear();
    };
    let flush_cjk = |buf: &mut Vec<char>, out: &mut HashSet<String>| {
        if buf.len() == 1 {
            out.insert(buf[0].to_string());
        } else {
            for window in buf.windows(2) {
                out.insert(window.iter().collect());
            }
        }
        buf.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_ascii(&mut ascii_buf, &mut keywords);
            cjk_buf.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_buf, &mut keywords);
            ascii_buf.push(c);
        } else {
            flush_ascii(&mut ascii_buf, &mut keywords);
            flush_cjk(&mut cjk_buf, &mut keywords);
        }
    }
    flush_ascii(&mut ascii_buf, &mut keywords);
    flush_cjk(&mut cjk_buf, &mut keywords);
    keywords
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

/// Computes a `[0, 1]` alignment score between a goal and a proposed
/// action's description (spec §4.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct GoalAlignmentChecker {
    pub threshold: f64,
}

impl GoalAlignmentChecker {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn is_semantically_related(&self, goal_word: &str, action_word: &str) -> bool {
        if goal_word == action_word
            || action_word.contains(goal_word)
            || goal_word.contains(action_word)
        {
            return true;
        }
        for group in synonym_groups() {
            if group.contains(&goal_word) && group.contains(&action_word) {
                return true;
            }
        }
        // Shared-character fallback for Chinese bigrams: two bigrams that
        // share a character are treated as loosely related.
        if goal_word.chars().count() == 2 && action_word.chars().count() == 2 {
            let goal_chars: HashSet<char> = goal_word.chars().collect();
            return action_word.chars().any(|c| goal_chars.contains(&c));
        }
        false
    }

    /// Base score = matches / max(|goal_keywords|, 1), then the
    /// danger-keyword penalty and progress bonus from spec §4.3.
    pub fn check_alignment(
        &self,
        goal: &str,
        action_description: &str,
        context: Option<&Map<String, Value>>,
    ) -> f64 {
        let goal_keywords = extract_keywords(goal);
        let action_keywords = extract_keywords(action_description);

        if goal_keywords.is_empty() {
            return 1.0;
        }

        let matches = goal_keywords
            .iter()
            .filter(|gw| {
                action_keywords
                    .iter()
                    .any(|aw| self.is_semantically_related(gw, aw))
            })
            .count();

        let mut score = (matches as f64 / goal_keywords.len().max(1) as f64).min(1.0);

        let action_is_dangerous = contains_any(action_description, DANGER_KEYWORDS);
        let goal_is_dangerous = contains_any(goal, DANGER_KEYWORDS);
        if action_is_dangerous && !goal_is_dangerous {
            score *= 0.3;
        }

        if let Some(ctx) = context {
            let near_completion = ctx
                .get("progress")
                .and_then(Value::as_f64)
                .map(|p| p >= 0.9)
                .unwrap_or(false);
            if !near_completion && ctx.contains_key("progress") {
                score = (score + 0.1).min(1.0);
            }
        }

        (score * 100.0).round() / 100.0
    }

    pub fn is_aligned(&self, goal: &str, action_description: &str) -> bool {
        self.check_alignment(goal, action_description, None) >= self.threshold
    }

    /// Human-readable explanation of why an action fell below threshold, or
    /// `None` if it didn't.
    pub fn get_deviation_reason(&self, goal: &str, action_description: &str) -> Option<String> {
        let score = self.check_alignment(goal, action_description, None);
        if score >= self.threshold {
            return None;
        }
        let goal_keywords = extract_keywords(goal);
        let action_keywords = extract_keywords(action_description);
        let unmatched: Vec<&String> = goal_keywords
            .iter()
            .filter(|gw| {
                !action_keywords
                    .iter()
                    .any(|aw| self.is_semantically_related(gw, aw))
            })
            .collect();
        Some(format!(
            "alignment score {score:.2} is below threshold {:.2}; goal keywords not reflected in the action: {}",
            self.threshold,
            unmatched
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ))
    }
}

/// Per-tool forbidden-operation configuration, keyed by tool name in
/// [`UserInputSpec::tool_configs`].
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    pub forbidden_operations: Vec<String>,
}

/// The structured user input a [`RuleGenerator`] derives rules from (spec
/// §4.3: `{start, goal, description, allowed_tools, tool_configs,
/// max_iterations, timeout_seconds}`).
#[derive(Debug, Clone, Default)]
pub struct UserInputSpec {
    pub start: String,
    pub goal: String,
    pub description: String,
    pub allowed_tools: Vec<String>,
    pub tool_configs: HashMap<String, ToolConfig>,
    pub max_iterations: u64,
    pub timeout_seconds: u64,
}

/// Derives [`Rule`]s from structured user/agent input (spec §4.3,
/// supplemented with `generate_tool_rules`/`generate_execution_rules`/
/// `generate_behavior_rules` from `original_source/rule_generator.py`).
#[derive(Debug, Default)]
pub struct RuleGenerator;

impl RuleGenerator {
    pub fn new() -> Self {
        Self
    }

    fn generated_id(&self, prefix: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{prefix}_{}", &suffix[..8])
    }

    fn create_goal_alignment_rule(&self, spec: &UserInputSpec) -> Rule {
        let keywords = extract_keywords(&spec.goal);
        let goal = spec.goal.clone();
        let metadata = json!({
            "suggestion": "align the proposed action with the stated goal",
            "goal_keywords": keywords.iter().collect::<Vec<_>>(),
        })
        .as_object()
        .unwrap()
        .clone();

        Rule::new(
            self.generated_id("goal_alignment"),
            format!("Goal alignment for: {goal}"),
            RuleCategory::Goal,
            RuleSource::Generated,
            RuleCondition::predicate(move |ctx| {
                let checker = GoalAlignmentChecker::new(0.5);
                let action = ctx
                    .get("action_description")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                !checker.is_aligned(&goal, action)
            }),
            RuleAction::SuggestCorrection,
            20,
        )
        .with_description("Flags actions whose description does not reflect the stated goal.")
        .with_metadata(metadata)
    }

    fn create_privacy_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        let blob = format!("{} {}", spec.goal, spec.description);
        let hits: Vec<&str> = PRIVACY_KEYWORDS
            .iter()
            .copied()
            .filter(|kw| blob.to_lowercase().contains(&kw.to_lowercase()))
            .collect();
        if hits.is_empty() {
            return Vec::new();
        }
        let fields: Vec<String> = hits.iter().map(|s| s.to_string()).collect();
        let rule = Rule::new(
            self.generated_id("privacy"),
            "Forbidden privacy-sensitive field access",
            RuleCategory::Data,
            RuleSource::Generated,
            RuleCondition::predicate(move |ctx| {
                let operation = ctx.get("field").and_then(Value::as_str).unwrap_or("");
                fields.iter().any(|f| operation.to_lowercase().contains(&f.to_lowercase()))
            }),
            RuleAction::RejectDecision,
            5,
        )
        .with_description("Rejects decisions that touch privacy-sensitive fields implied by the goal/description.")
        .with_metadata(json!({"matched_keywords": hits}).as_object().unwrap().clone());
        vec![rule]
    }

    fn create_time_constraint_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        if !contains_any(&format!("{} {}", spec.goal, spec.description), TIME_KEYWORDS) {
            return Vec::new();
        }
        let timeout = spec.timeout_seconds.max(1);
        vec![Rule::new(
            self.generated_id("time_constraint"),
            "Time-sensitive goal constraint",
            RuleCategory::Execution,
            RuleSource::Generated,
            RuleCondition::expr(format!("node_duration_seconds > {timeout}")),
            RuleAction::ForceTerminate,
            15,
        )
        .with_description("The goal text implies a time constraint; enforce the derived timeout.")]
    }

    /// Combines the goal-alignment, privacy, and time-constraint rules a
    /// free-text user goal implies.
    pub fn generate_from_user_input(&self, spec: &UserInputSpec) -> Vec<Rule> {
        let mut rules = vec![self.create_goal_alignment_rule(spec)];
        rules.extend(self.create_privacy_rules(spec));
        rules.extend(self.create_time_constraint_rules(spec));
        rules
    }

    fn create_tool_config_rule(&self, tool: &str, config: &ToolConfig) -> Option<Rule> {
        if config.forbidden_operations.is_empty() {
            return None;
        }
        let forbidden: Vec<String> = config
            .forbidden_operations
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        let tool_owned = tool.to_string();
        Some(
            Rule::new(
                self.generated_id("tool"),
                format!("Forbidden operations for tool {tool}"),
                RuleCategory::Tool,
                RuleSource::Generated,
                RuleCondition::predicate(move |ctx| {
                    let matches_tool = ctx
                        .get("tool")
                        .and_then(Value::as_str)
                        .map(|t| t == tool_owned)
                        .unwrap_or(false);
                    if !matches_tool {
                        return false;
                    }
                    let operation = ctx
                        .get("operation")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_lowercase();
                    forbidden.iter().any(|f| operation.contains(f.as_str()))
                }),
                RuleAction::RejectDecision,
                5,
            )
            .with_description("Rejects a call to this tool's forbidden operations.")
            .with_metadata(
                json!({"forbidden_operations": config.forbidden_operations})
                    .as_object()
                    .unwrap()
                    .clone(),
            ),
        )
    }

    /// One rule per `tool_configs` entry that declares forbidden
    /// operations.
    pub fn generate_tool_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        spec.tool_configs
            .iter()
            .filter_map(|(tool, cfg)| self.create_tool_config_rule(tool, cfg))
            .collect()
    }

    /// Iteration/timeout rules derived directly from the agent config
    /// rather than free text.
    pub fn generate_execution_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        let mut rules = Vec::new();
        if spec.max_iterations > 0 {
            rules.push(
                Rule::new(
                    self.generated_id("exec_iterations"),
                    "Generated max-iterations limit",
                    RuleCategory::Execution,
                    RuleSource::Generated,
                    RuleCondition::expr(format!("iteration_count > {}", spec.max_iterations)),
                    RuleAction::ForceTerminate,
                    10,
                )
                .with_description("Agent-config-derived iteration budget."),
            );
        }
        if spec.timeout_seconds > 0 {
            rules.push(
                Rule::new(
                    self.generated_id("exec_timeout"),
                    "Generated per-node timeout",
                    RuleCategory::Execution,
                    RuleSource::Generated,
                    RuleCondition::expr(format!(
                        "node_duration_seconds > {}",
                        spec.timeout_seconds
                    )),
                    RuleAction::ForceTerminate,
                    10,
                )
                .with_description("Agent-config-derived per-node timeout."),
            );
        }
        rules
    }

    /// Restricts tool usage to `allowed_tools`, one rule covering the whole
    /// allow-list.
    pub fn generate_behavior_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        if spec.allowed_tools.is_empty() {
            return Vec::new();
        }
        let allowed = spec.allowed_tools.clone();
        vec![Rule::new(
            self.generated_id("behavior_tool_allowlist"),
            "Tool allow-list",
            RuleCategory::Behavior,
            RuleSource::Generated,
            RuleCondition::predicate(move |ctx| {
                let tool = ctx.get("tool").and_then(Value::as_str).unwrap_or("");
                !tool.is_empty() && !allowed.iter().any(|t| t == tool)
            }),
            RuleAction::RejectDecision,
            8,
        )
        .with_description("Rejects use of any tool outside the agent's allowed_tools list.")]
    }

    /// All rules this generator would derive from `spec`: goal-alignment +
    /// privacy + time-constraint + tool + execution + behavior.
    pub fn generate_all_rules(&self, spec: &UserInputSpec) -> Vec<Rule> {
        let mut rules = self.generate_from_user_input(spec);
        rules.extend(self.generate_tool_rules(spec));
        rules.extend(self.generate_execution_rules(spec));
        rules.extend(self.generate_behavior_rules(spec));
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonym_group_matches_related_keywords() {
        let checker = GoalAlignmentChecker::new(0.5);
        let score = checker.check_alignment("销售数据", "分析订单趋势", None);
        assert!(score > 0.0, "expected some alignment via synonym group, got {score}");
    }

    #[test]
    fn dangerous_action_is_penalized() {
        let checker = GoalAlignmentChecker::new(0.5);
        let aligned = checker.check_alignment("生成报表", "生成报表", None);
        let dangerous = checker.check_alignment("生成报表", "delete all records", None);
        assert!(dangerous < aligned);
    }

    #[test]
    fn generate_from_user_input_includes_goal_alignment_rule() {
        let spec = UserInputSpec {
            start: "销售数据".to_string(),
            goal: "生成报表".to_string(),
            ..Default::default()
        };
        let generator = RuleGenerator::new();
        let rules = generator.generate_from_user_input(&spec);
        assert!(rules
            .iter()
            .any(|r| r.category == RuleCategory::Goal && r.source == RuleSource::Generated));
    }

    #[test]
    fn deviation_reason_explains_low_score() {
        let checker = GoalAlignmentChecker::new(0.9);
        let reason = checker.get_deviation_reason("生成报表", "完全无关的操作xyz");
        assert!(reason.is_some());
    }
}
