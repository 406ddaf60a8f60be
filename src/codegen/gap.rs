//! Node Gap Analyzer (spec §4.11, component O): the first stage of the
//! code-generation pipeline — decides whether a task description names a
//! capability no registered node already covers.

use serde::{Deserialize, Serialize};

/// Capability keywords a registered node is presumed to already cover,
/// matched case-insensitively as substrings of the task description.
const KNOWN_CAPABILITY_KEYWORDS: &[&str] = &[
    "llm", "api", "http", "request", "knowledge", "classify", "template", "mcp", "file", "human",
];

/// DOM/browser-flavored terms that tip the language heuristic toward
/// JavaScript; anything else defaults to Python (spec §4.11).
const WEB_TERMS: &[&str] = &["dom", "浏览器", "网页", "html", "css", "browser", "javascript", "js", "document.", "window."];

/// The analyzer's verdict on one task description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub has_gap: bool,
    pub suggested_node_name: Option<String>,
    pub suggested_language: Option<Language>,
    pub inferred_parameters: Vec<String>,
    pub missing_capabilities: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
}

/// Inspects a task description against the registered node names already
/// in the system; emits a gap verdict the [`super::generator::Generator`]
/// consumes.
pub struct GapAnalyzer;

impl GapAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// `registered_node_names` are existing node identifiers (by
    /// convention, snake_case capability names) already available to the
    /// workflow; a description is considered covered if any known
    /// capability keyword it contains also names a registered node.
    pub fn analyze(&self, task_description: &str, registered_node_names: &[String]) -> GapAnalysis {
        let lower = task_description.to_lowercase();

        let covers_existing = KNOWN_CAPABILITY_KEYWORDS
            .iter()
            .any(|kw| lower.contains(kw) && registered_node_names.iter().any(|n| n.to_lowercase().contains(kw)));

        if covers_existing {
            return GapAnalysis {
                has_gap: false,
                suggested_node_name: None,
                suggested_language: None,
                inferred_parameters: Vec::new(),
                missing_capabilities: Vec::new(),
                confidence: 0.0,
            };
        }

        let suggested_language = if WEB_TERMS.iter().any(|t| lower.contains(t)) {
            Language::Javascript
        } else {
            Language::Python
        };

        let suggested_node_name = Self::suggest_node_name(&lower);
        let inferred_parameters = Self::infer_parameters(&lower);
        let missing_capabilities = vec![suggested_node_name.clone()];

        GapAnalysis {
            has_gap: true,
            suggested_node_name: Some(suggested_node_name),
            suggested_language: Some(suggested_language),
            inferred_parameters,
            missing_capabilities,
            confidence: 0.6,
        }
    }

    fn suggest_node_name(lower: &str) -> String {
        const TEMPLATE_KEYWORDS: &[(&str, &str)] = &[
            ("moving average", "moving_average"),
            ("移动平均", "moving_average"),
            ("fibonacci", "fibonacci"),
            ("斐波那契", "fibonacci"),
            ("sum", "sum_values"),
            ("求和", "sum_values"),
            ("divide", "safe_divide"),
            ("除法", "safe_divide"),
        ];
        TEMPLATE_KEYWORDS
            .iter()
            .find(|(kw, _)| lower.contains(kw))
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| "custom_node".to_string())
    }

    fn infer_parameters(lower: &str) -> Vec<String> {
        let mut params = Vec::new();
        if lower.contains("window") || lower.contains("窗口") {
            params.push("window_size".to_string());
        }
        if lower.contains("values") || lower.contains("数值") || lower.contains("数据") {
            params.push("values".to_string());
        }
        if params.is_empty() {
            params.push("input".to_string());
        }
        params
    }
}

impl Default for GapAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_capability_with_matching_node_has_no_gap() {
        let analyzer = GapAnalyzer::new();
        let result = analyzer.analyze("call an http api", &["http_api_caller".to_string()]);
        assert!(!result.has_gap);
    }

    #[test]
    fn unmatched_capability_suggests_node_and_python() {
        let analyzer = GapAnalyzer::new();
        let result = analyzer.analyze("compute a moving average over the values", &[]);
        assert!(result.has_gap);
        assert_eq!(result.suggested_node_name.as_deref(), Some("moving_average"));
        assert_eq!(result.suggested_language, Some(Language::Python));
    }

    #[test]
    fn web_terms_suggest_javascript() {
        let analyzer = GapAnalyzer::new();
        let result = analyzer.analyze("manipulate the DOM of the webpage", &[]);
        assert_eq!(result.suggested_language, Some(Language::Javascript));
    }
}
