//! Node Code Generator (spec §4.11, component O): turns a [`GapAnalysis`]
//! into a ready-to-register YAML definition plus a code body, drawn from
//! a small set of safe logic templates.

use super::gap::{GapAnalysis, Language};
use crate::self_describing::{ExecutorType, NodeDefinition};

/// The output of [`Generator::generate`]: a parsed [`NodeDefinition`]
/// ready to serialize, plus the code body for its companion script.
#[derive(Debug, Clone)]
pub struct GeneratedNode {
    pub definition: NodeDefinition,
    pub code: String,
    pub language: Language,
}

/// One of the fixed logic templates the generator knows how to emit
/// (spec §4.11): moving average, sum, fibonacci, safe divide, or a
/// generic parameter echo when nothing more specific matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    MovingAverage,
    SumValues,
    Fibonacci,
    SafeDivide,
    Echo,
}

fn template_for(node_name: &str) -> Template {
    match node_name {
        "moving_average" => Template::MovingAverage,
        "sum_values" => Template::SumValues,
        "fibonacci" => Template::Fibonacci,
        "safe_divide" => Template::SafeDivide,
        _ => Template::Echo,
    }
}

/// Produces a [`NodeDefinition`] and code body from a [`GapAnalysis`].
/// Generated code never does file or network I/O and never names a
/// forbidden import/builtin — enforced by
/// [`crate::executor::contains_forbidden_token`] in tests, since the
/// template set is small and fixed.
pub struct Generator;

impl Generator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, analysis: &GapAnalysis) -> Option<GeneratedNode> {
        if !analysis.has_gap {
            return None;
        }
        let name = analysis.suggested_node_name.clone()?;
        let language = analysis.suggested_language.unwrap_or(Language::Python);
        let template = template_for(&name);

        let (code, parameters, description) = match (template, language) {
            (Template::MovingAverage, _) => (
                PYTHON_MOVING_AVERAGE.to_string(),
                vec![param("values", true), param("window_size", false)],
                "Computes a trailing moving average over a numeric series.",
            ),
            (Template::SumValues, Language::Python) => (
                PYTHON_SUM.to_string(),
                vec![param("values", true)],
                "Sums a numeric series.",
            ),
            (Template::SumValues, Language::Javascript) => (
                JS_SUM.to_string(),
                vec![param("values", true)],
                "Sums a numeric series.",
            ),
            (Template::Fibonacci, _) => (
                PYTHON_FIBONACCI.to_string(),
                vec![param("n", true)],
                "Computes the nth Fibonacci number.",
            ),
            (Template::SafeDivide, _) => (
                PYTHON_SAFE_DIVIDE.to_string(),
                vec![param("numerator", true), param("denominator", true)],
                "Divides two numbers, returning zero instead of raising on division by zero.",
            ),
            (Template::Echo, _) => (
                PYTHON_ECHO.to_string(),
                analysis
                    .inferred_parameters
                    .iter()
                    .map(|p| param(p, true))
                    .collect(),
                "Generic generated node: echoes its declared parameters.",
            ),
        };

        let definition = NodeDefinition {
            name: name.clone(),
            kind: "node".to_string(),
            description: description.to_string(),
            version: "0.1.0".to_string(),
            author: "codegen".to_string(),
            tags: vec!["generated".to_string()],
            category: "generated".to_string(),
            executor_type: ExecutorType::Code,
            language: Some(if language == Language::Python { "python".to_string() } else { "javascript".to_string() }),
            parameters,
            returns: None,
            nested: None,
            error_strategy: Default::default(),
            execution: Default::default(),
            output_aggregation: Default::default(),
        };

        Some(GeneratedNode { definition, code, language })
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

fn param(name: &str, required: bool) -> crate::self_describing::definition::ParameterSpec {
    crate::self_describing::definition::ParameterSpec {
        name: name.to_string(),
        param_type: None,
        required,
        default: None,
        description: None,
    }
}

const PYTHON_MOVING_AVERAGE: &str = r#"window = window_size if window_size else 3
series = values[-window:] if len(values) >= window else values
output_data = {"average": sum(series) / len(series) if series else 0}
"#;

const PYTHON_SUM: &str = r#"output_data = {"total": sum(values)}
"#;

const JS_SUM: &str = r#"const total = values.reduce((acc, v) => acc + v, 0);
output_data = { total };
"#;

const PYTHON_FIBONACCI: &str = r#"def _fib(k):
    a, b = 0, 1
    for _ in range(k):
        a, b = b, a + b
    return a

output_data = {"value": _fib(n)}
"#;

const PYTHON_SAFE_DIVIDE: &str = r#"output_data = {"quotient": numerator / denominator if denominator else 0}
"#;

const PYTHON_ECHO: &str = r#"output_data = dict(input_data)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::gap::GapAnalyzer;
    use crate::executor::contains_forbidden_token;

    #[test]
    fn no_gap_generates_nothing() {
        let generator = Generator::new();
        let analysis = GapAnalysis {
            has_gap: false,
            suggested_node_name: None,
            suggested_language: None,
            inferred_parameters: Vec::new(),
            missing_capabilities: Vec::new(),
            confidence: 0.0,
        };
        assert!(generator.generate(&analysis).is_none());
    }

    #[test]
    fn moving_average_gap_generates_clean_code() {
        let analyzer = GapAnalyzer::new();
        let analysis = analyzer.analyze("compute a moving average", &[]);
        let generator = Generator::new();
        let generated = generator.generate(&analysis).expect("generates");
        assert_eq!(generated.definition.name, "moving_average");
        assert!(contains_forbidden_token(&generated.code).is_none());
    }

    #[test]
    fn every_template_passes_the_security_check() {
        let generator = Generator::new();
        for name in ["moving_average", "sum_values", "fibonacci", "safe_divide", "custom_node"] {
            let analysis = GapAnalysis {
                has_gap: true,
                suggested_node_name: Some(name.to_string()),
                suggested_language: Some(Language::Python),
                inferred_parameters: vec!["input".to_string()],
                missing_capabilities: vec![name.to_string()],
                confidence: 0.6,
            };
            let generated = generator.generate(&analysis).expect("generates");
            assert!(contains_forbidden_token(&generated.code).is_none(), "template for {name} failed security check");
        }
    }
}
