//! Runtime configuration for the coordination stack.
//!
//! Mirrors the teacher's `runtimes::runtime_config` convention: a plain
//! struct with sane defaults and a `from_env` constructor that overlays
//! environment variables loaded via `dotenvy`.

use std::env;
use std::time::Duration;

/// Tunables for the default rule set, goal alignment, efficiency monitor,
/// and retry policy. Individual components may still be constructed with
/// their own explicit values; this struct only supplies defaults for the
/// convenience constructors (`RuleEngine::default`, `AppRunner`-style
/// wiring, etc.).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Max ReAct-style iterations before `FORCE_TERMINATE` (default rule).
    pub max_iterations: u64,
    /// Max cumulative tokens before `FORCE_TERMINATE` (default rule).
    pub max_tokens: u64,
    /// Goal alignment score below which a `SUGGEST_CORRECTION` fires.
    pub goal_alignment_threshold: f64,
    /// Per-node wall-clock timeout before `FORCE_TERMINATE` (default rule).
    pub node_timeout_seconds: u64,
    /// Efficiency monitor thresholds.
    pub max_workflow_duration_seconds: f64,
    pub max_node_duration_seconds: f64,
    pub max_memory_mb: f64,
    pub max_cpu_percent: f64,
    /// Conversation supervision stability check: max input length before
    /// a `context_overflow` issue fires.
    pub max_input_length: usize,
    /// Default sandbox timeout for code-generation self-tests.
    pub sandbox_timeout: Duration,
    /// Default node retry policy.
    pub default_max_retries: u32,
    pub default_retry_base_delay: Duration,
    pub default_retry_backoff_factor: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_tokens: 10_000,
            goal_alignment_threshold: 0.5,
            node_timeout_seconds: 60,
            max_workflow_duration_seconds: 300.0,
            max_node_duration_seconds: 60.0,
            max_memory_mb: 2048.0,
            max_cpu_percent: 90.0,
            max_input_length: 50_000,
            sandbox_timeout: Duration::from_secs(5),
            default_max_retries: 2,
            default_retry_base_delay: Duration::from_millis(100),
            default_retry_backoff_factor: 2.0,
        }
    }
}

impl CoordinatorConfig {
    /// Build a config from `Coordinator__*` environment variables, falling
    /// back to defaults for anything unset or unparsable. Call
    /// `dotenvy::dotenv().ok()` before this if a `.env` file should be
    /// consulted (left to the binary's `main`, per the teacher's pattern of
    /// keeping config loading out of library code paths that don't need it).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_or("COORDINATOR_MAX_ITERATIONS", defaults.max_iterations),
            max_tokens: env_or("COORDINATOR_MAX_TOKENS", defaults.max_tokens),
            goal_alignment_threshold: env_or(
                "COORDINATOR_GOAL_ALIGNMENT_THRESHOLD",
                defaults.goal_alignment_threshold,
            ),
            node_timeout_seconds: env_or(
                "COORDINATOR_NODE_TIMEOUT_SECONDS",
                defaults.node_timeout_seconds,
            ),
            max_workflow_duration_seconds: env_or(
                "COORDINATOR_MAX_WORKFLOW_DURATION_SECONDS",
                defaults.max_workflow_duration_seconds,
            ),
            max_node_duration_seconds: env_or(
                "COORDINATOR_MAX_NODE_DURATION_SECONDS",
                defaults.max_node_duration_seconds,
            ),
            max_memory_mb: env_or("COORDINATOR_MAX_MEMORY_MB", defaults.max_memory_mb),
            max_cpu_percent: env_or("COORDINATOR_MAX_CPU_PERCENT", defaults.max_cpu_percent),
            max_input_length: env_or("COORDINATOR_MAX_INPUT_LENGTH", defaults.max_input_length),
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Initialize a `tracing-subscriber` registry honoring `RUST_LOG`, with
/// `tracing-error`'s `ErrorLayer` installed so `miette::Diagnostic`s built
/// from `CoordinatorError` can capture a span trace. Mirrors the teacher's
/// `errors_pretty` example setup; safe to call more than once (errors from a
/// second call are swallowed).
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_default_rule_set() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.max_tokens, 10_000);
        assert!((cfg.goal_alignment_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.node_timeout_seconds, 60);
    }
}
