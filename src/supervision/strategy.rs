//! Strategy Repository (spec component L): named intervention strategies
//! keyed by the trigger condition they fire on, grounded on the source's
//! `StrategyRepository`.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A registered response to a named trigger condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub trigger_conditions: Vec<String>,
    pub action: String,
    pub priority: i32,
    pub action_params: Map<String, Value>,
    pub enabled: bool,
}

/// In-memory CRUD store of [`Strategy`] values, matched by trigger
/// condition and returned in ascending-priority order.
#[derive(Default)]
pub struct StrategyRepository {
    strategies: Mutex<FxHashMap<String, Strategy>>,
}

impl StrategyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new strategy, generating a `strategy_{12 hex chars}` id.
    pub fn register(
        &self,
        name: impl Into<String>,
        trigger_conditions: Vec<String>,
        action: impl Into<String>,
        priority: i32,
        action_params: Option<Map<String, Value>>,
    ) -> String {
        let id = format!("strategy_{}", uuid::Uuid::new_v4().simple().to_string().chars().take(12).collect::<String>());
        let strategy = Strategy {
            id: id.clone(),
            name: name.into(),
            trigger_conditions,
            action: action.into(),
            priority,
            action_params: action_params.unwrap_or_default(),
            enabled: true,
        };
        self.strategies.lock().insert(id.clone(), strategy);
        id
    }

    pub fn get(&self, strategy_id: &str) -> Option<Strategy> {
        self.strategies.lock().get(strategy_id).cloned()
    }

    pub fn list_all(&self) -> Vec<Strategy> {
        self.strategies.lock().values().cloned().collect()
    }

    /// Enabled strategies whose `trigger_conditions` contain `condition`,
    /// ascending by priority (lower fires first).
    pub fn find_by_condition(&self, condition: &str) -> Vec<Strategy> {
        let mut matches: Vec<Strategy> = self
            .strategies
            .lock()
            .values()
            .filter(|s| s.enabled && s.trigger_conditions.iter().any(|c| c == condition))
            .cloned()
            .collect();
        matches.sort_by_key(|s| s.priority);
        matches
    }

    pub fn delete(&self, strategy_id: &str) -> bool {
        self.strategies.lock().remove(strategy_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_find_by_condition() {
        let repo = StrategyRepository::new();
        repo.register("slow-path-warn", vec!["slow_execution".to_string()], "warn", 20, None);
        repo.register("slow-path-terminate", vec!["slow_execution".to_string()], "terminate", 5, None);

        let matches = repo.find_by_condition("slow_execution");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].action, "terminate");
        assert_eq!(matches[1].action, "warn");
    }

    #[test]
    fn delete_removes_and_reports_presence() {
        let repo = StrategyRepository::new();
        let id = repo.register("s1", vec!["x".to_string()], "warn", 10, None);
        assert!(repo.delete(&id));
        assert!(!repo.delete(&id));
        assert!(repo.get(&id).is_none());
    }

    #[test]
    fn unmatched_condition_returns_empty() {
        let repo = StrategyRepository::new();
        repo.register("s1", vec!["x".to_string()], "warn", 10, None);
        assert!(repo.find_by_condition("y").is_empty());
    }
}
