//! Workflow Efficiency Monitor (spec component L): tracks per-node
//! resource usage and latency, and raises threshold alerts — grounded on
//! the source's `WorkflowEfficiencyMonitor`.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Thresholds an alert fires past (spec §4.9); defaults mirror
/// [`crate::config::CoordinatorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EfficiencyThresholds {
    pub max_duration_seconds: f64,
    pub max_node_duration_seconds: f64,
    pub max_memory_mb: f64,
    pub max_cpu_percent: f64,
}

impl Default for EfficiencyThresholds {
    fn default() -> Self {
        Self {
            max_duration_seconds: 300.0,
            max_node_duration_seconds: 60.0,
            max_memory_mb: 2048.0,
            max_cpu_percent: 90.0,
        }
    }
}

impl From<&crate::config::CoordinatorConfig> for EfficiencyThresholds {
    fn from(cfg: &crate::config::CoordinatorConfig) -> Self {
        Self {
            max_duration_seconds: cfg.max_workflow_duration_seconds,
            max_node_duration_seconds: cfg.max_node_duration_seconds,
            max_memory_mb: cfg.max_memory_mb,
            max_cpu_percent: cfg.max_cpu_percent,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeUsage {
    memory_mb: f64,
    cpu_percent: f64,
    duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkflowUsage {
    nodes: FxHashMap<String, NodeUsage>,
    total_duration: f64,
    max_memory: f64,
    max_cpu: f64,
}

/// One threshold breach (spec §4.9's alert dict).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficiencyAlert {
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub node_id: Option<String>,
}

/// Tracks resource usage and latency per workflow, and per node within it.
pub struct WorkflowEfficiencyMonitor {
    thresholds: EfficiencyThresholds,
    usage: Mutex<FxHashMap<String, WorkflowUsage>>,
    latency: Mutex<FxHashMap<String, FxHashMap<String, f64>>>,
}

impl WorkflowEfficiencyMonitor {
    pub fn new(thresholds: EfficiencyThresholds) -> Self {
        Self {
            thresholds,
            usage: Mutex::new(FxHashMap::default()),
            latency: Mutex::new(FxHashMap::default()),
        }
    }

    /// Records one node's resource snapshot, accumulating into the
    /// workflow's running totals (`total_duration` sums, `max_memory`/
    /// `max_cpu` take the running maximum).
    pub fn record_resource_usage(
        &self,
        workflow_id: &str,
        node_id: &str,
        memory_mb: f64,
        cpu_percent: f64,
        duration_seconds: f64,
    ) {
        let mut usage = self.usage.lock();
        let entry = usage.entry(workflow_id.to_string()).or_default();
        entry.nodes.insert(
            node_id.to_string(),
            NodeUsage { memory_mb, cpu_percent, duration_seconds },
        );
        entry.total_duration += duration_seconds;
        entry.max_memory = entry.max_memory.max(memory_mb);
        entry.max_cpu = entry.max_cpu.max(cpu_percent);
    }

    /// Records a node's wall-clock latency, kept separately from resource
    /// usage so latency can be recorded without a resource sample.
    pub fn record_latency(&self, workflow_id: &str, node_id: &str, seconds: f64) {
        self.latency
            .lock()
            .entry(workflow_id.to_string())
            .or_default()
            .insert(node_id.to_string(), seconds);
    }

    pub fn get_node_latency(&self, workflow_id: &str, node_id: &str) -> Option<f64> {
        self.latency.lock().get(workflow_id)?.get(node_id).copied()
    }

    pub fn get_workflow_total_duration(&self, workflow_id: &str) -> f64 {
        self.usage.lock().get(workflow_id).map(|u| u.total_duration).unwrap_or(0.0)
    }

    /// Checks every recorded threshold for `workflow_id`; returns an empty
    /// list for a workflow with no recorded usage rather than treating
    /// "unknown" as a breach.
    pub fn check_thresholds(&self, workflow_id: &str) -> Vec<EfficiencyAlert> {
        let usage = self.usage.lock();
        let Some(usage) = usage.get(workflow_id) else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        if usage.total_duration > self.thresholds.max_duration_seconds {
            alerts.push(EfficiencyAlert {
                alert_type: "slow_execution".to_string(),
                severity: "warning".to_string(),
                message: format!(
                    "workflow {workflow_id} total duration {:.1}s exceeds threshold {:.1}s",
                    usage.total_duration, self.thresholds.max_duration_seconds
                ),
                value: usage.total_duration,
                threshold: self.thresholds.max_duration_seconds,
                node_id: None,
            });
        }
        if usage.max_memory > self.thresholds.max_memory_mb {
            alerts.push(EfficiencyAlert {
                alert_type: "memory_overuse".to_string(),
                severity: "warning".to_string(),
                message: format!(
                    "workflow {workflow_id} peak memory {:.1}MB exceeds threshold {:.1}MB",
                    usage.max_memory, self.thresholds.max_memory_mb
                ),
                value: usage.max_memory,
                threshold: self.thresholds.max_memory_mb,
                node_id: None,
            });
        }
        if usage.max_cpu > self.thresholds.max_cpu_percent {
            alerts.push(EfficiencyAlert {
                alert_type: "cpu_overuse".to_string(),
                severity: "warning".to_string(),
                message: format!(
                    "workflow {workflow_id} peak cpu {:.1}% exceeds threshold {:.1}%",
                    usage.max_cpu, self.thresholds.max_cpu_percent
                ),
                value: usage.max_cpu,
                threshold: self.thresholds.max_cpu_percent,
                node_id: None,
            });
        }
        for (node_id, node_usage) in &usage.nodes {
            if node_usage.duration_seconds > self.thresholds.max_node_duration_seconds {
                alerts.push(EfficiencyAlert {
                    alert_type: "slow_execution".to_string(),
                    severity: "warning".to_string(),
                    message: format!(
                        "node {node_id} duration {:.1}s exceeds threshold {:.1}s",
                        node_usage.duration_seconds, self.thresholds.max_node_duration_seconds
                    ),
                    value: node_usage.duration_seconds,
                    threshold: self.thresholds.max_node_duration_seconds,
                    node_id: Some(node_id.clone()),
                });
            }
        }
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_usage_recorded_yields_no_alerts() {
        let monitor = WorkflowEfficiencyMonitor::new(EfficiencyThresholds::default());
        assert!(monitor.check_thresholds("w1").is_empty());
    }

    #[test]
    fn slow_workflow_and_slow_node_both_alert() {
        let monitor = WorkflowEfficiencyMonitor::new(EfficiencyThresholds::default());
        monitor.record_resource_usage("w1", "n1", 100.0, 10.0, 400.0);
        let alerts = monitor.check_thresholds("w1");
        assert!(alerts.iter().any(|a| a.alert_type == "slow_execution" && a.node_id.is_none()));
        assert!(alerts.iter().any(|a| a.alert_type == "slow_execution" && a.node_id.as_deref() == Some("n1")));
    }

    #[test]
    fn memory_and_cpu_overuse_detected() {
        let monitor = WorkflowEfficiencyMonitor::new(EfficiencyThresholds::default());
        monitor.record_resource_usage("w1", "n1", 4096.0, 99.0, 1.0);
        let alerts = monitor.check_thresholds("w1");
        assert!(alerts.iter().any(|a| a.alert_type == "memory_overuse"));
        assert!(alerts.iter().any(|a| a.alert_type == "cpu_overuse"));
    }

    #[test]
    fn latency_recorded_independently_of_resource_usage() {
        let monitor = WorkflowEfficiencyMonitor::new(EfficiencyThresholds::default());
        monitor.record_latency("w1", "n1", 2.5);
        assert_eq!(monitor.get_node_latency("w1", "n1"), Some(2.5));
        assert_eq!(monitor.get_workflow_total_duration("w1"), 0.0);
    }

    #[test]
    fn total_duration_accumulates_across_nodes() {
        let monitor = WorkflowEfficiencyMonitor::new(EfficiencyThresholds::default());
        monitor.record_resource_usage("w1", "n1", 1.0, 1.0, 10.0);
        monitor.record_resource_usage("w1", "n2", 1.0, 1.0, 20.0);
        assert_eq!(monitor.get_workflow_total_duration("w1"), 30.0);
    }
}
