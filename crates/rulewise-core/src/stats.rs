use serde::Serialize;

use crate::{Priority, Rule, RuleStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub valid: usize,
    pub warning: usize,
    pub error: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub total: usize,
    pub by_status: StatusBreakdown,
    pub by_priority: PriorityBreakdown,
    /// Percentage of valid rules, rounded. 100 for an empty rule set.
    pub success_rate: u32,
}

pub fn summarize(rules: &[Rule]) -> RuleStats {
    let mut by_status = StatusBreakdown::default();
    let mut by_priority = PriorityBreakdown::default();
    for rule in rules {
        match rule.status {
            RuleStatus::Valid => by_status.valid += 1,
            RuleStatus::Warning => by_status.warning += 1,
            RuleStatus::Error => by_status.error += 1,
        }
        match rule.priority {
            Priority::Low => by_priority.low += 1,
            Priority::Medium => by_priority.medium += 1,
            Priority::High => by_priority.high += 1,
            Priority::Critical => by_priority.critical += 1,
        }
    }
    let success_rate = if rules.is_empty() {
        100
    } else {
        ((by_status.valid as f64 / rules.len() as f64) * 100.0).round() as u32
    };
    RuleStats {
        total: rules.len(),
        by_status,
        by_priority,
        success_rate,
    }
}
