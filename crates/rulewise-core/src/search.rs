use crate::{Priority, Rule, RuleStatus};

/// Narrowing applied to a rule listing. Every set field must match; an
/// empty filter keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    /// Case-insensitive text looked up in the original wording and in the
    /// serialized parsed form. Blank means no text constraint.
    pub query: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<RuleStatus>,
}

impl RuleFilter {
    pub fn is_empty(&self) -> bool {
        self.needle().is_none() && self.priority.is_none() && self.status.is_none()
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        if self.priority.is_some_and(|p| p != rule.priority) {
            return false;
        }
        if self.status.is_some_and(|s| s != rule.status) {
            return false;
        }
        match self.needle() {
            None => true,
            Some(needle) => {
                rule.original.to_lowercase().contains(&needle)
                    || serde_json::to_string(&rule.parsed)
                        .map(|parsed| parsed.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
        }
    }

    fn needle(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

/// Rules matching `filter`, in their original order.
pub fn filter_rules(rules: Vec<Rule>, filter: &RuleFilter) -> Vec<Rule> {
    if filter.is_empty() {
        return rules;
    }
    rules.into_iter().filter(|r| filter.matches(r)).collect()
}
