//! Composite operations that run several stages against one rule at once.

use serde::Serialize;

use rulewise_core::{ParsedRule, RuleRefinement, RuleStatus, ValidationResult};

use crate::{Pipeline, Sourced};

/// Everything computed when a rule is submitted or edited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAnalysis {
    pub parsed: Sourced<ParsedRule>,
    pub suggestions: Sourced<Vec<String>>,
    pub validation: Sourced<ValidationResult>,
    pub status: RuleStatus,
}

/// Feedback on a draft before it is saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePreview {
    pub recommendations: Sourced<Vec<String>>,
    pub validation: Sourced<ValidationResult>,
    pub refinement: Sourced<RuleRefinement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revalidation {
    pub suggestions: Sourced<Vec<String>>,
    pub validation: Sourced<ValidationResult>,
    pub status: RuleStatus,
}

impl RuleAnalysis {
    pub fn is_degraded(&self) -> bool {
        self.parsed.is_degraded() || self.suggestions.is_degraded() || self.validation.is_degraded()
    }
}

/// `others` with `rule` placed at `position`, or appended.
pub fn merge_at(others: &[String], rule: &str, position: Option<usize>) -> Vec<String> {
    let mut all = others.to_vec();
    let at = position.unwrap_or(all.len()).min(all.len());
    all.insert(at, rule.to_string());
    all
}

impl Pipeline {
    /// Parse, recommend and validate concurrently. `others` are the sibling
    /// rules; `position` is where `rule` sits among them when it replaces an
    /// existing one.
    pub async fn analyze(
        &self,
        rule: &str,
        others: &[String],
        position: Option<usize>,
    ) -> RuleAnalysis {
        let all = merge_at(others, rule, position);
        let (parsed, suggestions, validation) = tokio::join!(
            self.parse(rule),
            self.recommend(rule, others),
            self.validate(&all),
        );
        let status = RuleStatus::from_validation(&validation.value);
        tracing::info!(status = status.as_str(), origin = ?parsed.origin, "analyzed rule");
        RuleAnalysis {
            parsed,
            suggestions,
            validation,
            status,
        }
    }

    pub async fn preview(&self, rule: &str, existing: &[String]) -> RulePreview {
        let all = merge_at(existing, rule, None);
        let (recommendations, validation, refinement) = tokio::join!(
            self.recommend(rule, existing),
            self.validate(&all),
            self.refine(rule),
        );
        RulePreview {
            recommendations,
            validation,
            refinement,
        }
    }

    /// Re-run recommendation and validation for `rules[index]` against the
    /// full current list. `None` if `index` is out of range.
    pub async fn revalidate(&self, rules: &[String], index: usize) -> Option<Revalidation> {
        let rule = rules.get(index)?;
        let siblings: Vec<String> = rules
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, r)| r.clone())
            .collect();
        let (suggestions, validation) =
            tokio::join!(self.recommend(rule, &siblings), self.validate(rules));
        let status = RuleStatus::from_validation(&validation.value);
        Some(Revalidation {
            suggestions,
            validation,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::testing::StubGateway;
    use crate::Origin;
    use pretty_assertions::assert_eq;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_keeps_position() {
        let others = texts(&["a", "c"]);
        assert_eq!(merge_at(&others, "b", Some(1)), texts(&["a", "b", "c"]));
        assert_eq!(merge_at(&others, "z", None), texts(&["a", "c", "z"]));
        assert_eq!(merge_at(&others, "z", Some(9)), texts(&["a", "c", "z"]));
    }

    #[tokio::test]
    async fn analyze_derives_status_from_validation() {
        let stub = StubGateway::by_template(&[
            ("parse", r#"{"condition":"order_value > 100","action":"apply_discount"}"#),
            ("recommend", r#"["Cap the discount"]"#),
            ("validate", r#"{"valid":true,"conflicts":["Rule 1 and Rule 2 overlap"]}"#),
        ]);
        let pipeline = Pipeline::new(Arc::new(stub));
        let a = pipeline
            .analyze(
                "If order is over $100, apply 10% discount",
                &texts(&["VIP get 15% off"]),
                None,
            )
            .await;
        assert_eq!(a.parsed.origin, Origin::Model);
        assert_eq!(a.suggestions.value, vec!["Cap the discount"]);
        assert_eq!(a.status, RuleStatus::Error);
        assert!(!a.is_degraded());
    }

    #[tokio::test]
    async fn unconfigured_analysis_is_degraded_but_complete() {
        let pipeline = Pipeline::new(Arc::new(StubGateway::unconfigured()));
        let a = pipeline.analyze("If order is over $100, apply 10% discount", &[], None).await;
        assert!(a.is_degraded());
        assert_eq!(a.parsed.value.action, "apply_discount");
        assert!(!a.suggestions.value.is_empty());
        assert_eq!(a.status, RuleStatus::Valid);
    }

    #[tokio::test]
    async fn preview_runs_refinement_pre_check() {
        let pipeline = Pipeline::new(Arc::new(StubGateway::failing()));
        let p = pipeline.preview("qwrtypl", &[]).await;
        assert_eq!(p.refinement.origin, Origin::PreCheck);
        assert!(!p.recommendations.value.is_empty());
    }

    #[tokio::test]
    async fn revalidate_out_of_range() {
        let pipeline = Pipeline::new(Arc::new(StubGateway::failing()));
        assert!(pipeline.revalidate(&texts(&["a"]), 3).await.is_none());
        let r = pipeline.revalidate(&texts(&["When stock is low, notify"]), 0).await.unwrap();
        assert_eq!(r.status, RuleStatus::Valid);
    }
}
