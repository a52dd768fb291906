use rulewise_core::ValidationResult;

use crate::engine::{self, ModelGateway};
use crate::{parse, prompt, FallbackReason, Sourced, StageError};

pub(crate) async fn validate(
    gateway: &dyn ModelGateway,
    rules: &[String],
) -> Sourced<ValidationResult> {
    if rules.is_empty() {
        return Sourced::local(ValidationResult::all_clear());
    }

    match from_model(gateway, rules).await {
        Ok(result) => {
            tracing::info!(
                rules = rules.len(),
                valid = result.valid,
                conflicts = result.conflicts.len(),
                "validated rule set"
            );
            Sourced::model(result)
        }
        Err(e) => {
            let reason = e.into_reason("validate");
            Sourced::fallback(fallback(reason), reason)
        }
    }
}

async fn from_model(
    gateway: &dyn ModelGateway,
    rules: &[String],
) -> Result<ValidationResult, StageError> {
    let raw = engine::request(gateway, &prompt::validate_prompt(rules)).await?;
    tracing::debug!(%raw, "validate response");
    Ok(parse::decode(&raw)?)
}

pub(crate) fn advisory(reason: FallbackReason) -> &'static str {
    match reason {
        FallbackReason::Unconfigured => "AI validation unavailable - manual review recommended",
        FallbackReason::Unavailable => {
            "AI validation temporarily unavailable - manual review recommended"
        }
        FallbackReason::Malformed => {
            "Validation completed with basic checks only - manual review recommended"
        }
    }
}

fn fallback(reason: FallbackReason) -> ValidationResult {
    ValidationResult {
        valid: true,
        conflicts: vec![],
        suggestions: vec![advisory(reason).to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubGateway;
    use crate::Origin;
    use pretty_assertions::assert_eq;

    fn rules() -> Vec<String> {
        vec!["rule A".to_string(), "rule B".to_string()]
    }

    #[tokio::test]
    async fn empty_set_is_all_clear_without_a_call() {
        let stub = StubGateway::failing();
        let r = validate(&stub, &[]).await;
        assert_eq!(r.origin, Origin::Local);
        assert_eq!(r.value, ValidationResult::all_clear());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn model_verdict_is_decoded() {
        let stub = StubGateway::replying(
            r#"{"valid": false, "conflicts": ["Rule 1 and Rule 2 both discount VIP orders"]}"#,
        );
        let r = validate(&stub, &rules()).await;
        assert_eq!(r.origin, Origin::Model);
        assert!(!r.value.valid);
        assert_eq!(r.value.conflicts.len(), 1);
        assert!(r.value.suggestions.is_empty());
        assert!(stub.last_prompt().unwrap().user.contains("2. rule B"));
    }

    #[tokio::test]
    async fn missing_valid_is_malformed() {
        let stub = StubGateway::replying(r#"{"conflicts": []}"#);
        let r = validate(&stub, &rules()).await;
        assert_eq!(r.origin, Origin::Fallback(FallbackReason::Malformed));
        assert_eq!(r.value.suggestions, vec![advisory(FallbackReason::Malformed)]);
    }

    #[tokio::test]
    async fn failure_is_valid_with_advisory() {
        let stub = StubGateway::failing();
        let r = validate(&stub, &rules()).await;
        assert!(r.value.valid);
        assert!(r.value.conflicts.is_empty());
        assert_eq!(r.value.suggestions, vec![advisory(FallbackReason::Unavailable)]);
    }
}
