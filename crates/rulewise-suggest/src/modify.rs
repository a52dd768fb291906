use crate::engine::{self, ModelGateway};
use crate::{parse, prompt, Sourced, StageError};

pub(crate) async fn modify(
    gateway: &dyn ModelGateway,
    instruction: &str,
    current: &str,
) -> Sourced<String> {
    match from_model(gateway, instruction, current).await {
        Ok(text) => {
            tracing::info!(%instruction, "modified rule");
            Sourced::model(text)
        }
        Err(e) => Sourced::fallback(current.to_string(), e.into_reason("modify")),
    }
}

async fn from_model(
    gateway: &dyn ModelGateway,
    instruction: &str,
    current: &str,
) -> Result<String, StageError> {
    let raw = engine::request(gateway, &prompt::modify_prompt(instruction, current)).await?;
    tracing::debug!(%raw, "modify response");
    let text = parse::clean_text(&raw);
    if text.is_empty() {
        return Err(StageError::Unusable("empty modified rule"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubGateway;
    use crate::{FallbackReason, Origin};

    const CURRENT: &str = "If order is over $100, apply 10% discount";

    #[tokio::test]
    async fn quoted_answer_is_cleaned() {
        let stub = StubGateway::replying("\"If order is over $150, apply 10% discount\"\n");
        let r = modify(&stub, "raise the threshold to $150", CURRENT).await;
        assert_eq!(r.origin, Origin::Model);
        assert_eq!(r.value, "If order is over $150, apply 10% discount");
    }

    #[tokio::test]
    async fn empty_answer_keeps_current() {
        let stub = StubGateway::replying("```\n```");
        let r = modify(&stub, "raise the threshold", CURRENT).await;
        assert_eq!(r.origin, Origin::Fallback(FallbackReason::Malformed));
        assert_eq!(r.value, CURRENT);
    }

    #[tokio::test]
    async fn failure_keeps_current() {
        let stub = StubGateway::failing();
        let r = modify(&stub, "raise the threshold", CURRENT).await;
        assert_eq!(r.origin, Origin::Fallback(FallbackReason::Unavailable));
        assert_eq!(r.value, CURRENT);
    }
}
