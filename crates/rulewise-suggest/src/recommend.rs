use crate::engine::{self, ModelGateway};
use crate::{parse, prompt, Sourced, StageError};

const DISCOUNT: [&str; 5] = [
    "Specify exact discount percentage and maximum amount",
    "Define which products are eligible for the discount",
    "Add customer eligibility criteria (new vs. returning)",
    "Set expiration date or usage limits",
    "Prevent stacking with other promotional offers",
];

const ORDER: [&str; 4] = [
    "Clarify if amount includes taxes and shipping",
    "Define minimum and maximum order thresholds",
    "Add geographic restrictions if applicable",
    "Specify which payment methods are accepted",
];

const INVENTORY: [&str; 4] = [
    "Set specific quantity thresholds for alerts",
    "Define reorder points and lead times",
    "Add seasonal adjustment factors",
    "Specify which staff should receive notifications",
];

const GENERIC: [&str; 5] = [
    "Add specific numerical thresholds instead of vague terms",
    "Define clear conditions and measurable criteria",
    "Specify exact actions with parameters",
    "Consider edge cases and exception scenarios",
    "Add time-based constraints if applicable",
];

pub(crate) async fn recommend(
    gateway: &dyn ModelGateway,
    rule: &str,
    existing: &[String],
) -> Sourced<Vec<String>> {
    match from_model(gateway, rule, existing).await {
        Ok(list) => {
            tracing::info!(count = list.len(), "recommendations from model");
            Sourced::model(list)
        }
        Err(e) => Sourced::fallback(fallback(rule), e.into_reason("recommend")),
    }
}

async fn from_model(
    gateway: &dyn ModelGateway,
    rule: &str,
    existing: &[String],
) -> Result<Vec<String>, StageError> {
    let raw = engine::request(gateway, &prompt::recommend_prompt(rule, existing)).await?;
    tracing::debug!(%raw, "recommend response");
    let list: Vec<String> = parse::decode(&raw)?;
    let list: Vec<String> = list
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if list.is_empty() {
        return Err(StageError::Unusable("empty recommendation list"));
    }
    Ok(list)
}

fn mentions(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(*w))
}

/// Fixed suggestions for the first matching keyword bucket.
pub(crate) fn fallback(rule: &str) -> Vec<String> {
    let lower = rule.to_lowercase();
    let bucket: &[&str] = if mentions(&lower, &["discount", "off"]) {
        &DISCOUNT
    } else if mentions(&lower, &["order", "purchase"]) {
        &ORDER
    } else if mentions(&lower, &["inventory", "stock"]) {
        &INVENTORY
    } else {
        &GENERIC
    };
    bucket.iter().map(|s| s.to_string()).collect()
}
