use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use rulewise_core::RuleRefinement;

use crate::engine::{self, ModelGateway};
use crate::parser::{amount_text, mentions_vip, percentage};
use crate::{parse, prompt, FallbackReason, Origin, Sourced, StageError};

pub const TOO_SHORT: &str = "Rule is too short to be meaningful. Please provide more details.";
pub const GIBBERISH: &str = "This appears to be gibberish. Please enter a meaningful business rule \
like \"If order value is over $100, apply 10% discount\".";
pub const INCOMPLETE: &str = "This doesn't appear to be a complete business rule. Please include a \
condition (if/when) and an action (then/apply/give). Example: \"If customer is VIP, then apply 15% discount\".";

const MIN_LEN: usize = 5;

static CONDITION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:if|when|whenever|once|after|before)\b").expect("static regex")
});
static ACTION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:then|apply|give|send|set|create|update|notify|alert|discount|charge)\b")
        .expect("static regex")
});

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_gibberish(rule: &str) -> bool {
    let trimmed = rule.trim();
    let single_word = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphabetic());
    let squashed: String = rule.chars().filter(|c| !c.is_whitespace()).collect();
    let consonants_only = squashed.chars().count() >= 4 && squashed.chars().all(is_consonant);
    single_word || consonants_only
}

/// Local screen run before any model call. `Err` carries the user-facing
/// rejection message.
pub fn pre_check(rule: &str) -> Result<(), &'static str> {
    if rule.chars().count() < MIN_LEN {
        return Err(TOO_SHORT);
    }
    if is_gibberish(rule) {
        return Err(GIBBERISH);
    }
    if !CONDITION_WORD.is_match(rule) && !ACTION_WORD.is_match(rule) {
        return Err(INCOMPLETE);
    }
    Ok(())
}

pub async fn refine(gateway: &dyn ModelGateway, rule: &str) -> Sourced<RuleRefinement> {
    if let Err(message) = pre_check(rule) {
        tracing::info!(%message, "rule rejected before refinement");
        return Sourced {
            value: RuleRefinement::rejected(rule, message),
            origin: Origin::PreCheck,
        };
    }

    match from_model(gateway, rule).await {
        Ok(refinement) => {
            tracing::info!(improvements = refinement.improvements.len(), "refined rule with model");
            Sourced::model(refinement)
        }
        Err(e) => {
            let reason = e.into_reason("refine");
            Sourced::fallback(heuristic(rule, reason), reason)
        }
    }
}

/// Shape the model is asked for. Every field is optional on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelRefinement {
    improved_rule: Option<String>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

async fn from_model(gateway: &dyn ModelGateway, rule: &str) -> Result<RuleRefinement, StageError> {
    let raw = engine::request(gateway, &prompt::refine_prompt(rule)).await?;
    tracing::debug!(%raw, "refine response");
    let answer: ModelRefinement = parse::decode(&raw)?;
    let improved_rule = answer
        .improved_rule
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| rule.to_string());
    Ok(RuleRefinement {
        original_rule: rule.to_string(),
        improved_rule,
        improvements: answer.improvements,
        reasoning: answer.reasoning.unwrap_or_default(),
        is_valid: true,
        validation_message: None,
    })
}

fn degraded_reasoning(reason: FallbackReason) -> &'static str {
    match reason {
        FallbackReason::Unconfigured => {
            "Degraded mode: no AI provider is configured, so this refinement was produced from \
             local business rule templates. Configure an API key for context-aware refinements."
        }
        FallbackReason::Unavailable => {
            "Degraded mode: the AI service is temporarily unavailable, so this refinement was \
             produced from local business rule templates. Manual review recommended."
        }
        FallbackReason::Malformed => {
            "Degraded mode: the AI response could not be used, so this refinement was produced \
             from local business rule templates. Manual review recommended."
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(*n))
}

fn format_pct(pct: f64) -> String {
    if pct.fract() == 0.0 {
        format!("{pct:.0}")
    } else {
        format!("{pct}")
    }
}

/// Template-based refinement by keyword family. Reuses the rule's own
/// numbers where it has them.
pub fn heuristic(rule: &str, reason: FallbackReason) -> RuleRefinement {
    let lower = rule.to_lowercase();
    let amount = amount_text(rule);
    let pct = percentage(rule).map(format_pct);

    let (improved_rule, improvements) = if mentions_vip(rule) {
        let pct = pct.unwrap_or_else(|| "15".into());
        let threshold = amount.unwrap_or_else(|| "1000".into());
        (
            format!(
                "For customers with VIP status (lifetime purchase value exceeding ${threshold} or \
                 5+ orders in the past 12 months), apply a {pct}% discount to eligible \
                 regular-priced items, not combinable with other promotions"
            ),
            vec![
                "Defined measurable VIP criteria (purchase value and order frequency)".to_string(),
                format!("Specified the exact benefit ({pct}% discount)"),
                "Restricted eligibility to regular-priced items".to_string(),
                "Stated how the rule interacts with other promotions".to_string(),
            ],
        )
    } else if contains_any(&lower, &["discount", " off"]) {
        let pct = pct.unwrap_or_else(|| "10".into());
        let threshold = amount.unwrap_or_else(|| "100".into());
        (
            format!(
                "If the order subtotal (excluding taxes and shipping) exceeds ${threshold}, apply a \
                 {pct}% discount to eligible regular-priced items, capped at one discount per order"
            ),
            vec![
                format!("Specified an exact monetary threshold (${threshold})"),
                "Clarified the calculation basis (subtotal excluding taxes and shipping)".to_string(),
                format!("Stated the exact discount ({pct}%)"),
                "Prevented stacking with a one-discount-per-order cap".to_string(),
                "Made the rule implementation-ready with clear parameters".to_string(),
            ],
        )
    } else if contains_any(&lower, &["inventory", "stock"]) {
        let units = amount.unwrap_or_else(|| "10".into());
        (
            format!(
                "When the inventory level of any product falls below {units} units, send an email \
                 alert to the inventory managers and create a reorder notification in the system"
            ),
            vec![
                format!("Specified an exact quantity threshold ({units} units)"),
                "Defined clear actions (email alert and reorder notification)".to_string(),
                "Identified the recipients (inventory managers)".to_string(),
                "Made the rule actionable and measurable".to_string(),
            ],
        )
    } else if lower.contains("customer") {
        let threshold = amount.unwrap_or_else(|| "1000".into());
        (
            format!(
                "For customers whose lifetime purchase value exceeds ${threshold} or who placed 5+ \
                 orders in the past 12 months, {}",
                lowercase_first(rule.trim().trim_end_matches('.'))
            ),
            vec![
                "Defined the customer segment with measurable criteria".to_string(),
                "Added a time window for order history".to_string(),
                "Kept the original action while making eligibility explicit".to_string(),
            ],
        )
    } else {
        (
            format!(
                "{} [needs refinement: add specific thresholds, measurable conditions and exact \
                 action parameters]",
                rule.trim()
            ),
            vec![
                "Add specific numerical thresholds instead of vague terms".to_string(),
                "Define clear conditions with measurable criteria".to_string(),
                "Specify exact actions with concrete parameters".to_string(),
                "Include business constraints and exception handling".to_string(),
            ],
        )
    };

    RuleRefinement {
        original_rule: rule.to_string(),
        improved_rule,
        improvements,
        reasoning: degraded_reasoning(reason).to_string(),
        is_valid: true,
        validation_message: None,
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
