use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Number, Value};

use rulewise_core::ParsedRule;

use crate::engine::{self, ModelGateway};
use crate::{parse, prompt, Sourced, StageError};

static PERCENT_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:discount|off)\b").expect("static regex")
});
static DOLLAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?(\d+(?:,\d{3})*(?:\.\d+)?)").expect("static regex"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:,\d{3})*(?:\.\d+)?)(\s*%)?").expect("static regex"));
static VIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bvip\b").expect("static regex"));
static OVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:over|above|exceeds?|exceeding|more than|greater than)\b")
        .expect("static regex")
});
static BELOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:below|under|less than|fewer than)\b").expect("static regex")
});
static DISCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bdiscount").expect("static regex"));
static ALERT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:alert|notify)").expect("static regex"));
static FREE_SHIPPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfree shipping\b").expect("static regex"));

pub async fn parse(gateway: &dyn ModelGateway, rule: &str) -> Sourced<ParsedRule> {
    match from_model(gateway, rule).await {
        Ok(parsed) => {
            tracing::info!(action = %parsed.action, "parsed rule with model");
            Sourced::model(parsed)
        }
        Err(e) => Sourced::fallback(fallback(rule), e.into_reason("parse")),
    }
}

async fn from_model(gateway: &dyn ModelGateway, rule: &str) -> Result<ParsedRule, StageError> {
    let raw = engine::request(gateway, &prompt::parse_prompt(rule)).await?;
    tracing::debug!(%raw, "parse response");
    Ok(parse::decode(&raw)?)
}

/// A number captured from rule text: its canonical spelling and value.
#[derive(Debug, Clone, PartialEq)]
struct Amount {
    text: String,
    value: Value,
}

impl Amount {
    fn from_capture(raw: &str) -> Option<Self> {
        let text = raw.replace(',', "");
        let value = if let Ok(n) = text.parse::<u64>() {
            Value::from(n)
        } else {
            let f = text.parse::<f64>().ok()?;
            Value::Number(Number::from_f64(f)?)
        };
        Some(Self { text, value })
    }
}

/// Discount percentage in "N% discount" / "N% off".
pub(crate) fn percentage(rule: &str) -> Option<f64> {
    PERCENT_OFF
        .captures(rule)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn percentage_value(rule: &str) -> Option<Value> {
    PERCENT_OFF
        .captures(rule)
        .and_then(|c| c.get(1))
        .and_then(|m| Amount::from_capture(m.as_str()))
        .map(|a| a.value)
}

/// First `$N`, else the first number that is not a percentage.
fn amount(rule: &str) -> Option<Amount> {
    if let Some(m) = DOLLAR.captures(rule).and_then(|c| c.get(1)) {
        return Amount::from_capture(m.as_str());
    }
    NUMBER
        .captures_iter(rule)
        .filter(|c| c.get(2).is_none())
        .find_map(|c| c.get(1).and_then(|m| Amount::from_capture(m.as_str())))
}

/// Numeric threshold as text, used by the refiner's templates.
pub(crate) fn amount_text(rule: &str) -> Option<String> {
    amount(rule).map(|a| a.text)
}

pub(crate) fn mentions_vip(rule: &str) -> bool {
    VIP.is_match(rule)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn comparison(field: &str, operator: &str, value: Value) -> Value {
    json!({ "field": field, "operator": operator, "value": value })
}

/// Deterministic heuristic extraction, used whenever the model path fails.
/// Pure: the same text always yields the same structure.
pub fn fallback(rule: &str) -> ParsedRule {
    let discount = percentage(rule);
    let amount = amount(rule);
    let is_vip = mentions_vip(rule);
    let has_over = OVER.is_match(rule);
    let has_below = BELOW.is_match(rule);

    let mut parameters = Map::new();
    let action = if DISCOUNT.is_match(rule) {
        if let Some(v) = percentage_value(rule) {
            parameters.insert("discount_percentage".into(), v);
        }
        "apply_discount"
    } else if ALERT.is_match(rule) {
        "send_alert"
    } else if FREE_SHIPPING.is_match(rule) {
        "apply_free_shipping"
    } else {
        "unknown"
    };

    if let Some(a) = &amount {
        parameters.insert("threshold_amount".into(), a.value.clone());
    }
    if is_vip {
        parameters.insert("customer_status".into(), Value::from("VIP"));
    }

    let then_value = discount
        .and_then(|d| Number::from_f64(d / 100.0))
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(1));
    let then = json!({ "action": action, "value": then_value });

    let (condition, logic) = match (&amount, is_vip) {
        (Some(a), true) if has_over => (
            format!("customer_status == 'VIP' AND order_value > {}", a.text),
            json!({
                "if": { "and": [
                    comparison("customer_status", "==", Value::from("VIP")),
                    comparison("order_value", ">", a.value.clone()),
                ]},
                "then": then,
            }),
        ),
        (Some(a), _) if has_over => (
            format!("order_value > {}", a.text),
            json!({ "if": comparison("order_value", ">", a.value.clone()), "then": then }),
        ),
        (Some(a), _) if has_below => (
            format!("inventory_count < {}", a.text),
            json!({ "if": comparison("inventory_count", "<", a.value.clone()), "then": then }),
        ),
        (None, true) => (
            "customer_status == 'VIP'".to_string(),
            json!({ "if": comparison("customer_status", "==", Value::from("VIP")), "then": then }),
        ),
        _ => (rule.to_string(), json!({ "original": rule })),
    };

    ParsedRule {
        condition,
        action: action.to_string(),
        parameters,
        logic: object(logic),
    }
}
