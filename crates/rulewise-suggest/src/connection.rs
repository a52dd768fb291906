use std::time::Instant;

use serde::Serialize;

use crate::engine::{self, GatewayError, ModelGateway};
use crate::prompt;

/// Outcome of one minimal completion sent to confirm the model answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub configured: bool,
    pub provider: String,
    pub model: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

pub(crate) async fn check(gateway: &dyn ModelGateway) -> ConnectionCheck {
    let started = Instant::now();
    let outcome = engine::request(gateway, &prompt::check_prompt()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let (success, response, error) = match outcome {
        Ok(text) => (true, Some(text.trim().to_string()), None),
        Err(e) => {
            if !matches!(e, GatewayError::NotConfigured) {
                tracing::warn!(error = %e, "model connection check failed");
            }
            (false, None, Some(e.to_string()))
        }
    };
    tracing::info!(success, elapsed_ms, "model connection check");
    ConnectionCheck {
        configured: gateway.is_configured(),
        provider: gateway.provider().to_string(),
        model: gateway.model().to_string(),
        success,
        response,
        error,
        elapsed_ms,
    }
}
