pub mod analysis;
pub mod connection;
pub mod engine;
mod modify;
pub mod parse;
pub mod parser;
pub mod prompt;
mod recommend;
pub mod refiner;
pub mod tracker;
mod validator;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use rulewise_core::{AiSettings, ParsedRule, RuleRefinement, ValidationResult};

pub use analysis::{Revalidation, RuleAnalysis, RulePreview};
pub use connection::ConnectionCheck;
pub use engine::{GatewayError, LlmGateway, ModelGateway, Prompt};
pub use parse::SanitizeError;
pub use tracker::{AnalysisTracker, Ticket};

/// Why a stage answered from its local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No credential configured; the model was not called.
    Unconfigured,
    /// The call failed or timed out.
    Unavailable,
    /// The model answered but the answer could not be used.
    Malformed,
}

/// Where a pipeline result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum Origin {
    Model,
    Fallback(FallbackReason),
    /// Rejected by the refiner's local pre-check before any model call.
    PreCheck,
    /// Answered locally without needing the model.
    Local,
}

impl Origin {
    pub fn is_degraded(self) -> bool {
        matches!(self, Origin::Fallback(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Sourced<T> {
    pub fn model(value: T) -> Self {
        Self { value, origin: Origin::Model }
    }

    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Self {
            value,
            origin: Origin::Fallback(reason),
        }
    }

    pub fn local(value: T) -> Self {
        Self { value, origin: Origin::Local }
    }

    pub fn is_degraded(&self) -> bool {
        self.origin.is_degraded()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Failure of a stage's model path. Never escapes the crate: every stage
/// turns it into a fallback.
#[derive(Debug, Error)]
pub(crate) enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Malformed(#[from] SanitizeError),
    #[error("unusable response: {0}")]
    Unusable(&'static str),
}

impl StageError {
    pub(crate) fn reason(&self) -> FallbackReason {
        match self {
            StageError::Gateway(GatewayError::NotConfigured) => FallbackReason::Unconfigured,
            StageError::Gateway(_) => FallbackReason::Unavailable,
            StageError::Malformed(_) | StageError::Unusable(_) => FallbackReason::Malformed,
        }
    }

    /// Log and classify a model-path failure for `stage`.
    pub(crate) fn into_reason(self, stage: &'static str) -> FallbackReason {
        let reason = self.reason();
        match reason {
            FallbackReason::Unconfigured => {
                tracing::debug!(stage, "no model configured, using fallback")
            }
            _ => tracing::warn!(stage, error = %self, ?reason, "model path failed, using fallback"),
        }
        reason
    }
}

/// The rule intelligence pipeline. Every operation is infallible: model
/// failures resolve to the stage's fallback, visible through [`Origin`].
#[derive(Clone)]
pub struct Pipeline {
    gateway: Arc<dyn ModelGateway>,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Pipeline over the `llm` crate gateway.
    pub fn from_settings(settings: AiSettings) -> Self {
        Self::new(Arc::new(LlmGateway::new(settings)))
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    /// Structured form of one rule. `rule` must be non-empty.
    pub async fn parse(&self, rule: &str) -> Sourced<ParsedRule> {
        parser::parse(self.gateway.as_ref(), rule).await
    }

    pub async fn refine(&self, rule: &str) -> Sourced<RuleRefinement> {
        refiner::refine(self.gateway.as_ref(), rule).await
    }

    /// Always at least one suggestion.
    pub async fn recommend(&self, rule: &str, existing: &[String]) -> Sourced<Vec<String>> {
        recommend::recommend(self.gateway.as_ref(), rule, existing).await
    }

    pub async fn validate(&self, rules: &[String]) -> Sourced<ValidationResult> {
        validator::validate(self.gateway.as_ref(), rules).await
    }

    /// Apply a free-form edit instruction. On any failure the current text is
    /// returned unchanged.
    pub async fn modify(&self, instruction: &str, current: &str) -> Sourced<String> {
        modify::modify(self.gateway.as_ref(), instruction, current).await
    }

    /// One tiny completion to confirm the configured model answers. Sends
    /// nothing when no model is configured.
    pub async fn check_connection(&self) -> ConnectionCheck {
        connection::check(self.gateway.as_ref()).await
    }
}
