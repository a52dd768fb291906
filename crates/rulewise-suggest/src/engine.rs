use std::time::Duration;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use thiserror::Error;

use rulewise_core::AiSettings;

/// One model request, produced by a [`crate::prompt::PromptTemplate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub template: &'static str,
    pub version: u32,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no language model configured")]
    NotConfigured,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("build LLM: {0}")]
    Build(String),
    #[error("chat: {0}")]
    Request(String),
    #[error("no response within {0}s")]
    Timeout(u64),
    #[error("LLM returned empty text")]
    EmptyResponse,
}

/// The model-completion collaborator. Unreliable and slow: every caller in
/// this crate has a fallback for every error.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Whether a credential is present. Stages skip the call entirely when
    /// this is false.
    fn is_configured(&self) -> bool;

    /// Provider name, for diagnostics.
    fn provider(&self) -> &str {
        ""
    }

    /// Model name, for diagnostics.
    fn model(&self) -> &str {
        ""
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError>;
}

/// Send `prompt` if the gateway is configured.
pub async fn request(gateway: &dyn ModelGateway, prompt: &Prompt) -> Result<String, GatewayError> {
    if !gateway.is_configured() {
        return Err(GatewayError::NotConfigured);
    }
    tracing::debug!(template = prompt.template, version = prompt.version, "sending prompt");
    gateway.complete(prompt).await
}

fn map_backend(provider: &str) -> Result<LLMBackend, GatewayError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(GatewayError::UnknownProvider(other.to_string())),
    }
}

/// Production gateway over the `llm` crate.
#[derive(Debug, Clone)]
pub struct LlmGateway {
    settings: AiSettings,
}

impl LlmGateway {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }
}

#[async_trait]
impl ModelGateway for LlmGateway {
    fn is_configured(&self) -> bool {
        rulewise_core::ai_configured(&self.settings)
    }

    fn provider(&self) -> &str {
        &self.settings.provider
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError> {
        let backend = map_backend(&self.settings.provider)?;
        let timeout_secs = self.settings.timeout_secs.max(1);

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.settings.model)
            .system(&prompt.system)
            .temperature(prompt.temperature)
            .timeout_seconds(timeout_secs);

        if let Some(max) = prompt.max_tokens {
            builder = builder.max_tokens(max);
        }
        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }

        let llm = builder.build().map_err(|e| GatewayError::Build(e.to_string()))?;

        let messages = vec![ChatMessage::user().content(&prompt.user).build()];

        let response = tokio::time::timeout(Duration::from_secs(timeout_secs), llm.chat(&messages))
            .await
            .map_err(|_| GatewayError::Timeout(timeout_secs))?
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GatewayError::EmptyResponse),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    enum Script {
        Reply(String),
        ByTemplate(HashMap<&'static str, String>),
        Fail,
    }

    /// Scripted gateway that counts calls and records prompts.
    pub(crate) struct StubGateway {
        script: Script,
        configured: bool,
        calls: AtomicUsize,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl StubGateway {
        fn with(script: Script, configured: bool) -> Self {
            Self {
                script,
                configured,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(vec![]),
            }
        }

        pub(crate) fn replying(text: &str) -> Self {
            Self::with(Script::Reply(text.to_string()), true)
        }

        pub(crate) fn by_template(replies: &[(&'static str, &str)]) -> Self {
            let map = replies.iter().map(|(k, v)| (*k, v.to_string())).collect();
            Self::with(Script::ByTemplate(map), true)
        }

        pub(crate) fn failing() -> Self {
            Self::with(Script::Fail, true)
        }

        pub(crate) fn unconfigured() -> Self {
            Self::with(Script::Reply("{}".to_string()), false)
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn last_prompt(&self) -> Option<Prompt> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ModelGateway for StubGateway {
        fn is_configured(&self) -> bool {
            self.configured
        }

        fn provider(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            match &self.script {
                Script::Reply(text) => Ok(text.clone()),
                Script::ByTemplate(map) => map
                    .get(prompt.template)
                    .cloned()
                    .ok_or_else(|| GatewayError::Request("no scripted reply".into())),
                Script::Fail => Err(GatewayError::Request("connection refused".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubGateway;
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            template: "parse",
            version: 1,
            system: "sys".into(),
            user: "user".into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn unconfigured_gateway_is_never_called() {
        let stub = StubGateway::unconfigured();
        let err = request(&stub, &prompt()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn configured_gateway_is_called_once() {
        let stub = StubGateway::replying("ok");
        assert_eq!(request(&stub, &prompt()).await.unwrap(), "ok");
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        assert!(matches!(map_backend("acme"), Err(GatewayError::UnknownProvider(_))));
        assert!(map_backend("anthropic").is_ok());
    }

    #[test]
    fn llm_gateway_requires_key() {
        let gw = LlmGateway::new(AiSettings {
            provider: "openai".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 10,
        });
        assert!(!gw.is_configured());
        assert_eq!(gw.provider(), "openai");
        assert_eq!(gw.model(), "gpt-4o-mini");
    }
}
