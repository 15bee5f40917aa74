//! OpenAI-compatible HTTP provider
//!
//! Targets any `/chat/completions` endpoint: OpenAI itself, Ollama's HTTP
//! API, llama.cpp, LM Studio, vLLM. Transport failures are mapped to
//! actionable messages before they reach the retry layer.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::OpenAiCompatibleConfig;
use crate::constants;
use crate::error::{GenError, GenResult};
use crate::store::PreferenceStore;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// One entry from the endpoint's `/models` listing
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointModel {
    pub id: String,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<EndpointModel>,
}

/// Provider for OpenAI-compatible HTTP endpoints
#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Build a provider with the model already resolved
    pub fn new(config: &OpenAiCompatibleConfig, model: impl Into<String>) -> GenResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(GenError::validation(
                "OpenAI-compatible base URL is not configured",
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(constants::http::CONNECT_TIMEOUT)
            .timeout(constants::http::REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GenError::provider(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.into(),
        })
    }

    /// Build a provider, resolving the model when none is configured
    ///
    /// Resolution order: configured model, last used model, first model the
    /// endpoint reports. The last-used key is read-only here; nothing in the
    /// pipeline writes it yet, so it only takes effect when seeded externally.
    pub async fn from_config(
        config: &OpenAiCompatibleConfig,
        store: &dyn PreferenceStore,
        cancel: &CancellationToken,
    ) -> GenResult<Self> {
        if !config.model_name.trim().is_empty() {
            return Self::new(config, config.model_name.trim());
        }

        if let Some(last_used) = store.get(constants::prefs::OPENAI_LAST_USED_MODEL) {
            info!(model = %last_used, "using last used endpoint model");
            return Self::new(config, last_used);
        }

        let lister = Self::new(config, String::new())?;
        let models = lister.list_models(cancel).await?;
        match models.first() {
            Some(model) => {
                info!(model = %model.id, "using first model reported by endpoint");
                Self::new(config, model.id.clone())
            }
            None => Err(GenError::validation(
                "OpenAI-compatible model name is not configured and the endpoint reports no models",
            )),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    /// Send one prompt and return the full completion text
    pub async fn execute(&self, prompt: &str, cancel: &CancellationToken) -> GenResult<String> {
        if cancel.is_cancelled() {
            return Err(GenError::Cancelled);
        }
        debug!(base_url = %self.base_url, model = %self.model, "sending chat completion request");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens: 4096,
        };

        let request = self
            .authorized(self.client.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GenError::Cancelled),
            response = request => response.map_err(|err| self.map_transport_error(err))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status_error(status));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| GenError::provider(format!("invalid completion response: {err}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenError::provider(
                "no response content received from OpenAI-compatible API",
            ));
        }
        Ok(text)
    }

    /// Enumerate the models the endpoint offers
    pub async fn list_models(&self, cancel: &CancellationToken) -> GenResult<Vec<EndpointModel>> {
        let request = self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GenError::Cancelled),
            response = request => response.map_err(|err| self.map_transport_error(err))?,
        };
        if !response.status().is_success() {
            return Err(self.map_status_error(response.status()));
        }
        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|err| GenError::provider(format!("invalid models response: {err}")))?;
        Ok(parsed.data)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GenError {
        if err.is_connect() {
            return GenError::provider(format!(
                "cannot connect to OpenAI-compatible API at {}. Make sure the service is running.",
                self.base_url
            ));
        }
        if err.is_timeout() {
            return GenError::provider(format!(
                "request to {} timed out",
                self.base_url
            ));
        }
        GenError::provider(format!("OpenAI-compatible API error: {err}"))
    }

    fn map_status_error(&self, status: reqwest::StatusCode) -> GenError {
        match status.as_u16() {
            401 => GenError::provider("invalid API key. Please check your configuration."),
            404 => GenError::provider(format!(
                "model \"{}\" not found. Please check your model name configuration.",
                self.model
            )),
            code => GenError::provider(format!("OpenAI-compatible API returned HTTP {code}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, model: &str) -> OpenAiCompatibleConfig {
        OpenAiCompatibleConfig {
            base_url: base_url.to_string(),
            api_key: String::new(),
            model_name: model.to_string(),
        }
    }

    #[test]
    fn test_missing_base_url_rejected() {
        let err = OpenAiProvider::new(&config("", "llama3.2"), "llama3.2").unwrap_err();
        assert!(matches!(err, GenError::Validation(_)));
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let provider =
            OpenAiProvider::new(&config("http://localhost:11434/v1/", "m"), "m").unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_status_error_mapping() {
        let provider = OpenAiProvider::new(&config("http://localhost:11434/v1", "m"), "m").unwrap();
        let unauthorized = provider.map_status_error(reqwest::StatusCode::UNAUTHORIZED);
        assert!(unauthorized.to_string().contains("invalid API key"));
        let not_found = provider.map_status_error(reqwest::StatusCode::NOT_FOUND);
        assert!(not_found.to_string().contains("\"m\" not found"));
    }

    #[tokio::test]
    async fn test_configured_model_skips_network() {
        let store = crate::store::MemoryStore::default();
        let provider = OpenAiProvider::from_config(
            &config("http://localhost:11434/v1", "qwen2.5"),
            &store,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(provider.model(), "qwen2.5");
    }

    #[tokio::test]
    async fn test_last_used_model_skips_network() {
        let store = crate::store::MemoryStore::default();
        store
            .set(constants::prefs::OPENAI_LAST_USED_MODEL, "llama3.2")
            .unwrap();
        let provider = OpenAiProvider::from_config(
            &config("http://localhost:11434/v1", ""),
            &store,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(provider.model(), "llama3.2");
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let body = ChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.7,
            max_tokens: 4096,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 4096);
    }
}
