//! Provider backends for prompt execution
//!
//! Three ways to reach a model: a hosted chat model supplied by the host
//! environment, a spawned CLI tool, or an OpenAI-compatible HTTP endpoint.
//! The set is closed; the orchestrator dispatches over the enum rather
//! than through a trait object so backend-specific decisions (batching,
//! debug detail) stay in one place.

pub mod cli;
pub mod hosted;
pub mod openai;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::GenResult;
use crate::models::ModelDescriptor;

pub use cli::{list_local_models, resolve_local_model, CliProvider, LocalModel};
pub use hosted::{collect_response, HostedModel};
pub use openai::{EndpointModel, OpenAiProvider};

/// Which backend family a provider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Hosted,
    Cli,
    OpenAiCompatible,
}

/// Lightweight identity of a provider, safe to log and display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub kind: ProviderKind,
    /// Model id, command string, or endpoint model name
    pub name: String,
}

impl ProviderHandle {
    pub fn is_cli(&self) -> bool {
        self.kind == ProviderKind::Cli
    }
}

/// A ready-to-use model backend
pub enum Provider {
    /// Chat model owned by the host environment
    Hosted(Arc<dyn HostedModel>),
    /// External command fed through stdin
    Cli(CliProvider),
    /// `/chat/completions` endpoint
    OpenAiCompatible(OpenAiProvider),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Hosted(_) => ProviderKind::Hosted,
            Provider::Cli(_) => ProviderKind::Cli,
            Provider::OpenAiCompatible(_) => ProviderKind::OpenAiCompatible,
        }
    }

    pub fn handle(&self) -> ProviderHandle {
        ProviderHandle {
            kind: self.kind(),
            name: self.display_name(),
        }
    }

    /// Name shown in progress and debug output
    pub fn display_name(&self) -> String {
        match self {
            Provider::Hosted(model) => model.descriptor().display_name().to_string(),
            Provider::Cli(provider) => provider.command().to_string(),
            Provider::OpenAiCompatible(provider) => provider.model().to_string(),
        }
    }

    /// Descriptor of the hosted model, when this is one
    pub fn hosted_descriptor(&self) -> Option<&ModelDescriptor> {
        match self {
            Provider::Hosted(model) => Some(model.descriptor()),
            _ => None,
        }
    }

    /// Send one prompt and return the complete response text
    pub async fn execute(&self, prompt: &str, cancel: &CancellationToken) -> GenResult<String> {
        match self {
            Provider::Hosted(model) => {
                let chunks = model.send(prompt, cancel).await?;
                collect_response(chunks, cancel).await
            }
            Provider::Cli(provider) => provider.execute(prompt, cancel).await,
            Provider::OpenAiCompatible(provider) => provider.execute(prompt, cancel).await,
        }
    }
}
