//! Core engine for LLM-driven social card generation
//!
//! Takes a blog post, summarizes it with a cheap hosted model, and asks a
//! configurable provider (hosted chat model, CLI tool, or OpenAI-compatible
//! endpoint) for self-contained HTML card designs. Model output is pushed
//! through a tiered normalizer because the JSON contract is honored more
//! in spirit than in letter.

pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod store;
pub mod types;

pub use config::{GeneratorConfig, OpenAiCompatibleConfig, PromptMode};
pub use error::{GenError, GenResult};
pub use generator::{
    fallback_title_from, use_separate_requests, CardGenerator, EmptyCatalog, ModelCatalog,
};
pub use models::{dedupe_by_display_name, pick_summary_model, ModelDescriptor};
pub use provider::{
    CliProvider, HostedModel, OpenAiProvider, Provider, ProviderHandle, ProviderKind,
};
pub use store::{JsonFileStore, MemoryStore, PreferenceStore};
pub use types::{
    BlogSummary, CardDesign, Dimensions, GenerationEvent, GenerationRequest, GenerationResult,
    GenerationState,
};
