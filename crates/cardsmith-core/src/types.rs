//! Core data model for card generation
//!
//! Mirrors the wire shapes the LLM is asked to produce plus the
//! per-invocation request and the events streamed to the output sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::{GenError, GenResult};

/// Target image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> GenResult<Self> {
        if width == 0 || height == 0 {
            return Err(GenError::validation(format!(
                "card dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One generated card design
///
/// Immutable once produced; modification yields a new sequence of designs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDesign {
    pub title: String,
    /// Self-contained HTML fragment with inline or `<style>`-scoped CSS
    pub html: String,
    /// Wall-clock generation time, filled in by the orchestrator
    #[serde(default)]
    pub generation_time_ms: u64,
}

/// Parsed design-generation response: `{analysis, designs: [{title, html}]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub designs: Vec<CardDesign>,
}

/// Parsed summarization response: `{title, summary}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Display name of the model that produced the summary
    #[serde(default)]
    pub model_name: String,
}

/// Immutable parameters for one generation invocation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Raw blog post text
    pub source_text: String,
    pub dimensions: Dimensions,
    /// Requested design count, clamped to 1..=10 by the orchestrator
    pub design_count: usize,
    /// Ad-hoc chat guidance for this invocation; forces append-mode prompts
    pub chat_message: Option<String>,
    /// Pre-resolved summary (caller-side cache hit); skips the summarize step
    pub resolved_summary: Option<BlogSummary>,
    /// Cooperative cancellation handle supplied by the caller
    pub cancel: CancellationToken,
}

impl GenerationRequest {
    pub fn new(source_text: impl Into<String>, dimensions: Dimensions, design_count: usize) -> Self {
        Self {
            source_text: source_text.into(),
            dimensions,
            design_count,
            chat_message: None,
            resolved_summary: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Pipeline state for one orchestrator session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Summarizing,
    Designing,
    Modifying,
    Completed,
    Failed,
    Cancelled,
}

/// Events streamed to the output sink while a generation runs
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// Free-text status, with current/total counts in per-design mode
    Progress {
        status: String,
        current: Option<usize>,
        total: Option<usize>,
    },
    /// A design completed and is ready to render
    Design(CardDesign),
    /// Trace text mirroring prompts and response previews
    Debug(String),
}
