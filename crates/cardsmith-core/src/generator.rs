//! Generation orchestrator
//!
//! Drives the two-step pipeline: summarize the post with a cheap hosted
//! model, then generate designs through the selected provider, either one
//! request per design or a single batched request. Designs stream to the
//! event sink as they complete; cancellation is checked at every step and
//! reported as a neutral stop, not a failure.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GeneratorConfig;
use crate::constants;
use crate::error::{GenError, GenResult};
use crate::models::pick_summary_model;
use crate::normalize::{parse_design_response, parse_summary_response};
use crate::prompt::{
    build_design_prompt, build_modification_prompt, build_summarization_prompt, DesignPromptParams,
};
use crate::provider::{HostedModel, Provider, ProviderKind};
use crate::retry::retry;
use crate::types::{
    BlogSummary, CardDesign, Dimensions, GenerationEvent, GenerationRequest, GenerationState,
};

/// Source of hosted models for summarization
///
/// Separate from the design provider: summarization always runs on a
/// hosted model when one is available, whatever backend renders designs.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn models(&self) -> GenResult<Vec<Arc<dyn HostedModel>>>;
}

/// Catalog for environments with no hosted models (standalone CLI use)
pub struct EmptyCatalog;

#[async_trait]
impl ModelCatalog for EmptyCatalog {
    async fn models(&self) -> GenResult<Vec<Arc<dyn HostedModel>>> {
        Ok(Vec::new())
    }
}

/// Whether this generation should issue one request per design
///
/// CLI tools produce better output one design at a time, standard-tier
/// hosted models truncate large batched responses, and quality mode opts
/// premium models in. A single design never batches.
pub fn use_separate_requests(
    provider: &Provider,
    config: &GeneratorConfig,
    design_count: usize,
) -> bool {
    if design_count <= 1 {
        return false;
    }
    match provider.kind() {
        ProviderKind::Cli => true,
        _ => {
            config.separate_requests_for_premium
                || provider
                    .hosted_descriptor()
                    .is_some_and(|d| d.is_standard_tier())
        }
    }
}

/// Title to use when summarization is skipped
///
/// The post's first line, stripped of markdown heading markers, when it
/// looks like a title; otherwise a generic placeholder.
pub fn fallback_title_from(source_text: &str) -> String {
    let first_line = source_text
        .lines()
        .next()
        .map(|line| line.trim_start_matches('#').trim())
        .unwrap_or("");
    if !first_line.is_empty() && first_line.len() < 100 {
        first_line.to_string()
    } else {
        "Blog Post".to_string()
    }
}

/// Orchestrates summarization, design generation, and modification
pub struct CardGenerator {
    config: GeneratorConfig,
    catalog: Arc<dyn ModelCatalog>,
    events: UnboundedSender<GenerationEvent>,
    state: Mutex<GenerationState>,
    session: Mutex<Option<CancellationToken>>,
}

impl CardGenerator {
    pub fn new(
        config: GeneratorConfig,
        catalog: Arc<dyn ModelCatalog>,
        events: UnboundedSender<GenerationEvent>,
    ) -> Self {
        Self {
            config,
            catalog,
            events,
            state: Mutex::new(GenerationState::Idle),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn state(&self) -> GenerationState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: GenerationState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Cancel whatever generation is currently running
    pub fn cancel_active(&self) {
        let session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = session.as_ref() {
            token.cancel();
        }
    }

    /// Register a new session, cancelling any previous one
    fn begin_session(&self, cancel: &CancellationToken) {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = session.replace(cancel.clone()) {
            previous.cancel();
        }
    }

    fn end_session(&self) {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        *session = None;
    }

    fn emit(&self, event: GenerationEvent) {
        // A dropped receiver just means nobody is listening anymore
        let _ = self.events.send(event);
    }

    fn progress(&self, status: impl Into<String>) {
        self.emit(GenerationEvent::Progress {
            status: status.into(),
            current: None,
            total: None,
        });
    }

    fn debug(&self, text: impl Into<String>) {
        self.emit(GenerationEvent::Debug(text.into()));
    }

    fn preview(text: &str) -> &str {
        let limit = constants::generation::RESPONSE_PREVIEW_CHARS;
        match text.char_indices().nth(limit) {
            Some((index, _)) => &text[..index],
            None => text,
        }
    }

    /// Run the full pipeline for one request
    ///
    /// Returns the summary used plus all generated designs. Designs also
    /// stream to the event sink as they complete, so callers rendering
    /// incrementally never need the return value's design list.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        provider: &Provider,
    ) -> GenResult<(BlogSummary, Vec<CardDesign>)> {
        self.begin_session(&request.cancel);
        let result = self.generate_inner(request, provider).await;
        self.end_session();
        match &result {
            Ok(_) => self.set_state(GenerationState::Completed),
            Err(err) if err.is_cancelled() => {
                self.set_state(GenerationState::Cancelled);
                self.progress("Stopped");
            }
            Err(_) => self.set_state(GenerationState::Failed),
        }
        result
    }

    async fn generate_inner(
        &self,
        request: &GenerationRequest,
        provider: &Provider,
    ) -> GenResult<(BlogSummary, Vec<CardDesign>)> {
        let design_count = request.design_count.clamp(
            constants::generation::MIN_DESIGNS,
            constants::generation::MAX_DESIGNS,
        );

        self.set_state(GenerationState::Summarizing);
        let summary = match &request.resolved_summary {
            Some(summary) => {
                info!("using caller-resolved summary");
                summary.clone()
            }
            None if self.config.skip_summarization => {
                self.progress("Skipping summarization...");
                BlogSummary {
                    title: fallback_title_from(&request.source_text),
                    summary: request.source_text.clone(),
                    model_name: String::new(),
                }
            }
            None => {
                self.progress("Summarizing blog post...");
                self.summarize(&request.source_text, &request.cancel).await?
            }
        };

        self.set_state(GenerationState::Designing);
        let designs = if use_separate_requests(provider, &self.config, design_count) {
            self.generate_separately(&summary, request, design_count, provider)
                .await?
        } else {
            self.generate_batched(&summary, request, design_count, provider)
                .await?
        };

        if designs.is_empty() {
            return Err(GenError::validation("no designs generated"));
        }
        Ok((summary, designs))
    }

    /// Summarize the post with the cheapest suitable hosted model
    pub async fn summarize(
        &self,
        source_text: &str,
        cancel: &CancellationToken,
    ) -> GenResult<BlogSummary> {
        let models = self.catalog.models().await?;
        let descriptors: Vec<_> = models.iter().map(|m| m.descriptor().clone()).collect();
        let chosen = pick_summary_model(&descriptors).ok_or_else(|| {
            GenError::provider("no hosted models available for summarization")
        })?;
        let model = models
            .iter()
            .find(|m| m.descriptor().id == chosen.id)
            .ok_or_else(|| GenError::provider("summarization model disappeared from catalog"))?;
        let model_name = chosen.display_name().to_string();
        info!(model = %model_name, "summarizing blog post");

        let prompt = build_summarization_prompt(source_text);
        self.debug(format!(
            "\n=== Step 1: Summarization ===\nModel: {model_name}\n\n--- Prompt ---\n{prompt}\n\n--- Response ---\n"
        ));

        let response = retry(cancel, constants::generation::MAX_ATTEMPTS, || {
            let prompt = prompt.as_str();
            async move {
                let chunks = model.send(prompt, cancel).await?;
                crate::provider::collect_response(chunks, cancel).await
            }
        })
        .await?;
        self.debug(Self::preview(&response).to_string());

        let mut summary = parse_summary_response(&response)?;
        if summary.title.trim().is_empty() || summary.summary.trim().is_empty() {
            return Err(GenError::validation(
                "summarization response missing title or summary",
            ));
        }
        summary.model_name = model_name;
        Ok(summary)
    }

    /// One provider request per design, streaming each as it lands
    async fn generate_separately(
        &self,
        summary: &BlogSummary,
        request: &GenerationRequest,
        design_count: usize,
        provider: &Provider,
    ) -> GenResult<Vec<CardDesign>> {
        self.debug(format!(
            "\n=== Step 2: Design Generation (Separate Requests) ===\nModel: {}\nGenerating {design_count} designs with separate API calls\n",
            provider.display_name()
        ));

        let mut designs = Vec::with_capacity(design_count);
        for design_number in 1..=design_count {
            self.emit(GenerationEvent::Progress {
                status: format!("Generating design {design_number} of {design_count}..."),
                current: Some(design_number),
                total: Some(design_count),
            });

            let started = Instant::now();
            let params = DesignPromptParams {
                title: &summary.title,
                summary: &summary.summary,
                dimensions: request.dimensions,
                design_number,
                number_of_designs: design_count,
                batch_mode: false,
            };
            let prompt = build_design_prompt(
                &params,
                self.config.prompt_mode,
                &self.config.custom_prompt_instructions,
                request.chat_message.as_deref(),
            );
            self.debug(format!(
                "\n--- Request {design_number}/{design_count} ---\n{prompt}\n"
            ));

            let response = retry(&request.cancel, constants::generation::MAX_ATTEMPTS, || {
                provider.execute(&prompt, &request.cancel)
            })
            .await
            .map_err(|err| qualify(err, design_number))?;
            self.debug(format!(
                "\n--- Response {design_number}/{design_count} ---\n{}\n",
                Self::preview(&response)
            ));

            let result =
                parse_design_response(&response).map_err(|err| qualify(err, design_number))?;
            let mut design = result
                .designs
                .into_iter()
                .next()
                .ok_or_else(|| qualify(GenError::validation("no design in response"), design_number))?;
            design.generation_time_ms = started.elapsed().as_millis() as u64;

            info!(
                design_number,
                title = %design.title,
                elapsed_ms = design.generation_time_ms,
                "design generated"
            );
            self.emit(GenerationEvent::Design(design.clone()));
            designs.push(design);
        }
        Ok(designs)
    }

    /// All designs from a single provider request
    async fn generate_batched(
        &self,
        summary: &BlogSummary,
        request: &GenerationRequest,
        design_count: usize,
        provider: &Provider,
    ) -> GenResult<Vec<CardDesign>> {
        self.progress(format!("Generating {design_count} designs..."));
        let started = Instant::now();

        let params = DesignPromptParams {
            title: &summary.title,
            summary: &summary.summary,
            dimensions: request.dimensions,
            design_number: 1,
            number_of_designs: design_count,
            batch_mode: true,
        };
        let prompt = build_design_prompt(
            &params,
            self.config.prompt_mode,
            &self.config.custom_prompt_instructions,
            request.chat_message.as_deref(),
        );
        self.debug(format!(
            "\n=== Step 2: Design Generation ===\nModel: {}\n\n--- Prompt ---\n{prompt}\n",
            provider.display_name()
        ));

        let response = retry(&request.cancel, constants::generation::MAX_ATTEMPTS, || {
            provider.execute(&prompt, &request.cancel)
        })
        .await?;
        self.debug(format!(
            "\n--- Response ---\n{}\n",
            Self::preview(&response)
        ));

        let result = parse_design_response(&response)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.designs.len() != design_count {
            warn!(
                requested = design_count,
                received = result.designs.len(),
                "batched response count mismatch"
            );
        }

        let mut designs = result.designs;
        for design in &mut designs {
            // One request produced the whole set; each card reports it
            design.generation_time_ms = elapsed_ms;
            self.emit(GenerationEvent::Design(design.clone()));
        }
        Ok(designs)
    }

    /// Apply a modification request to an existing design set
    ///
    /// The model returns the complete set back; the result replaces all
    /// current designs even when only one was touched.
    pub async fn modify(
        &self,
        designs: &[CardDesign],
        dimensions: Dimensions,
        modification_request: &str,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> GenResult<Vec<CardDesign>> {
        if designs.is_empty() {
            return Err(GenError::validation("no designs to modify"));
        }
        self.begin_session(cancel);
        self.set_state(GenerationState::Modifying);
        let result = self
            .modify_inner(designs, dimensions, modification_request, provider, cancel)
            .await;
        self.end_session();
        match &result {
            Ok(_) => self.set_state(GenerationState::Completed),
            Err(err) if err.is_cancelled() => {
                self.set_state(GenerationState::Cancelled);
                self.progress("Stopped");
            }
            Err(_) => self.set_state(GenerationState::Failed),
        }
        result
    }

    async fn modify_inner(
        &self,
        designs: &[CardDesign],
        dimensions: Dimensions,
        modification_request: &str,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> GenResult<Vec<CardDesign>> {
        self.progress("Modifying designs...");
        let started = Instant::now();

        let prompt = build_modification_prompt(designs, dimensions, modification_request);
        self.debug(format!(
            "\n=== Design Modification ===\nModel: {}\n\n--- Prompt ---\n{prompt}\n",
            provider.display_name()
        ));

        let response = retry(cancel, constants::generation::MAX_ATTEMPTS, || {
            provider.execute(&prompt, cancel)
        })
        .await?;
        self.debug(format!(
            "\n--- Response ---\n{}\n",
            Self::preview(&response)
        ));

        let result = parse_design_response(&response)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut modified = result.designs;
        for design in &mut modified {
            design.generation_time_ms = elapsed_ms;
            self.emit(GenerationEvent::Design(design.clone()));
        }
        info!(count = modified.len(), "designs modified");
        Ok(modified)
    }
}

/// Attach the design number to errors from the per-design loop
fn qualify(err: GenError, design_number: usize) -> GenError {
    match err {
        GenError::Cancelled => GenError::Cancelled,
        GenError::Provider(msg) => GenError::Provider(format!("design {design_number}: {msg}")),
        GenError::Format(msg) => GenError::Format(format!("design {design_number}: {msg}")),
        GenError::Validation(msg) => GenError::Validation(format!("design {design_number}: {msg}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelDescriptor;
    use crate::store::MemoryStore;
    use futures::stream::{self, BoxStream};
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct MockModel {
        descriptor: ModelDescriptor,
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn new(descriptor: ModelDescriptor, responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                descriptor,
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HostedModel for MockModel {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        async fn send(
            &self,
            _prompt: &str,
            _cancel: &CancellationToken,
        ) -> GenResult<BoxStream<'static, GenResult<String>>> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let response = responses
                .get(index.min(responses.len().saturating_sub(1)))
                .cloned()
                .ok_or_else(|| GenError::provider("mock has no responses"))?;
            Ok(stream::once(async move { Ok(response) }).boxed())
        }
    }

    struct MockCatalog(Vec<Arc<dyn HostedModel>>);

    #[async_trait]
    impl ModelCatalog for MockCatalog {
        async fn models(&self) -> GenResult<Vec<Arc<dyn HostedModel>>> {
            Ok(self.0.clone())
        }
    }

    fn standard_descriptor() -> ModelDescriptor {
        ModelDescriptor::new("gpt-4o", "copilot", "gpt-4o", "GPT-4o")
    }

    fn premium_descriptor() -> ModelDescriptor {
        ModelDescriptor::new("claude-sonnet", "anthropic", "claude", "Claude Sonnet")
    }

    fn design_json(title: &str) -> String {
        format!(
            r#"{{"analysis":"a","designs":[{{"title":"{title}","html":"<div>{title}</div>"}}]}}"#
        )
    }

    fn batch_json(count: usize) -> String {
        let designs: Vec<String> = (1..=count)
            .map(|n| format!(r#"{{"title":"Design {n}","html":"<div>{n}</div>"}}"#))
            .collect();
        format!(
            r#"{{"analysis":"batch","designs":[{}]}}"#,
            designs.join(",")
        )
    }

    fn summary_json() -> String {
        r#"{"title":"Five Rust Tips","summary":"Tips about Rust."}"#.to_string()
    }

    fn generator(
        config: GeneratorConfig,
        catalog: Arc<dyn ModelCatalog>,
    ) -> (CardGenerator, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CardGenerator::new(config, catalog, tx), rx)
    }

    fn request(count: usize) -> GenerationRequest {
        GenerationRequest::new(
            "# My Post\n\nSome content here.",
            Dimensions::new(1200, 630).unwrap(),
            count,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GenerationEvent>) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_separate_requests_decision() {
        let config = GeneratorConfig::default();
        let standard = Provider::Hosted(MockModel::new(standard_descriptor(), vec![]));
        let premium = Provider::Hosted(MockModel::new(premium_descriptor(), vec![]));
        let cli = Provider::Cli(crate::provider::CliProvider::new(
            "cat",
            Arc::new(MemoryStore::default()),
        ));

        assert!(use_separate_requests(&standard, &config, 5));
        assert!(use_separate_requests(&cli, &config, 5));
        assert!(!use_separate_requests(&premium, &config, 5));

        // Quality mode opts premium models in
        let quality = GeneratorConfig {
            separate_requests_for_premium: true,
            ..Default::default()
        };
        assert!(use_separate_requests(&premium, &quality, 5));

        // A single design never batches separately
        assert!(!use_separate_requests(&standard, &config, 1));
        assert!(!use_separate_requests(&cli, &config, 1));
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(fallback_title_from("# My Great Post\n\nbody"), "My Great Post");
        assert_eq!(fallback_title_from("## Deep Heading\nbody"), "Deep Heading");
        assert_eq!(fallback_title_from(&"x".repeat(150)), "Blog Post");
        assert_eq!(fallback_title_from(""), "Blog Post");
    }

    #[tokio::test]
    async fn test_standard_tier_generates_separately() {
        let model = MockModel::new(
            standard_descriptor(),
            vec![
                design_json("One"),
                design_json("Two"),
                design_json("Three"),
            ],
        );
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, mut rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model.clone());

        let (summary, designs) = generator.generate(&request(3), &provider).await.unwrap();

        assert_eq!(model.calls(), 3);
        assert_eq!(summary.title, "My Post");
        assert_eq!(designs.len(), 3);
        assert_eq!(designs[0].title, "One");
        assert_eq!(designs[2].title, "Three");
        assert_eq!(generator.state(), GenerationState::Completed);

        let streamed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, GenerationEvent::Design(_)))
            .collect();
        assert_eq!(streamed.len(), 3);
    }

    #[tokio::test]
    async fn test_premium_tier_batches_into_one_call() {
        let model = MockModel::new(premium_descriptor(), vec![batch_json(4)]);
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, mut rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model.clone());

        let (_, designs) = generator.generate(&request(4), &provider).await.unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(designs.len(), 4);
        // One request produced the set, so every card reports the same timing
        assert!(designs
            .iter()
            .all(|d| d.generation_time_ms == designs[0].generation_time_ms));
        let streamed = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, GenerationEvent::Design(_)))
            .count();
        assert_eq!(streamed, 4);
    }

    #[tokio::test]
    async fn test_malformed_second_response_recovers_mid_pipeline() {
        // Raw newlines inside the html string defeat a direct parse; the
        // normalizer's re-escape tier keeps the pipeline moving
        let malformed = "{\"analysis\":\"a\",\"designs\":[{\"title\":\"Two\",\"html\":\"<div>\n  two\n</div>\"}]}"
            .to_string();
        let model = MockModel::new(
            standard_descriptor(),
            vec![design_json("One"), malformed, design_json("Three")],
        );
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, _rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model.clone());

        let (_, designs) = generator.generate(&request(3), &provider).await.unwrap();

        assert_eq!(model.calls(), 3);
        assert_eq!(designs[1].title, "Two");
        assert_eq!(designs[1].html, "<div>\n  two\n</div>");
    }

    #[tokio::test]
    async fn test_cancel_after_first_design_stops_loop() {
        // The user hits cancel just as design 2 starts: the first design
        // survives, the underlying model is never asked for another
        struct CancelOnSecond {
            inner: Arc<MockModel>,
            token: CancellationToken,
        }
        #[async_trait]
        impl HostedModel for CancelOnSecond {
            fn descriptor(&self) -> &ModelDescriptor {
                self.inner.descriptor()
            }
            async fn send(
                &self,
                prompt: &str,
                cancel: &CancellationToken,
            ) -> GenResult<BoxStream<'static, GenResult<String>>> {
                if self.inner.calls() >= 1 {
                    self.token.cancel();
                    return Err(GenError::Cancelled);
                }
                self.inner.send(prompt, cancel).await
            }
        }

        let inner = MockModel::new(standard_descriptor(), vec![design_json("One")]);
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, mut rx) = generator(config, Arc::new(MockCatalog(vec![])));

        let req = request(3);
        let provider = Provider::Hosted(Arc::new(CancelOnSecond {
            inner: inner.clone(),
            token: req.cancel.clone(),
        }));

        let err = generator.generate(&req, &provider).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(req.cancel.is_cancelled());
        assert_eq!(generator.state(), GenerationState::Cancelled);
        // Design 1 completed and streamed; the model never produced design 2
        assert_eq!(inner.calls(), 1);
        let streamed = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, GenerationEvent::Design(_)))
            .count();
        assert_eq!(streamed, 1);
    }

    #[tokio::test]
    async fn test_empty_design_list_fails_validation() {
        let model = MockModel::new(
            premium_descriptor(),
            vec![r#"{"analysis":"hmm","designs":[]}"#.to_string()],
        );
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, _rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model.clone());

        let err = generator.generate(&request(3), &provider).await.unwrap_err();

        match err {
            GenError::Validation(msg) => assert_eq!(msg, "no designs generated"),
            other => panic!("unexpected error: {other:?}"),
        }
        // Parsing happens outside the retry budget; the call is not repeated
        assert_eq!(model.calls(), 1);
        assert_eq!(generator.state(), GenerationState::Failed);
    }

    #[tokio::test]
    async fn test_summarization_uses_catalog_model() {
        let summarizer = MockModel::new(
            ModelDescriptor::new("gpt-4o-mini", "copilot", "gpt-4o-mini", "GPT-4o mini"),
            vec![summary_json()],
        );
        let designer = MockModel::new(premium_descriptor(), vec![batch_json(2)]);
        let models: Vec<Arc<dyn HostedModel>> = vec![designer.clone(), summarizer.clone()];
        let catalog = MockCatalog(models);
        let (generator, _rx) = generator(GeneratorConfig::default(), Arc::new(catalog));
        let provider = Provider::Hosted(designer.clone());

        let (summary, _) = generator.generate(&request(2), &provider).await.unwrap();

        assert_eq!(summary.title, "Five Rust Tips");
        assert_eq!(summary.model_name, "GPT-4o mini");
        assert_eq!(summarizer.calls(), 1);
        // Designer served only the design request
        assert_eq!(designer.calls(), 1);
    }

    #[tokio::test]
    async fn test_resolved_summary_skips_summarization() {
        let model = MockModel::new(premium_descriptor(), vec![batch_json(2)]);
        let (generator, _rx) =
            generator(GeneratorConfig::default(), Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model.clone());

        let mut req = request(2);
        req.resolved_summary = Some(BlogSummary {
            title: "Cached".to_string(),
            summary: "Cached summary.".to_string(),
            model_name: "cache".to_string(),
        });

        let (summary, _) = generator.generate(&req, &provider).await.unwrap();
        assert_eq!(summary.title, "Cached");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_reports_stopped_not_failed() {
        let model = MockModel::new(standard_descriptor(), vec![design_json("One")]);
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, mut rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model);

        let req = request(3);
        req.cancel.cancel();
        let err = generator.generate(&req, &provider).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(generator.state(), GenerationState::Cancelled);
        let stopped = drain(&mut rx).into_iter().any(|e| {
            matches!(e, GenerationEvent::Progress { status, .. } if status == "Stopped")
        });
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_new_session_cancels_previous() {
        let (generator, _rx) =
            generator(GeneratorConfig::default(), Arc::new(MockCatalog(vec![])));
        let first = CancellationToken::new();
        generator.begin_session(&first);
        let second = CancellationToken::new();
        generator.begin_session(&second);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn test_modify_replaces_full_set() {
        let model = MockModel::new(premium_descriptor(), vec![batch_json(3)]);
        let (generator, _rx) =
            generator(GeneratorConfig::default(), Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(model);

        let current = vec![
            CardDesign {
                title: "Old A".to_string(),
                html: "<div>a</div>".to_string(),
                generation_time_ms: 10,
            },
            CardDesign {
                title: "Old B".to_string(),
                html: "<div>b</div>".to_string(),
                generation_time_ms: 12,
            },
            CardDesign {
                title: "Old C".to_string(),
                html: "<div>c</div>".to_string(),
                generation_time_ms: 14,
            },
        ];
        let modified = generator
            .modify(
                &current,
                Dimensions::new(1200, 630).unwrap(),
                "make them darker",
                &provider,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(modified.len(), 3);
        assert!(modified.iter().all(|d| d.title.starts_with("Design")));
        assert_eq!(generator.state(), GenerationState::Completed);
    }

    #[tokio::test]
    async fn test_modify_rejects_empty_set() {
        let (generator, _rx) =
            generator(GeneratorConfig::default(), Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(MockModel::new(premium_descriptor(), vec![]));
        let err = generator
            .modify(
                &[],
                Dimensions::new(1200, 630).unwrap(),
                "anything",
                &provider,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Validation(_)));
    }

    struct FailingSecond {
        inner: Arc<MockModel>,
        error: fn() -> GenError,
    }

    #[async_trait]
    impl HostedModel for FailingSecond {
        fn descriptor(&self) -> &ModelDescriptor {
            self.inner.descriptor()
        }
        async fn send(
            &self,
            prompt: &str,
            cancel: &CancellationToken,
        ) -> GenResult<BoxStream<'static, GenResult<String>>> {
            if self.inner.calls() >= 1 {
                self.inner.calls.fetch_add(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            self.inner.send(prompt, cancel).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_names_failing_design() {
        // Design 1 succeeds, every attempt at design 2 fails
        let model = MockModel::new(standard_descriptor(), vec![design_json("One")]);
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, _rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(Arc::new(FailingSecond {
            inner: model,
            error: || GenError::provider("backend down"),
        }));

        let err = generator.generate(&request(3), &provider).await.unwrap_err();
        match err {
            GenError::Provider(msg) => assert!(msg.starts_with("design 2:"), "got: {msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(generator.state(), GenerationState::Failed);
    }

    #[tokio::test]
    async fn test_cancellation_mid_loop_is_never_qualified() {
        let model = MockModel::new(standard_descriptor(), vec![design_json("One")]);
        let config = GeneratorConfig {
            skip_summarization: true,
            ..Default::default()
        };
        let (generator, _rx) = generator(config, Arc::new(MockCatalog(vec![])));
        let provider = Provider::Hosted(Arc::new(FailingSecond {
            inner: model,
            error: || GenError::Cancelled,
        }));

        let err = generator.generate(&request(3), &provider).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(generator.state(), GenerationState::Cancelled);
    }
}
