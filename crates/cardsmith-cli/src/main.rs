//! Cardsmith - social card generation from the command line
//!
//! Reads a blog post, runs the generation pipeline against a CLI tool or
//! an OpenAI-compatible endpoint, and writes each design as a standalone
//! HTML file. Hosted models belong to editor integrations; standalone use
//! always generates straight from the post text.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardsmith_core::{
    CardGenerator, Dimensions, EmptyCatalog, GenerationEvent, GenerationRequest, GeneratorConfig,
    JsonFileStore, OpenAiProvider, Provider,
};

/// Generate social media card designs for a blog post
#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(about = "Generate social media card designs from a blog post", long_about = None)]
struct Cli {
    /// Path to the blog post (markdown or plain text)
    input: PathBuf,

    /// Card width in pixels
    #[arg(long, default_value_t = 1200)]
    width: u32,

    /// Card height in pixels
    #[arg(long, default_value_t = 630)]
    height: u32,

    /// Number of designs to generate (defaults to the configured value)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Pipe prompts through this CLI command instead of the configured
    /// HTTP endpoint (e.g. "claude", "codex", "ollama")
    #[arg(long)]
    cli: Option<String>,

    /// Directory for the generated HTML files
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Extra design guidance for this run
    #[arg(short, long)]
    guidance: Option<String>,

    /// Mirror prompts and response previews to stderr
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source_text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("failed to create {}", cli.out.display()))?;

    let mut config = GeneratorConfig::load()?;
    // No hosted catalog on the command line, so the summarize step has
    // nothing to run on
    config.skip_summarization = true;

    let store = Arc::new(JsonFileStore::open_default()?);
    let provider = build_provider(&cli, &config, store.clone()).await?;

    let dimensions = Dimensions::new(cli.width, cli.height)?;
    let count = cli.count.unwrap_or_else(|| config.clamped_design_count());

    let (events, mut rx) = mpsc::unbounded_channel();
    let show_debug = cli.debug;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Progress { status, .. } => eprintln!("{status}"),
                GenerationEvent::Design(design) => {
                    eprintln!("  ✓ {} ({}ms)", design.title, design.generation_time_ms)
                }
                GenerationEvent::Debug(text) if show_debug => eprint!("{text}"),
                GenerationEvent::Debug(_) => {}
            }
        }
    });

    let generator = CardGenerator::new(config, Arc::new(EmptyCatalog), events);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let mut request = GenerationRequest::new(source_text, dimensions, count);
    request.chat_message = cli.guidance.clone();
    request.cancel = cancel;

    let result = generator.generate(&request, &provider).await;
    drop(generator);
    let _ = printer.await;

    let (summary, designs) = match finish_run(result)? {
        Some(ok) => ok,
        // The Stopped event already told the user; exit like an
        // interrupted shell command, not a failed one
        None => std::process::exit(130),
    };

    info!(title = %summary.title, designs = designs.len(), "generation complete");
    for (index, design) in designs.iter().enumerate() {
        let path = cli.out.join(format!("design-{:02}.html", index + 1));
        std::fs::write(&path, &design.html)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }

    Ok(())
}

/// Classify the pipeline outcome at the process boundary
///
/// A user stop is not an error: `Ok(None)` tells the caller to exit
/// quietly. Everything else passes through.
fn finish_run(
    result: cardsmith_core::GenResult<(cardsmith_core::BlogSummary, Vec<cardsmith_core::CardDesign>)>,
) -> Result<Option<(cardsmith_core::BlogSummary, Vec<cardsmith_core::CardDesign>)>> {
    match result {
        Ok(ok) => Ok(Some(ok)),
        Err(err) if err.is_cancelled() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn build_provider(
    cli: &Cli,
    config: &GeneratorConfig,
    store: Arc<JsonFileStore>,
) -> Result<Provider> {
    if let Some(command) = &cli.cli {
        let provider = cardsmith_core::CliProvider::new(command.clone(), store)
            .with_local_model(config.local_model.clone());
        if !provider.is_available() {
            bail!("'{command}' not found in PATH");
        }
        return Ok(Provider::Cli(provider));
    }

    if config.openai_compatible.base_url.is_empty() {
        bail!(
            "no provider selected: pass --cli <command> or configure \
             [openai_compatible] in ~/.cardsmith/config.toml"
        );
    }
    let provider = OpenAiProvider::from_config(
        &config.openai_compatible,
        store.as_ref(),
        &CancellationToken::new(),
    )
    .await?;
    Ok(Provider::OpenAiCompatible(provider))
}
