//! CLI provider: pipe the prompt to a spawned command's stdin
//!
//! Covers agent CLIs (`claude`, `codex`, `gemini`) and the local runner
//! (`ollama run <model>`). Commands run through `sh -c` so user-configured
//! command strings may carry flags.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants;
use crate::error::{GenError, GenResult};
use crate::store::PreferenceStore;

/// One installed local-runner model as reported by `ollama list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModel {
    pub name: String,
    pub size: String,
    pub modified_at: String,
}

/// Executes prompts through an external command line tool
pub struct CliProvider {
    command: String,
    /// Explicitly configured local-runner model, the highest-priority
    /// resolution tier
    local_model: Option<String>,
    store: Arc<dyn PreferenceStore>,
}

impl CliProvider {
    pub fn new(command: impl Into<String>, store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            command: command.into(),
            local_model: None,
            store,
        }
    }

    /// Use this model for the local runner instead of resolving one
    pub fn with_local_model(mut self, model: Option<String>) -> Self {
        self.local_model = model;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the command's binary resolves on PATH
    pub fn is_available(&self) -> bool {
        self.command
            .split_whitespace()
            .next()
            .is_some_and(|binary| which::which(binary).is_ok())
    }

    /// Run the command, write `prompt` to its stdin, and return stdout
    ///
    /// Cancellation kills the child; a nonzero exit surfaces stderr.
    pub async fn execute(&self, prompt: &str, cancel: &CancellationToken) -> GenResult<String> {
        if cancel.is_cancelled() {
            return Err(GenError::Cancelled);
        }

        let resolved = self.resolve_command(cancel).await?;
        info!(command = %resolved, "executing CLI provider");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&resolved)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                GenError::provider(format!(
                    "failed to execute '{resolved}': {err}. Make sure the CLI is installed and available in your PATH."
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A CLI that exits before reading stdin closes the pipe; the exit
            // status is the interesting error then, not the broken pipe.
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                debug!(error = %err, "CLI provider did not consume stdin");
            }
            // Dropping stdin closes the pipe so the CLI sees EOF
        }

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(GenError::Cancelled);
            }
            status = child.wait() => status
                .map_err(|err| GenError::provider(format!("failed to wait for '{resolved}': {err}")))?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!(command = %resolved, code, "CLI provider failed");
            return Err(GenError::provider(format!(
                "CLI command '{resolved}' failed with exit code {code}\n{stderr}"
            )));
        }

        debug!(command = %resolved, chars = stdout.len(), "CLI provider completed");
        self.remember_local_model(&resolved);
        Ok(stdout)
    }

    /// Expand a bare `ollama` command to `ollama run <model>`
    ///
    /// Any other command string passes through untouched.
    async fn resolve_command(&self, cancel: &CancellationToken) -> GenResult<String> {
        let trimmed = self.command.trim();
        if trimmed != "ollama" {
            return Ok(self.command.clone());
        }
        let model =
            resolve_local_model(self.store.as_ref(), self.local_model.as_deref(), cancel).await?;
        Ok(format!("ollama run {model}"))
    }

    fn remember_local_model(&self, resolved: &str) {
        if let Some(model) = resolved.strip_prefix("ollama run ") {
            if let Err(err) = self
                .store
                .set(constants::prefs::OLLAMA_LAST_USED_MODEL, model.trim())
            {
                warn!(error = %err, "failed to persist last used local model");
            }
        }
    }
}

/// Pick the local-runner model to use
///
/// Priority: explicit configuration, the currently loaded model, the last
/// used model when still installed, then the first installed model. No
/// installed models is a hard provider error.
pub async fn resolve_local_model(
    store: &dyn PreferenceStore,
    configured: Option<&str>,
    cancel: &CancellationToken,
) -> GenResult<String> {
    if let Some(model) = configured.filter(|m| !m.trim().is_empty()) {
        return Ok(model.trim().to_string());
    }

    if let Some(running) = running_local_model(cancel).await {
        info!(model = %running, "using running local model");
        return Ok(running);
    }

    let available = list_local_models(cancel).await?;

    if let Some(last_used) = store.get(constants::prefs::OLLAMA_LAST_USED_MODEL) {
        if available.iter().any(|m| m.name == last_used) {
            info!(model = %last_used, "using last used local model");
            return Ok(last_used);
        }
    }

    match available.first() {
        Some(model) => {
            info!(model = %model.name, "using first available local model");
            Ok(model.name.clone())
        }
        None => Err(GenError::provider(
            "no local models installed. Pull one with 'ollama pull <model>' first.",
        )),
    }
}

/// Installed models via `ollama list`
pub async fn list_local_models(cancel: &CancellationToken) -> GenResult<Vec<LocalModel>> {
    let output = run_ollama(&["list"], constants::local::LIST_TIMEOUT, cancel)
        .await?
        .ok_or_else(|| {
            GenError::provider("failed to run 'ollama list'. Make sure Ollama is installed.")
        })?;
    Ok(parse_model_table(&output))
}

/// Currently loaded model via `ollama ps`, if any
pub async fn running_local_model(cancel: &CancellationToken) -> Option<String> {
    let output = run_ollama(&["ps"], constants::local::PS_TIMEOUT, cancel)
        .await
        .ok()??;
    first_table_name(&output)
}

async fn run_ollama(
    args: &[&str],
    deadline: std::time::Duration,
    cancel: &CancellationToken,
) -> GenResult<Option<String>> {
    if cancel.is_cancelled() {
        return Err(GenError::Cancelled);
    }
    let child = Command::new("ollama")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(GenError::Cancelled),
        output = timeout(deadline, child) => match output {
            Ok(Ok(output)) => output,
            // Timed out or the binary is missing
            _ => return Ok(None),
        },
    };

    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Parse `NAME  ID  SIZE  MODIFIED` table rows, skipping the header
fn parse_model_table(output: &str) -> Vec<LocalModel> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            Some(LocalModel {
                name: parts[0].to_string(),
                size: parts[2].to_string(),
                modified_at: parts[3..].join(" "),
            })
        })
        .collect()
}

/// First NAME column entry of a table, skipping the header
fn first_table_name(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| line.split_whitespace().next().map(str::to_string))
}
