//! Hosted chat model seam
//!
//! The host environment (editor, agent runtime) owns the actual model
//! connection; the core consumes it through this trait and only ever sees
//! a stream of text chunks.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GenError, GenResult};
use crate::models::ModelDescriptor;

/// A hosted chat model that streams response text
#[async_trait]
pub trait HostedModel: Send + Sync {
    /// Metadata for tier and display decisions
    fn descriptor(&self) -> &ModelDescriptor;

    /// Send one prompt and get back the response chunk stream
    async fn send(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> GenResult<BoxStream<'static, GenResult<String>>>;
}

/// Drain a chunk stream into the full response text
///
/// Checks the cancellation token between chunks so a long generation can
/// be abandoned mid-stream.
pub async fn collect_response(
    mut chunks: BoxStream<'static, GenResult<String>>,
    cancel: &CancellationToken,
) -> GenResult<String> {
    let mut text = String::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(GenError::Cancelled),
            chunk = chunks.next() => match chunk {
                Some(chunk) => text.push_str(&chunk?),
                None => break,
            },
        }
    }
    debug!(chars = text.len(), "hosted model response collected");
    Ok(text)
}
