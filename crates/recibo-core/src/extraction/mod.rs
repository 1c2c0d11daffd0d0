//! Document extraction: PDF bytes in, raw text out.

mod whisperer;

pub use whisperer::{UsageInfo, WhispererClient};

use async_trait::async_trait;

use crate::error::ExtractionError;

/// A service that turns a PDF into raw text.
///
/// Implementations make a single attempt; retries and timeouts are applied by the caller.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of `pdf`. `filename` is passed along for tracing and service-side naming.
    async fn extract(&self, filename: &str, pdf: &[u8]) -> Result<String, ExtractionError>;
}
