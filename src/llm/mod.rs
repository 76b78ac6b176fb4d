//! LLM integration for turning quote document text into structured data.
//!
//! Defines the `QuoteExtractor` trait and an OpenAI Chat Completions
//! implementation. PDF text extraction happens before this layer.

pub mod openai;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::schema::QuoteSchema;

/// Abstraction over structured-data extractors.
///
/// Implementors return a raw extraction document shaped like the schema
/// exemplar; conformance to the schema happens afterwards, so a sloppy
/// extraction is coerced rather than rejected.
#[async_trait]
pub trait QuoteExtractor: Send + Sync {
    /// Extract one document's general info and quotes from its text.
    async fn extract(&self, text: &str, schema: &QuoteSchema) -> Result<Value>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
