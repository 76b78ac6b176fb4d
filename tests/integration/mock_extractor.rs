//! Mock extractor for integration testing.
//!
//! Provides a deterministic `QuoteExtractor` that answers from canned
//! extraction documents keyed by a marker in the document text, with no
//! network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata_quotes::llm::QuoteExtractor;
use strata_quotes::schema::QuoteSchema;

/// Canned response for any document text containing `marker`.
struct Canned {
    marker: String,
    response: Value,
    delay: Duration,
}

/// All state is in-memory and inspectable from test code.
pub struct MockExtractor {
    canned: Vec<Canned>,
    calls: Arc<Mutex<Vec<String>>>,
    /// If set, all extractions will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            canned: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Answer documents containing `marker` with `response`.
    pub fn with_response(self, marker: &str, response: Value) -> Self {
        self.with_delayed_response(marker, response, Duration::ZERO)
    }

    /// Same, but only after `delay`, to make completion order differ from
    /// input order.
    pub fn with_delayed_response(mut self, marker: &str, response: Value, delay: Duration) -> Self {
        self.canned.push(Canned {
            marker: marker.to_string(),
            response,
            delay,
        });
        self
    }

    /// Force all subsequent extractions to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Document texts seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteExtractor for MockExtractor {
    async fn extract(&self, text: &str, _schema: &QuoteSchema) -> Result<Value> {
        self.calls.lock().unwrap().push(text.to_string());

        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }

        let canned = self
            .canned
            .iter()
            .find(|c| text.contains(&c.marker))
            .ok_or_else(|| anyhow!("no canned extraction for document"))?;

        if !canned.delay.is_zero() {
            tokio::time::sleep(canned.delay).await;
        }
        Ok(canned.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-extractor"
    }
}
