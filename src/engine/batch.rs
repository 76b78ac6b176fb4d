//! Batch driver: load many documents concurrently, merge them in order.
//!
//! Loading and extraction (the slow part, one LLM call per text document)
//! run up to `concurrency` at a time. Conformance and merging then happen
//! one document at a time in file-name order, so the master record has a
//! single writer and the merge outcome does not depend on which extraction
//! finished first.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents;
use crate::engine::merge::{self, MergeSummary};
use crate::llm::QuoteExtractor;
use crate::schema::QuoteSchema;
use crate::types::{InsurerName, MasterRecord};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Where a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Reading, parsing or extracting the document.
    Load,
    /// The extraction did not have the document shape.
    Conform,
}

#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub path: PathBuf,
    pub insurers: Vec<InsurerName>,
    pub summary: MergeSummary,
}

#[derive(Debug, Clone)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub merged: Vec<MergedDocument>,
    pub failed: Vec<FailedDocument>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.merged.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct BatchDriver {
    schema: Arc<QuoteSchema>,
    extractor: Option<Arc<dyn QuoteExtractor>>,
    concurrency: usize,
}

impl BatchDriver {
    pub fn new(
        schema: Arc<QuoteSchema>,
        extractor: Option<Arc<dyn QuoteExtractor>>,
        concurrency: usize,
    ) -> Self {
        Self {
            schema,
            extractor,
            concurrency: concurrency.max(1),
        }
    }

    pub fn schema(&self) -> &QuoteSchema {
        &self.schema
    }

    /// Merge `paths` into `master`.
    ///
    /// Never fails as a whole: a document that cannot be loaded or conformed
    /// is logged, listed in the report and skipped. Its contents never reach
    /// the master record.
    pub async fn run(&self, master: &mut MasterRecord, mut paths: Vec<PathBuf>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        info!(
            %run_id,
            documents = paths.len(),
            concurrency = self.concurrency,
            extractor = self.extractor.as_ref().map(|e| e.model_name()).unwrap_or("none"),
            "Batch started"
        );

        let loaded = self.load_all(paths).await;

        let mut merged = Vec::new();
        let mut failed = Vec::new();

        for (path, raw) in loaded {
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(%run_id, path = %path.display(), error = %format!("{e:#}"), "Document load failed");
                    failed.push(FailedDocument {
                        path,
                        stage: FailureStage::Load,
                        error: format!("{e:#}"),
                    });
                    continue;
                }
            };

            let document = match self.schema.conform_document(raw) {
                Ok(document) => document,
                Err(e) => {
                    warn!(%run_id, path = %path.display(), error = %e, "Document rejected");
                    failed.push(FailedDocument {
                        path,
                        stage: FailureStage::Conform,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let summary = merge::merge(master, &document);
            let insurers: Vec<InsurerName> = document.quotes.insurers().map(str::to_string).collect();
            info!(
                %run_id,
                path = %path.display(),
                insurers = ?insurers,
                added = summary.insurers_added.len(),
                fields_updated = summary.fields_updated,
                "Document merged"
            );
            merged.push(MergedDocument {
                path,
                insurers,
                summary,
            });
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            merged,
            failed,
        };

        info!(
            %run_id,
            merged = report.merged.len(),
            failed = report.failed.len(),
            insurers = master.quotes.len(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Batch finished"
        );
        report
    }

    /// Load every document with bounded concurrency, results in input order.
    async fn load_all(&self, paths: Vec<PathBuf>) -> Vec<(PathBuf, anyhow::Result<Value>)> {
        let schema = self.schema.as_ref();
        let extractor = self.extractor.as_deref();

        stream::iter(paths)
            .map(|path| async move {
                let raw = documents::load_raw(&path, extractor, schema).await;
                (path, raw)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
