//! Core engine: merge → enrich → select → project.
//!
//! `batch` drives the merge step over a directory of documents; the other
//! stages are pure functions over the master record.

pub mod batch;
pub mod enricher;
pub mod merge;
pub mod projector;
pub mod selector;
