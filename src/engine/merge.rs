//! Merge engine: folds extracted documents into the master record.
//!
//! Merging only ever fills gaps: a blank incoming value (empty string, zero,
//! null) never replaces anything. When two documents disagree on a
//! non-blank value the one merged last wins, so callers fix the document
//! order before merging.

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{is_blank, InsurerName, MasterRecord, QuoteRecord};

/// What a single merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub general_info_updated: usize,
    pub insurers_added: Vec<InsurerName>,
    pub insurers_updated: Vec<InsurerName>,
    /// Quote fields (or mapping sub-keys) whose value changed.
    pub fields_updated: usize,
}

impl MergeSummary {
    pub fn is_noop(&self) -> bool {
        self.general_info_updated == 0
            && self.insurers_added.is_empty()
            && self.insurers_updated.is_empty()
    }
}

/// Fold `incoming` into `master`.
///
/// Infallible on a conformed document, so a document is either merged in
/// full or (if it failed conformance upstream) not at all.
pub fn merge(master: &mut MasterRecord, incoming: &MasterRecord) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for (key, value) in &incoming.general_info {
        if fill(&mut master.general_info, key, value) {
            summary.general_info_updated += 1;
        }
    }

    for (insurer, quote) in incoming.quotes.iter() {
        match master.quotes.get_mut(insurer) {
            None => {
                master.quotes.insert(insurer, quote.clone());
                summary.insurers_added.push(insurer.to_string());
            }
            Some(existing) => {
                let changed = merge_quote(existing, quote);
                if changed > 0 {
                    summary.fields_updated += changed;
                    summary.insurers_updated.push(insurer.to_string());
                }
            }
        }
    }

    debug!(
        general_info_updated = summary.general_info_updated,
        added = ?summary.insurers_added,
        updated = ?summary.insurers_updated,
        fields_updated = summary.fields_updated,
        "Merged document"
    );
    summary
}

/// Merge one insurer's quote field by field, recursing one level into
/// mappings. Returns the number of values that changed.
pub fn merge_quote(master: &mut QuoteRecord, incoming: &QuoteRecord) -> usize {
    let target = master.as_map_mut();
    let mut changed = 0;

    for (field, value) in incoming.iter() {
        let Value::Object(sub) = value else {
            if fill(target, field, value) {
                changed += 1;
            }
            continue;
        };

        if let Some(Value::Object(existing)) = target.get_mut(field) {
            for (key, sub_value) in sub {
                if fill(existing, key, sub_value) {
                    changed += 1;
                }
            }
            continue;
        }

        if target.get(field).is_some_and(|current| !is_blank(current)) {
            debug!(field = %field, "Kept scalar where a mapping was offered");
            continue;
        }

        target.insert(field.clone(), value.clone());
        changed += 1;
    }

    changed
}

/// Overwrite `target[key]` with a non-blank `value`. Returns whether it changed.
fn fill(target: &mut Map<String, Value>, key: &str, value: &Value) -> bool {
    if is_blank(value) || target.get(key) == Some(value) {
        return false;
    }
    target.insert(key.to_string(), value.clone());
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
