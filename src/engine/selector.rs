//! Recommendation: the cheapest enriched quote wins.
//!
//! A `final_total` of zero means the quote carried no pricing, not that it
//! is free, so such quotes never rank.

use tracing::{debug, info};

use crate::types::EnrichedQuote;

/// Lowest `final_total`; the first one encountered wins a tie.
pub fn select(enriched: &[EnrichedQuote]) -> Option<&EnrichedQuote> {
    let mut best: Option<&EnrichedQuote> = None;

    for quote in enriched {
        if quote.final_total.is_zero() {
            debug!(insurer = %quote.insurer, "Skipped quote without pricing");
            continue;
        }
        if best.map_or(true, |b| quote.final_total < b.final_total) {
            best = Some(quote);
        }
    }

    if let Some(pick) = best {
        info!(
            insurer = %pick.insurer,
            final_total = %pick.final_total,
            candidates = enriched.len(),
            "Recommended quote selected"
        );
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
