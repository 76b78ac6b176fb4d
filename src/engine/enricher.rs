//! Enrichment: broker fee, GST and remuneration split per quote.
//!
//! Pure functions of a quote and the pricing parameters. Nothing here is
//! written back to the master record; enrich again whenever the pricing
//! terms change.
//!
//! Every derived amount is rounded to cents where it is produced and the
//! rounded value feeds the next step:
//!
//! ```text
//! broker_fee          = see broker_fee()
//! broker_gst          = round(broker_fee × 0.1)
//! remuneration        = round(commission_without_gst + broker_fee)
//! final_total         = round(total + broker_fee + broker_gst)
//! sm_remuneration     = round(remuneration × associate_split_pct / 100)
//! broker_remuneration = round(remuneration − sm_remuneration)
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::money::{mul_or_zero, percent_of, round_money, sub_or_zero, sum_or_zero, GST_RATE};
use crate::types::{
    BrokerFeeMode, EnrichedQuote, FeeBreakdown, PricingParams, QuoteRecord, Quotes,
};

/// Fixed-mode commission top-ups below this are ignored.
const MIN_COMMISSION_ADJUSTMENT: Decimal = dec!(1);

/// Enrich every quote, preserving insertion order.
pub fn enrich_all(quotes: &Quotes, params: &PricingParams) -> Vec<EnrichedQuote> {
    quotes
        .iter()
        .map(|(insurer, quote)| enrich(insurer, quote, params))
        .collect()
}

/// Derive the commercial terms of one quote.
pub fn enrich(insurer: &str, quote: &QuoteRecord, params: &PricingParams) -> EnrichedQuote {
    let base = quote.base();
    let total = quote.total();
    let commission = quote.commission_without_gst();

    let (broker_fee, breakdown) = broker_fee(base, commission, params);
    let broker_gst = round_money(mul_or_zero(broker_fee, GST_RATE));
    let remuneration = round_money(sum_or_zero(&[commission, broker_fee]));
    let final_total = round_money(sum_or_zero(&[total, broker_fee, broker_gst]));
    let sm_remuneration = round_money(percent_of(remuneration, params.associate_split_pct));
    let broker_remuneration = round_money(sub_or_zero(remuneration, sm_remuneration));

    debug!(
        insurer,
        mode = %breakdown.mode,
        %base,
        %commission,
        shortfall_pct = %breakdown.commission_shortfall_pct,
        adjustment = %breakdown.commission_adjustment,
        %broker_fee,
        %final_total,
        "Quote enriched"
    );

    EnrichedQuote {
        insurer: insurer.to_string(),
        quote: quote.clone(),
        broker_fee,
        broker_gst,
        remuneration,
        sm_remuneration,
        broker_remuneration,
        final_total,
        breakdown,
    }
}

/// Broker fee for a quote, rounded to cents.
///
/// Percentage mode charges `broker_fee_pct` of base plus whatever the
/// embedded commission falls short of `commission_pct`. A zero commission is
/// "not stated" rather than "none paid", so it carries no shortfall: base
/// 10000 at 20%/20% with commission 0 must cost 2000, not 4000.
///
/// Fixed mode charges the flat fee; when the quote states no commission at
/// all, the target commission on base is added on top unless it comes to
/// less than a dollar.
pub fn broker_fee(
    base: Decimal,
    commission_without_gst: Decimal,
    params: &PricingParams,
) -> (Decimal, FeeBreakdown) {
    match params.fee_mode() {
        BrokerFeeMode::Percentage => {
            let shortfall_pct = commission_shortfall_pct(base, commission_without_gst, params.commission_pct);
            let effective_pct = sum_or_zero(&[params.broker_fee_pct, shortfall_pct]);
            let fee = round_money(percent_of(base, effective_pct));
            (
                fee,
                FeeBreakdown {
                    mode: BrokerFeeMode::Percentage,
                    commission_shortfall_pct: shortfall_pct,
                    commission_adjustment: Decimal::ZERO,
                },
            )
        }
        BrokerFeeMode::Fixed(fixed) => {
            let adjustment = commission_adjustment(base, commission_without_gst, params.commission_pct);
            let fee = round_money(sum_or_zero(&[fixed, adjustment]));
            (
                fee,
                FeeBreakdown {
                    mode: BrokerFeeMode::Fixed(fixed),
                    commission_shortfall_pct: Decimal::ZERO,
                    commission_adjustment: adjustment,
                },
            )
        }
    }
}

/// Percentage points by which the embedded commission misses the target.
pub fn commission_shortfall_pct(
    base: Decimal,
    commission_without_gst: Decimal,
    commission_pct: Decimal,
) -> Decimal {
    if base <= Decimal::ZERO || commission_without_gst.is_zero() {
        return Decimal::ZERO;
    }
    // A ratio beyond the decimal range means the commission dwarfs base.
    let Some(embedded_pct) = commission_without_gst
        .checked_div(base)
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
    else {
        return Decimal::ZERO;
    };
    sub_or_zero(commission_pct, embedded_pct).max(Decimal::ZERO)
}

/// Dollars to add to a fixed broker fee.
pub fn commission_adjustment(
    base: Decimal,
    commission_without_gst: Decimal,
    commission_pct: Decimal,
) -> Decimal {
    if !commission_without_gst.is_zero() {
        return Decimal::ZERO;
    }
    let adjustment = percent_of(base, commission_pct);
    if adjustment < MIN_COMMISSION_ADJUSTMENT {
        Decimal::ZERO
    } else {
        adjustment
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
