//! Money helpers: decimal coercion, cent rounding, GST and display formatting.
//!
//! Every amount the engine derives goes through `round_money` at the point
//! it is produced. Values read out of quote records go through
//! `to_decimal`, which never fails: anything that is not a number is zero.
//! Arithmetic on those values goes through the `*_or_zero` helpers, so an
//! amount pushed past the decimal range collapses to zero instead of
//! panicking.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::str::FromStr;

/// Australian GST rate.
pub const GST_RATE: Decimal = dec!(0.1);

const HUNDRED: Decimal = dec!(100);

/// Round to cents (banker's rounding on exact ties).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// `amount × pct / 100`, unrounded. Zero on overflow.
pub fn percent_of(amount: Decimal, pct: Decimal) -> Decimal {
    pct.checked_div(HUNDRED)
        .and_then(|rate| amount.checked_mul(rate))
        .unwrap_or(Decimal::ZERO)
}

/// Sum of `amounts`, or zero when any partial sum leaves the decimal range.
pub fn sum_or_zero(amounts: &[Decimal]) -> Decimal {
    amounts
        .iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(*amount))
        .unwrap_or(Decimal::ZERO)
}

pub fn sub_or_zero(a: Decimal, b: Decimal) -> Decimal {
    a.checked_sub(b).unwrap_or(Decimal::ZERO)
}

pub fn mul_or_zero(a: Decimal, b: Decimal) -> Decimal {
    a.checked_mul(b).unwrap_or(Decimal::ZERO)
}

/// Parse a plain number such as `"1234.5"`, `" 12 "` or `"1e3"`.
///
/// Currency symbols and thousands separators are rejected; use
/// [`parse_amount`] for values typed the way a quote document prints them.
pub fn parse_number(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .ok()
        .or_else(|| Decimal::from_scientific(trimmed).ok())
}

/// Parse a printed amount: `"$1,234.50"`, `"-$20"`, `"1 500"`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let cleaned: String = rest
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let value = parse_number(&cleaned)?;
    Some(if negative { -value } else { value })
}

/// Numeric view of a JSON value. Strings count when they hold a plain number.
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                parse_number(&n.to_string()).or_else(|| n.as_f64().and_then(Decimal::from_f64))
            }
        }
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Coerce an optional JSON value to a decimal, defaulting to zero.
pub fn to_decimal(value: Option<&Value>) -> Decimal {
    value.and_then(json_decimal).unwrap_or(Decimal::ZERO)
}

/// Convert a decimal back into a JSON number. Whole amounts become integers.
pub fn to_json(amount: Decimal) -> Value {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        if let Some(i) = normalized.to_i64() {
            return Value::from(i);
        }
    }
    normalized
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

/// GST-exclusive part of a GST-inclusive amount, rounded to cents.
///
/// `423.50` → `385.00`.
pub fn gst_exclusive(inclusive: Decimal) -> Decimal {
    round_money(inclusive / (Decimal::ONE + GST_RATE))
}

/// Split a GST-inclusive amount into `(exclusive, gst)`; the two parts
/// always add back up to the rounded inclusive amount.
pub fn split_gst_inclusive(inclusive: Decimal) -> (Decimal, Decimal) {
    let exclusive = gst_exclusive(inclusive);
    (exclusive, round_money(inclusive - exclusive))
}

/// `$1,234.50` style currency text. Negatives render as `$-1,234.50`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let mut magnitude = rounded.abs();
    magnitude.rescale(2);

    let text = magnitude.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    format!(
        "${}{}.{}",
        if negative { "-" } else { "" },
        group_thousands(int_part),
        frac_part
    )
}

/// `20` → `"20%"`, `12.50` → `"12.5%"`.
pub fn format_percent(pct: Decimal) -> String {
    format!("{}%", pct.normalize())
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
