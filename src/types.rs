//! Shared types for the quote comparison engine.
//!
//! Quote records stay ordered JSON maps so that keys the schema does not
//! know about survive a round trip. The engine reads the money fields it
//! computes with through typed accessors that coerce instead of failing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::money;

/// Canonical abbreviated insurer identifier ("CHU", "IIS", ...).
pub type InsurerName = String;

/// Well-known quote field names.
pub mod fields {
    pub const BASE: &str = "base";
    pub const TOTAL: &str = "total";
    pub const ESL: &str = "esl";
    pub const GST: &str = "gst";
    pub const STAMP: &str = "stamp";
    pub const COMMISSION_WITHOUT_GST: &str = "commission_without_gst";
    /// Underwriter fee, GST exclusive.
    pub const UW_FEE: &str = "uw";
    /// GST charged on the underwriter fee.
    pub const UW_GST: &str = "uwgst";
    /// Underwriter fee as printed, GST inclusive.
    pub const UW_FEE_INC_GST: &str = "uwgst_fee";
    pub const FEATURES: &str = "features";
    pub const EXCESSES: &str = "excesses";
    pub const CONDITIONS: &str = "conditions_or_endorsements";
    pub const INSURER: &str = "insurer";
}

/// Fields added by enrichment, in the order they are derived.
pub const DERIVED_FIELDS: [&str; 6] = [
    "broker_fee",
    "broker_gst",
    "remuneration",
    "sm_remuneration",
    "broker_remuneration",
    "final_total",
];

/// "No information": null, empty string or numeric zero.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(_) => money::json_decimal(value).is_some_and(|d| d.is_zero()),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Quote record
// ---------------------------------------------------------------------------

/// One insurer's extracted quote, as an ordered field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteRecord {
    fields: Map<String, Value>,
}

impl QuoteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    /// Numeric view of a field; missing or non-numeric is zero.
    pub fn amount(&self, field: &str) -> Decimal {
        money::to_decimal(self.fields.get(field))
    }

    /// Base premium before levies, taxes and fees.
    pub fn base(&self) -> Decimal {
        self.amount(fields::BASE)
    }

    /// Underwriter's total payable.
    pub fn total(&self) -> Decimal {
        self.amount(fields::TOTAL)
    }

    pub fn commission_without_gst(&self) -> Decimal {
        self.amount(fields::COMMISSION_WITHOUT_GST)
    }

    /// Text view of a field; missing or non-text is empty.
    pub fn text(&self, field: &str) -> &str {
        self.fields.get(field).and_then(Value::as_str).unwrap_or("")
    }

    pub fn mapping(&self, field: &str) -> Option<&Map<String, Value>> {
        self.fields.get(field).and_then(Value::as_object)
    }
}

impl From<Map<String, Value>> for QuoteRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

// ---------------------------------------------------------------------------
// Quotes collection
// ---------------------------------------------------------------------------

/// Insurer → quote, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quotes {
    entries: Vec<(InsurerName, QuoteRecord)>,
}

impl Quotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, insurer: &str) -> bool {
        self.position(insurer).is_some()
    }

    pub fn get(&self, insurer: &str) -> Option<&QuoteRecord> {
        self.position(insurer).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, insurer: &str) -> Option<&mut QuoteRecord> {
        self.position(insurer).map(move |i| &mut self.entries[i].1)
    }

    /// Insert or replace. A replaced insurer keeps its original position.
    pub fn insert(&mut self, insurer: impl Into<InsurerName>, quote: QuoteRecord) -> Option<QuoteRecord> {
        let insurer = insurer.into();
        match self.position(&insurer) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, quote)),
            None => {
                self.entries.push((insurer, quote));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuoteRecord)> {
        self.entries.iter().map(|(name, quote)| (name.as_str(), quote))
    }

    pub fn insurers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn position(&self, insurer: &str) -> Option<usize> {
        self.entries.iter().position(|(name, _)| name == insurer)
    }
}

impl FromIterator<(InsurerName, QuoteRecord)> for Quotes {
    fn from_iter<I: IntoIterator<Item = (InsurerName, QuoteRecord)>>(iter: I) -> Self {
        let mut quotes = Quotes::new();
        for (insurer, quote) in iter {
            quotes.insert(insurer, quote);
        }
        quotes
    }
}

impl Serialize for Quotes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (insurer, quote) in &self.entries {
            map.serialize_entry(insurer, quote)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Quotes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut quotes = Quotes::new();
        for (insurer, value) in raw {
            match value {
                Value::Object(fields) => {
                    quotes.insert(insurer, QuoteRecord::from_map(fields));
                }
                other => {
                    return Err(de::Error::custom(format!(
                        "quote for {insurer} must be an object, got {other}"
                    )));
                }
            }
        }
        Ok(quotes)
    }
}

// ---------------------------------------------------------------------------
// Master record
// ---------------------------------------------------------------------------

/// The aggregated comparison record. A single extracted document has the
/// same shape, usually with one insurer under `quotes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    #[serde(default)]
    pub general_info: Map<String, Value>,
    #[serde(default, alias = "Quotes")]
    pub quotes: Quotes,
}

impl MasterRecord {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for MasterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let insurers: Vec<&str> = self.quotes.insurers().collect();
        write!(
            f,
            "general_info={} fields | quotes={} [{}]",
            self.general_info.len(),
            self.quotes.len(),
            insurers.join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Pricing parameters
// ---------------------------------------------------------------------------

/// How the broker fee is charged for a report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerFeeMode {
    /// Percentage of base premium, topped up by any commission shortfall.
    Percentage,
    /// Flat dollar fee, topped up when the quote carries no commission.
    Fixed(Decimal),
}

impl fmt::Display for BrokerFeeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerFeeMode::Percentage => write!(f, "percentage"),
            BrokerFeeMode::Fixed(fee) => write!(f, "fixed {}", money::format_currency(*fee)),
        }
    }
}

/// Caller-supplied pricing terms. Never persisted in the master record.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingParams {
    pub broker_fee_pct: Decimal,
    pub commission_pct: Decimal,
    pub associate_split_pct: Decimal,
    pub fixed_broker_fee: Decimal,
    pub strata_manager: Option<String>,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            broker_fee_pct: dec!(20),
            commission_pct: dec!(20),
            associate_split_pct: Decimal::ZERO,
            fixed_broker_fee: Decimal::ZERO,
            strata_manager: None,
        }
    }
}

impl PricingParams {
    /// Build validated pricing parameters.
    pub fn new(
        broker_fee_pct: Decimal,
        commission_pct: Decimal,
        associate_split_pct: Decimal,
        fixed_broker_fee: Decimal,
        strata_manager: Option<String>,
    ) -> Result<Self, QuoteError> {
        let params = Self {
            broker_fee_pct,
            commission_pct,
            associate_split_pct,
            fixed_broker_fee,
            strata_manager,
        };
        params.validate()?;
        Ok(params)
    }

    /// Percentage-mode parameters with no strata manager.
    pub fn percentage(
        broker_fee_pct: Decimal,
        commission_pct: Decimal,
        associate_split_pct: Decimal,
    ) -> Result<Self, QuoteError> {
        Self::new(broker_fee_pct, commission_pct, associate_split_pct, Decimal::ZERO, None)
    }

    pub fn validate(&self) -> Result<(), QuoteError> {
        check_pct("broker_fee_pct", self.broker_fee_pct)?;
        check_pct("commission_pct", self.commission_pct)?;
        check_pct("associate_split_pct", self.associate_split_pct)?;
        if self.fixed_broker_fee < Decimal::ZERO {
            return Err(QuoteError::InvalidPricing {
                name: "fixed_broker_fee",
                value: self.fixed_broker_fee,
                reason: "must not be negative",
            });
        }
        Ok(())
    }

    pub fn fee_mode(&self) -> BrokerFeeMode {
        if self.fixed_broker_fee > Decimal::ZERO {
            BrokerFeeMode::Fixed(self.fixed_broker_fee)
        } else {
            BrokerFeeMode::Percentage
        }
    }
}

fn check_pct(name: &'static str, value: Decimal) -> Result<(), QuoteError> {
    if value < Decimal::ZERO || value > dec!(100) {
        return Err(QuoteError::InvalidPricing {
            name,
            value,
            reason: "must be between 0 and 100",
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Enriched quote
// ---------------------------------------------------------------------------

/// Intermediate broker-fee terms, kept for audit and logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBreakdown {
    pub mode: BrokerFeeMode,
    /// Percentage points added to the broker fee (percentage mode).
    pub commission_shortfall_pct: Decimal,
    /// Dollars added to the fixed fee (fixed mode).
    pub commission_adjustment: Decimal,
}

/// A quote plus the derived commercial terms for one pricing run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedQuote {
    pub insurer: InsurerName,
    pub quote: QuoteRecord,
    pub broker_fee: Decimal,
    pub broker_gst: Decimal,
    pub remuneration: Decimal,
    pub sm_remuneration: Decimal,
    pub broker_remuneration: Decimal,
    pub final_total: Decimal,
    pub breakdown: FeeBreakdown,
}

impl EnrichedQuote {
    /// Derived fields paired with their names, in derivation order.
    pub fn derived(&self) -> [(&'static str, Decimal); 6] {
        [
            (DERIVED_FIELDS[0], self.broker_fee),
            (DERIVED_FIELDS[1], self.broker_gst),
            (DERIVED_FIELDS[2], self.remuneration),
            (DERIVED_FIELDS[3], self.sm_remuneration),
            (DERIVED_FIELDS[4], self.broker_remuneration),
            (DERIVED_FIELDS[5], self.final_total),
        ]
    }

    /// The quote's fields, then the derived fields, then `insurer`.
    /// Derived names win over quote fields of the same name.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (field, value) in self.quote.iter() {
            if field == fields::INSURER || DERIVED_FIELDS.contains(&field.as_str()) {
                continue;
            }
            out.insert(field.clone(), value.clone());
        }
        for (name, amount) in self.derived() {
            out.insert(name.to_string(), money::to_json(amount));
        }
        out.insert(fields::INSURER.to_string(), Value::String(self.insurer.clone()));
        out
    }
}

impl Serialize for EnrichedQuote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.to_fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (k, v) in &fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for EnrichedQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] total={} broker_fee={} ({}) broker_gst={} final={}",
            self.insurer,
            money::format_currency(self.quote.total()),
            money::format_currency(self.broker_fee),
            self.breakdown.mode,
            money::format_currency(self.broker_gst),
            money::format_currency(self.final_total),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid pricing parameter {name} = {value}: {reason}")]
    InvalidPricing {
        name: &'static str,
        value: Decimal,
        reason: &'static str,
    },

    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    #[error("Extraction error ({model}): {message}")]
    Extraction { model: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quote(value: Value) -> QuoteRecord {
        match value {
            Value::Object(map) => QuoteRecord::from_map(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!(0)));
        assert!(is_blank(&json!(0.0)));
        assert!(is_blank(&json!(null)));
        assert!(!is_blank(&json!(" ")));
        assert!(!is_blank(&json!("Included")));
        assert!(!is_blank(&json!(12.5)));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!({})));
    }

    #[test]
    fn test_quote_accessors_coerce() {
        let q = quote(json!({"base": 10000, "total": "12000.50", "commission_without_gst": "n/a"}));
        assert_eq!(q.base(), dec!(10000));
        assert_eq!(q.total(), dec!(12000.50));
        assert_eq!(q.commission_without_gst(), Decimal::ZERO);
        assert_eq!(q.amount("missing"), Decimal::ZERO);
        assert_eq!(q.text("missing"), "");
    }

    #[test]
    fn test_quotes_insertion_order() {
        let mut quotes = Quotes::new();
        quotes.insert("SUU", QuoteRecord::new());
        quotes.insert("CHU", QuoteRecord::new());
        quotes.insert("Axis", QuoteRecord::new());
        let order: Vec<&str> = quotes.insurers().collect();
        assert_eq!(order, vec!["SUU", "CHU", "Axis"]);
    }

    #[test]
    fn test_quotes_replace_keeps_position() {
        let mut quotes = Quotes::new();
        quotes.insert("A", quote(json!({"base": 1})));
        quotes.insert("B", QuoteRecord::new());
        let old = quotes.insert("A", quote(json!({"base": 2})));
        assert_eq!(old.unwrap().base(), dec!(1));
        assert_eq!(quotes.insurers().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(quotes.get("A").unwrap().base(), dec!(2));
    }

    #[test]
    fn test_master_record_deserialize_preserves_order_and_alias() {
        let raw = r#"{
            "general_info": {"scheme_name": "Clearlake", "bsi": 5000000},
            "Quotes": {
                "SUU": {"base": 100},
                "CHU": {"base": 200, "custom_field": "kept"}
            }
        }"#;
        let record: MasterRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.quotes.insurers().collect::<Vec<_>>(), vec!["SUU", "CHU"]);
        assert_eq!(record.quotes.get("CHU").unwrap().text("custom_field"), "kept");
        assert_eq!(record.general_info["scheme_name"], json!("Clearlake"));

        let out = serde_json::to_value(&record).unwrap();
        assert!(out.get("quotes").is_some());
        assert_eq!(out["quotes"]["CHU"]["base"], json!(200));
    }

    #[test]
    fn test_quotes_reject_non_object() {
        let raw = r#"{"quotes": {"CHU": 5}}"#;
        assert!(serde_json::from_str::<MasterRecord>(raw).is_err());
    }

    #[test]
    fn test_pricing_validation() {
        assert!(PricingParams::percentage(dec!(20), dec!(20), dec!(0)).is_ok());
        assert!(PricingParams::percentage(dec!(101), dec!(20), dec!(0)).is_err());
        assert!(PricingParams::percentage(dec!(20), dec!(-1), dec!(0)).is_err());
        assert!(PricingParams::percentage(dec!(20), dec!(20), dec!(100.5)).is_err());
        let err = PricingParams::new(dec!(20), dec!(20), dec!(0), dec!(-5), None).unwrap_err();
        assert!(err.to_string().contains("fixed_broker_fee"));
    }

    #[test]
    fn test_fee_mode() {
        let pct = PricingParams::default();
        assert_eq!(pct.fee_mode(), BrokerFeeMode::Percentage);
        let fixed = PricingParams { fixed_broker_fee: dec!(500), ..PricingParams::default() };
        assert_eq!(fixed.fee_mode(), BrokerFeeMode::Fixed(dec!(500)));
    }

    #[test]
    fn test_enriched_to_fields_order_and_override() {
        let enriched = EnrichedQuote {
            insurer: "CHU".into(),
            quote: quote(json!({"base": 100, "final_total": 1, "total": 110})),
            broker_fee: dec!(20),
            broker_gst: dec!(2),
            remuneration: dec!(20),
            sm_remuneration: Decimal::ZERO,
            broker_remuneration: dec!(20),
            final_total: dec!(132),
            breakdown: FeeBreakdown {
                mode: BrokerFeeMode::Percentage,
                commission_shortfall_pct: Decimal::ZERO,
                commission_adjustment: Decimal::ZERO,
            },
        };
        let fields = enriched.to_fields();
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "base", "total", "broker_fee", "broker_gst", "remuneration",
                "sm_remuneration", "broker_remuneration", "final_total", "insurer"
            ]
        );
        assert_eq!(fields["final_total"], json!(132));
        assert_eq!(fields["insurer"], json!("CHU"));
    }
}
