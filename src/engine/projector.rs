//! Report data projection.
//!
//! Flattens the master record and the priced quotes into the string map
//! the document renderer substitutes into its template. The renderer's
//! placeholder syntax and table layout are not this module's concern.

use rust_decimal::Decimal;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::engine::{enricher, selector};
use crate::money;
use crate::types::{fields, EnrichedQuote, InsurerName, MasterRecord, PricingParams};

/// Underwriter fee identifiers rendered as raw values.
pub const DEFAULT_UNFORMATTED_FIELDS: [&str; 3] =
    [fields::UW_FEE, fields::UW_GST, fields::UW_FEE_INC_GST];

const RECOMMENDED_PREFIX: &str = "recommended";
const RECOMMENDED_COMMENT: &str = "Recommended";
const NO_RESPONSE_COMMENT: &str = "Insurer did not respond in time";

/// Formatting options for the flat map.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    /// Field names whose values stay unformatted.
    pub unformatted_fields: BTreeSet<String>,
    /// Insurers approached for the market summary, with their underwriter.
    pub panel: Vec<PanelMember>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            unformatted_fields: DEFAULT_UNFORMATTED_FIELDS.iter().map(|f| f.to_string()).collect(),
            panel: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelMember {
    pub insurer: InsurerName,
    pub underwriter: String,
}

/// One row of the market summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub insurer: InsurerName,
    pub label: String,
    /// `None` when the insurer has no priced quote.
    pub final_total: Option<Decimal>,
    pub comment: String,
}

/// Everything the renderer consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub fields: BTreeMap<String, String>,
    #[serde(serialize_with = "by_insurer")]
    pub enriched: Vec<EnrichedQuote>,
    pub recommended: Option<EnrichedQuote>,
    pub summary: Vec<SummaryRow>,
}

fn by_insurer<S: Serializer>(enriched: &[EnrichedQuote], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(enriched.len()))?;
    for quote in enriched {
        map.serialize_entry(&quote.insurer, quote)?;
    }
    map.end()
}

/// Enrich, pick the recommendation and flatten.
pub fn project(master: &MasterRecord, params: &PricingParams, settings: &ReportSettings) -> ReportData {
    let enriched = enricher::enrich_all(&master.quotes, params);
    let recommended = selector::select(&enriched).cloned();

    let mut flat = BTreeMap::new();

    for (key, value) in &master.general_info {
        flat.insert(key.clone(), render_plain(value));
    }

    for quote in &enriched {
        flatten_quote(&mut flat, &quote.insurer, &quote.to_fields(), settings);
    }

    if let Some(pick) = &recommended {
        flatten_quote(&mut flat, RECOMMENDED_PREFIX, &pick.to_fields(), settings);
    }

    flat.insert("broker_fee_pct".into(), money::format_percent(params.broker_fee_pct));
    flat.insert("commission_pct".into(), money::format_percent(params.commission_pct));
    flat.insert("associate_split_pct".into(), money::format_percent(params.associate_split_pct));
    flat.insert("fixed_broker_fee".into(), money::format_currency(params.fixed_broker_fee));
    flat.insert(
        "strata_manager".into(),
        params.strata_manager.clone().unwrap_or_default(),
    );

    let summary = market_summary(&enriched, recommended.as_ref(), &settings.panel);

    info!(
        keys = flat.len(),
        quotes = enriched.len(),
        recommended = recommended.as_ref().map(|r| r.insurer.as_str()).unwrap_or("none"),
        "Report data projected"
    );

    ReportData {
        fields: flat,
        enriched,
        recommended,
        summary,
    }
}

/// `{prefix}.{field}` for every field, plus `{prefix}.{field}.{key}` inside
/// mappings. A mapping's own key holds its compact JSON text.
fn flatten_quote(
    flat: &mut BTreeMap<String, String>,
    prefix: &str,
    quote_fields: &Map<String, Value>,
    settings: &ReportSettings,
) {
    for (field, value) in quote_fields {
        let raw = settings.unformatted_fields.contains(field);
        if let Value::Object(sub) = value {
            for (key, sub_value) in sub {
                flat.insert(format!("{prefix}.{field}.{key}"), render(sub_value, raw));
            }
        }
        flat.insert(format!("{prefix}.{field}"), render(value, raw));
    }
}

/// Currency for numbers (and numeric strings) unless `raw`.
pub fn render(value: &Value, raw: bool) -> String {
    if !raw {
        if let Some(amount) = numeric(value) {
            return money::format_currency(amount);
        }
    }
    render_plain(value)
}

fn numeric(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(_) | Value::String(_) => money::json_decimal(value),
        _ => None,
    }
}

fn render_plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Panel insurers first (in panel order), then any other quoted insurer.
fn market_summary(
    enriched: &[EnrichedQuote],
    recommended: Option<&EnrichedQuote>,
    panel: &[PanelMember],
) -> Vec<SummaryRow> {
    let recommended_insurer = recommended.map(|r| r.insurer.as_str());
    let row = |insurer: &str, label: String| {
        let quote = enriched.iter().find(|q| q.insurer == insurer);
        let final_total = quote.map(|q| q.final_total).filter(|t| !t.is_zero());
        let comment = match quote {
            None => NO_RESPONSE_COMMENT.to_string(),
            Some(_) if recommended_insurer == Some(insurer) => RECOMMENDED_COMMENT.to_string(),
            Some(_) => String::new(),
        };
        SummaryRow {
            insurer: insurer.to_string(),
            label,
            final_total,
            comment,
        }
    };

    let mut rows: Vec<SummaryRow> = panel
        .iter()
        .map(|member| {
            row(
                &member.insurer,
                format!("{} – Underwritten by {}", member.insurer, member.underwriter),
            )
        })
        .collect();

    for quote in enriched {
        if !panel.iter().any(|m| m.insurer == quote.insurer) {
            rows.push(row(&quote.insurer, quote.insurer.clone()));
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
