//! Canonical quote schema and the extraction-boundary coercion table.
//!
//! The schema is an exemplar document: `""` declares a text field, a number
//! declares a numeric field and an object declares a mapping whose children
//! are declared the same way. Every extracted document is conformed against
//! it once, before it reaches the merge engine:
//!
//! | incoming             | numeric field   | text field          | undeclared |
//! |----------------------|-----------------|---------------------|------------|
//! | absent / null        | `0`             | `""`                | `""`       |
//! | zero                 | `0`             | `""`                | kept       |
//! | other number         | kept            | rendered as text    | kept       |
//! | `"$1,234.50"`        | `1234.5`        | kept                | kept       |
//! | other string         | `0`             | kept                | kept       |
//! | bool                 | `0`             | `"true"`/`"false"`  | kept       |
//! | object / array       | `0`             | `""`                | kept       |
//!
//! Undeclared sub-keys of a mapping whose declared children all share one
//! scalar kind are coerced with that kind; other undeclared keys are kept
//! as-is so newer extracts survive older schemas.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::money;
use crate::types::{fields, is_blank, MasterRecord, QuoteError, QuoteRecord, Quotes};

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Number,
    Mapping {
        fields: Vec<(String, FieldKind)>,
        /// Kind applied to undeclared sub-keys, when the declared ones agree.
        extra: Option<Box<FieldKind>>,
    },
    /// Arrays and anything else the schema does not constrain.
    Any,
}

impl FieldKind {
    /// Infer a kind from an exemplar value.
    pub fn from_exemplar(value: &Value) -> FieldKind {
        match value {
            Value::String(_) | Value::Null | Value::Bool(_) => FieldKind::Text,
            Value::Number(_) => FieldKind::Number,
            Value::Object(map) => {
                let fields = declare(map);
                let extra = shared_scalar_kind(&fields).map(Box::new);
                FieldKind::Mapping { fields, extra }
            }
            Value::Array(_) => FieldKind::Any,
        }
    }

    /// The type-preserving "no information" value.
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::Number => Value::from(0),
            FieldKind::Mapping { fields, .. } => Value::Object(
                fields
                    .iter()
                    .map(|(name, kind)| (name.clone(), kind.default_value()))
                    .collect(),
            ),
            FieldKind::Any => Value::String(String::new()),
        }
    }

    /// Apply the coercion table.
    pub fn coerce(&self, value: Value) -> Value {
        match self {
            FieldKind::Text => match value {
                Value::Null | Value::Object(_) | Value::Array(_) => Value::String(String::new()),
                Value::String(s) => Value::String(s),
                // Zero is the blank sentinel and must stay blank as text.
                Value::Number(n) if n.as_f64() == Some(0.0) => Value::String(String::new()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
            },
            FieldKind::Number => match value {
                Value::Number(n) => Value::Number(n),
                Value::String(s) => money::parse_amount(&s)
                    .map(money::to_json)
                    .unwrap_or_else(|| Value::from(0)),
                _ => Value::from(0),
            },
            FieldKind::Mapping { fields, extra } => match value {
                Value::Object(map) => Value::Object(conform_map(fields, extra.as_deref(), map)),
                _ => self.default_value(),
            },
            FieldKind::Any => match value {
                Value::Null => self.default_value(),
                other => other,
            },
        }
    }
}

fn declare(map: &Map<String, Value>) -> Vec<(String, FieldKind)> {
    map.iter()
        .map(|(name, value)| (name.clone(), FieldKind::from_exemplar(value)))
        .collect()
}

fn shared_scalar_kind(fields: &[(String, FieldKind)]) -> Option<FieldKind> {
    let (_, first) = fields.first()?;
    if !matches!(first, FieldKind::Text | FieldKind::Number) {
        return None;
    }
    fields
        .iter()
        .all(|(_, kind)| kind == first)
        .then(|| first.clone())
}

/// Declared fields first, in schema order, then undeclared ones in incoming order.
fn conform_map(
    declared: &[(String, FieldKind)],
    extra: Option<&FieldKind>,
    incoming: Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, kind) in declared {
        let value = match incoming.get(name) {
            Some(v) => kind.coerce(v.clone()),
            None => kind.default_value(),
        };
        out.insert(name.clone(), value);
    }

    let known: HashSet<&str> = declared.iter().map(|(name, _)| name.as_str()).collect();
    for (name, value) in incoming {
        if known.contains(name.as_str()) {
            continue;
        }
        let value = match (extra, value) {
            (Some(kind), v) => kind.coerce(v),
            (None, Value::Null) => Value::String(String::new()),
            (None, v) => v,
        };
        out.insert(name, value);
    }
    out
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Declared shape of general info and of one insurer's quote.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSchema {
    general_info: Vec<(String, FieldKind)>,
    quote: Vec<(String, FieldKind)>,
    exemplar: Value,
}

impl Default for QuoteSchema {
    fn default() -> Self {
        Self::builtin()
    }
}

impl QuoteSchema {
    /// Strata building schema used when no schema file is configured.
    pub fn builtin() -> Self {
        let general_info = json!({
            "scheme_name": "",
            "strata_plan_number": "",
            "property_address": "",
            "building_sum_insured": 0,
            "renewal_date": "",
            "current_insurer": ""
        });
        let quote = json!({
            "underwriter": "",
            "base": 0,
            "esl": 0,
            "gst": 0,
            "stamp": 0,
            "uw": 0,
            "uwgst": 0,
            "uwgst_fee": 0,
            "commission_without_gst": 0,
            "total": 0,
            "features": {
                "Building": "",
                "Common Contents": "",
                "Loss of Rent": "",
                "Public Liability": "",
                "Voluntary Workers": "",
                "Fidelity Guarantee": "",
                "Office Bearers Liability": "",
                "Machinery Breakdown": "",
                "Catastrophe": "",
                "Government Audit Costs": "",
                "Legal Expenses": "",
                "Flood": ""
            },
            "excesses": {
                "Property Claims": "",
                "Malicious Damage": "",
                "Flood": "",
                "Burst Pipe": "",
                "Storm": "",
                "Earthquake": "",
                "Liability Claims": "",
                "Voluntary Workers Claims": "",
                "Fidelity Claims": "",
                "Equipment Breakdown Claims": "",
                "Office Bearers Liability": ""
            },
            "conditions_or_endorsements": ""
        });
        match (general_info, quote) {
            (Value::Object(g), Value::Object(q)) => Self::from_parts(&g, &q),
            _ => unreachable!("builtin schema literals are objects"),
        }
    }

    /// Build from an exemplar of the form
    /// `{"general_info": {...}, "quote": {...}}`. The extraction-prompt form
    /// `{"general_info": {...}, "quotes": {"<insurer>": {...}}}` is accepted
    /// too; its first quote is the template.
    pub fn from_exemplar(exemplar: &Value) -> Result<Self, QuoteError> {
        let root = exemplar
            .as_object()
            .ok_or_else(|| QuoteError::InvalidDocument("schema root must be an object".into()))?;

        let general = match root.get("general_info") {
            Some(Value::Object(map)) => map.clone(),
            None => Map::new(),
            Some(_) => {
                return Err(QuoteError::InvalidDocument(
                    "schema general_info must be an object".into(),
                ))
            }
        };

        let quote = match (root.get("quote"), quotes_value(root)) {
            (Some(Value::Object(map)), _) => map.clone(),
            (None, Some(Value::Object(quotes))) => match quotes.values().next() {
                Some(Value::Object(map)) => map.clone(),
                _ => {
                    return Err(QuoteError::InvalidDocument(
                        "schema quotes must hold one quote template object".into(),
                    ))
                }
            },
            _ => {
                return Err(QuoteError::InvalidDocument(
                    "schema needs a quote template object".into(),
                ))
            }
        };

        Ok(Self::from_parts(&general, &quote))
    }

    /// Load an exemplar schema from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        let exemplar: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))?;
        let schema = Self::from_exemplar(&exemplar)?;
        debug!(
            path = %path.display(),
            general_fields = schema.general_info.len(),
            quote_fields = schema.quote.len(),
            "Schema loaded"
        );
        Ok(schema)
    }

    fn from_parts(general: &Map<String, Value>, quote: &Map<String, Value>) -> Self {
        let exemplar = json!({
            "general_info": Value::Object(general.clone()),
            "quotes": { "<INSURER>": Value::Object(quote.clone()) }
        });
        Self {
            general_info: declare(general),
            quote: declare(quote),
            exemplar,
        }
    }

    /// Exemplar in the document shape an extractor must return.
    pub fn exemplar(&self) -> &Value {
        &self.exemplar
    }

    /// Declared kind of a quote field.
    pub fn quote_field(&self, name: &str) -> Option<&FieldKind> {
        self.quote.iter().find(|(n, _)| n == name).map(|(_, kind)| kind)
    }

    /// Empty master record seeded with the declared general info defaults.
    pub fn base_record(&self) -> MasterRecord {
        MasterRecord {
            general_info: conform_map(&self.general_info, None, Map::new()),
            quotes: Quotes::new(),
        }
    }

    /// Validate and coerce one raw extracted document.
    pub fn conform_document(&self, raw: Value) -> Result<MasterRecord, QuoteError> {
        let Value::Object(root) = raw else {
            return Err(QuoteError::InvalidDocument(
                "document root must be an object".into(),
            ));
        };

        let general_info = match root.get("general_info") {
            None | Some(Value::Null) => conform_map(&self.general_info, None, Map::new()),
            Some(Value::Object(map)) => conform_map(&self.general_info, None, map.clone()),
            Some(other) => {
                return Err(QuoteError::InvalidDocument(format!(
                    "general_info must be an object, got {}",
                    kind_name(other)
                )))
            }
        };

        let mut quotes = Quotes::new();
        match quotes_value(&root) {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (insurer, value) in map {
                    let insurer = insurer.trim();
                    if insurer.is_empty() {
                        return Err(QuoteError::InvalidDocument(
                            "quote with an empty insurer name".into(),
                        ));
                    }
                    let Value::Object(fields) = value else {
                        return Err(QuoteError::InvalidDocument(format!(
                            "quote for {insurer} must be an object, got {}",
                            kind_name(value)
                        )));
                    };
                    quotes.insert(insurer, self.conform_quote(fields.clone()));
                }
            }
            Some(other) => {
                return Err(QuoteError::InvalidDocument(format!(
                    "quotes must be an object, got {}",
                    kind_name(other)
                )))
            }
        }

        Ok(MasterRecord { general_info, quotes })
    }

    /// Coerce one insurer's raw quote fields.
    pub fn conform_quote(&self, raw: Map<String, Value>) -> QuoteRecord {
        let mut record = QuoteRecord::from_map(conform_map(&self.quote, None, raw));
        self.split_underwriter_gst(&mut record);
        record
    }

    /// Derive the GST-exclusive underwriter fee (and its GST) from a
    /// GST-inclusive printed fee when the exclusive figure is missing.
    fn split_underwriter_gst(&self, record: &mut QuoteRecord) {
        let inclusive = record.amount(fields::UW_FEE_INC_GST);
        if inclusive.is_zero() || !record.get(fields::UW_FEE).map_or(true, is_blank) {
            return;
        }
        let (exclusive, gst) = money::split_gst_inclusive(inclusive);
        let uw_kind = self.quote_field(fields::UW_FEE).unwrap_or(&FieldKind::Number);
        record.insert(fields::UW_FEE, uw_kind.coerce(money::to_json(exclusive)));

        if record.get(fields::UW_GST).map_or(true, is_blank) {
            let gst_kind = self.quote_field(fields::UW_GST).unwrap_or(&FieldKind::Number);
            record.insert(fields::UW_GST, gst_kind.coerce(money::to_json(gst)));
        }
        debug!(%inclusive, %exclusive, %gst, "Split GST out of underwriter fee");
    }
}

fn quotes_value(root: &Map<String, Value>) -> Option<&Value> {
    root.get("quotes").or_else(|| root.get("Quotes"))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
