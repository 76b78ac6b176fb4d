//! Extraction prompt and response parsing, shared by every provider.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::schema::QuoteSchema;

const GUIDELINES: &str = "\
Guidelines:
- If the quote doesn't mention a value, leave it blank (\"\") or 0.
- Copy the schema's value types exactly: where the schema has a string, output a string; where it has a number, output a number.
- Use the insurer's short name as the key under \"quotes\".
- Extract every excess and limit that is specified.
- Only return the completed JSON object.

Important to know when extracting:
- BSI is the building sum insured. It may be called \"building\", is usually one of the first values and is in the hundreds of thousands or millions.
- For conditions, ignore anything about time, such as how long the quotation is valid for.
- If the underwriter or strata fee is quoted including GST, put the GST-inclusive amount in uwgst_fee and leave uw and uwgst as 0.
- Any additional levies are included in the ESL. ESL is also called FSL.
- Machinery breakdown is often called equipment breakdown.
- Voluntary workers compensation is also known as personal accident.
- Additional benefits are the same as extra benefits or additional limits.
- Some insurers list many excesses (property, liability, voluntary workers, equipment, office bearers, government audit and legal expenses). Extract every one of them.";

/// System prompt embedding the schema exemplar.
pub fn system_prompt(schema: &QuoteSchema) -> String {
    format!(
        "You are an assistant that extracts structured insurance quote data from unstructured quote document text.\n\n\
         Return the data in the following JSON structure:\n{}\n\n{}",
        schema.exemplar(),
        GUIDELINES
    )
}

/// Parse the JSON object out of a model response.
///
/// Tolerates Markdown code fences and prose around the object: the text
/// from the first `{` to the last `}` is parsed.
pub fn parse_extraction(text: &str) -> Result<Value> {
    let body = strip_code_fence(text.trim());

    let start = body
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("No JSON object in extraction response"))?;
    let end = body
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow::anyhow!("Unterminated JSON object in extraction response"))?;

    let value: Value = serde_json::from_str(&body[start..=end])
        .context("Extraction response is not valid JSON")?;

    if !value.is_object() {
        anyhow::bail!("Extraction response is not a JSON object");
    }
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
