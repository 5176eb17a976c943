//! Indicator table cells.
//!
//! The indicators column carries a hand-edited JSON blob in one of two
//! shapes. The current shape is an array of indicator objects:
//!
//! ```json
//! [{"indicator_name": "Area", "sections": [{"number": "S1", "amount": "10"}], "total": "10"}]
//! ```
//!
//! The legacy shape is the flattened table itself:
//!
//! ```json
//! {"Area": {"S1": "10", "total": "10"}}
//! ```
//!
//! Both decode to the same [`Indicators`] map. Before decoding, two repairs
//! are applied for malformed input seen in real exports: trailing commas
//! before a closing bracket, and an unterminated `"amount": "-` value. No
//! other repair is attempted.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::models::{Indicators, TOTAL_KEY};

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma pattern"));

static OPEN_DASH_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""amount":\s*"-\s+\}"#).expect("valid dash amount pattern"));

/// Why an indicator blob could not be decoded.
#[derive(Debug)]
pub enum IndicatorError {
    /// The array shape failed to decode.
    ArrayShape(serde_json::Error),
    /// The legacy object shape failed to decode.
    ObjectShape(serde_json::Error),
    /// A legacy table cell held an object or array instead of a scalar.
    NonScalarValue { indicator: String, section: String },
}

impl std::fmt::Display for IndicatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndicatorError::ArrayShape(e) => write!(f, "invalid indicator array: {}", e),
            IndicatorError::ObjectShape(e) => write!(f, "invalid indicator table: {}", e),
            IndicatorError::NonScalarValue { indicator, section } => write!(
                f,
                "indicator '{}' section '{}' is not a scalar value",
                indicator, section
            ),
        }
    }
}

impl std::error::Error for IndicatorError {}

#[derive(Debug, Deserialize)]
struct IndicatorEntry {
    indicator_name: Option<String>,
    #[serde(default)]
    sections: Option<Vec<SectionEntry>>,
    #[serde(default)]
    total: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SectionEntry {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

/// Decodes an indicator cell, degrading to an empty table on any failure.
///
/// Failures are logged and never propagated: a broken indicator cell must
/// not prevent the rest of the record from being stored.
pub fn parse(text: &str) -> Indicators {
    match try_parse(text) {
        Ok(indicators) => indicators,
        Err(e) => {
            warn!(error = %e, raw = text, "failed to parse indicators, using empty table");
            Indicators::new()
        }
    }
}

/// Decodes an indicator cell, reporting why it failed.
///
/// Blank input is an empty table, not an error.
pub fn try_parse(text: &str) -> Result<Indicators, IndicatorError> {
    if text.trim().is_empty() {
        return Ok(Indicators::new());
    }

    let repaired = repair(text);
    if repaired != text {
        debug!(raw = text, repaired = %repaired, "repaired indicators blob");
    }

    if repaired.trim_start().starts_with('[') {
        parse_array_shape(&repaired)
    } else {
        parse_object_shape(&repaired)
    }
}

/// Applies the two known repairs for malformed exports.
pub fn repair(text: &str) -> String {
    let without_trailing_commas = TRAILING_COMMA.replace_all(text, "$1");
    OPEN_DASH_AMOUNT
        .replace_all(&without_trailing_commas, r#""amount": "-"}"#)
        .into_owned()
}

fn parse_array_shape(text: &str) -> Result<Indicators, IndicatorError> {
    let entries: Vec<IndicatorEntry> =
        serde_json::from_str(text).map_err(IndicatorError::ArrayShape)?;

    let mut indicators = Indicators::new();
    for entry in entries {
        let Some(name) = entry.indicator_name else {
            continue;
        };

        let mut sections = BTreeMap::new();
        for section in entry.sections.unwrap_or_default() {
            if let (Some(number), Some(amount)) = (section.number, section.amount) {
                sections.insert(number, amount);
            }
        }
        if let Some(total) = entry.total {
            sections.insert(TOTAL_KEY.to_string(), total);
        }

        // Later entries with the same name replace earlier ones.
        indicators.insert(name, sections);
    }
    Ok(indicators)
}

fn parse_object_shape(text: &str) -> Result<Indicators, IndicatorError> {
    let table: BTreeMap<String, BTreeMap<String, Value>> =
        serde_json::from_str(text).map_err(IndicatorError::ObjectShape)?;

    let mut indicators = Indicators::new();
    for (name, sections) in table {
        let mut values = BTreeMap::new();
        for (section, value) in sections {
            let amount = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(IndicatorError::NonScalarValue {
                        indicator: name,
                        section,
                    })
                }
            };
            values.insert(section, amount);
        }
        indicators.insert(name, values);
    }
    Ok(indicators)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area_table() -> Indicators {
        let mut sections = BTreeMap::new();
        sections.insert("S1".to_string(), "10".to_string());
        sections.insert("total".to_string(), "10".to_string());
        let mut expected = Indicators::new();
        expected.insert("Area".to_string(), sections);
        expected
    }

    #[test]
    fn test_object_shape() {
        assert_eq!(parse(r#"{"Area":{"S1":"10","total":"10"}}"#), area_table());
    }

    #[test]
    fn test_array_shape_flattens_to_same_table() {
        let input = r#"[{"indicator_name":"Area","sections":[{"number":"S1","amount":"10"}],"total":"10"}]"#;
        assert_eq!(parse(input), area_table());
    }

    #[test]
    fn test_object_shape_written_back_parses_equal() {
        let json = serde_json::to_string(&area_table()).unwrap();
        assert_eq!(parse(&json), area_table());
    }

    #[test]
    fn test_trailing_commas_are_repaired() {
        let input = r#"{"Area":{"S1":"10","total":"10",},}"#;
        assert_eq!(parse(input), area_table());

        let input = r#"[{"indicator_name":"Area","sections":[{"number":"S1","amount":"10"},],"total":"10"},]"#;
        assert_eq!(parse(input), area_table());
    }

    #[test]
    fn test_open_dash_amount_is_repaired() {
        let input = r#"[{"indicator_name":"Floors","sections":[{"number":"S1","amount": "- }]}]"#;
        let table = try_parse(input).unwrap();
        assert_eq!(table["Floors"]["S1"], "-");
        assert!(!table["Floors"].contains_key("total"));
    }

    #[test]
    fn test_array_skips_nameless_and_incomplete_entries() {
        let input = r#"[
            {"sections":[{"number":"S1","amount":"1"}]},
            {"indicator_name":"Height","sections":[{"number":null,"amount":"5"},{"number":"S2"},{"number":"S3","amount":"7"}]}
        ]"#;
        let table = parse(input);
        assert_eq!(table.len(), 1);
        assert_eq!(table["Height"].len(), 1);
        assert_eq!(table["Height"]["S3"], "7");
    }

    #[test]
    fn test_array_duplicate_name_last_wins() {
        let input = r#"[
            {"indicator_name":"Area","total":"1"},
            {"indicator_name":"Area","total":"2"}
        ]"#;
        let table = parse(input);
        assert_eq!(table["Area"]["total"], "2");
        assert_eq!(table["Area"].len(), 1);
    }

    #[test]
    fn test_object_shape_accepts_scalar_numbers() {
        let table = parse(r#"{"Area":{"S1":10,"S2":null}}"#);
        assert_eq!(table["Area"]["S1"], "10");
        assert!(!table["Area"].contains_key("S2"));
    }

    #[test]
    fn test_invalid_text_is_empty_table() {
        assert!(parse("definitely not json").is_empty());
        assert!(parse("[{\"indicator_name\": 5}]").is_empty());
        assert!(parse(r#"{"Area":{"S1":{"nested":"x"}}}"#).is_empty());
        assert!(matches!(
            try_parse("{oops"),
            Err(IndicatorError::ObjectShape(_))
        ));
        assert!(matches!(
            try_parse("[oops"),
            Err(IndicatorError::ArrayShape(_))
        ));
    }

    #[test]
    fn test_blank_is_empty_table() {
        assert!(parse("").is_empty());
        assert!(parse("  \n").is_empty());
    }
}
