//! Field structuring: raw invoice text in, flat candidate fields out.

mod openai;
mod prompt;

pub use openai::OpenAiStructurer;
pub use prompt::{build_system_prompt, build_user_prompt, truncate_chars};

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::StructuringError;
use crate::models::invoice::{CandidateFields, InvoiceField, RawValue};
use crate::normalize::KeyResolver;

/// A service that structures raw invoice text into candidate fields.
///
/// Implementations make a single attempt; retries and timeouts are applied by the caller.
#[async_trait]
pub trait FieldStructurer: Send + Sync {
    async fn structure(&self, text: &str) -> Result<CandidateFields, StructuringError>;
}

/// Turn the model's reply into flat candidate fields.
///
/// Accepts a bare JSON object, one wrapped in markdown fences, or one surrounded by
/// stray text. Nested objects are flattened (outer keys win), nulls are dropped and
/// strings and numbers become scalars. The reply counts as an invoice when at least one
/// key resolves to a required field under the same rules the normalizer applies.
pub fn parse_candidate(
    content: &str,
    keys: &KeyResolver,
) -> Result<CandidateFields, StructuringError> {
    let stripped = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let object = extract_json_object(stripped)?;
    let value: Value = serde_json::from_str(object)
        .map_err(|e| StructuringError::BadShape(format!("invalid JSON: {}", e)))?;

    let Value::Object(map) = value else {
        return Err(StructuringError::BadShape("response is not a JSON object".to_string()));
    };

    let mut fields = CandidateFields::new();
    flatten_into(&map, &mut fields);

    if !keys.has_required(fields.keys()) {
        return Err(StructuringError::Incomplete {
            missing: InvoiceField::required().map(|f| f.key().to_string()).collect(),
        });
    }

    debug!(fields = fields.len(), "Parsed structured response");
    Ok(fields)
}

/// The outermost `{...}` of a string that may carry surrounding text.
fn extract_json_object(s: &str) -> Result<&str, StructuringError> {
    let start = s
        .find('{')
        .ok_or_else(|| StructuringError::BadShape("no JSON object in response".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| StructuringError::BadShape("no JSON object in response".to_string()))?;
    if end <= start {
        return Err(StructuringError::BadShape("malformed JSON object".to_string()));
    }
    Ok(&s[start..=end])
}

fn flatten_into(map: &Map<String, Value>, out: &mut CandidateFields) {
    // Scalars first so a top-level key is never shadowed by a nested one.
    for (key, value) in map {
        if let Some(raw) = scalar(value) {
            out.insert(key.trim().to_string(), raw);
        }
    }

    for (key, value) in map {
        match value {
            Value::Object(nested) => {
                let mut inner = CandidateFields::new();
                flatten_into(nested, &mut inner);
                for (k, v) in inner {
                    out.entry(k).or_insert(v);
                }
            }
            Value::Array(_) | Value::Bool(_) => trace!("Ignoring non-scalar field {}", key),
            _ => {}
        }
    }
}

fn scalar(value: &Value) -> Option<RawValue> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(RawValue::Text(s.trim().to_string())),
        Value::Number(n) => {
            let repr = n.to_string();
            Decimal::from_str(&repr)
                .or_else(|_| Decimal::from_scientific(&repr))
                .map(RawValue::Number)
                .ok()
                .or(Some(RawValue::Text(repr)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::NormalizationConfig;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> Result<CandidateFields, StructuringError> {
        parse_candidate(content, &KeyResolver::default())
    }

    #[test]
    fn test_parses_plain_object() {
        let fields = parse(
            r#"{"nis": "6012355002", "gran_total": 1549.19, "sector": "Residencial", "tarifa": null}"#,
        )
        .unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields.get("gran_total"),
            Some(&RawValue::Number(Decimal::from_str("1549.19").unwrap()))
        );
        assert!(!fields.contains_key("tarifa"));
    }

    #[test]
    fn test_strips_fences_and_chatter() {
        let content = "Claro, aquí está:\n```json\n{\"nis\": \"123\"}\n```";
        let fields = parse(content).unwrap();
        assert_eq!(fields.get("nis"), Some(&RawValue::Text("123".to_string())));
    }

    #[test]
    fn test_flattens_nested_objects() {
        let fields = parse(
            r#"{"nis": "1", "consumo": {"consumo_kwh": 350, "nis": "999"}, "cargos": {"energia": "12,50"}}"#,
        )
        .unwrap();

        assert_eq!(fields.get("nis"), Some(&RawValue::Text("1".to_string())));
        assert_eq!(fields.get("consumo_kwh"), Some(&RawValue::Number(Decimal::from(350))));
        assert_eq!(fields.get("energia"), Some(&RawValue::Text("12,50".to_string())));
    }

    #[test]
    fn test_non_object_is_bad_shape() {
        assert!(matches!(
            parse("[1, 2, 3]"),
            Err(StructuringError::BadShape(_))
        ));
        assert!(matches!(
            parse("no lo sé"),
            Err(StructuringError::BadShape(_))
        ));
        assert!(matches!(
            parse("{\"nis\": "),
            Err(StructuringError::BadShape(_))
        ));
    }

    #[test]
    fn test_no_required_field_is_incomplete() {
        let err = parse(r#"{"tarifa": "BTS", "moneda": "PAB"}"#).unwrap_err();
        match err {
            StructuringError::Incomplete { missing } => {
                assert_eq!(missing, vec!["nis", "sector", "consumo_kwh", "gran_total"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_required_alias_counts() {
        assert!(parse(r#"{"total_a_pagar": "B/. 10,00"}"#).is_ok());
    }

    #[test]
    fn test_required_keys_in_any_spelling() {
        let fields = parse(
            r#"{"NIS": "6012355002", "Sector": "Residencial", "Consumo kWh": 350, "Gran Total": "1.549,19"}"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 4);
        assert!(parse(r#"{"Total a Pagar": "10,00"}"#).is_ok());
    }

    #[test]
    fn test_configured_alias_counts_as_required() {
        let content = r#"{"importe": "10,00", "tarifa": "BTS"}"#;
        assert!(matches!(parse(content), Err(StructuringError::Incomplete { .. })));

        let mut config = NormalizationConfig::default();
        config
            .aliases
            .insert("importe".to_string(), "gran_total".to_string());
        assert!(parse_candidate(content, &KeyResolver::new(&config)).is_ok());
    }
}
