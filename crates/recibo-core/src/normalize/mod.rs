//! Record normalization: candidate fields to the canonical invoice schema.
//!
//! Normalization is pure and deterministic. Problems become warnings on the
//! record, never errors, and normalizing the candidate rebuilt from a record
//! yields the same record again.

mod keys;
pub mod rules;

pub use keys::KeyResolver;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::models::config::NormalizationConfig;
use crate::models::invoice::{
    CandidateInvoice, FieldKind, FieldValue, InvoiceField, InvoiceRecord, NormalizationWarning,
    Provenance, RawValue,
};
use rules::{canonical_sector, collapse_whitespace, digits_only, parse_amount, parse_date};

/// Maps candidates onto the canonical schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
    keys: KeyResolver,
    defaults: Vec<(InvoiceField, FieldValue)>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizationConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        let keys = KeyResolver::new(&config);

        let mut defaults = Vec::new();
        if !config.default_currency.trim().is_empty() {
            defaults.push((
                InvoiceField::Currency,
                FieldValue::Text(config.default_currency.trim().to_string()),
            ));
        }
        for (key, value) in &config.defaults {
            let Some(field) = InvoiceField::from_key(key) else {
                warn!("Ignoring default for unknown field {}", key);
                continue;
            };
            if field.is_required() {
                warn!("Ignoring default for required field {}", key);
                continue;
            }
            match coerce(field, &RawValue::Text(value.clone())) {
                Coerced::Value(v) => {
                    defaults.retain(|(f, _)| *f != field);
                    defaults.push((field, v));
                }
                _ => warn!("Ignoring unparseable default {:?} for {}", value, key),
            }
        }

        Self {
            config,
            keys,
            defaults,
        }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Key resolution shared with the structuring step.
    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Resolve a response key to a canonical field.
    pub fn resolve_key(&self, key: &str) -> Option<InvoiceField> {
        self.keys.resolve(key)
    }

    /// Normalize one candidate into a record.
    pub fn normalize(&self, candidate: &CandidateInvoice) -> InvoiceRecord {
        let mut record = InvoiceRecord::new(candidate.source_file.clone());
        let mut seen: BTreeSet<InvoiceField> = BTreeSet::new();

        // Canonical keys take precedence over aliases of the same field.
        let mut resolved: Vec<(bool, InvoiceField, &RawValue)> = Vec::new();
        for (key, raw) in &candidate.values {
            match self.keys.lookup(key) {
                Some((field, canonical)) => resolved.push((canonical, field, raw)),
                None => debug!("Ignoring unknown key {} in {}", key, candidate.source_file),
            }
        }
        resolved.sort_by_key(|(canonical, _, _)| !*canonical);

        for (_, field, raw) in resolved {
            if seen.contains(&field) {
                continue;
            }
            match coerce(field, raw) {
                Coerced::Value(value) => {
                    seen.insert(field);
                    record.set(field, value, Provenance::Extracted);
                }
                Coerced::Unparseable(raw) => {
                    seen.insert(field);
                    record
                        .warnings
                        .push(NormalizationWarning::Unparseable { field, raw });
                }
                Coerced::Empty => {}
            }
        }

        self.canonicalize_sector(&mut record);
        self.apply_sector_rule(&mut record);

        for (field, value) in &self.defaults {
            if !seen.contains(field) && !record.fields.contains_key(field) {
                record.set(*field, value.clone(), Provenance::Defaulted);
            }
        }

        for field in InvoiceField::required() {
            if !seen.contains(&field) && !record.fields.contains_key(&field) {
                record
                    .warnings
                    .push(NormalizationWarning::MissingRequired { field });
            }
        }

        record
            .warnings
            .sort_by_key(|w| (w.field(), warning_rank(w)));

        debug!(
            file = %record.source_file,
            filled = record.filled_count(),
            total = InvoiceField::ALL.len(),
            warnings = record.warnings.len(),
            "Normalized record"
        );
        record
    }

    fn canonicalize_sector(&self, record: &mut InvoiceRecord) {
        let Some(sector) = record.text(InvoiceField::Sector) else {
            return;
        };
        if let Some(label) = canonical_sector(sector, &self.config.sector_labels) {
            if label != sector {
                let label = label.to_string();
                record.set(InvoiceField::Sector, FieldValue::Text(label), Provenance::Extracted);
            }
        }
    }

    /// Fill an absent sector from the consumption type. A present sector is never touched.
    fn apply_sector_rule(&self, record: &mut InvoiceRecord) {
        let rule = &self.config.sector_rule;
        if !rule.promote_consumption_type || record.fields.contains_key(&InvoiceField::Sector) {
            return;
        }
        let Some(consumption_type) = record.text(InvoiceField::ConsumptionType) else {
            return;
        };

        let promoted = match canonical_sector(consumption_type, &self.config.sector_labels) {
            Some(label) => label.to_string(),
            None if !rule.require_known_label => consumption_type.to_string(),
            None => return,
        };

        debug!(
            file = %record.source_file,
            "Sector taken from tipo_consumo: {}", promoted
        );
        record.set(
            InvoiceField::Sector,
            FieldValue::Text(promoted.clone()),
            Provenance::Corrected,
        );
        record
            .warnings
            .push(NormalizationWarning::SectorFromConsumptionType { value: promoted });
    }
}

fn warning_rank(warning: &NormalizationWarning) -> u8 {
    match warning {
        NormalizationWarning::Unparseable { .. } => 0,
        NormalizationWarning::SectorFromConsumptionType { .. } => 1,
        NormalizationWarning::MissingRequired { .. } => 2,
    }
}

enum Coerced {
    Value(FieldValue),
    Unparseable(String),
    Empty,
}

/// Coerce a raw value to the field's kind.
fn coerce(field: InvoiceField, raw: &RawValue) -> Coerced {
    match (field.kind(), raw) {
        (_, RawValue::Text(s)) if s.trim().is_empty() => Coerced::Empty,

        (FieldKind::Text, RawValue::Text(s)) => Coerced::Value(FieldValue::Text(collapse_whitespace(s))),
        (FieldKind::Text, RawValue::Number(n)) => {
            Coerced::Value(FieldValue::Text(n.normalize().to_string()))
        }

        (FieldKind::Identifier, raw) => {
            let text = match raw {
                RawValue::Text(s) => s.clone(),
                RawValue::Number(n) => n.normalize().to_string(),
            };
            let digits = digits_only(&text);
            if digits.is_empty() {
                Coerced::Unparseable(text)
            } else {
                Coerced::Value(FieldValue::Text(digits))
            }
        }

        (FieldKind::Amount | FieldKind::Quantity, RawValue::Number(n)) => {
            Coerced::Value(FieldValue::Number(*n))
        }
        (FieldKind::Amount | FieldKind::Quantity, RawValue::Text(s)) => match parse_amount(s) {
            Some(n) => Coerced::Value(FieldValue::Number(n)),
            None => Coerced::Unparseable(s.clone()),
        },

        (FieldKind::Date, RawValue::Text(s)) => match parse_date(s) {
            Some(d) => Coerced::Value(FieldValue::Date(d)),
            None => Coerced::Unparseable(s.clone()),
        },
        (FieldKind::Date, RawValue::Number(n)) => Coerced::Unparseable(n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::SectorRule;
    use crate::models::invoice::CandidateFields;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn candidate(pairs: &[(&str, &str)]) -> CandidateInvoice {
        let values: CandidateFields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::Text(v.to_string())))
            .collect();
        CandidateInvoice::new("factura.pdf", values)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn full_candidate() -> CandidateInvoice {
        candidate(&[
            ("nis", "6012355 002"),
            ("sector", "RESIDENCIAL"),
            ("consumo_kwh", "1.234"),
            ("gran_total", "B/. 1.549,19"),
            ("fecha_vencimiento", "15 de enero de 2024"),
            ("tipo_consumo", "Normal"),
        ])
    }

    #[test]
    fn test_normalizes_complete_candidate() {
        let record = Normalizer::default().normalize(&full_candidate());

        assert!(record.warnings.is_empty(), "{:?}", record.warnings);
        assert!(record.is_complete());
        assert_eq!(record.text(InvoiceField::Nis), Some("6012355002"));
        assert_eq!(record.text(InvoiceField::Sector), Some("Residencial"));
        assert_eq!(record.number(InvoiceField::AmountDue), Some(dec("1549.19")));
        assert_eq!(record.number(InvoiceField::ConsumptionKwh), Some(dec("1.234")));
        assert_eq!(
            record.date(InvoiceField::DueDate),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(record.text(InvoiceField::Currency), Some("PAB"));
        assert_eq!(record.provenance(InvoiceField::Currency), Provenance::Defaulted);
        assert_eq!(record.source_file, "factura.pdf");
    }

    #[test]
    fn test_sector_promoted_from_consumption_type() {
        let record = Normalizer::default().normalize(&candidate(&[
            ("nis", "1"),
            ("consumo_kwh", "10"),
            ("gran_total", "5"),
            ("tipo_consumo", "comercial"),
        ]));

        assert_eq!(record.text(InvoiceField::Sector), Some("Comercial"));
        assert_eq!(record.provenance(InvoiceField::Sector), Provenance::Corrected);
        assert_eq!(record.text(InvoiceField::ConsumptionType), Some("comercial"));
        assert_eq!(
            record.warnings,
            vec![NormalizationWarning::SectorFromConsumptionType {
                value: "Comercial".to_string()
            }]
        );
    }

    #[test]
    fn test_explicit_sector_never_overwritten() {
        let record = Normalizer::default().normalize(&candidate(&[
            ("sector", "Industrial"),
            ("tipo_consumo", "Residencial"),
        ]));

        assert_eq!(record.text(InvoiceField::Sector), Some("Industrial"));
        assert_eq!(record.provenance(InvoiceField::Sector), Provenance::Extracted);
    }

    #[test]
    fn test_unknown_consumption_type_not_promoted_by_default() {
        let record = Normalizer::default().normalize(&candidate(&[("tipo_consumo", "Normal")]));
        assert_eq!(record.get(InvoiceField::Sector), None);
        assert!(record
            .warnings
            .contains(&NormalizationWarning::MissingRequired { field: InvoiceField::Sector }));

        let config = NormalizationConfig {
            sector_rule: SectorRule {
                promote_consumption_type: true,
                require_known_label: false,
            },
            ..NormalizationConfig::default()
        };
        let record = Normalizer::new(config).normalize(&candidate(&[("tipo_consumo", "Normal")]));
        assert_eq!(record.text(InvoiceField::Sector), Some("Normal"));
    }

    #[test]
    fn test_sector_rule_can_be_disabled() {
        let config = NormalizationConfig {
            sector_rule: SectorRule {
                promote_consumption_type: false,
                require_known_label: true,
            },
            ..NormalizationConfig::default()
        };
        let record = Normalizer::new(config).normalize(&candidate(&[("tipo_consumo", "Residencial")]));
        assert_eq!(record.get(InvoiceField::Sector), None);
    }

    #[test]
    fn test_missing_required_fields_are_warnings() {
        let record = Normalizer::default().normalize(&candidate(&[("nis", "123"), ("sector", "Comercial")]));

        assert!(!record.is_complete());
        assert_eq!(
            record.warnings,
            vec![
                NormalizationWarning::MissingRequired { field: InvoiceField::ConsumptionKwh },
                NormalizationWarning::MissingRequired { field: InvoiceField::AmountDue },
            ]
        );
    }

    #[test]
    fn test_unparseable_values() {
        let record = Normalizer::default().normalize(&candidate(&[
            ("nis", "sin número"),
            ("gran_total", "ver reverso"),
            ("fecha_emision", "ayer"),
            ("fecha_vencimiento", "15/01/1024"),
        ]));

        assert_eq!(record.get(InvoiceField::AmountDue), None);
        assert_eq!(record.get(InvoiceField::DueDate), None);
        assert!(record.warnings.contains(&NormalizationWarning::Unparseable {
            field: InvoiceField::DueDate,
            raw: "15/01/1024".to_string(),
        }));
        assert!(record.warnings.contains(&NormalizationWarning::Unparseable {
            field: InvoiceField::AmountDue,
            raw: "ver reverso".to_string(),
        }));
        assert!(record.warnings.contains(&NormalizationWarning::Unparseable {
            field: InvoiceField::Nis,
            raw: "sin número".to_string(),
        }));
        assert!(!record
            .warnings
            .contains(&NormalizationWarning::MissingRequired { field: InvoiceField::AmountDue }));
    }

    #[test]
    fn test_aliases_and_key_spelling() {
        let mut config = NormalizationConfig::default();
        config
            .aliases
            .insert("Importe Total".to_string(), "gran_total".to_string());
        let normalizer = Normalizer::new(config);

        let record = normalizer.normalize(&candidate(&[
            ("NIS", "42"),
            ("importe_total", "10,00"),
            ("Total Este Mes", "7,00"),
        ]));
        assert_eq!(record.text(InvoiceField::Nis), Some("42"));
        assert_eq!(record.number(InvoiceField::AmountDue), Some(dec("10.00")));
        assert_eq!(record.number(InvoiceField::MonthTotal), Some(dec("7.00")));
    }

    #[test]
    fn test_canonical_key_beats_alias() {
        let record = Normalizer::default().normalize(&candidate(&[
            ("gran_total", "20,00"),
            ("total_a_pagar", "99,00"),
        ]));
        assert_eq!(record.number(InvoiceField::AmountDue), Some(dec("20.00")));
    }

    #[test]
    fn test_configured_defaults() {
        let mut config = NormalizationConfig::default();
        config.defaults.insert("tarifa".to_string(), "BTS".to_string());
        config.defaults.insert("gran_total".to_string(), "0".to_string());
        let record = Normalizer::new(config).normalize(&candidate(&[]));

        assert_eq!(record.text(InvoiceField::Tariff), Some("BTS"));
        assert_eq!(record.provenance(InvoiceField::Tariff), Provenance::Defaulted);
        assert_eq!(record.get(InvoiceField::AmountDue), None);
    }

    #[test]
    fn test_numbers_pass_through() {
        let mut values = CandidateFields::new();
        values.insert("gran_total".to_string(), RawValue::Number(dec("12.5")));
        values.insert("nis".to_string(), RawValue::Number(dec("6012355002")));
        let record = Normalizer::default().normalize(&CandidateInvoice::new("x.pdf", values));

        assert_eq!(record.number(InvoiceField::AmountDue), Some(dec("12.5")));
        assert_eq!(record.text(InvoiceField::Nis), Some("6012355002"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = Normalizer::default();
        let candidates = vec![
            full_candidate(),
            candidate(&[("tipo_consumo", "residencial"), ("total_a_pagar", "1,00")]),
            candidate(&[("nis", "abc"), ("periodo_desde", "01/02/2024"), ("fecha", "pronto")]),
            candidate(&[]),
        ];

        for c in candidates {
            let once = normalizer.normalize(&c);
            let twice = normalizer.normalize(&CandidateInvoice::from(&once));
            assert_eq!(once, twice);
        }
    }
}
