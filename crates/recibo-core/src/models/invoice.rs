//! Canonical invoice schema for Panamanian electricity bills.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Value type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text, whitespace-collapsed.
    Text,
    /// Digits only (NIS).
    Identifier,
    /// Money, two decimals.
    Amount,
    /// Meter quantity (kWh, kVARh, kW).
    Quantity,
    /// Calendar date.
    Date,
}

/// Static description of a canonical field.
#[derive(Debug)]
pub struct FieldSpec {
    pub field: InvoiceField,
    /// Key used in model responses and JSON output.
    pub key: &'static str,
    /// Spreadsheet column header.
    pub header: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Hint embedded in the structuring prompt.
    pub description: &'static str,
    /// Alternative keys accepted from the model.
    pub aliases: &'static [&'static str],
}

/// The fixed set of fields every invoice record conforms to.
///
/// Declaration order is the schema order used for prompts and export columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvoiceField {
    InvoiceNumber,
    Nis,
    ClientName,
    BillingMonth,
    Tariff,
    Sector,
    ReadingType,
    ConsumptionType,
    PeriodFrom,
    PeriodTo,
    IssueDate,
    DueDate,
    PreviousReading,
    CurrentReading,
    ConsumptionKwh,
    ReactiveKvarh,
    DemandKw,
    FixedCharge,
    Energy,
    Generation,
    Transmission,
    Distribution,
    FuelAdjustment,
    LateInterest,
    Law15Subsidy,
    NonComplianceCompensation,
    MonthTotal,
    PreviousBalance,
    AmountDue,
    Currency,
}

macro_rules! spec {
    ($field:ident, $key:literal, $header:literal, $kind:ident, $required:literal, $desc:literal, [$($alias:literal),*]) => {
        FieldSpec {
            field: InvoiceField::$field,
            key: $key,
            header: $header,
            kind: FieldKind::$kind,
            required: $required,
            description: $desc,
            aliases: &[$($alias),*],
        }
    };
}

static SPECS: [FieldSpec; 30] = [
    spec!(InvoiceNumber, "numero_factura", "Número de factura", Text, false,
        "número o código de la factura", ["no_factura", "factura", "numero_de_factura"]),
    spec!(Nis, "nis", "NIS", Identifier, true,
        "Número de Identificación del Suministro, todos los dígitos concatenados", ["numero_nis", "nis_cliente"]),
    spec!(ClientName, "nombre_cliente", "Cliente", Text, false,
        "nombre del titular de la cuenta", ["cliente", "titular", "nombre"]),
    spec!(BillingMonth, "mes_factura", "Mes de la factura", Text, false,
        "mes y año facturado, por ejemplo ENERO 2024", ["mes", "mes_de_la_factura", "mes_facturado"]),
    spec!(Tariff, "tarifa", "Tarifa", Text, false,
        "código de tarifa, por ejemplo BTS o MTD", ["codigo_tarifa"]),
    spec!(Sector, "sector", "Sector", Text, true,
        "valor del campo SECTOR: Residencial, No Residencial, Comercial o Industrial", ["tipo_cliente", "clase_tarifaria"]),
    spec!(ReadingType, "tipo_lectura", "Tipo de lectura", Text, false,
        "tipo de lectura, por ejemplo Real o Estimada", ["lectura_tipo"]),
    spec!(ConsumptionType, "tipo_consumo", "Tipo de consumo", Text, false,
        "tipo de consumo, nunca el sector", ["consumo_tipo"]),
    spec!(PeriodFrom, "periodo_desde", "Periodo de lectura desde", Date, false,
        "inicio del periodo de lectura (DD/MM/AAAA)", ["periodo_lectura_desde", "fecha_desde", "desde"]),
    spec!(PeriodTo, "periodo_hasta", "Periodo de lectura hasta", Date, false,
        "fin del periodo de lectura (DD/MM/AAAA)", ["periodo_lectura_hasta", "fecha_hasta", "hasta"]),
    spec!(IssueDate, "fecha_emision", "Fecha de emisión", Date, false,
        "fecha de emisión de la factura (DD/MM/AAAA)", ["fecha_factura", "fecha"]),
    spec!(DueDate, "fecha_vencimiento", "Fecha de vencimiento", Date, false,
        "fecha límite de pago (DD/MM/AAAA)", ["fecha_limite", "vence", "fecha_corte"]),
    spec!(PreviousReading, "lectura_anterior", "Lectura anterior kWh", Quantity, false,
        "lectura anterior del medidor en kWh", ["lectura_anterior_kwh"]),
    spec!(CurrentReading, "lectura_actual", "Lectura actual kWh", Quantity, false,
        "lectura actual del medidor en kWh", ["lectura_actual_kwh"]),
    spec!(ConsumptionKwh, "consumo_kwh", "Consumo kWh", Quantity, true,
        "consumo de energía activa del periodo en kWh", ["consumo", "consumo_total", "kwh"]),
    spec!(ReactiveKvarh, "consumo_kvarh", "Consumo reactiva kVARh", Quantity, false,
        "consumo de energía reactiva en kVARh", ["consumo_reactiva", "kvarh"]),
    spec!(DemandKw, "demanda_kw", "Demanda actual kW", Quantity, false,
        "demanda máxima actual en kW", ["demanda", "demanda_actual"]),
    spec!(FixedCharge, "cargo_fijo", "Cargo Fijo", Amount, false,
        "cargo fijo o comercial", ["cargo_comercial"]),
    spec!(Energy, "energia", "Energía", Amount, false,
        "cargo por energía", ["cargo_energia"]),
    spec!(Generation, "generacion", "Generación", Amount, false,
        "cargo por generación", ["cargo_generacion"]),
    spec!(Transmission, "transmision", "Transmisión", Amount, false,
        "cargo por transmisión", ["cargo_transmision"]),
    spec!(Distribution, "distribucion", "Distribución", Amount, false,
        "cargo por distribución", ["cargo_distribucion"]),
    spec!(FuelAdjustment, "variacion_combustible", "Var. Combustible", Amount, false,
        "ajuste por variación de combustible", ["var_combustible", "ajuste_combustible"]),
    spec!(LateInterest, "interes_mora", "Interés por Mora", Amount, false,
        "interés por mora", ["interes_por_mora", "mora"]),
    spec!(Law15Subsidy, "subsidio_ley15", "Subsidio Ley 15 (Recargo)", Amount, false,
        "subsidio o recargo de la Ley 15, negativo si es crédito", ["subsidio", "ley_15", "subsidio_ley_15"]),
    spec!(NonComplianceCompensation, "compensacion_incumplimiento", "Compensación por Incumplimiento", Amount, false,
        "compensación por incumplimiento de calidad", ["compensacion"]),
    spec!(MonthTotal, "total_mes", "Total del mes", Amount, false,
        "TOTAL ESTE MES, solo los cargos del periodo", ["total_este_mes"]),
    spec!(PreviousBalance, "saldo_anterior", "Saldo anterior", Amount, false,
        "saldo pendiente de facturas anteriores", ["saldo_pendiente"]),
    spec!(AmountDue, "gran_total", "Gran total", Amount, true,
        "GRAN TOTAL a pagar, incluye saldo anterior", ["total_a_pagar", "monto_a_pagar", "total_pagar"]),
    spec!(Currency, "moneda", "Moneda", Text, false,
        "código de moneda", ["divisa"]),
];

impl InvoiceField {
    /// All fields in schema order.
    pub const ALL: [InvoiceField; 30] = [
        Self::InvoiceNumber,
        Self::Nis,
        Self::ClientName,
        Self::BillingMonth,
        Self::Tariff,
        Self::Sector,
        Self::ReadingType,
        Self::ConsumptionType,
        Self::PeriodFrom,
        Self::PeriodTo,
        Self::IssueDate,
        Self::DueDate,
        Self::PreviousReading,
        Self::CurrentReading,
        Self::ConsumptionKwh,
        Self::ReactiveKvarh,
        Self::DemandKw,
        Self::FixedCharge,
        Self::Energy,
        Self::Generation,
        Self::Transmission,
        Self::Distribution,
        Self::FuelAdjustment,
        Self::LateInterest,
        Self::Law15Subsidy,
        Self::NonComplianceCompensation,
        Self::MonthTotal,
        Self::PreviousBalance,
        Self::AmountDue,
        Self::Currency,
    ];

    pub fn spec(self) -> &'static FieldSpec {
        &SPECS[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.spec().key
    }

    pub fn header(self) -> &'static str {
        self.spec().header
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }

    pub fn is_required(self) -> bool {
        self.spec().required
    }

    /// Required fields in schema order.
    pub fn required() -> impl Iterator<Item = InvoiceField> {
        Self::ALL.into_iter().filter(|f| f.is_required())
    }

    /// Look up a field by its canonical key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Look up a field by one of its built-in aliases.
    pub fn from_alias(alias: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.spec().aliases.contains(&alias))
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for InvoiceField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Date(d) => write!(f, "{}", d.format("%d/%m/%Y")),
        }
    }
}

/// Where a field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Taken from the model response (after coercion).
    Extracted,
    /// Filled by a normalization rule from another field.
    Corrected,
    /// Filled from a configured default.
    Defaulted,
    /// Not present.
    Missing,
}

/// A field value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    pub value: FieldValue,
    pub provenance: Provenance,
}

/// Non-fatal issue found while normalizing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    /// A required field is absent.
    MissingRequired { field: InvoiceField },
    /// A value was present but could not be coerced to the field's type.
    Unparseable { field: InvoiceField, raw: String },
    /// The sector was copied from the consumption type.
    SectorFromConsumptionType { value: String },
}

impl NormalizationWarning {
    pub fn field(&self) -> InvoiceField {
        match self {
            Self::MissingRequired { field } | Self::Unparseable { field, .. } => *field,
            Self::SectorFromConsumptionType { .. } => InvoiceField::Sector,
        }
    }
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired { field } => write!(f, "missing required field {}", field),
            Self::Unparseable { field, raw } => write!(f, "could not parse {} from {:?}", field, raw),
            Self::SectorFromConsumptionType { value } => {
                write!(f, "sector taken from tipo_consumo ({})", value)
            }
        }
    }
}

/// A normalized invoice, one per successfully processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRecord {
    /// Filename the record was extracted from.
    pub source_file: String,

    /// Present fields, in schema order.
    pub fields: BTreeMap<InvoiceField, FieldEntry>,

    /// Issues found during normalization.
    pub warnings: Vec<NormalizationWarning>,
}

impl InvoiceRecord {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            fields: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn get(&self, field: InvoiceField) -> Option<&FieldValue> {
        self.fields.get(&field).map(|e| &e.value)
    }

    pub fn text(&self, field: InvoiceField) -> Option<&str> {
        match self.get(field) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, field: InvoiceField) -> Option<Decimal> {
        match self.get(field) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn date(&self, field: InvoiceField) -> Option<NaiveDate> {
        match self.get(field) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn provenance(&self, field: InvoiceField) -> Provenance {
        self.fields
            .get(&field)
            .map(|e| e.provenance)
            .unwrap_or(Provenance::Missing)
    }

    pub fn set(&mut self, field: InvoiceField, value: FieldValue, provenance: Provenance) {
        self.fields.insert(field, FieldEntry { value, provenance });
    }

    /// True when every required field is present.
    pub fn is_complete(&self) -> bool {
        InvoiceField::required().all(|f| self.fields.contains_key(&f))
    }

    /// Number of canonical fields with a value.
    pub fn filled_count(&self) -> usize {
        self.fields.len()
    }
}

/// A scalar value as returned by the structuring service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    Number(Decimal),
}

/// Flat key/value map produced by the structuring service.
pub type CandidateFields = BTreeMap<String, RawValue>;

/// Unvalidated record as returned by the structuring service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInvoice {
    pub source_file: String,
    pub values: CandidateFields,
}

impl CandidateInvoice {
    pub fn new(source_file: impl Into<String>, values: CandidateFields) -> Self {
        Self {
            source_file: source_file.into(),
            values,
        }
    }
}

impl From<&InvoiceRecord> for CandidateInvoice {
    /// Rebuild the candidate a record could have come from.
    ///
    /// Only extracted values are carried; corrected and defaulted values are
    /// re-derived by normalization. Unparseable raw text is carried back so the
    /// same warning is produced again.
    fn from(record: &InvoiceRecord) -> Self {
        let mut values = CandidateFields::new();

        for (field, entry) in &record.fields {
            if entry.provenance != Provenance::Extracted {
                continue;
            }
            let raw = match &entry.value {
                FieldValue::Text(s) => RawValue::Text(s.clone()),
                FieldValue::Number(n) => RawValue::Number(*n),
                FieldValue::Date(d) => RawValue::Text(d.format("%Y-%m-%d").to_string()),
            };
            values.insert(field.key().to_string(), raw);
        }

        for warning in &record.warnings {
            if let NormalizationWarning::Unparseable { field, raw } = warning {
                values.insert(field.key().to_string(), RawValue::Text(raw.clone()));
            }
        }

        Self::new(record.source_file.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_spec_table_matches_enum_order() {
        for field in InvoiceField::ALL {
            assert_eq!(field.spec().field, field);
        }
    }

    #[test]
    fn test_keys_and_aliases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for field in InvoiceField::ALL {
            assert!(seen.insert(field.key()), "duplicate key {}", field.key());
            for alias in field.spec().aliases {
                assert!(seen.insert(alias), "duplicate alias {}", alias);
            }
        }
    }

    #[test]
    fn test_required_fields() {
        let required: Vec<_> = InvoiceField::required().collect();
        assert_eq!(
            required,
            vec![
                InvoiceField::Nis,
                InvoiceField::Sector,
                InvoiceField::ConsumptionKwh,
                InvoiceField::AmountDue,
            ]
        );
    }

    #[test]
    fn test_lookup() {
        assert_eq!(InvoiceField::from_key("gran_total"), Some(InvoiceField::AmountDue));
        assert_eq!(InvoiceField::from_alias("total_a_pagar"), Some(InvoiceField::AmountDue));
        assert_eq!(InvoiceField::from_key("total_a_pagar"), None);
    }

    #[test]
    fn test_candidate_from_record_skips_derived_values() {
        let mut record = InvoiceRecord::new("a.pdf");
        record.set(
            InvoiceField::AmountDue,
            FieldValue::Number(Decimal::from_str("12.50").unwrap()),
            Provenance::Extracted,
        );
        record.set(
            InvoiceField::Sector,
            FieldValue::Text("Residencial".to_string()),
            Provenance::Corrected,
        );
        record.set(
            InvoiceField::Currency,
            FieldValue::Text("PAB".to_string()),
            Provenance::Defaulted,
        );
        record.warnings.push(NormalizationWarning::Unparseable {
            field: InvoiceField::DueDate,
            raw: "pronto".to_string(),
        });

        let candidate = CandidateInvoice::from(&record);
        assert_eq!(candidate.values.len(), 2);
        assert_eq!(
            candidate.values.get("fecha_vencimiento"),
            Some(&RawValue::Text("pronto".to_string()))
        );
        assert_eq!(record.provenance(InvoiceField::Nis), Provenance::Missing);
    }

    #[test]
    fn test_record_serializes_with_keys() {
        let mut record = InvoiceRecord::new("a.pdf");
        record.set(
            InvoiceField::Nis,
            FieldValue::Text("6012355002".to_string()),
            Provenance::Extracted,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fields"]["nis"]["value"], "6012355002");
        assert_eq!(json["fields"]["nis"]["provenance"], "extracted");
    }
}
