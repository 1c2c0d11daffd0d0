//! Spreadsheet export of batch results.

mod xlsx;

pub use xlsx::{sheet_name, unique_sheet_names};

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::info;

use crate::error::ExportError;
use crate::models::batch::BatchResult;
use crate::models::config::ExportSelection;
use crate::models::invoice::{FieldKind, FieldValue, InvoiceField, InvoiceRecord};

/// Sheet name of the consolidated workbook.
pub const CONSOLIDATED_SHEET: &str = "Resumen_Consolidado";

/// Sheet name of an individual workbook with no records.
pub const EMPTY_SHEET: &str = "Facturas";

/// Header of the source file column.
pub const SOURCE_HEADER: &str = "Archivo";

/// Header of the warnings column.
pub const WARNINGS_HEADER: &str = "Advertencias";

/// Workbook layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// One sheet, one row per record.
    Consolidated,
    /// One sheet per record.
    Individual,
}

impl ExportMode {
    /// Output filename for a workbook written at `at`.
    pub fn filename(self, at: NaiveDateTime) -> String {
        let prefix = match self {
            Self::Consolidated => "facturas_consolidadas",
            Self::Individual => "facturas_individuales",
        };
        format!("{}_{}.xlsx", prefix, at.format("%Y%m%d_%H%M%S"))
    }
}

impl ExportSelection {
    pub fn modes(self) -> &'static [ExportMode] {
        match self {
            Self::Consolidated => &[ExportMode::Consolidated],
            Self::Individual => &[ExportMode::Individual],
            Self::Both => &[ExportMode::Consolidated, ExportMode::Individual],
        }
    }
}

/// A typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Text(String),
    Amount(Decimal),
    Quantity(Decimal),
    Date(NaiveDate),
}

impl Cell {
    fn from_value(kind: FieldKind, value: &FieldValue) -> Self {
        match (kind, value) {
            (_, FieldValue::Date(d)) => Self::Date(*d),
            (FieldKind::Amount, FieldValue::Number(n)) => Self::Amount(*n),
            (_, FieldValue::Number(n)) => Self::Quantity(*n),
            (_, FieldValue::Text(s)) => Self::Text(s.clone()),
        }
    }
}

/// One exported record: source file, every canonical field, warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub source_file: String,
    pub cells: Vec<Cell>,
}

/// Records laid out in the fixed column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub headers: Vec<&'static str>,
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    pub fn headers() -> Vec<&'static str> {
        std::iter::once(SOURCE_HEADER)
            .chain(InvoiceField::ALL.iter().map(|f| f.header()))
            .chain(std::iter::once(WARNINGS_HEADER))
            .collect()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a InvoiceRecord>) -> Self {
        let rows = records
            .into_iter()
            .map(|record| {
                let mut cells = Vec::with_capacity(InvoiceField::ALL.len() + 2);
                cells.push(Cell::Text(record.source_file.clone()));
                cells.extend(InvoiceField::ALL.iter().map(|field| {
                    record
                        .get(*field)
                        .map(|value| Cell::from_value(field.kind(), value))
                        .unwrap_or(Cell::Empty)
                }));
                cells.push(if record.warnings.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(
                        record
                            .warnings
                            .iter()
                            .map(|w| w.to_string())
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                });

                ExportRow {
                    source_file: record.source_file.clone(),
                    cells,
                }
            })
            .collect();

        Self {
            headers: Self::headers(),
            rows,
        }
    }

    /// Succeeded entries of `result`. Failed files are left out.
    pub fn from_result(result: &BatchResult) -> Self {
        Self::from_records(result.records())
    }
}

/// Serialize the succeeded records of `result` into an xlsx workbook.
pub fn export(result: &BatchResult, mode: ExportMode) -> Result<Vec<u8>, ExportError> {
    let table = ExportTable::from_result(result);
    match mode {
        ExportMode::Consolidated => xlsx::consolidated(&table),
        ExportMode::Individual => xlsx::individual(&table),
    }
}

/// `dir/filename`, or `dir/stem_N.ext` with the first free N when taken.
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (filename, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, ext)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Write the workbooks selected by `selection` into `dir`, returning their paths.
pub fn write_exports(
    result: &BatchResult,
    selection: ExportSelection,
    dir: &Path,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let now = chrono::Local::now().naive_local();

    let mut written = Vec::new();
    for mode in selection.modes() {
        let bytes = export(result, *mode)?;
        let path = unique_path(dir, &mode.filename(now));
        std::fs::write(&path, bytes)?;
        info!(
            path = %path.display(),
            records = result.records().count(),
            "Wrote {:?} workbook",
            mode
        );
        written.push(path);
    }

    Ok(written)
}
