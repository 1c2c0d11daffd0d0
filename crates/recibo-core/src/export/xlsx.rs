//! xlsx rendering of an [`ExportTable`].

use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Color, ExcelDateTime, Format, Workbook, Worksheet, XlsxError};

use super::{Cell, ExportRow, ExportTable, CONSOLIDATED_SHEET, EMPTY_SHEET};
use crate::error::ExportError;

const MAX_SHEET_NAME: usize = 31;
const SOURCE_WIDTH: f64 = 28.0;
const FIELD_WIDTH: f64 = 16.0;
const WARNINGS_WIDTH: f64 = 48.0;

struct Formats {
    header: Format,
    amount: Format,
    quantity: Format,
    date: Format,
    text: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x2563EB))
                .set_font_color(Color::RGB(0xFFFFFF)),
            amount: Format::new().set_num_format("#,##0.00"),
            quantity: Format::new().set_num_format("#,##0.###"),
            date: Format::new().set_num_format("dd/mm/yyyy"),
            text: Format::new(),
        }
    }
}

/// One sheet with every record.
pub(super) fn consolidated(table: &ExportTable) -> Result<Vec<u8>, ExportError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(CONSOLIDATED_SHEET)?;
    write_header(sheet, &table.headers, &formats)?;
    for (i, row) in table.rows.iter().enumerate() {
        write_row(sheet, i as u32 + 1, row, &formats)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// One sheet per record, named after its source file.
pub(super) fn individual(table: &ExportTable) -> Result<Vec<u8>, ExportError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    if table.rows.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(EMPTY_SHEET)?;
        write_header(sheet, &table.headers, &formats)?;
    }

    let names = unique_sheet_names(table.rows.iter().map(|r| r.source_file.as_str()));
    for (row, name) in table.rows.iter().zip(names) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name)?;
        write_header(sheet, &table.headers, &formats)?;
        write_row(sheet, 1, row, &formats)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_header(
    sheet: &mut Worksheet,
    headers: &[&str],
    formats: &Formats,
) -> Result<(), XlsxError> {
    let last = headers.len().saturating_sub(1);
    for (col, header) in headers.iter().enumerate() {
        let width = match col {
            0 => SOURCE_WIDTH,
            c if c == last => WARNINGS_WIDTH,
            _ => FIELD_WIDTH,
        };
        sheet.set_column_width(col as u16, width)?;
        sheet.write_string_with_format(0, col as u16, *header, &formats.header)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_row(
    sheet: &mut Worksheet,
    row: u32,
    record: &ExportRow,
    formats: &Formats,
) -> Result<(), XlsxError> {
    for (col, cell) in record.cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            Cell::Empty => {}
            Cell::Text(s) => {
                sheet.write_string_with_format(row, col, s, &formats.text)?;
            }
            Cell::Amount(n) | Cell::Quantity(n) => {
                let format = match cell {
                    Cell::Amount(_) => &formats.amount,
                    _ => &formats.quantity,
                };
                match n.to_f64() {
                    Some(value) => sheet.write_number_with_format(row, col, value, format)?,
                    None => sheet.write_string_with_format(row, col, n.to_string(), &formats.text)?,
                };
            }
            Cell::Date(d) => match excel_date(d) {
                Some(date) => {
                    sheet.write_datetime_with_format(row, col, &date, &formats.date)?;
                }
                None => {
                    let text = d.format("%d/%m/%Y").to_string();
                    sheet.write_string_with_format(row, col, text, &formats.text)?;
                }
            },
        }
    }
    Ok(())
}

/// Excel only stores dates from 1900 to 9999; anything else is written as text.
fn excel_date(d: &NaiveDate) -> Option<ExcelDateTime> {
    let year = u16::try_from(d.year()).ok()?;
    ExcelDateTime::from_ymd(year, d.month() as u8, d.day() as u8).ok()
}

/// Excel-safe sheet name for a source filename: the file stem with forbidden
/// characters replaced, at most 31 characters, never empty.
pub fn sheet_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim();

    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("history") {
        return format!("Factura {}", cleaned).trim().to_string();
    }
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME).collect();
    truncated
        .trim_end_matches(|c: char| c == '\'' || c.is_whitespace())
        .to_string()
}

/// Sheet names for `filenames`, de-duplicated case-insensitively with ` (n)` suffixes.
pub fn unique_sheet_names<'a>(filenames: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::new();

    for filename in filenames {
        let base = sheet_name(filename);
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name.to_lowercase()) {
            let suffix = format!(" ({})", n);
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            name = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        taken.insert(name.to_lowercase());
        names.push(name);
    }

    names
}
