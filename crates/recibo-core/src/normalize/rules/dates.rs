//! Date parsing for Panamanian invoices.

use std::ops::RangeInclusive;

use chrono::NaiveDate;

use super::fold;
use super::patterns::{DATE_DMY, DATE_SPANISH, DATE_YMD};

/// Years a spreadsheet date cell can hold.
pub const YEAR_RANGE: RangeInclusive<i32> = 1900..=9999;

/// Parse the first date in `s`.
///
/// Accepts day-first numeric dates, ISO dates and Spanish month names or
/// abbreviations. Month-first dates are never assumed. Dates outside
/// [`YEAR_RANGE`] are rejected.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_YMD.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        if let Some(date) = date_in_range(year, month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = DATE_DMY.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = parse_year(&caps[3]);
        if let Some(date) = date_in_range(year, month, day) {
            return Some(date);
        }
    }

    for caps in DATE_SPANISH.captures_iter(s) {
        let Some(month) = spanish_month_to_number(&caps[2]) else {
            continue;
        };
        let day: u32 = caps[1].parse().ok()?;
        let year = parse_year(&caps[3]);
        if let Some(date) = date_in_range(year, month, day) {
            return Some(date);
        }
    }

    None
}

fn date_in_range(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !YEAR_RANGE.contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        // Two-digit year: assume 2000s for 00-50, 1900s for 51-99
        if year <= 50 {
            2000 + year
        } else {
            1900 + year
        }
    } else {
        year
    }
}

/// Month number for a Spanish month name or its common abbreviation.
pub fn spanish_month_to_number(name: &str) -> Option<u32> {
    let folded = fold(name);
    let month = match folded.as_str() {
        "enero" | "ene" => 1,
        "febrero" | "feb" => 2,
        "marzo" | "mar" => 3,
        "abril" | "abr" => 4,
        "mayo" | "may" => 5,
        "junio" | "jun" => 6,
        "julio" | "jul" => 7,
        "agosto" | "ago" => 8,
        "septiembre" | "setiembre" | "sep" | "sept" | "set" => 9,
        "octubre" | "oct" => 10,
        "noviembre" | "nov" => 11,
        "diciembre" | "dic" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_numeric_formats() {
        assert_eq!(parse_date("15/01/2024"), ymd(2024, 1, 15));
        assert_eq!(parse_date("05-02-24"), ymd(2024, 2, 5));
        assert_eq!(parse_date("31.12.2023"), ymd(2023, 12, 31));
        assert_eq!(parse_date("2024-01-15"), ymd(2024, 1, 15));
    }

    #[test]
    fn test_spanish_formats() {
        assert_eq!(parse_date("15 de enero de 2024"), ymd(2024, 1, 15));
        assert_eq!(parse_date("3 Septiembre 2023"), ymd(2023, 9, 3));
        assert_eq!(parse_date("15-ENE-2024"), ymd(2024, 1, 15));
        assert_eq!(parse_date("1/Dic/23"), ymd(2023, 12, 1));
    }

    #[test]
    fn test_rejects_invalid() {
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("mañana"), None);
        assert_eq!(parse_date("15 de fulano de 2024"), None);
    }

    #[test]
    fn test_rejects_years_outside_range() {
        assert_eq!(parse_date("15/01/1024"), None);
        assert_eq!(parse_date("0999-01-15"), None);
        assert_eq!(parse_date("15 de enero de 1899"), None);
        assert_eq!(parse_date("01/01/1900"), ymd(1900, 1, 1));
    }

    #[test]
    fn test_month_names() {
        assert_eq!(spanish_month_to_number("Enero"), Some(1));
        assert_eq!(spanish_month_to_number("SET"), Some(9));
        assert_eq!(spanish_month_to_number("foo"), None);
    }
}
