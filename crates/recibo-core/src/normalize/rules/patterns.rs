//! Common regex patterns for Panamanian invoice values.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Numeric dates: 15/01/2024, 15-01-24, 15.01.2024
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    // ISO-like dates: 2024-01-15, 2024/01/15
    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    // Spanish month names: "15 de enero de 2024", "15 enero 2024", "15-ENE-2024", "15/Sept/24"
    pub static ref DATE_SPANISH: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:\s+de\s+|\s+|[./\-])([a-záéíóú]{3,10})\.?(?:\s+de\s+|\s+del\s+|\s+|[./\-])(\d{4}|\d{2})\b"
    ).unwrap();

    // Currency markers: "B/.", "B/", "PAB", "USD", "US$", "$"
    pub static ref CURRENCY_MARKER: Regex = Regex::new(
        r"(?i)B/\.?|\bPAB\b|\bUSD\b|US\$|\$"
    ).unwrap();

    // Accounting-style negatives: "(12.50)"
    pub static ref PARENTHESIZED: Regex = Regex::new(
        r"^\((.*)\)$"
    ).unwrap();

    pub static ref WHITESPACE: Regex = Regex::new(
        r"\s+"
    ).unwrap();
}
