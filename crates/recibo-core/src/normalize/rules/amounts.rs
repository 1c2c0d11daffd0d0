//! Amount and quantity parsing for Panamanian invoices.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{CURRENCY_MARKER, PARENTHESIZED};

/// Parse an amount written either way round ("B/. 1.549,19", "B/.1,549.19", "-12,50", "(3.00)").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let without_currency = CURRENCY_MARKER.replace_all(s, "");
    let mut text = without_currency.trim().to_string();
    let mut negative = false;

    if let Some(caps) = PARENTHESIZED.captures(&text) {
        negative = true;
        text = caps[1].trim().to_string();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = rest.trim().to_string();
    } else if let Some(rest) = text.strip_suffix('-') {
        // Credits printed as "12.50-"
        negative = true;
        text = rest.trim().to_string();
    }

    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(&cleaned)?;
    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Resolve thousands and decimal separators to a plain `1234.56` string.
fn normalize_separators(cleaned: &str) -> Option<String> {
    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => cleaned.to_string(),
        (_, 0) => {
            // "1,549" and "1,549,190" group thousands; "12,50" is a decimal comma.
            if commas == 1 && !is_thousands_group(cleaned, ',') {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (0, _) => {
            if dots == 1 {
                cleaned.to_string()
            } else {
                cleaned.replace('.', "")
            }
        }
        _ => {
            // Both present: whichever comes last is the decimal separator.
            let comma_pos = cleaned.rfind(',')?;
            let dot_pos = cleaned.rfind('.')?;
            if comma_pos > dot_pos {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    Some(normalized)
}

/// True when the single separator is followed by exactly three digits.
fn is_thousands_group(s: &str, sep: char) -> bool {
    match s.split_once(sep) {
        Some((head, tail)) => !head.is_empty() && tail.len() == 3,
        None => false,
    }
}

/// Format an amount with two decimals and thousands separators (1,549.19).
pub fn format_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs());
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(*c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}{}.{}", sign, formatted, decimal_part)
}
