//! Value-level parsing rules used by the normalizer.

pub mod amounts;
pub mod dates;
pub mod patterns;
pub mod sector;

pub use amounts::{format_amount, parse_amount};
pub use dates::{parse_date, spanish_month_to_number};
pub use sector::canonical_sector;

use patterns::WHITESPACE;

/// Trim and collapse runs of whitespace to one space.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Lowercase, strip Spanish accents and collapse whitespace, for label comparison.
pub fn fold(s: &str) -> String {
    collapse_whitespace(s)
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Digits of `s` in order ("6012355 002" -> "6012355002").
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold() {
        assert_eq!(fold("  Energía   ACTIVA "), "energia activa");
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("6012355 002"), "6012355002");
        assert_eq!(digits_only("NIS: 60-12"), "6012");
    }
}
