//! Sector (tariff class) labels.

use super::fold;

/// The canonical spelling of `value` if it names a known sector.
///
/// Matching ignores case, accents and repeated whitespace, so "NO  RESIDENCIAL"
/// resolves to "No Residencial".
pub fn canonical_sector<'a>(value: &str, labels: &'a [String]) -> Option<&'a str> {
    let folded = fold(value);
    labels
        .iter()
        .find(|label| fold(label) == folded)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["Residencial", "No Residencial", "Comercial", "Industrial"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_canonical_sector() {
        let labels = labels();
        assert_eq!(canonical_sector("RESIDENCIAL", &labels), Some("Residencial"));
        assert_eq!(canonical_sector(" no  residencial ", &labels), Some("No Residencial"));
        assert_eq!(canonical_sector("Normal", &labels), None);
    }
}
