//! Resolution of response keys to canonical fields.

use std::collections::HashMap;

use tracing::warn;

use super::rules::fold;
use crate::models::config::NormalizationConfig;
use crate::models::invoice::InvoiceField;

/// Maps model response keys onto canonical fields.
///
/// Keys are compared after folding case, accents and separators, so "Gran Total",
/// "gran-total" and "gran_total" all resolve to the same field. Built-in aliases and
/// the configured `normalization.aliases` are both honoured.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    aliases: HashMap<String, InvoiceField>,
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(&NormalizationConfig::default())
    }
}

impl KeyResolver {
    pub fn new(config: &NormalizationConfig) -> Self {
        let mut aliases = HashMap::new();
        for field in InvoiceField::ALL {
            for alias in field.spec().aliases {
                aliases.insert(normalize_key(alias), field);
            }
        }
        for (alias, target) in &config.aliases {
            match InvoiceField::from_key(target) {
                Some(field) => {
                    aliases.insert(normalize_key(alias), field);
                }
                None => warn!("Ignoring alias {} for unknown field {}", alias, target),
            }
        }
        Self { aliases }
    }

    /// The field `key` names, if any.
    pub fn resolve(&self, key: &str) -> Option<InvoiceField> {
        self.lookup(key).map(|(field, _)| field)
    }

    /// The field `key` names, and whether it is the canonical key rather than an alias.
    pub(crate) fn lookup(&self, key: &str) -> Option<(InvoiceField, bool)> {
        let key = normalize_key(key);
        match InvoiceField::from_key(&key) {
            Some(field) => Some((field, true)),
            None => self.aliases.get(&key).map(|field| (*field, false)),
        }
    }

    /// Whether any of `keys` names a required field.
    pub fn has_required<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> bool {
        keys.into_iter()
            .filter_map(|key| self.resolve(key))
            .any(InvoiceField::is_required)
    }
}

/// "Gran Total" and "gran-total" both become "gran_total".
pub(crate) fn normalize_key(key: &str) -> String {
    fold(key)
        .chars()
        .map(|c| if c == ' ' || c == '-' || c == '.' { '_' } else { c })
        .collect()
}
