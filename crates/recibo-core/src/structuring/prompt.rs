//! Prompt construction for the structuring model.

use crate::models::invoice::{FieldKind, InvoiceField};

const PREAMBLE: &str = "Eres un asistente que extrae datos de facturas de electricidad de Panamá \
(ENSA, Naturgy/Edemet, Edechi). Recibirás el texto de una factura extraído de un PDF, \
posiblemente con columnas desalineadas. Devuelve SOLO un objeto JSON plano, sin markdown ni \
comentarios, con estas claves:";

const RULES: &str = "Reglas:
- NIS: concatena todos los dígitos sin espacios ni guiones (\"6012355 002\" -> \"6012355002\").
- Montos: devuelve números sin símbolo de moneda; convierte la coma decimal (\"B/. 1.549,19\" -> 1549.19). Los créditos van con signo negativo.
- \"TOTAL ESTE MES\" va en total_mes; \"GRAN TOTAL\" (lo que se debe pagar, incluye saldo anterior) va en gran_total. No los confundas.
- El valor del campo SECTOR de la factura (Residencial, No Residencial, Comercial, Industrial) va en \"sector\", nunca en \"tipo_consumo\".
- Fechas en formato DD/MM/AAAA.
- Usa null si un dato no aparece en la factura. No inventes valores.";

fn kind_hint(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "texto",
        FieldKind::Identifier => "texto, solo dígitos",
        FieldKind::Amount => "número",
        FieldKind::Quantity => "número",
        FieldKind::Date => "fecha DD/MM/AAAA",
    }
}

/// The system message: schema plus extraction rules.
pub fn build_system_prompt() -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push('\n');

    for field in InvoiceField::ALL {
        let spec = field.spec();
        prompt.push_str(&format!(
            "- \"{}\" ({}{}): {}\n",
            spec.key,
            kind_hint(spec.kind),
            if spec.required { ", obligatorio" } else { "" },
            spec.description
        ));
    }

    prompt.push('\n');
    prompt.push_str(RULES);
    prompt
}

/// The user message carrying the invoice text, cut to `max_chars` characters.
pub fn build_user_prompt(text: &str, max_chars: usize) -> String {
    format!(
        "Extrae los datos de la siguiente factura:\n\n{}",
        truncate_chars(text, max_chars)
    )
}

/// The first `max_chars` characters of `s`, never splitting a character.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_every_field() {
        let prompt = build_system_prompt();
        for field in InvoiceField::ALL {
            assert!(prompt.contains(&format!("\"{}\"", field.key())), "missing {}", field);
        }
        assert!(prompt.contains("\"gran_total\" (número, obligatorio)"));
        assert!(prompt.contains("nunca en \"tipo_consumo\""));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("Energía", 6), "Energí");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ñandú", 0), "");
    }

    #[test]
    fn test_user_prompt_is_truncated() {
        let text = "á".repeat(100);
        let prompt = build_user_prompt(&text, 10);
        assert!(prompt.ends_with(&"á".repeat(10)));
        assert!(!prompt.ends_with(&"á".repeat(11)));
    }
}
