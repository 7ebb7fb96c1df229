//! Name sanitation for village identifiers.

use std::sync::OnceLock;

use regex::Regex;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn invalid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9a-zA-Z_-]").expect("static regex"))
}

/// Folds common Latin accented characters to their ASCII base so that
/// accented village names survive sanitation instead of losing letters.
fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'È' | 'É' | 'Ê' | 'Ë' => 'E',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Converts free-form text into a stable identifier: accents folded,
/// apostrophes removed, whitespace runs collapsed to `_`, everything
/// else outside `[0-9a-zA-Z_-]` dropped.
#[must_use]
pub fn text_to_id(text: &str) -> String {
    let folded = fold_accents(text.trim()).replace('\'', "");
    let underscored = whitespace_re().replace_all(&folded, "_");
    invalid_re().replace_all(&underscored, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_underscores() {
        assert_eq!(text_to_id("  Bobo  Dioulasso "), "Bobo_Dioulasso");
    }

    #[test]
    fn accents_fold_and_symbols_drop() {
        assert_eq!(text_to_id("Koudougou-Est"), "Koudougou-Est");
        assert_eq!(text_to_id("Léo"), "Leo");
        assert_eq!(text_to_id("N'Dorola (2)"), "NDorola_2");
    }

    #[test]
    fn empty_and_symbol_only_names_vanish() {
        assert_eq!(text_to_id("   "), "");
        assert_eq!(text_to_id("***"), "");
    }
}
