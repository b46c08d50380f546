//! Small string helpers shared by the name-normalising code paths.

use unicode_normalization::UnicodeNormalization;

/// NFKD-decompose and drop the combining diacritical marks block (U+0300..U+036F).
///
/// Letters without a decomposition (`ß`, `Ø`, `Ł`) pass through unchanged.
pub fn fold_diacritics(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// Fold diacritics, then keep only ASCII word characters, whitespace and hyphens.
pub fn strip_to_ascii_word(input: &str) -> String {
    fold_diacritics(input)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Collapse each run of whitespace into `sep`.
pub fn join_whitespace(input: &str, sep: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_diacritics() {
        assert_eq!(fold_diacritics("Jalapeño"), "Jalapeno");
        assert_eq!(fold_diacritics("Crème brûlée"), "Creme brulee");
        assert_eq!(fold_diacritics("e\u{0301}"), "e");
        assert_eq!(fold_diacritics("ﬁg"), "fig");
    }

    #[test]
    fn test_letters_without_decomposition_are_dropped() {
        assert_eq!(strip_to_ascii_word("Straße"), "Strae");
        assert_eq!(strip_to_ascii_word("Ørsted"), "rsted");
        assert_eq!(strip_to_ascii_word("Jalapeño"), "Jalapeno");
    }

    #[test]
    fn test_strip_to_ascii_word() {
        assert_eq!(strip_to_ascii_word("  Basil (Sweet) "), "Basil Sweet");
        assert_eq!(strip_to_ascii_word("Pak-choi!"), "Pak-choi");
    }

    #[test]
    fn test_join_whitespace() {
        assert_eq!(join_whitespace("Sweet  basil\tleaf", "_"), "Sweet_basil_leaf");
    }
}
