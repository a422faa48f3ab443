//! Text normalization shared by the classifier, the extractor and knowledge
//! retrieval.

/// Lowercases and folds Portuguese diacritics to plain ASCII letters.
pub fn normalize(input: &str) -> String {
    input.chars().flat_map(char::to_lowercase).map(fold_diacritic).collect()
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Splits normalized text into alphanumeric terms of at least `min_len` chars.
pub fn terms(input: &str, min_len: usize) -> Vec<String> {
    normalize(input)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// True when `needle` occurs in `haystack` delimited by non-alphanumeric
/// characters or the ends of the string. Both inputs must already be
/// normalized.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(offset) = haystack[start..].find(needle) {
        let begin = start + offset;
        let end = begin + needle.len();
        let before_ok =
            haystack[..begin].chars().next_back().map(|c| !c.is_alphanumeric()).unwrap_or(true);
        let after_ok = haystack[end..].chars().next().map(|c| !c.is_alphanumeric()).unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
        start = begin + haystack[begin..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{contains_word, normalize, terms};

    #[test]
    fn folds_portuguese_accents() {
        assert_eq!(normalize("Impermeabilização ÁGUA Pôr"), "impermeabilizacao agua por");
    }

    #[test]
    fn word_boundaries_reject_partial_matches() {
        assert!(contains_word("quero um forro de pvc", "forro"));
        assert!(contains_word("forro", "forro"));
        assert!(!contains_word("forros de gesso", "forro"));
        assert!(contains_word("forrobodo e forro", "forro"));
    }

    #[test]
    fn terms_drop_short_tokens() {
        assert_eq!(terms("Placa de gesso, 12mm!", 3), vec!["placa", "gesso", "12mm"]);
    }
}
