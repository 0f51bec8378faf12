//! Shared tokenizer for the Sparse Index and for sparse-mode query embedding.
//!
//! Splits on any non-alphanumeric character, then sub-splits camelCase and
//! snake_case boundaries, and lowercases. Empty tokens are discarded.

/// Tokenize `text` into the token stream used by the Sparse Index and by
/// sparse/hybrid query retrieval. Deterministic and allocation-light.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        split_word_boundaries(raw, &mut tokens);
    }
    tokens
}

/// Splits a single alphanumeric run on camelCase/snake_case-style boundaries.
/// snake_case never reaches here intact (the underscore already split it at
/// the non-alphanumeric stage); this handles camelCase and PascalCase runs
/// plus digit/letter transitions.
fn split_word_boundaries(word: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut start = 0usize;

    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let curr = chars[i];

        let is_boundary = (prev.is_lowercase() && curr.is_uppercase())
            || (prev.is_alphabetic() && curr.is_numeric())
            || (prev.is_numeric() && curr.is_alphabetic())
            || (i + 1 < chars.len()
                && prev.is_uppercase()
                && curr.is_uppercase()
                && chars[i + 1].is_lowercase());

        if is_boundary {
            push_lower(&chars[start..i], out);
            start = i;
        }
    }
    push_lower(&chars[start..], out);
}

fn push_lower(slice: &[char], out: &mut Vec<String>) {
    if slice.is_empty() {
        return;
    }
    let token: String = slice.iter().collect::<String>().to_lowercase();
    if !token.is_empty() {
        out.push(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_alphanumeric() {
        assert_eq!(tokenize("foo.bar(baz)"), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn splits_camel_case() {
        assert_eq!(tokenize("calculateBMI"), vec!["calculate", "bmi"]);
    }

    #[test]
    fn splits_snake_case() {
        assert_eq!(
            tokenize("calculate_bmi_ratio"),
            vec!["calculate", "bmi", "ratio"]
        );
    }

    #[test]
    fn discards_empty_tokens() {
        assert_eq!(tokenize("   ..  "), Vec::<String>::new());
    }

    #[test]
    fn handles_pascal_case_acronyms() {
        assert_eq!(tokenize("parseJSONString"), vec!["parse", "json", "string"]);
    }
}
