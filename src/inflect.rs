//! English inflection used to derive table names from kind names and to
//! resolve implicit relation lookups by field name.

use once_cell::sync::Lazy;
use std::collections::HashMap;

const ONE_LETTER_ENDINGS: [char; 2] = ['o', 'x'];
const TWO_LETTER_ENDINGS: [&str; 3] = ["ch", "sh", "ss"];

static IRREGULAR: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("calf", "calves"),
        ("half", "halves"),
        ("knife", "knives"),
        ("leaf", "leaves"),
        ("life", "lives"),
        ("loaf", "loaves"),
        ("self", "selves"),
        ("sheaf", "sheaves"),
        ("shelf", "shelves"),
        ("thief", "thieves"),
        ("wife", "wives"),
        ("wolf", "wolves"),
        ("foot", "feet"),
        ("tooth", "teeth"),
        ("man", "men"),
        ("woman", "women"),
        ("mouse", "mice"),
        ("goose", "geese"),
        ("louse", "lice"),
        ("child", "children"),
        ("ox", "oxen"),
    ]
});

static PLURAL_OF: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| IRREGULAR.iter().copied().collect());

static SINGULAR_OF: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| IRREGULAR.iter().map(|(s, p)| (*p, *s)).collect());

/// Split `text` into the untouched head and the last inflectable word.
///
/// The last word starts after the final `_` or at the final capital letter
/// (`sub_items` -> `sub_` + `items`, `SubItems` -> `Sub` + `Items`).
fn split_last_word(text: &str) -> Option<(&str, &str)> {
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '_' {
            start = i + 1;
        } else if c.is_ascii_uppercase() {
            start = i;
        }
    }
    let word = &text[start..];
    if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((&text[..start], word))
}

fn restore_case(original: &str, inflected: String) -> String {
    if original.starts_with(|c: char| c.is_ascii_uppercase()) {
        let mut chars = inflected.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => inflected,
        }
    } else {
        inflected
    }
}

/// Plural form of the last word of `text`
pub fn pluralize(text: &str) -> String {
    let Some((head, word)) = split_last_word(text) else {
        return text.to_string();
    };
    let lower = word.to_ascii_lowercase();
    let plural = if let Some(p) = PLURAL_OF.get(lower.as_str()) {
        (*p).to_string()
    } else if lower.ends_with(ONE_LETTER_ENDINGS) || TWO_LETTER_ENDINGS.iter().any(|e| lower.ends_with(e)) {
        format!("{lower}es")
    } else if lower.ends_with('y') && !lower[..lower.len() - 1].ends_with(['a', 'e', 'o', 'u']) {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{lower}s")
    };
    format!("{head}{}", restore_case(word, plural))
}

/// Singular form of the last word of `text`
pub fn singularize(text: &str) -> String {
    let Some((head, word)) = split_last_word(text) else {
        return text.to_string();
    };
    let lower = word.to_ascii_lowercase();
    let len = lower.len();
    let singular = if let Some(s) = SINGULAR_OF.get(lower.as_str()) {
        (*s).to_string()
    } else if lower.ends_with("es")
        && (lower[..len - 2].ends_with(ONE_LETTER_ENDINGS)
            || TWO_LETTER_ENDINGS.iter().any(|e| lower[..len - 2].ends_with(e)))
    {
        lower[..len - 2].to_string()
    } else if lower.ends_with("ies") {
        format!("{}y", &lower[..len - 3])
    } else if lower.ends_with('s') && !lower.ends_with("ss") {
        lower[..len - 1].to_string()
    } else {
        lower
    };
    format!("{head}{}", restore_case(word, singular))
}

/// `SubItem` -> `sub_item`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `sub_item` -> `SubItem`
pub fn to_camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Default table for a kind: snake-cased and pluralized (`SubItem` -> `sub_items`)
pub fn table_name_for(kind: &str) -> String {
    pluralize(&to_snake_case(kind))
}

/// Kind name a table most likely belongs to (`sub_items` -> `SubItem`)
pub fn kind_name_for(table: &str) -> String {
    to_camel_case(&singularize(table))
}

/// Loose identifier comparison ignoring case and underscores
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    let norm = |s: &str| -> String {
        s.chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };
    norm(a) == norm(b)
}
