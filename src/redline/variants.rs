//! Domain-specific textual variants of a target
//!
//! Contracts spell the same quantity several ways ("5 years", "five years",
//! "five (5) years", "five(5) year"), and field lines carry optional labels
//! ("For: Company" vs "Company"). The variant strategy tries each spelling
//! as an exact substring.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

const NUMBER_WORDS: [(&str, u32); 24] = [
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
    ("thirty", 30),
    ("sixty", 60),
    ("ninety", 90),
];

/// Field labels that may or may not precede a filled-in value
const FIELD_LABELS: [&str; 4] = ["For:", "By:", "Title:", "Name:"];

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let words = NUMBER_WORDS
            .iter()
            .map(|(word, _)| *word)
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r"(?i)\b({words})\s*\(\s*(\d+)\s*\)|\((\d+)\)|\b({words})\b|\b(\d+)\b",
            words = words
        );
        Regex::new(&pattern).expect("number pattern is valid")
    })
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([Yy]ear)(s?)\b").expect("year pattern is valid"))
}

fn word_for(n: u32) -> Option<&'static str> {
    NUMBER_WORDS.iter().find(|(_, v)| *v == n).map(|(w, _)| *w)
}

fn value_of(word: &str) -> Option<u32> {
    let lower = word.to_ascii_lowercase();
    NUMBER_WORDS.iter().find(|(w, _)| *w == lower).map(|(_, v)| *v)
}

/// Give `word` the capitalisation of `like`
fn match_case(word: &str, like: &str) -> String {
    if like.chars().next().map_or(false, char::is_uppercase) {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        word.to_string()
    }
}

/// Alternate spellings of the first quantity mentioned in `text`
fn number_variants(text: &str) -> Vec<String> {
    let Some(caps) = number_pattern().captures(text) else {
        return Vec::new();
    };
    let Some(whole) = caps.get(0) else {
        return Vec::new();
    };

    let (value, original_word) = match resolve_number(&caps) {
        Some(resolved) => resolved,
        None => return Vec::new(),
    };

    let mut forms = Vec::new();
    if let Some(word) = word_for(value) {
        let word = match original_word {
            Some(original) => match_case(word, original),
            None => word.to_string(),
        };
        forms.push(format!("{} ({})", word, value));
        forms.push(format!("{}({})", word, value));
        forms.push(word);
    }
    forms.push(value.to_string());
    forms.push(format!("({})", value));

    forms
        .into_iter()
        .map(|form| format!("{}{}{}", &text[..whole.start()], form, &text[whole.end()..]))
        .collect()
}

fn resolve_number<'t>(caps: &Captures<'t>) -> Option<(u32, Option<&'t str>)> {
    if let (Some(word), Some(digits)) = (caps.get(1), caps.get(2)) {
        return Some((digits.as_str().parse().ok()?, Some(word.as_str())));
    }
    if let Some(digits) = caps.get(3) {
        return Some((digits.as_str().parse().ok()?, None));
    }
    if let Some(word) = caps.get(4) {
        return Some((value_of(word.as_str())?, Some(word.as_str())));
    }
    let digits = caps.get(5)?;
    Some((digits.as_str().parse().ok()?, None))
}

/// Swap "year" and "years"
fn toggle_year(text: &str) -> Option<String> {
    if !year_pattern().is_match(text) {
        return None;
    }
    let toggled = year_pattern().replace_all(text, |caps: &Captures| {
        let stem = &caps[1];
        if caps[2].is_empty() {
            format!("{}s", stem)
        } else {
            stem.to_string()
        }
    });
    Some(toggled.into_owned())
}

/// With and without a leading field label
fn label_variants(text: &str) -> Vec<String> {
    for label in FIELD_LABELS {
        if let Some(rest) = text.strip_prefix(label) {
            let rest = rest.trim_start();
            return if rest.is_empty() {
                Vec::new()
            } else {
                vec![rest.to_string()]
            };
        }
    }

    if !text.contains(':') && text.len() <= 60 {
        vec![format!("For: {}", text)]
    } else {
        Vec::new()
    }
}

/// Generate the variants of `target`, in a fixed order, without duplicates
/// and without the target itself
pub fn variants(target: &str) -> Vec<String> {
    let target = target.trim();
    if target.is_empty() {
        return Vec::new();
    }

    let mut candidates = number_variants(target);

    let mut with_years = Vec::new();
    for candidate in std::iter::once(target.to_string()).chain(candidates.iter().cloned()) {
        if let Some(toggled) = toggle_year(&candidate) {
            with_years.push(toggled);
        }
    }
    candidates.extend(with_years);
    candidates.extend(label_variants(target));

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| !c.is_empty() && c != target)
        .filter(|c| seen.insert(c.clone()))
        .collect()
}
