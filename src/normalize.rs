// Canonical key form for scraped header and cell text.
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

/// Remove accents while preserving the base characters.
fn strip_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Convert raw header text to its canonical key form: lowercase, accents
/// stripped, punctuation and whitespace runs folded to single underscores,
/// no leading or trailing underscore. Total and deterministic; empty input
/// yields empty output.
pub fn normalize_key(text: &str) -> String {
    let text = strip_accents(&text.to_lowercase());
    let text = PUNCT.replace_all(&text, "_");
    let text = SPACES.replace_all(&text, "_");
    let text = UNDERSCORES.replace_all(&text, "_");
    text.trim_matches('_').to_string()
}
