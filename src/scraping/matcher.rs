//! Keyword matching against image metadata
//!
//! Matching is token-exact: each field is case-folded, stripped of everything
//! except letters, digits and whitespace, split on whitespace, and the tokens
//! intersected with the keyword set. "concatenated-cat-text" collapses to a
//! single token and so does not match "cat".

use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::types::KeywordSet;

/// Textual metadata of one `<img>` element
#[derive(Debug, Clone, Default)]
pub struct ImageText<'a> {
    pub alt: Option<&'a str>,
    pub title: Option<&'a str>,
    /// File name with the extension removed
    pub file_stem: Option<&'a str>,
}

/// Case-fold a field and drop every character that is not a letter, digit or whitespace
pub fn normalize_field(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Whitespace-separated tokens of a normalized field
fn tokens(raw: &str) -> BTreeSet<String> {
    normalize_field(raw)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Keywords matched by any of the image's text fields
pub fn match_keywords(text: &ImageText<'_>, keywords: &KeywordSet) -> BTreeSet<String> {
    [text.alt, text.title, text.file_stem]
        .into_iter()
        .flatten()
        .flat_map(tokens)
        .filter(|token| keywords.contains(token))
        .collect()
}

/// Strip the extension from the last path segment of an image URL.
///
/// The segment is percent-decoded first:
/// `https://x.com/img/Cute%20Dog.PNG` → `Cute Dog.PNG` → `Cute Dog`
pub fn file_stem_of(url: &url::Url) -> Option<String> {
    let raw = url.path_segments()?.next_back()?;
    if raw.is_empty() {
        return None;
    }
    // Invalid UTF-8 after decoding falls back to the encoded form
    let name = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => &*name,
    };
    Some(stem.to_string())
}
