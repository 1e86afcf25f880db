//! Per-language name mappings.
//!
//! The gazetteer stores names as tag maps (`name`, `name:de`, `ref`, ...). The indexer
//! works with a normalised form keyed by language code, where the untagged name is
//! stored under [`DEFAULT_LANGUAGE`].

use std::collections::BTreeMap;

/// Language code → display name.
///
/// A `BTreeMap` keeps serialisation order stable, so building the same document twice
/// yields identical bytes.
pub type Names = BTreeMap<String, String>;

/// Key used for the untagged `name` of a place.
pub const DEFAULT_LANGUAGE: &str = "default";

/// Key used for reference names (postcodes, route numbers).
pub const REF_KEY: &str = "ref";

const LANGUAGE_PREFIX: &str = "name:";

/// Normalise a raw gazetteer name tag map.
///
/// - `name` becomes `default`
/// - `name:<lang>` becomes `<lang>`
/// - `ref` is kept as is
/// - every other tag (`old_name`, `alt_name`, `name:<lang>:<variant>`, ...) is dropped
///
/// Empty values are dropped as well.
///
/// # Example
///
/// ```
/// use place_indexer_shared::types::names::normalize_gazetteer_names;
///
/// let names = normalize_gazetteer_names(vec![
///     ("name".to_string(), "München".to_string()),
///     ("name:en".to_string(), "Munich".to_string()),
///     ("old_name".to_string(), "Munichen".to_string()),
/// ]);
/// assert_eq!(names.get("default").map(String::as_str), Some("München"));
/// assert_eq!(names.get("en").map(String::as_str), Some("Munich"));
/// assert_eq!(names.len(), 2);
/// ```
pub fn normalize_gazetteer_names<I>(raw: I) -> Names
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut names = Names::new();
    for (key, value) in raw {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let normalized_key = if key == "name" {
            DEFAULT_LANGUAGE.to_string()
        } else if key == REF_KEY {
            REF_KEY.to_string()
        } else if let Some(language) = key.strip_prefix(LANGUAGE_PREFIX) {
            if !is_language_code(language) {
                continue;
            }
            language.to_string()
        } else {
            continue;
        };

        names.insert(normalized_key, value.to_string());
    }
    names
}

/// Pick the display name for a language.
///
/// Falls back to the default name, then to any available name (in key order).
pub fn localized<'a>(names: &'a Names, language: Option<&str>) -> Option<&'a str> {
    language
        .and_then(|lang| names.get(lang))
        .or_else(|| names.get(DEFAULT_LANGUAGE))
        .or_else(|| names.values().next())
        .map(String::as_str)
}

/// The value a postcode entity contributes to a document.
///
/// Postcode areas carry their code in `ref`; some only have a plain name.
pub fn postcode_value(names: &Names) -> Option<&str> {
    names
        .get(REF_KEY)
        .or_else(|| names.get(DEFAULT_LANGUAGE))
        .or_else(|| names.values().next())
        .map(String::as_str)
}

/// Language codes are short lowercase ASCII tokens, optionally with a region (`zh_Hant`, `pt-BR`).
pub fn is_language_code(code: &str) -> bool {
    let mut parts = code.splitn(2, ['-', '_']);
    let primary = parts.next().unwrap_or_default();
    let primary_ok = (2..=3).contains(&primary.len())
        && primary.chars().all(|c| c.is_ascii_lowercase());
    let region_ok = parts
        .next()
        .map(|region| !region.is_empty() && region.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(true);
    primary_ok && region_ok
}
