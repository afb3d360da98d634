use std::sync::OnceLock;

use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;

pub const PLACEHOLDER_SWATCH_NAME: &str = "Color";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorSwatch {
    pub hex: String,
    pub name: String,
}

fn hex_color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Six digits are tried first, so "#abcdef" never splits into "#abc".
    PATTERN.get_or_init(|| {
        Regex::new(r"#(?:[A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})").expect("hex color pattern is valid")
    })
}

/// Pulls hex color tokens out of free-form analysis text.
///
/// Best effort: matches are not validated against word boundaries, so a
/// 3-digit fragment of a longer token counts. Distinct literals are kept in
/// first-seen order; `#ABC` and `#abc` are different literals.
pub fn extract_swatches(text: &str) -> Vec<ColorSwatch> {
    let found: IndexSet<&str> = hex_color_pattern()
        .find_iter(text)
        .map(|found| found.as_str())
        .collect();
    found
        .into_iter()
        .map(|hex| ColorSwatch {
            hex: hex.to_string(),
            name: PLACEHOLDER_SWATCH_NAME.to_string(),
        })
        .collect()
}
