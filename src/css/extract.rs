//! Declaration -> [`Observation`](super::observations::Observation) mapping
//! (spec §4.3). Shorthands are expanded before counting; invalid or
//! unsupported declarations are skipped and counted, never fatal.

use regex::Regex;
use std::sync::OnceLock;

use crate::css::observations::{Observation, Observations};
use crate::css::syntax::{Declaration, Stylesheet};
use crate::model::TokenCategory;

fn make_observation(raw_value: &str, usage: f64, origin_sha: &str) -> Observation {
    Observation {
        raw_value: raw_value.to_string(),
        usage,
        origin_sha: origin_sha.to_string(),
    }
}

const COLOR_PROPS: &[&str] = &[
    "color",
    "background-color",
    "border-color",
    "border-top-color",
    "border-right-color",
    "border-bottom-color",
    "border-left-color",
    "outline-color",
    "fill",
    "stroke",
];

const SPACING_PROPS: &[&str] = &[
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "gap",
    "row-gap",
    "column-gap",
];

/// Common breakpoints the layout profiler treats as well-known viewport
/// classes, used to weight observations made inside matching `@media`
/// blocks (spec §4.3: "1 + 0.25 * common viewport classes").
const COMMON_BREAKPOINTS_PX: &[u32] = &[480, 640, 768, 1024, 1280, 1440];

fn gradient_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)#[0-9a-f]{3,8}\b|rgba?\([^)]*\)|hsla?\([^)]*\)").unwrap()
    })
}

fn var_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"var\(\s*(--[a-zA-Z0-9_-]+)").unwrap())
}

/// Splits on `sep` at paren-depth 0, trimming each segment.
fn split_top_level(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in value.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(value[start..i].trim().to_string());
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim().to_string());
    parts.into_iter().filter(|s| !s.is_empty()).collect()
}

fn parse_leading_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f64>().ok()
}

fn is_positive_finite_length(raw: &str) -> bool {
    matches!(parse_leading_number(raw), Some(n) if n.is_finite() && n > 0.0)
}

fn common_viewport_class_count(media: &[String]) -> f64 {
    media
        .iter()
        .filter(|m| COMMON_BREAKPOINTS_PX.iter().any(|px| m.contains(&px.to_string())))
        .count() as f64
}

fn selector_weight(media: &[String]) -> f64 {
    1.0 + 0.25 * common_viewport_class_count(media)
}

fn selector_count(prelude: &str) -> f64 {
    split_top_level(prelude, ',').len().max(1) as f64
}

/// Expands a CSS 1-4-value box shorthand into `(corner, value)` pairs.
fn expand_box_shorthand(value: &str) -> Vec<(&'static str, String)> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    match parts.len() {
        1 => vec![
            ("top", parts[0].to_string()),
            ("right", parts[0].to_string()),
            ("bottom", parts[0].to_string()),
            ("left", parts[0].to_string()),
        ],
        2 => vec![
            ("top", parts[0].to_string()),
            ("right", parts[1].to_string()),
            ("bottom", parts[0].to_string()),
            ("left", parts[1].to_string()),
        ],
        3 => vec![
            ("top", parts[0].to_string()),
            ("right", parts[1].to_string()),
            ("bottom", parts[2].to_string()),
            ("left", parts[1].to_string()),
        ],
        4 => vec![
            ("top", parts[0].to_string()),
            ("right", parts[1].to_string()),
            ("bottom", parts[2].to_string()),
            ("left", parts[3].to_string()),
        ],
        _ => Vec::new(),
    }
}

fn normalize_font_weight(raw: &str) -> Option<String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "normal" => Some("400".to_string()),
        "bold" => Some("700".to_string()),
        "bolder" | "lighter" | "inherit" | "initial" => None,
        other => other.parse::<f64>().ok().map(|n| (n as i64).to_string()),
    }
}

fn note_var_uses(obs: &mut Observations, value: &str, weight: f64, category: TokenCategory) {
    for cap in var_ref_regex().captures_iter(value) {
        obs.note_custom_property_use(&cap[1], category, weight);
    }
}

fn extract_gradient_colors(value: &str, weight: f64, sha: &str, obs: &mut Observations) {
    for m in gradient_color_regex().find_iter(value) {
        if crate::css::color::parse_css_color(m.as_str()).is_some() {
            obs.push(TokenCategory::Color, m.as_str().to_string(), weight, sha);
        }
    }
}

fn extract_declaration(decl: &Declaration, weight: f64, sha: &str, obs: &mut Observations) {
    let name = decl.name.as_str();
    let value = decl.value.trim();

    if let Some(var_name) = name.strip_prefix("--") {
        obs.push_custom_property(var_name, value, weight);
        return;
    }

    if COLOR_PROPS.contains(&name) {
        if crate::css::color::parse_css_color(value).is_some() {
            obs.push(TokenCategory::Color, value.to_string(), weight, sha);
        } else {
            note_var_uses(obs, value, weight, TokenCategory::Color);
        }
        return;
    }

    if name == "background" || name == "background-image" {
        if value.contains("gradient(") {
            extract_gradient_colors(value, weight, sha, obs);
        } else if crate::css::color::parse_css_color(value).is_some() {
            obs.push(TokenCategory::Color, value.to_string(), weight, sha);
        }
        return;
    }

    if name == "font-family" {
        obs.typography.family.push(make_observation(value, weight, sha));
        return;
    }

    if name == "font-size" {
        if is_positive_finite_length(value) {
            obs.typography.size.push(make_observation(value, weight, sha));
        }
        return;
    }

    if name == "font-weight" {
        if let Some(normalized) = normalize_font_weight(value) {
            obs.typography.weight.push(make_observation(&normalized, weight, sha));
        }
        return;
    }

    if name == "line-height" {
        obs.typography.line_height.push(make_observation(value, weight, sha));
        note_var_uses(obs, value, weight, TokenCategory::Typography);
        return;
    }

    if name == "letter-spacing" {
        obs.typography.letter_spacing.push(make_observation(value, weight, sha));
        note_var_uses(obs, value, weight, TokenCategory::Typography);
        return;
    }

    if SPACING_PROPS.contains(&name) {
        if name == "margin" || name == "padding" {
            for (_, corner_value) in expand_box_shorthand(value) {
                if is_positive_finite_length(&corner_value) {
                    obs.push(TokenCategory::Dimension, corner_value, weight, sha);
                }
            }
        } else if is_positive_finite_length(value) {
            obs.push(TokenCategory::Dimension, value.to_string(), weight, sha);
        } else {
            note_var_uses(obs, value, weight, TokenCategory::Dimension);
        }
        return;
    }

    if name == "border-radius" {
        let horizontal = value.split('/').next().unwrap_or(value);
        for (_, corner_value) in expand_box_shorthand(horizontal) {
            if parse_leading_number(&corner_value).map(|n| n >= 0.0).unwrap_or(false) {
                obs.push(TokenCategory::Radius, corner_value, weight, sha);
            }
        }
        return;
    }
    if name.starts_with("border-") && name.ends_with("-radius") {
        if parse_leading_number(value).map(|n| n >= 0.0).unwrap_or(false) {
            obs.push(TokenCategory::Radius, value.to_string(), weight, sha);
        }
        return;
    }

    if name == "box-shadow" || name == "text-shadow" {
        for shadow in split_top_level(value, ',') {
            if shadow.eq_ignore_ascii_case("none") {
                continue;
            }
            obs.push(TokenCategory::Shadow, shadow, weight, sha);
        }
        return;
    }

    if name == "transition" || name == "animation" {
        for segment in split_top_level(value, ',') {
            if segment.eq_ignore_ascii_case("none") {
                continue;
            }
            obs.push(TokenCategory::Motion, segment, weight, sha);
        }
        return;
    }
}

/// Walks every declaration in `stylesheet`, pushing observations into `obs`.
/// `sha` identifies the originating `CssContent` row.
pub fn extract(stylesheet: &Stylesheet, sha: &str, obs: &mut Observations) {
    for rule in &stylesheet.rules {
        let weight = selector_count(&rule.prelude) * selector_weight(&rule.media);
        for decl in &rule.declarations {
            extract_declaration(decl, weight, sha, obs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::syntax::parse_stylesheet;

    #[test]
    fn extracts_color_declarations() {
        let sheet = parse_stylesheet("a, b { color: #635bff; } .x { background-color: #0a2540; }");
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        let colors = &obs.by_category[&TokenCategory::Color];
        assert!(colors.iter().any(|o| o.raw_value == "#635bff" && o.usage == 2.0));
        assert!(colors.iter().any(|o| o.raw_value == "#0a2540"));
    }

    #[test]
    fn expands_margin_shorthand_into_four_sides() {
        let sheet = parse_stylesheet(".card { margin: 4px 8px; }");
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        let spacing = &obs.by_category[&TokenCategory::Dimension];
        assert_eq!(spacing.len(), 4);
        assert!(spacing.iter().filter(|o| o.raw_value == "4px").count() == 2);
        assert!(spacing.iter().filter(|o| o.raw_value == "8px").count() == 2);
    }

    #[test]
    fn zero_margins_are_excluded() {
        let sheet = parse_stylesheet(".card { margin: 0; }");
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        assert!(!obs.by_category.contains_key(&TokenCategory::Dimension));
    }

    #[test]
    fn custom_properties_are_tracked_with_use_site_category() {
        let sheet = parse_stylesheet(":root { --brand: #635bff; } a { color: var(--brand); }");
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        let brand = &obs.custom_properties["brand"];
        assert_eq!(brand.raw_value, "#635bff");
        assert!(brand.used_as.contains(&TokenCategory::Color));
    }

    #[test]
    fn custom_property_usage_accumulates_every_use_site_weight() {
        let css = ":root { --brand: #635bff; } a, b, c { color: var(--brand); }";
        let sheet = parse_stylesheet(css);
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        let brand = &obs.custom_properties["brand"];
        // One `:root` definition plus a 3-selector use site: usage must
        // reflect the use site's weight, not just the definition's.
        assert!(brand.usage >= 1.0 + 3.0, "usage was {}", brand.usage);
    }

    #[test]
    fn media_rules_are_weighted_above_baseline() {
        let sheet = parse_stylesheet("@media (min-width: 768px) { a { color: #fff; } }");
        let mut obs = Observations::default();
        extract(&sheet, "sha1", &mut obs);
        let colors = &obs.by_category[&TokenCategory::Color];
        assert!(colors[0].usage > 1.0);
    }
}
