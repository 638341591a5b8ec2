//! Consensus Analyzer (C4, spec §4.4): turns raw [`crate::css::Observations`]
//! into a canonical [`TokenDocument`].

pub mod color;
pub mod scale;
pub mod tokens;
pub mod typography;

pub use tokens::TokenDocument;

use std::collections::HashMap;

use crate::css::observations::{CustomPropertyObservation, Observation, Observations};
use crate::model::TokenCategory;
use tokens::ConsensusToken;

fn analyze_category(category: TokenCategory, bag: &[Observation]) -> Vec<ConsensusToken> {
    match category {
        TokenCategory::Color => color::analyze(bag),
        TokenCategory::Dimension => scale::analyze_spacing(bag),
        TokenCategory::Radius => scale::analyze_radius(bag),
        TokenCategory::Shadow => scale::analyze_shadow(bag),
        TokenCategory::Motion => scale::analyze_motion(bag),
        TokenCategory::Typography => Vec::new(), // typography is split by sub-kind; see below
    }
}

fn infer_custom_property_category(prop: &CustomPropertyObservation) -> TokenCategory {
    if let Some(&first) = prop.used_as.first() {
        return first;
    }
    if crate::css::color::parse_css_color(&prop.raw_value).is_some() {
        TokenCategory::Color
    } else {
        TokenCategory::Dimension
    }
}

/// Folds custom-property definitions into the category bag their inferred
/// (or use-site) category belongs to (spec §4.3: "category inferred from
/// use sites; if never used, category defaults to the declared value's
/// shape").
fn custom_property_bags(
    props: &HashMap<String, CustomPropertyObservation>,
) -> HashMap<TokenCategory, Vec<Observation>> {
    let mut bags: HashMap<TokenCategory, Vec<Observation>> = HashMap::new();
    for prop in props.values() {
        let category = infer_custom_property_category(prop);
        bags.entry(category).or_default().push(Observation {
            raw_value: prop.raw_value.clone(),
            usage: prop.usage,
            origin_sha: String::new(),
        });
    }
    bags
}

/// Runs every per-category consensus pass and assembles the final document.
pub fn analyze(observations: &Observations) -> TokenDocument {
    analyze_with_tokens(observations).0
}

/// Like [`analyze`], but also returns the flat token list computed along the
/// way. The orchestrator needs the `dimension` subset of this list to hand
/// to the Layout Profiler (C5) without re-deriving the spacing scale.
pub fn analyze_with_tokens(observations: &Observations) -> (TokenDocument, Vec<ConsensusToken>) {
    let mut all: Vec<ConsensusToken> = Vec::new();
    let custom_bags = custom_property_bags(&observations.custom_properties);

    for category in [
        TokenCategory::Color,
        TokenCategory::Dimension,
        TokenCategory::Radius,
        TokenCategory::Shadow,
        TokenCategory::Motion,
    ] {
        let mut combined: Vec<Observation> =
            observations.by_category.get(&category).cloned().unwrap_or_default();
        if let Some(extra) = custom_bags.get(&category) {
            combined.extend(extra.iter().cloned());
        }
        all.extend(analyze_category(category, &combined));
    }

    all.extend(typography::analyze_family(&observations.typography.family));
    all.extend(scale::analyze_font_size(&observations.typography.size));
    all.extend(typography::analyze_weight(&observations.typography.weight));
    all.extend(typography::analyze_line_height(&observations.typography.line_height));
    all.extend(typography::analyze_letter_spacing(&observations.typography.letter_spacing));

    let doc = TokenDocument::from_tokens(all.clone());
    (doc, all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::{extract, syntax::parse_stylesheet};

    #[test]
    fn end_to_end_produces_named_color_and_spacing_tokens() {
        let css = r#"
            a, b { color: #635bff; margin: 4px 8px; }
            .x { color: #0a2540; }
        "#;
        let sheet = parse_stylesheet(css);
        let mut obs = Observations::default();
        extract::extract(&sheet, "sha1", &mut obs);
        obs.enforce_caps();
        let doc = analyze(&obs);
        assert!(doc.categories.contains_key("color"));
        assert!(doc.categories.contains_key("dimension"));
        assert!(doc.consensus_score() > 0.0);
    }
}
