//! Consensus Analyzer (C4, spec §4.4) through the full observations ->
//! TokenDocument path: alpha-0 exclusion and lossless JSON round-trip
//! (spec §8).

use motif::consensus::tokens::TokenDocument;
use motif::consensus::{analyze, analyze_with_tokens};
use motif::css::observations::Observations;
use motif::model::TokenCategory;

#[test]
fn alpha_zero_color_is_excluded_from_the_document() {
    let mut obs = Observations::default();
    obs.push(TokenCategory::Color, "rgba(0, 0, 0, 0)", 5.0, "sha1");
    obs.push(TokenCategory::Color, "#ff0000", 10.0, "sha1");

    let doc = analyze(&obs);
    let colors = doc.categories.get("color").expect("color category present");
    assert_eq!(colors.len(), 1);
    assert!(colors.values().any(|leaf| leaf.value.as_str() == Some("#ff0000")));
}

#[test]
fn token_document_round_trips_losslessly_through_json() {
    let mut obs = Observations::default();
    obs.push(TokenCategory::Color, "#635bff", 40.0, "sha1");
    obs.push(TokenCategory::Dimension, "8px", 12.0, "sha1");

    let (doc, _tokens) = analyze_with_tokens(&obs);
    let json = serde_json::to_string(&doc).unwrap();
    let round_tripped: TokenDocument = serde_json::from_str(&json).unwrap();

    assert_eq!(doc.paths().len(), round_tripped.paths().len());
    for (path, leaf) in doc.paths() {
        let other = round_tripped
            .paths()
            .into_iter()
            .find(|(p, _)| *p == path)
            .map(|(_, l)| l.clone())
            .expect("path present after round-trip");
        assert_eq!(leaf.value, other.value);
        assert_eq!(leaf.token_type, other.token_type);
        assert_eq!(leaf.extensions.usage, other.extensions.usage);
    }
}

#[test]
fn near_duplicate_colors_cluster_into_one_token() {
    let mut obs = Observations::default();
    obs.push(TokenCategory::Color, "#635bff", 40.0, "sha1");
    obs.push(TokenCategory::Color, "#635bfe", 2.0, "sha1");

    let doc = analyze(&obs);
    let colors = doc.categories.get("color").unwrap();
    assert_eq!(colors.len(), 1);
}
