//! Typography consensus: families retained verbatim, weight/line-height/
//! letter-spacing via frequency-threshold clustering (spec §4.4).

use crate::consensus::scale::{cluster_by_frequency, confidence_for_usage};
use crate::consensus::tokens::{CanonicalToken, ConsensusToken, TypographyKind};
use crate::css::observations::Observation;
use std::collections::BTreeMap;

/// Family lists are retained verbatim and deduplicated by normalized
/// lowercase key; confidence scales with usage (spec §4.4).
pub fn analyze_family(observations: &[Observation]) -> Vec<ConsensusToken> {
    let mut by_key: BTreeMap<String, (String, f64)> = BTreeMap::new();
    for o in observations {
        let key = o.raw_value.to_ascii_lowercase();
        let entry = by_key.entry(key).or_insert_with(|| (o.raw_value.clone(), 0.0));
        entry.1 += o.usage;
    }
    let mut ranked: Vec<(String, f64)> = by_key.into_values().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (value, usage))| ConsensusToken {
            name: format!("font-family-{i}"),
            token: CanonicalToken::Typography { kind: TypographyKind::Family, value },
            confidence: confidence_for_usage(usage),
            usage: usage.round() as u64,
        })
        .collect()
}

fn clustered_tokens(
    observations: &[Observation],
    kind: TypographyKind,
    name_prefix: &str,
) -> Vec<ConsensusToken> {
    cluster_by_frequency(observations)
        .into_iter()
        .enumerate()
        .map(|(i, (value, usage))| ConsensusToken {
            name: format!("{name_prefix}-{i}"),
            token: CanonicalToken::Typography { kind, value },
            confidence: confidence_for_usage(usage),
            usage: usage.round() as u64,
        })
        .collect()
}

/// Font-weight consensus.
pub fn analyze_weight(observations: &[Observation]) -> Vec<ConsensusToken> {
    clustered_tokens(observations, TypographyKind::Weight, "font-weight")
}

/// Line-height consensus.
pub fn analyze_line_height(observations: &[Observation]) -> Vec<ConsensusToken> {
    clustered_tokens(observations, TypographyKind::LineHeight, "line-height")
}

/// Letter-spacing consensus.
pub fn analyze_letter_spacing(observations: &[Observation]) -> Vec<ConsensusToken> {
    clustered_tokens(observations, TypographyKind::LetterSpacing, "letter-spacing")
}
