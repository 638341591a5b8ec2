//! Spacing base-unit inference and frequency-threshold clustering for
//! radii, shadows, motion, and typography sizes (spec §4.4).

use std::collections::BTreeMap;

use crate::consensus::tokens::{CanonicalToken, ConsensusToken, TypographyKind};
use crate::css::observations::Observation;

/// Candidate base units searched when inferring the spacing scale.
const BASE_CANDIDATES: &[i64] = &[2, 4, 6, 8];

/// A value counts toward the spacing cluster for `k * base` when within
/// this many CSS pixels of it.
const SNAP_TOLERANCE_PX: f64 = 1.0;

/// A cluster must carry at least this share of a category's total usage to
/// survive the frequency threshold (spec §4.4).
const FREQUENCY_THRESHOLD: f64 = 0.005;
/// Two clusters within this relative distance of each other are merged.
const MERGE_RELATIVE_DISTANCE: f64 = 0.05;

fn parse_dimension(raw: &str) -> Option<(f64, String)> {
    let trimmed = raw.trim();
    let split_idx = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(trimmed.len());
    if split_idx == 0 {
        return None;
    }
    let (num_part, unit_part) = trimmed.split_at(split_idx);
    num_part.parse::<f64>().ok().map(|n| (n, unit_part.trim().to_string()))
}

/// Finds the base unit in `{2,4,6,8}` maximizing the usage-weighted count of
/// pixel values divisible by it (spec §4.4 "Spacing").
fn infer_base_unit(px_values: &[(f64, f64)]) -> i64 {
    *BASE_CANDIDATES
        .iter()
        .max_by(|&&a, &&b| {
            let score = |base: i64| -> f64 {
                px_values
                    .iter()
                    .filter(|(n, _)| (n.round() as i64).checked_rem(base) == Some(0))
                    .map(|(_, usage)| usage)
                    .sum()
            };
            score(a).partial_cmp(&score(b)).unwrap()
        })
        .unwrap_or(&4)
}

/// Spacing consensus: infers a base unit, snaps px observations within
/// [`SNAP_TOLERANCE_PX`] of a multiple of it into `space-{k}` tokens, and
/// passes non-px units through as their own canonical values (common for
/// `rem`/`em`/`%` spacing systems the base-unit search doesn't cover).
pub fn analyze_spacing(observations: &[Observation]) -> Vec<ConsensusToken> {
    let parsed: Vec<(f64, String, f64)> = observations
        .iter()
        .filter_map(|o| parse_dimension(&o.raw_value).map(|(n, u)| (n, u, o.usage)))
        .collect();

    let px_values: Vec<(f64, f64)> =
        parsed.iter().filter(|(_, u, _)| u == "px").map(|(n, _, usage)| (*n, *usage)).collect();
    if px_values.is_empty() && parsed.is_empty() {
        return Vec::new();
    }
    let base = infer_base_unit(&px_values);

    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    for (n, usage) in &px_values {
        let nearest_k = (n / base as f64).round();
        let nearest_multiple = nearest_k * base as f64;
        if (n - nearest_multiple).abs() <= SNAP_TOLERANCE_PX && nearest_k > 0.0 {
            *buckets.entry(nearest_k as i64).or_insert(0.0) += usage;
        }
    }

    let mut tokens: Vec<ConsensusToken> = buckets
        .into_iter()
        .map(|(k, usage)| ConsensusToken {
            name: format!("space-{k}"),
            token: CanonicalToken::Dimension {
                value: format!("{}px", k * base),
            },
            confidence: ((1.0 + usage).log2() / 8.0).min(1.0),
            usage: usage.round() as u64,
        })
        .collect();

    let mut other_usage: BTreeMap<String, f64> = BTreeMap::new();
    for (n, unit, usage) in &parsed {
        if unit != "px" {
            *other_usage.entry(format!("{n}{unit}")).or_insert(0.0) += usage;
        }
    }
    let total_other: f64 = other_usage.values().sum();
    for (i, (value, usage)) in other_usage.into_iter().enumerate() {
        if total_other > 0.0 && usage / total_other >= FREQUENCY_THRESHOLD {
            tokens.push(ConsensusToken {
                name: format!("space-custom-{i}"),
                token: CanonicalToken::Dimension { value },
                confidence: ((1.0 + usage).log2() / 8.0).min(1.0),
                usage: usage.round() as u64,
            });
        }
    }
    tokens
}

/// A cluster of near-equal raw observations, merged within
/// [`MERGE_RELATIVE_DISTANCE`] of each other's leading numeric magnitude.
struct FrequencyCluster {
    representative: String,
    magnitude: f64,
    usage: f64,
}

fn magnitude_of(raw: &str) -> f64 {
    parse_dimension(raw).map(|(n, _)| n).unwrap_or(0.0)
}

/// Generic frequency-threshold clustering (spec §4.4 "Radii / Shadows /
/// Motion / Typography sizes"): groups identical raw strings, drops groups
/// under [`FREQUENCY_THRESHOLD`] of total usage, then merges remaining
/// groups within [`MERGE_RELATIVE_DISTANCE`] relative magnitude.
fn frequency_threshold_cluster(observations: &[Observation]) -> Vec<FrequencyCluster> {
    let mut by_value: BTreeMap<String, f64> = BTreeMap::new();
    for o in observations {
        *by_value.entry(o.raw_value.clone()).or_insert(0.0) += o.usage;
    }
    let total: f64 = by_value.values().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut candidates: Vec<(String, f64)> = by_value
        .into_iter()
        .filter(|(_, usage)| usage / total >= FREQUENCY_THRESHOLD)
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let mut clusters: Vec<FrequencyCluster> = Vec::new();
    for (value, usage) in candidates {
        let magnitude = magnitude_of(&value);
        let merged = clusters.iter_mut().find(|c| {
            if c.magnitude == 0.0 && magnitude == 0.0 {
                true
            } else {
                let denom = c.magnitude.abs().max(magnitude.abs()).max(f64::EPSILON);
                (c.magnitude - magnitude).abs() / denom <= MERGE_RELATIVE_DISTANCE
            }
        });
        match merged {
            Some(cluster) => cluster.usage += usage,
            None => clusters.push(FrequencyCluster {
                representative: value,
                magnitude,
                usage,
            }),
        }
    }
    clusters
}

fn confidence_for(usage: f64) -> f64 {
    ((1.0 + usage).log2() / 8.0).min(1.0)
}

/// Exposes the frequency-threshold clustering for other consensus modules
/// (typography weight/line-height/letter-spacing use the same rule as
/// radii/shadows/motion).
pub(crate) fn cluster_by_frequency(observations: &[Observation]) -> Vec<(String, f64)> {
    frequency_threshold_cluster(observations)
        .into_iter()
        .map(|c| (c.representative, c.usage))
        .collect()
}

pub(crate) fn confidence_for_usage(usage: f64) -> f64 {
    confidence_for(usage)
}

/// Radius consensus (spec §4.4).
pub fn analyze_radius(observations: &[Observation]) -> Vec<ConsensusToken> {
    frequency_threshold_cluster(observations)
        .into_iter()
        .enumerate()
        .map(|(i, c)| ConsensusToken {
            name: format!("radius-{i}"),
            token: CanonicalToken::Radius { value: c.representative },
            confidence: confidence_for(c.usage),
            usage: c.usage.round() as u64,
        })
        .collect()
}

/// Shadow consensus (spec §4.4). Magnitude is derived from the first
/// leading length token in the shadow's offset list, a reasonable proxy
/// for "Euclidean distance on numeric components" over the full raw text.
pub fn analyze_shadow(observations: &[Observation]) -> Vec<ConsensusToken> {
    frequency_threshold_cluster(observations)
        .into_iter()
        .enumerate()
        .map(|(i, c)| ConsensusToken {
            name: format!("shadow-{i}"),
            token: CanonicalToken::Shadow { value: c.representative },
            confidence: confidence_for(c.usage),
            usage: c.usage.round() as u64,
        })
        .collect()
}

/// Motion consensus (spec §4.4).
pub fn analyze_motion(observations: &[Observation]) -> Vec<ConsensusToken> {
    frequency_threshold_cluster(observations)
        .into_iter()
        .enumerate()
        .map(|(i, c)| ConsensusToken {
            name: format!("motion-{i}"),
            token: CanonicalToken::Motion { value: c.representative },
            confidence: confidence_for(c.usage),
            usage: c.usage.round() as u64,
        })
        .collect()
}

/// Typography font-size consensus; same frequency-threshold approach as
/// radii/shadows/motion (spec §4.4).
pub fn analyze_font_size(observations: &[Observation]) -> Vec<ConsensusToken> {
    frequency_threshold_cluster(observations)
        .into_iter()
        .enumerate()
        .map(|(i, c)| ConsensusToken {
            name: format!("font-size-{i}"),
            token: CanonicalToken::Typography {
                kind: TypographyKind::Size,
                value: c.representative,
            },
            confidence: confidence_for(c.usage),
            usage: c.usage.round() as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: &str, usage: f64) -> Observation {
        Observation { raw_value: value.to_string(), usage, origin_sha: "sha".into() }
    }

    #[test]
    fn infers_base_unit_of_four() {
        let observations = vec![obs("4px", 50.0), obs("8px", 30.0), obs("12px", 10.0), obs("5px", 1.0)];
        let tokens = analyze_spacing(&observations);
        assert!(tokens.iter().any(|t| t.name == "space-1"));
        assert!(tokens.iter().any(|t| t.name == "space-2"));
        assert!(tokens.iter().any(|t| t.name == "space-3"));
    }

    #[test]
    fn rare_radius_values_are_dropped() {
        let mut observations = vec![obs("4px", 995.0)];
        observations.push(obs("17px", 1.0));
        let tokens = analyze_radius(&observations);
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn near_values_merge_within_radius() {
        let observations = vec![obs("8px", 50.0), obs("8.2px", 50.0)];
        let tokens = analyze_radius(&observations);
        assert_eq!(tokens.len(), 1);
    }
}
