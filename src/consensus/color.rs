//! Color consensus: CIEDE2000 clustering and semantic labeling (spec §4.4).

use crate::css::color::{delta_e_2000, parse_css_color, rgba8_to_lab, Lab};
use crate::css::observations::Observation;
use crate::consensus::tokens::{CanonicalToken, ConsensusToken};

/// Two observations belong to the same canonical color when their ΔE is
/// below this threshold.
const CLUSTER_THRESHOLD: f64 = 3.0;
/// An observation counts toward a cluster's cohesion when within this ΔE
/// of the cluster's running centroid.
const COHESION_THRESHOLD: f64 = 1.5;

struct Cluster {
    centroid: Lab,
    members: Vec<(Lab, Observation)>,
    usage_sum: f64,
}

impl Cluster {
    fn recompute_centroid(&mut self) {
        let total_weight: f64 = self.members.iter().map(|(_, o)| o.usage).sum();
        if total_weight <= 0.0 {
            return;
        }
        let (mut l, mut a, mut b) = (0.0, 0.0, 0.0);
        for (lab, o) in &self.members {
            l += lab.l * o.usage;
            a += lab.a * o.usage;
            b += lab.b * o.usage;
        }
        self.centroid = Lab {
            l: l / total_weight,
            a: a / total_weight,
            b: b / total_weight,
            alpha: self.centroid.alpha,
        };
    }

    /// The observation with the highest usage, i.e. the cluster's "most
    /// common original notation" (spec §4.4).
    fn canonical_notation(&self) -> &str {
        self.members
            .iter()
            .max_by(|(_, a), (_, b)| a.usage.partial_cmp(&b.usage).unwrap())
            .map(|(_, o)| o.raw_value.as_str())
            .unwrap_or("")
    }

    fn cohesion(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        let within = self
            .members
            .iter()
            .filter(|(lab, _)| delta_e_2000(*lab, self.centroid) <= COHESION_THRESHOLD)
            .count();
        within as f64 / self.members.len() as f64
    }
}

fn cluster_colors(observations: &[Observation]) -> Vec<Cluster> {
    let mut parsed: Vec<(Lab, Observation, u8)> = observations
        .iter()
        .filter_map(|o| {
            let rgba = parse_css_color(&o.raw_value)?;
            if rgba.3 == 0 {
                // spec §8 boundary: a color observed only with alpha 0 is excluded.
                return None;
            }
            Some((rgba8_to_lab(rgba), o.clone(), rgba.3))
        })
        .collect();
    parsed.sort_by(|a, b| b.1.usage.partial_cmp(&a.1.usage).unwrap());

    let mut clusters: Vec<Cluster> = Vec::new();
    for (lab, obs, _alpha) in parsed {
        let existing = clusters
            .iter_mut()
            .find(|c| delta_e_2000(c.centroid, lab) < CLUSTER_THRESHOLD);
        match existing {
            Some(cluster) => {
                cluster.usage_sum += obs.usage;
                cluster.members.push((lab, obs));
                cluster.recompute_centroid();
            }
            None => clusters.push(Cluster {
                centroid: lab,
                usage_sum: obs.usage,
                members: vec![(lab, obs)],
            }),
        }
    }
    clusters
}

fn confidence(cluster: &Cluster) -> f64 {
    let base = (1.0 + cluster.usage_sum).log2() / 8.0;
    base.min(1.0) * cluster.cohesion()
}

/// Hue bucket in degrees, used for brand-color semantic family labeling.
fn hue_degrees(lab: Lab) -> f64 {
    lab.b.atan2(lab.a).to_degrees().rem_euclid(360.0)
}

fn chroma(lab: Lab) -> f64 {
    (lab.a * lab.a + lab.b * lab.b).sqrt()
}

/// Chroma below this is considered achromatic/neutral.
const NEUTRAL_CHROMA_THRESHOLD: f64 = 10.0;

const NEUTRAL_BUCKETS: &[&str] = &[
    "neutral-50", "neutral-100", "neutral-200", "neutral-300", "neutral-400", "neutral-500",
    "neutral-600", "neutral-700", "neutral-800", "neutral-900",
];

/// Assigns semantic names to the top clusters by weighted usage: named
/// roles first (`primary`, `secondary`, `accent`), then hue-family roles
/// (`success`/`warning`/`danger`/`info`), then a neutral ramp by lightness.
fn assign_semantics(clusters: &[Cluster]) -> Vec<Option<String>> {
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    order.sort_by(|&a, &b| clusters[b].usage_sum.partial_cmp(&clusters[a].usage_sum).unwrap());

    let mut labels = vec![None; clusters.len()];
    let mut brand_slots = ["primary", "secondary", "accent"].iter();
    let mut neutral_idxs: Vec<usize> = Vec::new();
    let mut hue_taken = [false; 4]; // success, warning, danger, info

    for &idx in &order {
        let lab = clusters[idx].centroid;
        if chroma(lab) < NEUTRAL_CHROMA_THRESHOLD {
            neutral_idxs.push(idx);
            continue;
        }
        if let Some(slot) = brand_slots.next() {
            labels[idx] = Some(slot.to_string());
            continue;
        }
        let hue = hue_degrees(lab);
        let (slot_idx, name) = if (90.0..150.0).contains(&hue) {
            (0, "success")
        } else if (40.0..90.0).contains(&hue) {
            (1, "warning")
        } else if !(150.0..200.0).contains(&hue) && (hue < 40.0 || hue >= 330.0) {
            (2, "danger")
        } else {
            (3, "info")
        };
        if !hue_taken[slot_idx] {
            labels[idx] = Some(name.to_string());
            hue_taken[slot_idx] = true;
        }
    }

    // Neutrals ranked darkest-first get the highest-numbered bucket, so the
    // conventional "50 is lightest, 900 is darkest" ramp holds.
    neutral_idxs.sort_by(|&a, &b| clusters[a].centroid.l.partial_cmp(&clusters[b].centroid.l).unwrap());
    let n = neutral_idxs.len();
    for (rank, idx) in neutral_idxs.into_iter().rev().enumerate() {
        let bucket = (rank * NEUTRAL_BUCKETS.len()) / n.max(1);
        labels[idx] = Some(NEUTRAL_BUCKETS[bucket.min(NEUTRAL_BUCKETS.len() - 1)].to_string());
    }

    labels
}

/// Runs color consensus over raw observations, returning one
/// [`ConsensusToken`] per canonical cluster, named by its assigned semantic
/// role (falling back to `color-N` when no role was assigned).
pub fn analyze(observations: &[Observation]) -> Vec<ConsensusToken> {
    let clusters = cluster_colors(observations);
    let semantics = assign_semantics(&clusters);

    clusters
        .iter()
        .enumerate()
        .map(|(i, cluster)| {
            let semantic = semantics[i].clone();
            let name = semantic.clone().unwrap_or_else(|| format!("color-{i}"));
            ConsensusToken {
                name,
                token: CanonicalToken::Color {
                    value: cluster.canonical_notation().to_string(),
                    semantic,
                },
                confidence: confidence(cluster),
                usage: cluster.usage_sum.round() as u64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: &str, usage: f64) -> Observation {
        Observation {
            raw_value: value.to_string(),
            usage,
            origin_sha: "sha".to_string(),
        }
    }

    #[test]
    fn clusters_near_duplicates_and_picks_most_common_notation() {
        let observations = vec![obs("#635bff", 40.0), obs("#635bfe", 2.0)];
        let tokens = analyze(&observations);
        assert_eq!(tokens.len(), 1);
        if let CanonicalToken::Color { value, .. } = &tokens[0].token {
            assert_eq!(value, "#635bff");
        } else {
            panic!("expected color token");
        }
    }

    #[test]
    fn distinct_colors_yield_distinct_clusters() {
        let observations = vec![obs("#635bff", 42.0), obs("#0a2540", 18.0)];
        let tokens = analyze(&observations);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn alpha_zero_observation_is_excluded() {
        let observations = vec![obs("rgba(0, 0, 0, 0)", 5.0)];
        let tokens = analyze(&observations);
        assert!(tokens.is_empty());
    }

    #[test]
    fn top_usage_cluster_is_named_primary() {
        let observations = vec![obs("#635bff", 100.0), obs("#d92b2b", 5.0)];
        let tokens = analyze(&observations);
        let primary = tokens.iter().find(|t| t.name == "primary");
        assert!(primary.is_some());
    }
}
