//! The raw candidate bag produced by the extractor (C3) and consumed by the
//! consensus analyzer (C4). See spec §4.3.

use std::collections::HashMap;

use crate::model::TokenCategory;

/// One raw candidate value plus its weighted usage and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// The raw, unparsed declaration value (post shorthand-expansion).
    pub raw_value: String,
    /// Weighted selector count: `1 + 0.25 * common_viewport_classes` per
    /// matching selector, summed across all selectors using this value.
    pub usage: f64,
    /// SHA-256 of the `CssContent` this observation was read from.
    pub origin_sha: String,
}

/// A raw custom-property (`--name`) observation, tracked separately so the
/// consensus pass can infer its category from use sites.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomPropertyObservation {
    pub name: String,
    pub raw_value: String,
    pub usage: f64,
    /// Categories this variable was consumed as at `var(--name)` use sites.
    pub used_as: Vec<TokenCategory>,
}

/// Typography observations, split by sub-kind (spec §4.3 table) since each
/// has a distinct consensus rule (families retained verbatim; size/weight/
/// line-height/letter-spacing frequency-clustered).
#[derive(Debug, Clone, Default)]
pub struct TypographyObservations {
    pub family: Vec<Observation>,
    pub size: Vec<Observation>,
    pub weight: Vec<Observation>,
    pub line_height: Vec<Observation>,
    pub letter_spacing: Vec<Observation>,
}

impl TypographyObservations {
    fn total(&self) -> usize {
        self.family.len() + self.size.len() + self.weight.len() + self.line_height.len() + self.letter_spacing.len()
    }
}

/// The full set of observations extracted from one scan's CSS sources.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    /// Color, dimension (spacing), shadow, radius, and motion observations.
    pub by_category: HashMap<TokenCategory, Vec<Observation>>,
    /// Typography observations, further split by sub-kind.
    pub typography: TypographyObservations,
    pub custom_properties: HashMap<String, CustomPropertyObservation>,
    /// Count of declarations that failed to parse or were structurally
    /// invalid (spec §4.3 `parser.invalid_declarations` metric).
    pub invalid_declarations: u64,
    /// Fraction of raw observations retained per category after the 50 000
    /// cap (spec §4.3); absent (1.0) for categories under the cap.
    pub sampling_ratios: HashMap<TokenCategory, f64>,
}

/// Categories may not exceed this many raw observations (spec §4.3).
pub const MAX_OBSERVATIONS_PER_CATEGORY: usize = 50_000;

impl Observations {
    /// Records one observation, appending to its category's bag.
    pub fn push(&mut self, category: TokenCategory, raw_value: impl Into<String>, usage: f64, origin_sha: &str) {
        self.by_category.entry(category).or_default().push(Observation {
            raw_value: raw_value.into(),
            usage,
            origin_sha: origin_sha.to_owned(),
        });
    }

    /// Records or merges a custom-property definition. Multiple definitions
    /// of the same name across sources accumulate usage.
    pub fn push_custom_property(&mut self, name: &str, raw_value: &str, usage: f64) {
        let entry = self
            .custom_properties
            .entry(name.to_owned())
            .or_insert_with(|| CustomPropertyObservation {
                name: name.to_owned(),
                raw_value: raw_value.to_owned(),
                usage: 0.0,
                used_as: Vec::new(),
            });
        entry.usage += usage;
    }

    /// Notes that `var(--name)` was consumed in a declaration that maps to
    /// `category`, for category inference on the variable itself, and folds
    /// the use site's selector weight into the property's usage count (spec
    /// §4.3: "usage count = number of distinct selectors using the value").
    pub fn note_custom_property_use(&mut self, name: &str, category: TokenCategory, usage: f64) {
        if let Some(entry) = self.custom_properties.get_mut(name) {
            if !entry.used_as.contains(&category) {
                entry.used_as.push(category);
            }
            entry.usage += usage;
        }
    }

    /// Enforces the per-category observation cap via uniform sampling,
    /// recording the resulting ratio even when no sampling occurred.
    pub fn enforce_caps(&mut self) {
        for (category, bag) in self.by_category.iter_mut() {
            let total = bag.len();
            if total <= MAX_OBSERVATIONS_PER_CATEGORY {
                self.sampling_ratios.insert(*category, 1.0);
                continue;
            }
            let ratio = MAX_OBSERVATIONS_PER_CATEGORY as f64 / total as f64;
            let stride = (total as f64 / MAX_OBSERVATIONS_PER_CATEGORY as f64).ceil() as usize;
            let sampled: Vec<Observation> = bag.iter().step_by(stride.max(1)).cloned().collect();
            *bag = sampled;
            self.sampling_ratios.insert(*category, ratio);
        }
    }

    /// Total raw observations across every category, for metrics.
    pub fn total_observations(&self) -> usize {
        self.by_category.values().map(Vec::len).sum::<usize>() + self.typography.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_are_recorded_even_when_under_limit() {
        let mut obs = Observations::default();
        obs.push(TokenCategory::Color, "#fff", 1.0, "sha");
        obs.enforce_caps();
        assert_eq!(obs.sampling_ratios[&TokenCategory::Color], 1.0);
    }

    #[test]
    fn oversized_category_is_sampled_down() {
        let mut obs = Observations::default();
        for i in 0..(MAX_OBSERVATIONS_PER_CATEGORY + 500) {
            obs.push(TokenCategory::Color, format!("#{i:06x}"), 1.0, "sha");
        }
        obs.enforce_caps();
        assert!(obs.by_category[&TokenCategory::Color].len() <= MAX_OBSERVATIONS_PER_CATEGORY);
        assert!(obs.sampling_ratios[&TokenCategory::Color] < 1.0);
    }
}
