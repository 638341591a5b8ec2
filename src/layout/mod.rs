//! Layout Profiler (C5, spec §4.5): derives a non-token structural snapshot
//! (containers, grid/flex ratio, spacing scale, archetypes) from the same
//! CSS the Consensus Analyzer (C4) already parsed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::consensus::tokens::ConsensusToken;
use crate::css::syntax::Stylesheet;

/// Responsive strategy inferred from the number of distinct media breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsiveStrategy {
    /// `>= 3` distinct media breakpoints are defined.
    Breakpoint,
    /// Fewer than 3 distinct breakpoints; layout likely scales fluidly.
    Fluid,
}

/// Dominant container sizing strategy (spec §4.5 "Containers").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Containers {
    /// The most common `max-width` value among block-level selectors, if any.
    pub dominant_max_width: Option<String>,
    pub strategy: ResponsiveStrategy,
    pub breakpoint_count: usize,
}

/// Grid vs. flex adoption, reported as integer percentages summing to 100
/// (spec §4.5 "Grid/flex ratio").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridFlexRatio {
    pub grid_pct: u32,
    pub flex_pct: u32,
}

/// Spacing scale summary, reusing the base unit and canonical tokens already
/// produced by [`crate::consensus::scale`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacingScale {
    pub tokens: Vec<String>,
}

/// Fixed archetype vocabulary (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Archetype {
    MarketingHero,
    FeatureGrid,
    PricingTable,
    Navigation,
    DocPage,
    Dashboard,
    AuthForm,
}

struct Signature {
    archetype: Archetype,
    patterns: &'static [&'static str],
}

/// Fraction of an archetype's selector-signature patterns that must appear
/// somewhere in the stylesheet's selectors for the archetype to be reported.
const ARCHETYPE_MATCH_THRESHOLD: f64 = 0.6;

const SIGNATURES: &[Signature] = &[
    Signature {
        archetype: Archetype::MarketingHero,
        patterns: &["hero", "cta", "headline", "tagline", "banner"],
    },
    Signature {
        archetype: Archetype::FeatureGrid,
        patterns: &["feature", "features", "card", "grid", "icon"],
    },
    Signature {
        archetype: Archetype::PricingTable,
        patterns: &["pricing", "plan", "tier", "price", "billing"],
    },
    Signature {
        archetype: Archetype::Navigation,
        patterns: &["nav", "navbar", "menu", "header", "breadcrumb"],
    },
    Signature {
        archetype: Archetype::DocPage,
        patterns: &["docs", "sidebar", "toc", "article", "prose"],
    },
    Signature {
        archetype: Archetype::Dashboard,
        patterns: &["dashboard", "widget", "panel", "chart", "metric"],
    },
    Signature {
        archetype: Archetype::AuthForm,
        patterns: &["login", "signup", "password", "auth", "form"],
    },
];

/// The full non-token structural profile for one scan (spec §4.5), persisted
/// as `LayoutProfile.profile_json`. Not diffed across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDna {
    pub containers: Containers,
    pub grid_flex_ratio: GridFlexRatio,
    pub spacing_scale: SpacingScale,
    pub archetypes: Vec<Archetype>,
}

fn parse_px(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().strip_suffix("px")?;
    trimmed.parse::<f64>().ok()
}

fn media_breakpoints(stylesheet: &Stylesheet) -> BTreeSet<i64> {
    let mut breakpoints = BTreeSet::new();
    for rule in &stylesheet.rules {
        for media in &rule.media {
            for token in media.split(|c: char| !c.is_ascii_digit()) {
                if let Ok(px) = token.parse::<i64>() {
                    if px > 0 {
                        breakpoints.insert(px);
                    }
                }
            }
        }
    }
    breakpoints
}

fn dominant_max_width(stylesheet: &Stylesheet) -> Option<String> {
    let mut usage: BTreeMap<String, f64> = BTreeMap::new();
    for rule in &stylesheet.rules {
        let selector_count = rule.prelude.split(',').count().max(1) as f64;
        for decl in &rule.declarations {
            if decl.name == "max-width" && parse_px(&decl.value).is_some() {
                *usage.entry(decl.value.clone()).or_insert(0.0) += selector_count;
            }
        }
    }
    let total: f64 = usage.values().sum();
    if total == 0.0 {
        return None;
    }
    usage
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .filter(|(_, count)| count / total >= 0.5)
        .map(|(value, _)| value)
}

fn grid_flex_ratio(stylesheet: &Stylesheet) -> GridFlexRatio {
    let mut grid = 0u32;
    let mut flex = 0u32;
    for rule in &stylesheet.rules {
        for decl in &rule.declarations {
            if decl.name == "display" {
                match decl.value.trim() {
                    "grid" | "inline-grid" => grid += 1,
                    "flex" | "inline-flex" => flex += 1,
                    _ => {}
                }
            }
        }
    }
    let total = grid + flex;
    if total == 0 {
        return GridFlexRatio { grid_pct: 0, flex_pct: 0 };
    }
    let grid_pct = (grid * 100) / total;
    GridFlexRatio { grid_pct, flex_pct: 100 - grid_pct }
}

fn archetypes(stylesheet: &Stylesheet) -> Vec<Archetype> {
    let selectors: Vec<String> = stylesheet.rules.iter().map(|r| r.prelude.to_ascii_lowercase()).collect();
    let haystack = selectors.join(" ");

    SIGNATURES
        .iter()
        .filter_map(|sig| {
            let hits = sig.patterns.iter().filter(|p| haystack.contains(*p)).count();
            let ratio = hits as f64 / sig.patterns.len() as f64;
            (ratio >= ARCHETYPE_MATCH_THRESHOLD).then_some(sig.archetype)
        })
        .collect()
}

/// Builds the [`LayoutDna`] for `stylesheet`, reusing the spacing tokens the
/// Consensus Analyzer already produced for this scan's `dimension` category.
pub fn profile(stylesheet: &Stylesheet, spacing_tokens: &[ConsensusToken]) -> LayoutDna {
    let breakpoints = media_breakpoints(stylesheet);
    let strategy = if breakpoints.len() >= 3 {
        ResponsiveStrategy::Breakpoint
    } else {
        ResponsiveStrategy::Fluid
    };

    let mut tokens: Vec<&ConsensusToken> = spacing_tokens.iter().collect();
    tokens.sort_by(|a, b| a.name.cmp(&b.name));

    LayoutDna {
        containers: Containers {
            dominant_max_width: dominant_max_width(stylesheet),
            strategy,
            breakpoint_count: breakpoints.len(),
        },
        grid_flex_ratio: grid_flex_ratio(stylesheet),
        spacing_scale: SpacingScale {
            tokens: tokens.into_iter().map(|t| t.name.clone()).collect(),
        },
        archetypes: archetypes(stylesheet),
    }
}
