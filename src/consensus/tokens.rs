//! The canonical, typed token shape produced by every consensus pass, and
//! its serialization to the W3C DTCG document persisted on `TokenSet`
//! (spec §6, §9 design note on avoiding a free-form map).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::TokenCategory;

/// Typography sub-kind, since the `typography` category groups several
/// distinct value shapes (spec §4.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypographyKind {
    Family,
    Size,
    Weight,
    LineHeight,
    LetterSpacing,
}

/// One canonical, post-consensus token. Internal representation is a typed
/// tagged union per category, per the design note — never a free-form map.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalToken {
    Color {
        value: String,
        semantic: Option<String>,
    },
    Dimension {
        value: String,
    },
    Radius {
        value: String,
    },
    Typography {
        kind: TypographyKind,
        value: String,
    },
    Shadow {
        value: String,
    },
    Motion {
        value: String,
    },
}

impl CanonicalToken {
    pub fn category(&self) -> TokenCategory {
        match self {
            CanonicalToken::Color { .. } => TokenCategory::Color,
            CanonicalToken::Dimension { .. } => TokenCategory::Dimension,
            CanonicalToken::Radius { .. } => TokenCategory::Radius,
            CanonicalToken::Typography { .. } => TokenCategory::Typography,
            CanonicalToken::Shadow { .. } => TokenCategory::Shadow,
            CanonicalToken::Motion { .. } => TokenCategory::Motion,
        }
    }

    pub fn dtcg_type(&self) -> &'static str {
        match self {
            CanonicalToken::Color { .. } => "color",
            CanonicalToken::Dimension { .. } => "dimension",
            CanonicalToken::Radius { .. } => "dimension",
            CanonicalToken::Typography { kind, .. } => match kind {
                TypographyKind::Family => "fontFamily",
                TypographyKind::Size => "dimension",
                TypographyKind::Weight => "fontWeight",
                TypographyKind::LineHeight => "number",
                TypographyKind::LetterSpacing => "dimension",
            },
            CanonicalToken::Shadow { .. } => "shadow",
            CanonicalToken::Motion { .. } => "transition",
        }
    }

    pub fn value_json(&self) -> serde_json::Value {
        let raw = match self {
            CanonicalToken::Color { value, .. } => value,
            CanonicalToken::Dimension { value } => value,
            CanonicalToken::Radius { value } => value,
            CanonicalToken::Typography { value, .. } => value,
            CanonicalToken::Shadow { value } => value,
            CanonicalToken::Motion { value } => value,
        };
        serde_json::Value::String(raw.clone())
    }
}

/// One finished token: name, canonical value, and the analysis metadata
/// that becomes `$extensions`.
#[derive(Debug, Clone)]
pub struct ConsensusToken {
    pub name: String,
    pub token: CanonicalToken,
    pub confidence: f64,
    pub usage: u64,
}

/// `$extensions` payload for a persisted token leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenExtensions {
    pub usage: u64,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<String>,
}

/// One leaf of the persisted DTCG document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLeaf {
    #[serde(rename = "$value")]
    pub value: serde_json::Value,
    #[serde(rename = "$type")]
    pub token_type: String,
    #[serde(rename = "$extensions")]
    pub extensions: TokenExtensions,
}

/// The persisted shape: category name -> token name -> leaf. This is the
/// W3C DTCG document (spec §6); round-trips losslessly through JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenDocument {
    #[serde(flatten)]
    pub categories: BTreeMap<String, BTreeMap<String, TokenLeaf>>,
}

fn category_name(category: TokenCategory) -> &'static str {
    match category {
        TokenCategory::Color => "color",
        TokenCategory::Typography => "typography",
        TokenCategory::Dimension => "dimension",
        TokenCategory::Shadow => "shadow",
        TokenCategory::Radius => "radius",
        TokenCategory::Motion => "motion",
    }
}

impl TokenDocument {
    /// Builds a document from a flat list of consensus tokens.
    pub fn from_tokens(tokens: Vec<ConsensusToken>) -> Self {
        let mut categories: BTreeMap<String, BTreeMap<String, TokenLeaf>> = BTreeMap::new();
        for t in tokens {
            let leaf = TokenLeaf {
                value: t.token.value_json(),
                token_type: t.token.dtcg_type().to_string(),
                extensions: TokenExtensions {
                    usage: t.usage,
                    confidence: t.confidence,
                    semantic: match &t.token {
                        CanonicalToken::Color { semantic, .. } => semantic.clone(),
                        _ => None,
                    },
                },
            };
            categories
                .entry(category_name(t.token.category()).to_string())
                .or_default()
                .insert(t.name, leaf);
        }
        TokenDocument { categories }
    }

    /// All `(path, leaf)` pairs in `category.name` dotted-path form, used by
    /// the diff engine (spec §4.6).
    pub fn paths(&self) -> Vec<(String, &TokenLeaf)> {
        let mut out = Vec::new();
        for (cat, tokens) in &self.categories {
            for (name, leaf) in tokens {
                out.push((format!("{cat}.{name}"), leaf));
            }
        }
        out
    }

    /// Per-category token counts, for [`crate::store::stats`].
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        self.categories.iter().map(|(cat, tokens)| (cat.clone(), tokens.len())).collect()
    }

    /// Weighted mean confidence across every token, weighted by usage —
    /// the TokenSet's `consensus_score` (spec §4.4).
    pub fn consensus_score(&self) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (_, tokens) in &self.categories {
            for leaf in tokens.values() {
                let w = (leaf.extensions.usage.max(1)) as f64;
                weighted_sum += leaf.extensions.confidence * w;
                weight_total += w;
            }
        }
        if weight_total == 0.0 {
            0.0
        } else {
            weighted_sum / weight_total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let tokens = vec![ConsensusToken {
            name: "primary".into(),
            token: CanonicalToken::Color {
                value: "#635bff".into(),
                semantic: Some("primary".into()),
            },
            confidence: 0.9,
            usage: 42,
        }];
        let doc = TokenDocument::from_tokens(tokens);
        let json = serde_json::to_string(&doc).unwrap();
        let back: TokenDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.categories["color"]["primary"].value, serde_json::json!("#635bff"));
    }

    #[test]
    fn consensus_score_is_usage_weighted() {
        let tokens = vec![
            ConsensusToken {
                name: "a".into(),
                token: CanonicalToken::Color { value: "#fff".into(), semantic: None },
                confidence: 1.0,
                usage: 100,
            },
            ConsensusToken {
                name: "b".into(),
                token: CanonicalToken::Color { value: "#000".into(), semantic: None },
                confidence: 0.0,
                usage: 1,
            },
        ];
        let doc = TokenDocument::from_tokens(tokens);
        assert!(doc.consensus_score() > 0.9);
    }
}
