//! `searchTokens` (spec §4.8): substring or regex search over every site's
//! current TokenSet, with optional category/min-confidence filters.

use regex::Regex;

use crate::consensus::tokens::TokenDocument;
use crate::error::{Result, ScanError};
use crate::model::TokenCategory;
use crate::store::Db;

const MAX_LIMIT: usize = 500;

fn category_key(category: TokenCategory) -> &'static str {
    match category {
        TokenCategory::Color => "color",
        TokenCategory::Typography => "typography",
        TokenCategory::Dimension => "dimension",
        TokenCategory::Shadow => "shadow",
        TokenCategory::Radius => "radius",
        TokenCategory::Motion => "motion",
    }
}

/// Optional narrowing applied on top of the name match.
#[derive(Debug, Clone, Default)]
pub struct TokenFilters {
    pub category: Option<TokenCategory>,
    pub min_confidence: Option<f64>,
    /// When `true`, `query` is compiled as a regex instead of matched as a
    /// case-insensitive substring.
    pub regex: bool,
}

/// One matched token, scoped to the site it was found on.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenSearchHit {
    pub name: String,
    pub value: serde_json::Value,
    pub category: String,
    pub site: String,
    pub confidence: f64,
    pub usage: u64,
}

fn latest_token_sets(db: &Db) -> Result<Vec<(String, TokenDocument)>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT s.domain, ts.tokens_json FROM token_set ts
             JOIN site s ON s.id = ts.site_id
             INNER JOIN (
                SELECT site_id, max(version_number) AS v FROM token_set GROUP BY site_id
             ) latest ON latest.site_id = ts.site_id AND latest.v = ts.version_number",
        )?;
        let rows = stmt.query_map([], |row| {
            let domain: String = row.get(0)?;
            let tokens_json: String = row.get(1)?;
            Ok((domain, tokens_json))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (domain, tokens_json) = row?;
            let doc: TokenDocument = serde_json::from_str(&tokens_json)?;
            out.push((domain, doc));
        }
        Ok(out)
    })
}

/// Searches token names across every site's current TokenSet (spec §4.8
/// `searchTokens`). `limit` is clamped to [`MAX_LIMIT`]. An invalid regex
/// surfaces as [`ScanError::BadRequest`], matching the spec's error mapping.
pub fn search_tokens(
    db: &Db,
    query: &str,
    filters: &TokenFilters,
    limit: usize,
) -> Result<Vec<TokenSearchHit>> {
    let limit = limit.min(MAX_LIMIT);

    let is_match: Box<dyn Fn(&str) -> bool> = if filters.regex {
        let re = Regex::new(query).map_err(|e| ScanError::BadRequest(e.to_string()))?;
        Box::new(move |name: &str| re.is_match(name))
    } else {
        let needle = query.to_lowercase();
        Box::new(move |name: &str| name.to_lowercase().contains(&needle))
    };

    let mut hits = Vec::new();
    for (site_domain, doc) in latest_token_sets(db)? {
        for (category, by_name) in &doc.categories {
            if let Some(want) = filters.category {
                if category_key(want) != category.as_str() {
                    continue;
                }
            }
            for (name, leaf) in by_name {
                if !is_match(name) {
                    continue;
                }
                if let Some(min) = filters.min_confidence {
                    if leaf.extensions.confidence < min {
                        continue;
                    }
                }
                hits.push(TokenSearchHit {
                    name: name.clone(),
                    value: leaf.value.clone(),
                    category: category.clone(),
                    site: site_domain.clone(),
                    confidence: leaf.extensions.confidence,
                    usage: leaf.extensions.usage,
                });
            }
        }
    }

    hits.sort_by(|a, b| {
        b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    Ok(hits)
}
