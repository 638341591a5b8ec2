//! Global StatsCache maintenance (C9, spec §4.9).
//!
//! The cache is a single row, refreshed either incrementally (cheap counter
//! bumps on the hot write path) or by a full recompute (the `optimize` CLI
//! subcommand, or on first read if the row looks stale).

use std::collections::BTreeMap;

use rusqlite::params;

use crate::error::Result;
use crate::model::{now_millis, StatsCache};
use crate::store::Db;

/// Reads the current cache without recomputing anything.
pub fn read(db: &Db) -> Result<StatsCache> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM stats_cache WHERE id = 1", [], |row| {
            let per_category_json: String = row.get("per_category_json")?;
            Ok((
                StatsCache {
                    total_sites: row.get("total_sites")?,
                    total_scans: row.get("total_scans")?,
                    total_token_sets: row.get("total_token_sets")?,
                    total_tokens: row.get("total_tokens")?,
                    per_category_counts: BTreeMap::new(),
                    average_confidence: row.get("average_confidence")?,
                    updated_at: row.get("updated_at")?,
                },
                per_category_json,
            ))
        })
        .map_err(Into::into)
        .and_then(|(mut cache, per_category_json)| {
            cache.per_category_counts = serde_json::from_str(&per_category_json)?;
            Ok(cache)
        })
    })
}

/// Recomputes every field from the base tables. Expensive (full scans of
/// `site`, `scan`, and the current TokenSet per site) — intended for the
/// `optimize` CLI subcommand, not the hot path.
pub fn recompute(db: &Db) -> Result<StatsCache> {
    db.with_conn(|conn| {
        let total_sites: i64 = conn.query_row("SELECT count(*) FROM site", [], |r| r.get(0))?;
        let total_scans: i64 = conn.query_row("SELECT count(*) FROM scan", [], |r| r.get(0))?;
        let total_token_sets: i64 =
            conn.query_row("SELECT count(*) FROM token_set", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT ts.tokens_json, ts.consensus_score FROM token_set ts
             INNER JOIN (
                SELECT site_id, max(version_number) AS v FROM token_set GROUP BY site_id
             ) latest ON latest.site_id = ts.site_id AND latest.v = ts.version_number",
        )?;
        let rows = stmt.query_map([], |row| {
            let tokens_json: String = row.get(0)?;
            let consensus_score: f64 = row.get(1)?;
            Ok((tokens_json, consensus_score))
        })?;

        let mut total_tokens = 0i64;
        let mut per_category_counts: BTreeMap<String, i64> = BTreeMap::new();
        let mut confidence_sum = 0.0f64;
        let mut confidence_n = 0i64;

        for row in rows {
            let (tokens_json, consensus_score) = row?;
            if let Ok(doc) = serde_json::from_str::<crate::consensus::TokenDocument>(&tokens_json) {
                for (category, count) in doc.category_counts() {
                    *per_category_counts.entry(category).or_insert(0) += count as i64;
                    total_tokens += count as i64;
                }
            }
            confidence_sum += consensus_score;
            confidence_n += 1;
        }

        let average_confidence = if confidence_n > 0 {
            confidence_sum / confidence_n as f64
        } else {
            0.0
        };
        let updated_at = now_millis();
        let per_category_json = serde_json::to_string(&per_category_counts)?;

        conn.execute(
            "UPDATE stats_cache SET total_sites = ?1, total_scans = ?2, total_token_sets = ?3,
                total_tokens = ?4, per_category_json = ?5, average_confidence = ?6, updated_at = ?7
             WHERE id = 1",
            params![
                total_sites,
                total_scans,
                total_token_sets,
                total_tokens,
                per_category_json,
                average_confidence,
                updated_at
            ],
        )?;

        Ok(StatsCache {
            total_sites,
            total_scans,
            total_token_sets,
            total_tokens,
            per_category_counts,
            average_confidence,
            updated_at,
        })
    })
}

/// Bumps `total_sites` by one. Called when a new [`crate::model::Site`] row
/// is created, avoiding a full [`recompute`] on the submission hot path.
pub fn bump_sites(db: &Db) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE stats_cache SET total_sites = total_sites + 1, updated_at = ?1 WHERE id = 1",
            params![now_millis()],
        )?;
        Ok(())
    })
}

/// Bumps `total_scans` by one. Called when a new [`crate::model::Scan`] row
/// is created.
pub fn bump_scans(db: &Db) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE stats_cache SET total_scans = total_scans + 1, updated_at = ?1 WHERE id = 1",
            params![now_millis()],
        )?;
        Ok(())
    })
}

/// Folds a freshly completed scan's token counts into the cache: bumps
/// `total_token_sets` by one, `total_tokens` by the document's token count,
/// and merges its per-category counts (spec §4.9: "refreshed on every scan
/// completion by incremental delta").
pub fn record_scan_completion(db: &Db, doc: &crate::consensus::TokenDocument) -> Result<()> {
    db.with_conn(|conn| {
        let per_category_json: String =
            conn.query_row("SELECT per_category_json FROM stats_cache WHERE id = 1", [], |r| r.get(0))?;
        let mut per_category_counts: BTreeMap<String, i64> = serde_json::from_str(&per_category_json)?;

        let mut delta_tokens = 0i64;
        for (category, count) in doc.category_counts() {
            *per_category_counts.entry(category).or_insert(0) += count as i64;
            delta_tokens += count as i64;
        }
        let per_category_json = serde_json::to_string(&per_category_counts)?;

        conn.execute(
            "UPDATE stats_cache SET total_token_sets = total_token_sets + 1,
                total_tokens = total_tokens + ?1, per_category_json = ?2, updated_at = ?3
             WHERE id = 1",
            params![delta_tokens, per_category_json, now_millis()],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanMethod;
    use crate::store::{scan, site};

    #[test]
    fn recompute_counts_sites_and_scans() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "example.test").unwrap();
        scan::create(&db, s.id, ScanMethod::Static).unwrap();
        let stats = recompute(&db).unwrap();
        assert_eq!(stats.total_sites, 1);
        assert_eq!(stats.total_scans, 1);
        assert_eq!(stats.total_token_sets, 0);
    }

    #[test]
    fn incremental_bumps_match_recompute() {
        let db = Db::open("sqlite::memory:").unwrap();
        site::get_or_create(&db, "example.test").unwrap();
        bump_sites(&db).unwrap();
        let cached = read(&db).unwrap();
        assert_eq!(cached.total_sites, 1);
    }

    #[test]
    fn record_scan_completion_folds_token_counts_and_categories() {
        let db = Db::open("sqlite::memory:").unwrap();
        let json = r#"{"color":{"primary":{"$value":"#ff0000","$type":"color","$extensions":{"usage":10,"confidence":0.9}},"secondary":{"$value":"#00ff00","$type":"color","$extensions":{"usage":5,"confidence":0.8}}}}"#;
        let doc: crate::consensus::TokenDocument = serde_json::from_str(json).unwrap();

        record_scan_completion(&db, &doc).unwrap();
        let cached = read(&db).unwrap();
        assert_eq!(cached.total_token_sets, 1);
        assert_eq!(cached.total_tokens, 2);
        assert_eq!(cached.per_category_counts.get("color"), Some(&2));
    }
}
