//! Atomic TokenSet / TokenVersion / TokenChange writes (C6, spec §4.6).
//!
//! A rescan always produces exactly one new [`TokenSet`] row, even when the
//! computed tokens are byte-for-byte identical to the previous version — the
//! diff summary is simply empty (resolves the "no-op rescan" open question).

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{Result, ScanError};
use crate::model::{
    now_millis, ChangeType, DiffSummary, ScanId, SiteId, TokenCategory, TokenChange, TokenSet,
    TokenSetId, TokenVersion, TokenVersionId,
};
use crate::store::Db;

fn change_type_str(t: ChangeType) -> &'static str {
    match t {
        ChangeType::Added => "added",
        ChangeType::Removed => "removed",
        ChangeType::Modified => "modified",
    }
}

fn parse_change_type(s: &str) -> ChangeType {
    match s {
        "removed" => ChangeType::Removed,
        "modified" => ChangeType::Modified,
        _ => ChangeType::Added,
    }
}

fn category_str(c: TokenCategory) -> &'static str {
    match c {
        TokenCategory::Color => "color",
        TokenCategory::Typography => "typography",
        TokenCategory::Dimension => "dimension",
        TokenCategory::Shadow => "shadow",
        TokenCategory::Radius => "radius",
        TokenCategory::Motion => "motion",
    }
}

fn parse_category(s: &str) -> TokenCategory {
    match s {
        "typography" => TokenCategory::Typography,
        "dimension" => TokenCategory::Dimension,
        "shadow" => TokenCategory::Shadow,
        "radius" => TokenCategory::Radius,
        "motion" => TokenCategory::Motion,
        _ => TokenCategory::Color,
    }
}

fn token_set_from_row(row: &Row) -> rusqlite::Result<TokenSet> {
    Ok(TokenSet {
        id: row.get("id")?,
        site_id: row.get("site_id")?,
        scan_id: row.get("scan_id")?,
        version_number: row.get("version_number")?,
        tokens_json: row.get("tokens_json")?,
        consensus_score: row.get("consensus_score")?,
        is_public: row.get::<_, i64>("is_public")? != 0,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn token_version_from_row(row: &Row) -> rusqlite::Result<TokenVersion> {
    Ok(TokenVersion {
        id: row.get("id")?,
        token_set_id: row.get("token_set_id")?,
        previous_version_id: row.get("previous_version_id")?,
        diff_summary: DiffSummary {
            added: row.get::<_, i64>("added")? as u32,
            removed: row.get::<_, i64>("removed")? as u32,
            modified: row.get::<_, i64>("modified")? as u32,
        },
        changelog_json: row.get("changelog_json")?,
        created_at: row.get("created_at")?,
    })
}

fn token_change_from_row(row: &Row) -> rusqlite::Result<TokenChange> {
    Ok(TokenChange {
        id: row.get("id")?,
        token_version_id: row.get("token_version_id")?,
        token_path: row.get("token_path")?,
        change_type: parse_change_type(&row.get::<_, String>("change_type")?),
        category: parse_category(&row.get::<_, String>("category")?),
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
    })
}

/// The highest `version_number` recorded for a site, or 0 if none exist.
pub fn current_version_number(db: &Db, site_id: SiteId) -> Result<i64> {
    db.with_conn(|conn| {
        let n: Option<i64> = conn
            .query_row(
                "SELECT max(version_number) FROM token_set WHERE site_id = ?1",
                params![site_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(n.unwrap_or(0))
    })
}

/// The current (highest-version) TokenSet for a site, if any.
pub fn current_token_set(db: &Db, site_id: SiteId) -> Result<Option<TokenSet>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM token_set WHERE site_id = ?1 ORDER BY version_number DESC LIMIT 1",
            params![site_id],
            token_set_from_row,
        )
        .optional()
        .map_err(Into::into)
    })
}

/// One atomic change to be written as part of a new version.
pub struct ChangeInput {
    pub token_path: String,
    pub change_type: ChangeType,
    pub category: TokenCategory,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Writes a new TokenSet, its TokenVersion, and every TokenChange in one
/// transaction. `version_number` must be `current_version_number(..) + 1`;
/// the unique `(site_id, version_number)` constraint rejects a stale caller
/// racing against a concurrent write for the same site.
pub fn write_version(
    db: &Db,
    site_id: SiteId,
    scan_id: ScanId,
    version_number: i64,
    tokens_json: &str,
    consensus_score: f64,
    changelog_json: &str,
    changes: &[ChangeInput],
) -> Result<(TokenSet, TokenVersion)> {
    let now = now_millis();
    let diff = changes.iter().fold(DiffSummary::default(), |mut acc, c| {
        match c.change_type {
            ChangeType::Added => acc.added += 1,
            ChangeType::Removed => acc.removed += 1,
            ChangeType::Modified => acc.modified += 1,
        }
        acc
    });

    let (token_set_id, token_version_id) = db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO token_set (site_id, scan_id, version_number, tokens_json, consensus_score,
                is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![site_id, scan_id, version_number, tokens_json, consensus_score, now],
        )?;
        let token_set_id = tx.last_insert_rowid();

        let previous_version_id: Option<TokenVersionId> = tx
            .query_row(
                "SELECT tv.id FROM token_version tv
                 JOIN token_set ts ON ts.id = tv.token_set_id
                 WHERE ts.site_id = ?1 AND ts.version_number = ?2",
                params![site_id, version_number - 1],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO token_version (token_set_id, previous_version_id, added, removed,
                modified, changelog_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token_set_id,
                previous_version_id,
                diff.added,
                diff.removed,
                diff.modified,
                changelog_json,
                now
            ],
        )?;
        let token_version_id = tx.last_insert_rowid();

        for change in changes {
            tx.execute(
                "INSERT INTO token_change (token_version_id, token_path, change_type, category,
                    old_value, new_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    token_version_id,
                    change.token_path,
                    change_type_str(change.change_type),
                    category_str(change.category),
                    change.old_value,
                    change.new_value,
                ],
            )?;
        }

        tx.commit()?;
        Ok((token_set_id, token_version_id))
    })?;

    let token_set = get_token_set(db, token_set_id)?
        .ok_or_else(|| ScanError::Internal("token_set insert did not round-trip".into()))?;
    let token_version = get_token_version(db, token_version_id)?
        .ok_or_else(|| ScanError::Internal("token_version insert did not round-trip".into()))?;
    Ok((token_set, token_version))
}

/// Fetches a TokenSet by primary key.
pub fn get_token_set(db: &Db, id: TokenSetId) -> Result<Option<TokenSet>> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM token_set WHERE id = ?1", params![id], token_set_from_row)
            .optional()
            .map_err(Into::into)
    })
}

/// Fetches a TokenVersion by primary key.
pub fn get_token_version(db: &Db, id: TokenVersionId) -> Result<Option<TokenVersion>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM token_version WHERE id = ?1",
            params![id],
            token_version_from_row,
        )
        .optional()
        .map_err(Into::into)
    })
}

/// All TokenChange rows belonging to a version, in insertion order.
pub fn changes_for_version(db: &Db, token_version_id: TokenVersionId) -> Result<Vec<TokenChange>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM token_change WHERE token_version_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![token_version_id], token_change_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    })
}

/// All TokenSet versions for a site, newest first.
pub fn history_for_site(db: &Db, site_id: SiteId) -> Result<Vec<TokenSet>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM token_set WHERE site_id = ?1 ORDER BY version_number DESC",
        )?;
        let rows = stmt.query_map(params![site_id], token_set_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{scan, site};
    use crate::model::ScanMethod;

    fn new_site_and_scan(db: &Db) -> (SiteId, ScanId) {
        let s = site::get_or_create(db, "example.test").unwrap();
        let sc = scan::create(db, s.id, ScanMethod::Static).unwrap();
        (s.id, sc.id)
    }

    #[test]
    fn first_version_has_no_previous_and_empty_diff() {
        let db = Db::open("sqlite::memory:").unwrap();
        let (site_id, scan_id) = new_site_and_scan(&db);
        let (ts, tv) = write_version(&db, site_id, scan_id, 1, "{}", 0.9, "{}", &[]).unwrap();
        assert_eq!(ts.version_number, 1);
        assert!(tv.previous_version_id.is_none());
        assert_eq!(tv.diff_summary.added, 0);
    }

    #[test]
    fn second_version_links_to_first_and_counts_changes() {
        let db = Db::open("sqlite::memory:").unwrap();
        let (site_id, scan_id) = new_site_and_scan(&db);
        write_version(&db, site_id, scan_id, 1, "{}", 0.9, "{}", &[]).unwrap();
        let sc2 = scan::create(&db, site_id, ScanMethod::Static).unwrap();
        let changes = vec![ChangeInput {
            token_path: "color.primary.500".into(),
            change_type: ChangeType::Added,
            category: TokenCategory::Color,
            old_value: None,
            new_value: Some("#336699".into()),
        }];
        let (ts2, tv2) = write_version(&db, site_id, sc2.id, 2, "{}", 0.95, "{}", &changes).unwrap();
        assert_eq!(ts2.version_number, 2);
        assert!(tv2.previous_version_id.is_some());
        assert_eq!(tv2.diff_summary.added, 1);
        let stored = changes_for_version(&db, tv2.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].token_path, "color.primary.500");
    }

    #[test]
    fn no_op_rescan_still_creates_a_new_version() {
        let db = Db::open("sqlite::memory:").unwrap();
        let (site_id, scan_id) = new_site_and_scan(&db);
        write_version(&db, site_id, scan_id, 1, "{}", 0.9, "{}", &[]).unwrap();
        let sc2 = scan::create(&db, site_id, ScanMethod::Static).unwrap();
        let (ts2, tv2) = write_version(&db, site_id, sc2.id, 2, "{}", 0.9, "{}", &[]).unwrap();
        assert_eq!(ts2.version_number, 2);
        assert_eq!(tv2.diff_summary.added, 0);
        assert_eq!(tv2.diff_summary.removed, 0);
        assert_eq!(tv2.diff_summary.modified, 0);
        assert_eq!(history_for_site(&db, site_id).unwrap().len(), 2);
    }
}
