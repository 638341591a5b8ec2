//! LayoutProfile persistence (C5, spec §4.5). One row per scan, never diffed.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{Result, ScanError};
use crate::model::{now_millis, LayoutProfile, LayoutProfileId, ScanId};
use crate::store::Db;

fn layout_profile_from_row(row: &Row) -> rusqlite::Result<LayoutProfile> {
    Ok(LayoutProfile {
        id: row.get("id")?,
        scan_id: row.get("scan_id")?,
        profile_json: row.get("profile_json")?,
        created_at: row.get("created_at")?,
    })
}

/// Writes the LayoutProfile for a scan. A scan has at most one profile, so a
/// second call for the same `scan_id` is rejected by the schema's unique
/// constraint rather than silently overwriting the first.
pub fn insert(db: &Db, scan_id: ScanId, profile_json: &str) -> Result<LayoutProfileId> {
    let now = now_millis();
    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO layout_profile (scan_id, profile_json, created_at) VALUES (?1, ?2, ?3)",
            params![scan_id, profile_json, now],
        )?;
        Ok(conn.last_insert_rowid())
    })?;
    Ok(id)
}

/// Fetches the LayoutProfile for a scan, if the profiler ran for it.
pub fn for_scan(db: &Db, scan_id: ScanId) -> Result<Option<LayoutProfile>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM layout_profile WHERE scan_id = ?1",
            params![scan_id],
            layout_profile_from_row,
        )
        .optional()
        .map_err(Into::into)
    })
}

/// The LayoutProfile belonging to a site's current (highest-version) scan,
/// joined through `token_set` (spec §4.8 `getSite`).
pub fn for_site(db: &Db, site_id: crate::model::SiteId) -> Result<Option<LayoutProfile>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT lp.* FROM layout_profile lp
             JOIN token_set ts ON ts.scan_id = lp.scan_id
             WHERE ts.site_id = ?1
             ORDER BY ts.version_number DESC LIMIT 1",
            params![site_id],
            layout_profile_from_row,
        )
        .optional()
        .map_err(Into::into)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanMethod;
    use crate::store::{scan, site};

    #[test]
    fn insert_then_read_back() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "example.test").unwrap();
        let sc = scan::create(&db, s.id, ScanMethod::Static).unwrap();
        insert(&db, sc.id, r#"{"containers":{}}"#).unwrap();
        let profile = for_scan(&db, sc.id).unwrap().unwrap();
        assert_eq!(profile.scan_id, sc.id);
    }

    #[test]
    fn duplicate_insert_for_same_scan_is_rejected() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "example.test").unwrap();
        let sc = scan::create(&db, s.id, ScanMethod::Static).unwrap();
        insert(&db, sc.id, "{}").unwrap();
        let second = insert(&db, sc.id, "{}");
        assert!(matches!(second, Err(ScanError::Storage(_))));
    }
}
