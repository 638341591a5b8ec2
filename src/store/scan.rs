//! Scan persistence: one row per pipeline run (spec §4.7 state machine).

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{Result, ScanError};
use crate::model::{now_millis, Scan, ScanId, ScanMethod, ScanState, SiteId};
use crate::store::Db;

fn method_str(method: ScanMethod) -> &'static str {
    match method {
        ScanMethod::Static => "static",
        ScanMethod::Computed => "computed",
    }
}

fn parse_method(s: &str) -> ScanMethod {
    match s {
        "computed" => ScanMethod::Computed,
        _ => ScanMethod::Static,
    }
}

fn state_str(state: ScanState) -> &'static str {
    match state {
        ScanState::Queued => "queued",
        ScanState::Fetching => "fetching",
        ScanState::Parsing => "parsing",
        ScanState::Analyzing => "analyzing",
        ScanState::Diffing => "diffing",
        ScanState::Completed => "completed",
        ScanState::Failed => "failed",
        ScanState::Canceled => "canceled",
    }
}

fn parse_state(s: &str) -> ScanState {
    match s {
        "fetching" => ScanState::Fetching,
        "parsing" => ScanState::Parsing,
        "analyzing" => ScanState::Analyzing,
        "diffing" => ScanState::Diffing,
        "completed" => ScanState::Completed,
        "failed" => ScanState::Failed,
        "canceled" => ScanState::Canceled,
        _ => ScanState::Queued,
    }
}

fn scan_from_row(row: &Row) -> rusqlite::Result<Scan> {
    Ok(Scan {
        id: row.get("id")?,
        site_id: row.get("site_id")?,
        method: parse_method(&row.get::<_, String>("method")?),
        state: parse_state(&row.get::<_, String>("state")?),
        css_source_count: row.get("css_source_count")?,
        aggregate_content_hash: row.get("aggregate_content_hash")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        error_kind: row.get("error_kind")?,
        error_message: row.get("error_message")?,
        metrics_json: row.get("metrics_json")?,
    })
}

/// Creates a scan for `site_id` in `Queued` state.
pub fn create(db: &Db, site_id: SiteId, method: ScanMethod) -> Result<Scan> {
    let started_at = now_millis();
    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scan (site_id, method, state, started_at) VALUES (?1, ?2, 'queued', ?3)",
            params![site_id, method_str(method), started_at],
        )?;
        Ok(conn.last_insert_rowid())
    })?;
    get(db, id)?.ok_or_else(|| ScanError::Internal("scan insert did not round-trip".into()))
}

/// Fetches a scan by primary key.
pub fn get(db: &Db, id: ScanId) -> Result<Option<Scan>> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM scan WHERE id = ?1", params![id], scan_from_row)
            .optional()
            .map_err(Into::into)
    })
}

/// The most recent scan for a site, regardless of state.
pub fn latest_for_site(db: &Db, site_id: SiteId) -> Result<Option<Scan>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM scan WHERE site_id = ?1 ORDER BY started_at DESC LIMIT 1",
            params![site_id],
            scan_from_row,
        )
        .optional()
        .map_err(Into::into)
    })
}

/// Whether `site_id` already has a scan in a non-terminal state. Used by the
/// orchestrator to enforce "at most one in-flight scan per site" before
/// acquiring the per-site mutex, so a caller can fail fast with a clear error
/// rather than block indefinitely.
pub fn has_active_scan(db: &Db, site_id: SiteId) -> Result<bool> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM scan WHERE site_id = ?1
                AND state NOT IN ('completed', 'failed', 'canceled')",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Moves a scan to a new non-terminal state.
pub fn advance(db: &Db, id: ScanId, state: ScanState) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute("UPDATE scan SET state = ?2 WHERE id = ?1", params![id, state_str(state)])?;
        Ok(())
    })
}

/// Records the number of distinct CSS sources and their aggregate hash once
/// the fetcher has finished (called before the `Parsing` transition).
pub fn record_sources(db: &Db, id: ScanId, css_source_count: i64, aggregate_content_hash: &str) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan SET css_source_count = ?2, aggregate_content_hash = ?3 WHERE id = ?1",
            params![id, css_source_count, aggregate_content_hash],
        )?;
        Ok(())
    })
}

/// Marks a scan `Completed`, stamping `finished_at` and metrics.
pub fn finish_completed(db: &Db, id: ScanId, metrics_json: &str) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan SET state = 'completed', finished_at = ?2, metrics_json = ?3 WHERE id = ?1",
            params![id, now_millis(), metrics_json],
        )?;
        Ok(())
    })
}

/// Marks a scan `Failed`, recording the classified error kind and message.
pub fn finish_failed(db: &Db, id: ScanId, error_kind: &str, error_message: &str) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan SET state = 'failed', finished_at = ?2, error_kind = ?3, error_message = ?4
             WHERE id = ?1",
            params![id, now_millis(), error_kind, error_message],
        )?;
        Ok(())
    })
}

/// Paginated scan history for a site, newest first (spec §4.8 `getSite`).
pub fn history_for_site(db: &Db, site_id: SiteId, limit: usize, offset: usize) -> Result<Vec<Scan>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM scan WHERE site_id = ?1 ORDER BY started_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![site_id, limit as i64, offset as i64], scan_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    })
}

/// Marks a scan `Canceled`.
pub fn finish_canceled(db: &Db, id: ScanId) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan SET state = 'canceled', finished_at = ?2 WHERE id = ?1",
            params![id, now_millis()],
        )?;
        Ok(())
    })
}
