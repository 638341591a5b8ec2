//! Site and Scan persistence.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{
    now_millis, RobotsStatus, Site, SiteId, SiteStatus,
};
use crate::store::Db;

fn site_from_row(row: &Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get("id")?,
        domain: row.get("domain")?,
        status: parse_site_status(&row.get::<_, String>("status")?),
        robots_status: parse_robots_status(&row.get::<_, String>("robots_status")?),
        first_seen_at: row.get("first_seen_at")?,
        last_scanned_at: row.get("last_scanned_at")?,
        popularity: row.get("popularity")?,
        title: row.get("title")?,
        description: row.get("description")?,
        favicon_url: row.get("favicon_url")?,
    })
}

fn site_status_str(status: SiteStatus) -> &'static str {
    match status {
        SiteStatus::Queued => "queued",
        SiteStatus::Scanning => "scanning",
        SiteStatus::Completed => "completed",
        SiteStatus::Failed => "failed",
    }
}

fn parse_site_status(s: &str) -> SiteStatus {
    match s {
        "scanning" => SiteStatus::Scanning,
        "completed" => SiteStatus::Completed,
        "failed" => SiteStatus::Failed,
        _ => SiteStatus::Queued,
    }
}

fn robots_status_str(status: RobotsStatus) -> &'static str {
    match status {
        RobotsStatus::Allowed => "allowed",
        RobotsStatus::Disallowed => "disallowed",
        RobotsStatus::Unknown => "unknown",
    }
}

fn parse_robots_status(s: &str) -> RobotsStatus {
    match s {
        "allowed" => RobotsStatus::Allowed,
        "disallowed" => RobotsStatus::Disallowed,
        _ => RobotsStatus::Unknown,
    }
}

/// Fetches the site with `domain`, if any.
pub fn get_by_domain(db: &Db, domain: &str) -> Result<Option<Site>> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM site WHERE domain = ?1", params![domain], site_from_row)
            .optional()
            .map_err(Into::into)
    })
}

/// Fetches the site by primary key.
pub fn get(db: &Db, id: SiteId) -> Result<Option<Site>> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM site WHERE id = ?1", params![id], site_from_row)
            .optional()
            .map_err(Into::into)
    })
}

/// Returns the existing site for `domain`, or creates one in `Queued` state.
/// This is the "creates a Site if missing" behavior required by
/// `submitScan` (spec §4.8).
pub fn get_or_create(db: &Db, domain: &str) -> Result<Site> {
    if let Some(site) = get_by_domain(db, domain)? {
        return Ok(site);
    }
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO site (domain, status, robots_status, first_seen_at, popularity)
             VALUES (?1, 'queued', 'unknown', ?2, 0)
             ON CONFLICT(domain) DO NOTHING",
            params![domain, now_millis()],
        )?;
        Ok(())
    })?;
    get_by_domain(db, domain)?
        .ok_or_else(|| crate::error::ScanError::Internal("site insert did not round-trip".into()))
}

/// Transitions a site's lifecycle status. Enforces nothing itself — the
/// per-site scanning mutex in [`crate::orchestrator`] is what guarantees at
/// most one `Scanning` site at a time.
pub fn set_status(db: &Db, id: SiteId, status: SiteStatus) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE site SET status = ?2 WHERE id = ?1",
            params![id, site_status_str(status)],
        )?;
        Ok(())
    })
}

/// Records the robots.txt policy observed for a site.
pub fn set_robots_status(db: &Db, id: SiteId, status: RobotsStatus) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE site SET robots_status = ?2 WHERE id = ?1",
            params![id, robots_status_str(status)],
        )?;
        Ok(())
    })
}

/// Updates display metadata and `last_scanned_at` after a completed scan.
pub fn record_completion(
    db: &Db,
    id: SiteId,
    title: Option<&str>,
    description: Option<&str>,
    favicon_url: Option<&str>,
) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE site SET status = 'completed', last_scanned_at = ?2,
                title = coalesce(?3, title),
                description = coalesce(?4, description),
                favicon_url = coalesce(?5, favicon_url)
             WHERE id = ?1",
            params![id, now_millis(), title, description, favicon_url],
        )?;
        Ok(())
    })
}

/// Increments the popularity counter, e.g. on a search hit or resubmission.
pub fn bump_popularity(db: &Db, id: SiteId) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute("UPDATE site SET popularity = popularity + 1 WHERE id = ?1", params![id])?;
        Ok(())
    })
}

/// Full-text-ish ranked search over domain/title/description, ranked by
/// popularity (spec §4.8 `searchSites`).
pub fn search(db: &Db, query: &str, limit: usize) -> Result<Vec<Site>> {
    let pattern = format!("%{}%", query.to_lowercase());
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM site
             WHERE lower(domain) LIKE ?1 OR lower(coalesce(title, '')) LIKE ?1
                OR lower(coalesce(description, '')) LIKE ?1
             ORDER BY popularity DESC, first_seen_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], site_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    })
}
