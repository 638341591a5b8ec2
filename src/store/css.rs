//! Content-addressed CSS storage: put/get/release/sweep (spec §4.2).

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{now_millis, Sha256Hex, SourceOrigin};
use crate::store::Db;

/// Leading byte identifying the compression algorithm used for a stored
/// body, so the format can evolve without a migration (spec §6).
const ALGO_ZSTD: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Strips a UTF-8 BOM and canonicalizes line endings to `\n`.
fn normalize(bytes: &[u8]) -> Vec<u8> {
    let without_bom = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8_lossy(without_bom);
    text.replace("\r\n", "\n").replace('\r', "\n").into_bytes()
}

fn sha256_hex(bytes: &[u8]) -> Sha256Hex {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![ALGO_ZSTD];
    out.extend(zstd::bulk::compress(bytes, ZSTD_LEVEL).map_err(std::io::Error::from)?);
    Ok(out)
}

fn decompress(stored: &[u8]) -> Result<Vec<u8>> {
    let (&algo, body) = stored
        .split_first()
        .ok_or_else(|| crate::error::ScanError::Internal("empty css_content body".into()))?;
    match algo {
        ALGO_ZSTD => Ok(zstd::bulk::decompress(body, 64 * 1024 * 1024).map_err(std::io::Error::from)?),
        other => Err(crate::error::ScanError::Internal(format!(
            "unknown css_content compression algorithm id {other}"
        ))),
    }
}

/// Writes `bytes` if no row exists for its normalized SHA-256, and returns
/// the digest. Idempotent: identical bytes always return the same SHA and
/// never create a second row (spec §8).
///
/// This primitive does not itself change `reference_count` — callers use
/// [`store_source`] to atomically register a referencing `CssSource`.
pub fn put(db: &Db, bytes: &[u8], ttl_days: u32) -> Result<Sha256Hex> {
    let normalized = normalize(bytes);
    let sha = sha256_hex(&normalized);
    let now = now_millis();

    db.with_conn(|conn| {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM css_content WHERE sha256 = ?1",
                params![sha],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            let compressed = compress(&normalized)?;
            conn.execute(
                "INSERT INTO css_content
                    (sha256, compressed_body, original_bytes, compressed_bytes,
                     reference_count, ttl_days, first_seen_at, last_accessed_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)
                 ON CONFLICT(sha256) DO NOTHING",
                params![
                    sha,
                    compressed,
                    normalized.len() as i64,
                    compressed.len() as i64,
                    ttl_days as i64,
                    now,
                ],
            )?;
        } else {
            conn.execute(
                "UPDATE css_content SET last_accessed_at = ?2 WHERE sha256 = ?1",
                params![sha, now],
            )?;
        }
        Ok(())
    })?;

    Ok(sha)
}

/// Reads and decompresses the body for `sha`. Callers must not hold the
/// result beyond a single analyzer pass (spec §4.2).
pub fn get(db: &Db, sha: &Sha256Hex) -> Result<Vec<u8>> {
    let compressed: Vec<u8> = db.with_conn(|conn| {
        conn.query_row(
            "SELECT compressed_body FROM css_content WHERE sha256 = ?1",
            params![sha],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
        .and_then(|opt: Option<Vec<u8>>| {
            opt.ok_or_else(|| crate::error::ScanError::Internal(format!("css_content {sha} missing")))
        })
    })?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE css_content SET last_accessed_at = ?2 WHERE sha256 = ?1",
            params![sha, now_millis()],
        )?;
        Ok(())
    })?;
    decompress(&compressed)
}

fn origin_columns(origin: &SourceOrigin) -> (&'static str, Option<String>) {
    match origin {
        SourceOrigin::External(url) => ("external", Some(url.clone())),
        SourceOrigin::Inline => ("inline", None),
        SourceOrigin::Computed => ("computed", None),
    }
}

/// Stores `bytes` (via [`put`]) and atomically registers a `CssSource` row
/// for `scan_id`, incrementing `css_content.reference_count` by one. This
/// is the only path that should create `CssSource` rows, so the invariant
/// `reference_count == count(CssSource where sha = this.sha)` always holds.
pub fn store_source(
    db: &Db,
    scan_id: i64,
    origin: SourceOrigin,
    cascade_index: i64,
    cross_site_redirect: bool,
    bytes: &[u8],
    ttl_days: u32,
) -> Result<Sha256Hex> {
    let sha = put(db, bytes, ttl_days)?;
    let (kind, value) = origin_columns(&origin);

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO css_source
                (scan_id, sha256, origin_kind, origin_value, cascade_index, cross_site_redirect)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![scan_id, sha, kind, value, cascade_index, cross_site_redirect as i64],
        )?;
        tx.execute(
            "UPDATE css_content SET reference_count = reference_count + 1, last_accessed_at = ?2
             WHERE sha256 = ?1",
            params![sha, now_millis()],
        )?;
        tx.commit()?;
        Ok(())
    })?;

    debug!(scan_id, sha256 = %sha, "registered css source");
    Ok(sha)
}

/// Decrements the reference count for every `CssSource` owned by `scan_id`.
/// Called when a scan (and its `CssSource` rows) is deleted; never deletes
/// `CssContent` bodies eagerly — that is [`sweep`]'s job.
pub fn release_scan(db: &Db, scan_id: i64) -> Result<u64> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let shas: Vec<String> = {
            let mut stmt = tx.prepare("SELECT sha256 FROM css_source WHERE scan_id = ?1")?;
            let rows = stmt.query_map(params![scan_id], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for sha in &shas {
            tx.execute(
                "UPDATE css_content SET reference_count = max(0, reference_count - 1)
                 WHERE sha256 = ?1",
                params![sha],
            )?;
        }
        tx.execute("DELETE FROM css_source WHERE scan_id = ?1", params![scan_id])?;
        tx.commit()?;
        Ok(shas.len() as u64)
    })
}

/// Report returned by [`sweep`].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SweepReport {
    /// Number of `CssContent` rows deleted.
    pub deleted: u64,
    /// Bytes reclaimed (compressed size of deleted rows).
    pub reclaimed_bytes: u64,
}

/// Deletes `CssContent` bodies with `reference_count == 0` whose
/// `last_accessed_at` is older than their own `ttl_days`. Safe to run
/// concurrently with [`put`]/[`get`]: a `put` racing a sweep simply
/// re-inserts the row, since both operations go through the same
/// transactional connection and `put` checks existence immediately before
/// inserting.
pub fn sweep(db: &Db) -> Result<SweepReport> {
    let now = now_millis();
    const MS_PER_DAY: i64 = 86_400_000;

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let victims: Vec<(String, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT sha256, compressed_bytes FROM css_content
                 WHERE reference_count = 0 AND (?1 - last_accessed_at) > (ttl_days * ?2)",
            )?;
            let rows = stmt.query_map(params![now, MS_PER_DAY], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut reclaimed = 0u64;
        for (sha, size) in &victims {
            let changed = tx.execute(
                "DELETE FROM css_content WHERE sha256 = ?1 AND reference_count = 0",
                params![sha],
            )?;
            if changed > 0 {
                reclaimed += *size as u64;
            }
        }
        tx.commit()?;

        let report = SweepReport {
            deleted: victims.len() as u64,
            reclaimed_bytes: reclaimed,
        };
        info!(deleted = report.deleted, reclaimed_bytes = report.reclaimed_bytes, "css sweep complete");
        Ok(report)
    })
}

/// Current `reference_count` for `sha`, or `None` if the row is absent.
pub fn reference_count(db: &Db, sha: &Sha256Hex) -> Result<Option<i64>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT reference_count FROM css_content WHERE sha256 = ?1",
            params![sha],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    })
}
