//! Token feedback (spec §6 `POST /vote`). A vote never touches the
//! immutable `TokenSet.tokens_json` — it's a side record folded into
//! confidence only when a caller reads it back.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{now_millis, TokenSetId, TokenVote, TokenVoteId, VoteType};
use crate::store::Db;

fn vote_type_str(v: VoteType) -> &'static str {
    match v {
        VoteType::Up => "up",
        VoteType::Down => "down",
    }
}

fn parse_vote_type(s: &str) -> VoteType {
    match s {
        "down" => VoteType::Down,
        _ => VoteType::Up,
    }
}

fn vote_from_row(row: &Row) -> rusqlite::Result<TokenVote> {
    Ok(TokenVote {
        id: row.get("id")?,
        token_set_id: row.get("token_set_id")?,
        token_path: row.get("token_path")?,
        vote_type: parse_vote_type(&row.get::<_, String>("vote_type")?),
        note: row.get("note")?,
        created_at: row.get("created_at")?,
    })
}

/// Records one vote. Does not validate that `token_path` exists in the
/// TokenSet's document; callers (the `query` module) check that first so
/// they can return a clean `BadRequest` rather than a dangling FK error.
pub fn record(
    db: &Db,
    token_set_id: TokenSetId,
    token_path: &str,
    vote_type: VoteType,
    note: Option<&str>,
) -> Result<TokenVote> {
    let created_at = now_millis();
    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO token_vote (token_set_id, token_path, vote_type, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![token_set_id, token_path, vote_type_str(vote_type), note, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    })?;
    get(db, id)?.ok_or_else(|| crate::error::ScanError::Internal("vote insert did not round-trip".into()))
}

/// Fetches a vote by primary key.
pub fn get(db: &Db, id: TokenVoteId) -> Result<Option<TokenVote>> {
    db.with_conn(|conn| {
        conn.query_row("SELECT * FROM token_vote WHERE id = ?1", params![id], vote_from_row)
            .optional()
            .map_err(Into::into)
    })
}

/// Net `up - down` vote count for one token path on one TokenSet, used to
/// nudge the displayed confidence without rewriting the persisted document.
pub fn net_adjustment(db: &Db, token_set_id: TokenSetId, token_path: &str) -> Result<i64> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT
                sum(CASE WHEN vote_type = 'up' THEN 1 ELSE 0 END) -
                sum(CASE WHEN vote_type = 'down' THEN 1 ELSE 0 END)
             FROM token_vote WHERE token_set_id = ?1 AND token_path = ?2",
            params![token_set_id, token_path],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map(|v| v.unwrap_or(0))
        .map_err(Into::into)
    })
}
