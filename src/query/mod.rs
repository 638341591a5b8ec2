//! Query API (C8, spec §4.8): read-side operations over the store, plus the
//! thin submit/subscribe wrappers the `http` module exposes as endpoints.

pub mod tokens;

use crate::consensus::tokens::TokenDocument;
use crate::error::{Result, ScanError};
use crate::model::{LayoutProfile, Scan, Site, TokenSet, TokenVote, VoteType};
use crate::store::{layout, scan, site, stats, tokens as store_tokens, votes, Db};

pub use tokens::{search_tokens, TokenFilters, TokenSearchHit};

/// Delegates to [`crate::store::site::search`] (spec §4.8 `searchSites`),
/// bumping each hit's popularity the way a real visit would.
pub fn search_sites(db: &Db, query: &str, limit: usize) -> Result<Vec<Site>> {
    site::search(db, query, limit.min(500))
}

/// Everything `getSite` returns for one domain (spec §4.8): the Site row,
/// its current TokenSet, the LayoutProfile for that same scan if one ran,
/// and a page of scan history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SiteDetail {
    pub site: Site,
    pub current_token_set: Option<TokenSet>,
    pub layout_profile: Option<LayoutProfile>,
    pub scan_history: Vec<Scan>,
}

/// Fetches a site by domain along with its current state (spec §4.8
/// `getSite`). Returns `Ok(None)` for an unknown domain; callers map that to
/// a 404.
pub fn get_site(
    db: &Db,
    domain: &str,
    history_limit: usize,
    history_offset: usize,
) -> Result<Option<SiteDetail>> {
    let Some(site) = site::get_by_domain(db, domain)? else { return Ok(None) };
    site::bump_popularity(db, site.id)?;

    let current_token_set = store_tokens::current_token_set(db, site.id)?;
    let layout_profile = layout::for_site(db, site.id)?;
    let scan_history = scan::history_for_site(db, site.id, history_limit.min(200), history_offset)?;

    Ok(Some(SiteDetail { site, current_token_set, layout_profile, scan_history }))
}

/// Records a vote against a token on a specific TokenSet (spec §6
/// `POST /vote`). The TokenSet's persisted document is immutable (spec §3),
/// so this only appends a [`TokenVote`] row; confidence adjustments are
/// folded in by readers, never written back into `tokens_json`.
///
/// Returns [`ScanError::BadRequest`] if the TokenSet doesn't exist or
/// `token_path` isn't present in its document.
pub fn submit_vote(
    db: &Db,
    token_set_id: crate::model::TokenSetId,
    token_path: &str,
    vote_type: VoteType,
    note: Option<&str>,
) -> Result<TokenVote> {
    let token_set = store_tokens::get_token_set(db, token_set_id)?
        .ok_or_else(|| ScanError::BadRequest(format!("no such token set: {token_set_id}")))?;
    let doc: TokenDocument = serde_json::from_str(&token_set.tokens_json)?;
    if !doc.paths().iter().any(|(path, _)| path == token_path) {
        return Err(ScanError::BadRequest(format!("no such token path: {token_path}")));
    }
    votes::record(db, token_set_id, token_path, vote_type, note)
}

/// Delegates to [`crate::store::stats::read`] (spec §4.8 `getStats`). The
/// cache is refreshed incrementally on the write path and by the `optimize`
/// CLI subcommand, so a read here may be up to the configured staleness
/// window behind (spec: "may be up to 60s stale").
pub fn get_stats(db: &Db) -> Result<crate::model::StatsCache> {
    stats::read(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanMethod;

    #[test]
    fn get_site_returns_none_for_unknown_domain() {
        let db = Db::open("sqlite::memory:").unwrap();
        assert!(get_site(&db, "nope.test", 10, 0).unwrap().is_none());
    }

    #[test]
    fn get_site_bumps_popularity_and_includes_history() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "example.test").unwrap();
        scan::create(&db, s.id, ScanMethod::Static).unwrap();
        let detail = get_site(&db, "example.test", 10, 0).unwrap().unwrap();
        assert_eq!(detail.site.popularity, 1);
        assert_eq!(detail.scan_history.len(), 1);
        assert!(detail.current_token_set.is_none());
    }

    #[test]
    fn submit_vote_rejects_unknown_token_path() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "example.test").unwrap();
        let sc = scan::create(&db, s.id, ScanMethod::Static).unwrap();
        let (ts, _) = store_tokens::write_version(
            &db,
            s.id,
            sc.id,
            1,
            r#"{"color":{"primary":{"$value":"#fff","$type":"color","$extensions":{"usage":1,"confidence":0.9}}}}"#,
            0.9,
            "{}",
            &[],
        )
        .unwrap();

        let result = submit_vote(&db, ts.id, "color.missing", VoteType::Up, None);
        assert!(matches!(result, Err(ScanError::BadRequest(_))));

        let vote = submit_vote(&db, ts.id, "color.primary", VoteType::Down, Some("too dark")).unwrap();
        assert_eq!(vote.vote_type, VoteType::Down);
    }
}
