//! Query API (C8, spec §4.8) contract: search, site detail, stats, and
//! `POST /vote` feedback (spec §6) on top of an immutable TokenSet.

use motif::error::ScanError;
use motif::model::{ScanMethod, TokenCategory, VoteType};
use motif::query::{self, TokenFilters};
use motif::store::{scan, site, tokens, Db};

fn open() -> Db {
    Db::open("sqlite::memory:").unwrap()
}

fn seed_site_with_tokens(db: &Db, domain: &str, hex: &str) -> (i64, i64) {
    let s = site::get_or_create(db, domain).unwrap();
    let scan_row = scan::create(db, s.id, ScanMethod::Static).unwrap();
    let json = format!(
        r#"{{"color":{{"primary":{{"$value":"{hex}","$type":"color","$extensions":{{"usage":12,"confidence":0.87}}}}}}}}"#
    );
    let (token_set, _) =
        tokens::write_version(db, s.id, scan_row.id, 1, &json, 0.87, "[]", &[]).unwrap();
    (s.id, token_set.id)
}

#[test]
fn search_sites_matches_substring_and_bumps_popularity() {
    let db = open();
    site::get_or_create(&db, "acme-widgets.test").unwrap();
    site::get_or_create(&db, "unrelated.test").unwrap();

    let hits = query::search_sites(&db, "widgets", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].domain, "acme-widgets.test");
}

#[test]
fn search_tokens_filters_by_category_and_confidence() {
    let db = open();
    seed_site_with_tokens(&db, "a.test", "#ff0000");

    let filters = TokenFilters { category: Some(TokenCategory::Color), min_confidence: Some(0.5), regex: false };
    let hits = query::search_tokens(&db, "primary", &filters, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].site, "a.test");

    let filters_too_strict =
        TokenFilters { category: Some(TokenCategory::Color), min_confidence: Some(0.99), regex: false };
    let hits = query::search_tokens(&db, "primary", &filters_too_strict, 10).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn search_tokens_rejects_invalid_regex_as_bad_request() {
    let db = open();
    let filters = TokenFilters { regex: true, ..Default::default() };
    let result = query::search_tokens(&db, "(unclosed", &filters, 10);
    assert!(matches!(result, Err(ScanError::BadRequest(_))));
}

#[test]
fn get_site_returns_current_token_set_and_history() {
    let db = open();
    seed_site_with_tokens(&db, "b.test", "#00ff00");
    let detail = query::get_site(&db, "b.test", 10, 0).unwrap().unwrap();
    assert!(detail.current_token_set.is_some());
    assert_eq!(detail.scan_history.len(), 1);
}

#[test]
fn get_stats_reflects_recomputed_totals() {
    let db = open();
    seed_site_with_tokens(&db, "c.test", "#0000ff");
    let stats = motif::store::stats::recompute(&db).unwrap();
    let read_back = query::get_stats(&db).unwrap();
    assert_eq!(read_back.total_sites, stats.total_sites);
    assert_eq!(read_back.total_token_sets, 1);
}

#[test]
fn vote_never_mutates_the_persisted_token_set_document() {
    let db = open();
    let (_site_id, token_set_id) = seed_site_with_tokens(&db, "d.test", "#123456");

    let before = motif::store::tokens::get_token_set(&db, token_set_id).unwrap().unwrap();
    query::submit_vote(&db, token_set_id, "color.primary", VoteType::Up, Some("looks right")).unwrap();
    query::submit_vote(&db, token_set_id, "color.primary", VoteType::Down, None).unwrap();
    let after = motif::store::tokens::get_token_set(&db, token_set_id).unwrap().unwrap();

    assert_eq!(before.tokens_json, after.tokens_json, "TokenSet document must stay immutable");
    let net = motif::store::votes::net_adjustment(&db, token_set_id, "color.primary").unwrap();
    assert_eq!(net, 0);
}

#[test]
fn vote_on_unknown_token_path_is_a_bad_request() {
    let db = open();
    let (_site_id, token_set_id) = seed_site_with_tokens(&db, "e.test", "#654321");
    let result = query::submit_vote(&db, token_set_id, "color.nonexistent", VoteType::Up, None);
    assert!(matches!(result, Err(ScanError::BadRequest(_))));
}
