//! CssContent refcount invariant, `put` idempotence, and dedup across
//! repeated sources (spec §8: "100 identical stylesheets -> 1 CssContent row").

use motif::model::{ScanMethod, SourceOrigin};
use motif::store::{css, scan, site, Db};

fn open() -> Db {
    Db::open("sqlite::memory:").unwrap()
}

#[test]
fn put_is_idempotent_for_identical_bytes() {
    let db = open();
    let sha1 = css::put(&db, b".a { color: red }", 30).unwrap();
    let sha2 = css::put(&db, b".a { color: red }", 30).unwrap();
    assert_eq!(sha1, sha2);
}

#[test]
fn put_normalizes_line_endings_before_hashing() {
    let db = open();
    let sha_lf = css::put(&db, b".a { color: red }\n", 30).unwrap();
    let sha_crlf = css::put(&db, b".a { color: red }\r\n", 30).unwrap();
    assert_eq!(sha_lf, sha_crlf);
}

#[test]
fn one_hundred_identical_sources_produce_one_content_row_with_refcount_one_hundred() {
    let db = open();
    let s = site::get_or_create(&db, "example.test").unwrap();
    let scan_row = scan::create(&db, s.id, ScanMethod::Static).unwrap();

    let body = b".btn { padding: 8px }";
    let mut last_sha = None;
    for i in 0..100 {
        let origin = SourceOrigin::External(format!("https://example.test/style-{i}.css"));
        let sha = css::store_source(&db, scan_row.id, origin, i, false, body, 30).unwrap();
        last_sha = Some(sha);
    }

    let sha = last_sha.unwrap();
    assert_eq!(css::reference_count(&db, &sha).unwrap(), Some(100));

    let bytes = css::get(&db, &sha).unwrap();
    assert_eq!(bytes, body);
}

#[test]
fn release_scan_decrements_reference_count() {
    let db = open();
    let s = site::get_or_create(&db, "example.test").unwrap();
    let scan_row = scan::create(&db, s.id, ScanMethod::Static).unwrap();

    let sha = css::store_source(&db, scan_row.id, SourceOrigin::Inline, 0, false, b".x{}", 30).unwrap();
    assert_eq!(css::reference_count(&db, &sha).unwrap(), Some(1));

    let released = css::release_scan(&db, scan_row.id).unwrap();
    assert_eq!(released, 1);
    assert_eq!(css::reference_count(&db, &sha).unwrap(), Some(0));
}

#[test]
fn sweep_leaves_referenced_content_alone() {
    let db = open();
    let s = site::get_or_create(&db, "example.test").unwrap();
    let scan_row = scan::create(&db, s.id, ScanMethod::Static).unwrap();
    css::store_source(&db, scan_row.id, SourceOrigin::Inline, 0, false, b".y{}", 30).unwrap();

    let report = css::sweep(&db).unwrap();
    assert_eq!(report.deleted, 0);
}
