//! Version / Diff Engine (C6, spec §4.6): per-category equality rules,
//! gap-free `version_number`, and the no-op-rescan-yields-empty-diff
//! property (spec §8, DESIGN.md Open Question #3).

use motif::consensus::tokens::TokenDocument;
use motif::model::{ChangeType, ScanMethod};
use motif::store::tokens::ChangeInput;
use motif::store::{scan, site, tokens, Db};
use motif::version;

fn open() -> Db {
    Db::open("sqlite::memory:").unwrap()
}

fn doc_with_color(hex: &str) -> TokenDocument {
    let json = format!(
        r#"{{"color":{{"primary":{{"$value":"{hex}","$type":"color","$extensions":{{"usage":10,"confidence":0.9}}}}}}}}"#
    );
    serde_json::from_str(&json).unwrap()
}

#[test]
fn first_scan_diffs_against_nothing_and_everything_is_added() {
    let doc = doc_with_color("#ff0000");
    let diff = version::diff(None, &doc).unwrap();
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].change_type, ChangeType::Added);
}

#[test]
fn imperceptible_color_change_is_not_a_modification() {
    let old = doc_with_color("#635bff");
    let new = doc_with_color("#635bfe"); // within ΔE threshold
    let diff = version::diff(Some(&old), &new).unwrap();
    assert!(diff.changes.is_empty(), "near-identical colors should not register as a change");
}

#[test]
fn perceptible_color_change_is_a_modification() {
    let old = doc_with_color("#000000");
    let new = doc_with_color("#ffffff");
    let diff = version::diff(Some(&old), &new).unwrap();
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].change_type, ChangeType::Modified);
}

#[test]
fn version_numbers_are_gap_free_per_site_across_writes() {
    let db = open();
    let s = site::get_or_create(&db, "example.test").unwrap();

    for i in 1..=3 {
        let scan_row = scan::create(&db, s.id, ScanMethod::Static).unwrap();
        let version_number = tokens::current_version_number(&db, s.id).unwrap() + 1;
        assert_eq!(version_number, i);
        let doc = doc_with_color("#112233");
        tokens::write_version(
            &db,
            s.id,
            scan_row.id,
            version_number,
            &serde_json::to_string(&doc).unwrap(),
            doc.consensus_score(),
            "[]",
            &[],
        )
        .unwrap();
    }

    let history = tokens::history_for_site(&db, s.id).unwrap();
    let mut numbers: Vec<i64> = history.iter().map(|ts| ts.version_number).collect();
    numbers.sort();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn no_op_rescan_still_writes_a_new_version_with_an_empty_diff() {
    let db = open();
    let s = site::get_or_create(&db, "example.test").unwrap();
    let doc = doc_with_color("#abcdef");

    let scan1 = scan::create(&db, s.id, ScanMethod::Static).unwrap();
    tokens::write_version(
        &db,
        s.id,
        scan1.id,
        1,
        &serde_json::to_string(&doc).unwrap(),
        doc.consensus_score(),
        "[]",
        &[ChangeInput {
            token_path: "color.primary".into(),
            change_type: ChangeType::Added,
            category: motif::model::TokenCategory::Color,
            old_value: None,
            new_value: Some("#abcdef".into()),
        }],
    )
    .unwrap();

    let scan2 = scan::create(&db, s.id, ScanMethod::Static).unwrap();
    let diff = version::diff(Some(&doc), &doc).unwrap();
    assert!(diff.changes.is_empty());

    let (token_set, token_version) = tokens::write_version(
        &db,
        s.id,
        scan2.id,
        2,
        &serde_json::to_string(&doc).unwrap(),
        doc.consensus_score(),
        &diff.changelog_json,
        &diff.changes,
    )
    .unwrap();

    assert_eq!(token_set.version_number, 2);
    assert_eq!(token_version.diff_summary.added, 0);
    assert_eq!(token_version.diff_summary.removed, 0);
    assert_eq!(token_version.diff_summary.modified, 0);
}
