//! Orchestrator state machine (C7, spec §4.7): at most one `scanning` scan
//! per Site (spec §8), submit outcomes, and the Scan/Site progression to
//! completion.

use std::time::Duration;

use motif::config::{Config, Quality};
use motif::orchestrator::{Orchestrator, SubmitOutcome};
use motif::store::Db;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        css_ttl_days: 30,
        max_concurrent_scans: 4,
        max_concurrent_fetches: 4,
        scan_slot_fetch_fanout: 4,
        fetch_user_agent: "motif-test/1.0".into(),
        revalidate_after: Duration::from_secs(900),
        hard_expiry: Duration::from_secs(86_400),
        memory_ceiling_bytes: 256 * 1024 * 1024,
        http_bind: "127.0.0.1:0".into(),
    }
}

async fn mount_slow_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_string(
                    r#"<html><head><title>T</title></head><body><style>.a{color:#ff0000}</style></body></html>"#,
                ),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn a_second_submission_while_scanning_is_rejected_as_already_scanning() {
    let server = MockServer::start().await;
    mount_slow_site(&server).await;

    let db = Db::open("sqlite::memory:").unwrap();
    let orchestrator = Orchestrator::new(db, test_config());

    let url = server.uri();
    let first = orchestrator.submit(&url, Quality::Standard).await.unwrap();
    let first_scan_id = match first {
        SubmitOutcome::Started { scan_id } => scan_id,
        other => panic!("expected Started, got {other:?}"),
    };

    // The first scan is still fetching (300ms delay); a second submission
    // for the same site must be rejected rather than racing a second scan.
    let second = orchestrator.submit(&url, Quality::Standard).await.unwrap();
    match second {
        SubmitOutcome::AlreadyScanning { scan_id } => assert_eq!(scan_id, first_scan_id),
        other => panic!("expected AlreadyScanning, got {other:?}"),
    }
}

#[tokio::test]
async fn a_completed_scan_produces_a_token_set_visible_to_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>T</title></head><body><style>.a{color:#ff0000;padding:8px}</style></body></html>"#,
        ))
        .mount(&server)
        .await;

    let db = Db::open("sqlite::memory:").unwrap();
    let orchestrator = Orchestrator::new(db.clone(), test_config());

    let url = server.uri();
    let outcome = orchestrator.submit(&url, Quality::Standard).await.unwrap();
    let scan_id = match outcome {
        SubmitOutcome::Started { scan_id } => scan_id,
        other => panic!("expected Started, got {other:?}"),
    };

    let progress = orchestrator.progress().get(scan_id).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if progress.is_terminal() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("scan did not reach a terminal state in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let events = progress.events_since(0);
    let last = events.last().unwrap();
    assert_eq!(last.state, motif::model::ScanState::Completed, "scan should complete: {:?}", events);

    let domain = reqwest::Url::parse(&url).unwrap().host_str().unwrap().to_string();
    let detail = motif::query::get_site(&db, &domain, 10, 0).unwrap().expect("site present");
    assert!(detail.current_token_set.is_some());
}
