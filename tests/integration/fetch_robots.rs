//! Fetcher robots.txt enforcement (C1, spec §4.1, §8: "robots denied -> no fetch").

use motif::error::ScanError;
use motif::fetch::robots::RobotsPolicy;
use motif::model::ScanMethod;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn disallowed_path_is_rejected_before_any_stylesheet_is_fetched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;

    // No mock for "/" or any stylesheet: if the fetcher reached past the
    // robots check, this test would fail with a 404 (mismatch) rather than
    // a clean RobotsDenied, making an accidental fetch observable.
    let url = reqwest::Url::parse(&server.uri()).unwrap();
    let result = motif::fetch::fetch(&url, ScanMethod::Static, "motif-bot/1.0").await;
    assert!(matches!(result, Err(ScanError::RobotsDenied)));
}

#[tokio::test]
async fn missing_robots_txt_allows_the_fetch_to_proceed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><style>.a{color:#000}</style></body></html>"#,
        ))
        .mount(&server)
        .await;

    let url = reqwest::Url::parse(&server.uri()).unwrap();
    let result = motif::fetch::fetch(&url, ScanMethod::Static, "motif-bot/1.0").await;
    assert!(result.is_ok());
}

#[test]
fn allowed_path_under_a_broad_disallow_still_permits_fetch() {
    let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /\nAllow: /public/\n", "motif-bot/1.0");
    assert!(policy.is_allowed("/public/page"));
    assert!(!policy.is_allowed("/private"));
}
