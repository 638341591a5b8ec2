//! CSS tokenizer + observation extraction (C3, spec §4.3), and the
//! "0-byte CSS -> EmptyCss" testable property (spec §8).

use motif::css::observations::Observations;
use motif::css::{extract, parse_stylesheet};
use motif::model::{ScanMethod, TokenCategory};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn extracts_color_declarations_with_usage_weight() {
    let sheet = parse_stylesheet(".a, .b { color: #ff0000; } .c { color: #ff0000; }");
    let mut obs = Observations::default();
    extract::extract(&sheet, "deadbeef", &mut obs);

    let colors = obs.by_category.get(&TokenCategory::Color).cloned().unwrap_or_default();
    assert!(!colors.is_empty());
    let total_usage: f64 = colors.iter().map(|o| o.usage).sum();
    assert!(total_usage >= 3.0, "two selectors on one rule + one on another should sum to >= 3 usage");
}

#[test]
fn extracts_dimension_from_shorthand_padding() {
    let sheet = parse_stylesheet(".card { padding: 8px 16px; }");
    let mut obs = Observations::default();
    extract::extract(&sheet, "deadbeef", &mut obs);
    let dims = obs.by_category.get(&TokenCategory::Dimension).cloned().unwrap_or_default();
    assert!(dims.iter().any(|o| o.raw_value.contains("8px")));
    assert!(dims.iter().any(|o| o.raw_value.contains("16px")));
}

#[test]
fn media_query_rules_are_still_extracted() {
    let sheet = parse_stylesheet("@media (min-width: 768px) { .a { color: blue; } }");
    let mut obs = Observations::default();
    extract::extract(&sheet, "deadbeef", &mut obs);
    assert!(obs.by_category.get(&TokenCategory::Color).is_some());
}

#[tokio::test]
async fn page_with_no_stylesheets_or_inline_styles_yields_empty_css() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><head><title>Empty</title></head><body>hi</body></html>"))
        .mount(&server)
        .await;

    let url = reqwest::Url::parse(&server.uri()).unwrap();
    let result = motif::fetch::fetch(&url, ScanMethod::Static, "motif-bot/1.0").await;
    assert!(matches!(result, Err(motif::error::ScanError::EmptyCss)));
}
