//! Bounded HTTP fetch: size caps, per-fetch timeout, redirect tracking, and
//! `@import` chain resolution (spec §4.1). Transport is `reqwest` (rustls).

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, Url};

use crate::css::syntax::parse_stylesheet;
use crate::error::{Phase, Result, ScanError};
use crate::fetch::bundle::{FetchBundle, FetchedSource};
use crate::fetch::html;
use crate::fetch::robots::RobotsPolicy;
use crate::model::{ScanMethod, SourceOrigin};

/// Per-URL size caps (spec §4.1).
const HTML_MAX_BYTES: usize = 5 * 1024 * 1024;
const STYLESHEET_MAX_BYTES: usize = 8 * 1024 * 1024;
const TOTAL_MAX_BYTES: usize = 40 * 1024 * 1024;
/// `@import` chains are resolved to at most this depth (spec §4.1).
const IMPORT_MAX_DEPTH: u32 = 4;
/// Redirects per request (spec §4.1).
const MAX_REDIRECTS: usize = 5;
/// Per-fetch wall clock (spec §4.1).
const PER_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(PER_FETCH_TIMEOUT)
        .build()
        .map_err(ScanError::from)
}

/// Fetches `url`, enforcing `cap`, and reports whether the final URL landed
/// on a different registrable host than the one requested.
async fn fetch_capped(client: &Client, url: &Url, cap: usize) -> Result<(String, bool)> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ScanError::Unreachable(e.to_string()))?;

    let requested_host = url.host_str().map(str::to_string);
    let final_host = response.url().host_str().map(str::to_string);
    let cross_site = requested_host != final_host;

    if let Some(len) = response.content_length() {
        if len as usize > cap {
            return Err(ScanError::ResourceExceeded(format!("{url} exceeds {cap} byte cap")));
        }
    }

    let response = response.error_for_status().map_err(|e| ScanError::Unreachable(e.to_string()))?;
    let bytes = response.bytes().await.map_err(|e| ScanError::Unreachable(e.to_string()))?;
    if bytes.len() > cap {
        return Err(ScanError::ResourceExceeded(format!("{url} exceeds {cap} byte cap")));
    }

    Ok((String::from_utf8_lossy(&bytes).into_owned(), cross_site))
}

/// Fetches `robots.txt` for `url`'s origin. Any fetch failure is treated as
/// `unknown`, which is allowed (spec §4.1).
pub async fn fetch_robots_policy(client: &Client, url: &Url, user_agent: &str) -> RobotsPolicy {
    let Ok(robots_url) = url.join("/robots.txt") else { return RobotsPolicy::default() };
    match fetch_capped(client, &robots_url, HTML_MAX_BYTES).await {
        Ok((body, _)) => RobotsPolicy::parse(&body, user_agent),
        Err(_) => RobotsPolicy::default(),
    }
}

/// Recursively resolves `@import` targets in `css`, concatenating imported
/// bodies ahead of the importing sheet's own rules, up to
/// [`IMPORT_MAX_DEPTH`] and guarding against cycles.
async fn resolve_imports(
    client: &Client,
    base: &Url,
    css: String,
    depth: u32,
    visited: &mut HashSet<Url>,
    budget: &mut usize,
) -> String {
    if depth >= IMPORT_MAX_DEPTH {
        return css;
    }
    let sheet = parse_stylesheet(&css);
    if sheet.imports.is_empty() {
        return css;
    }

    let mut prefix = String::new();
    for import in &sheet.imports {
        let Ok(import_url) = base.join(import) else { continue };
        if !visited.insert(import_url.clone()) {
            continue; // cycle
        }
        if *budget == 0 {
            continue;
        }
        if let Ok((body, _)) = fetch_capped(client, &import_url, STYLESHEET_MAX_BYTES.min(*budget)).await {
            *budget = budget.saturating_sub(body.len());
            let expanded = Box::pin(resolve_imports(client, &import_url, body, depth + 1, visited, budget)).await;
            prefix.push_str(&expanded);
            prefix.push('\n');
        }
    }
    prefix.push_str(&css);
    prefix
}

/// Runs the full fetch for one scan: robots check, HTML document, every
/// discovered stylesheet (with `@import` resolution), inline styles, and
/// (in `computed` mode) a synthesized computed-style source.
pub async fn fetch(url: &Url, method: ScanMethod, user_agent: &str) -> Result<FetchBundle> {
    let client = build_client(user_agent)?;

    let policy = fetch_robots_policy(&client, url, user_agent).await;
    if !policy.is_allowed(url.path()) {
        return Err(ScanError::RobotsDenied);
    }

    let (html_body, _) = fetch_capped(&client, url, HTML_MAX_BYTES).await?;

    let discovered = html::discover(&html_body);
    let mut budget = TOTAL_MAX_BYTES.saturating_sub(html_body.len());
    let mut sources = Vec::new();

    for href in &discovered.stylesheet_urls {
        let Ok(sheet_url) = url.join(href) else { continue };
        if budget == 0 {
            break;
        }
        match fetch_capped(&client, &sheet_url, STYLESHEET_MAX_BYTES.min(budget)).await {
            Ok((body, cross_site)) => {
                budget = budget.saturating_sub(body.len());
                let mut visited = HashSet::from([sheet_url.clone()]);
                let expanded =
                    resolve_imports(&client, &sheet_url, body, 0, &mut visited, &mut budget).await;
                sources.push(FetchedSource {
                    origin: SourceOrigin::External(sheet_url.to_string()),
                    body: expanded,
                    cross_site_redirect: cross_site,
                });
            }
            Err(_) => continue, // per-source failures are non-fatal (spec §4.1)
        }
    }

    let mut inline = String::new();
    for block in &discovered.style_blocks {
        inline.push_str(block);
        inline.push('\n');
    }
    for attr in &discovered.inline_style_attrs {
        inline.push_str(&format!("[data-motif-inline] {{ {attr} }}\n"));
    }
    if !inline.is_empty() {
        sources.push(FetchedSource { origin: SourceOrigin::Inline, body: inline, cross_site_redirect: false });
    }

    if method == ScanMethod::Computed {
        let computed = html::synthesize_computed_css(&discovered.inline_style_attrs);
        if !computed.is_empty() {
            sources.push(FetchedSource { origin: SourceOrigin::Computed, body: computed, cross_site_redirect: false });
        }
    }

    if sources.iter().all(|s| s.body.trim().is_empty()) {
        return Err(ScanError::EmptyCss);
    }

    Ok(FetchBundle {
        html: html_body,
        sources,
        title: discovered.title,
        description: discovered.description,
        favicon: discovered.favicon,
    })
}

/// Maps a timed-out fetch phase to the spec's `Timeout` error.
pub fn timeout_error() -> ScanError {
    ScanError::Timeout { phase: Phase::Fetching }
}
