//! The result type handed from the Fetcher (C1) to the rest of the pipeline.

use crate::model::SourceOrigin;

/// One CSS source discovered during a fetch, in cascade order.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub origin: SourceOrigin,
    pub body: String,
    /// Whether this source arrived via a cross-site redirect (spec §4.1).
    pub cross_site_redirect: bool,
}

/// Everything the Fetcher produces for one scan (spec §4.1 `fetch(url, mode)`).
#[derive(Debug, Clone, Default)]
pub struct FetchBundle {
    pub html: String,
    pub sources: Vec<FetchedSource>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon: Option<String>,
}

impl FetchBundle {
    /// Total CSS bytes across every source, for the memory-ceiling check
    /// (spec §4.7, §5).
    pub fn total_css_bytes(&self) -> usize {
        self.sources.iter().map(|s| s.body.len()).sum()
    }
}
