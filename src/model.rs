//! Data models for the scan pipeline and token store.
//!
//! This module defines the rows persisted by [`crate::store`]: the Site /
//! Scan / CssContent / CssSource / TokenSet / TokenVersion / TokenChange /
//! LayoutProfile / Submission / StatsCache family from the data model.
//!
//! # Examples
//!
//! ```
//! use motif::model::{Site, SiteStatus, RobotsStatus};
//!
//! let site = Site::new(1, "example.test".to_string());
//! assert_eq!(site.status, SiteStatus::Queued);
//! assert_eq!(site.robots_status, RobotsStatus::Unknown);
//! ```

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Primary key for [`Site`].
pub type SiteId = i64;
/// Primary key for [`Scan`].
pub type ScanId = i64;
/// Primary key for [`TokenSet`].
pub type TokenSetId = i64;
/// Primary key for [`TokenVersion`].
pub type TokenVersionId = i64;
/// Primary key for [`TokenChange`].
pub type TokenChangeId = i64;
/// Primary key for [`LayoutProfile`].
pub type LayoutProfileId = i64;
/// Primary key for [`Submission`].
pub type SubmissionId = i64;
/// Hex-encoded SHA-256 digest identifying a [`CssContent`] row.
pub type Sha256Hex = String;

/// Lifecycle status of a [`Site`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    /// Submitted but not yet picked up by the orchestrator.
    Queued,
    /// A scan is currently in `fetching..diffing`.
    Scanning,
    /// The most recent scan finished successfully.
    Completed,
    /// The most recent scan ended in a terminal failure.
    Failed,
}

/// Whether a site's `robots.txt` permits scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsStatus {
    /// robots.txt (or its absence) permits the fetch.
    Allowed,
    /// robots.txt disallows the relevant paths.
    Disallowed,
    /// robots.txt has not yet been checked.
    Unknown,
}

/// A domain tracked by the system. Owns its [`Scan`]s and [`TokenSet`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Primary key.
    pub id: SiteId,
    /// Unique registrable domain, e.g. `example.test`.
    pub domain: String,
    /// Current lifecycle status.
    pub status: SiteStatus,
    /// Current robots.txt policy.
    pub robots_status: RobotsStatus,
    /// Unix millis of first submission.
    pub first_seen_at: i64,
    /// Unix millis of the last scan completion, if any.
    pub last_scanned_at: Option<i64>,
    /// Monotonic popularity counter, incremented on each search hit/submission.
    pub popularity: i64,
    /// Page `<title>` captured on the latest successful scan.
    pub title: Option<String>,
    /// Meta description captured on the latest successful scan.
    pub description: Option<String>,
    /// Favicon URL captured on the latest successful scan.
    pub favicon_url: Option<String>,
}

impl Site {
    /// Builds a freshly submitted site record.
    pub fn new(id: SiteId, domain: String) -> Self {
        Site {
            id,
            domain,
            status: SiteStatus::Queued,
            robots_status: RobotsStatus::Unknown,
            first_seen_at: now_millis(),
            last_scanned_at: None,
            popularity: 0,
            title: None,
            description: None,
            favicon_url: None,
        }
    }
}

/// Fetch strategy used by a [`Scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// Fetch the document and linked/inline stylesheets only.
    Static,
    /// Additionally synthesize computed-style CSS via a bounded headless render.
    Computed,
}

/// Terminal or in-flight state of a single pipeline run, per the state
/// machine in spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Waiting on a scan slot.
    Queued,
    /// Fetcher (C1) running.
    Fetching,
    /// Parser/Extractor (C3) and Layout Profiler (C5) running.
    Parsing,
    /// Consensus Analyzer (C4) running.
    Analyzing,
    /// Version/Diff Engine (C6) running.
    Diffing,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
    /// Terminal cancellation.
    Canceled,
}

impl ScanState {
    /// Whether this state has no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanState::Completed | ScanState::Failed | ScanState::Canceled
        )
    }
}

/// A single run of the pipeline for a [`Site`]. Immutable once `finish`ed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    /// Primary key.
    pub id: ScanId,
    /// Owning site.
    pub site_id: SiteId,
    /// Fetch strategy used.
    pub method: ScanMethod,
    /// Current/terminal state.
    pub state: ScanState,
    /// Number of distinct CSS sources discovered.
    pub css_source_count: i64,
    /// SHA-256 over the concatenation of all source SHAs in cascade order.
    pub aggregate_content_hash: Option<String>,
    /// Unix millis the scan began fetching.
    pub started_at: i64,
    /// Unix millis the scan reached a terminal state.
    pub finished_at: Option<i64>,
    /// Classified error kind, present only when `state == Failed`.
    pub error_kind: Option<String>,
    /// Free-form error message for operators.
    pub error_message: Option<String>,
    /// JSON blob of phase timings and counters.
    pub metrics_json: Option<String>,
}

/// Deduplication root: one row per distinct normalized CSS body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CssContent {
    /// SHA-256 of the normalized body; primary key.
    pub sha256: Sha256Hex,
    /// zstd-compressed body, with a leading algorithm-id byte.
    pub compressed_body: Vec<u8>,
    /// Size of the body before compression.
    pub original_bytes: i64,
    /// Size of `compressed_body`.
    pub compressed_bytes: i64,
    /// Number of `CssSource` rows currently referencing this content.
    pub reference_count: i64,
    /// Days this content may sit unreferenced before `sweep` may delete it.
    pub ttl_days: u32,
    /// Unix millis this content was first stored.
    pub first_seen_at: i64,
    /// Unix millis this content was last read or (re)referenced.
    pub last_accessed_at: i64,
}

/// Where a [`CssSource`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SourceOrigin {
    /// An external stylesheet, with its resolved URL.
    External(String),
    /// Concatenated `<style>` blocks and `style=` attributes.
    Inline,
    /// Synthesized computed-style CSS (computed fetch mode only).
    Computed,
}

/// A per-scan reference to one [`CssContent`] row, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CssSource {
    /// Primary key.
    pub id: i64,
    /// Owning scan.
    pub scan_id: ScanId,
    /// Referenced content.
    pub sha256: Sha256Hex,
    /// Where this source came from.
    pub origin: SourceOrigin,
    /// Position in cascade order (0-based).
    pub cascade_index: i64,
    /// Whether this source arrived via a cross-site redirect.
    pub cross_site_redirect: bool,
}

/// Design-token category, used throughout parsing, consensus, and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenCategory {
    /// Colors.
    Color,
    /// Font family, size, weight, line-height, letter-spacing.
    Typography,
    /// Spacing and other lengths (margin/padding/gap).
    Dimension,
    /// Box/text shadows.
    Shadow,
    /// Border radii.
    Radius,
    /// Transition/animation duration + timing function.
    Motion,
}

/// Immutable snapshot of canonical tokens for a (Site, Scan) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Primary key.
    pub id: TokenSetId,
    /// Owning site.
    pub site_id: SiteId,
    /// Scan that produced this snapshot.
    pub scan_id: ScanId,
    /// Monotonically increasing per-site version number, starting at 1.
    pub version_number: i64,
    /// W3C DTCG-conformant token document, serialized.
    pub tokens_json: String,
    /// Weighted mean confidence over all tokens, in `[0, 1]`.
    pub consensus_score: f64,
    /// Whether this snapshot is visible to unauthenticated search.
    pub is_public: bool,
    /// Opaque identifier of the submitter, if any.
    pub created_by: Option<String>,
    /// Unix millis of creation.
    pub created_at: i64,
}

/// Per-category counts of changes between two [`TokenSet`]s.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Count of `added` [`TokenChange`] rows.
    pub added: u32,
    /// Count of `removed` [`TokenChange`] rows.
    pub removed: u32,
    /// Count of `modified` [`TokenChange`] rows.
    pub modified: u32,
}

/// Links a [`TokenSet`] to its predecessor and carries the diff summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenVersion {
    /// Primary key.
    pub id: TokenVersionId,
    /// The TokenSet this version describes.
    pub token_set_id: TokenSetId,
    /// Predecessor version, `None` for the first version of a site. This is
    /// a weak, read-side-only back-reference: write paths never follow it.
    pub previous_version_id: Option<TokenVersionId>,
    /// Counts of added/removed/modified tokens vs. the predecessor.
    pub diff_summary: DiffSummary,
    /// Full human-readable changelog document.
    pub changelog_json: String,
    /// Unix millis of creation.
    pub created_at: i64,
}

/// Kind of atomic change recorded by a [`TokenChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The token path did not exist in the predecessor.
    Added,
    /// The token path existed in the predecessor but not the new set.
    Removed,
    /// The token path exists in both but the value differs.
    Modified,
}

/// One atomic change within a [`TokenVersion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChange {
    /// Primary key.
    pub id: TokenChangeId,
    /// Owning version.
    pub token_version_id: TokenVersionId,
    /// Dotted token path, e.g. `color.primary.500`.
    pub token_path: String,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Category the path belongs to.
    pub category: TokenCategory,
    /// Serialized previous value, absent for `Added`.
    pub old_value: Option<String>,
    /// Serialized new value, absent for `Removed`.
    pub new_value: Option<String>,
}

/// Non-token structural profile for one [`Scan`]. Not diffed across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutProfile {
    /// Primary key.
    pub id: LayoutProfileId,
    /// Owning scan.
    pub scan_id: ScanId,
    /// Serialized [`crate::layout::LayoutDna`].
    pub profile_json: String,
    /// Unix millis of creation.
    pub created_at: i64,
}

/// Direction of a user's feedback on a token's confidence (spec §6 `POST /vote`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    /// The token looks right; raise confidence.
    Up,
    /// The token looks wrong; lower confidence.
    Down,
}

/// Primary key for [`TokenVote`].
pub type TokenVoteId = i64;

/// One recorded piece of human feedback against a token on a specific,
/// immutable [`TokenSet`]. Never mutates the TokenSet's `tokens_json`;
/// adjustments are read-side, folded in at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenVote {
    /// Primary key.
    pub id: TokenVoteId,
    /// TokenSet the vote applies to.
    pub token_set_id: TokenSetId,
    /// Dotted token path, e.g. `color.primary.500`.
    pub token_path: String,
    /// Direction of the vote.
    pub vote_type: VoteType,
    /// Optional free-form justification.
    pub note: Option<String>,
    /// Unix millis of creation.
    pub created_at: i64,
}

/// Priority for a queued scan submission, highest processed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Background/batch submission.
    Low,
    /// Default interactive submission.
    Normal,
    /// Operator- or paid-tier-requested submission.
    High,
}

/// A queued request to scan a URL, driving orchestrator input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Primary key.
    pub id: SubmissionId,
    /// Absolute URL requested.
    pub url: String,
    /// Requested priority.
    pub priority: Priority,
    /// Optional address to notify on completion.
    pub notify: Option<String>,
    /// Requested quality tier.
    pub quality: crate::config::Quality,
    /// Unix millis of submission.
    pub submitted_at: i64,
}

/// Singleton-row materialization of global counts (spec §4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsCache {
    /// Total number of distinct sites.
    pub total_sites: i64,
    /// Total number of scans ever run.
    pub total_scans: i64,
    /// Total number of TokenSet rows.
    pub total_token_sets: i64,
    /// Total number of individual tokens across the latest TokenSet per site.
    pub total_tokens: i64,
    /// Per-category token counts, keyed by [`TokenCategory`] kebab-case name.
    pub per_category_counts: std::collections::BTreeMap<String, i64>,
    /// Mean consensus score across the latest TokenSet per site.
    pub average_confidence: f64,
    /// Unix millis this row was last refreshed.
    pub updated_at: i64,
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_defaults_to_queued_and_unknown_robots() {
        let site = Site::new(1, "example.test".into());
        assert_eq!(site.status, SiteStatus::Queued);
        assert_eq!(site.robots_status, RobotsStatus::Unknown);
        assert!(site.last_scanned_at.is_none());
    }

    #[test]
    fn scan_state_terminality() {
        assert!(ScanState::Completed.is_terminal());
        assert!(ScanState::Failed.is_terminal());
        assert!(ScanState::Canceled.is_terminal());
        assert!(!ScanState::Fetching.is_terminal());
        assert!(!ScanState::Queued.is_terminal());
    }
}
