//! Orchestrator (spec §4.7): owns the submit → fetch → parse → analyze →
//! profile → diff state machine, the per-site and global concurrency caps,
//! and the progress channel each scan reports through.
//!
//! Every synchronous store/CPU call below runs inside [`tokio::task::spawn_blocking`],
//! per the contract documented on [`crate::store::Db`].

pub mod progress;
pub mod registry;
pub mod retry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::config::{Config, Quality, QualityPlan};
use crate::consensus::tokens::{ConsensusToken, TokenDocument};
use crate::css::{self, Observations, Stylesheet};
use crate::enrich::{self, Enricher};
#[cfg(not(feature = "ai_enrichment"))]
use crate::enrich::NoopEnricher;
use crate::error::{Phase, Result, ScanError};
use crate::fetch::{self, FetchBundle};
use crate::layout::{self, LayoutDna};
use crate::model::{
    now_millis, RobotsStatus, ScanId, ScanMethod, ScanState, Sha256Hex, SiteId, SiteStatus,
    TokenCategory, TokenSet, TokenSetId,
};
use crate::store::{css as store_css, layout as store_layout, scan, site, stats, tokens, Db};
use crate::version;

use progress::{ProgressHub, ScanProgress};
use registry::SiteLockRegistry;

const PARSE_TIMEOUT: Duration = Duration::from_secs(20);
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(10);
const DIFF_TIMEOUT: Duration = Duration::from_secs(5);
const OVERALL_STATIC_TIMEOUT: Duration = Duration::from_secs(120);
const OVERALL_COMPUTED_TIMEOUT: Duration = Duration::from_secs(180);

/// Cooperative cancellation flag for one scan, checked at phase boundaries.
#[derive(Clone, Default)]
struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(ScanError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of a [`Orchestrator::submit`] call.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// A fresh scan was created and scheduled.
    Started { scan_id: ScanId },
    /// A scan for this site is already in flight; no new scan was created.
    AlreadyScanning { scan_id: ScanId },
    /// Served from a recent completed scan without reprocessing (spec §4.7 revalidation window).
    Cached { scan_id: ScanId, token_set_id: TokenSetId },
}

/// Coordinates every in-flight scan against the shared [`Db`] and [`Config`].
pub struct Orchestrator {
    db: Db,
    config: Config,
    scan_semaphore: Arc<Semaphore>,
    fetch_semaphore: Arc<Semaphore>,
    site_locks: SiteLockRegistry,
    progress: ProgressHub,
    cancellations: Mutex<HashMap<ScanId, CancellationToken>>,
    enricher: Arc<dyn Enricher>,
}

/// Runs `f` on the blocking thread pool, per [`Db`]'s documented contract.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Internal("blocking task panicked".into())),
    }
}

/// Selects the enrichment backend: the feature-gated AI enricher when
/// `ai_enrichment` is compiled in, otherwise the no-op default (spec §9).
fn default_enricher() -> Arc<dyn Enricher> {
    #[cfg(feature = "ai_enrichment")]
    {
        Arc::new(crate::enrich::AiEnricher)
    }
    #[cfg(not(feature = "ai_enrichment"))]
    {
        Arc::new(NoopEnricher)
    }
}

fn error_kind_str(err: &ScanError) -> &'static str {
    match err {
        ScanError::BadRequest(_) => "bad_request",
        ScanError::RobotsDenied => "robots_denied",
        ScanError::Unreachable(_) => "unreachable",
        ScanError::Timeout { .. } => "timeout",
        ScanError::ResourceExceeded(_) => "resource_exceeded",
        ScanError::EmptyCss => "empty_css",
        ScanError::ParseFailure(_) => "parse_failure",
        ScanError::StorageConflict(_) => "storage_conflict",
        ScanError::Canceled => "canceled",
        ScanError::Internal(_) => "internal",
        ScanError::Io(_) => "io",
        ScanError::Storage(_) => "storage",
        ScanError::Json(_) => "json",
        ScanError::Http(_) => "http",
    }
}

/// Stores every source in `bundle`, parses each into a combined [`Stylesheet`],
/// and extracts raw observations. Returns the source SHAs in cascade order.
fn parse_sources(
    db: &Db,
    ttl_days: u32,
    scan_id: ScanId,
    bundle: &FetchBundle,
) -> Result<(Observations, Stylesheet, Vec<Sha256Hex>)> {
    let mut observations = Observations::default();
    let mut combined = Stylesheet::default();
    let mut shas = Vec::with_capacity(bundle.sources.len());

    for (idx, source) in bundle.sources.iter().enumerate() {
        let sha = store_css::store_source(
            db,
            scan_id,
            source.origin.clone(),
            idx as i64,
            source.cross_site_redirect,
            source.body.as_bytes(),
            ttl_days,
        )?;
        let sheet = css::parse_stylesheet(&source.body);
        css::extract::extract(&sheet, &sha, &mut observations);
        combined.rules.extend(sheet.rules);
        combined.imports.extend(sheet.imports);
        shas.push(sha);
    }

    observations.enforce_caps();
    Ok((observations, combined, shas))
}

fn analyze_blocking(observations: Observations) -> Result<(TokenDocument, Vec<ConsensusToken>)> {
    Ok(crate::consensus::analyze_with_tokens(&observations))
}

fn aggregate_content_hash(shas: &[Sha256Hex]) -> String {
    let mut hasher = Sha256::new();
    for sha in shas {
        hasher.update(sha.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Diffs `doc` against the site's current TokenSet and atomically writes the
/// new version, holding `site_lock` for the duration (spec §4.7, §5: scans
/// for one site may fetch/parse concurrently, but writes are serialized).
fn write_version_locked(
    db: &Db,
    site_lock: &parking_lot::Mutex<()>,
    site_id: SiteId,
    scan_id: ScanId,
    doc: &TokenDocument,
) -> Result<TokenSet> {
    let _guard = site_lock.lock();

    let previous = tokens::current_token_set(db, site_id)?;
    let previous_doc: Option<TokenDocument> = previous
        .as_ref()
        .map(|ts| serde_json::from_str(&ts.tokens_json))
        .transpose()?;
    let is_first_scan = previous_doc.is_none();
    let diff = version::diff(previous_doc.as_ref(), doc)?;
    let version_number = tokens::current_version_number(db, site_id)? + 1;
    let tokens_json = serde_json::to_string(doc)?;
    let consensus_score = doc.consensus_score();

    // Spec §4.6: a Site's first TokenVersion has `previous_version_id = null`
    // and no TokenChange rows, even though `version::diff(None, doc)` reports
    // every token as Added.
    let (changelog_json, changes): (&str, &[tokens::ChangeInput]) =
        if is_first_scan { ("[]", &[]) } else { (&diff.changelog_json, &diff.changes) };

    let (token_set, _token_version) = tokens::write_version(
        db,
        site_id,
        scan_id,
        version_number,
        &tokens_json,
        consensus_score,
        changelog_json,
        changes,
    )?;
    stats::record_scan_completion(db, doc)?;
    Ok(token_set)
}

impl Orchestrator {
    pub fn new(db: Db, config: Config) -> Arc<Self> {
        Arc::new(Orchestrator {
            scan_semaphore: Arc::new(Semaphore::new(config.max_concurrent_scans)),
            fetch_semaphore: Arc::new(Semaphore::new(config.max_concurrent_fetches)),
            db,
            config,
            site_locks: SiteLockRegistry::default(),
            progress: ProgressHub::default(),
            cancellations: Mutex::new(HashMap::new()),
            enricher: default_enricher(),
        })
    }

    /// The progress hub, exposed so `query`/`http` can subscribe to a scan's events.
    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Cooperatively cancels an in-flight scan. Returns `false` if the scan
    /// is not currently tracked (already finished, or unknown).
    pub fn cancel(&self, scan_id: ScanId) -> bool {
        match self.cancellations.lock().get(&scan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Submits a URL for scanning (spec §4.8 `submitScan`). Creates the Site
    /// if it doesn't exist, honors robots.txt and the revalidation window,
    /// and refuses a second submission while one is already in flight.
    pub async fn submit(self: &Arc<Self>, url: &str, quality: Quality) -> Result<SubmitOutcome> {
        let parsed = Url::parse(url).map_err(|e| ScanError::BadRequest(e.to_string()))?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| ScanError::BadRequest("url has no host".into()))?
            .to_string();

        let db = self.db.clone();
        let domain_for_lookup = domain.clone();
        let (site, is_new) = blocking(move || {
            match site::get_by_domain(&db, &domain_for_lookup)? {
                Some(s) => Ok((s, false)),
                None => Ok((site::get_or_create(&db, &domain_for_lookup)?, true)),
            }
        })
        .await?;

        if is_new {
            let db = self.db.clone();
            blocking(move || stats::bump_sites(&db)).await?;
        }

        if site.robots_status == RobotsStatus::Disallowed {
            return Err(ScanError::RobotsDenied);
        }

        if let Some(last_scanned_at) = site.last_scanned_at {
            let age_ms = (now_millis() - last_scanned_at).max(0) as u64;
            if age_ms < self.config.revalidate_after.as_millis() as u64 {
                let db = self.db.clone();
                let site_id = site.id;
                if let Some(ts) = blocking(move || tokens::current_token_set(&db, site_id)).await? {
                    return Ok(SubmitOutcome::Cached { scan_id: ts.scan_id, token_set_id: ts.id });
                }
            }
        }

        let db = self.db.clone();
        let site_id = site.id;
        if blocking(move || scan::has_active_scan(&db, site_id)).await? {
            let db = self.db.clone();
            let active = blocking(move || scan::latest_for_site(&db, site_id))
                .await?
                .ok_or_else(|| {
                    ScanError::Internal("has_active_scan true but no scan row found".into())
                })?;
            return Ok(SubmitOutcome::AlreadyScanning { scan_id: active.id });
        }

        let method = if QualityPlan::for_quality(quality).computed_fetch {
            ScanMethod::Computed
        } else {
            ScanMethod::Static
        };
        let db = self.db.clone();
        let scan_row = blocking(move || scan::create(&db, site_id, method)).await?;
        let db = self.db.clone();
        blocking(move || stats::bump_scans(&db)).await?;

        let progress = self.progress.create(scan_row.id);
        progress.push(ScanState::Queued, "queued", scan_row.id);
        self.cancellations.lock().insert(scan_row.id, CancellationToken::default());

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_scan(site_id, scan_row.id, parsed, quality).await;
        });

        Ok(SubmitOutcome::Started { scan_id: scan_row.id })
    }

    async fn run_scan(self: Arc<Self>, site_id: SiteId, scan_id: ScanId, url: Url, quality: Quality) {
        let Ok(_scan_permit) = Arc::clone(&self.scan_semaphore).acquire_owned().await else {
            return;
        };
        let Some(progress) = self.progress.get(scan_id) else { return };
        let cancel = self.cancellations.lock().get(&scan_id).cloned().unwrap_or_default();

        let plan = QualityPlan::for_quality(quality);
        let overall_timeout =
            if plan.computed_fetch { OVERALL_COMPUTED_TIMEOUT } else { OVERALL_STATIC_TIMEOUT };

        let result = tokio::time::timeout(
            overall_timeout,
            Arc::clone(&self).drive(site_id, scan_id, url, plan, progress.clone(), cancel.clone()),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.fail(scan_id, site_id, &progress, err).await,
            Err(_) => {
                self.fail(scan_id, site_id, &progress, ScanError::Timeout { phase: Phase::Diffing })
                    .await
            }
        }

        self.cancellations.lock().remove(&scan_id);
    }

    async fn fail(
        &self,
        scan_id: ScanId,
        site_id: SiteId,
        progress: &ScanProgress,
        err: ScanError,
    ) {
        let kind = error_kind_str(&err);
        let message = err.to_string();
        let canceled = matches!(err, ScanError::Canceled);

        let db = self.db.clone();
        let kind_owned = kind.to_string();
        let message_owned = message.clone();
        let _ = blocking(move || {
            if canceled {
                scan::finish_canceled(&db, scan_id)
            } else {
                scan::finish_failed(&db, scan_id, &kind_owned, &message_owned)
            }
        })
        .await;

        let db = self.db.clone();
        let new_status = if canceled { SiteStatus::Queued } else { SiteStatus::Failed };
        let _ = blocking(move || site::set_status(&db, site_id, new_status)).await;

        let state = if canceled { ScanState::Canceled } else { ScanState::Failed };
        progress.push(state, message, scan_id);
        tracing::warn!(scan_id, site_id, error_kind = kind, "scan failed");
    }

    async fn drive(
        self: Arc<Self>,
        site_id: SiteId,
        scan_id: ScanId,
        url: Url,
        plan: QualityPlan,
        progress: Arc<ScanProgress>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let db = self.db.clone();
        blocking(move || site::set_status(&db, site_id, SiteStatus::Scanning)).await?;
        let db = self.db.clone();
        blocking(move || scan::advance(&db, scan_id, ScanState::Fetching)).await?;
        progress.push(ScanState::Fetching, "fetching html and stylesheets", scan_id);
        cancel.check()?;

        let method = if plan.computed_fetch { ScanMethod::Computed } else { ScanMethod::Static };
        let user_agent = self.config.fetch_user_agent.clone();
        let fetch_permit = Arc::clone(&self.fetch_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ScanError::Internal("fetch semaphore closed".into()))?;
        let bundle = retry::with_retry(|| {
            let url = url.clone();
            let user_agent = user_agent.clone();
            async move { fetch::fetch(&url, method, &user_agent).await }
        })
        .await?;
        drop(fetch_permit);
        cancel.check()?;

        if bundle.total_css_bytes() > self.config.memory_ceiling_bytes {
            return Err(ScanError::ResourceExceeded(format!(
                "decompressed css {} bytes exceeds {} byte ceiling",
                bundle.total_css_bytes(),
                self.config.memory_ceiling_bytes
            )));
        }

        let db = self.db.clone();
        blocking(move || scan::advance(&db, scan_id, ScanState::Parsing)).await?;
        progress.push(ScanState::Parsing, "extracting tokens from css", scan_id);

        let db = self.db.clone();
        let ttl_days = self.config.css_ttl_days;
        let bundle_for_parse = bundle.clone();
        let (observations, combined_sheet, source_shas) = tokio::time::timeout(
            PARSE_TIMEOUT,
            blocking(move || parse_sources(&db, ttl_days, scan_id, &bundle_for_parse)),
        )
        .await
        .map_err(|_| ScanError::Timeout { phase: Phase::Parsing })??;
        cancel.check()?;

        let aggregate_hash = aggregate_content_hash(&source_shas);
        let db = self.db.clone();
        let source_count = source_shas.len() as i64;
        let hash_owned = aggregate_hash.clone();
        blocking(move || scan::record_sources(&db, scan_id, source_count, &hash_owned)).await?;

        let db = self.db.clone();
        blocking(move || scan::advance(&db, scan_id, ScanState::Analyzing)).await?;
        progress.push(ScanState::Analyzing, "clustering observations into tokens", scan_id);

        let (doc, all_tokens) = tokio::time::timeout(
            ANALYZE_TIMEOUT,
            blocking(move || analyze_blocking(observations)),
        )
        .await
        .map_err(|_| ScanError::Timeout { phase: Phase::Analyzing })??;
        cancel.check()?;

        let layout_dna: Option<LayoutDna> = if plan.profile_layout {
            let spacing: Vec<ConsensusToken> = all_tokens
                .iter()
                .filter(|t| t.token.category() == TokenCategory::Dimension)
                .cloned()
                .collect();
            Some(layout::profile(&combined_sheet, &spacing))
        } else {
            None
        };

        let db = self.db.clone();
        blocking(move || scan::advance(&db, scan_id, ScanState::Diffing)).await?;
        progress.push(ScanState::Diffing, "diffing against previous version", scan_id);

        let site_lock = self.site_locks.lock_for(site_id);
        let db = self.db.clone();
        let doc_for_write = doc;
        let token_set = tokio::time::timeout(
            DIFF_TIMEOUT,
            blocking(move || write_version_locked(&db, &site_lock, site_id, scan_id, &doc_for_write)),
        )
        .await
        .map_err(|_| ScanError::Timeout { phase: Phase::Diffing })??;

        let token_set = if plan.enrich {
            let enricher = Arc::clone(&self.enricher);
            let fallback = token_set.clone();
            tokio::task::spawn_blocking(move || enrich::run(enricher.as_ref(), token_set))
                .await
                .unwrap_or(fallback)
        } else {
            token_set
        };

        if let Some(dna) = &layout_dna {
            let db = self.db.clone();
            let dna_json = serde_json::to_string(dna)?;
            blocking(move || store_layout::insert(&db, scan_id, &dna_json)).await?;
        }

        let db = self.db.clone();
        let title = bundle.title.clone();
        let description = bundle.description.clone();
        let favicon = bundle.favicon.clone();
        blocking(move || {
            site::record_completion(&db, site_id, title.as_deref(), description.as_deref(), favicon.as_deref())
        })
        .await?;

        let metrics_json = serde_json::json!({
            "css_sources": source_shas.len(),
            "consensus_score": token_set.consensus_score,
            "aggregate_content_hash": aggregate_hash,
        })
        .to_string();
        let db = self.db.clone();
        blocking(move || scan::finish_completed(&db, scan_id, &metrics_json)).await?;

        progress.push(ScanState::Completed, "scan completed", scan_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn submit_rejects_malformed_urls() {
        let db = Db::open("sqlite::memory:").unwrap();
        let orchestrator = Orchestrator::new(db, test_config());
        let result = orchestrator.submit("not a url", Quality::Standard).await;
        assert!(matches!(result, Err(ScanError::BadRequest(_))));
    }

    #[tokio::test]
    async fn submit_rejects_robots_disallowed_sites() {
        let db = Db::open("sqlite::memory:").unwrap();
        site::get_or_create(&db, "blocked.test").unwrap();
        let s = site::get_by_domain(&db, "blocked.test").unwrap().unwrap();
        site::set_robots_status(&db, s.id, RobotsStatus::Disallowed).unwrap();
        let orchestrator = Orchestrator::new(db, test_config());
        let result = orchestrator.submit("https://blocked.test/", Quality::Standard).await;
        assert!(matches!(result, Err(ScanError::RobotsDenied)));
    }

    #[test]
    fn cancellation_token_flips_and_reports() {
        let token = CancellationToken::default();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(ScanError::Canceled)));
    }

    fn doc_with_color(hex: &str) -> TokenDocument {
        let json = format!(
            r#"{{"color":{{"primary":{{"$value":"{hex}","$type":"color","$extensions":{{"usage":10,"confidence":0.9}}}}}}}}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn first_scan_writes_no_token_change_rows() {
        let db = Db::open("sqlite::memory:").unwrap();
        let s = site::get_or_create(&db, "first.test").unwrap();
        let scan_row = scan::create(&db, s.id, ScanMethod::Static).unwrap();
        let site_lock = parking_lot::Mutex::new(());
        let doc = doc_with_color("#ff0000");

        let token_set = write_version_locked(&db, &site_lock, s.id, scan_row.id, &doc).unwrap();
        assert_eq!(token_set.version_number, 1);

        let token_version_id: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT id FROM token_version WHERE token_set_id = ?1",
                    rusqlite::params![token_set.id],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        let changes = tokens::changes_for_version(&db, token_version_id).unwrap();
        assert!(changes.is_empty(), "first scan must write zero TokenChange rows, got {changes:?}");
    }

    #[test]
    fn default_enricher_is_noop_without_the_ai_feature() {
        let ts = TokenSet {
            id: 1,
            site_id: 1,
            scan_id: 1,
            version_number: 1,
            tokens_json: "{}".into(),
            consensus_score: 0.5,
            is_public: true,
            created_by: None,
            created_at: now_millis(),
        };
        let enricher = default_enricher();
        let result = enrich::run(enricher.as_ref(), ts.clone());
        assert_eq!(result.tokens_json, ts.tokens_json);
    }
}
