//! Enrichment plugin (A5): a bounded, optional post-analysis pass over a
//! freshly computed [`TokenSet`]. Treated as an external collaborator the
//! core never depends on for correctness — any failure is swallowed.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::model::TokenSet;

/// Per-scan wall-clock budget for enrichment. Exceeding it degrades to the
/// unenriched TokenSet rather than delaying the scan.
const ENRICH_BUDGET: Duration = Duration::from_secs(5);

/// A post-analysis transform over a [`TokenSet`]. Implementations must not
/// assume they run at all: callers may skip enrichment entirely when the
/// quality tier doesn't request it (spec §6 `QualityPlan::enrich`).
pub trait Enricher: Send + Sync {
    /// Returns a possibly-modified TokenSet. Implementations should return
    /// quickly; [`run`] enforces the budget regardless.
    fn enrich(&self, token_set: TokenSet) -> TokenSet;
}

/// The default enricher: returns its input unchanged. Used whenever no
/// enrichment backend is configured, or the `ai_enrichment` feature is off.
#[derive(Debug, Default)]
pub struct NoopEnricher;

impl Enricher for NoopEnricher {
    fn enrich(&self, token_set: TokenSet) -> TokenSet {
        token_set
    }
}

/// Runs `enricher` against `token_set` with a hard per-scan budget and a
/// never-fails contract: any panic or overrun is caught and the original
/// TokenSet is returned unchanged.
///
/// `enricher.enrich` itself cannot return a `Result`, so "failure" here means
/// either a panic inside it or exceeding [`ENRICH_BUDGET`]; both paths log
/// and fall back rather than propagate.
pub fn run(enricher: &dyn Enricher, token_set: TokenSet) -> TokenSet {
    let started = Instant::now();
    let fallback = token_set.clone();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| enricher.enrich(token_set)));

    match result {
        Ok(enriched) if started.elapsed() <= ENRICH_BUDGET => enriched,
        Ok(_) => {
            warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "enrichment exceeded its budget, discarding its output"
            );
            fallback
        }
        Err(_) => {
            warn!("enrichment panicked, falling back to the unenriched token set");
            fallback
        }
    }
}

#[cfg(feature = "ai_enrichment")]
mod ai {
    //! Placeholder backend selected only when the `ai_enrichment` feature is
    //! enabled. No network calls are wired up yet; this exists so the
    //! feature flag has a real implementation slot rather than compiling to
    //! nothing (SPEC_FULL.md §9 Open Question).
    use super::{Enricher, TokenSet};

    /// An `Enricher` that is a no-op today but marks where a real LLM-backed
    /// pass would plug in once one is selected.
    #[derive(Debug, Default)]
    pub struct AiEnricher;

    impl Enricher for AiEnricher {
        fn enrich(&self, token_set: TokenSet) -> TokenSet {
            token_set
        }
    }
}

#[cfg(feature = "ai_enrichment")]
pub use ai::AiEnricher;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now_millis;

    fn sample_token_set() -> TokenSet {
        TokenSet {
            id: 1,
            site_id: 1,
            scan_id: 1,
            version_number: 1,
            tokens_json: "{}".into(),
            consensus_score: 0.5,
            is_public: true,
            created_by: None,
            created_at: now_millis(),
        }
    }

    struct PanickingEnricher;
    impl Enricher for PanickingEnricher {
        fn enrich(&self, _token_set: TokenSet) -> TokenSet {
            panic!("boom");
        }
    }

    #[test]
    fn noop_enricher_passes_through() {
        let ts = sample_token_set();
        let result = run(&NoopEnricher, ts.clone());
        assert_eq!(result.tokens_json, ts.tokens_json);
    }

    #[test]
    fn panicking_enricher_falls_back_without_propagating() {
        let ts = sample_token_set();
        let result = run(&PanickingEnricher, ts.clone());
        assert_eq!(result.id, ts.id);
    }
}
