//! Per-site scanning mutex (spec §4.7, §5): two scans for the same site may
//! fetch and parse concurrently, but the version-write step (§4.6) is
//! serialized through this lock so `store::tokens::write_version` never races
//! itself for one site.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::SiteId;

/// Lazily-created, per-site locks. A stale entry for a site with no
/// in-flight scan is harmless — it's just an uncontended mutex sitting idle.
#[derive(Default)]
pub struct SiteLockRegistry {
    locks: Mutex<HashMap<SiteId, Arc<Mutex<()>>>>,
}

impl SiteLockRegistry {
    /// Returns the lock for `site_id`, creating one if this is the first request.
    pub fn lock_for(&self, site_id: SiteId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(site_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_returns_the_same_lock() {
        let registry = SiteLockRegistry::default();
        let a = registry.lock_for(1);
        let b = registry.lock_for(1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_sites_get_distinct_locks() {
        let registry = SiteLockRegistry::default();
        let a = registry.lock_for(1);
        let b = registry.lock_for(2);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
