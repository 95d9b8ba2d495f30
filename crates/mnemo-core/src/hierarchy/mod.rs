//! Subject-tree membership resolution.
//!
//! A subject's card membership (its own cards plus every descendant's) is
//! expensive to recompute on every queue build, so the resolver keeps
//! immutable per-subject snapshots behind `Arc`s. Readers hold a snapshot
//! for as long as they like; writers never touch a published snapshot,
//! they swap in a replacement. Catalog mutations mark the subject and its
//! ancestor chain invalid, which is bounded by tree depth no matter how
//! many cards moved.
//!
//! An invalidated snapshot may still be served for a grace window
//! (`stale_tolerance_secs`); past that, the next access recomputes and the
//! staleness is logged.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::catalog::Subject;
use crate::error::Result;

/// Cache behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long an invalidated snapshot may still be served, in seconds.
    #[serde(default = "default_stale_tolerance")]
    pub stale_tolerance_secs: i64,
}

fn default_stale_tolerance() -> i64 {
    300
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stale_tolerance_secs: default_stale_tolerance(),
        }
    }
}

/// Immutable membership of one subject subtree at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub subject_id: String,
    /// Ids of every card on the subject or any descendant.
    pub card_ids: BTreeSet<String>,
    pub computed_at: DateTime<Utc>,
}

impl MembershipSnapshot {
    pub fn new(subject_id: impl Into<String>, card_ids: BTreeSet<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            card_ids,
            computed_at,
        }
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.card_ids.contains(card_id)
    }

    pub fn len(&self) -> usize {
        self.card_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.card_ids.is_empty()
    }
}

struct CacheEntry {
    snapshot: Arc<MembershipSnapshot>,
    invalidated_at: Option<DateTime<Utc>>,
}

/// Copy-on-write membership cache.
pub struct DeckResolver {
    cache: RwLock<HashMap<String, CacheEntry>>,
    config: ResolverConfig,
}

impl DeckResolver {
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the membership snapshot for `subject_id`.
    ///
    /// Serves the cached snapshot when it is fresh, or invalidated less
    /// than the tolerance ago. Otherwise `compute` runs *outside* any lock
    /// and its result is swapped in. Concurrent resolves of the same
    /// subject may compute twice; both results are valid and the last
    /// write wins.
    pub fn resolve<F>(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<Arc<MembershipSnapshot>>
    where
        F: FnOnce() -> Result<BTreeSet<String>>,
    {
        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.get(subject_id) {
                match entry.invalidated_at {
                    None => return Ok(Arc::clone(&entry.snapshot)),
                    Some(at) => {
                        let age = (now - at).num_seconds();
                        if age <= self.config.stale_tolerance_secs {
                            debug!(
                                "serving stale membership for subject {subject_id} ({age}s old)"
                            );
                            return Ok(Arc::clone(&entry.snapshot));
                        }
                        warn!(
                            "membership for subject {subject_id} stale for {age}s, recomputing"
                        );
                    }
                }
            }
        }

        self.refresh(subject_id, now, compute)
    }

    /// Recompute unconditionally and swap the result in, bypassing any
    /// cached snapshot. The admin recomputation hook; idempotent, since
    /// recomputing unchanged structure yields an equal set.
    pub fn refresh<F>(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<Arc<MembershipSnapshot>>
    where
        F: FnOnce() -> Result<BTreeSet<String>>,
    {
        let snapshot = Arc::new(MembershipSnapshot::new(subject_id, compute()?, now));
        if let Ok(mut cache) = self.cache.write() {
            // An invalidation that raced in while we were computing must
            // survive the swap, or the mutation it reported gets masked.
            let carried = cache
                .get(subject_id)
                .and_then(|e| e.invalidated_at.filter(|at| *at > snapshot.computed_at));
            cache.insert(
                subject_id.to_string(),
                CacheEntry {
                    snapshot: Arc::clone(&snapshot),
                    invalidated_at: carried,
                },
            );
        }
        Ok(snapshot)
    }

    /// Mark the subject and its whole ancestor chain as invalidated.
    ///
    /// Call after any mutation that changes membership: card create, move,
    /// visibility flip, or a subtree move. Entries not in the cache are
    /// skipped; they will compute fresh on first access anyway.
    pub fn invalidate_subject(&self, subject: &Subject, now: DateTime<Utc>) {
        if let Ok(mut cache) = self.cache.write() {
            for id in subject.ancestry() {
                if let Some(entry) = cache.get_mut(id) {
                    entry.invalidated_at.get_or_insert(now);
                }
            }
        }
    }

    /// Drop every cached snapshot. Outstanding `Arc`s stay readable.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl Default for DeckResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::cell::Cell;

    fn cards(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn miss_computes_then_hit_serves_same_snapshot() {
        let resolver = DeckResolver::new();
        let now = Utc::now();
        let calls = Cell::new(0u32);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(cards(&["c1", "c2"]))
        };
        let a = resolver.resolve("s1", now, compute).unwrap();
        let b = resolver
            .resolve("s1", now, || panic!("should serve from cache"))
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.contains("c1"));
    }

    #[test]
    fn stale_within_tolerance_is_served() {
        let resolver = DeckResolver::new();
        let t0 = Utc::now();
        let root = Subject::new_root("algebra");
        let a = resolver.resolve(&root.id, t0, || Ok(cards(&["c1"]))).unwrap();
        resolver.invalidate_subject(&root, t0);

        let t1 = t0 + Duration::seconds(200);
        let b = resolver
            .resolve(&root.id, t1, || panic!("inside tolerance"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn stale_past_tolerance_recomputes() {
        let resolver = DeckResolver::new();
        let t0 = Utc::now();
        let root = Subject::new_root("algebra");
        let old = resolver.resolve(&root.id, t0, || Ok(cards(&["c1"]))).unwrap();
        resolver.invalidate_subject(&root, t0);

        let t1 = t0 + Duration::seconds(301);
        let fresh = resolver
            .resolve(&root.id, t1, || Ok(cards(&["c1", "c2"])))
            .unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.len(), 2);
        // The replaced snapshot stays readable for whoever still holds it.
        assert_eq!(old.len(), 1);
        assert!(old.contains("c1"));
    }

    #[test]
    fn invalidation_covers_ancestor_chain() {
        let resolver = DeckResolver::new();
        let t0 = Utc::now();
        let root = Subject::new_root("math");
        let child = Subject::new_child(&root, "algebra");
        resolver.resolve(&root.id, t0, || Ok(cards(&["c1", "c2"]))).unwrap();
        resolver.resolve(&child.id, t0, || Ok(cards(&["c2"]))).unwrap();

        resolver.invalidate_subject(&child, t0);

        let t1 = t0 + Duration::seconds(400);
        let calls = Cell::new(0u32);
        resolver
            .resolve(&root.id, t1, || {
                calls.set(calls.get() + 1);
                Ok(cards(&["c1"]))
            })
            .unwrap();
        resolver
            .resolve(&child.id, t1, || {
                calls.set(calls.get() + 1);
                Ok(BTreeSet::new())
            })
            .unwrap();
        assert_eq!(calls.get(), 2, "both chain entries must recompute");
    }

    #[test]
    fn compute_failure_leaves_cache_untouched() {
        let resolver = DeckResolver::new();
        let t0 = Utc::now();
        let root = Subject::new_root("math");
        let a = resolver.resolve(&root.id, t0, || Ok(cards(&["c1"]))).unwrap();
        resolver.invalidate_subject(&root, t0);

        let t1 = t0 + Duration::seconds(400);
        let err = resolver.resolve(&root.id, t1, || {
            Err(crate::error::DatabaseError::QueryFailed("boom".into()).into())
        });
        assert!(err.is_err());

        // Retry still finds the old entry and can recompute.
        let b = resolver
            .resolve(&root.id, t1, || Ok(cards(&["c1", "c3"])))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.len(), 2);
    }
}
