//! Cache invalidation on writes.
//!
//! [`policy`] is the single table of what each mutation clears. The
//! coordinator is only invoked after the store has confirmed the write.

use tracing::debug;

use crate::cache::{CacheKey, Namespace, ReadCache};
use crate::model::JobId;

/// A store mutation that may leave cached reads stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  Create,
  BatchCreate,
  Update,
  Delete,
}

/// One invalidation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
  /// Drop every entry of the namespace
  Clear(Namespace),
  /// Drop the by-id entry of the mutated record, or the whole by-id
  /// namespace when the id is not known
  EvictRecord,
}

/// Namespaces keyed by criteria or aggregates; no write can tell which of
/// their entries it affects.
const SHARED: [Invalidation; 7] = [
  Invalidation::Clear(Namespace::Jobs),
  Invalidation::Clear(Namespace::JobsLatest),
  Invalidation::Clear(Namespace::JobsSearch),
  Invalidation::Clear(Namespace::JobsByCompany),
  Invalidation::Clear(Namespace::JobCounts),
  Invalidation::Clear(Namespace::JobByTitle),
  Invalidation::Clear(Namespace::JobsByExperience),
];

const SINGLE_RECORD: [Invalidation; 8] = [
  SHARED[0],
  SHARED[1],
  SHARED[2],
  SHARED[3],
  SHARED[4],
  SHARED[5],
  SHARED[6],
  Invalidation::EvictRecord,
];

const BATCH: [Invalidation; 8] = [
  SHARED[0],
  SHARED[1],
  SHARED[2],
  SHARED[3],
  SHARED[4],
  SHARED[5],
  SHARED[6],
  Invalidation::Clear(Namespace::Job),
];

/// What each mutation invalidates.
pub fn policy(mutation: Mutation) -> &'static [Invalidation] {
  match mutation {
    Mutation::Create | Mutation::Update | Mutation::Delete => &SINGLE_RECORD,
    Mutation::BatchCreate => &BATCH,
  }
}

/// Applies [`policy`] to a read cache.
#[derive(Clone)]
pub struct Invalidator {
  cache: ReadCache,
}

impl Invalidator {
  pub fn new(cache: ReadCache) -> Self {
    Self { cache }
  }

  /// Invalidate everything `mutation` may have made stale. Completes before
  /// returning, so any read started afterwards misses.
  pub async fn apply(&self, mutation: Mutation, id: Option<JobId>) {
    for step in policy(mutation) {
      match (step, id) {
        (Invalidation::Clear(namespace), _) => self.cache.evict_all(*namespace).await,
        (Invalidation::EvictRecord, Some(id)) => self.cache.evict(&CacheKey::JobById(id)).await,
        (Invalidation::EvictRecord, None) => self.cache.evict_all(Namespace::Job).await,
      }
    }
    debug!(?mutation, ?id, "Invalidated read cache");
  }
}
