//! Values the read cache can hold.

use std::sync::Arc;

use crate::model::{JobCounts, JobPage, JobRecord};

/// A cached read result. Large values sit behind `Arc` so hits are cheap.
#[derive(Debug, Clone)]
pub enum CachedValue {
  Jobs(Arc<Vec<JobRecord>>),
  Job(Arc<JobRecord>),
  Page(Arc<JobPage>),
  Counts(Arc<JobCounts>),
  Total(u64),
}

/// Trait for read results that can be stored in the read cache.
pub trait Cacheable: Sized + Send + 'static {
  fn into_cached(self) -> CachedValue;

  /// Recover the value; `None` if the entry holds a different shape.
  fn from_cached(value: CachedValue) -> Option<Self>;
}

fn unwrap_arc<T: Clone>(value: Arc<T>) -> T {
  Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone())
}

impl Cacheable for Vec<JobRecord> {
  fn into_cached(self) -> CachedValue {
    CachedValue::Jobs(Arc::new(self))
  }

  fn from_cached(value: CachedValue) -> Option<Self> {
    match value {
      CachedValue::Jobs(jobs) => Some(unwrap_arc(jobs)),
      _ => None,
    }
  }
}

impl Cacheable for JobRecord {
  fn into_cached(self) -> CachedValue {
    CachedValue::Job(Arc::new(self))
  }

  fn from_cached(value: CachedValue) -> Option<Self> {
    match value {
      CachedValue::Job(job) => Some(unwrap_arc(job)),
      _ => None,
    }
  }
}

impl Cacheable for JobPage {
  fn into_cached(self) -> CachedValue {
    CachedValue::Page(Arc::new(self))
  }

  fn from_cached(value: CachedValue) -> Option<Self> {
    match value {
      CachedValue::Page(page) => Some(unwrap_arc(page)),
      _ => None,
    }
  }
}

impl Cacheable for JobCounts {
  fn into_cached(self) -> CachedValue {
    CachedValue::Counts(Arc::new(self))
  }

  fn from_cached(value: CachedValue) -> Option<Self> {
    match value {
      CachedValue::Counts(counts) => Some(unwrap_arc(counts)),
      _ => None,
    }
  }
}

impl Cacheable for u64 {
  fn into_cached(self) -> CachedValue {
    CachedValue::Total(self)
  }

  fn from_cached(value: CachedValue) -> Option<Self> {
    match value {
      CachedValue::Total(total) => Some(total),
      _ => None,
    }
  }
}
