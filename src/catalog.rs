//! Job catalog service: cached reads and invalidating writes over a store.

use color_eyre::{Report, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ReadCache};
use crate::error::CatalogError;
use crate::filter::{Column, Filter, OrderBy, Predicate};
use crate::invalidation::{Invalidator, Mutation};
use crate::model::{self, JobCounts, JobDraft, JobId, JobPage, JobRecord, PageRequest, SearchCriteria};
use crate::store::JobStore;

/// Job catalog with a read-through cache.
///
/// Reads go through [`ReadCache::get_or_compute`]; writes hit the store and,
/// only once the store has confirmed them, invalidate the cache.
pub struct JobCatalog<S: JobStore> {
  store: Arc<S>,
  cache: ReadCache,
  invalidator: Invalidator,
}

impl<S: JobStore> JobCatalog<S> {
  pub fn new(store: S, cache: ReadCache) -> Self {
    Self {
      store: Arc::new(store),
      invalidator: Invalidator::new(cache.clone()),
      cache,
    }
  }

  pub fn cache(&self) -> &ReadCache {
    &self.cache
  }

  /// Every job, ordered by id.
  pub async fn list_all(&self) -> Result<Vec<JobRecord>> {
    self
      .cache
      .get_or_compute(CacheKey::AllJobs, || {
        let store = Arc::clone(&self.store);
        async move {
          debug!("Fetching all jobs");
          let jobs = store.find_all()?;
          info!(count = jobs.len(), "Fetched all jobs");
          Ok(jobs)
        }
      })
      .await
  }

  pub async fn get_by_id(&self, id: JobId) -> Result<JobRecord> {
    self
      .cache
      .get_or_compute(CacheKey::JobById(id), || {
        let store = Arc::clone(&self.store);
        async move {
          debug!(%id, "Fetching job");
          let job = store
            .find_by_id(id)?
            .ok_or_else(|| Report::from(CatalogError::job_id(id)))?;
          info!(%id, "Fetched job");
          Ok(job)
        }
      })
      .await
  }

  /// The single job with this title (case-insensitive).
  ///
  /// Titles are not unique; more than one match is an error and the caller
  /// should use [`JobCatalog::get_by_title_and_id`].
  pub async fn get_by_title(&self, title: &str) -> Result<JobRecord> {
    self
      .cache
      .get_or_compute(CacheKey::title(title), || {
        let store = Arc::clone(&self.store);
        let title = title.to_string();
        async move {
          debug!(%title, "Fetching job by title");
          let filter = Filter::all().and(Predicate::equals(Column::Title, &title));
          let mut jobs = store.find_where(&filter, OrderBy::ID)?;
          match jobs.len() {
            0 => Err(CatalogError::title(&title).into()),
            1 => Ok(jobs.remove(0)),
            matches => Err(CatalogError::AmbiguousTitle { title, matches }.into()),
          }
        }
      })
      .await
  }

  pub async fn get_by_title_and_id(&self, title: &str, id: JobId) -> Result<JobRecord> {
    self
      .cache
      .get_or_compute(CacheKey::title_and_id(title, id), || {
        let store = Arc::clone(&self.store);
        let title = title.to_string();
        async move {
          debug!(%title, %id, "Fetching job by title and id");
          let filter = Filter::all()
            .and(Predicate::equals(Column::Title, &title))
            .and(Predicate::IdEquals(id));
          let job = store
            .find_where(&filter, OrderBy::ID)?
            .into_iter()
            .next()
            .ok_or_else(|| Report::from(CatalogError::title_and_id(&title, id)))?;
          info!(%title, %id, "Fetched job by title and id");
          Ok(job)
        }
      })
      .await
  }

  /// Jobs tagged with this experience tier, newest first.
  pub async fn get_by_experience(&self, experience: &str) -> Result<Vec<JobRecord>> {
    self
      .cache
      .get_or_compute(CacheKey::experience(experience), || {
        let store = Arc::clone(&self.store);
        let experience = experience.to_string();
        async move {
          debug!(%experience, "Fetching jobs by experience");
          let filter = Filter::all().and(Predicate::equals(Column::Experience, &experience));
          let jobs = store.find_where(&filter, OrderBy::NEWEST_FIRST)?;
          if jobs.is_empty() {
            warn!(%experience, "No jobs found for experience");
          } else {
            info!(%experience, count = jobs.len(), "Fetched jobs by experience");
          }
          Ok(jobs)
        }
      })
      .await
  }

  /// Every job, newest posting first.
  pub async fn get_latest(&self) -> Result<Vec<JobRecord>> {
    self
      .cache
      .get_or_compute(CacheKey::Latest, || {
        let store = Arc::clone(&self.store);
        async move {
          debug!("Fetching latest jobs");
          let jobs = store.find_where(&Filter::all(), OrderBy::NEWEST_FIRST)?;
          if jobs.is_empty() {
            warn!("No latest jobs found");
          } else {
            info!(count = jobs.len(), "Fetched latest jobs");
          }
          Ok(jobs)
        }
      })
      .await
  }

  /// Jobs at this company (case-insensitive), ordered by id.
  pub async fn get_by_company(&self, company: &str) -> Result<Vec<JobRecord>> {
    self
      .cache
      .get_or_compute(CacheKey::company(company), || {
        let store = Arc::clone(&self.store);
        let company = company.to_string();
        async move {
          debug!(%company, "Fetching jobs by company");
          let filter = Filter::all().and(Predicate::equals(Column::Company, &company));
          store.find_where(&filter, OrderBy::ID)
        }
      })
      .await
  }

  /// Number of jobs per job type.
  pub async fn count_by_type(&self) -> Result<JobCounts> {
    self
      .cache
      .get_or_compute(CacheKey::CountsByType, || {
        let store = Arc::clone(&self.store);
        async move {
          debug!("Counting jobs by type");
          store.count_grouped_by(Column::JobType)
        }
      })
      .await
  }

  pub async fn count(&self) -> Result<u64> {
    self
      .cache
      .get_or_compute(CacheKey::TotalCount, || {
        let store = Arc::clone(&self.store);
        async move {
          debug!("Counting jobs");
          let total = store.count()?;
          info!(total, "Counted jobs");
          Ok(total)
        }
      })
      .await
  }

  /// One page of jobs matching every present criterion.
  pub async fn search(&self, criteria: &SearchCriteria, page: PageRequest) -> Result<JobPage> {
    self
      .cache
      .get_or_compute(CacheKey::search(criteria, &page), || {
        let store = Arc::clone(&self.store);
        let filter = Filter::from_criteria(criteria);
        async move {
          debug!(?filter, ?page, "Searching jobs");
          let (content, total_elements) = store.find_page(&filter, &page)?;
          Ok(JobPage {
            content,
            page: page.page,
            size: page.size,
            total_elements,
          })
        }
      })
      .await
  }

  /// Store a new job. The posting time defaults to now.
  pub async fn create(&self, draft: JobDraft) -> Result<JobRecord> {
    debug!(title = %draft.title, "Saving job");
    let saved = self.store.save(draft.into_record(model::now()))?;
    self.invalidator.apply(Mutation::Create, saved.id).await;
    info!(id = ?saved.id, "Job saved");
    Ok(saved)
  }

  /// Store a batch of new jobs atomically.
  pub async fn create_all(&self, drafts: Vec<JobDraft>) -> Result<Vec<JobRecord>> {
    debug!(count = drafts.len(), "Saving batch of jobs");
    let now = model::now();
    let records = drafts.into_iter().map(|d| d.into_record(now)).collect();
    let saved = self.store.save_all(records)?;
    self.invalidator.apply(Mutation::BatchCreate, None).await;
    info!(count = saved.len(), "Batch saved");
    Ok(saved)
  }

  /// Overwrite the mutable fields of an existing job.
  pub async fn update(&self, id: JobId, draft: &JobDraft) -> Result<JobRecord> {
    debug!(%id, "Updating job");
    let mut job = self
      .store
      .find_by_id(id)?
      .ok_or_else(|| Report::from(CatalogError::job_id(id)))?;
    draft.apply_to(&mut job);

    let updated = self.store.save(job)?;
    self.invalidator.apply(Mutation::Update, Some(id)).await;
    info!(%id, "Job updated");
    Ok(updated)
  }

  pub async fn delete(&self, id: JobId) -> Result<()> {
    debug!(%id, "Deleting job");
    if !self.store.delete_by_id(id)? {
      return Err(CatalogError::job_id(id).into());
    }
    self.invalidator.apply(Mutation::Delete, Some(id)).await;
    info!(%id, "Deleted job");
    Ok(())
  }
}

impl<S: JobStore> Clone for JobCatalog<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      cache: self.cache.clone(),
      invalidator: self.invalidator.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::SqliteJobStore;
  use chrono::NaiveDate;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Store decorator that counts calls and can be told to fail writes.
  struct CountingStore {
    inner: SqliteJobStore,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_writes: std::sync::atomic::AtomicBool,
    /// Delete each record right after `find_by_id` returns it
    vanish_after_lookup: std::sync::atomic::AtomicBool,
  }

  impl CountingStore {
    fn new() -> Self {
      Self {
        inner: SqliteJobStore::open_in_memory().unwrap(),
        calls: Mutex::new(HashMap::new()),
        fail_writes: Default::default(),
        vanish_after_lookup: Default::default(),
      }
    }

    fn record(&self, method: &'static str) {
      *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }

    fn check_writable(&self) -> Result<()> {
      if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(eyre!("database is locked"));
      }
      Ok(())
    }
  }

  impl JobStore for CountingStore {
    fn find_all(&self) -> Result<Vec<JobRecord>> {
      self.record("find_all");
      self.inner.find_all()
    }

    fn find_by_id(&self, id: JobId) -> Result<Option<JobRecord>> {
      self.record("find_by_id");
      let found = self.inner.find_by_id(id)?;
      if self
        .vanish_after_lookup
        .load(std::sync::atomic::Ordering::SeqCst)
      {
        self.inner.delete_by_id(id)?;
      }
      Ok(found)
    }

    fn find_where(&self, filter: &Filter, order: OrderBy) -> Result<Vec<JobRecord>> {
      self.record("find_where");
      self.inner.find_where(filter, order)
    }

    fn find_page(&self, filter: &Filter, page: &PageRequest) -> Result<(Vec<JobRecord>, u64)> {
      self.record("find_page");
      self.inner.find_page(filter, page)
    }

    fn count(&self) -> Result<u64> {
      self.record("count");
      self.inner.count()
    }

    fn save(&self, job: JobRecord) -> Result<JobRecord> {
      self.check_writable()?;
      self.inner.save(job)
    }

    fn save_all(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>> {
      self.check_writable()?;
      self.inner.save_all(jobs)
    }

    fn delete_by_id(&self, id: JobId) -> Result<bool> {
      self.check_writable()?;
      self.inner.delete_by_id(id)
    }

    fn count_grouped_by(&self, column: Column) -> Result<JobCounts> {
      self.record("count_grouped_by");
      self.inner.count_grouped_by(column)
    }
  }

  fn catalog() -> JobCatalog<CountingStore> {
    JobCatalog::new(CountingStore::new(), ReadCache::default())
  }

  fn calls(catalog: &JobCatalog<CountingStore>, method: &str) -> usize {
    catalog
      .store
      .calls
      .lock()
      .unwrap()
      .get(method)
      .copied()
      .unwrap_or(0)
  }

  fn draft(title: &str, company: &str, salary: &str) -> JobDraft {
    JobDraft {
      title: title.to_string(),
      company: company.to_string(),
      location: "Remote".to_string(),
      details: "Ship things".to_string(),
      experience_required: "2 years".to_string(),
      experience: Some("Junior".to_string()),
      salary: salary.to_string(),
      job_type: "Full-Time".to_string(),
      ..Default::default()
    }
  }

  fn is_not_found(err: &Report) -> bool {
    CatalogError::classify(err).is_some_and(CatalogError::is_not_found)
  }

  #[tokio::test]
  async fn test_write_then_read_sees_new_record() -> Result<()> {
    let catalog = catalog();
    assert!(catalog.list_all().await?.is_empty());

    catalog.create(draft("Backend Engineer", "Acme Corp", "50000")).await?;

    let jobs = catalog.list_all().await?;
    assert!(jobs.iter().any(|j| j.title == "Backend Engineer"));
    assert_eq!(catalog.count().await?, 1);
    Ok(())
  }

  #[tokio::test]
  async fn test_create_defaults_posting_time() -> Result<()> {
    let catalog = catalog();
    let before = model::now();
    let saved = catalog.create(draft("Backend Engineer", "Acme Corp", "1")).await?;
    assert!(saved.id.is_some());
    assert!(saved.posted_at() >= before - chrono::Duration::seconds(1));
    Ok(())
  }

  #[tokio::test]
  async fn test_repeated_search_hits_cache() -> Result<()> {
    let catalog = catalog();
    catalog
      .create_all(vec![
        draft("Backend Engineer", "Acme Corp", "50000"),
        draft("Frontend Engineer", "Globex", "45000"),
      ])
      .await?;

    let criteria = SearchCriteria {
      keyword: Some("engineer".to_string()),
      ..Default::default()
    };
    let first = catalog.search(&criteria, PageRequest::default()).await?;
    let second = catalog.search(&criteria, PageRequest::default()).await?;

    assert_eq!(first, second);
    assert_eq!(first.total_elements, 2);
    assert_eq!(calls(&catalog, "find_page"), 1);

    // A different page is a different key
    catalog.search(&criteria, PageRequest::new(1, 10)).await?;
    assert_eq!(calls(&catalog, "find_page"), 2);
    Ok(())
  }

  #[tokio::test]
  async fn test_empty_criteria_returns_everything() -> Result<()> {
    let catalog = catalog();
    catalog
      .create_all(vec![
        draft("Backend Engineer", "Acme Corp", "50000"),
        draft("QA Tester", "Globex", "30000"),
        draft("Data Analyst", "Initech", "40000"),
      ])
      .await?;

    let page = catalog
      .search(&SearchCriteria::default(), PageRequest::new(0, 2))
      .await?;
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.content.len(), 2);
    assert_eq!(page.total_pages(), 2);
    Ok(())
  }

  #[tokio::test]
  async fn test_ambiguous_title() -> Result<()> {
    let catalog = catalog();
    let saved = catalog
      .create_all(vec![
        draft("QA Tester", "Acme Corp", "30000"),
        draft("QA Tester", "Globex", "32000"),
      ])
      .await?;

    let err = catalog.get_by_title("QA Tester").await.unwrap_err();
    assert!(matches!(
      CatalogError::classify(&err),
      Some(CatalogError::AmbiguousTitle { matches: 2, .. })
    ));

    let id = saved[1].id.unwrap();
    let job = catalog.get_by_title_and_id("QA Tester", id).await?;
    assert_eq!(job.id, Some(id));
    assert_eq!(job.company, "Globex");

    let missing = catalog.get_by_title("Astronaut").await.unwrap_err();
    assert!(matches!(
      CatalogError::classify(&missing),
      Some(CatalogError::NotFound { .. })
    ));
    Ok(())
  }

  #[tokio::test]
  async fn test_case_insensitive_lookups() -> Result<()> {
    let catalog = catalog();
    catalog.create(draft("Backend Engineer", "Acme Corp", "50000")).await?;

    let by_company = catalog.get_by_company("acme corp").await?;
    assert_eq!(by_company.len(), 1);

    let criteria = SearchCriteria {
      keyword: Some("ACME".to_string()),
      ..Default::default()
    };
    let page = catalog.search(&criteria, PageRequest::default()).await?;
    assert_eq!(page.total_elements, 1);

    let by_title = catalog.get_by_title("backend engineer").await?;
    assert_eq!(by_title.company, "Acme Corp");

    let by_experience = catalog.get_by_experience("JUNIOR").await?;
    assert_eq!(by_experience.len(), 1);
    Ok(())
  }

  #[tokio::test]
  async fn test_min_salary_scenario() -> Result<()> {
    let catalog = catalog();
    catalog.create(draft("X Role", "Acme Corp", "50000")).await?;

    let at_least = |min: &str| SearchCriteria {
      min_salary: Some(min.to_string()),
      ..Default::default()
    };
    let page = catalog.search(&at_least("40000"), PageRequest::default()).await?;
    assert_eq!(page.total_elements, 1);
    let page = catalog.search(&at_least("60000"), PageRequest::default()).await?;
    assert_eq!(page.total_elements, 0);
    Ok(())
  }

  #[tokio::test]
  async fn test_posted_date_filters() -> Result<()> {
    let catalog = catalog();
    let posted = NaiveDate::from_ymd_opt(2024, 6, 15)
      .unwrap()
      .and_hms_opt(8, 0, 0)
      .unwrap();
    catalog
      .create(JobDraft {
        posted_at: Some(posted),
        ..draft("Backend Engineer", "Acme Corp", "1")
      })
      .await?;

    let criteria = SearchCriteria {
      posted_from: NaiveDate::from_ymd_opt(2024, 6, 15),
      posted_to: NaiveDate::from_ymd_opt(2024, 6, 15),
      ..Default::default()
    };
    assert_eq!(
      catalog.search(&criteria, PageRequest::default()).await?.total_elements,
      1
    );

    let criteria = SearchCriteria {
      posted_from: NaiveDate::from_ymd_opt(2024, 6, 16),
      ..Default::default()
    };
    assert_eq!(
      catalog.search(&criteria, PageRequest::default()).await?.total_elements,
      0
    );
    Ok(())
  }

  #[tokio::test]
  async fn test_update_is_visible_everywhere() -> Result<()> {
    let catalog = catalog();
    let saved = catalog.create(draft("QA Tester", "Acme Corp", "30000")).await?;
    let id = saved.id.unwrap();

    // Warm every affected namespace
    catalog.get_by_id(id).await?;
    catalog.get_by_title("QA Tester").await?;
    catalog.get_by_company("Acme Corp").await?;
    catalog.get_latest().await?;
    catalog.count_by_type().await?;

    let update = JobDraft {
      job_type: "Contract".to_string(),
      ..draft("Senior QA Tester", "Globex", "40000")
    };
    let updated = catalog.update(id, &update).await?;
    assert_eq!(updated.posted_at(), saved.posted_at());

    assert_eq!(catalog.get_by_id(id).await?.title, "Senior QA Tester");
    assert!(is_not_found(&catalog.get_by_title("QA Tester").await.unwrap_err()));
    assert!(catalog.get_by_company("Acme Corp").await?.is_empty());
    assert_eq!(catalog.get_latest().await?[0].company, "Globex");
    assert_eq!(catalog.count_by_type().await?.get("Contract"), Some(&1));
    Ok(())
  }

  #[tokio::test]
  async fn test_delete_evicts_record() -> Result<()> {
    let catalog = catalog();
    let saved = catalog.create(draft("QA Tester", "Acme Corp", "30000")).await?;
    let id = saved.id.unwrap();

    catalog.get_by_id(id).await?;
    catalog.delete(id).await?;

    assert!(is_not_found(&catalog.get_by_id(id).await.unwrap_err()));
    assert!(catalog.list_all().await?.is_empty());
    assert_eq!(catalog.count().await?, 0);
    Ok(())
  }

  #[tokio::test]
  async fn test_missing_ids_are_not_found_and_not_cached() -> Result<()> {
    let catalog = catalog();
    for _ in 0..2 {
      assert!(is_not_found(&catalog.get_by_id(JobId(404)).await.unwrap_err()));
    }
    assert_eq!(calls(&catalog, "find_by_id"), 2);

    assert!(is_not_found(
      &catalog.update(JobId(404), &draft("Ghost Role", "Nobody Inc", "1")).await.unwrap_err()
    ));
    assert!(is_not_found(&catalog.delete(JobId(404)).await.unwrap_err()));
    Ok(())
  }

  #[tokio::test]
  async fn test_update_racing_delete_is_not_found() -> Result<()> {
    let catalog = catalog();
    let saved = catalog.create(draft("QA Tester", "Acme Corp", "30000")).await?;
    let id = saved.id.unwrap();
    catalog.get_by_id(id).await?;

    catalog
      .store
      .vanish_after_lookup
      .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = catalog
      .update(id, &draft("Senior QA Tester", "Acme Corp", "40000"))
      .await
      .unwrap_err();
    assert!(is_not_found(&err));

    // Nothing was written, so nothing was invalidated
    assert!(catalog.cache().contains(&CacheKey::JobById(id)).await);
    Ok(())
  }

  #[tokio::test]
  async fn test_non_ascii_lookups_find_stored_values() -> Result<()> {
    let catalog = catalog();
    catalog
      .create(JobDraft {
        experience: Some("Ältere".to_string()),
        ..draft("Ärzte Team Lead", "ÉCOLE Numérique", "50000")
      })
      .await?;

    assert_eq!(catalog.get_by_company("ÉCOLE Numérique").await?.len(), 1);
    assert_eq!(catalog.get_by_company("école numérique").await?.len(), 1);
    assert_eq!(catalog.get_by_title("Ärzte Team Lead").await?.company, "ÉCOLE Numérique");
    assert_eq!(catalog.get_by_experience("ÄLTERE").await?.len(), 1);

    let keyword = SearchCriteria {
      keyword: Some("ärzte".to_string()),
      ..Default::default()
    };
    assert_eq!(catalog.search(&keyword, PageRequest::default()).await?.total_elements, 1);

    let company = SearchCriteria {
      company: Some("ÉCOLE Numérique".to_string()),
      ..Default::default()
    };
    assert_eq!(catalog.search(&company, PageRequest::default()).await?.total_elements, 1);
    Ok(())
  }

  #[tokio::test]
  async fn test_failed_write_keeps_cache() -> Result<()> {
    let catalog = catalog();
    catalog.create(draft("Backend Engineer", "Acme Corp", "50000")).await?;
    catalog.list_all().await?;
    assert_eq!(calls(&catalog, "find_all"), 1);

    catalog
      .store
      .fail_writes
      .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = catalog
      .create(draft("Frontend Engineer", "Globex", "1"))
      .await
      .unwrap_err();
    assert!(CatalogError::classify(&err).is_none());
    assert!(err.to_string().contains("database is locked"));

    catalog.list_all().await?;
    assert_eq!(calls(&catalog, "find_all"), 1);
    assert!(catalog.cache().contains(&CacheKey::AllJobs).await);
    Ok(())
  }

  #[tokio::test]
  async fn test_counts_are_cached_until_write() -> Result<()> {
    let catalog = catalog();
    catalog.create(draft("Backend Engineer", "Acme Corp", "50000")).await?;

    assert_eq!(catalog.count_by_type().await?.get("Full-Time"), Some(&1));
    catalog.count_by_type().await?;
    assert_eq!(calls(&catalog, "count_grouped_by"), 1);

    catalog.create(draft("Data Analyst", "Acme Corp", "1")).await?;
    assert_eq!(catalog.count_by_type().await?.get("Full-Time"), Some(&2));
    assert_eq!(calls(&catalog, "count_grouped_by"), 2);
    Ok(())
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_readers_share_results() -> Result<()> {
    let catalog = catalog();
    catalog.create(draft("Backend Engineer", "Acme Corp", "50000")).await?;

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let catalog = catalog.clone();
        tokio::spawn(async move { catalog.get_latest().await })
      })
      .collect();

    for handle in handles {
      assert_eq!(handle.await??.len(), 1);
    }
    assert_eq!(calls(&catalog, "find_where"), 1);
    Ok(())
  }
}
