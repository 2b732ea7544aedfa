//! Cache namespaces and typed key derivation.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::model::{JobId, PageRequest, SearchCriteria, SortDirection, SortField};

/// A partition of the read cache, one per read result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
  /// Whole-collection listing
  Jobs,
  /// Single record by id
  Job,
  /// Single record by title, or by title and id
  JobByTitle,
  JobsByExperience,
  JobsLatest,
  JobsSearch,
  JobsByCompany,
  /// Aggregate counts
  JobCounts,
}

impl Namespace {
  pub const COUNT: usize = 8;

  pub const ALL: [Namespace; Namespace::COUNT] = [
    Namespace::Jobs,
    Namespace::Job,
    Namespace::JobByTitle,
    Namespace::JobsByExperience,
    Namespace::JobsLatest,
    Namespace::JobsSearch,
    Namespace::JobsByCompany,
    Namespace::JobCounts,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Namespace::Jobs => "jobs",
      Namespace::Job => "job",
      Namespace::JobByTitle => "job_by_title",
      Namespace::JobsByExperience => "jobs_by_experience",
      Namespace::JobsLatest => "jobs_latest",
      Namespace::JobsSearch => "jobs_search",
      Namespace::JobsByCompany => "jobs_by_company",
      Namespace::JobCounts => "job_counts",
    }
  }

  pub(crate) fn index(&self) -> usize {
    *self as usize
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Key of one cached read. Each variant belongs to exactly one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
  AllJobs,
  JobById(JobId),
  /// Lowercased title
  JobByTitle(String),
  JobByTitleAndId(String, JobId),
  /// Lowercased experience tag
  ByExperience(String),
  Latest,
  /// Lowercased company name
  ByCompany(String),
  /// SHA-256 of the canonical search request
  Search(String),
  TotalCount,
  CountsByType,
}

impl CacheKey {
  pub fn title(title: &str) -> Self {
    CacheKey::JobByTitle(title.to_lowercase())
  }

  pub fn title_and_id(title: &str, id: JobId) -> Self {
    CacheKey::JobByTitleAndId(title.to_lowercase(), id)
  }

  pub fn experience(experience: &str) -> Self {
    CacheKey::ByExperience(experience.to_lowercase())
  }

  pub fn company(company: &str) -> Self {
    CacheKey::ByCompany(company.to_lowercase())
  }

  /// Key for a search request. Criteria values are hashed as given: an
  /// absent field and an empty string produce different keys.
  pub fn search(criteria: &SearchCriteria, page: &PageRequest) -> Self {
    CacheKey::Search(search_digest(criteria, page))
  }

  pub fn namespace(&self) -> Namespace {
    match self {
      CacheKey::AllJobs => Namespace::Jobs,
      CacheKey::JobById(_) => Namespace::Job,
      CacheKey::JobByTitle(_) | CacheKey::JobByTitleAndId(..) => Namespace::JobByTitle,
      CacheKey::ByExperience(_) => Namespace::JobsByExperience,
      CacheKey::Latest => Namespace::JobsLatest,
      CacheKey::ByCompany(_) => Namespace::JobsByCompany,
      CacheKey::Search(_) => Namespace::JobsSearch,
      CacheKey::TotalCount | CacheKey::CountsByType => Namespace::JobCounts,
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheKey::AllJobs => write!(f, "{}:all", self.namespace()),
      CacheKey::JobById(id) => write!(f, "{}:{}", self.namespace(), id),
      CacheKey::JobByTitle(title) => write!(f, "{}:{}", self.namespace(), title),
      CacheKey::JobByTitleAndId(title, id) => write!(f, "{}:{}#{}", self.namespace(), title, id),
      CacheKey::ByExperience(exp) => write!(f, "{}:{}", self.namespace(), exp),
      CacheKey::Latest => write!(f, "{}:latest", self.namespace()),
      CacheKey::ByCompany(company) => write!(f, "{}:{}", self.namespace(), company),
      CacheKey::Search(digest) => {
        write!(f, "{}:{}", self.namespace(), digest.get(..12).unwrap_or(digest))
      }
      CacheKey::TotalCount => write!(f, "{}:total", self.namespace()),
      CacheKey::CountsByType => write!(f, "{}:by_type", self.namespace()),
    }
  }
}

/// Canonical form of a search request. Field order is fixed and `None`
/// serializes as `null`.
#[derive(Serialize)]
struct SearchKeyInput<'a> {
  keyword: Option<&'a str>,
  location: Option<&'a str>,
  job_type: Option<&'a str>,
  company: Option<&'a str>,
  min_salary: Option<&'a str>,
  posted_from: Option<chrono::NaiveDate>,
  posted_to: Option<chrono::NaiveDate>,
  page: u32,
  size: u32,
  sort: SortField,
  direction: SortDirection,
}

fn search_digest(criteria: &SearchCriteria, page: &PageRequest) -> String {
  let input = SearchKeyInput {
    keyword: criteria.keyword.as_deref(),
    location: criteria.location.as_deref(),
    job_type: criteria.job_type.as_deref(),
    company: criteria.company.as_deref(),
    min_salary: criteria.min_salary.as_deref(),
    posted_from: criteria.posted_from,
    posted_to: criteria.posted_to,
    page: page.page,
    size: page.size,
    sort: page.sort,
    direction: page.direction,
  };

  // Serializing plain strings, dates and unit enums cannot fail
  let canonical = serde_json::to_vec(&input).unwrap_or_default();

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(&canonical);
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;

  fn criteria() -> SearchCriteria {
    SearchCriteria {
      keyword: Some("rust".to_string()),
      location: Some("Berlin".to_string()),
      posted_from: NaiveDate::from_ymd_opt(2024, 1, 1),
      ..Default::default()
    }
  }

  #[test]
  fn test_search_key_is_deterministic() {
    let page = PageRequest::default();
    assert_eq!(
      CacheKey::search(&criteria(), &page),
      CacheKey::search(&criteria(), &page)
    );
  }

  #[test]
  fn test_search_key_changes_with_every_input() {
    let page = PageRequest::default();
    let base = CacheKey::search(&criteria(), &page);

    let variants = vec![
      CacheKey::search(
        &SearchCriteria {
          keyword: Some("Rust".to_string()),
          ..criteria()
        },
        &page,
      ),
      CacheKey::search(
        &SearchCriteria {
          company: Some("Acme".to_string()),
          ..criteria()
        },
        &page,
      ),
      CacheKey::search(
        &SearchCriteria {
          posted_to: NaiveDate::from_ymd_opt(2024, 2, 1),
          ..criteria()
        },
        &page,
      ),
      CacheKey::search(&criteria(), &PageRequest { page: 1, ..page }),
      CacheKey::search(&criteria(), &PageRequest { size: 20, ..page }),
      CacheKey::search(&criteria(), &PageRequest { sort: SortField::Salary, ..page }),
      CacheKey::search(
        &criteria(),
        &PageRequest {
          direction: SortDirection::Asc,
          ..page
        },
      ),
    ];

    for variant in &variants {
      assert_ne!(&base, variant);
    }
  }

  #[test]
  fn test_null_and_empty_are_distinct() {
    let page = PageRequest::default();
    let absent = SearchCriteria::default();
    let empty = SearchCriteria {
      keyword: Some(String::new()),
      ..Default::default()
    };
    assert_ne!(CacheKey::search(&absent, &page), CacheKey::search(&empty, &page));
  }

  #[test]
  fn test_fields_do_not_bleed_into_each_other() {
    let page = PageRequest::default();
    let a = SearchCriteria {
      keyword: Some("acme".to_string()),
      ..Default::default()
    };
    let b = SearchCriteria {
      company: Some("acme".to_string()),
      ..Default::default()
    };
    assert_ne!(CacheKey::search(&a, &page), CacheKey::search(&b, &page));
  }

  #[test]
  fn test_case_insensitive_lookups_normalize() {
    assert_eq!(CacheKey::company("Acme Corp"), CacheKey::company("acme corp"));
    assert_eq!(CacheKey::title("QA Tester"), CacheKey::title("qa tester"));
    assert_eq!(
      CacheKey::title_and_id("QA Tester", JobId(3)),
      CacheKey::title_and_id("qa TESTER", JobId(3))
    );
    assert_ne!(
      CacheKey::title_and_id("QA Tester", JobId(3)),
      CacheKey::title_and_id("QA Tester", JobId(4))
    );
  }

  #[test]
  fn test_namespaces() {
    assert_eq!(CacheKey::JobById(JobId(1)).namespace(), Namespace::Job);
    assert_eq!(
      CacheKey::title_and_id("x", JobId(1)).namespace(),
      Namespace::JobByTitle
    );
    assert_eq!(CacheKey::TotalCount.namespace(), Namespace::JobCounts);
    for (i, ns) in Namespace::ALL.iter().enumerate() {
      assert_eq!(ns.index(), i);
    }
  }
}
