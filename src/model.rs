//! Catalog domain types.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Store-assigned job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for JobId {
  type Err = std::num::ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim().parse().map(JobId)
  }
}

/// A job posting as held by the store.
///
/// `id` is `None` only before the first save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
  pub id: Option<JobId>,
  pub title: String,
  pub company: String,
  pub location: String,
  pub details: String,
  /// Experience label such as "3-5 years"
  pub experience_required: String,
  /// Free-form experience tag used for tier lookups
  pub experience: Option<String>,
  pub posted_date: NaiveDate,
  pub posted_time: Option<NaiveTime>,
  pub apply_link: Option<String>,
  /// Free text; compared byte-wise, never numerically
  pub salary: String,
  pub company_logo: Option<String>,
  pub job_type: String,
}

impl JobRecord {
  /// Posting timestamp; a missing time part means midnight.
  pub fn posted_at(&self) -> NaiveDateTime {
    self
      .posted_date
      .and_time(self.posted_time.unwrap_or(NaiveTime::MIN))
  }
}

/// Create/update payload for a job posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDraft {
  pub title: String,
  pub company: String,
  pub location: String,
  pub details: String,
  pub experience_required: String,
  #[serde(default)]
  pub experience: Option<String>,
  /// Defaults to "now" on create; ignored on update
  #[serde(default)]
  pub posted_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub apply_link: Option<String>,
  pub salary: String,
  #[serde(default)]
  pub company_logo: Option<String>,
  pub job_type: String,
}

impl JobDraft {
  /// Check the payload constraints a record must satisfy before it is stored.
  pub fn validate(&self) -> Result<(), CatalogError> {
    check_len("title", &self.title, 3, 100)?;
    check_len("company", &self.company, 3, 100)?;
    check_len("location", &self.location, 3, 100)?;
    check_len("details", &self.details, 1, usize::MAX)?;
    check_len("experience_required", &self.experience_required, 1, 50)?;
    check_len("salary", &self.salary, 1, usize::MAX)?;
    check_len("job_type", &self.job_type, 3, 50)?;

    if let Some(link) = self.apply_link.as_deref().filter(|l| !l.is_empty()) {
      url::Url::parse(link).map_err(|e| CatalogError::Invalid {
        field: "apply_link",
        reason: format!("must be a valid URL ({})", e),
      })?;
    }

    Ok(())
  }

  /// Build a new, unsaved record. A missing posting time becomes `now`.
  pub fn into_record(self, now: NaiveDateTime) -> JobRecord {
    let posted_at = self.posted_at.unwrap_or(now);
    JobRecord {
      id: None,
      title: self.title,
      company: self.company,
      location: self.location,
      details: self.details,
      experience_required: self.experience_required,
      experience: self.experience,
      posted_date: posted_at.date(),
      posted_time: Some(posted_at.time()),
      apply_link: self.apply_link,
      salary: self.salary,
      company_logo: self.company_logo,
      job_type: self.job_type,
    }
  }

  /// Copy the mutable fields onto an existing record. Id and posting time stay.
  pub fn apply_to(&self, record: &mut JobRecord) {
    record.title = self.title.clone();
    record.company = self.company.clone();
    record.location = self.location.clone();
    record.details = self.details.clone();
    record.experience_required = self.experience_required.clone();
    record.experience = self.experience.clone();
    record.apply_link = self.apply_link.clone();
    record.salary = self.salary.clone();
    record.company_logo = self.company_logo.clone();
    record.job_type = self.job_type.clone();
  }
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), CatalogError> {
  let value = value.trim();
  if value.is_empty() {
    return Err(CatalogError::Invalid {
      field,
      reason: "is required".to_string(),
    });
  }
  let len = value.chars().count();
  if len < min || len > max {
    return Err(CatalogError::Invalid {
      field,
      reason: format!("must be between {} and {} characters", min, max),
    });
  }
  Ok(())
}

/// Local wall-clock time, the default posting timestamp.
pub fn now() -> NaiveDateTime {
  Local::now().naive_local()
}

/// Optional search filters. `None` means "no constraint on this dimension".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchCriteria {
  pub keyword: Option<String>,
  pub location: Option<String>,
  pub job_type: Option<String>,
  pub company: Option<String>,
  pub min_salary: Option<String>,
  pub posted_from: Option<NaiveDate>,
  pub posted_to: Option<NaiveDate>,
}

/// Sortable record fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
  Id,
  Title,
  Company,
  Location,
  Salary,
  JobType,
  #[default]
  Posted,
}

impl FromStr for SortField {
  type Err = CatalogError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "id" => Ok(SortField::Id),
      "title" | "jobtitle" | "job_title" => Ok(SortField::Title),
      "company" => Ok(SortField::Company),
      "location" => Ok(SortField::Location),
      "salary" => Ok(SortField::Salary),
      "jobtype" | "job_type" | "type" => Ok(SortField::JobType),
      "posted" | "createddate" | "created" | "date" => Ok(SortField::Posted),
      other => Err(CatalogError::Invalid {
        field: "sort",
        reason: format!("unknown sort field '{}'", other),
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

impl SortDirection {
  pub fn as_sql(&self) -> &'static str {
    match self {
      SortDirection::Asc => "ASC",
      SortDirection::Desc => "DESC",
    }
  }
}

impl FromStr for SortDirection {
  type Err = CatalogError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "asc" => Ok(SortDirection::Asc),
      "desc" => Ok(SortDirection::Desc),
      other => Err(CatalogError::Invalid {
        field: "direction",
        reason: format!("expected ASC or DESC, got '{}'", other),
      }),
    }
  }
}

/// Skip/limit pagination plus a single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
  /// Zero-based page index
  pub page: u32,
  pub size: u32,
  pub sort: SortField,
  pub direction: SortDirection,
}

impl PageRequest {
  pub fn new(page: u32, size: u32) -> Self {
    Self {
      page,
      size,
      ..Self::default()
    }
  }

  pub fn sorted_by(mut self, sort: SortField, direction: SortDirection) -> Self {
    self.sort = sort;
    self.direction = direction;
    self
  }

  pub fn offset(&self) -> u64 {
    u64::from(self.page) * u64::from(self.size)
  }
}

impl Default for PageRequest {
  fn default() -> Self {
    Self {
      page: 0,
      size: 10,
      sort: SortField::default(),
      direction: SortDirection::default(),
    }
  }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPage {
  pub content: Vec<JobRecord>,
  pub page: u32,
  pub size: u32,
  pub total_elements: u64,
}

impl JobPage {
  pub fn total_pages(&self) -> u64 {
    if self.size == 0 {
      return 0;
    }
    self.total_elements.div_ceil(u64::from(self.size))
  }
}

/// Record counts keyed by a grouping label (e.g. job type).
pub type JobCounts = BTreeMap<String, u64>;
