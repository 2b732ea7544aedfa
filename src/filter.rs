//! Predicate builder for job searches.
//!
//! A [`SearchCriteria`] is turned into a [`Filter`]: a conjunction of
//! independent [`Predicate`]s, one per present criterion. Each rule in
//! [`RULES`] looks at exactly one criterion, so rules can be tested alone.
//!
//! A filter is translated into a single SQL `WHERE` clause so the store does
//! the filtering. [`Filter::matches`] evaluates the same semantics in memory.

use chrono::NaiveDate;
use rusqlite::types::Value;

use crate::model::{JobId, JobRecord, PageRequest, SearchCriteria, SortDirection, SortField};

/// Text columns a predicate can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
  Title,
  Company,
  Location,
  Details,
  Experience,
  Salary,
  JobType,
}

impl Column {
  pub fn sql_name(&self) -> &'static str {
    match self {
      Column::Title => "title",
      Column::Company => "company",
      Column::Location => "location",
      Column::Details => "details",
      Column::Experience => "experience",
      Column::Salary => "salary",
      Column::JobType => "job_type",
    }
  }

  /// The record's value for this column.
  pub fn value<'a>(&self, job: &'a JobRecord) -> Option<&'a str> {
    match self {
      Column::Title => Some(&job.title),
      Column::Company => Some(&job.company),
      Column::Location => Some(&job.location),
      Column::Details => Some(&job.details),
      Column::Experience => job.experience.as_deref(),
      Column::Salary => Some(&job.salary),
      Column::JobType => Some(&job.job_type),
    }
  }
}

/// A single boolean condition over a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
  /// Case-insensitive substring match in any of the columns
  ContainsIgnoreCase { columns: Vec<Column>, needle: String },
  /// Case-insensitive exact match
  EqualsIgnoreCase { column: Column, value: String },
  /// Byte-wise string comparison, `column >= value`
  AtLeast { column: Column, value: String },
  PostedOnOrAfter(NaiveDate),
  PostedOnOrBefore(NaiveDate),
  IdEquals(JobId),
}

impl Predicate {
  pub fn contains(columns: &[Column], needle: &str) -> Self {
    Predicate::ContainsIgnoreCase {
      columns: columns.to_vec(),
      needle: needle.to_lowercase(),
    }
  }

  pub fn equals(column: Column, value: &str) -> Self {
    Predicate::EqualsIgnoreCase {
      column,
      value: value.to_lowercase(),
    }
  }

  /// Append this predicate's SQL to `sql`, pushing its parameters in order.
  fn write_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
    match self {
      Predicate::ContainsIgnoreCase { columns, needle } => {
        let pattern = like_pattern(needle);
        let clauses: Vec<String> = columns
          .iter()
          .map(|c| {
            params.push(Value::Text(pattern.clone()));
            format!("lower({}) LIKE ? ESCAPE '\\'", c.sql_name())
          })
          .collect();
        sql.push('(');
        sql.push_str(&clauses.join(" OR "));
        sql.push(')');
      }
      Predicate::EqualsIgnoreCase { column, value } => {
        params.push(Value::Text(value.clone()));
        sql.push_str(&format!("lower({}) = ?", column.sql_name()));
      }
      Predicate::AtLeast { column, value } => {
        params.push(Value::Text(value.clone()));
        sql.push_str(&format!("{} >= ?", column.sql_name()));
      }
      Predicate::PostedOnOrAfter(date) => {
        params.push(Value::Text(date.to_string()));
        sql.push_str("posted_date >= ?");
      }
      Predicate::PostedOnOrBefore(date) => {
        params.push(Value::Text(date.to_string()));
        sql.push_str("posted_date <= ?");
      }
      Predicate::IdEquals(id) => {
        params.push(Value::Integer(id.0));
        sql.push_str("id = ?");
      }
    }
  }

  /// Evaluate against an in-memory record.
  pub fn matches(&self, job: &JobRecord) -> bool {
    match self {
      Predicate::ContainsIgnoreCase { columns, needle } => columns.iter().any(|c| {
        c.value(job)
          .map(|v| v.to_lowercase().contains(needle.as_str()))
          .unwrap_or(false)
      }),
      Predicate::EqualsIgnoreCase { column, value } => column
        .value(job)
        .map(|v| v.to_lowercase() == *value)
        .unwrap_or(false),
      Predicate::AtLeast { column, value } => column
        .value(job)
        .map(|v| v >= value.as_str())
        .unwrap_or(false),
      Predicate::PostedOnOrAfter(date) => job.posted_date >= *date,
      Predicate::PostedOnOrBefore(date) => job.posted_date <= *date,
      Predicate::IdEquals(id) => job.id == Some(*id),
    }
  }
}

/// Escape LIKE wildcards so user text matches literally.
fn like_pattern(needle: &str) -> String {
  let mut pattern = String::with_capacity(needle.len() + 2);
  pattern.push('%');
  for ch in needle.chars() {
    if matches!(ch, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(ch);
  }
  pattern.push('%');
  pattern
}

type Rule = fn(&SearchCriteria) -> Option<Predicate>;

/// One rule per criterion, applied in order.
pub const RULES: [Rule; 7] = [
  keyword_rule,
  location_rule,
  job_type_rule,
  company_rule,
  min_salary_rule,
  posted_from_rule,
  posted_to_rule,
];

/// A criterion counts only when present and not blank.
fn present(value: &Option<String>) -> Option<&str> {
  value.as_deref().filter(|v| !v.trim().is_empty())
}

fn keyword_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  present(&criteria.keyword)
    .map(|kw| Predicate::contains(&[Column::Title, Column::Company, Column::Details], kw))
}

fn location_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  present(&criteria.location).map(|loc| Predicate::contains(&[Column::Location], loc))
}

fn job_type_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  present(&criteria.job_type).map(|t| Predicate::equals(Column::JobType, t))
}

fn company_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  present(&criteria.company).map(|c| Predicate::equals(Column::Company, c))
}

/// Salaries are free text, so "9000" sorts after "10000". Callers must send
/// comparably formatted values.
fn min_salary_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  present(&criteria.min_salary).map(|s| Predicate::AtLeast {
    column: Column::Salary,
    value: s.to_string(),
  })
}

fn posted_from_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  criteria.posted_from.map(Predicate::PostedOnOrAfter)
}

fn posted_to_rule(criteria: &SearchCriteria) -> Option<Predicate> {
  criteria.posted_to.map(Predicate::PostedOnOrBefore)
}

/// Conjunction of predicates. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
  predicates: Vec<Predicate>,
}

impl Filter {
  /// A filter with no predicates.
  pub fn all() -> Self {
    Self::default()
  }

  pub fn from_criteria(criteria: &SearchCriteria) -> Self {
    Self {
      predicates: RULES.iter().filter_map(|rule| rule(criteria)).collect(),
    }
  }

  pub fn and(mut self, predicate: Predicate) -> Self {
    self.predicates.push(predicate);
    self
  }

  pub fn predicates(&self) -> &[Predicate] {
    &self.predicates
  }

  pub fn is_empty(&self) -> bool {
    self.predicates.is_empty()
  }

  /// Render as a `WHERE` clause (empty string when there are no predicates)
  /// plus its positional parameters.
  pub fn to_sql(&self) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    if self.predicates.is_empty() {
      return (String::new(), params);
    }

    let mut sql = String::from(" WHERE ");
    for (i, predicate) in self.predicates.iter().enumerate() {
      if i > 0 {
        sql.push_str(" AND ");
      }
      predicate.write_sql(&mut sql, &mut params);
    }
    (sql, params)
  }

  pub fn matches(&self, job: &JobRecord) -> bool {
    self.predicates.iter().all(|p| p.matches(job))
  }
}

/// Result ordering for store queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
  pub field: SortField,
  pub direction: SortDirection,
}

impl OrderBy {
  pub const ID: OrderBy = OrderBy {
    field: SortField::Id,
    direction: SortDirection::Asc,
  };

  pub const NEWEST_FIRST: OrderBy = OrderBy {
    field: SortField::Posted,
    direction: SortDirection::Desc,
  };

  /// Render as an `ORDER BY` clause. Ties are broken by id so paging is stable.
  pub fn to_sql(&self) -> String {
    let dir = self.direction.as_sql();
    match self.field {
      SortField::Id => format!(" ORDER BY id {}", dir),
      SortField::Posted => format!(
        " ORDER BY posted_date {dir}, COALESCE(posted_time, '00:00:00') {dir}, id {dir}",
        dir = dir
      ),
      SortField::Title => format!(" ORDER BY title {dir}, id {dir}", dir = dir),
      SortField::Company => format!(" ORDER BY company {dir}, id {dir}", dir = dir),
      SortField::Location => format!(" ORDER BY location {dir}, id {dir}", dir = dir),
      SortField::Salary => format!(" ORDER BY salary {dir}, id {dir}", dir = dir),
      SortField::JobType => format!(" ORDER BY job_type {dir}, id {dir}", dir = dir),
    }
  }
}

impl From<&PageRequest> for OrderBy {
  fn from(page: &PageRequest) -> Self {
    OrderBy {
      field: page.sort,
      direction: page.direction,
    }
  }
}
