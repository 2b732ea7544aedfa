//! Job store trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::CatalogError;
use crate::filter::{Column, Filter, OrderBy};
use crate::model::{JobCounts, JobId, JobRecord, PageRequest};

/// Record store capability consumed by the catalog.
///
/// Each call is atomic on its own; `save_all` is atomic for the whole batch.
pub trait JobStore: Send + Sync + 'static {
  /// All records ordered by id.
  fn find_all(&self) -> Result<Vec<JobRecord>>;

  fn find_by_id(&self, id: JobId) -> Result<Option<JobRecord>>;

  /// All records matching `filter`, unpaged.
  fn find_where(&self, filter: &Filter, order: OrderBy) -> Result<Vec<JobRecord>>;

  /// One page of records matching `filter`, plus the total match count.
  fn find_page(&self, filter: &Filter, page: &PageRequest) -> Result<(Vec<JobRecord>, u64)>;

  fn count(&self) -> Result<u64>;

  /// Insert when `id` is `None` (assigning one), otherwise update in place.
  fn save(&self, job: JobRecord) -> Result<JobRecord>;

  fn save_all(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>>;

  /// Returns whether a row was removed.
  fn delete_by_id(&self, id: JobId) -> Result<bool>;

  /// Record counts per distinct value of `column`. Null values are skipped.
  fn count_grouped_by(&self, column: Column) -> Result<JobCounts>;
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
  conn: Mutex<Connection>,
}

impl SqliteJobStore {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    register_functions(&conn)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Replace SQLite's ASCII-only `lower()` with `str::to_lowercase`, so SQL
/// predicates fold case exactly like [`Filter::matches`] and the cache keys.
fn register_functions(conn: &Connection) -> Result<()> {
  conn
    .create_scalar_function(
      "lower",
      1,
      FunctionFlags::SQLITE_UTF8
        | FunctionFlags::SQLITE_DETERMINISTIC
        | FunctionFlags::SQLITE_INNOCUOUS,
      |ctx| {
        let value: Option<String> = ctx.get(0)?;
        Ok(value.map(|v| v.to_lowercase()))
      },
    )
    .map_err(|e| eyre!("Failed to register lower(): {}", e))
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    company TEXT NOT NULL,
    location TEXT NOT NULL,
    details TEXT NOT NULL,
    experience_required TEXT NOT NULL,
    experience TEXT,
    posted_date TEXT NOT NULL,
    posted_time TEXT,
    apply_link TEXT,
    salary TEXT NOT NULL,
    company_logo TEXT,
    job_type TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_posted ON jobs(posted_date, posted_time);
CREATE INDEX IF NOT EXISTS idx_jobs_title ON jobs(lower(title));
CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(lower(company));
CREATE INDEX IF NOT EXISTS idx_jobs_job_type ON jobs(lower(job_type));
CREATE INDEX IF NOT EXISTS idx_jobs_experience ON jobs(lower(experience));
CREATE INDEX IF NOT EXISTS idx_jobs_salary ON jobs(salary);
"#;

const SELECT_JOBS: &str = "SELECT id, title, company, location, details, experience_required, \
   experience, posted_date, posted_time, apply_link, salary, company_logo, job_type FROM jobs";

fn read_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
  Ok(JobRecord {
    id: Some(JobId(row.get(0)?)),
    title: row.get(1)?,
    company: row.get(2)?,
    location: row.get(3)?,
    details: row.get(4)?,
    experience_required: row.get(5)?,
    experience: row.get(6)?,
    posted_date: row.get(7)?,
    posted_time: row.get(8)?,
    apply_link: row.get(9)?,
    salary: row.get(10)?,
    company_logo: row.get(11)?,
    job_type: row.get(12)?,
  })
}

fn query_jobs(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<JobRecord>> {
  let mut stmt = conn
    .prepare(sql)
    .map_err(|e| eyre!("Failed to prepare job query: {}", e))?;

  let jobs = stmt
    .query_map(params_from_iter(params.iter()), read_job)
    .map_err(|e| eyre!("Failed to query jobs: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read job row: {}", e))?;

  Ok(jobs)
}

fn insert_job(conn: &Connection, mut job: JobRecord) -> Result<JobRecord> {
  conn
    .execute(
      "INSERT INTO jobs (title, company, location, details, experience_required, experience,
         posted_date, posted_time, apply_link, salary, company_logo, job_type)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        job.title,
        job.company,
        job.location,
        job.details,
        job.experience_required,
        job.experience,
        job.posted_date,
        job.posted_time,
        job.apply_link,
        job.salary,
        job.company_logo,
        job.job_type,
      ],
    )
    .map_err(|e| eyre!("Failed to insert job: {}", e))?;

  job.id = Some(JobId(conn.last_insert_rowid()));
  Ok(job)
}

fn update_job(conn: &Connection, id: JobId, job: JobRecord) -> Result<JobRecord> {
  let changed = conn
    .execute(
      "UPDATE jobs SET title = ?, company = ?, location = ?, details = ?,
         experience_required = ?, experience = ?, posted_date = ?, posted_time = ?,
         apply_link = ?, salary = ?, company_logo = ?, job_type = ?
       WHERE id = ?",
      params![
        job.title,
        job.company,
        job.location,
        job.details,
        job.experience_required,
        job.experience,
        job.posted_date,
        job.posted_time,
        job.apply_link,
        job.salary,
        job.company_logo,
        job.job_type,
        id.0,
      ],
    )
    .map_err(|e| eyre!("Failed to update job {}: {}", id, e))?;

  // Deleted since the caller read it
  if changed == 0 {
    return Err(CatalogError::job_id(id).into());
  }
  Ok(job)
}

fn save_job(conn: &Connection, job: JobRecord) -> Result<JobRecord> {
  match job.id {
    Some(id) => update_job(conn, id, job),
    None => insert_job(conn, job),
  }
}

impl JobStore for SqliteJobStore {
  fn find_all(&self) -> Result<Vec<JobRecord>> {
    let conn = self.lock()?;
    query_jobs(&conn, &format!("{}{}", SELECT_JOBS, OrderBy::ID.to_sql()), &[])
  }

  fn find_by_id(&self, id: JobId) -> Result<Option<JobRecord>> {
    let filter = Filter::all().and(crate::filter::Predicate::IdEquals(id));
    Ok(self.find_where(&filter, OrderBy::ID)?.into_iter().next())
  }

  fn find_where(&self, filter: &Filter, order: OrderBy) -> Result<Vec<JobRecord>> {
    let (where_clause, params) = filter.to_sql();
    let sql = format!("{}{}{}", SELECT_JOBS, where_clause, order.to_sql());

    let conn = self.lock()?;
    query_jobs(&conn, &sql, &params)
  }

  fn find_page(&self, filter: &Filter, page: &PageRequest) -> Result<(Vec<JobRecord>, u64)> {
    let (where_clause, mut params) = filter.to_sql();
    let conn = self.lock()?;

    let total: i64 = conn
      .query_row(
        &format!("SELECT COUNT(*) FROM jobs{}", where_clause),
        params_from_iter(params.iter()),
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count matching jobs: {}", e))?;

    // Past any page SQLite can address, so past the last row
    let Ok(offset) = i64::try_from(page.offset()) else {
      return Ok((Vec::new(), total as u64));
    };

    let sql = format!(
      "{}{}{} LIMIT ? OFFSET ?",
      SELECT_JOBS,
      where_clause,
      OrderBy::from(page).to_sql()
    );
    params.push(Value::Integer(i64::from(page.size)));
    params.push(Value::Integer(offset));
    let jobs = query_jobs(&conn, &sql, &params)?;

    Ok((jobs, total as u64))
  }

  fn count(&self) -> Result<u64> {
    let conn = self.lock()?;
    let total: i64 = conn
      .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count jobs: {}", e))?;
    Ok(total as u64)
  }

  fn save(&self, job: JobRecord) -> Result<JobRecord> {
    let conn = self.lock()?;
    save_job(&conn, job)
  }

  fn save_all(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let saved = jobs
      .into_iter()
      .map(|job| save_job(&tx, job))
      .collect::<Result<Vec<_>>>()?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(saved)
  }

  fn delete_by_id(&self, id: JobId) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM jobs WHERE id = ?", params![id.0])
      .map_err(|e| eyre!("Failed to delete job {}: {}", id, e))?;
    Ok(removed > 0)
  }

  fn count_grouped_by(&self, column: Column) -> Result<JobCounts> {
    let col = column.sql_name();
    let sql = format!(
      "SELECT {col}, COUNT(*) FROM jobs WHERE {col} IS NOT NULL GROUP BY {col}",
      col = col
    );

    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare count query: {}", e))?;

    let counts = stmt
      .query_map([], |row| {
        let label: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((label, count as u64))
      })
      .map_err(|e| eyre!("Failed to count jobs by {}: {}", col, e))?
      .collect::<rusqlite::Result<JobCounts>>()
      .map_err(|e| eyre!("Failed to read count row: {}", e))?;

    Ok(counts)
  }
}
