use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use jobcat::catalog::JobCatalog;
use jobcat::config::{Config, SearchConfig};
use jobcat::error::CatalogError;
use jobcat::logging;
use jobcat::model::{
  JobDraft, JobId, PageRequest, SearchCriteria, SortDirection, SortField,
};
use jobcat::store::SqliteJobStore;

#[derive(Parser, Debug)]
#[command(name = "jobcat")]
#[command(about = "A cached job-posting catalog")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jobcat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// SQLite database to use instead of the configured one
  #[arg(short, long)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List every job
  List,
  /// Show one job
  Get { id: JobId },
  /// Find the job with a title (hyphens read as spaces)
  Title {
    title: String,
    /// Disambiguate between jobs sharing the title
    #[arg(long)]
    id: Option<JobId>,
  },
  /// Jobs for an experience tier, newest first
  Experience { experience: String },
  /// Every job, newest first
  Latest,
  /// Jobs at a company
  Company { company: String },
  /// Job counts per job type
  Stats,
  /// Total number of jobs
  Count,
  /// Filtered, paginated search
  Search(SearchArgs),
  /// Create a job from a YAML or JSON file
  Create { file: PathBuf },
  /// Create every job in a YAML or JSON list, atomically
  Import { file: PathBuf },
  /// Overwrite a job from a YAML or JSON file
  Update { id: JobId, file: PathBuf },
  /// Delete a job
  Delete { id: JobId },
}

#[derive(ClapArgs, Debug)]
struct SearchArgs {
  /// Matches title, company or details
  #[arg(long)]
  keyword: Option<String>,
  #[arg(long)]
  location: Option<String>,
  #[arg(long)]
  job_type: Option<String>,
  #[arg(long)]
  company: Option<String>,
  #[arg(long)]
  min_salary: Option<String>,
  /// Earliest posting date (YYYY-MM-DD)
  #[arg(long)]
  posted_from: Option<chrono::NaiveDate>,
  /// Latest posting date (YYYY-MM-DD)
  #[arg(long)]
  posted_to: Option<chrono::NaiveDate>,
  #[arg(long, default_value_t = 0)]
  page: u32,
  #[arg(long)]
  size: Option<u32>,
  #[arg(long, default_value = "posted")]
  sort: SortField,
  #[arg(long, default_value = "desc")]
  direction: SortDirection,
}

impl SearchArgs {
  fn split(self, search: &SearchConfig) -> (SearchCriteria, PageRequest) {
    let page = PageRequest::new(self.page, search.page_size(self.size))
      .sorted_by(self.sort, self.direction);
    let criteria = SearchCriteria {
      keyword: self.keyword,
      location: self.location,
      job_type: self.job_type,
      company: self.company,
      min_salary: self.min_salary,
      posted_from: self.posted_from,
      posted_to: self.posted_to,
    };
    (criteria, page)
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let guard = logging::init(&config.logging)?;

  let db_path = match args.database {
    Some(path) => path,
    None => config.database_path()?,
  };
  debug!(path = %db_path.display(), "Opening job store");
  let store = SqliteJobStore::open(&db_path)?;
  let catalog = JobCatalog::new(store, config.cache.build());

  if let Err(e) = run(&catalog, &config, args.command).await {
    // Catalog conditions are user errors; no report or backtrace
    if let Some(err) = CatalogError::classify(&e) {
      eprintln!("{}", err);
      let code = if err.is_not_found() { 2 } else { 1 };
      drop(guard);
      std::process::exit(code);
    }
    return Err(e);
  }

  Ok(())
}

async fn run(catalog: &JobCatalog<SqliteJobStore>, config: &Config, command: Command) -> Result<()> {
  match command {
    Command::List => print(&catalog.list_all().await?),
    Command::Get { id } => print(&catalog.get_by_id(id).await?),
    Command::Title { title, id } => {
      let title = title.replace('-', " ");
      match id {
        Some(id) => print(&catalog.get_by_title_and_id(&title, id).await?),
        None => print(&catalog.get_by_title(&title).await?),
      }
    }
    Command::Experience { experience } => print(&catalog.get_by_experience(&experience).await?),
    Command::Latest => print(&catalog.get_latest().await?),
    Command::Company { company } => print(&catalog.get_by_company(&company).await?),
    Command::Stats => print(&catalog.count_by_type().await?),
    Command::Count => print(&catalog.count().await?),
    Command::Search(search) => {
      let (criteria, page) = search.split(&config.search);
      print(&catalog.search(&criteria, page).await?)
    }
    Command::Create { file } => {
      let draft: JobDraft = read_payload(&file)?;
      draft.validate()?;
      print(&catalog.create(draft).await?)
    }
    Command::Import { file } => {
      let drafts: Vec<JobDraft> = read_payload(&file)?;
      for draft in &drafts {
        draft.validate()?;
      }
      print(&catalog.create_all(drafts).await?)
    }
    Command::Update { id, file } => {
      let draft: JobDraft = read_payload(&file)?;
      draft.validate()?;
      print(&catalog.update(id, &draft).await?)
    }
    Command::Delete { id } => {
      catalog.delete(id).await?;
      println!("Deleted job {}", id);
      Ok(())
    }
  }
}

fn read_payload<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  serde_yaml::from_str(&contents).map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode output: {}", e))?;
  println!("{}", json);
  Ok(())
}
