//! Typed catalog conditions.
//!
//! These travel inside `color_eyre::Report` so store failures and catalog
//! conditions share one `Result`. Callers classify a report with
//! [`CatalogError::classify`].

use color_eyre::Report;
use thiserror::Error;

use crate::model::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
  /// No record matched the lookup.
  #[error("{entity} not found for {detail}")]
  NotFound { entity: &'static str, detail: String },

  /// A title lookup matched more than one record; the caller must use the id.
  #[error(
    "Multiple jobs ({matches}) found for title: {title}. Use the job id or the title/id lookup instead."
  )]
  AmbiguousTitle { title: String, matches: usize },

  /// A payload failed validation before reaching the catalog.
  #[error("Invalid {field}: {reason}")]
  Invalid { field: &'static str, reason: String },
}

impl CatalogError {
  pub fn job_id(id: JobId) -> Self {
    Self::NotFound {
      entity: "Job",
      detail: format!("jobId: {}", id),
    }
  }

  pub fn title(title: &str) -> Self {
    Self::NotFound {
      entity: "Job",
      detail: format!("title: {}", title),
    }
  }

  pub fn title_and_id(title: &str, id: JobId) -> Self {
    Self::NotFound {
      entity: "Job",
      detail: format!("title: {} and id: {}", title, id),
    }
  }

  /// Find the catalog condition inside a report, if there is one.
  ///
  /// Returns `None` for store failures and anything else that is not a
  /// catalog condition.
  pub fn classify(report: &Report) -> Option<&CatalogError> {
    report.downcast_ref::<CatalogError>()
  }

  /// True when the condition should be surfaced to clients as "not found".
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      CatalogError::NotFound { .. } | CatalogError::AmbiguousTitle { .. }
    )
  }
}
