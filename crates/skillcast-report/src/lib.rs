//! skillcast-report — Renderers for cohort reports.
//!
//! JSON and Markdown live on [`skillcast_core::report::CohortReport`] itself;
//! this crate adds the self-contained HTML page and CSV exports.

pub mod html;
pub mod tables;

pub use html::{generate_html, write_html_report};
pub use tables::{write_assessments_csv, write_cohort_csv, write_forecast_csv};
