//! skillcast-core — Assessment scoring, progress series, and forecasting.
//!
//! This crate defines the data model, score validation and aggregation, the
//! per-participant time series, and the trend forecaster that the rest of
//! skillcast builds on. Data flows
//!
//! raw scores → [`validator`] → [`aggregate`] ([`model::Assessment`]) →
//! [`series`] → [`forecast`]
//!
//! with [`engine`] running that pipeline over a whole cohort.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod model;
pub mod parser;
pub mod report;
pub mod series;
pub mod statistics;
pub mod traits;
pub mod validator;

pub use error::EngineError;
pub use forecast::{Forecast, ForecastConfig, ForecastEngine, ForecastModelKind, ForecastPoint};
pub use model::{Assessment, Category, CategoryScore, Dataset, Participant, RawScoreEntry};
pub use series::ParticipantSeries;
pub use validator::{MaximumPolicy, ScoreValidator};
