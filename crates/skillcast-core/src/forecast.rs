//! Trend forecasting over a participant's total-percent history.
//!
//! The engine turns a [`ParticipantSeries`] into `(days since first
//! assessment, total_percent)` points, fits a [`TrendModel`] and projects one
//! estimate per calendar day with a prediction band. Models are swappable
//! behind [`TrendModel`] / [`FittedTrend`]; two ship here:
//!
//! - `linear`: ordinary least squares.
//! - `robust`: Theil–Sen median slope, resistant to a single bad assessment.
//!
//! Both use the band `point ± q·σ·sqrt(1 + 1/n + (x − x̄)²/Sxx)`, where σ is the
//! residual scale floored at `sigma_floor` and q is the two-sided Student-t
//! quantile (normal when there are no residual degrees of freedom).

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::Assessment;
use crate::series::ParticipantSeries;
use crate::statistics::{self, Design, Line};

/// Below this residual scale a fit is reported as exact.
const EXACT_FIT_EPSILON: f64 = 1e-9;

/// Consistency constant turning a MAD into a normal standard deviation.
const MAD_SCALE: f64 = 1.4826;

/// One observation in model coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    /// Days since the first assessment.
    pub x: f64,
    /// Total percent.
    pub y: f64,
}

/// A point estimate and its prediction band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Parameters of a fitted trend, for display and sanity checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendDiagnostics {
    pub intercept: f64,
    pub slope_per_day: f64,
    /// Residual scale before flooring.
    pub residual_sigma: f64,
    /// Scale actually used for the band.
    pub sigma: f64,
    pub degrees_of_freedom: usize,
    pub sigma_floor_applied: bool,
    /// Every observation lies on the fitted line.
    pub exact_fit: bool,
}

impl TrendDiagnostics {
    fn is_finite(&self) -> bool {
        [self.intercept, self.slope_per_day, self.residual_sigma, self.sigma]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// A trend fitted to a set of points.
pub trait FittedTrend: Send + Sync + fmt::Debug {
    /// Estimate at `x` with a central band covering `level`.
    fn estimate(&self, x: f64, level: f64) -> Estimate;

    fn diagnostics(&self) -> TrendDiagnostics;
}

/// A family of trend models.
pub trait TrendModel: Send + Sync {
    /// Short name reported in diagnostics and used in cache keys.
    fn name(&self) -> &'static str;

    /// Fit to `points`, which always span at least two distinct x values.
    fn fit(&self, points: &[TrendPoint]) -> Result<Box<dyn FittedTrend>, EngineError>;
}

/// Built-in model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModelKind {
    #[default]
    Linear,
    Robust,
}

impl ForecastModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastModelKind::Linear => "linear",
            ForecastModelKind::Robust => "robust",
        }
    }

    /// Instantiate the model.
    pub fn build(self, sigma_floor: f64) -> Box<dyn TrendModel> {
        match self {
            ForecastModelKind::Linear => Box::new(LinearTrend { sigma_floor }),
            ForecastModelKind::Robust => Box::new(RobustTrend { sigma_floor }),
        }
    }
}

impl fmt::Display for ForecastModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" | "ols" => Ok(ForecastModelKind::Linear),
            "robust" | "theil-sen" | "theil_sen" => Ok(ForecastModelKind::Robust),
            other => Err(format!(
                "unknown forecast model '{other}' (expected linear or robust)"
            )),
        }
    }
}

/// Forecast settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Calendar days to project past the last assessment.
    pub horizon_days: u32,
    /// Coverage of the prediction band, in (0, 1).
    pub interval_level: f64,
    /// Minimum σ in percentage points.
    pub sigma_floor: f64,
    pub model: ForecastModelKind,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            interval_level: 0.8,
            sigma_floor: 1.0,
            model: ForecastModelKind::Linear,
        }
    }
}

impl ForecastConfig {
    fn check(&self) -> Result<(), EngineError> {
        if !(self.interval_level > 0.0 && self.interval_level < 1.0) {
            return Err(EngineError::FitFailure(format!(
                "interval level {} is outside (0, 1)",
                self.interval_level
            )));
        }
        if !self.sigma_floor.is_finite() || self.sigma_floor < 0.0 {
            return Err(EngineError::FitFailure(format!(
                "sigma floor {} must be a non-negative number",
                self.sigma_floor
            )));
        }
        Ok(())
    }
}

/// One dated estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDiagnostics {
    pub model: String,
    pub observations: usize,
    pub distinct_dates: usize,
    #[serde(flatten)]
    pub trend: TrendDiagnostics,
}

/// Projection of a series past its last assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// One point per calendar day after the last observed date.
    pub points: Vec<ForecastPoint>,
    /// Model values at each distinct observed date.
    pub fitted: Vec<ForecastPoint>,
    pub horizon_days: u32,
    pub interval_level: f64,
    pub diagnostics: ForecastDiagnostics,
}

impl Forecast {
    /// Estimate on the final forecast day.
    pub fn last_point(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }
}

/// A model fitted to one series, ready for [`ForecastEngine::predict`].
#[derive(Debug)]
pub struct FittedSeries {
    origin: NaiveDate,
    dates: Vec<NaiveDate>,
    observations: usize,
    model: &'static str,
    trend: Box<dyn FittedTrend>,
}

impl FittedSeries {
    /// Date of the first assessment; x = 0.
    pub fn origin(&self) -> NaiveDate {
        self.origin
    }

    /// Distinct observed dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// The fitted model, for estimates at arbitrary day offsets.
    pub fn trend(&self) -> &dyn FittedTrend {
        self.trend.as_ref()
    }

    fn last_date(&self) -> NaiveDate {
        self.dates.last().copied().unwrap_or(self.origin)
    }

    fn x(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64
    }
}

/// Fits and projects participant series.
pub struct ForecastEngine {
    model: Box<dyn TrendModel>,
    config: ForecastConfig,
}

impl fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl ForecastEngine {
    /// Engine using the built-in model named by `config.model`.
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            model: config.model.build(config.sigma_floor),
            config,
        }
    }

    /// Engine using a custom model. `config.model` is ignored.
    pub fn with_model(model: Box<dyn TrendModel>, config: ForecastConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Fit and project over the configured horizon.
    pub fn forecast(&self, series: &ParticipantSeries) -> Result<Forecast, EngineError> {
        self.forecast_with_horizon(series, self.config.horizon_days)
    }

    pub fn forecast_with_horizon(
        &self,
        series: &ParticipantSeries,
        horizon_days: u32,
    ) -> Result<Forecast, EngineError> {
        let fitted = self.fit(series)?;
        self.predict(&fitted, horizon_days)
    }

    /// Fit the model to a series.
    ///
    /// Needs at least two assessments on distinct dates.
    pub fn fit(&self, series: &ParticipantSeries) -> Result<FittedSeries, EngineError> {
        self.config.check()?;

        let mut dates = series.dates();
        dates.dedup();
        if dates.len() < 2 {
            return Err(EngineError::InsufficientData {
                points: series.len(),
                distinct_dates: dates.len(),
            });
        }
        let origin = dates[0];

        let points: Vec<TrendPoint> = series
            .iter()
            .map(|a: &Assessment| TrendPoint {
                x: (a.date() - origin).num_days() as f64,
                y: a.total_percent(),
            })
            .collect();
        if let Some(bad) = points.iter().find(|p| !p.y.is_finite()) {
            return Err(EngineError::FitFailure(format!(
                "non-finite total percent {} at day {}",
                bad.y, bad.x
            )));
        }

        let trend = self.model.fit(&points)?;
        let diagnostics = trend.diagnostics();
        if !diagnostics.is_finite() {
            return Err(EngineError::FitFailure(format!(
                "{} model produced non-finite parameters",
                self.model.name()
            )));
        }

        tracing::debug!(
            model = self.model.name(),
            observations = points.len(),
            slope_per_day = diagnostics.slope_per_day,
            sigma = diagnostics.sigma,
            "fitted trend"
        );

        Ok(FittedSeries {
            origin,
            dates,
            observations: points.len(),
            model: self.model.name(),
            trend,
        })
    }

    /// Project `horizon_days` calendar days past the last observed date.
    pub fn predict(
        &self,
        fitted: &FittedSeries,
        horizon_days: u32,
    ) -> Result<Forecast, EngineError> {
        self.config.check()?;
        let level = self.config.interval_level;

        let history = fitted
            .dates
            .iter()
            .map(|&date| point_at(fitted, date, level))
            .collect::<Result<Vec<_>, _>>()?;

        let last = fitted.last_date();
        let points = (1..=u64::from(horizon_days))
            .map(|offset| {
                let date = last.checked_add_days(Days::new(offset)).ok_or_else(|| {
                    EngineError::FitFailure(format!(
                        "forecast date {offset} day(s) after {last} is out of range"
                    ))
                })?;
                point_at(fitted, date, level)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Forecast {
            points,
            fitted: history,
            horizon_days,
            interval_level: level,
            diagnostics: ForecastDiagnostics {
                model: fitted.model.to_string(),
                observations: fitted.observations,
                distinct_dates: fitted.dates.len(),
                trend: fitted.trend.diagnostics(),
            },
        })
    }
}

fn point_at(
    fitted: &FittedSeries,
    date: NaiveDate,
    level: f64,
) -> Result<ForecastPoint, EngineError> {
    let Estimate {
        point,
        lower,
        upper,
    } = fitted.trend().estimate(fitted.x(date), level);

    if !(point.is_finite() && lower.is_finite() && upper.is_finite()) {
        return Err(EngineError::FitFailure(format!(
            "non-finite estimate on {date}"
        )));
    }
    if !(lower <= point && point <= upper) {
        return Err(EngineError::FitFailure(format!(
            "unordered prediction band on {date}: {lower} / {point} / {upper}"
        )));
    }

    Ok(ForecastPoint {
        date,
        point_estimate: point,
        lower_bound: lower,
        upper_bound: upper,
    })
}

/// A straight line with a symmetric prediction band.
#[derive(Debug, Clone, Copy)]
struct FittedLine {
    line: Line,
    design: Design,
    diagnostics: TrendDiagnostics,
}

impl FittedLine {
    fn new(line: Line, design: Design, residual_sigma: f64, sigma_floor: f64) -> Self {
        let sigma = residual_sigma.max(sigma_floor);
        Self {
            line,
            design,
            diagnostics: TrendDiagnostics {
                intercept: line.intercept,
                slope_per_day: line.slope,
                residual_sigma,
                sigma,
                degrees_of_freedom: design.degrees_of_freedom(),
                sigma_floor_applied: residual_sigma < sigma_floor,
                exact_fit: residual_sigma <= EXACT_FIT_EPSILON,
            },
        }
    }
}

impl FittedTrend for FittedLine {
    fn estimate(&self, x: f64, level: f64) -> Estimate {
        let point = self.line.at(x);
        let q = statistics::two_sided_quantile(level, self.diagnostics.degrees_of_freedom);
        let half_width = q * self.diagnostics.sigma * self.design.prediction_factor(x);
        Estimate {
            point,
            lower: point - half_width,
            upper: point + half_width,
        }
    }

    fn diagnostics(&self) -> TrendDiagnostics {
        self.diagnostics
    }
}

fn singular() -> EngineError {
    EngineError::FitFailure("all observations share one date".into())
}

/// Ordinary least squares.
#[derive(Debug, Clone, Copy)]
pub struct LinearTrend {
    pub sigma_floor: f64,
}

impl TrendModel for LinearTrend {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(&self, points: &[TrendPoint]) -> Result<Box<dyn FittedTrend>, EngineError> {
        let design = Design::of(points).ok_or_else(singular)?;
        let line = statistics::least_squares(points, &design);

        let df = design.degrees_of_freedom();
        let residual_sigma = if df == 0 {
            0.0
        } else {
            let ssr: f64 = line.residuals(points).iter().map(|r| r * r).sum();
            (ssr / df as f64).sqrt()
        };

        Ok(Box::new(FittedLine::new(
            line,
            design,
            residual_sigma,
            self.sigma_floor,
        )))
    }
}

/// Theil–Sen median-slope estimator with a MAD residual scale.
#[derive(Debug, Clone, Copy)]
pub struct RobustTrend {
    pub sigma_floor: f64,
}

impl TrendModel for RobustTrend {
    fn name(&self) -> &'static str {
        "robust"
    }

    fn fit(&self, points: &[TrendPoint]) -> Result<Box<dyn FittedTrend>, EngineError> {
        let design = Design::of(points).ok_or_else(singular)?;
        let line = statistics::theil_sen(points).ok_or_else(singular)?;
        let residual_sigma = statistics::median_absolute_deviation(&line.residuals(points))
            .map(|mad| MAD_SCALE * mad)
            .unwrap_or_default();

        Ok(Box::new(FittedLine::new(
            line,
            design,
            residual_sigma,
            self.sigma_floor,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, RawScoreEntry};
    use crate::series::order;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(day: NaiveDate, percent: f64) -> Assessment {
        let entry = RawScoreEntry::from_pairs(Category::ALL.map(|c| (c, percent, 100.0))).unwrap();
        Assessment::new("p", day, entry)
    }

    fn series(points: &[(&str, f64)]) -> ParticipantSeries {
        order(points.iter().map(|&(d, p)| at(date(d), p)))
    }

    fn increasing() -> ParticipantSeries {
        series(&[
            ("2024-01-01", 40.0),
            ("2024-01-11", 47.0),
            ("2024-01-21", 51.0),
            ("2024-02-05", 60.0),
            ("2024-02-20", 64.0),
        ])
    }

    fn assert_ordered(forecast: &Forecast) {
        for p in forecast.points.iter().chain(&forecast.fitted) {
            assert!(p.lower_bound <= p.point_estimate, "{p:?}");
            assert!(p.point_estimate <= p.upper_bound, "{p:?}");
        }
    }

    #[test]
    fn flat_two_point_series_stays_flat() {
        let engine = ForecastEngine::default();
        let forecast = engine
            .forecast(&series(&[("2024-01-01", 50.0), ("2024-02-01", 50.0)]))
            .unwrap();

        assert_eq!(forecast.points.len(), 30);
        for p in &forecast.points {
            assert!((p.point_estimate - 50.0).abs() < 1e-6);
        }
        assert_ordered(&forecast);
        assert!(forecast.diagnostics.trend.exact_fit);
        assert!(forecast.diagnostics.trend.sigma_floor_applied);
        assert_eq!(forecast.diagnostics.trend.degrees_of_freedom, 0);
    }

    #[test]
    fn one_point_is_insufficient() {
        let err = ForecastEngine::default()
            .forecast(&series(&[("2024-01-01", 50.0)]))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientData {
                points: 1,
                distinct_dates: 1
            }
        );
    }

    #[test]
    fn same_day_points_are_insufficient() {
        let err = ForecastEngine::default()
            .forecast(&series(&[("2024-01-01", 50.0), ("2024-01-01", 70.0)]))
            .unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(ForecastEngine::default()
            .forecast(&ParticipantSeries::default())
            .unwrap_err()
            .is_insufficient_data());
    }

    #[test]
    fn increasing_series_trends_up_for_both_models() {
        for kind in [ForecastModelKind::Linear, ForecastModelKind::Robust] {
            let engine = ForecastEngine::new(ForecastConfig {
                model: kind,
                ..ForecastConfig::default()
            });
            let forecast = engine.forecast(&increasing()).unwrap();
            assert!(forecast.diagnostics.trend.slope_per_day > 0.0, "{kind}");
            assert_eq!(forecast.diagnostics.model, kind.as_str());
            for pair in forecast.points.windows(2) {
                assert!(pair[1].point_estimate >= pair[0].point_estimate - 1e-9);
            }
            assert_ordered(&forecast);
        }
    }

    #[test]
    fn points_are_consecutive_days_after_last_observation() {
        let forecast = ForecastEngine::default()
            .forecast_with_horizon(&increasing(), 7)
            .unwrap();
        assert_eq!(forecast.horizon_days, 7);
        assert_eq!(forecast.points.len(), 7);
        assert_eq!(forecast.points[0].date, date("2024-02-21"));
        assert_eq!(forecast.last_point().unwrap().date, date("2024-02-27"));
        assert_eq!(forecast.fitted.len(), 5);
        assert_eq!(forecast.fitted[0].date, date("2024-01-01"));
    }

    #[test]
    fn band_widens_with_distance() {
        let forecast = ForecastEngine::default().forecast(&increasing()).unwrap();
        let width = |p: &ForecastPoint| p.upper_bound - p.lower_bound;
        let first = width(&forecast.points[0]);
        let last = width(forecast.last_point().unwrap());
        assert!(last > first);
    }

    #[test]
    fn duplicate_dates_collapse_in_fitted_history() {
        let s = series(&[
            ("2024-01-01", 40.0),
            ("2024-01-01", 44.0),
            ("2024-01-10", 50.0),
        ]);
        let forecast = ForecastEngine::default().forecast(&s).unwrap();
        assert_eq!(forecast.fitted.len(), 2);
        assert_eq!(forecast.diagnostics.observations, 3);
        assert_eq!(forecast.diagnostics.distinct_dates, 2);
    }

    #[test]
    fn robust_model_resists_an_outlier() {
        let s = series(&[
            ("2024-01-01", 40.0),
            ("2024-01-02", 41.0),
            ("2024-01-03", 5.0),
            ("2024-01-04", 43.0),
            ("2024-01-05", 44.0),
        ]);
        let robust = ForecastEngine::new(ForecastConfig {
            model: ForecastModelKind::Robust,
            ..ForecastConfig::default()
        })
        .forecast(&s)
        .unwrap();
        assert!((robust.diagnostics.trend.slope_per_day - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fit_then_predict_matches_forecast() {
        let engine = ForecastEngine::default();
        let fitted = engine.fit(&increasing()).unwrap();
        assert_eq!(fitted.origin(), date("2024-01-01"));
        assert_eq!(fitted.dates().len(), 5);

        let a = engine.predict(&fitted, 30).unwrap();
        let b = engine.forecast(&increasing()).unwrap();
        assert_eq!(a.points, b.points);
    }

    #[test]
    fn invalid_level_is_a_fit_failure() {
        let engine = ForecastEngine::new(ForecastConfig {
            interval_level: 1.0,
            ..ForecastConfig::default()
        });
        assert!(matches!(
            engine.forecast(&increasing()),
            Err(EngineError::FitFailure(_))
        ));
    }

    #[test]
    fn date_overflow_is_a_fit_failure() {
        let last = NaiveDate::MAX;
        let before = last.pred_opt().unwrap();
        let s = order(vec![at(before, 10.0), at(last, 20.0)]);
        assert!(matches!(
            ForecastEngine::default().forecast(&s),
            Err(EngineError::FitFailure(_))
        ));
    }

    #[derive(Debug)]
    struct Broken;

    impl FittedTrend for Broken {
        fn estimate(&self, _x: f64, _level: f64) -> Estimate {
            Estimate {
                point: f64::NAN,
                lower: f64::NAN,
                upper: f64::NAN,
            }
        }

        fn diagnostics(&self) -> TrendDiagnostics {
            TrendDiagnostics {
                intercept: 0.0,
                slope_per_day: 0.0,
                residual_sigma: 0.0,
                sigma: 1.0,
                degrees_of_freedom: 0,
                sigma_floor_applied: false,
                exact_fit: false,
            }
        }
    }

    struct BrokenModel;

    impl TrendModel for BrokenModel {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn fit(&self, _points: &[TrendPoint]) -> Result<Box<dyn FittedTrend>, EngineError> {
            Ok(Box::new(Broken))
        }
    }

    #[test]
    fn non_finite_estimates_are_reported_not_returned() {
        let engine = ForecastEngine::with_model(Box::new(BrokenModel), ForecastConfig::default());
        assert_eq!(engine.model_name(), "broken");
        let err = engine.forecast(&increasing()).unwrap_err();
        assert!(matches!(err, EngineError::FitFailure(_)));
    }

    #[test]
    fn model_kind_parses_aliases() {
        assert_eq!("OLS".parse::<ForecastModelKind>().unwrap(), ForecastModelKind::Linear);
        assert_eq!(
            "theil-sen".parse::<ForecastModelKind>().unwrap(),
            ForecastModelKind::Robust
        );
        assert!("prophet".parse::<ForecastModelKind>().is_err());
    }

    #[test]
    fn fitted_trend_matches_prediction() {
        let engine = ForecastEngine::default();
        let fitted = engine.fit(&increasing()).unwrap();
        let forecast = engine.predict(&fitted, 3).unwrap();

        assert_eq!(fitted.origin(), date("2024-01-01"));
        assert_eq!(fitted.dates().len(), 5);
        assert_eq!(fitted.trend().diagnostics(), forecast.diagnostics.trend);

        let first = &forecast.points[0];
        let x = (first.date - fitted.origin()).num_days() as f64;
        let estimate = fitted
            .trend()
            .estimate(x, ForecastConfig::default().interval_level);
        assert_eq!(estimate.point, first.point_estimate);
        assert_eq!(estimate.lower, first.lower_bound);
        assert_eq!(estimate.upper, first.upper_bound);
    }
}
