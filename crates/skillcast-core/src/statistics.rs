//! Numeric building blocks for trend fitting.
//!
//! Least squares and Theil–Sen line fits, robust scale, and the normal /
//! Student-t quantiles used for prediction bands.

use crate::forecast::TrendPoint;

/// Below this the spread of x values is treated as zero.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median, `None` for an empty slice. NaNs sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation from the median.
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Shape of the x values, shared by every line fit for its prediction band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Design {
    /// Number of points.
    pub n: usize,
    /// Mean of x.
    pub x_mean: f64,
    /// Sum of squared deviations of x from its mean.
    pub sxx: f64,
}

impl Design {
    /// `None` when there are no points or all x values coincide.
    pub fn of(points: &[TrendPoint]) -> Option<Self> {
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let x_mean = mean(&xs)?;
        let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
        if !sxx.is_finite() || sxx <= SINGULAR_EPSILON {
            return None;
        }
        Some(Self {
            n: points.len(),
            x_mean,
            sxx,
        })
    }

    /// Residual degrees of freedom for a two-parameter line.
    pub fn degrees_of_freedom(&self) -> usize {
        self.n.saturating_sub(2)
    }

    /// `sqrt(1 + 1/n + (x - x̄)² / Sxx)`: prediction standard error per unit sigma.
    pub fn prediction_factor(&self, x: f64) -> f64 {
        (1.0 + 1.0 / self.n as f64 + (x - self.x_mean).powi(2) / self.sxx).sqrt()
    }
}

/// A fitted straight line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub intercept: f64,
    pub slope: f64,
}

impl Line {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Residuals `y - ŷ` for each point.
    pub fn residuals(&self, points: &[TrendPoint]) -> Vec<f64> {
        points.iter().map(|p| p.y - self.at(p.x)).collect()
    }
}

/// Ordinary least squares fit.
pub fn least_squares(points: &[TrendPoint], design: &Design) -> Line {
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let y_mean = mean(&ys).unwrap_or_default();
    let sxy: f64 = points
        .iter()
        .map(|p| (p.x - design.x_mean) * (p.y - y_mean))
        .sum();
    let slope = sxy / design.sxx;
    Line {
        intercept: y_mean - slope * design.x_mean,
        slope,
    }
}

/// Theil–Sen fit: median of pairwise slopes, median intercept.
///
/// Pairs sharing an x value are skipped. `None` if no pair has distinct x.
pub fn theil_sen(points: &[TrendPoint]) -> Option<Line> {
    let mut slopes = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let dx = b.x - a.x;
            if dx.abs() > SINGULAR_EPSILON {
                slopes.push((b.y - a.y) / dx);
            }
        }
    }
    let slope = median(&slopes)?;
    let offsets: Vec<f64> = points.iter().map(|p| p.y - slope * p.x).collect();
    let intercept = median(&offsets)?;
    Some(Line { intercept, slope })
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
///
/// Relative error below 1.2e-9 over (0, 1). Returns NaN outside (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Inverse of the Student-t CDF with `df` degrees of freedom.
///
/// Exact for 1 and 2 degrees of freedom, Cornish–Fisher expansion above.
pub fn student_t_quantile(p: f64, df: usize) -> f64 {
    if !(p > 0.0 && p < 1.0) || df == 0 {
        return f64::NAN;
    }
    match df {
        1 => (std::f64::consts::PI * (p - 0.5)).tan(),
        2 => (2.0 * p - 1.0) / (2.0 * p * (1.0 - p)).sqrt(),
        _ => {
            let z = normal_quantile(p);
            let v = df as f64;
            let z2 = z * z;
            let z3 = z2 * z;
            let z5 = z3 * z2;
            let z7 = z5 * z2;
            let z9 = z7 * z2;
            let g1 = (z3 + z) / 4.0;
            let g2 = (5.0 * z5 + 16.0 * z3 + 3.0 * z) / 96.0;
            let g3 = (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / 384.0;
            let g4 = (79.0 * z9 + 776.0 * z7 + 1482.0 * z5 - 1920.0 * z3 - 945.0 * z) / 92160.0;
            z + g1 / v + g2 / v.powi(2) + g3 / v.powi(3) + g4 / v.powi(4)
        }
    }
}

/// Multiplier for a central interval covering `level` of the distribution.
///
/// Uses Student-t with `df` degrees of freedom, or the normal distribution
/// when `df` is 0 (no residual information).
pub fn two_sided_quantile(level: f64, df: usize) -> f64 {
    let p = 0.5 + level / 2.0;
    if df == 0 {
        normal_quantile(p)
    } else {
        student_t_quantile(p, df)
    }
}
