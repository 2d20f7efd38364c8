//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS and charts inlined.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;

use skillcast_core::model::{Category, CategoryMeans};
use skillcast_core::report::{CohortReport, ForecastOutcome, ParticipantReport};
use skillcast_core::series::category_series;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"))
}

/// Generate an HTML report from a cohort report.
pub fn generate_html(report: &CohortReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>skillcast report: {}</title>\n",
        html_escape(&report.dataset)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>skillcast report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Dataset: <strong>{}</strong> | {} participants | {} assessments | {}</p>\n",
        html_escape(&report.dataset),
        report.population.participant_count,
        report.population.assessment_count,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Population dashboard
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Population</h2>\n");
    html.push_str(&format!(
        "<p>Mean total: <strong>{:.1}%</strong> | Overall: {:.1} / {:.1} points ({:.1}%)</p>\n",
        report.population.mean_total_percent,
        report.population.totals.total_achieved,
        report.population.totals.total_maximum,
        report.population.totals.total_percent,
    ));
    html.push_str(&generate_bar_chart(&report.population.category_means));
    html.push_str("</section>\n");

    // Participant table
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Participants</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"participants\">\n");
    html.push_str(&format!(
        "<thead><tr><th onclick=\"sortTable(0)\">Participant</th><th onclick=\"sortTable(1)\">Cohort</th><th onclick=\"sortTable(2)\">Assessments</th><th onclick=\"sortTable(3)\">Mean</th><th onclick=\"sortTable(4)\">Recent</th><th onclick=\"sortTable(5)\">Best</th><th onclick=\"sortTable(6)\">Worst</th><th onclick=\"sortTable(7)\">Forecast +{}d</th></tr></thead>\n",
        report.forecast_settings.horizon_days
    ));
    html.push_str("<tbody>\n");

    for p in &report.participants {
        let s = &p.summary;
        let (class, forecast_text) = match &p.forecast {
            ForecastOutcome::Available(f) => (
                "available",
                pct(f.last_point().map(|pt| pt.point_estimate)),
            ),
            ForecastOutcome::Unavailable { .. } => ("unavailable", "n/a".to_string()),
            ForecastOutcome::Failed { .. } => ("failed", "failed".to_string()),
        };
        html.push_str(&format!(
            "<tr><td><a href=\"#p-{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>\n",
            html_escape(&p.participant.id),
            html_escape(&p.participant.name),
            html_escape(p.participant.cohort.as_deref().unwrap_or("-")),
            s.count,
            pct(s.mean_percent),
            pct(s.recent_mean),
            pct(s.best.as_ref().map(|m| m.total_percent)),
            pct(s.worst.as_ref().map(|m| m.total_percent)),
            class,
            forecast_text
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Per-participant detail
    for p in &report.participants {
        html.push_str(&generate_participant_section(p));
    }

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(
        &serde_json::to_string_pretty(report)
            .unwrap_or_default()
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    // JavaScript for sorting
    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &CohortReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

fn generate_participant_section(p: &ParticipantReport) -> String {
    let mut html = format!(
        "<section class=\"participant\" id=\"p-{}\">\n<h3>{}</h3>\n",
        html_escape(&p.participant.id),
        html_escape(&p.participant.name)
    );

    match &p.forecast {
        ForecastOutcome::Available(f) => html.push_str(&format!(
            "<p class=\"meta\">{} model, slope {:+.2} points/day, {:.0}% band{}</p>\n",
            html_escape(&f.diagnostics.model),
            f.diagnostics.trend.slope_per_day,
            f.interval_level * 100.0,
            if f.diagnostics.trend.sigma_floor_applied {
                " (minimum width)"
            } else {
                ""
            }
        )),
        ForecastOutcome::Unavailable { reason } => html.push_str(&format!(
            "<p class=\"meta\">No forecast available: {}</p>\n",
            html_escape(reason)
        )),
        ForecastOutcome::Failed { message } => html.push_str(&format!(
            "<p class=\"fail\">Forecast failed: {}</p>\n",
            html_escape(message)
        )),
    }

    if !p.series.is_empty() {
        html.push_str(&generate_trend_chart(p));
    }

    html.push_str("<table>\n<thead><tr><th>Date</th><th>Total</th><th>Rolling mean</th><th>Change</th></tr></thead>\n<tbody>\n");
    for ((a, mean), delta) in p
        .series
        .iter()
        .zip(&p.summary.rolling_mean)
        .zip(&p.summary.deltas)
    {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}%</td><td>{}</td><td>{}</td></tr>\n",
            a.date(),
            a.total_percent(),
            pct(*mean),
            delta.map_or_else(|| "-".to_string(), |d| format!("{d:+.1}")),
        ));
    }
    html.push_str("</tbody></table>\n</section>\n");
    html
}

/// Plot area of the trend chart in pixels.
const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 240.0;
const CHART_LEFT: f64 = 48.0;
const CHART_TOP: f64 = 12.0;

struct Scale {
    start: NaiveDate,
    span_days: f64,
    y_min: f64,
    y_max: f64,
}

impl Scale {
    fn x(&self, date: NaiveDate) -> f64 {
        CHART_LEFT + (date - self.start).num_days() as f64 / self.span_days * CHART_WIDTH
    }

    fn y(&self, value: f64) -> f64 {
        CHART_TOP + (self.y_max - value) / (self.y_max - self.y_min) * CHART_HEIGHT
    }
}

/// One stroke color per category, in `Category::ALL` order.
const CATEGORY_COLORS: [&str; Category::COUNT] = [
    "#f97316", "#a855f7", "#22c55e", "#eab308", "#ec4899", "#14b8a6",
];

/// History dots, per-category lines, fitted line, forecast line and prediction band.
fn generate_trend_chart(p: &ParticipantReport) -> String {
    let history: Vec<(NaiveDate, f64)> = p
        .series
        .iter()
        .map(|a| (a.date(), a.total_percent()))
        .collect();
    let forecast = p.forecast.forecast();
    let categories: Vec<(Category, Vec<(NaiveDate, f64)>)> = Category::ALL
        .into_iter()
        .map(|c| (c, category_series(&p.series, c)))
        .collect();

    let mut values: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
    values.extend(categories.iter().flat_map(|(_, pts)| pts.iter().map(|(_, v)| *v)));
    let (Some(&(mut start, _)), Some(&(mut end, _))) = (history.first(), history.last()) else {
        return String::new();
    };
    if let Some(f) = forecast {
        for pt in f.points.iter().chain(&f.fitted) {
            values.extend([pt.lower_bound, pt.upper_bound]);
            start = start.min(pt.date);
            end = end.max(pt.date);
        }
    }

    // Keep the 0..100 frame; unclamped bounds extend it.
    let y_min = values.iter().copied().fold(0.0f64, f64::min);
    let y_max = values.iter().copied().fold(100.0f64, f64::max);
    let scale = Scale {
        start,
        span_days: ((end - start).num_days() as f64).max(1.0),
        y_min,
        y_max,
    };

    let mut svg = format!(
        "<svg class=\"trend\" width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        CHART_LEFT + CHART_WIDTH + 16.0,
        CHART_TOP + CHART_HEIGHT + 28.0
    );

    // Axes and gridlines at 0, 50 and 100
    for level in [0.0, 50.0, 100.0] {
        let y = scale.y(level);
        svg.push_str(&format!(
            "  <line x1=\"{CHART_LEFT}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"currentColor\" stroke-opacity=\"0.15\"/>\n",
            CHART_LEFT + CHART_WIDTH
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{y:.1}\" font-size=\"11\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{level:.0}%</text>\n",
            CHART_LEFT - 6.0
        ));
    }
    svg.push_str(&format!(
        "  <text x=\"{CHART_LEFT}\" y=\"{:.1}\" font-size=\"11\" fill=\"currentColor\">{start}</text>\n",
        CHART_TOP + CHART_HEIGHT + 20.0
    ));
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" fill=\"currentColor\" text-anchor=\"end\">{end}</text>\n",
        CHART_LEFT + CHART_WIDTH,
        CHART_TOP + CHART_HEIGHT + 20.0
    ));

    for ((category, points), color) in categories.iter().zip(CATEGORY_COLORS) {
        let line: Vec<String> = points
            .iter()
            .map(|(d, v)| format!("{:.1},{:.1}", scale.x(*d), scale.y(*v)))
            .collect();
        svg.push_str(&format!(
            "  <polyline class=\"category {}\" points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-opacity=\"0.6\"><title>{}</title></polyline>\n",
            category.key(),
            line.join(" "),
            category.label()
        ));
    }

    if let Some(f) = forecast {
        let upper = f
            .points
            .iter()
            .map(|pt| format!("{:.1},{:.1}", scale.x(pt.date), scale.y(pt.upper_bound)));
        let lower = f
            .points
            .iter()
            .rev()
            .map(|pt| format!("{:.1},{:.1}", scale.x(pt.date), scale.y(pt.lower_bound)));
        let band: Vec<String> = upper.chain(lower).collect();
        svg.push_str(&format!(
            "  <polygon class=\"band\" points=\"{}\" fill=\"#3b82f6\" fill-opacity=\"0.2\"/>\n",
            band.join(" ")
        ));

        let fitted: Vec<String> = f
            .fitted
            .iter()
            .map(|pt| format!("{:.1},{:.1}", scale.x(pt.date), scale.y(pt.point_estimate)))
            .collect();
        svg.push_str(&format!(
            "  <polyline class=\"fitted\" points=\"{}\" fill=\"none\" stroke=\"#3b82f6\" stroke-dasharray=\"4 3\"/>\n",
            fitted.join(" ")
        ));

        let projected: Vec<String> = f
            .points
            .iter()
            .map(|pt| format!("{:.1},{:.1}", scale.x(pt.date), scale.y(pt.point_estimate)))
            .collect();
        svg.push_str(&format!(
            "  <polyline class=\"forecast\" points=\"{}\" fill=\"none\" stroke=\"#3b82f6\" stroke-width=\"2\"/>\n",
            projected.join(" ")
        ));
    }

    let observed: Vec<String> = history
        .iter()
        .map(|(d, v)| format!("{:.1},{:.1}", scale.x(*d), scale.y(*v)))
        .collect();
    svg.push_str(&format!(
        "  <polyline class=\"history\" points=\"{}\" fill=\"none\" stroke=\"currentColor\"/>\n",
        observed.join(" ")
    ));
    for (d, v) in &history {
        svg.push_str(&format!(
            "  <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3.5\" fill=\"currentColor\"><title>{d}: {v:.1}%</title></circle>\n",
            scale.x(*d),
            scale.y(*v)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

fn generate_bar_chart(category_means: &CategoryMeans) -> String {
    let bar_height = 24;
    let max_width = 400;
    let padding = 8;
    let label_width = 160;

    let categories: Vec<(Category, f64)> = Category::ALL
        .into_iter()
        .map(|c| (c, category_means.get(&c).copied().unwrap_or(0.0)))
        .collect();

    let total_height = categories.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (category, percent)) in categories.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (percent.clamp(0.0, 100.0) / 100.0 * max_width as f64) as usize;

        let color = if *percent >= 80.0 {
            "#22c55e"
        } else if *percent >= 50.0 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            category.label()
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.1}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            percent
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --muted: #f3f4f6; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --muted: #1f2937; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
a { color: inherit; }
.available { background: var(--pass); }
.unavailable { background: var(--muted); }
.failed, .fail { background: var(--fail); }
.participant { border-top: 1px solid var(--border); margin-top: 2rem; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('participants');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
