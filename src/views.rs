//! Builds page figures from a log table for each kind of view.

use std::path::PathBuf;

use crate::config::{PER_PAGE, SNAPSHOT_DPI, VIEWER_DPI, VIEWER_FIGSIZE, FigSize};
use crate::error::VizError;
use crate::layout::{self, Page};
use crate::log_reader::{self, LogMode, LogTable};
use crate::render::{ChartCell, LabeledSeries, LegendPlacement, PageFigure};
use crate::statistics::{
    DensityUpdateRule, IterationAxis, RenderSeries, SeriesPassthroughRule, UpdateRule,
};

/// Sorted keys, optionally restricted to those containing `pattern`.
pub fn select_keys(table: &LogTable, pattern: Option<&str>) -> Vec<String> {
    let keys = table.keys();
    match pattern {
        Some(pattern) if !pattern.is_empty() => {
            keys.into_iter().filter(|k| k.contains(pattern)).collect()
        }
        _ => keys,
    }
}

fn chart_series(table: &LogTable, key: &str, rule: &dyn UpdateRule) -> Vec<LabeledSeries> {
    table
        .values_for(key)
        .into_iter()
        .map(|(value, observations)| {
            let series = rule.series(&observations);
            let label = match &series {
                RenderSeries::Density { state, .. } => {
                    log::debug!(
                        "{}/{}: Beta({}, {}) mean={:.3} over {} rewards",
                        key,
                        value,
                        state.alpha,
                        state.beta,
                        state.mean(),
                        observations.len()
                    );
                    format!("{} (Final α={}, β={})", value, state.alpha, state.beta)
                }
                RenderSeries::Trajectory { .. } => value.to_string(),
            };
            LabeledSeries { label, series }
        })
        .collect()
}

fn x_upper(max_iter: u64) -> f64 {
    (max_iter + 2).max(20) as f64
}

pub fn bayes_figure(table: &LogTable, page: &Page<'_>, rule: &DensityUpdateRule) -> PageFigure {
    let cells = page
        .keys
        .iter()
        .map(|key| {
            let series = chart_series(table, key, rule);
            let peak = series
                .iter()
                .flat_map(|s| s.series.points().iter().map(|p| p.1))
                .fold(1.0_f64, f64::max);
            ChartCell {
                title: format!("Key: {}", key),
                x_desc: "p (probability)",
                y_desc: "density",
                x_range: 0.0..1.0,
                y_range: 0.0..peak * 1.05,
                series,
            }
        })
        .collect();

    PageFigure {
        heading: Some(format!("Bayes Beta Evolution | Page {}/{}", page.index + 1, page.total)),
        grid: layout::best_grid(page.keys.len()),
        cells,
        legend: LegendPlacement::OutsideRight,
        size: VIEWER_FIGSIZE.pixels(VIEWER_DPI),
        text_scale: 1.0,
    }
}

/// Static EMA page: x axis is the global iteration, capped by `max_iter`.
pub fn ema_snapshot_figure(
    table: &LogTable,
    page: &Page<'_>,
    max_iter: Option<u64>,
    figsize: FigSize,
) -> PageFigure {
    let rule = SeriesPassthroughRule {
        axis: IterationAxis::Global,
        max_iter,
        fill_missing: true,
    };
    let x_max = x_upper(max_iter.or(table.max_global_iter()).unwrap_or(0));
    let cells = page
        .keys
        .iter()
        .map(|key| ChartCell {
            title: key.clone(),
            x_desc: "Iteration",
            y_desc: "Prior",
            x_range: 0.0..x_max,
            y_range: 0.0..1.05,
            series: chart_series(table, key, &rule),
        })
        .collect();

    PageFigure {
        heading: None,
        grid: layout::best_grid(PER_PAGE),
        cells,
        legend: LegendPlacement::InsideLowerRight,
        size: figsize.pixels(SNAPSHOT_DPI),
        text_scale: SNAPSHOT_DPI as f64 / 100.0 * 0.8,
    }
}

/// Live EMA page: each key is plotted against its own iteration counter.
pub fn ema_live_figure(table: &LogTable, page: &Page<'_>) -> PageFigure {
    let rule = SeriesPassthroughRule {
        axis: IterationAxis::PerKey,
        max_iter: None,
        fill_missing: false,
    };
    let cells = page
        .keys
        .iter()
        .map(|key| {
            let key_max = table
                .rows
                .iter()
                .filter(|row| &row.key == key)
                .map(|row| row.key_iter)
                .max()
                .unwrap_or(0);
            ChartCell {
                title: key.clone(),
                x_desc: "Iteration (per key)",
                y_desc: "Prior",
                x_range: 0.0..x_upper(key_max),
                y_range: 0.0..1.05,
                series: chart_series(table, key, &rule),
            }
        })
        .collect();

    PageFigure {
        heading: Some(format!("EMA Priors | Page {}/{}", page.index + 1, page.total)),
        grid: layout::best_grid(page.keys.len()),
        cells,
        legend: LegendPlacement::OutsideRight,
        size: VIEWER_FIGSIZE.pixels(VIEWER_DPI),
        text_scale: 1.0,
    }
}

/// The interactive views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Beta densities from a fixed log; redrawn on navigation.
    Bayes,
    /// EMA trajectories from a growing log; redrawn on a timer.
    Live,
}

/// Where an interactive view reads from and how it draws a page.
#[derive(Debug, Clone)]
pub struct ViewSource {
    pub kind: ViewKind,
    pub path: PathBuf,
    pub delimiter: u8,
}

impl ViewSource {
    /// Startup load: a missing or unreadable log is an empty table.
    pub fn load(&self) -> Result<LogTable, VizError> {
        match self.try_load() {
            Err(err @ VizError::MissingFileOrParse { .. }) => {
                log::warn!("{}", err);
                Ok(LogTable::default())
            }
            other => other,
        }
    }

    /// Loads the log, failing on a missing file or a partly written row.
    /// The live view orders rows by timestamp before filtering on mode.
    pub fn try_load(&self) -> Result<LogTable, VizError> {
        match self.kind {
            ViewKind::Bayes => log_reader::try_read_log(&self.path, LogMode::Bayes, self.delimiter),
            ViewKind::Live => Ok(log_reader::try_read_log(&self.path, LogMode::Ema, self.delimiter)?
                .sorted_by_timestamp()
                .with_mode("ema")),
        }
    }

    /// Figure for page `index` of `keys`, or `None` when there is nothing to draw.
    pub fn figure(&self, table: &LogTable, keys: &[String], index: usize) -> Option<PageFigure> {
        if keys.is_empty() {
            return None;
        }
        let page = layout::paginate(keys, PER_PAGE, index as isize);
        Some(match self.kind {
            ViewKind::Bayes => bayes_figure(table, &page, &DensityUpdateRule::default()),
            ViewKind::Live => ema_live_figure(table, &page),
        })
    }
}
