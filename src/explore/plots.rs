//! SVG rendering of the exploration and model-result plots.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use thiserror::Error;

use crate::enrich::EnrichedTick;

use super::{CorrelationMatrix, sample_stride};

const SIZE: (u32, u32) = (1200, 600);
const HISTOGRAM_BINS: usize = 50;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error("Nothing to plot for {0}")]
    NoData(String),
}

fn render_err<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Render(e.to_string())
}

/// Writes SVG files into one output directory
#[derive(Debug, Clone)]
pub struct PlotRenderer {
    output_dir: PathBuf,
    max_points: usize,
}

impl PlotRenderer {
    pub fn new(output_dir: &Path, max_points: usize) -> Result<Self, PlotError> {
        fs::create_dir_all(output_dir).map_err(|e| PlotError::Io(e.to_string()))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            max_points,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the fixed set of descriptive plots. Returns how many were written.
    pub fn exploration_plots(&self, ticks: &[EnrichedTick], correlation: &CorrelationMatrix) -> usize {
        let year = |t: &EnrichedTick| t.year.parse::<f64>().ok();

        let results = [
            self.correlation_heatmap(correlation),
            self.scatter(
                ticks,
                "volbtc_vs_volcurrency.svg",
                ("VolBTC", "VolCurrency"),
                |t| Some((t.vol_btc, t.vol_currency)),
                BLUE,
            ),
            self.open_high_lines(ticks),
            self.histogram(
                "open_histogram.svg",
                "Open",
                &ticks.iter().map(|t| t.open).collect::<Vec<_>>(),
            ),
            self.scatter(
                ticks,
                "weighted_price_by_hour.svg",
                ("hour", "Weighted_Price"),
                |t| Some((t.hour, t.weighted_price)),
                GREEN,
            ),
            self.scatter(
                ticks,
                "weighted_price_by_day_of_week.svg",
                ("day_of_week", "Weighted_Price"),
                |t| Some((f64::from(t.day_of_week), t.weighted_price)),
                BLUE,
            ),
            self.scatter(
                ticks,
                "volbtc_by_hour.svg",
                ("hour", "VolBTC"),
                |t| Some((t.hour, t.vol_btc)),
                RED,
            ),
            self.scatter(
                ticks,
                "volbtc_by_day_of_week.svg",
                ("day_of_week", "VolBTC"),
                |t| Some((f64::from(t.day_of_week), t.vol_btc)),
                YELLOW,
            ),
            self.scatter(
                ticks,
                "weighted_price_by_year.svg",
                ("year", "Weighted_Price"),
                |t| year(t).map(|y| (y, t.weighted_price)),
                MAGENTA,
            ),
            self.scatter(
                ticks,
                "volbtc_by_year.svg",
                ("year", "VolBTC"),
                |t| year(t).map(|y| (y, t.vol_btc)),
                BLACK,
            ),
        ];

        let mut written = 0;
        for result in results {
            match result {
                Ok(path) => {
                    tracing::debug!("Wrote {}", path.display());
                    written += 1;
                }
                Err(e) => tracing::warn!("Plot failed: {}", e),
            }
        }
        tracing::info!("Wrote {} plots to {}", written, self.output_dir.display());
        written
    }

    /// Annotated heatmap of the correlation matrix
    pub fn correlation_heatmap(&self, matrix: &CorrelationMatrix) -> Result<PathBuf, PlotError> {
        let n = matrix.columns().len();
        if n == 0 {
            return Err(PlotError::NoData("correlation heatmap".to_string()));
        }

        let path = self.output_dir.join("correlation_heatmap.svg");
        let root = SVGBackend::new(&path, (1000, 1000)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let names = matrix.columns();
        let label = |v: &i32| -> String {
            usize::try_from(*v)
                .ok()
                .and_then(|i| names.get(i))
                .cloned()
                .unwrap_or_default()
        };
        // Row 0 is drawn at the top
        let row_label = |v: &i32| label(&(n as i32 - 1 - *v));

        let mut chart = ChartBuilder::on(&root)
            .caption("Correlation", ("sans-serif", 28))
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(120)
            .build_cartesian_2d(0i32..n as i32, 0i32..n as i32)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(n)
            .y_labels(n)
            .x_label_formatter(&label)
            .y_label_formatter(&row_label)
            .draw()
            .map_err(render_err)?;

        for (i, row) in matrix.values().iter().enumerate() {
            let y = (n - 1 - i) as i32;
            chart
                .draw_series(row.iter().enumerate().map(|(j, &r)| {
                    Rectangle::new([(j as i32, y), (j as i32 + 1, y + 1)], heat_color(r).filled())
                }))
                .map_err(render_err)?;
            chart
                .draw_series(row.iter().enumerate().map(|(j, &r)| {
                    Text::new(format!("{:.1}", r), (j as i32, y), ("sans-serif", 14).into_font())
                }))
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }

    /// Scatter of one derived point per tick, stride-sampled
    pub fn scatter<F>(
        &self,
        ticks: &[EnrichedTick],
        file: &str,
        (x_desc, y_desc): (&str, &str),
        point: F,
        color: RGBColor,
    ) -> Result<PathBuf, PlotError>
    where
        F: Fn(&EnrichedTick) -> Option<(f64, f64)>,
    {
        let points: Vec<(f64, f64)> = sample_stride(ticks, self.max_points)
            .filter_map(|(_, t)| point(t))
            .collect();
        let (x_range, y_range) = bounds(&points).ok_or_else(|| PlotError::NoData(file.to_string()))?;

        let path = self.output_dir.join(file);
        let root = SVGBackend::new(&path, SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} vs {}", y_desc, x_desc), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc(y_desc)
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 2, color.filled())))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }

    /// Open and High over row order
    pub fn open_high_lines(&self, ticks: &[EnrichedTick]) -> Result<PathBuf, PlotError> {
        let sampled: Vec<(usize, &EnrichedTick)> = sample_stride(ticks, self.max_points).collect();
        let open: Vec<(f64, f64)> = sampled.iter().map(|(i, t)| (*i as f64, t.open)).collect();
        let high: Vec<(f64, f64)> = sampled.iter().map(|(i, t)| (*i as f64, t.high)).collect();

        let all: Vec<(f64, f64)> = open.iter().chain(&high).copied().collect();
        let (x_range, y_range) =
            bounds(&all).ok_or_else(|| PlotError::NoData("open/high lines".to_string()))?;

        let path = self.output_dir.join("open_high.svg");
        let root = SVGBackend::new(&path, (1600, 500)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Open and High", ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("row")
            .y_desc("price")
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(open, RED.mix(0.5).stroke_width(5)))
            .map_err(render_err)?
            .label("Open")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
        chart
            .draw_series(LineSeries::new(high, GREEN.mix(0.5).stroke_width(1)))
            .map_err(render_err)?
            .label("High")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }

    /// Equal-width histogram over all values
    pub fn histogram(&self, file: &str, x_desc: &str, values: &[f64]) -> Result<PathBuf, PlotError> {
        let bins = histogram_bins(values, HISTOGRAM_BINS)
            .ok_or_else(|| PlotError::NoData(file.to_string()))?;
        let max_count = bins.iter().map(|b| b.2).max().unwrap_or(0) as f64;
        let (lo, hi) = (bins[0].0, bins[bins.len() - 1].1);

        let path = self.output_dir.join(file);
        let root = SVGBackend::new(&path, SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} histogram", x_desc), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(lo..hi, 0.0..max_count * 1.05 + 1.0)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc("count")
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(bins.iter().map(|&(left, right, count)| {
                Rectangle::new([(left, 0.0), (right, count as f64)], BLUE.mix(0.6).filled())
            }))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }

    /// Actual and predicted prices over the test rows
    pub fn actual_vs_predicted(
        &self,
        name: &str,
        actual: &[f64],
        predicted: &[f64],
    ) -> Result<PathBuf, PlotError> {
        let pairs: Vec<(f64, f64)> = actual.iter().copied().zip(predicted.iter().copied()).collect();
        let sampled: Vec<(usize, &(f64, f64))> = sample_stride(&pairs, self.max_points).collect();
        let actual: Vec<(f64, f64)> = sampled.iter().map(|(i, p)| (*i as f64, p.0)).collect();
        let predicted: Vec<(f64, f64)> = sampled.iter().map(|(i, p)| (*i as f64, p.1)).collect();

        let all: Vec<(f64, f64)> = actual.iter().chain(&predicted).copied().collect();
        let (x_range, y_range) =
            bounds(&all).ok_or_else(|| PlotError::NoData(format!("{} predictions", name)))?;

        let path = self.output_dir.join(format!("predictions_{}.svg", name));
        let root = SVGBackend::new(&path, (1200, 700)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} model: test set", name), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("test row")
            .y_desc("price")
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(predicted.iter().copied(), &GREEN))
            .map_err(render_err)?
            .label("Predicted Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));
        chart
            .draw_series(predicted.iter().map(|&p| Circle::new(p, 3, GREEN.filled())))
            .map_err(render_err)?;
        chart
            .draw_series(LineSeries::new(actual, &RED))
            .map_err(render_err)?
            .label("Weighted Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }

    /// Overlaid distributions of actual and predicted test prices on shared bins
    pub fn prediction_distribution(
        &self,
        name: &str,
        actual: &[f64],
        predicted: &[f64],
    ) -> Result<PathBuf, PlotError> {
        let bins = shared_bins(actual, predicted, HISTOGRAM_BINS)
            .ok_or_else(|| PlotError::NoData(format!("{} distribution", name)))?;
        let max_count = bins.iter().map(|b| b.2.max(b.3)).max().unwrap_or(0) as f64;
        let (lo, hi) = (bins[0].0, bins[bins.len() - 1].1);

        let path = self.output_dir.join(format!("distribution_{}.svg", name));
        let root = SVGBackend::new(&path, SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} model: test price distribution", name), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(lo..hi, 0.0..max_count * 1.05 + 1.0)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("price")
            .y_desc("count")
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(bins.iter().map(|&(left, right, count, _)| {
                Rectangle::new([(left, 0.0), (right, count as f64)], RED.mix(0.4).filled())
            }))
            .map_err(render_err)?
            .label("Weighted Price")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], RED.mix(0.4).filled()));
        chart
            .draw_series(bins.iter().map(|&(left, right, _, count)| {
                Rectangle::new([(left, 0.0), (right, count as f64)], BLUE.mix(0.4).filled())
            }))
            .map_err(render_err)?
            .label("Predicted Price")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.4).filled()));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(path.clone())
    }
}

/// Padded axis ranges; `None` when there are no finite points
fn bounds(points: &[(f64, f64)]) -> Option<((f64, f64), (f64, f64))> {
    let finite = points.iter().filter(|(x, y)| x.is_finite() && y.is_finite());
    let (mut x_lo, mut x_hi, mut y_lo, mut y_hi) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in finite {
        x_lo = x_lo.min(x);
        x_hi = x_hi.max(x);
        y_lo = y_lo.min(y);
        y_hi = y_hi.max(y);
    }
    if x_lo > x_hi {
        return None;
    }
    Some((pad(x_lo, x_hi), pad(y_lo, y_hi)))
}

fn pad(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        let margin = (hi - lo) * 0.05;
        (lo - margin, hi + margin)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// `(left, right, count)` per bin over the finite values
fn histogram_bins(values: &[f64], bins: usize) -> Option<Vec<(f64, f64, usize)>> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return None;
    }

    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Some(
        counts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
            .collect(),
    )
}

/// `(left, right, count_a, count_b)` over bins spanning both series
fn shared_bins(a: &[f64], b: &[f64], bins: usize) -> Option<Vec<(f64, f64, usize, usize)>> {
    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let edges = histogram_bins(&combined, bins)?;
    let lo = edges[0].0;
    let width = edges[0].1 - edges[0].0;

    let count = |values: &[f64]| {
        let mut counts = vec![0usize; bins];
        for v in values.iter().copied().filter(|v| v.is_finite()) {
            counts[(((v - lo) / width) as usize).min(bins - 1)] += 1;
        }
        counts
    };
    let (counts_a, counts_b) = (count(a), count(b));

    Some(
        edges
            .iter()
            .enumerate()
            .map(|(i, &(left, right, _))| (left, right, counts_a[i], counts_b[i]))
            .collect(),
    )
}

/// Diverging blue-white-red scale over [-1, 1]; grey for NaN
fn heat_color(r: f64) -> RGBColor {
    if !r.is_finite() {
        return RGBColor(200, 200, 200);
    }
    let r = r.clamp(-1.0, 1.0);
    let fade = |t: f64| (255.0 * (1.0 - t)).round() as u8;
    if r >= 0.0 {
        RGBColor(255, fade(r), fade(r))
    } else {
        RGBColor(fade(-r), fade(-r), 255)
    }
}
