//! Coherence versus exclusivity scatter plots rendered through gnuplot.

use std::fs;
use std::path::Path;

use gnuplot::{
    AxesCommon, Color, Coordinate, Figure, LabelOption, PointSize, PointSymbol, Rotate,
};

use crate::error::{Result, SweepError};
use crate::metrics::MetricsTable;

/// Point coordinates `(coherence, exclusivity)` and their `n_topics` labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScatterSeries {
    /// Coherence of each model (x axis).
    pub x: Vec<f64>,
    /// Exclusivity of each model (y axis).
    pub y: Vec<f64>,
    /// Topic count labels, one per point.
    pub labels: Vec<String>,
}

impl From<&MetricsTable> for ScatterSeries {
    fn from(table: &MetricsTable) -> Self {
        let mut series = Self::default();
        for row in table.rows() {
            series.x.push(row.coherence);
            series.y.push(row.exclusivity);
            series.labels.push(row.n_topics.to_string());
        }
        series
    }
}

/// Figure title for a model family, e.g. `LDA Topics: Coherence vs. Exclusivity`.
#[must_use]
pub fn figure_title(model: &str) -> String {
    format!("{model} Topics: Coherence vs. Exclusivity")
}

/// Renders `table` as a PNG scatter plot at `path`, one labelled point per model.
///
/// `model` names the model family in the title (see [`figure_title`]).
///
/// Requires a `gnuplot` executable with the `pngcairo` terminal on `PATH`.
pub fn render_scatter(table: &MetricsTable, model: &str, path: &Path) -> Result<()> {
    if table.is_empty() {
        return Err(SweepError::Plot("metrics table has no rows to plot".into()));
    }
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| SweepError::io(err, Some(parent.to_path_buf())))?;
    }
    let output = path
        .to_str()
        .ok_or_else(|| SweepError::Plot(format!("figure path {path:?} is not valid UTF-8")))?;

    let series = ScatterSeries::from(table);
    let mut fg = Figure::new();
    {
        let axes = fg.axes2d();
        axes.points(
            series.x.iter().copied(),
            series.y.iter().copied(),
            &[PointSymbol('O'), Color("#1f77b4"), PointSize(1.2)],
        )
        .set_x_label("Coherence", &[])
        .set_y_label("Exclusivity", &[Rotate(90.0)])
        .set_title(&figure_title(model), &[]);
        for ((&x, &y), label) in series.x.iter().zip(&series.y).zip(&series.labels) {
            axes.label(
                label,
                Coordinate::Axis(x),
                Coordinate::Axis(y),
                &[LabelOption::TextOffset(0.6, 0.6)],
            );
        }
    }
    fg.set_terminal("pngcairo", output);
    fg.show()
        .map_err(|err| SweepError::Plot(format!("unable to run gnuplot: {err:?}")))?;
    Ok(())
}
