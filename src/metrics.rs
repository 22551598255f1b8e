//! Per-model scores collected during a sweep, plus timing and memory samples.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Scores of one trained model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricsRow {
    /// Topic count the model was trained with.
    pub n_topics: usize,
    /// Reduced exclusivity score.
    pub exclusivity: f64,
    /// Coherence score (higher is better).
    pub coherence: f64,
}

impl MetricsRow {
    /// Returns `true` when `self` is at least as good as `other` on both axes and
    /// strictly better on one.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.coherence >= other.coherence
            && self.exclusivity >= other.exclusivity
            && (self.coherence > other.coherence || self.exclusivity > other.exclusivity)
    }
}

/// Metrics rows ordered strictly ascending by `n_topics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsTable {
    rows: Vec<MetricsRow>,
}

impl MetricsTable {
    /// Creates an empty table with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Builds a table from rows, validating their ordering.
    pub fn from_rows(rows: impl IntoIterator<Item = MetricsRow>) -> Result<Self> {
        let mut table = Self::default();
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    /// Appends a row; `n_topics` must exceed every row already present.
    pub fn push(&mut self, row: MetricsRow) -> Result<()> {
        if row.n_topics == 0 {
            return Err(SweepError::Internal(
                "metrics row with n_topics = 0".into(),
            ));
        }
        if let Some(last) = self.rows.last() {
            if row.n_topics <= last.n_topics {
                return Err(SweepError::Internal(format!(
                    "metrics row for n_topics={} appended after n_topics={}",
                    row.n_topics, last.n_topics
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// Rows in ascending `n_topics` order.
    #[must_use]
    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when no model has been scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Topic counts present in the table.
    #[must_use]
    pub fn topic_counts(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.n_topics).collect()
    }

    /// Row with the highest coherence; ties go to the smaller topic count.
    #[must_use]
    pub fn best_by_coherence(&self) -> Option<&MetricsRow> {
        self.rows
            .iter()
            .reduce(|best, row| if row.coherence > best.coherence { row } else { best })
    }

    /// Row with the highest exclusivity; ties go to the smaller topic count.
    #[must_use]
    pub fn best_by_exclusivity(&self) -> Option<&MetricsRow> {
        self.rows
            .iter()
            .reduce(|best, row| if row.exclusivity > best.exclusivity { row } else { best })
    }

    /// Rows not dominated by any other row on (coherence, exclusivity), ascending by `n_topics`.
    #[must_use]
    pub fn pareto_front(&self) -> Vec<&MetricsRow> {
        self.rows
            .iter()
            .filter(|candidate| !self.rows.iter().any(|other| other.dominates(candidate)))
            .collect()
    }
}

/// Reason a sweep terminated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Every topic count in the range was trained and scored.
    Completed,
    /// The trainer failed for `n_topics`.
    TrainingFailed {
        /// Topic count whose training failed.
        n_topics: usize,
    },
    /// A cancellation request was observed between two models.
    Cancelled,
}

/// Timing and memory sample captured for each trained model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetrics {
    /// Topic count of the model.
    pub n_topics: usize,
    /// Time spent inside the trainer.
    pub elapsed_training: Duration,
    /// Time spent computing exclusivity and coherence.
    pub elapsed_scoring: Duration,
    /// Total time elapsed since the sweep started.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate timings of one sweep, recorded in the run summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepMetrics {
    /// Per-model snapshots in training order.
    pub models: Vec<ModelMetrics>,
    /// Total duration of the sweep.
    pub total_duration: Duration,
    /// Reason the sweep terminated.
    pub stop_reason: StopReason,
}

impl SweepMetrics {
    /// Creates an empty container with pre-allocated capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            models: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
            stop_reason: StopReason::Completed,
        }
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    BufReader::new(file)
        .lines()
        .map_while(std::result::Result::ok)
        .find_map(|line| {
            line.strip_prefix("VmRSS:")?
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok())
        })
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n_topics: usize, exclusivity: f64, coherence: f64) -> MetricsRow {
        MetricsRow {
            n_topics,
            exclusivity,
            coherence,
        }
    }

    #[test]
    fn push_requires_ascending_topic_counts() {
        let mut table = MetricsTable::default();
        table.push(row(2, 0.5, -1.0)).expect("first row");
        table.push(row(4, 0.6, -1.2)).expect("second row");
        assert!(matches!(
            table.push(row(4, 0.7, -0.9)),
            Err(SweepError::Internal(_))
        ));
        assert!(matches!(
            table.push(row(3, 0.7, -0.9)),
            Err(SweepError::Internal(_))
        ));
        assert_eq!(table.topic_counts(), vec![2, 4]);
        assert!(MetricsTable::from_rows([row(0, 0.0, 0.0)]).is_err());
    }

    #[test]
    fn best_rows_and_pareto_front() {
        let table = MetricsTable::from_rows([
            row(2, 0.40, 0.10),
            row(3, 0.55, 0.08),
            row(4, 0.50, 0.05),
            row(5, 0.70, 0.10),
        ])
        .expect("rows are ordered");
        assert_eq!(table.best_by_coherence().map(|r| r.n_topics), Some(2));
        assert_eq!(table.best_by_exclusivity().map(|r| r.n_topics), Some(5));
        let front: Vec<usize> = table.pareto_front().iter().map(|r| r.n_topics).collect();
        assert_eq!(front, vec![5]);
        assert!(MetricsTable::default().best_by_coherence().is_none());
    }

    #[test]
    fn rss_sample_is_positive_when_available() {
        if let Some(rss) = sample_rss_kb() {
            assert!(rss > 0);
        }
    }
}
