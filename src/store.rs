//! Result store: run directories, per-model topic tables, metrics, and run summaries.
//!
//! Every file is written to a temporary file in its destination directory and
//! renamed into place, so a crash never leaves a truncated artifact behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::SweepConfig;
use crate::error::{Result, SweepError};
use crate::metrics::{MetricsRow, MetricsTable, SweepMetrics};
use crate::model::{TopicRow, TopicTable};

/// Format of timestamped run directory names.
pub const RUN_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Column header of metrics CSV files.
pub const METRICS_HEADER: [&str; 3] = ["n_topics", "exclusivity", "coherence"];

/// Column header of topic table CSV files.
pub const TOPIC_TABLE_HEADER: [&str; 3] = ["word", "topic", "prob"];

/// Directory receiving the artifacts of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Uses `root` as the run directory, creating it when missing.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| SweepError::io(err, Some(root.clone())))?;
        Ok(Self { root })
    }

    /// Creates a fresh `<base>/<YYYY-mm-dd_HH-MM-SS>` run directory.
    pub fn timestamped(base: impl AsRef<Path>) -> Result<Self> {
        Self::create(base.as_ref().join(run_stamp()))
    }

    /// Run directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the topic table for `n_topics`: `<model>_<nn>_topics.csv`.
    #[must_use]
    pub fn topic_table_path(&self, model: &str, n_topics: usize) -> PathBuf {
        self.root.join(format!("{model}_{n_topics:02}_topics.csv"))
    }

    /// Path of the complete metrics table: `<model>_metrics.csv`.
    #[must_use]
    pub fn metrics_path(&self, model: &str) -> PathBuf {
        self.root.join(format!("{model}_metrics.csv"))
    }

    /// Path of the metrics table written when a sweep aborts.
    #[must_use]
    pub fn partial_metrics_path(&self, model: &str) -> PathBuf {
        self.root.join(format!("{model}_metrics.partial.csv"))
    }

    /// Path of the JSON run summary.
    #[must_use]
    pub fn summary_path(&self, model: &str) -> PathBuf {
        self.root.join(format!("{model}_summary.json"))
    }

    /// Writes the topic table of one model and returns its path.
    pub fn write_topic_table(
        &self,
        model: &str,
        n_topics: usize,
        table: &TopicTable,
    ) -> Result<PathBuf> {
        let path = self.topic_table_path(model, n_topics);
        write_csv_rows(&path, &TOPIC_TABLE_HEADER, &table.rows)?;
        Ok(path)
    }

    /// Writes the metrics table, to the partial path when `partial` is set.
    pub fn write_metrics(
        &self,
        model: &str,
        table: &MetricsTable,
        partial: bool,
    ) -> Result<PathBuf> {
        let path = if partial {
            self.partial_metrics_path(model)
        } else {
            self.metrics_path(model)
        };
        write_csv_rows(&path, &METRICS_HEADER, table.rows())?;
        Ok(path)
    }

    /// Writes the run summary as pretty-printed JSON.
    pub fn write_summary(&self, model: &str, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.summary_path(model);
        write_json(&path, summary)?;
        Ok(path)
    }
}

/// Metadata persisted next to the metrics table after a sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// RFC 3339 timestamp of when the summary was written.
    pub created_at: String,
    /// Sweep configuration used for the run.
    pub sweep: SweepConfig,
    /// Trainer description.
    pub trainer: String,
    /// Coherence measure description.
    pub coherence: String,
    /// Number of documents in the corpus.
    pub documents: usize,
    /// Vocabulary size.
    pub vocabulary: usize,
    /// Scores of every trained model.
    pub rows: Vec<MetricsRow>,
    /// Timings and memory samples.
    pub metrics: SweepMetrics,
}

/// Current local time formatted with [`RUN_DIR_FORMAT`].
#[must_use]
pub fn run_stamp() -> String {
    Local::now().format(RUN_DIR_FORMAT).to_string()
}

/// Current local time in RFC 3339 form.
#[must_use]
pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

/// Writes `path` through a temporary sibling file that is renamed into place.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| SweepError::io(err, Some(parent.to_path_buf())))?;
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    temp.persist(path)
        .map_err(|err| SweepError::io(err.error, Some(path.to_path_buf())))?;
    Ok(())
}

/// Atomically writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)?;
        writeln!(writer).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))
    })
}

/// Reads a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// `header` is written explicitly only for an empty table; otherwise serde
/// derives it from the first row.
fn write_csv_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    write_atomic(path, |writer| {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if rows.is_empty() {
            csv_writer.write_record(header)?;
        }
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer
            .flush()
            .map_err(|err| SweepError::io(err, Some(path.to_path_buf())))
    })
}

fn read_csv_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Reads a metrics CSV (`n_topics,exclusivity,coherence`), validating row order.
pub fn read_metrics(path: &Path) -> Result<MetricsTable> {
    MetricsTable::from_rows(read_csv_rows::<MetricsRow>(path)?)
}

/// Reads a topic table CSV (`word,topic,prob`).
pub fn read_topic_table(path: &Path) -> Result<TopicTable> {
    Ok(TopicTable {
        rows: read_csv_rows::<TopicRow>(path)?,
    })
}
