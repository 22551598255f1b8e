//! Crash-safe column padding and two-sided reconciliation of distribution tables.
//!
//! Two sweep runs over different datasets produce distribution tables whose
//! topic columns only partly overlap. [`Padder::pad`] adds every column the
//! target lacks, one at a time, filled with a sentinel. A cancellation observed
//! between two columns flushes the partially padded table to a recovery file
//! as a [`RecoveryArtifact`] before the error is returned, and
//! [`PadJob::load`] prefers that file on the next attempt so completed columns
//! are never redone.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::{Result, SweepError};
use crate::store::{read_json, write_json};

mod table;

pub use table::{Column, ColumnData, DistributionTable};

/// Default fill value for padded columns; far outside any probability.
pub const LARGE_NEGATIVE: f64 = -10000.0;

/// Canonical input table names looked up in a side's directory, in order.
pub const INPUT_NAMES: [&str; 2] = ["topic_dist.json", "topic_dist.csv"];

/// Progress of one padding operation, persisted with its recovery artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PadState {
    /// No column has been added yet.
    Pending,
    /// Some columns were added before the operation was interrupted.
    PartiallyPadded {
        /// Columns added so far, in the order they were added.
        completed: Vec<String>,
    },
    /// Every missing column has been added.
    Complete,
}

impl PadState {
    /// Columns already added.
    #[must_use]
    pub fn completed(&self) -> &[String] {
        match self {
            Self::PartiallyPadded { completed } => completed,
            Self::Pending | Self::Complete => &[],
        }
    }
}

/// Recovery file contents: state, fill value, and the table with sorted columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryArtifact {
    /// Padding progress when the artifact was written.
    pub state: PadState,
    /// Fill value used for the columns added so far.
    pub sentinel: f64,
    /// Table as it stood when the artifact was written.
    pub table: DistributionTable,
}

/// One table to pad, plus where to flush it on cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct PadJob {
    table: DistributionTable,
    recovery_path: PathBuf,
    state: PadState,
    sentinel: Option<f64>,
}

impl PadJob {
    /// Starts a fresh job over `table`.
    pub fn new(table: DistributionTable, recovery_path: impl Into<PathBuf>) -> Self {
        Self {
            table,
            recovery_path: recovery_path.into(),
            state: PadState::Pending,
            sentinel: None,
        }
    }

    /// Loads the recovery artifact when it exists, the input table otherwise.
    pub fn load(input: &Path, recovery_path: &Path) -> Result<Self> {
        if recovery_path.is_file() {
            let artifact: RecoveryArtifact = read_json(recovery_path)?;
            info!(
                "resuming from {} ({} column(s) already padded)",
                recovery_path.display(),
                artifact.state.completed().len()
            );
            return Ok(Self {
                table: artifact.table,
                recovery_path: recovery_path.to_path_buf(),
                state: artifact.state,
                sentinel: Some(artifact.sentinel),
            });
        }
        debug!("no recovery artifact at {}", recovery_path.display());
        Ok(Self::new(DistributionTable::read(input)?, recovery_path))
    }

    /// Table as loaded.
    #[must_use]
    pub fn table(&self) -> &DistributionTable {
        &self.table
    }

    /// Progress recorded for the job.
    #[must_use]
    pub fn state(&self) -> &PadState {
        &self.state
    }

    /// Where partial progress is flushed.
    #[must_use]
    pub fn recovery_path(&self) -> &Path {
        &self.recovery_path
    }

    /// Returns `true` when the job was restored from a recovery artifact.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.sentinel.is_some()
    }
}

type ColumnHook = Box<dyn Fn(&str) + Send + Sync>;

/// Adds missing columns to a table, checkpointing on cancellation.
pub struct Padder {
    sentinel: f64,
    cancel: Option<CancellationToken>,
    on_column_added: Option<ColumnHook>,
}

impl fmt::Debug for Padder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Padder")
            .field("sentinel", &self.sentinel)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Default for Padder {
    fn default() -> Self {
        Self::new(LARGE_NEGATIVE)
    }
}

impl Padder {
    /// Creates a padder filling new columns with `sentinel`.
    #[must_use]
    pub fn new(sentinel: f64) -> Self {
        Self {
            sentinel,
            cancel: None,
            on_column_added: None,
        }
    }

    /// Observes `token` before every column.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Calls `hook` with each column name right after the column is added.
    #[must_use]
    pub fn on_column_added<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_column_added = Some(Box::new(hook));
        self
    }

    /// Fill value for new columns.
    #[must_use]
    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Adds every column of `reference` missing from the job's table, in
    /// lexicographic order, and returns the table with sorted columns.
    ///
    /// On cancellation the partial table is written to the job's recovery path
    /// and [`SweepError::CancellationDuringCheckpoint`] is returned.
    pub fn pad(&self, job: PadJob, reference: &DistributionTable) -> Result<DistributionTable> {
        if let Some(recorded) = job.sentinel {
            if recorded.to_bits() != self.sentinel.to_bits() {
                return Err(SweepError::InvalidConfig(format!(
                    "recovery artifact {} was padded with {recorded}, not {}",
                    job.recovery_path.display(),
                    self.sentinel
                )));
            }
        }
        let PadJob {
            mut table,
            recovery_path,
            state,
            ..
        } = job;
        let mut completed = match state {
            PadState::PartiallyPadded { completed } => completed,
            PadState::Pending | PadState::Complete => Vec::new(),
        };

        let missing = table.missing_from(reference);
        let height = table.height();
        debug!(
            "padding {} column(s) into a table of {} row(s)",
            missing.len(),
            height
        );
        for name in missing {
            if self.is_cancelled() {
                table.sort_columns();
                let state = if completed.is_empty() {
                    PadState::Pending
                } else {
                    PadState::PartiallyPadded {
                        completed: completed.clone(),
                    }
                };
                write_json(
                    &recovery_path,
                    &RecoveryArtifact {
                        state,
                        sentinel: self.sentinel,
                        table,
                    },
                )?;
                warn!(
                    "padding cancelled after {} column(s); saved to {}",
                    completed.len(),
                    recovery_path.display()
                );
                return Err(SweepError::CancellationDuringCheckpoint {
                    path: recovery_path,
                    completed,
                });
            }
            table.push_column(Column::filled(name.as_str(), self.sentinel, height))?;
            if let Some(hook) = &self.on_column_added {
                hook(&name);
            }
            completed.push(name);
        }
        table.sort_columns();
        Ok(table)
    }
}

/// One side of a reconciliation: a run directory and its file label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Side {
    dir: PathBuf,
    label: String,
}

impl Side {
    /// Creates a side rooted at `dir`, naming its files after `label`.
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
        }
    }

    /// Run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File label, such as `fed` or `news`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// First existing entry of [`INPUT_NAMES`], or the JSON name when neither exists.
    #[must_use]
    pub fn input_path(&self) -> PathBuf {
        INPUT_NAMES
            .iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
            .unwrap_or_else(|| self.dir.join(INPUT_NAMES[0]))
    }

    /// `<label>_extended.intermediary.json`.
    #[must_use]
    pub fn recovery_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_extended.intermediary.json", self.label))
    }

    /// `<label>_padded.json`.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(format!("{}_padded.json", self.label))
    }

    /// Loads this side, preferring its recovery artifact.
    pub fn load(&self) -> Result<PadJob> {
        PadJob::load(&self.input_path(), &self.recovery_path())
    }
}

/// Final tables written by [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Path of the padded left table.
    pub left_path: PathBuf,
    /// Path of the padded right table.
    pub right_path: PathBuf,
    /// Union of both column sets, sorted.
    pub columns: Vec<String>,
}

/// Pads `left` against `right` and `right` against `left`, then writes both results.
///
/// When the second operation is cancelled, the finished left table is flushed
/// to the left recovery path with state [`PadState::Complete`] before the
/// cancellation is returned. Recovery files are removed after success.
pub fn reconcile(left: &Side, right: &Side, padder: &Padder) -> Result<Reconciled> {
    let left_job = left.load()?;
    let right_job = right.load()?;
    let left_reference = left_job.table().clone();
    let right_reference = right_job.table().clone();
    info!(
        "reconciling {} ({} columns) with {} ({} columns)",
        left.label(),
        left_reference.width(),
        right.label(),
        right_reference.width()
    );

    let padded_left = padder.pad(left_job, &right_reference)?;
    let padded_right = match padder.pad(right_job, &left_reference) {
        Ok(table) => table,
        Err(err) => {
            if err.is_cancellation() {
                write_json(
                    &left.recovery_path(),
                    &RecoveryArtifact {
                        state: PadState::Complete,
                        sentinel: padder.sentinel(),
                        table: padded_left,
                    },
                )?;
                warn!(
                    "{} side saved to {}",
                    left.label(),
                    left.recovery_path().display()
                );
            }
            return Err(err);
        }
    };

    let left_path = left.output_path();
    let right_path = right.output_path();
    padded_left.write_json(&left_path)?;
    padded_right.write_json(&right_path)?;
    for side in [left, right] {
        remove_if_present(&side.recovery_path())?;
    }
    let columns = padded_left
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    info!(
        "wrote {} and {}",
        left_path.display(),
        right_path.display()
    );
    Ok(Reconciled {
        left_path,
        right_path,
        columns,
    })
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SweepError::io(err, Some(path.to_path_buf()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn table(names: &[&str]) -> DistributionTable {
        let mut columns = vec![Column {
            name: "doc".into(),
            values: ColumnData::Int(vec![1, 2, 3]),
        }];
        columns.extend(names.iter().map(|name| Column::filled(*name, 0.25, 3)));
        DistributionTable::new(columns).expect("valid table")
    }

    fn names(table: &DistributionTable) -> Vec<&str> {
        table.column_names()
    }

    #[test]
    fn adds_reference_columns_filled_with_sentinel() {
        let dir = tempdir().expect("tempdir");
        let target = table(&["t_b"]);
        let reference = table(&["t_a", "t_c"]);
        let padded = Padder::default()
            .pad(PadJob::new(target, dir.path().join("r.json")), &reference)
            .expect("pad");
        assert_eq!(names(&padded), vec!["doc", "t_a", "t_b", "t_c"]);
        assert_eq!(
            padded.column("t_a").map(|c| &c.values),
            Some(&ColumnData::Float(vec![LARGE_NEGATIVE; 3]))
        );
        assert_eq!(
            padded.column("t_b").map(|c| &c.values),
            Some(&ColumnData::Float(vec![0.25; 3]))
        );
        assert!(!dir.path().join("r.json").exists());
    }

    #[test]
    fn padding_twice_changes_nothing() {
        let dir = tempdir().expect("tempdir");
        let reference = table(&["t1", "t2"]);
        let padder = Padder::default();
        let once = padder
            .pad(PadJob::new(table(&["t3"]), dir.path().join("r.json")), &reference)
            .expect("first pad");
        let twice = padder
            .pad(PadJob::new(once.clone(), dir.path().join("r.json")), &reference)
            .expect("second pad");
        assert_eq!(once, twice);
    }

    #[test]
    fn both_directions_yield_the_union() {
        let dir = tempdir().expect("tempdir");
        let a = table(&["a1", "shared"]);
        let b = table(&["b1", "b2", "shared"]);
        let padder = Padder::default();
        let a_padded = padder
            .pad(PadJob::new(a.clone(), dir.path().join("a.json")), &b)
            .expect("pad a");
        let b_padded = padder
            .pad(PadJob::new(b, dir.path().join("b.json")), &a)
            .expect("pad b");
        assert_eq!(names(&a_padded), names(&b_padded));
        assert_eq!(names(&a_padded), vec!["a1", "b1", "b2", "doc", "shared"]);
    }

    #[test]
    fn cancellation_after_first_column_checkpoints_and_resumes() {
        let dir = tempdir().expect("tempdir");
        let recovery = dir.path().join("fed_extended.intermediary.json");
        let input = dir.path().join("topic_dist.json");
        let target = table(&["z_own"]);
        target.write_json(&input).expect("write input");
        let reference = table(&["t3", "t1", "t2"]);

        let token = CancellationToken::new();
        let trigger = token.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let padder = Padder::default()
            .with_cancellation(token)
            .on_column_added(move |name| {
                log.lock().expect("lock").push(name.to_owned());
                trigger.cancel();
            });

        let job = PadJob::load(&input, &recovery).expect("load input");
        assert!(!job.is_resumed());
        let err = padder.pad(job, &reference).expect_err("cancelled");
        match &err {
            SweepError::CancellationDuringCheckpoint { path, completed } => {
                assert_eq!(path, &recovery);
                assert_eq!(completed, &vec!["t1".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*seen.lock().expect("lock"), vec!["t1".to_owned()]);

        let artifact: RecoveryArtifact = read_json(&recovery).expect("artifact");
        assert_eq!(
            artifact.state,
            PadState::PartiallyPadded {
                completed: vec!["t1".into()]
            }
        );
        assert_eq!(names(&artifact.table), vec!["doc", "t1", "z_own"]);

        let resumed_job = PadJob::load(&input, &recovery).expect("load recovery");
        assert!(resumed_job.is_resumed());
        let resumed = Padder::default()
            .pad(resumed_job, &reference)
            .expect("resumed pad");
        let uninterrupted = Padder::default()
            .pad(PadJob::new(target, dir.path().join("unused.json")), &reference)
            .expect("uninterrupted pad");
        assert_eq!(resumed, uninterrupted);
    }

    #[test]
    fn resuming_with_a_different_sentinel_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let recovery = dir.path().join("r.json");
        write_json(
            &recovery,
            &RecoveryArtifact {
                state: PadState::Pending,
                sentinel: -1.0,
                table: table(&[]),
            },
        )
        .expect("write artifact");
        let job = PadJob::load(&dir.path().join("missing.json"), &recovery).expect("load");
        assert!(matches!(
            Padder::default().pad(job, &table(&["t1"])),
            Err(SweepError::InvalidConfig(_))
        ));
    }

    fn sides(root: &Path) -> (Side, Side) {
        let fed = Side::new(root.join("fed"), "fed");
        let news = Side::new(root.join("news"), "news");
        table(&["fed_1", "fed_2"])
            .write_json(&fed.dir().join("topic_dist.json"))
            .expect("write fed");
        table(&["news_1", "news_2", "news_3"])
            .write_json(&news.dir().join("topic_dist.json"))
            .expect("write news");
        (fed, news)
    }

    #[test]
    fn reconcile_writes_both_sides_and_clears_recovery() {
        let dir = tempdir().expect("tempdir");
        let (fed, news) = sides(dir.path());
        let outcome = reconcile(&fed, &news, &Padder::default()).expect("reconcile");
        let fed_table = DistributionTable::read(&outcome.left_path).expect("fed output");
        let news_table = DistributionTable::read(&outcome.right_path).expect("news output");
        assert_eq!(names(&fed_table), names(&news_table));
        assert_eq!(outcome.columns.len(), 6);
        assert!(!fed.recovery_path().exists());
        assert!(!news.recovery_path().exists());
    }

    #[test]
    fn cancelled_second_side_keeps_first_result() {
        let dir = tempdir().expect("tempdir");
        let (fed, news) = sides(dir.path());
        let token = CancellationToken::new();
        let trigger = token.clone();
        let count = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&count);
        // fed gains three columns; cancel right after the first news column
        let padder = Padder::default()
            .with_cancellation(token)
            .on_column_added(move |_| {
                let mut added = counter.lock().expect("lock");
                *added += 1;
                if *added == 4 {
                    trigger.cancel();
                }
            });
        let err = reconcile(&fed, &news, &padder).expect_err("cancelled");
        assert!(err.is_cancellation());

        let fed_artifact: RecoveryArtifact = read_json(&fed.recovery_path()).expect("fed artifact");
        assert_eq!(fed_artifact.state, PadState::Complete);
        assert_eq!(fed_artifact.table.width(), 6);
        let news_artifact: RecoveryArtifact =
            read_json(&news.recovery_path()).expect("news artifact");
        assert_eq!(news_artifact.state.completed(), ["fed_1".to_owned()]);

        let outcome = reconcile(&fed, &news, &Padder::default()).expect("resume");
        let fed_table = DistributionTable::read(&outcome.left_path).expect("fed output");
        let news_table = DistributionTable::read(&outcome.right_path).expect("news output");
        assert_eq!(names(&fed_table), names(&news_table));
        assert!(!fed.recovery_path().exists());
    }
}
