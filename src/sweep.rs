//! Sequential sweep over a closed range of topic counts.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::cancel::CancellationToken;
use crate::coherence::CoherenceScorer;
use crate::config::SweepConfig;
use crate::corpus::{BowCorpus, Document, Vocabulary};
use crate::error::{Result, SweepError};
use crate::exclusivity::exclusivity_score;
use crate::metrics::{
    sample_rss_kb, MetricsRow, MetricsTable, ModelMetrics, StopReason, SweepMetrics,
};
use crate::model::{TopicModel, TopicTable};
use crate::store::{now_rfc3339, ResultStore, RunSummary};
use crate::trainer::TopicTrainer;

/// Artifacts produced by a completed sweep.
#[derive(Debug, Clone)]
pub struct SweepArtifacts {
    /// Scores of every model, ascending by topic count.
    pub metrics: MetricsTable,
    /// Topic table paths, one per model, in sweep order.
    pub topic_tables: Vec<PathBuf>,
    /// Path of the metrics CSV.
    pub metrics_path: PathBuf,
    /// Path of the JSON run summary.
    pub summary_path: PathBuf,
    /// Per-model timings and memory samples.
    pub timings: SweepMetrics,
}

type ModelHook<'a> = Box<dyn FnMut(&MetricsRow) + 'a>;

/// Trains, scores, and persists one model per topic count.
///
/// Models are trained strictly one after another in ascending order; any
/// parallelism happens inside the trainer. The topic table of `n` is on disk
/// before training of `n + 1` starts.
pub struct Sweep<'a, T, C> {
    cfg: SweepConfig,
    trainer: T,
    scorer: C,
    store: &'a ResultStore,
    cancel: Option<CancellationToken>,
    on_model_scored: Option<ModelHook<'a>>,
}

impl<T: fmt::Debug, C: fmt::Debug> fmt::Debug for Sweep<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweep")
            .field("cfg", &self.cfg)
            .field("trainer", &self.trainer)
            .field("scorer", &self.scorer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<'a, T, C> Sweep<'a, T, C>
where
    T: TopicTrainer,
    C: CoherenceScorer,
{
    /// Creates a sweep writing into `store`.
    pub fn new(cfg: SweepConfig, trainer: T, scorer: C, store: &'a ResultStore) -> Self {
        Self {
            cfg,
            trainer,
            scorer,
            store,
            cancel: None,
            on_model_scored: None,
        }
    }

    /// Checks `token` before each model is trained.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Calls `hook` after each model is scored and its topic table persisted.
    #[must_use]
    pub fn on_model_scored<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&MetricsRow) + 'a,
    {
        self.on_model_scored = Some(Box::new(hook));
        self
    }

    /// Returns the sweep configuration.
    #[must_use]
    pub fn config(&self) -> &SweepConfig {
        &self.cfg
    }

    /// Returns the trainer.
    #[must_use]
    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Runs the sweep over `corpus`, whose documents are `texts`.
    ///
    /// Configuration is validated before any model is trained. A trainer error
    /// stops the sweep with [`SweepError::TrainingFailure`]; topic tables
    /// already written are kept and the rows scored so far are written to the
    /// partial metrics file. Cancellation behaves the same way and returns
    /// [`SweepError::SweepCancelled`].
    pub fn run(
        &mut self,
        corpus: &BowCorpus,
        vocabulary: &Arc<Vocabulary>,
        texts: &[Document],
    ) -> Result<SweepArtifacts> {
        self.cfg.validate()?;
        if vocabulary.is_empty() || corpus.num_tokens() == 0 {
            return Err(SweepError::EmptyCorpus);
        }

        let model_name = self.cfg.model_name.clone();
        let capacity = self.cfg.model_count();
        let mut table = MetricsTable::with_capacity(capacity);
        let mut timings = SweepMetrics::new(capacity);
        let mut topic_tables = Vec::with_capacity(capacity);
        let start = Instant::now();
        info!(
            "sweeping n_topics {}..={} over {} documents ({} terms)",
            self.cfg.min_topics,
            self.cfg.max_topics,
            corpus.len(),
            vocabulary.len()
        );

        for n_topics in self.cfg.min_topics..=self.cfg.max_topics {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                timings.stop_reason = StopReason::Cancelled;
                timings.total_duration = start.elapsed();
                self.write_partial(corpus, vocabulary, &table, &timings);
                return Err(SweepError::SweepCancelled {
                    completed: table.topic_counts(),
                });
            }
            let model_start = Instant::now();
            let outcome = self
                .step(corpus, vocabulary, texts, n_topics)
                .and_then(|(row, topics, training)| {
                    let path = self.store.write_topic_table(&model_name, n_topics, &topics)?;
                    table.push(row)?;
                    Ok((row, path, training))
                });
            let (row, path, elapsed_training) = match outcome {
                Ok(scored) => scored,
                Err(err) => {
                    if let SweepError::TrainingFailure { n_topics, .. } = &err {
                        timings.stop_reason = StopReason::TrainingFailed {
                            n_topics: *n_topics,
                        };
                    }
                    warn!("sweep aborted at n_topics={n_topics}: {err}");
                    timings.total_duration = start.elapsed();
                    self.write_partial(corpus, vocabulary, &table, &timings);
                    return Err(err);
                }
            };

            let elapsed_model = model_start.elapsed();
            timings.models.push(ModelMetrics {
                n_topics,
                elapsed_training,
                elapsed_scoring: elapsed_model.saturating_sub(elapsed_training),
                elapsed_total: start.elapsed(),
                rss_kb: sample_rss_kb(),
            });
            if self.cfg.show_progress {
                info!(
                    "n_topics={n_topics}: exclusivity={:.4} coherence={:.4} ({:.2?})",
                    row.exclusivity, row.coherence, elapsed_model
                );
            }
            topic_tables.push(path);
            if let Some(hook) = self.on_model_scored.as_mut() {
                hook(&row);
            }
        }

        timings.total_duration = start.elapsed();
        let metrics_path = self.store.write_metrics(&model_name, &table, false)?;
        let summary = self.summary(corpus, vocabulary, &table, &timings);
        let summary_path = self.store.write_summary(&model_name, &summary)?;
        info!(
            "sweep finished in {:.2?}; metrics written to {}",
            timings.total_duration,
            metrics_path.display()
        );

        Ok(SweepArtifacts {
            metrics: table,
            topic_tables,
            metrics_path,
            summary_path,
            timings,
        })
    }

    /// Trains and scores one model, also returning the time spent training.
    fn step(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Arc<Vocabulary>,
        texts: &[Document],
        n_topics: usize,
    ) -> Result<(MetricsRow, TopicTable, Duration)> {
        let start = Instant::now();
        let model = self
            .trainer
            .train(corpus, vocabulary, n_topics, self.cfg.workers)
            .map_err(|err| SweepError::TrainingFailure {
                n_topics,
                reason: err.to_string(),
            })?;
        let training = start.elapsed();
        let topics = TopicTable::from_model(&model, self.cfg.topic_words);
        let exclusivity = exclusivity_score(&model.topic_word_matrix(), self.cfg.exclusivity);
        let coherence = self.scorer.score(&model, corpus, texts)?;
        let row = MetricsRow {
            n_topics,
            exclusivity,
            coherence,
        };
        Ok((row, topics, training))
    }

    fn summary(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Vocabulary,
        table: &MetricsTable,
        timings: &SweepMetrics,
    ) -> RunSummary {
        RunSummary {
            created_at: now_rfc3339(),
            sweep: self.cfg.clone(),
            trainer: self.trainer.describe(),
            coherence: self.scorer.describe(),
            documents: corpus.len(),
            vocabulary: vocabulary.len(),
            rows: table.rows().to_vec(),
            metrics: timings.clone(),
        }
    }

    /// Persists what an aborted sweep has scored so far.
    ///
    /// Failures are logged rather than returned so the abort reason reaches the caller.
    fn write_partial(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Vocabulary,
        table: &MetricsTable,
        timings: &SweepMetrics,
    ) {
        let model_name = &self.cfg.model_name;
        match self.store.write_metrics(model_name, table, true) {
            Ok(path) => info!(
                "partial metrics ({} row(s)) written to {}",
                table.len(),
                path.display()
            ),
            Err(err) => warn!("unable to write partial metrics: {err}"),
        }
        let summary = self.summary(corpus, vocabulary, table, timings);
        if let Err(err) = self.store.write_summary(model_name, &summary) {
            warn!("unable to write run summary: {err}");
        }
    }
}
