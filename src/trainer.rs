//! Topic model training: the [`TopicTrainer`] seam and the default Gibbs-sampling LDA trainer.

use std::sync::Arc;
use std::time::Instant;

use log::debug;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::{LdaBuilder, LdaConfig};
use crate::corpus::{BowCorpus, Vocabulary};
use crate::error::{Result, SweepError};
use crate::model::{LdaModel, TopicModel};

mod gibbs;

use gibbs::{Shard, TopicCounts};

/// Trains one topic model for a given topic count.
///
/// Implementations may parallelise internally over at most `workers` threads;
/// the sweep only passes the value through.
pub trait TopicTrainer {
    /// Model type produced by the trainer.
    type Model: TopicModel;

    /// Trains a model with `n_topics` topics on `corpus`.
    fn train(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Arc<Vocabulary>,
        n_topics: usize,
        workers: usize,
    ) -> Result<Self::Model>;

    /// Short description recorded in run summaries.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}

/// Collapsed Gibbs sampling LDA trainer.
///
/// With `workers > 1` documents are split into contiguous shards that are
/// sampled in parallel against a snapshot of the global topic-word counts,
/// and the shard deltas are merged after every pass in shard order. A fixed
/// seed therefore gives the same model regardless of thread scheduling.
#[derive(Debug, Clone, Default)]
pub struct LdaTrainer {
    cfg: LdaConfig,
}

impl LdaTrainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: LdaConfig) -> Self {
        Self { cfg }
    }

    /// Returns an [`LdaBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> LdaBuilder {
        LdaConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &LdaConfig {
        &self.cfg
    }
}

impl TopicTrainer for LdaTrainer {
    type Model = LdaModel;

    fn train(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Arc<Vocabulary>,
        n_topics: usize,
        workers: usize,
    ) -> Result<LdaModel> {
        if n_topics == 0 {
            return Err(SweepError::InvalidConfig(
                "n_topics must be greater than zero".into(),
            ));
        }
        if workers == 0 {
            return Err(SweepError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        self.cfg.validate()?;
        let vocab_size = vocabulary.len();
        if vocab_size == 0 || corpus.num_tokens() == 0 {
            return Err(SweepError::EmptyCorpus);
        }
        if let Some(&(id, _)) = corpus
            .documents()
            .iter()
            .flatten()
            .find(|&&(id, _)| id as usize >= vocab_size)
        {
            return Err(SweepError::Internal(format!(
                "corpus references word id {id} outside a vocabulary of {vocab_size}"
            )));
        }

        let alpha = self.cfg.alpha_for(n_topics);
        let beta = self.cfg.beta_for(n_topics);
        let mut rng = match self.cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let shard_count = workers.min(corpus.len()).max(1);
        let shard_len = corpus.len().div_ceil(shard_count);
        let mut counts = TopicCounts::new(n_topics, vocab_size);
        let mut shards: Vec<Shard> = Vec::with_capacity(shard_count);
        for block in corpus.documents().chunks(shard_len) {
            let shard_rng = StdRng::seed_from_u64(rng.gen());
            shards.push(Shard::initialise(block, &mut counts, &mut rng, shard_rng));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|err| SweepError::Internal(format!("unable to build worker pool: {err}")))?;

        let start = Instant::now();
        for pass in 0..self.cfg.iterations {
            let deltas: Vec<_> = pool.install(|| {
                shards
                    .par_iter_mut()
                    .map(|shard| shard.sample(&counts, alpha, beta))
                    .collect()
            });
            for delta in &deltas {
                counts.apply(delta)?;
            }
            if self.cfg.show_progress && (pass + 1) % 50 == 0 {
                debug!(
                    "n_topics {n_topics}: pass {}/{} ({:.2?})",
                    pass + 1,
                    self.cfg.iterations,
                    start.elapsed()
                );
            }
        }

        let vb = vocab_size as f64 * beta;
        let phi = Array2::from_shape_fn((n_topics, vocab_size), |(topic, word)| {
            (f64::from(counts.word_topic(topic, word)) + beta)
                / (f64::from(counts.topic_total(topic)) + vb)
        });

        let ka = n_topics as f64 * alpha;
        let mut theta = Array2::<f64>::zeros((corpus.len(), n_topics));
        let per_doc = shards
            .iter()
            .flat_map(|shard| shard.doc_topic().iter().zip(shard.doc_lengths()));
        for (mut row, (doc_counts, len)) in theta.rows_mut().into_iter().zip(per_doc) {
            let denom = len as f64 + ka;
            for (value, &count) in row.iter_mut().zip(doc_counts) {
                *value = (f64::from(count) + alpha) / denom;
            }
        }

        Ok(LdaModel::new(Arc::clone(vocabulary), phi, theta))
    }

    fn describe(&self) -> String {
        format!(
            "lda_gibbs(iterations={}, alpha={:?}, beta={:?}, seed={:?})",
            self.cfg.iterations, self.cfg.alpha, self.cfg.beta, self.cfg.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::build_corpus;
    use crate::preprocess::tokenize;

    fn corpus() -> (Arc<Vocabulary>, BowCorpus) {
        let documents: Vec<_> = [
            "rocket orbit launch rocket orbit",
            "orbit launch rocket fuel",
            "pitcher inning homer pitcher",
            "inning homer pitcher bat",
            "rocket fuel orbit",
            "bat homer inning",
        ]
        .iter()
        .map(|text| tokenize(text))
        .collect();
        let (vocab, corpus) = build_corpus(&documents).expect("build corpus");
        (Arc::new(vocab), corpus)
    }

    fn trainer(seed: u64) -> LdaTrainer {
        LdaTrainer::new(
            LdaTrainer::builder()
                .iterations(60)
                .seed(Some(seed))
                .build()
                .expect("config should be valid"),
        )
    }

    #[test]
    fn matrices_are_probability_distributions() {
        let (vocab, corpus) = corpus();
        let model = trainer(7).train(&corpus, &vocab, 3, 2).expect("training");
        let phi = model.topic_word_matrix();
        assert_eq!(phi.dim(), (3, vocab.len()));
        for row in phi.rows() {
            assert!(row.iter().all(|&p| p >= 0.0));
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        let theta = model.document_topics();
        assert_eq!(theta.dim(), (corpus.len(), 3));
        for row in theta.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let (vocab, corpus) = corpus();
        let first = trainer(11).train(&corpus, &vocab, 2, 3).expect("first run");
        let second = trainer(11).train(&corpus, &vocab, 2, 3).expect("second run");
        assert_eq!(first.topic_word_matrix(), second.topic_word_matrix());
        assert_eq!(first.document_topics(), second.document_topics());
    }

    #[test]
    fn more_workers_than_documents_is_accepted() {
        let (vocab, corpus) = corpus();
        let model = trainer(3).train(&corpus, &vocab, 2, 32).expect("training");
        assert_eq!(model.num_topics(), 2);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let (vocab, corpus) = corpus();
        assert!(matches!(
            trainer(1).train(&corpus, &vocab, 0, 1),
            Err(SweepError::InvalidConfig(_))
        ));
        assert!(matches!(
            trainer(1).train(&corpus, &vocab, 2, 0),
            Err(SweepError::InvalidConfig(_))
        ));
        let empty = Arc::new(Vocabulary::default());
        assert!(matches!(
            trainer(1).train(&BowCorpus::default(), &empty, 2, 1),
            Err(SweepError::EmptyCorpus)
        ));
    }
}
