//! Trained topic model handle and the per-model topic table.

use std::sync::Arc;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::corpus::Vocabulary;

/// Opaque handle over a trained topic model.
///
/// The sweep only needs the topic-word matrix, ranked words per topic, and
/// document-topic assignments, so any topic-modeling backend can sit behind it.
pub trait TopicModel {
    /// Number of topics the model was trained with.
    fn num_topics(&self) -> usize;

    /// Topic-word probabilities, shaped `num_topics × vocabulary_size`.
    fn topic_word_matrix(&self) -> Array2<f64>;

    /// The `top_n` most probable `(word, probability)` pairs of `topic` (0-indexed),
    /// most probable first.
    fn topic_word_pairs(&self, topic: usize, top_n: usize) -> Vec<(String, f64)>;

    /// Document-topic proportions, shaped `num_documents × num_topics`.
    fn document_topics(&self) -> Array2<f64>;
}

/// One `(word, topic, prob)` row of a [`TopicTable`]. Topics are 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    /// Token string.
    pub word: String,
    /// Topic number, starting at 1.
    pub topic: usize,
    /// Probability of `word` under `topic`.
    pub prob: f64,
}

/// Ranked words of every topic of one trained model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicTable {
    /// Rows grouped by topic, most probable word first within each topic.
    pub rows: Vec<TopicRow>,
}

impl TopicTable {
    /// Extracts the `top_n` words of every topic of `model`.
    #[must_use]
    pub fn from_model<M: TopicModel + ?Sized>(model: &M, top_n: usize) -> Self {
        let mut rows = Vec::with_capacity(model.num_topics() * top_n);
        for topic in 0..model.num_topics() {
            for (word, prob) in model.topic_word_pairs(topic, top_n) {
                rows.push(TopicRow {
                    word,
                    topic: topic + 1,
                    prob,
                });
            }
        }
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct topics referenced by the rows.
    #[must_use]
    pub fn num_topics(&self) -> usize {
        self.rows.iter().map(|row| row.topic).max().unwrap_or(0)
    }
}

/// LDA model produced by [`crate::trainer::LdaTrainer`].
#[derive(Debug, Clone)]
pub struct LdaModel {
    vocabulary: Arc<Vocabulary>,
    phi: Array2<f64>,
    theta: Array2<f64>,
}

impl LdaModel {
    /// Wraps estimated topic-word (`phi`) and document-topic (`theta`) matrices.
    pub fn new(vocabulary: Arc<Vocabulary>, phi: Array2<f64>, theta: Array2<f64>) -> Self {
        Self {
            vocabulary,
            phi,
            theta,
        }
    }

    /// Vocabulary shared with the corpus the model was trained on.
    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

impl TopicModel for LdaModel {
    fn num_topics(&self) -> usize {
        self.phi.nrows()
    }

    fn topic_word_matrix(&self) -> Array2<f64> {
        self.phi.clone()
    }

    fn topic_word_pairs(&self, topic: usize, top_n: usize) -> Vec<(String, f64)> {
        if topic >= self.phi.nrows() {
            return Vec::new();
        }
        let row = self.phi.index_axis(Axis(0), topic);
        let mut ranked: Vec<(usize, f64)> = row.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(top_n)
            .filter_map(|(id, prob)| {
                let id = u32::try_from(id).ok()?;
                self.vocabulary.word(id).map(|word| (word.to_owned(), prob))
            })
            .collect()
    }

    fn document_topics(&self) -> Array2<f64> {
        self.theta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::build_corpus;
    use crate::preprocess::tokenize;
    use ndarray::array;

    fn model() -> LdaModel {
        let documents = vec![tokenize("orbit rocket fuel")];
        let (vocab, _) = build_corpus(&documents).expect("build corpus");
        let phi = array![[0.2, 0.5, 0.3], [0.6, 0.1, 0.3]];
        let theta = array![[0.5, 0.5]];
        LdaModel::new(Arc::new(vocab), phi, theta)
    }

    #[test]
    fn topic_word_pairs_are_ranked() {
        let model = model();
        let pairs = model.topic_word_pairs(0, 2);
        assert_eq!(pairs[0].0, "rocket");
        assert_eq!(pairs[1].0, "fuel");
        assert!(model.topic_word_pairs(5, 2).is_empty());
    }

    #[test]
    fn topic_table_is_one_indexed() {
        let table = TopicTable::from_model(&model(), 2);
        assert_eq!(table.len(), 4);
        assert_eq!(table.num_topics(), 2);
        assert_eq!(table.rows[0].topic, 1);
        assert_eq!(table.rows[2].word, "orbit");
        assert_eq!(table.rows[2].topic, 2);
    }
}
