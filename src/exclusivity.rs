//! FREX-style word exclusivity computed from a topic-word probability matrix.
//!
//! The exclusivity of word `w` in topic `k` is the share of the word's total
//! probability mass (summed over topics) that topic `k` holds. Words owned by a
//! single topic score `1.0` there; words spread evenly across `n` topics score
//! `1 / n` everywhere.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Denominator used for words that no topic assigns any probability to.
pub const ZERO_MASS_FLOOR: f64 = 1e-10;

/// Computes the per-entry exclusivity matrix, shaped like `topic_word`.
///
/// Columns summing to exactly zero use [`ZERO_MASS_FLOOR`] as denominator so the
/// result stays finite.
#[must_use]
pub fn exclusivity_matrix(topic_word: &Array2<f64>) -> Array2<f64> {
    let mut totals = topic_word.sum_axis(Axis(0));
    totals.mapv_inplace(|total| if total == 0.0 { ZERO_MASS_FLOOR } else { total });
    topic_word / &totals
}

/// Strategy for collapsing the exclusivity matrix into one comparable number per model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExclusivityReduction {
    /// Mean over every (topic, word) entry.
    #[default]
    Mean,
    /// Sum over every entry.
    Sum,
    /// Mean over each topic's `k` most probable words, averaged across topics.
    TopWords(usize),
}

impl ExclusivityReduction {
    /// Reduces an exclusivity matrix, using `topic_word` to rank words when needed.
    ///
    /// An empty matrix reduces to `0.0`.
    #[must_use]
    pub fn reduce(&self, exclusivity: &Array2<f64>, topic_word: &Array2<f64>) -> f64 {
        if exclusivity.is_empty() {
            return 0.0;
        }
        match *self {
            Self::Mean => exclusivity.mean().unwrap_or(0.0),
            Self::Sum => exclusivity.sum(),
            Self::TopWords(k) => top_words_mean(exclusivity, topic_word, k),
        }
    }
}

fn top_words_mean(exclusivity: &Array2<f64>, topic_word: &Array2<f64>, k: usize) -> f64 {
    let k = k.min(topic_word.ncols());
    if k == 0 {
        return 0.0;
    }
    let mut topic_means = Vec::with_capacity(topic_word.nrows());
    for (topic, probs) in topic_word.axis_iter(Axis(0)).enumerate() {
        let mut ranked: Vec<usize> = (0..probs.len()).collect();
        ranked.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
        let sum: f64 = ranked[..k]
            .iter()
            .map(|&word| exclusivity[[topic, word]])
            .sum();
        topic_means.push(sum / k as f64);
    }
    topic_means.iter().sum::<f64>() / topic_means.len() as f64
}

/// Computes the exclusivity matrix and reduces it in one step.
#[must_use]
pub fn exclusivity_score(topic_word: &Array2<f64>, reduction: ExclusivityReduction) -> f64 {
    let matrix = exclusivity_matrix(topic_word);
    reduction.reduce(&matrix, topic_word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sole_owner_scores_one() {
        let topic_word = array![[0.6, 0.0, 0.4], [0.0, 0.5, 0.5]];
        let matrix = exclusivity_matrix(&topic_word);
        assert!((matrix[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((matrix[[1, 1]] - 1.0).abs() < 1e-12);
        assert_eq!(matrix[[1, 0]], 0.0);
    }

    #[test]
    fn zero_mass_column_stays_finite() {
        let topic_word = array![[0.5, 0.0, 0.5], [0.5, 0.0, 0.5]];
        let matrix = exclusivity_matrix(&topic_word);
        assert!(matrix.iter().all(|value| value.is_finite()));
        assert_eq!(matrix[[0, 1]], 0.0);
        assert_eq!(matrix[[1, 1]], 0.0);
        assert!(exclusivity_score(&topic_word, ExclusivityReduction::Mean).is_finite());
    }

    #[test]
    fn evenly_shared_words_score_inverse_topic_count() {
        let topic_word = array![[0.5, 0.5], [0.5, 0.5], [0.5, 0.5], [0.5, 0.5]];
        let matrix = exclusivity_matrix(&topic_word);
        assert!(matrix.iter().all(|value| (value - 0.25).abs() < 1e-12));
    }

    #[test]
    fn reductions_disagree_in_expected_directions() {
        let topic_word = array![[0.9, 0.1, 0.0], [0.0, 0.1, 0.9]];
        let matrix = exclusivity_matrix(&topic_word);
        let mean = ExclusivityReduction::Mean.reduce(&matrix, &topic_word);
        let sum = ExclusivityReduction::Sum.reduce(&matrix, &topic_word);
        let top = ExclusivityReduction::TopWords(1).reduce(&matrix, &topic_word);
        assert!((sum - 3.0).abs() < 1e-12);
        assert!((mean - 0.5).abs() < 1e-12);
        assert!((top - 1.0).abs() < 1e-12);
    }

    #[test]
    fn top_words_clamps_to_vocabulary_size() {
        let topic_word = array![[0.7, 0.3], [0.3, 0.7]];
        let matrix = exclusivity_matrix(&topic_word);
        let clamped = ExclusivityReduction::TopWords(50).reduce(&matrix, &topic_word);
        let mean = ExclusivityReduction::Mean.reduce(&matrix, &topic_word);
        assert!((clamped - mean).abs() < 1e-12);
    }
}
