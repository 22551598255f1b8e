//! Topic coherence scorers.
//!
//! Two measures are provided: UMass, which uses document co-occurrence in the
//! bag-of-words corpus, and NPMI, which uses boolean sliding windows over the
//! tokenized texts. Both segment each topic's ranked word list into pairs
//! `(w_i, w_j)` with `j < i` and average the pair scores per topic, then
//! across topics. Higher is better.

use ndarray::Axis;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::corpus::{BowCorpus, Document};
use crate::error::{Result, SweepError};
use crate::model::TopicModel;

const NPMI_EPSILON: f64 = 1e-12;

/// Computes one coherence value for a trained model.
pub trait CoherenceScorer {
    /// Scores `model` against the corpus it was trained on and the matching texts.
    fn score(
        &self,
        model: &dyn TopicModel,
        corpus: &BowCorpus,
        texts: &[Document],
    ) -> Result<f64>;

    /// Short human-readable name recorded in run summaries.
    fn describe(&self) -> String;
}

/// UMass coherence over the `top_n` most probable words of each topic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UMassCoherence {
    /// Words considered per topic.
    pub top_n: usize,
}

impl Default for UMassCoherence {
    fn default() -> Self {
        Self { top_n: 20 }
    }
}

impl CoherenceScorer for UMassCoherence {
    fn score(
        &self,
        model: &dyn TopicModel,
        corpus: &BowCorpus,
        _texts: &[Document],
    ) -> Result<f64> {
        ensure_top_n(self.top_n)?;
        let matrix = model.topic_word_matrix();
        let topics: Vec<Vec<usize>> = matrix
            .axis_iter(Axis(0))
            .map(|probs| {
                let mut ranked: Vec<usize> = (0..probs.len()).collect();
                ranked.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
                ranked.truncate(self.top_n);
                ranked
            })
            .collect();

        let relevant: FxHashSet<usize> = topics.iter().flatten().copied().collect();
        let mut doc_freq: FxHashMap<usize, u64> = FxHashMap::default();
        let mut co_freq: FxHashMap<(usize, usize), u64> = FxHashMap::default();
        for bow in corpus.documents() {
            let present: Vec<usize> = bow
                .iter()
                .map(|&(id, _)| id as usize)
                .filter(|id| relevant.contains(id))
                .collect();
            count_occurrences(&present, &mut doc_freq, &mut co_freq);
        }

        Ok(mean_over_topics(&topics, |earlier, later| {
            let base = *doc_freq.get(&earlier)?;
            if base == 0 {
                return None;
            }
            let joint = co_freq.get(&ordered(earlier, later)).copied().unwrap_or(0);
            Some(((joint as f64 + 1.0) / base as f64).ln())
        }))
    }

    fn describe(&self) -> String {
        format!("u_mass(top_n={})", self.top_n)
    }
}

/// Normalized pointwise mutual information over boolean sliding windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NpmiCoherence {
    /// Words considered per topic.
    pub top_n: usize,
    /// Sliding window length in tokens; shorter texts form a single window.
    pub window: usize,
}

impl Default for NpmiCoherence {
    fn default() -> Self {
        Self {
            top_n: 20,
            window: 10,
        }
    }
}

impl CoherenceScorer for NpmiCoherence {
    fn score(
        &self,
        model: &dyn TopicModel,
        _corpus: &BowCorpus,
        texts: &[Document],
    ) -> Result<f64> {
        ensure_top_n(self.top_n)?;
        if self.window == 0 {
            return Err(SweepError::InvalidConfig(
                "coherence window must be greater than zero".into(),
            ));
        }

        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let topics: Vec<Vec<usize>> = (0..model.num_topics())
            .map(|topic| {
                model
                    .topic_word_pairs(topic, self.top_n)
                    .into_iter()
                    .map(|(word, _)| {
                        let next = index.len();
                        *index.entry(word).or_insert(next)
                    })
                    .collect()
            })
            .collect();

        let mut window_freq: FxHashMap<usize, u64> = FxHashMap::default();
        let mut co_freq: FxHashMap<(usize, usize), u64> = FxHashMap::default();
        let mut windows = 0u64;
        for text in texts {
            let ids: Vec<Option<usize>> =
                text.iter().map(|token| index.get(token).copied()).collect();
            let span = self.window.min(ids.len());
            if span == 0 {
                continue;
            }
            for window in ids.windows(span) {
                let mut present: Vec<usize> = window.iter().flatten().copied().collect();
                present.sort_unstable();
                present.dedup();
                count_occurrences(&present, &mut window_freq, &mut co_freq);
                windows += 1;
            }
        }
        if windows == 0 {
            return Ok(0.0);
        }

        let total = windows as f64;
        Ok(mean_over_topics(&topics, |earlier, later| {
            let p_earlier = window_freq.get(&earlier).copied().unwrap_or(0) as f64 / total;
            let p_later = window_freq.get(&later).copied().unwrap_or(0) as f64 / total;
            if p_earlier == 0.0 || p_later == 0.0 {
                return None;
            }
            let joint = co_freq.get(&ordered(earlier, later)).copied().unwrap_or(0) as f64 / total
                + NPMI_EPSILON;
            let pmi = (joint / (p_earlier * p_later)).ln();
            Some(pmi / -joint.ln())
        }))
    }

    fn describe(&self) -> String {
        format!("c_npmi(top_n={}, window={})", self.top_n, self.window)
    }
}

/// Coherence measure selectable from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "measure", rename_all = "snake_case")]
pub enum Coherence {
    /// Document co-occurrence UMass.
    UMass(UMassCoherence),
    /// Sliding-window NPMI.
    Npmi(NpmiCoherence),
}

impl Default for Coherence {
    fn default() -> Self {
        Self::Npmi(NpmiCoherence::default())
    }
}

impl CoherenceScorer for Coherence {
    fn score(
        &self,
        model: &dyn TopicModel,
        corpus: &BowCorpus,
        texts: &[Document],
    ) -> Result<f64> {
        match self {
            Self::UMass(scorer) => scorer.score(model, corpus, texts),
            Self::Npmi(scorer) => scorer.score(model, corpus, texts),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::UMass(scorer) => scorer.describe(),
            Self::Npmi(scorer) => scorer.describe(),
        }
    }
}

fn ensure_top_n(top_n: usize) -> Result<()> {
    if top_n < 2 {
        return Err(SweepError::InvalidConfig(format!(
            "coherence needs at least two words per topic (top_n = {top_n})"
        )));
    }
    Ok(())
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Counts single and pairwise occurrences of the distinct ids in `present`.
fn count_occurrences(
    present: &[usize],
    single: &mut FxHashMap<usize, u64>,
    pairs: &mut FxHashMap<(usize, usize), u64>,
) {
    for (i, &a) in present.iter().enumerate() {
        *single.entry(a).or_insert(0) += 1;
        for &b in &present[i + 1..] {
            *pairs.entry(ordered(a, b)).or_insert(0) += 1;
        }
    }
}

/// Averages `pair_score(w_j, w_i)` over `j < i` within each topic, then across topics.
///
/// Pairs without a score and topics without any scored pair are skipped; a model
/// with no scored topic yields `0.0`.
fn mean_over_topics<F>(topics: &[Vec<usize>], mut pair_score: F) -> f64
where
    F: FnMut(usize, usize) -> Option<f64>,
{
    let mut topic_scores = Vec::with_capacity(topics.len());
    for words in topics {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, &later) in words.iter().enumerate().skip(1) {
            for &earlier in &words[..i] {
                if let Some(score) = pair_score(earlier, later) {
                    sum += score;
                    count += 1;
                }
            }
        }
        if count > 0 {
            topic_scores.push(sum / count as f64);
        }
    }
    if topic_scores.is_empty() {
        return 0.0;
    }
    topic_scores.iter().sum::<f64>() / topic_scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::build_corpus;
    use crate::model::LdaModel;
    use crate::preprocess::tokenize;
    use ndarray::array;
    use std::sync::Arc;

    fn fixture() -> (LdaModel, BowCorpus, Vec<Document>) {
        let texts: Vec<Document> = ["orbit rocket", "orbit rocket", "bat inning", "orbit bat"]
            .iter()
            .map(|text| tokenize(text))
            .collect();
        let (vocab, corpus) = build_corpus(&texts).expect("build corpus");
        // vocabulary order: orbit, rocket, bat, inning
        let phi = array![[0.5, 0.4, 0.05, 0.05], [0.05, 0.05, 0.5, 0.4]];
        let theta = array![[0.9, 0.1], [0.9, 0.1], [0.1, 0.9], [0.5, 0.5]];
        (LdaModel::new(Arc::new(vocab), phi, theta), corpus, texts)
    }

    #[test]
    fn umass_matches_hand_computation() {
        let (model, corpus, texts) = fixture();
        let score = UMassCoherence { top_n: 2 }
            .score(&model, &corpus, &texts)
            .expect("score");
        // topic 1: D(orbit)=3, D(orbit, rocket)=2 -> ln(3/3)
        // topic 2: D(bat)=2, D(bat, inning)=1 -> ln(2/2)
        assert!(score.abs() < 1e-12);
    }

    #[test]
    fn npmi_rewards_words_that_always_co_occur() {
        let (model, corpus, texts) = fixture();
        let score = NpmiCoherence { top_n: 2, window: 10 }
            .score(&model, &corpus, &texts)
            .expect("score");
        assert!(score.is_finite());
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn coherence_enum_dispatches_and_validates() {
        let (model, corpus, texts) = fixture();
        let direct = UMassCoherence { top_n: 3 }
            .score(&model, &corpus, &texts)
            .expect("direct score");
        let dispatched = Coherence::UMass(UMassCoherence { top_n: 3 })
            .score(&model, &corpus, &texts)
            .expect("dispatched score");
        assert_eq!(direct, dispatched);
        assert!(matches!(
            UMassCoherence { top_n: 1 }.score(&model, &corpus, &texts),
            Err(SweepError::InvalidConfig(_))
        ));
        assert!(Coherence::default().describe().starts_with("c_npmi"));
    }

    #[test]
    fn npmi_without_texts_is_zero() {
        let (model, corpus, _) = fixture();
        let score = NpmiCoherence::default()
            .score(&model, &corpus, &[])
            .expect("score");
        assert_eq!(score, 0.0);
    }
}
