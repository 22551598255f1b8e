use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::corpus::WordId;
use crate::error::{Result, SweepError};

/// Global topic-word and topic-total counts shared by every shard.
#[derive(Clone, Debug)]
pub(crate) struct TopicCounts {
    n_topics: usize,
    vocab_size: usize,
    /// Row-major `n_topics × vocab_size` counts.
    word_topic: Vec<u32>,
    topic_totals: Vec<u32>,
}

impl TopicCounts {
    pub(crate) fn new(n_topics: usize, vocab_size: usize) -> Self {
        Self {
            n_topics,
            vocab_size,
            word_topic: vec![0; n_topics * vocab_size],
            topic_totals: vec![0; n_topics],
        }
    }

    pub(crate) fn add(&mut self, topic: usize, word: WordId) {
        self.word_topic[topic * self.vocab_size + word as usize] += 1;
        self.topic_totals[topic] += 1;
    }

    pub(crate) fn word_topic(&self, topic: usize, word: usize) -> u32 {
        self.word_topic[topic * self.vocab_size + word]
    }

    pub(crate) fn topic_total(&self, topic: usize) -> u32 {
        self.topic_totals[topic]
    }

    /// Folds a shard's reassignment deltas into the global counts.
    pub(crate) fn apply(&mut self, delta: &ShardDelta) -> Result<()> {
        for (&index, &change) in &delta.word_topic {
            self.word_topic[index] = shifted(self.word_topic[index], change)?;
        }
        for (total, &change) in self.topic_totals.iter_mut().zip(&delta.topic_totals) {
            *total = shifted(*total, change)?;
        }
        Ok(())
    }
}

fn shifted(count: u32, change: i64) -> Result<u32> {
    u32::try_from(i64::from(count) + change)
        .map_err(|_| SweepError::Internal("topic count left the u32 range".into()))
}

/// Count changes produced by one sampling pass over a shard.
#[derive(Debug, Default)]
pub(crate) struct ShardDelta {
    word_topic: FxHashMap<usize, i64>,
    topic_totals: Vec<i64>,
}

impl ShardDelta {
    fn new(n_topics: usize) -> Self {
        Self {
            word_topic: FxHashMap::default(),
            topic_totals: vec![0; n_topics],
        }
    }

    fn record_move(&mut self, vocab_size: usize, word: usize, from: usize, to: usize) {
        *self.word_topic.entry(from * vocab_size + word).or_insert(0) -= 1;
        *self.word_topic.entry(to * vocab_size + word).or_insert(0) += 1;
        self.topic_totals[from] -= 1;
        self.topic_totals[to] += 1;
    }
}

/// Contiguous block of documents sampled by one worker.
pub(crate) struct Shard {
    tokens: Vec<Vec<WordId>>,
    assignments: Vec<Vec<usize>>,
    doc_topic: Vec<Vec<u32>>,
    rng: StdRng,
    local: TopicCounts,
    weights: Vec<f64>,
}

impl Shard {
    /// Expands bag-of-words documents into token lists and assigns random initial topics,
    /// registering each assignment in `counts`.
    pub(crate) fn initialise<R: Rng + ?Sized>(
        documents: &[Vec<(WordId, u32)>],
        counts: &mut TopicCounts,
        init_rng: &mut R,
        rng: StdRng,
    ) -> Self {
        let n_topics = counts.n_topics;
        let mut tokens = Vec::with_capacity(documents.len());
        let mut assignments = Vec::with_capacity(documents.len());
        let mut doc_topic = Vec::with_capacity(documents.len());
        for bow in documents {
            let expanded: Vec<WordId> = bow
                .iter()
                .flat_map(|&(word, count)| std::iter::repeat(word).take(count as usize))
                .collect();
            let mut topics = Vec::with_capacity(expanded.len());
            let mut per_topic = vec![0u32; n_topics];
            for &word in &expanded {
                let topic = init_rng.gen_range(0..n_topics);
                topics.push(topic);
                per_topic[topic] += 1;
                counts.add(topic, word);
            }
            tokens.push(expanded);
            assignments.push(topics);
            doc_topic.push(per_topic);
        }
        Self {
            tokens,
            assignments,
            doc_topic,
            rng,
            local: TopicCounts::new(n_topics, counts.vocab_size),
            weights: vec![0.0; n_topics],
        }
    }

    /// Runs one collapsed Gibbs pass against a snapshot of the global counts.
    pub(crate) fn sample(&mut self, global: &TopicCounts, alpha: f64, beta: f64) -> ShardDelta {
        let Self {
            tokens,
            assignments,
            doc_topic,
            rng,
            local,
            weights,
        } = self;
        local.word_topic.clone_from(&global.word_topic);
        local.topic_totals.clone_from(&global.topic_totals);

        let n_topics = local.n_topics;
        let vocab_size = local.vocab_size;
        let vb = vocab_size as f64 * beta;
        let mut delta = ShardDelta::new(n_topics);

        for ((doc_tokens, doc_assignments), doc_counts) in
            tokens.iter().zip(assignments.iter_mut()).zip(doc_topic.iter_mut())
        {
            for (&word, assigned) in doc_tokens.iter().zip(doc_assignments.iter_mut()) {
                let word = word as usize;
                let old = *assigned;
                doc_counts[old] -= 1;
                local.word_topic[old * vocab_size + word] -= 1;
                local.topic_totals[old] -= 1;

                let mut cumulative = 0.0;
                for (topic, weight) in weights.iter_mut().enumerate() {
                    let left = f64::from(doc_counts[topic]) + alpha;
                    let right = (f64::from(local.word_topic[topic * vocab_size + word]) + beta)
                        / (f64::from(local.topic_totals[topic]) + vb);
                    cumulative += left * right;
                    *weight = cumulative;
                }
                let draw = rng.gen::<f64>() * cumulative;
                let new = weights
                    .iter()
                    .position(|&edge| draw < edge)
                    .unwrap_or(n_topics - 1);

                doc_counts[new] += 1;
                local.word_topic[new * vocab_size + word] += 1;
                local.topic_totals[new] += 1;
                *assigned = new;
                if new != old {
                    delta.record_move(vocab_size, word, old, new);
                }
            }
        }
        delta
    }

    /// Per-document topic counts, in shard document order.
    pub(crate) fn doc_topic(&self) -> &[Vec<u32>] {
        &self.doc_topic
    }

    /// Number of tokens in each document, in shard document order.
    pub(crate) fn doc_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.tokens.iter().map(Vec::len)
    }
}
