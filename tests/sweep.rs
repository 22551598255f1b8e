use std::cell::RefCell;
use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use topic_sweep::model::LdaModel;
use topic_sweep::store::{read_json, read_metrics, read_topic_table};
use topic_sweep::{
    build_corpus, BowCorpus, CancellationToken, Coherence, Document, LdaTrainer, ResultStore,
    RunSummary, StopReason, Sweep, SweepConfig, SweepError, TopicTrainer, UMassCoherence,
    Vocabulary,
};

fn documents() -> Vec<Document> {
    [
        "rate inflation policy rate committee",
        "inflation rate outlook policy",
        "market stock earnings stock",
        "earnings market investor stock",
        "policy committee inflation market",
    ]
    .iter()
    .map(|text| text.split_whitespace().map(str::to_owned).collect())
    .collect()
}

fn corpus() -> (Arc<Vocabulary>, BowCorpus, Vec<Document>) {
    let docs = documents();
    let (vocabulary, corpus) = build_corpus(&docs).expect("build corpus");
    (Arc::new(vocabulary), corpus, docs)
}

fn lda(seed: u64) -> LdaTrainer {
    LdaTrainer::new(
        LdaTrainer::builder()
            .iterations(40)
            .seed(Some(seed))
            .build()
            .expect("valid lda config"),
    )
}

fn sweep_config(min_topics: usize, max_topics: usize) -> SweepConfig {
    SweepConfig::builder()
        .topic_range(min_topics, max_topics)
        .workers(2)
        .show_progress(false)
        .build()
        .expect("valid sweep config")
}

/// Delegates to the LDA trainer, recording every requested topic count and
/// failing for `fail_at`.
struct RecordingTrainer {
    inner: LdaTrainer,
    calls: RefCell<Vec<usize>>,
    fail_at: Option<usize>,
}

impl RecordingTrainer {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            inner: lda(5),
            calls: RefCell::new(Vec::new()),
            fail_at,
        }
    }
}

impl TopicTrainer for &RecordingTrainer {
    type Model = LdaModel;

    fn train(
        &self,
        corpus: &BowCorpus,
        vocabulary: &Arc<Vocabulary>,
        n_topics: usize,
        workers: usize,
    ) -> topic_sweep::Result<LdaModel> {
        self.calls.borrow_mut().push(n_topics);
        if self.fail_at == Some(n_topics) {
            return Err(SweepError::Internal("backend exploded".into()));
        }
        self.inner.train(corpus, vocabulary, n_topics, workers)
    }
}

#[test]
fn five_document_sweep_writes_every_artifact() {
    let (vocabulary, corpus, texts) = corpus();
    let dir = tempdir().expect("tempdir");
    let store = ResultStore::create(dir.path()).expect("store");

    let artifacts = Sweep::new(sweep_config(2, 3), lda(7), Coherence::default(), &store)
        .run(&corpus, &vocabulary, &texts)
        .expect("sweep");

    let counts: Vec<usize> = artifacts.metrics.rows().iter().map(|r| r.n_topics).collect();
    assert_eq!(counts, vec![2, 3]);
    for row in artifacts.metrics.rows() {
        assert!(row.coherence.is_finite());
        assert!(row.exclusivity.is_finite());
        assert!(row.exclusivity > 0.0 && row.exclusivity <= 1.0);
    }

    for n_topics in [2, 3] {
        let path = store.topic_table_path("lda", n_topics);
        assert!(path.exists(), "missing {}", path.display());
        let table = read_topic_table(&path).expect("topic table");
        assert_eq!(table.num_topics(), n_topics);
        assert!(table.rows.iter().all(|row| row.prob >= 0.0));
    }
    assert_eq!(
        read_metrics(&artifacts.metrics_path).expect("metrics csv"),
        artifacts.metrics
    );
    assert!(!store.partial_metrics_path("lda").exists());

    let summary: RunSummary = read_json(&artifacts.summary_path).expect("summary");
    assert_eq!(summary.documents, 5);
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.metrics.stop_reason, StopReason::Completed);
    assert_eq!(summary.metrics.models.len(), 2);
}

#[test]
fn metrics_table_has_one_ascending_row_per_topic_count() {
    let (vocabulary, corpus, texts) = corpus();
    for (min_topics, max_topics) in [(1, 1), (1, 4), (3, 5)] {
        let dir = tempdir().expect("tempdir");
        let store = ResultStore::create(dir.path()).expect("store");
        let scorer = Coherence::UMass(UMassCoherence { top_n: 3 });
        let artifacts = Sweep::new(sweep_config(min_topics, max_topics), lda(1), scorer, &store)
            .run(&corpus, &vocabulary, &texts)
            .expect("sweep");
        let expected: Vec<usize> = (min_topics..=max_topics).collect();
        assert_eq!(artifacts.metrics.topic_counts(), expected);
        assert_eq!(artifacts.topic_tables.len(), expected.len());
    }
}

#[test]
fn invalid_range_fails_before_training() {
    let (vocabulary, corpus, texts) = corpus();
    let dir = tempdir().expect("tempdir");
    let store = ResultStore::create(dir.path().join("run")).expect("store");
    let trainer = RecordingTrainer::new(None);
    let cfg = SweepConfig {
        min_topics: 6,
        max_topics: 3,
        ..SweepConfig::default()
    };

    let err = Sweep::new(cfg, &trainer, Coherence::default(), &store)
        .run(&corpus, &vocabulary, &texts)
        .expect_err("range must be rejected");
    assert!(matches!(
        err,
        SweepError::InvalidRange {
            min_topics: 6,
            max_topics: 3
        }
    ));
    assert!(trainer.calls.borrow().is_empty());
    assert_eq!(fs::read_dir(store.root()).expect("list").count(), 0);
}

#[test]
fn training_failure_keeps_lower_topic_tables() {
    let (vocabulary, corpus, texts) = corpus();
    let dir = tempdir().expect("tempdir");
    let store = ResultStore::create(dir.path()).expect("store");
    let trainer = RecordingTrainer::new(Some(4));

    let err = Sweep::new(sweep_config(2, 6), &trainer, Coherence::default(), &store)
        .run(&corpus, &vocabulary, &texts)
        .expect_err("training must fail");
    match err {
        SweepError::TrainingFailure { n_topics, reason } => {
            assert_eq!(n_topics, 4);
            assert!(reason.contains("backend exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*trainer.calls.borrow(), vec![2, 3, 4]);
    assert!(store.topic_table_path("lda", 2).exists());
    assert!(store.topic_table_path("lda", 3).exists());
    assert!(!store.topic_table_path("lda", 4).exists());
    assert!(!store.metrics_path("lda").exists());

    let partial = read_metrics(&store.partial_metrics_path("lda")).expect("partial metrics");
    assert_eq!(partial.topic_counts(), vec![2, 3]);
    let summary: RunSummary = read_json(&store.summary_path("lda")).expect("summary");
    assert_eq!(
        summary.metrics.stop_reason,
        StopReason::TrainingFailed { n_topics: 4 }
    );
}

#[test]
fn cancellation_between_models_stops_the_sweep() {
    let (vocabulary, corpus, texts) = corpus();
    let dir = tempdir().expect("tempdir");
    let store = ResultStore::create(dir.path()).expect("store");
    let token = CancellationToken::new();
    let trigger = token.clone();

    let err = Sweep::new(sweep_config(2, 5), lda(3), Coherence::default(), &store)
        .with_cancellation(token)
        .on_model_scored(move |row| {
            if row.n_topics == 3 {
                trigger.cancel();
            }
        })
        .run(&corpus, &vocabulary, &texts)
        .expect_err("sweep must stop");
    match err {
        SweepError::SweepCancelled { completed } => assert_eq!(completed, vec![2, 3]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!store.topic_table_path("lda", 4).exists());
    let partial = read_metrics(&store.partial_metrics_path("lda")).expect("partial metrics");
    assert_eq!(partial.len(), 2);
}

#[test]
fn cancellation_before_first_model_leaves_header_only_metrics() {
    let (vocabulary, corpus, texts) = corpus();
    let dir = tempdir().expect("tempdir");
    let store = ResultStore::create(dir.path()).expect("store");
    let token = CancellationToken::new();
    token.cancel();

    let err = Sweep::new(sweep_config(2, 4), lda(3), Coherence::default(), &store)
        .with_cancellation(token)
        .run(&corpus, &vocabulary, &texts)
        .expect_err("sweep must stop");
    assert!(matches!(err, SweepError::SweepCancelled { ref completed } if completed.is_empty()));
    assert!(!store.topic_table_path("lda", 2).exists());

    let partial = store.partial_metrics_path("lda");
    assert_eq!(
        fs::read_to_string(&partial).expect("partial metrics"),
        "n_topics,exclusivity,coherence\n"
    );
    assert!(read_metrics(&partial).expect("parse partial").is_empty());
}

#[test]
fn empty_corpus_is_rejected() {
    assert!(matches!(
        build_corpus(&[Vec::new(), Vec::new()]),
        Err(SweepError::EmptyCorpus)
    ));
}
