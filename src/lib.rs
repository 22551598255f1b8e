//! Topic-count sweeps for LDA models, scored on coherence and exclusivity.
//!
//! The crate exposes both a library API and a `topic-sweep` command line
//! interface. A sweep trains one LDA model per topic count in a closed range,
//! scores every model on semantic coherence and word exclusivity, and persists
//! a topic table per model plus a metrics table for choosing the topic count.
//! The [`padding`] module reconciles distribution tables from different runs
//! with crash-safe, resumable column padding.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use topic_sweep::{
//!     build_corpus, load_documents, Coherence, LdaTrainer, LoadConfig, ResultStore, Sweep,
//!     SweepConfig,
//! };
//!
//! # fn main() -> topic_sweep::Result<()> {
//! let input = std::path::Path::new("data/communications_preprocessed.csv");
//! let documents = load_documents(input, &LoadConfig::default())?;
//! let (vocabulary, corpus) = build_corpus(&documents)?;
//! let vocabulary = Arc::new(vocabulary);
//!
//! let cfg = SweepConfig::builder().topic_range(5, 30).workers(4).build()?;
//! let trainer = LdaTrainer::new(LdaTrainer::builder().seed(Some(42)).build()?);
//! let store = ResultStore::timestamped("output")?;
//! let artifacts = Sweep::new(cfg, trainer, Coherence::default(), &store)
//!     .run(&corpus, &vocabulary, &documents)?;
//! println!("best: {:?}", artifacts.metrics.best_by_coherence());
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature and figure rendering
//! through the `plot` feature. Library users can opt out of both with
//! `topic-sweep = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions,
    clippy::cast_precision_loss
)]

pub mod cancel;
pub mod coherence;
pub mod config;
pub mod corpus;
pub mod error;
pub mod exclusivity;
pub mod metrics;
pub mod model;
pub mod padding;
#[cfg(feature = "plot")]
pub mod plot;
pub mod preprocess;
pub mod store;
pub mod sweep;
pub mod trainer;

pub use cancel::CancellationToken;
pub use coherence::{Coherence, CoherenceScorer, NpmiCoherence, UMassCoherence};
pub use config::{
    LdaBuilder, LdaConfig, LoadBuilder, LoadConfig, PathsConfig, SweepBuilder, SweepConfig,
};
pub use corpus::{build_corpus, load_documents, BowCorpus, Document, Vocabulary, WordId};
pub use error::{Result, SweepError};
pub use exclusivity::{exclusivity_matrix, exclusivity_score, ExclusivityReduction};
pub use metrics::{MetricsRow, MetricsTable, ModelMetrics, StopReason, SweepMetrics};
pub use model::{LdaModel, TopicModel, TopicRow, TopicTable};
pub use padding::{reconcile, DistributionTable, PadJob, PadState, Padder, Side};
pub use store::{ResultStore, RunSummary};
pub use sweep::{Sweep, SweepArtifacts};
pub use trainer::{LdaTrainer, TopicTrainer};
