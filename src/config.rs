//! Configuration builders controlling sweeps, LDA training, and document loading.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::exclusivity::ExclusivityReduction;

/// Configuration for a topic-count sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    /// Smallest topic count trained (inclusive).
    pub min_topics: usize,
    /// Largest topic count trained (inclusive).
    pub max_topics: usize,
    /// Worker threads handed to the trainer for a single model.
    pub workers: usize,
    /// Number of top words per topic written to each topic table.
    pub topic_words: usize,
    /// Reduction used to turn the exclusivity matrix into one scalar per model.
    pub exclusivity: ExclusivityReduction,
    /// Prefix used for persisted artifact names (`<model_name>_05_topics.csv`).
    pub model_name: String,
    /// Enables per-model logging through the `log` facade.
    pub show_progress: bool,
}

impl SweepConfig {
    /// Returns a builder initialised with [`SweepConfig::default`].
    #[must_use]
    pub fn builder() -> SweepBuilder {
        SweepBuilder::default()
    }

    /// Validates the invariants required before any model is trained.
    pub fn validate(&self) -> Result<()> {
        if self.min_topics == 0 || self.min_topics > self.max_topics {
            return Err(SweepError::InvalidRange {
                min_topics: self.min_topics,
                max_topics: self.max_topics,
            });
        }
        if self.workers == 0 {
            return Err(SweepError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        if self.topic_words == 0 {
            return Err(SweepError::InvalidConfig(
                "topic_words must be greater than zero".into(),
            ));
        }
        if let ExclusivityReduction::TopWords(0) = self.exclusivity {
            return Err(SweepError::InvalidConfig(
                "top-words exclusivity reduction needs at least one word per topic".into(),
            ));
        }
        if self.model_name.is_empty() || self.model_name.contains(['/', '\\']) {
            return Err(SweepError::InvalidConfig(format!(
                "model_name ({:?}) must be a non-empty file name component",
                self.model_name
            )));
        }
        Ok(())
    }

    /// Number of models the sweep trains, assuming the range is valid.
    #[must_use]
    pub fn model_count(&self) -> usize {
        (self.max_topics + 1).saturating_sub(self.min_topics)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_topics: 5,
            max_topics: 30,
            workers: 4,
            topic_words: 10,
            exclusivity: ExclusivityReduction::Mean,
            model_name: "lda".into(),
            show_progress: true,
        }
    }
}

/// Builder for [`SweepConfig`].
#[derive(Debug, Default, Clone)]
pub struct SweepBuilder {
    cfg: SweepConfig,
}

impl SweepBuilder {
    /// Creates a builder with [`SweepConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive topic-count range.
    #[must_use]
    pub fn topic_range(mut self, min_topics: usize, max_topics: usize) -> Self {
        self.cfg.min_topics = min_topics;
        self.cfg.max_topics = max_topics;
        self
    }

    /// Sets the worker count handed to the trainer.
    #[must_use]
    pub fn workers(mut self, value: usize) -> Self {
        self.cfg.workers = value;
        self
    }

    /// Sets the number of words per topic kept in topic tables.
    #[must_use]
    pub fn topic_words(mut self, value: usize) -> Self {
        self.cfg.topic_words = value;
        self
    }

    /// Selects the exclusivity reduction.
    #[must_use]
    pub fn exclusivity(mut self, reduction: ExclusivityReduction) -> Self {
        self.cfg.exclusivity = reduction;
        self
    }

    /// Overrides the artifact name prefix.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.model_name = name.into();
        self
    }

    /// Enables or disables per-model logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`SweepConfig`].
    pub fn build(self) -> Result<SweepConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration for the collapsed Gibbs LDA trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LdaConfig {
    /// Number of full sampling passes over the corpus.
    pub iterations: usize,
    /// Document-topic Dirichlet prior; `None` uses `1 / n_topics`.
    pub alpha: Option<f64>,
    /// Topic-word Dirichlet prior; `None` uses `1 / n_topics`.
    pub beta: Option<f64>,
    /// Seed for the sampler; `None` draws one from entropy.
    pub seed: Option<u64>,
    /// Enables per-pass debug logging.
    pub show_progress: bool,
}

impl LdaConfig {
    /// Returns a builder initialised with [`LdaConfig::default`].
    #[must_use]
    pub fn builder() -> LdaBuilder {
        LdaBuilder::default()
    }

    /// Validates the sampler settings.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(SweepError::InvalidConfig(
                "iterations must be greater than zero".into(),
            ));
        }
        for (name, prior) in [("alpha", self.alpha), ("beta", self.beta)] {
            if let Some(value) = prior {
                if !(value.is_finite() && value > 0.0) {
                    return Err(SweepError::InvalidConfig(format!(
                        "{name} ({value}) must be a positive finite number"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves the document-topic prior for a given topic count.
    #[must_use]
    pub fn alpha_for(&self, n_topics: usize) -> f64 {
        self.alpha.unwrap_or(1.0 / n_topics.max(1) as f64)
    }

    /// Resolves the topic-word prior for a given topic count.
    #[must_use]
    pub fn beta_for(&self, n_topics: usize) -> f64 {
        self.beta.unwrap_or(1.0 / n_topics.max(1) as f64)
    }
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            alpha: None,
            beta: None,
            seed: None,
            show_progress: false,
        }
    }
}

/// Builder for [`LdaConfig`].
#[derive(Debug, Default, Clone)]
pub struct LdaBuilder {
    cfg: LdaConfig,
}

impl LdaBuilder {
    /// Creates a builder with [`LdaConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of sampling passes.
    #[must_use]
    pub fn iterations(mut self, value: usize) -> Self {
        self.cfg.iterations = value;
        self
    }

    /// Fixes the document-topic prior.
    #[must_use]
    pub fn alpha(mut self, value: Option<f64>) -> Self {
        self.cfg.alpha = value;
        self
    }

    /// Fixes the topic-word prior.
    #[must_use]
    pub fn beta(mut self, value: Option<f64>) -> Self {
        self.cfg.beta = value;
        self
    }

    /// Fixes the sampler seed.
    #[must_use]
    pub fn seed(mut self, value: Option<u64>) -> Self {
        self.cfg.seed = value;
        self
    }

    /// Enables or disables per-pass logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`LdaConfig`].
    pub fn build(self) -> Result<LdaConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration controlling how documents are read from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadConfig {
    /// CSV column holding the whitespace-tokenizable document text.
    pub column: String,
    /// Applies [`crate::preprocess::normalize`] to every document before tokenizing.
    pub normalize: bool,
    /// Stems normalized tokens with [`crate::preprocess::SnowballStemmer`].
    /// Only applies when `normalize` is set.
    pub stem: bool,
    /// Enables recursive directory traversal.
    pub recursive: bool,
    /// Follows symlinks encountered during traversal.
    pub follow_symlinks: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            column: "stemmed_text".into(),
            normalize: false,
            stem: false,
            recursive: true,
            follow_symlinks: false,
        }
    }
}

impl LoadConfig {
    /// Returns a builder initialised with [`LoadConfig::default`].
    #[must_use]
    pub fn builder() -> LoadBuilder {
        LoadBuilder::default()
    }
}

/// Builder for [`LoadConfig`].
#[derive(Debug, Default, Clone)]
pub struct LoadBuilder {
    cfg: LoadConfig,
}

impl LoadBuilder {
    /// Creates a new builder with [`LoadConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CSV column to read.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.cfg.column = name.into();
        self
    }

    /// Enables or disables text normalization on load.
    #[must_use]
    pub fn normalize(mut self, enabled: bool) -> Self {
        self.cfg.normalize = enabled;
        self
    }

    /// Enables or disables Snowball stemming of normalized text.
    #[must_use]
    pub fn stem(mut self, enabled: bool) -> Self {
        self.cfg.stem = enabled;
        self
    }

    /// Enables or disables recursive directory traversal.
    #[must_use]
    pub fn recursive(mut self, enabled: bool) -> Self {
        self.cfg.recursive = enabled;
        self
    }

    /// Enables or disables following of symlinks when traversing directories.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.cfg.follow_symlinks = enabled;
        self
    }

    /// Finalises the builder, returning the [`LoadConfig`].
    pub fn build(self) -> LoadConfig {
        self.cfg
    }
}

/// Directory layout for inputs and generated artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Directory holding preprocessed input data.
    pub data_dir: PathBuf,
    /// Root directory for per-run sweep outputs.
    pub output_dir: PathBuf,
    /// Root directory for rendered figures.
    pub figure_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            figure_dir: PathBuf::from("figures"),
        }
    }
}

impl PathsConfig {
    /// Reads `DATA_DIR`, `OUTPUT_DIR` and `FIGURE_DIR`, loading a `.env` file first when present.
    ///
    /// Unset variables fall back to [`PathsConfig::default`].
    pub fn from_env() -> Self {
        // A missing .env is the common case; real environment variables still apply.
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        let read = |key: &str, fallback: PathBuf| {
            env::var_os(key)
                .filter(|value| !value.is_empty())
                .map_or(fallback, PathBuf::from)
        };
        Self {
            data_dir: read("DATA_DIR", defaults.data_dir),
            output_dir: read("OUTPUT_DIR", defaults.output_dir),
            figure_dir: read("FIGURE_DIR", defaults.figure_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_inverted_range() {
        let err = SweepConfig::builder()
            .topic_range(10, 5)
            .build()
            .expect_err("range should be rejected");
        assert!(matches!(
            err,
            SweepError::InvalidRange {
                min_topics: 10,
                max_topics: 5
            }
        ));
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn validate_rejects_zero_topics_and_workers() {
        let cfg = SweepConfig {
            min_topics: 0,
            ..SweepConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SweepError::InvalidRange { min_topics: 0, .. })
        ));

        let cfg = SweepConfig {
            workers: 0,
            ..SweepConfig::default()
        };
        let err = cfg.validate().expect_err("validation should fail");
        assert!(matches!(
            err,
            SweepError::InvalidConfig(message) if message.contains("workers")
        ));
    }

    #[test]
    fn single_topic_range_is_valid() {
        let cfg = SweepConfig::builder()
            .topic_range(3, 3)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.model_count(), 1);
    }

    #[test]
    fn lda_priors_default_to_inverse_topic_count() {
        let cfg = LdaConfig::default();
        assert!((cfg.alpha_for(4) - 0.25).abs() < f64::EPSILON);
        assert!((cfg.beta_for(5) - 0.2).abs() < f64::EPSILON);

        let err = LdaConfig::builder()
            .alpha(Some(-1.0))
            .build()
            .expect_err("negative prior should be rejected");
        assert!(matches!(err, SweepError::InvalidConfig(message) if message.contains("alpha")));
    }

    #[test]
    fn load_builder_overrides_defaults() {
        let cfg = LoadConfig::builder()
            .column("text")
            .normalize(true)
            .stem(true)
            .recursive(false)
            .follow_symlinks(true)
            .build();
        assert_eq!(cfg.column, "text");
        assert!(cfg.normalize);
        assert!(cfg.stem);
        assert!(!cfg.recursive);
        assert!(cfg.follow_symlinks);
    }
}
