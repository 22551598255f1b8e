//! Text normalization applied before documents reach the corpus builder.
//!
//! Normalization lowercases, replaces every character outside `[a-zA-Z_]` with
//! whitespace, and drops stopwords. Stemming is delegated to a [`Stemmer`]:
//! [`SnowballStemmer`] applies the English Snowball algorithm and
//! [`IdentityStemmer`] leaves tokens untouched.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rust_stemmers::Algorithm;
use stop_words::{get, LANGUAGE};

use crate::corpus::Document;

fn non_word() -> &'static Regex {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    NON_WORD.get_or_init(|| Regex::new(r"[^a-zA-Z_]").expect("static regex is valid"))
}

/// Returns the English stopword set.
#[must_use]
pub fn english_stopwords() -> HashSet<String> {
    get(LANGUAGE::English).into_iter().collect()
}

/// Lowercases `text`, strips non-word characters, and removes stopwords.
///
/// The result is a single whitespace-delimited string.
#[must_use]
pub fn normalize(text: &str, stopwords: &HashSet<String>) -> String {
    let cleaned = non_word().replace_all(text, " ");
    cleaned
        .to_lowercase()
        .split_whitespace()
        .filter(|word| !stopwords.contains(*word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduces a token to its stem.
pub trait Stemmer {
    /// Returns the stem of `token`.
    fn stem(&self, token: &str) -> String;
}

/// Stemmer that returns tokens unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStemmer;

impl Stemmer for IdentityStemmer {
    fn stem(&self, token: &str) -> String {
        token.to_owned()
    }
}

/// English Snowball stemmer.
pub struct SnowballStemmer {
    inner: rust_stemmers::Stemmer,
}

impl SnowballStemmer {
    /// Creates a stemmer for English.
    #[must_use]
    pub fn english() -> Self {
        Self {
            inner: rust_stemmers::Stemmer::create(Algorithm::English),
        }
    }
}

impl Default for SnowballStemmer {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Debug for SnowballStemmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowballStemmer")
            .field("algorithm", &"english")
            .finish()
    }
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, token: &str) -> String {
        self.inner.stem(token).into_owned()
    }
}

/// Stems each whitespace-delimited token of `text` and rejoins them.
#[must_use]
pub fn stem<S: Stemmer + ?Sized>(text: &str, stemmer: &S) -> String {
    text.split_whitespace()
        .map(|token| stemmer.stem(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a whitespace-delimited string into a [`Document`].
#[must_use]
pub fn tokenize(text: &str) -> Document {
    text.split_whitespace().map(str::to_owned).collect()
}
