//! Vocabulary and bag-of-words construction plus document loading from disk.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::LoadConfig;
use crate::error::{Result, SweepError};
use crate::preprocess::{english_stopwords, normalize, stem, tokenize, SnowballStemmer};

/// Word identifier within a [`Vocabulary`].
pub type WordId = u32;

/// Ordered sequence of normalized tokens.
pub type Document = Vec<String>;

/// Bijective mapping between token strings and ids, assigned by first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    words: Vec<String>,
    ids: FxHashMap<String, WordId>,
}

impl Vocabulary {
    /// Builds a vocabulary from documents, numbering tokens in order of first appearance.
    pub fn from_documents(documents: &[Document]) -> Result<Self> {
        let mut vocab = Self::default();
        for token in documents.iter().flatten() {
            vocab.intern(token)?;
        }
        Ok(vocab)
    }

    fn intern(&mut self, token: &str) -> Result<WordId> {
        if let Some(&id) = self.ids.get(token) {
            return Ok(id);
        }
        let id = WordId::try_from(self.words.len())
            .map_err(|_| SweepError::Internal("vocabulary size exceeded u32::MAX".into()))?;
        self.words.push(token.to_owned());
        self.ids.insert(token.to_owned(), id);
        Ok(id)
    }

    /// Returns the id assigned to `token`, if any.
    #[must_use]
    pub fn id(&self, token: &str) -> Option<WordId> {
        self.ids.get(token).copied()
    }

    /// Returns the token for `id`, if any.
    #[must_use]
    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    /// Returns every token ordered by id.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` when no token has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Converts a document into sorted `(id, count)` pairs, ignoring unknown tokens.
    #[must_use]
    pub fn doc2bow(&self, document: &[String]) -> Vec<(WordId, u32)> {
        let mut counts: FxHashMap<WordId, u32> = FxHashMap::default();
        for token in document {
            if let Some(id) = self.id(token) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut bow: Vec<(WordId, u32)> = counts.into_iter().collect();
        bow.sort_unstable_by_key(|&(id, _)| id);
        bow
    }
}

/// Bag-of-words representation with one entry per document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowCorpus {
    documents: Vec<Vec<(WordId, u32)>>,
}

impl BowCorpus {
    /// Returns the `(id, count)` pairs of every document.
    #[must_use]
    pub fn documents(&self) -> &[Vec<(WordId, u32)>] {
        &self.documents
    }

    /// Number of documents, including empty ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` when the corpus holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Total number of tokens across all documents.
    #[must_use]
    pub fn num_tokens(&self) -> usize {
        self.documents
            .iter()
            .flatten()
            .map(|&(_, count)| count as usize)
            .sum()
    }
}

/// Builds the vocabulary and bag-of-words corpus for a document sequence.
///
/// Fails with [`SweepError::EmptyCorpus`] when there are no documents or every
/// document is empty.
pub fn build_corpus(documents: &[Document]) -> Result<(Vocabulary, BowCorpus)> {
    if documents.iter().all(Vec::is_empty) {
        return Err(SweepError::EmptyCorpus);
    }
    let vocab = Vocabulary::from_documents(documents)?;
    let corpus = BowCorpus {
        documents: documents.iter().map(|doc| vocab.doc2bow(doc)).collect(),
    };
    Ok((vocab, corpus))
}

/// Discovers files rooted at `input`; a plain file is returned as-is.
///
/// Directory traversal is recursive unless [`LoadConfig::recursive`] is `false`.
/// Files are returned sorted so document order is reproducible.
pub fn collect_paths(input: &Path, cfg: &LoadConfig) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(SweepError::InvalidConfig(format!(
            "input path {input:?} does not exist"
        )));
    }
    let metadata = input
        .metadata()
        .map_err(|err| SweepError::io(err, Some(input.to_path_buf())))?;
    if metadata.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    if cfg.recursive {
        let walker = WalkDir::new(input).follow_links(cfg.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|err| SweepError::Internal(err.to_string()))?;
            if entry.file_type().is_file() {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        for entry in
            fs::read_dir(input).map_err(|err| SweepError::io(err, Some(input.to_path_buf())))?
        {
            let entry = entry.map_err(|err| SweepError::io(err, Some(input.to_path_buf())))?;
            let entry_path = entry.path();
            if entry_path.is_file() {
                files.push(entry_path);
            }
        }
    }
    if files.is_empty() {
        return Err(SweepError::InvalidConfig(format!(
            "no files discovered under {input:?}"
        )));
    }
    files.sort();
    Ok(files)
}

/// Loads raw document strings from a CSV column, a text file, or a directory.
///
/// * `.csv` files yield one document per record, read from [`LoadConfig::column`].
/// * Other files yield one document per non-empty line.
/// * Directories yield one document per discovered file.
pub fn load_texts(input: &Path, cfg: &LoadConfig) -> Result<Vec<String>> {
    if input.is_dir() {
        let mut texts = Vec::new();
        for path in collect_paths(input, cfg)? {
            let text =
                fs::read_to_string(&path).map_err(|err| SweepError::io(err, Some(path.clone())))?;
            texts.push(text);
        }
        return Ok(texts);
    }
    let is_csv = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        read_csv_column(input, &cfg.column)
    } else {
        read_lines(input)
    }
}

/// Loads and tokenizes documents, normalizing (and optionally stemming) them
/// first when configured.
pub fn load_documents(input: &Path, cfg: &LoadConfig) -> Result<Vec<Document>> {
    let texts = load_texts(input, cfg)?;
    if cfg.normalize {
        let stopwords = english_stopwords();
        let stemmer = cfg.stem.then(SnowballStemmer::english);
        Ok(texts
            .iter()
            .map(|text| {
                let clean = normalize(text, &stopwords);
                match &stemmer {
                    Some(stemmer) => tokenize(&stem(&clean, stemmer)),
                    None => tokenize(&clean),
                }
            })
            .collect())
    } else {
        Ok(texts.iter().map(|text| tokenize(text)).collect())
    }
}

fn read_csv_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();
    let index = headers.iter().position(|h| h == column).ok_or_else(|| {
        SweepError::InvalidConfig(format!("column {column:?} not found in {path:?}"))
    })?;
    let mut texts = Vec::new();
    for record in reader.records() {
        let record = record?;
        texts.push(record.get(index).unwrap_or_default().to_owned());
    }
    Ok(texts)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
    let mut texts = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
        if !line.trim().is_empty() {
            texts.push(line);
        }
    }
    Ok(texts)
}
