//! # Local Document Index
//!
//! A small in-memory retrieval index over a directory of `.txt` and `.md`
//! files (statutes, firm memos, court rules). Documents are split into
//! paragraph chunks and scored against a query by TF-IDF cosine similarity.
//!
//! The index is built once at startup and is read-only afterwards, so it is
//! shared between runs behind an `Arc` without locking.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Chunks shorter than this carry too little text to rank
const MIN_CHUNK_CHARS: usize = 40;

/// Words that never help ranking
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "which", "with", "under", "does", "do", "my", "i",
];

/// A ranked passage from the local index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// File the passage came from
    pub path: PathBuf,
    /// First heading of the file, or its stem
    pub title: String,
    pub text: String,
    /// Cosine similarity in (0, 1]
    pub score: f32,
}

impl IndexHit {
    /// `file://` URL used as the citation key
    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

#[derive(Debug)]
struct Chunk {
    path: PathBuf,
    title: String,
    text: String,
    weights: HashMap<String, f32>,
    norm: f32,
}

/// TF-IDF index over paragraph chunks
#[derive(Debug, Default)]
pub struct DocumentIndex {
    chunks: Vec<Chunk>,
    idf: HashMap<String, f32>,
}

impl DocumentIndex {
    /// Walk `dir` recursively and index every `.txt` / `.md` file.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            anyhow::bail!("Local index directory not found: {}", dir.display());
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();
            let indexable = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "txt" | "md"));
            if !entry.file_type().is_file() || !indexable {
                continue;
            }

            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            documents.push((path.to_path_buf(), text));
        }

        let index = Self::from_documents(documents);
        info!(
            dir = %dir.display(),
            chunks = index.len(),
            "Local document index built"
        );
        Ok(index)
    }

    /// Index in-memory documents given as `(path, text)` pairs
    pub fn from_documents(documents: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        let mut raw: Vec<(PathBuf, String, String, HashMap<String, f32>)> = Vec::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for (path, text) in documents {
            let title = title_of(&path, &text);
            for paragraph in paragraphs(&text) {
                let tf = term_frequencies(&paragraph);
                if tf.is_empty() {
                    continue;
                }
                for term in tf.keys() {
                    *document_frequency.entry(term.clone()).or_default() += 1;
                }
                raw.push((path.clone(), title.clone(), paragraph, tf));
            }
        }

        let total = raw.len() as f32;
        let idf: HashMap<String, f32> = document_frequency
            .into_iter()
            .map(|(term, df)| (term, (1.0 + total / df as f32).ln()))
            .collect();

        let chunks = raw
            .into_iter()
            .map(|(path, title, text, tf)| {
                let weights: HashMap<String, f32> = tf
                    .into_iter()
                    .map(|(term, count)| {
                        let weight = count * idf.get(&term).copied().unwrap_or(0.0);
                        (term, weight)
                    })
                    .collect();
                let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
                Chunk {
                    path,
                    title,
                    text,
                    weights,
                    norm,
                }
            })
            .collect();

        Self { chunks, idf }
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `k` chunks by cosine similarity. Zero-score chunks are dropped;
    /// ties keep index order.
    pub fn search(&self, query: &str, k: usize) -> Vec<IndexHit> {
        let query_weights: HashMap<String, f32> = term_frequencies(query)
            .into_iter()
            .filter_map(|(term, count)| {
                self.idf.get(&term).map(|idf| (term, count * idf))
            })
            .collect();
        let query_norm = query_weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if query_norm == 0.0 {
            debug!(query = %query, "No indexed terms in query");
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, chunk)| {
                let dot: f32 = query_weights
                    .iter()
                    .filter_map(|(term, w)| chunk.weights.get(term).map(|cw| w * cw))
                    .sum();
                let score = dot / (query_norm * chunk.norm);
                (score > 0.0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let chunk = &self.chunks[i];
                IndexHit {
                    path: chunk.path.clone(),
                    title: chunk.title.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect()
    }
}

/// Render hits as markdown for the prompts
pub fn hits_to_markdown(hits: &[IndexHit]) -> String {
    if hits.is_empty() {
        return "No local documents matched.".to_string();
    }

    hits.iter()
        .map(|hit| {
            format!(
                "### {} ({})\n**Similarity:** {:.2}\n\n{}",
                hit.title,
                hit.path.display(),
                hit.score,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn title_of(path: &Path, text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix('#'))
        .map(|heading| heading.trim_start_matches('#').trim().to_string())
        .filter(|heading| !heading.is_empty())
        .or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Untitled".to_string())
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if current.len() >= MIN_CHUNK_CHARS {
                out.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }

    if current.len() >= MIN_CHUNK_CHARS {
        out.push(current);
    }

    out
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut tf = HashMap::new();

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1)
        .map(str::to_lowercase)
        .filter(|token| !stopwords.contains(token.as_str()))
    {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }

    tf
}
