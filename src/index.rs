//! Per-document vector store persisted under an index directory.
//!
//! Each uploaded document owns one directory. Inside it, `index.json` holds every chunk with its
//! embedding. Writes go to a temporary file that is renamed into place, so concurrent readers
//! see either the previous or the next complete version of the index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// Errors raised while reading or writing a document index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index directory does not exist.
    #[error("index directory {0} does not exist")]
    Missing(PathBuf),
    /// Filesystem access failed.
    #[error("index I/O failed for {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The persisted index could not be decoded.
    #[error("index file {path} is corrupt: {source}")]
    Corrupt {
        /// Path of the index file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Texts and vectors passed to [`DocumentIndex::add`] differ in length.
    #[error("received {texts} texts but {vectors} vectors")]
    LengthMismatch {
        /// Number of texts supplied.
        texts: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
}

/// Errors raised while removing an index directory.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Nothing exists at the given location.
    #[error("Index directory not found: {0}")]
    NotFound(PathBuf),
    /// Every removal attempt failed.
    #[error("Failed to delete {path} after {attempts} attempts: {source}")]
    Failed {
        /// Directory that could not be removed.
        path: PathBuf,
        /// Number of attempts made.
        attempts: usize,
        /// Error reported by the final attempt.
        #[source]
        source: io::Error,
    },
}

/// One stored chunk and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Insertion order, starting at zero.
    pub id: usize,
    /// Chunk text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Chunk returned by [`DocumentIndex::similarity_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Cosine similarity to the query vector.
    pub score: f32,
    /// Chunk text.
    pub text: String,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    chunks: Vec<IndexedChunk>,
}

/// In-memory view of a document index bound to its directory.
#[derive(Debug)]
pub struct DocumentIndex {
    dir: PathBuf,
    chunks: Vec<IndexedChunk>,
}

impl DocumentIndex {
    /// Create the directory if needed and load whatever it already contains.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| IndexError::Io {
                path: dir.clone(),
                source,
            })?;
        Self::load(dir).await
    }

    /// Open an existing index directory. A directory without an index file is an empty index.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(IndexError::Missing(dir));
        }
        Self::load(dir).await
    }

    async fn load(dir: PathBuf) -> Result<Self, IndexError> {
        let path = dir.join(INDEX_FILE);
        let chunks = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: IndexFile = serde_json::from_slice(&bytes)
                    .map_err(|source| IndexError::Corrupt { path, source })?;
                file.chunks
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        Ok(Self { dir, chunks })
    }

    /// Directory backing this index.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stored chunks in insertion order.
    pub fn documents(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Append chunks with their embeddings and persist the result.
    pub async fn add(
        &mut self,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), IndexError> {
        if texts.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                texts: texts.len(),
                vectors: vectors.len(),
            });
        }
        let start = self.chunks.len();
        self.chunks.extend(
            texts
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(offset, (text, vector))| IndexedChunk {
                    id: start + offset,
                    text,
                    vector,
                }),
        );
        self.persist().await
    }

    async fn persist(&self) -> Result<(), IndexError> {
        let file = IndexFile {
            version: INDEX_VERSION,
            chunks: self.chunks.clone(),
        };
        let target = self.dir.join(INDEX_FILE);
        let bytes = serde_json::to_vec(&file).map_err(|source| IndexError::Corrupt {
            path: target.clone(),
            source,
        })?;
        let staging = self.dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|source| IndexError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|source| IndexError::Io {
                path: target,
                source,
            })
    }

    /// Return the `k` chunks most similar to `query`, best first.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query, &chunk.vector),
                text: chunk.text.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Cosine similarity; zero when either vector has no magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Remove an index directory, retrying when the filesystem refuses.
///
/// Before each attempt read-only flags are cleared across the tree. Sleeps `delay` between
/// attempts. Returns [`DeleteError::NotFound`] without retrying when nothing exists at `dir`.
pub async fn delete_index_dir(
    dir: &Path,
    attempts: usize,
    delay: Duration,
) -> Result<(), DeleteError> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Err(DeleteError::NotFound(dir.to_path_buf()));
    }

    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let target = dir.to_path_buf();
        let cleared = tokio::task::spawn_blocking(move || clear_readonly(&target)).await;
        if let Ok(Err(error)) = cleared {
            tracing::debug!(path = %dir.display(), error = %error, "Could not clear permissions");
        }

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                tracing::info!(path = %dir.display(), attempt, "Removed index directory");
                return Ok(());
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => {
                tracing::warn!(
                    path = %dir.display(),
                    attempt,
                    error = %error,
                    "Index directory removal failed"
                );
                last_error = Some(error);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(DeleteError::Failed {
        path: dir.to_path_buf(),
        attempts,
        source: last_error.unwrap_or_else(|| io::Error::other("removal failed")),
    })
}

fn clear_readonly(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let metadata = entry.metadata().map_err(io::Error::other)?;
        let mut permissions = metadata.permissions();
        if !permissions.readonly() {
            continue;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }
        #[cfg(not(unix))]
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        std::fs::set_permissions(entry.path(), permissions)?;
    }
    Ok(())
}
