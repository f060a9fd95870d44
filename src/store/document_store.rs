//! Identifier-keyed store of original (unsummarized) elements.

use crate::extraction::Element;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identifier binding one summary to one stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ElementId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Failures reading or writing persisted store entries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("Document store I/O failed at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Entry could not be serialized or parsed.
    #[error("Document store entry {path} is malformed: {source}")]
    Serde {
        /// Entry file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory element map with optional one-file-per-entry persistence.
pub struct DocumentStore {
    entries: RwLock<HashMap<ElementId, Element>>,
    persist_dir: Option<PathBuf>,
}

impl DocumentStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persist_dir: None,
        }
    }

    /// Open (or create) a persisted store under `dir`, loading existing entries.
    ///
    /// Unreadable entry files are skipped with a warning so one bad file does not take the whole
    /// store down.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut entries = HashMap::new();
        let mut listing = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        while let Some(entry) = listing.next_entry().await.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })? {
            let path = entry.path();
            let Some(id) = entry_id(&path) else {
                continue;
            };
            match read_entry(&path).await {
                Ok(element) => {
                    entries.insert(id, element);
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable document store entry");
                }
            }
        }

        tracing::info!(dir = %dir.display(), entries = entries.len(), "Document store opened");
        Ok(Self {
            entries: RwLock::new(entries),
            persist_dir: Some(dir),
        })
    }

    /// Register elements under their identifiers (last write wins per identifier).
    ///
    /// Persisted stores write every file before any entry becomes visible in memory. When a write
    /// fails, files this call added for new identifiers are removed again, so a reopened store
    /// never sees a partially registered batch.
    pub async fn set_many(&self, items: Vec<(ElementId, Element)>) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        if let Some(dir) = &self.persist_dir {
            let mut written = Vec::with_capacity(items.len());
            for (id, element) in &items {
                if let Err(error) = write_entry(dir, id, element).await {
                    self.discard_new_files(dir, &written).await;
                    return Err(error);
                }
                written.push(*id);
            }
        }
        let count = items.len();
        let mut entries = self.entries.write().await;
        entries.extend(items);
        tracing::debug!(added = count, total = entries.len(), "Document store updated");
        Ok(())
    }

    async fn discard_new_files(&self, dir: &Path, written: &[ElementId]) {
        let entries = self.entries.read().await;
        for id in written.iter().filter(|id| !entries.contains_key(id)) {
            let path = dir.join(format!("{id}.json"));
            if let Err(error) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to discard entry file"
                );
            }
        }
        tracing::debug!(written = written.len(), "Rolled back partial document store write");
    }

    /// Element stored under `id`.
    pub async fn get(&self, id: &ElementId) -> Option<Element> {
        self.entries.read().await.get(id).cloned()
    }

    /// Elements for each id, in order; absent ids yield `None`.
    pub async fn get_many(&self, ids: &[ElementId]) -> Vec<Option<Element>> {
        let entries = self.entries.read().await;
        ids.iter().map(|id| entries.get(id).cloned()).collect()
    }

    /// Whether an entry exists for `id`.
    pub async fn contains(&self, id: &ElementId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Number of stored elements.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no elements.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of every entry, sorted by identifier.
    pub async fn entries(&self) -> Vec<(ElementId, Element)> {
        let mut items: Vec<(ElementId, Element)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, element)| (*id, element.clone()))
            .collect();
        items.sort_by_key(|(id, _)| *id);
        items
    }

    /// Remove every entry, including persisted files.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(dir) = &self.persist_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Io {
                        path: dir.clone(),
                        source,
                    });
                }
            }
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        entries.clear();
        Ok(())
    }
}

fn entry_id(path: &Path) -> Option<ElementId> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse().ok())
}

async fn read_entry(path: &Path) -> Result<Element, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_entry(dir: &Path, id: &ElementId, element: &Element) -> Result<(), StoreError> {
    let path = dir.join(format!("{id}.json"));
    let bytes = serde_json::to_vec(element).map_err(|source| StoreError::Serde {
        path: path.clone(),
        source,
    })?;
    let staging = dir.join(format!(".{id}.json.tmp"));
    tokio::fs::write(&staging, bytes)
        .await
        .map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
    if let Err(source) = tokio::fs::rename(&staging, &path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(StoreError::Io { path, source });
    }
    Ok(())
}
