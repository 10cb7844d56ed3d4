use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Screenshot,
    Markup,
}

impl ArtifactKind {
    fn extension(self) -> &'static str {
        match self {
            Self::Screenshot => "png",
            Self::Markup => "html",
        }
    }
}

/// Opaque reference to a saved artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub kind: ArtifactKind,
    pub location: String,
    pub size: usize,
}

/// Where login evidence ends up.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, data: Vec<u8>, kind: ArtifactKind) -> Result<ArtifactHandle, StorageError>;
}

/// Writes each artifact to its own file under a directory.
pub struct DirStore {
    root: PathBuf,
    counter: AtomicU64,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_path(&self, kind: ArtifactKind) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = match kind {
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Markup => "page",
        };
        self.root
            .join(format!("{}-{}-{}.{}", stamp, seq, name, kind.extension()))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.display().to_string();
    move |source| StorageError::Io { path, source }
}

#[async_trait]
impl ArtifactStore for DirStore {
    async fn save(&self, data: Vec<u8>, kind: ArtifactKind) -> Result<ArtifactHandle, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        let path = self.next_path(kind);
        let size = data.len();
        tokio::fs::write(&path, data).await.map_err(io_err(&path))?;
        tracing::debug!("Saved {:?} artifact to {}", kind, path.display());

        Ok(ArtifactHandle {
            kind,
            location: path.display().to_string(),
            size,
        })
    }
}

/// Keeps artifacts in process; handles are `memory://<n>`.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Vec<u8>>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &ArtifactHandle) -> Option<Vec<u8>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.get(&handle.location).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(&self, data: Vec<u8>, kind: ArtifactKind) -> Result<ArtifactHandle, StorageError> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let location = format!("memory://{}", seq);
        let size = data.len();
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(location.clone(), data);
        Ok(ArtifactHandle {
            kind,
            location,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_store_writes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join("artifacts"));

        let shot = store
            .save(vec![0x89, 0x50, 0x4E, 0x47], ArtifactKind::Screenshot)
            .await
            .unwrap();
        let page = store
            .save(b"<html></html>".to_vec(), ArtifactKind::Markup)
            .await
            .unwrap();

        assert!(shot.location.ends_with("-screenshot.png"));
        assert!(page.location.ends_with("-page.html"));
        assert_ne!(shot.location, page.location);
        assert_eq!(std::fs::read(&page.location).unwrap(), b"<html></html>");
        assert_eq!(shot.size, 4);
    }

    #[test]
    fn test_memory_store_round_trip_by_handle() {
        let store = MemoryStore::new();
        let handle = tokio_test::block_on(store.save(b"markup".to_vec(), ArtifactKind::Markup)).unwrap();
        assert_eq!(handle.location, "memory://0");
        assert_eq!(store.get(&handle).as_deref(), Some(&b"markup"[..]));
        let other = ArtifactHandle {
            location: "memory://1".into(),
            ..handle
        };
        assert!(store.get(&other).is_none());
    }
}
