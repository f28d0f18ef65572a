use super::{StoreError, VersionedBlob, VersionedBlobStore};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    blob: Option<VersionedBlob>,
    generation: u64,
    writes: u64,
}

/// In-process store; versions are a monotonically increasing generation
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    state: Mutex<MemoryState>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an initial document
    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock_state();
            state.generation = 1;
            state.blob = Some(VersionedBlob {
                contents: contents.into(),
                version: "1".to_string(),
            });
        }
        store
    }

    /// Current raw contents, bypassing versioning
    pub fn snapshot(&self) -> Option<VersionedBlob> {
        self.lock_state().blob.clone()
    }

    /// Number of successful conditional writes so far
    pub fn write_count(&self) -> u64 {
        self.lock_state().writes
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another writer panicked mid-test; the
        // state itself is always left consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VersionedBlobStore for MemoryBlobStore {
    async fn get(&self) -> Result<Option<VersionedBlob>, StoreError> {
        Ok(self.lock_state().blob.clone())
    }

    async fn put_if_match(
        &self,
        contents: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut state = self.lock_state();
        let current = state.blob.as_ref().map(|blob| blob.version.as_str());
        if current != expected {
            return Err(StoreError::VersionConflict);
        }

        state.generation += 1;
        state.writes += 1;
        let version = state.generation.to_string();
        state.blob = Some(VersionedBlob {
            contents,
            version: version.clone(),
        });
        Ok(version)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
