//! Versioned blob storage
//!
//! The tracked-workflow document lives behind a small "versioned blob"
//! contract: a read returns the bytes together with an opaque version token,
//! and a write only lands if the caller's expected version still matches.
//! Any back-end exposing get-with-version and put-if-match satisfies it.

pub mod file;
pub mod github_contents;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileBlobStore;
pub use github_contents::GitHubContentsStore;
pub use memory::MemoryBlobStore;

/// A stored document together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBlob {
    pub contents: Vec<u8>,
    pub version: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored version no longer matches the expected version")]
    VersionConflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Storage with optimistic-concurrency writes
#[async_trait]
pub trait VersionedBlobStore: Send + Sync {
    /// Fetch the document and its version, or `None` if it does not exist yet
    async fn get(&self) -> Result<Option<VersionedBlob>, StoreError>;

    /// Replace the document if its version still equals `expected`.
    ///
    /// `expected == None` means the document must not exist yet. Returns the
    /// new version on success and [`StoreError::VersionConflict`] when another
    /// writer got there first.
    async fn put_if_match(
        &self,
        contents: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Short human-readable description used in logs
    fn describe(&self) -> String;
}
