// Local JSON document with a sidecar version file.
// Writers and readers coordinate through an advisory lock on a third file so
// that several processes on one host can share the document safely.

use super::{StoreError, VersionedBlob, VersionedBlobStore};
use async_trait::async_trait;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version reported for a document that exists but has never been written
/// through this store (for example one edited by hand).
const UNVERSIONED: &str = "0";

#[derive(Debug, Clone)]
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("document"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn open_lock(&self) -> Result<fd_lock::RwLock<File>, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.sidecar(".lock"))?;
        Ok(fd_lock::RwLock::new(file))
    }

    fn current_version(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        match fs::read_to_string(self.sidecar(".version")) {
            Ok(version) => Ok(Some(version.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(UNVERSIONED.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn read_blocking(&self) -> Result<Option<VersionedBlob>, StoreError> {
        let lock = self.open_lock()?;
        let _guard = lock.read()?;

        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let version = self
            .current_version()?
            .unwrap_or_else(|| UNVERSIONED.to_string());
        Ok(Some(VersionedBlob { contents, version }))
    }

    fn put_blocking(
        &self,
        contents: Vec<u8>,
        expected: Option<String>,
    ) -> Result<String, StoreError> {
        let mut lock = self.open_lock()?;
        let _guard = lock.write()?;

        let current = self.current_version()?;
        if current != expected {
            debug!(
                path = %self.path.display(),
                current = ?current,
                expected = ?expected,
                "Rejecting write with stale version"
            );
            return Err(StoreError::VersionConflict);
        }

        // The version moves first: if the document write then fails, a
        // holder of the old version gets a conflict instead of overwriting.
        let version_path = self.sidecar(".version");
        let previous = match fs::read(&version_path) {
            Ok(previous) => Some(previous),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let version = uuid::Uuid::new_v4().to_string();
        replace_file(&version_path, version.as_bytes())?;

        if let Err(e) = replace_file(&self.path, &contents) {
            let restored = match &previous {
                Some(previous) => replace_file(&version_path, previous),
                None => fs::remove_file(&version_path),
            };
            if let Err(restore_err) = restored {
                warn!(
                    path = %self.path.display(),
                    error = %restore_err,
                    "Could not restore version after failed write"
                );
            }
            return Err(e.into());
        }
        Ok(version)
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[async_trait]
impl VersionedBlobStore for FileBlobStore {
    async fn get(&self) -> Result<Option<VersionedBlob>, StoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.read_blocking())
            .await
            .map_err(|e| StoreError::Unavailable(format!("file read task failed: {e}")))?
    }

    async fn put_if_match(
        &self,
        contents: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let this = self.clone();
        let expected = expected.map(str::to_string);
        tokio::task::spawn_blocking(move || this.put_blocking(contents, expected))
            .await
            .map_err(|e| StoreError::Unavailable(format!("file write task failed: {e}")))?
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
