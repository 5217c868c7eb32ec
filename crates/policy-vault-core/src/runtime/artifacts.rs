// crates/policy-vault-core/src/runtime/artifacts.rs
// ============================================================================
// Module: Policy Vault Artifact Stores
// Description: Content-addressed filesystem and in-memory artifact stores.
// Purpose: Persist source documents under their SHA-256 digest.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Artifacts are addressed by digest, never by filename, so storing the same
//! bytes twice is a no-op that returns the same path. The filesystem store
//! lays blobs out as `<algorithm>/<first two hex chars>/<digest>` below its
//! root and writes through a temporary file plus rename, so a reader never
//! sees a partially written blob.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::core::ArtifactPath;
use crate::core::HashDigest;
use crate::core::hash_bytes;
use crate::interfaces::ArtifactError;
use crate::interfaces::ArtifactStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component to prevent path abuse.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length for artifact storage.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Per-process sequence keeping concurrent temp files apart.
static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: File Artifact Store
// ============================================================================

/// Filesystem artifact store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    /// Root directory for artifact storage.
    root: PathBuf,
}

impl FileArtifactStore {
    /// Creates the store, creating the root directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the root path is invalid or cannot be created.
    pub fn new(root: PathBuf) -> Result<Self, ArtifactError> {
        validate_path(&root)?;
        fs::create_dir_all(&root)
            .map_err(|err| ArtifactError::Io(format!("unable to create artifact root: {err}")))?;
        Ok(Self {
            root,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a stored artifact path to an absolute file path.
    #[must_use]
    pub fn resolve(&self, path: &ArtifactPath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn store(&self, bytes: &[u8], digest: &HashDigest) -> Result<ArtifactPath, ArtifactError> {
        check_digest(bytes, digest)?;
        let relative = relative_path(digest);
        let target = self.root.join(&relative);
        if target.is_file() {
            return Ok(ArtifactPath::new(relative));
        }
        let parent = target
            .parent()
            .ok_or_else(|| ArtifactError::Invalid("artifact path missing parent".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| {
            ArtifactError::Io(format!("unable to create artifact directory: {err}"))
        })?;
        let sequence = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp =
            parent.join(format!(".{}.tmp-{}-{sequence}", digest.value, std::process::id()));
        let mut file = fs::File::create(&temp)
            .map_err(|err| ArtifactError::Io(format!("unable to create artifact: {err}")))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| ArtifactError::Io(format!("unable to write artifact: {err}")))?;
        fs::rename(&temp, &target).map_err(|err| {
            let _ = fs::remove_file(&temp);
            ArtifactError::Io(format!("unable to publish artifact: {err}"))
        })?;
        Ok(ArtifactPath::new(relative))
    }
}

// ============================================================================
// SECTION: In-Memory Artifact Store
// ============================================================================

/// In-memory artifact store for tests and single-process use.
///
/// Supports injecting transient failures to exercise retry paths.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    /// Stored blobs keyed by relative path.
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Number of blob writes performed.
    writes: AtomicUsize,
    /// Remaining calls that fail with `Unavailable`.
    pending_failures: AtomicU32,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` store calls fail with [`ArtifactError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Returns the number of blob writes performed (deduplicated calls excluded).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the bytes stored at `path`.
    #[must_use]
    pub fn get(&self, path: &ArtifactPath) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(path.as_str()).cloned()
    }

    /// Consumes one injected failure, returning true when the call must fail.
    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| remaining.checked_sub(1))
            .is_ok()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn store(&self, bytes: &[u8], digest: &HashDigest) -> Result<ArtifactPath, ArtifactError> {
        if self.take_failure() {
            return Err(ArtifactError::Unavailable("injected artifact store failure".to_string()));
        }
        check_digest(bytes, digest)?;
        let relative = format!("memory://{}", relative_path(digest));
        let mut guard = self
            .blobs
            .lock()
            .map_err(|_| ArtifactError::Unavailable("artifact store mutex poisoned".to_string()))?;
        if !guard.contains_key(&relative) {
            guard.insert(relative.clone(), bytes.to_vec());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        drop(guard);
        Ok(ArtifactPath::new(relative))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the content-addressed relative path for a digest.
fn relative_path(digest: &HashDigest) -> String {
    let prefix = digest.value.get(.. 2).unwrap_or("00");
    format!("{}/{prefix}/{}", digest.algorithm.as_str(), digest.value)
}

/// Rejects malformed digests and digests that do not match the bytes.
fn check_digest(bytes: &[u8], digest: &HashDigest) -> Result<(), ArtifactError> {
    if !digest.is_well_formed() {
        return Err(ArtifactError::Invalid("malformed artifact digest".to_string()));
    }
    if hash_bytes(digest.algorithm, bytes).value != digest.value {
        return Err(ArtifactError::Invalid("artifact digest does not match content".to_string()));
    }
    Ok(())
}

/// Validates an artifact root against length constraints.
fn validate_path(path: &Path) -> Result<(), ArtifactError> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(ArtifactError::Invalid("artifact root is empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ArtifactError::Invalid("artifact root exceeds length limit".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ArtifactError::Invalid("artifact root component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
