//! Durable file writing shared by the configure pipeline.
//!
//! Everything the pipeline persists (fingerprints, cache buckets, generated
//! build files) goes through [`atomic_write`] so a crash or a concurrent
//! reader never observes a half-written file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::ConfigureResult;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write data to a file atomically with fsync for durability.
///
/// This implements the write-fsync-rename pattern:
/// 1. Write data to a uniquely named temp file in the destination folder
/// 2. fsync the temp file (flush to disk)
/// 3. Rename temp file to final destination (atomic operation)
/// 4. fsync the parent directory (ensure directory entry is durable)
///
/// Temp names carry the process id and a counter so concurrent writers
/// cannot truncate each other's in-flight data.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let count = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_file_name(format!(
        "{file_name}.{pid}.{count}.tmp",
        pid = std::process::id()
    ));

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all(); // Best effort - some filesystems don't support this
    }

    Ok(())
}

/// True when `path` exists and already holds exactly `proposed`.
///
/// The length is compared first so a file of a different size is rejected
/// without reading its content.
pub fn compare_file_contents(path: &Path, proposed: &[u8]) -> io::Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if !metadata.is_file() || metadata.len() != proposed.len() as u64 {
        return Ok(false);
    }

    let mut file = File::open(path)?;
    let mut buffer = [0u8; 8192];
    let mut offset = 0;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            return Ok(offset == proposed.len());
        }
        if offset + read > proposed.len() || buffer[..read] != proposed[offset..offset + read] {
            return Ok(false);
        }
        offset += read;
    }
}

/// Queues generated files and writes only those whose content changed.
///
/// Generators re-emit every file on every run. Writing identical bytes
/// again would bump timestamps and trip downstream mtime checks, so each
/// queued file is compared against what is on disk before it is written.
#[derive(Debug, Default)]
pub struct IdempotentFileWriter {
    queued: BTreeMap<PathBuf, String>,
}

impl IdempotentFileWriter {
    pub fn new() -> Self {
        Self {
            queued: BTreeMap::new(),
        }
    }

    /// Queue `content` for `path`. Queuing the same path again replaces the
    /// earlier content.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.queued.insert(path.into(), content.into());
    }

    /// Write queued files that differ from what is on disk, draining the
    /// queue. Returns the paths actually written.
    pub fn write(&mut self) -> ConfigureResult<BTreeSet<PathBuf>> {
        let mut written = BTreeSet::new();
        for (path, content) in std::mem::take(&mut self.queued) {
            if compare_file_contents(&path, content.as_bytes())? {
                info!(path = %path.display(), "up to date, not writing");
                continue;
            }
            atomic_write(&path, content.as_bytes())?;
            debug!(path = %path.display(), "wrote file");
            written.insert(path);
        }
        Ok(written)
    }
}
