//! Compiler settings cache.
//!
//! Probing the CMake compiler (a full try-compile pass) is expensive, so
//! probe results are cached on disk keyed by the NDK identity and the
//! compiler-relevant arguments. The cache is shared between variants, ABIs
//! and Gradle worker processes building in parallel, and the folder may be
//! deleted by the user at any moment. Every failure mode therefore degrades
//! to a cache miss.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use convenient_sdk::SdkSourceProperties;

use crate::error::ConfigureResult;
use crate::io::atomic_write;

/// Placeholder for the NDK installation folder in agnostic cache keys.
pub const ANDROID_NDK_TOKEN: &str = "${ANDROID_NDK}";

/// Placeholder for the plugin version in agnostic cache keys.
pub const PLUGIN_VERSION_TOKEN: &str = "${PLUGIN_VERSION}";

/// Identity of one compiler probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerCacheKey {
    pub ndk_installation_folder: Option<PathBuf>,
    pub ndk_source_properties: Option<SdkSourceProperties>,
    pub args: Vec<String>,
}

impl CompilerCacheKey {
    /// Replace the NDK installation path and the plugin version with
    /// placeholder tokens wherever they appear, so entries survive NDK
    /// relocation and plugin upgrades that don't affect compiler behavior.
    /// The NDK identity stays in the key through `ndk_source_properties`.
    pub fn to_agnostic(&self, plugin_version: &str) -> CompilerCacheKey {
        let mut agnostic = self.clone();
        if let Some(ndk_folder) = &self.ndk_installation_folder {
            let ndk_text = ndk_folder.to_string_lossy();
            for arg in &mut agnostic.args {
                *arg = arg.replace(ndk_text.as_ref(), ANDROID_NDK_TOKEN);
            }
            agnostic.ndk_installation_folder = Some(PathBuf::from(ANDROID_NDK_TOKEN));
        }
        if !plugin_version.is_empty() {
            for arg in &mut agnostic.args {
                *arg = arg.replace(plugin_version, PLUGIN_VERSION_TOKEN);
            }
        }
        agnostic
    }
}

/// One `(key, value)` pair inside a bucket file. Buckets hold every key
/// that hashed to the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: CompilerCacheKey,
    value: String,
}

/// Maps a key to its bucket file name. Pluggable so tests can force
/// collisions.
pub type KeyHashFunction = Box<dyn Fn(&CompilerCacheKey) -> String + Send + Sync>;

/// On-disk key/value cache of compiler probe results.
pub struct CompilerSettingsCache {
    cache_folder: PathBuf,
    hash_function: KeyHashFunction,
}

impl CompilerSettingsCache {
    pub fn new(cache_folder: impl Into<PathBuf>) -> Self {
        Self::with_hash_function(cache_folder, Box::new(default_key_hash))
    }

    pub fn with_hash_function(
        cache_folder: impl Into<PathBuf>,
        hash_function: KeyHashFunction,
    ) -> Self {
        Self {
            cache_folder: cache_folder.into(),
            hash_function,
        }
    }

    fn bucket_path(&self, key: &CompilerCacheKey) -> PathBuf {
        self.cache_folder
            .join(format!("{}.json", (self.hash_function)(key)))
    }

    /// Look up a previously saved value. A missing folder, missing bucket,
    /// or torn/corrupt bucket is a plain miss, never an error.
    pub fn try_get_value(&self, key: &CompilerCacheKey) -> Option<String> {
        let text = fs::read_to_string(self.bucket_path(key)).ok()?;
        let entries: Vec<CacheEntry> = serde_json::from_str(&text).ok()?;
        entries
            .into_iter()
            .find(|entry| entry.key == *key)
            .map(|entry| entry.value)
    }

    /// Save a value, merging with hash-collided entries already in the
    /// bucket. If an external clean deletes the cache folder mid-save the
    /// write is dropped; losing a race is acceptable for a cache.
    pub fn save_key_value(&self, key: &CompilerCacheKey, value: &str) -> ConfigureResult<()> {
        let path = self.bucket_path(key);
        let mut entries: Vec<CacheEntry> = fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        entries.retain(|entry| entry.key != *key);
        entries.push(CacheEntry {
            key: key.clone(),
            value: value.to_string(),
        });

        let json = serde_json::to_string_pretty(&entries)?;
        match atomic_write(&path, json.as_bytes()) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache folder removed during save, dropping write");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    /// Walk the cache folder and total up its bucket files. A missing
    /// folder is an empty cache.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in WalkDir::new(&self.cache_folder)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                stats.bucket_files += 1;
                stats.total_bytes += entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            }
        }
        stats
    }

    /// Delete every bucket file, leaving the folder in place. Entries that
    /// vanish mid-walk (another worker clearing too) are skipped.
    pub fn clear(&self) -> ConfigureResult<()> {
        for entry in WalkDir::new(&self.cache_folder)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {}
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
        debug!(folder = %self.cache_folder.display(), "cleared compiler settings cache");
        Ok(())
    }
}

/// Size of the cache on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub bucket_files: u64,
    pub total_bytes: u64,
}

fn default_key_hash(key: &CompilerCacheKey) -> String {
    let mut hasher = Sha256::new();
    if let Some(folder) = &key.ndk_installation_folder {
        hasher.update(folder.to_string_lossy().as_bytes());
    }
    hasher.update(b"|");
    if let Some(properties) = &key.ndk_source_properties {
        for (name, value) in properties.iter() {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"|");
        }
    }
    for arg in &key.args {
        hasher.update(arg.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(&hasher.finalize()[..8])
}
