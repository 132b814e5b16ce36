//! Configuration invalidation state machine.
//!
//! Decides, once per configuration pass, whether the native build system
//! needs to be configured again and how destructively: not at all, softly
//! (prior generated files may be reused), or hard (wipe the output folder
//! first). The decision diffs current file timestamps against the
//! fingerprint recorded after the last successful configuration.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::ConfigureResult;
use crate::fingerprint::{
    ConfigureFingerprint, FileStamp, FingerprintRecord, read_configure_fingerprint, stamp_of,
    write_configure_fingerprint,
};

/// How much configuration work the next pass must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureType {
    /// Prior outputs are up to date, skip configuration.
    NoConfigure,
    /// Re-run configuration; prior generated build files may be reused.
    SoftConfigure,
    /// Wipe the configuration output folder and regenerate from scratch.
    HardConfigure,
}

impl fmt::Display for ConfigureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigureType::NoConfigure => "NO_CONFIGURE",
            ConfigureType::SoftConfigure => "SOFT_CONFIGURE",
            ConfigureType::HardConfigure => "HARD_CONFIGURE",
        };
        write!(f, "{name}")
    }
}

/// Kind of change observed for one tracked file since the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Deleted,
    LastModifiedChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Created => "CREATED",
            ChangeType::Deleted => "DELETED",
            ChangeType::LastModifiedChanged => "LAST_MODIFIED_CHANGED",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub file_name: PathBuf,
    pub change_type: ChangeType,
}

/// Outcome of one invalidation evaluation. A value object: constructed
/// fresh each configuration pass, mutated only by
/// [`record_configuration_fingerprint`](Self::record_configuration_fingerprint).
#[derive(Debug, Clone)]
pub struct ConfigureInvalidationState {
    pub force_configure: bool,
    pub fingerprint_file: PathBuf,
    pub input_files: Vec<PathBuf>,
    pub required_output_files: Vec<PathBuf>,
    pub optional_output_files: Vec<PathBuf>,
    pub hard_configure_files: Vec<PathBuf>,
    /// True when the fingerprint file was present and decoded. A corrupt
    /// fingerprint counts as absent.
    pub fingerprint_file_existed: bool,
    pub added_since_fingerprint_files: Vec<PathBuf>,
    pub removed_since_fingerprint_files: Vec<PathBuf>,
    pub changes_to_fingerprint_files: Vec<FileChange>,
    pub unchanged_fingerprint_files: Vec<PathBuf>,
    pub soft_configure_reasons: Vec<String>,
    pub hard_configure_reasons: Vec<String>,
    pub configure_type: ConfigureType,
}

impl ConfigureInvalidationState {
    /// Evaluate current disk state against the recorded fingerprint.
    pub fn create(
        force_configure: bool,
        fingerprint_file: impl Into<PathBuf>,
        input_files: Vec<PathBuf>,
        required_output_files: Vec<PathBuf>,
        optional_output_files: Vec<PathBuf>,
        hard_configure_files: Vec<PathBuf>,
    ) -> Self {
        let fingerprint_file = fingerprint_file.into();
        let previous = match read_configure_fingerprint(&fingerprint_file) {
            Ok(previous) => Some(previous),
            Err(error) => {
                debug!(file = %fingerprint_file.display(), %error, "no usable fingerprint");
                None
            }
        };

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changes: Vec<FileChange> = Vec::new();
        let mut unchanged = Vec::new();
        let mut soft_reasons: Vec<String> = Vec::new();
        let mut hard_reasons: Vec<String> = Vec::new();

        if force_configure {
            hard_reasons.push("force flag used".to_string());
        }

        match &previous {
            None => hard_reasons.push("no fingerprint file".to_string()),
            Some(previous) => {
                let current_union = union_of([
                    &input_files,
                    &required_output_files,
                    &optional_output_files,
                    &hard_configure_files,
                ]);
                let previous_union = union_of([
                    &previous.input_files,
                    &previous.required_output_files,
                    &previous.optional_output_files,
                    &previous.hard_configure_files,
                ]);
                let current_set: HashSet<&PathBuf> = current_union.iter().collect();
                let previous_set: HashSet<&PathBuf> = previous_union.iter().collect();
                added = current_union
                    .iter()
                    .filter(|path| !previous_set.contains(path))
                    .cloned()
                    .collect();
                removed = previous_union
                    .iter()
                    .filter(|path| !current_set.contains(path))
                    .cloned()
                    .collect();

                let mut seen: HashSet<&PathBuf> = HashSet::new();

                // Any change to a hard-configure file means the build
                // command itself changed; merging stale output is unsafe
                for path in &hard_configure_files {
                    if !seen.insert(path) {
                        continue;
                    }
                    match change_of(previous.record_for(path), stamp_of(path)) {
                        Some(change_type) => {
                            hard_reasons.push(format!("{} {change_type}", path.display()));
                            changes.push(FileChange {
                                file_name: path.clone(),
                                change_type,
                            });
                        }
                        None => unchanged.push(path.clone()),
                    }
                }

                // A required output must exist; its absence reconfigures
                // every time, even when the recorded baseline already says
                // it was missing
                for path in &required_output_files {
                    if !seen.insert(path) {
                        continue;
                    }
                    let stamp = stamp_of(path);
                    match change_of(previous.record_for(path), stamp) {
                        Some(change_type) => {
                            soft_reasons.push(format!("{} {change_type}", path.display()));
                            changes.push(FileChange {
                                file_name: path.clone(),
                                change_type,
                            });
                        }
                        None if stamp == FileStamp::Missing => {
                            soft_reasons
                                .push(format!("{} was expected but didn't exist", path.display()));
                        }
                        None => unchanged.push(path.clone()),
                    }
                }

                // Inputs and optional outputs that were already missing at
                // fingerprint time are expected to be missing now
                for path in input_files.iter().chain(&optional_output_files) {
                    if !seen.insert(path) {
                        continue;
                    }
                    match change_of(previous.record_for(path), stamp_of(path)) {
                        Some(change_type) => {
                            soft_reasons.push(format!("{} {change_type}", path.display()));
                            changes.push(FileChange {
                                file_name: path.clone(),
                                change_type,
                            });
                        }
                        None => unchanged.push(path.clone()),
                    }
                }
            }
        }

        let configure_type = if !hard_reasons.is_empty() {
            ConfigureType::HardConfigure
        } else if !soft_reasons.is_empty() {
            ConfigureType::SoftConfigure
        } else {
            ConfigureType::NoConfigure
        };
        info!(%configure_type, "evaluated configure invalidation");

        Self {
            force_configure,
            fingerprint_file,
            input_files,
            required_output_files,
            optional_output_files,
            hard_configure_files,
            fingerprint_file_existed: previous.is_some(),
            added_since_fingerprint_files: added,
            removed_since_fingerprint_files: removed,
            changes_to_fingerprint_files: changes,
            unchanged_fingerprint_files: unchanged,
            soft_configure_reasons: soft_reasons,
            hard_configure_reasons: hard_reasons,
            configure_type,
        }
    }

    /// True when a configuration step must run.
    pub fn should_configure(&self) -> bool {
        self.configure_type != ConfigureType::NoConfigure
    }

    /// True when prior generated build files may be merged rather than
    /// wiped.
    pub fn soft_configure_okay(&self) -> bool {
        self.configure_type == ConfigureType::SoftConfigure
    }

    /// Persist the current disk state as the new baseline. The caller must
    /// invoke this only after a configuration step completed successfully;
    /// a failed configuration leaves the old fingerprint in place so the
    /// next invocation retries.
    pub fn record_configuration_fingerprint(&self) -> ConfigureResult<()> {
        let fingerprint = ConfigureFingerprint::capture(
            &self.input_files,
            &self.required_output_files,
            &self.optional_output_files,
            &self.hard_configure_files,
        );
        write_configure_fingerprint(&self.fingerprint_file, &fingerprint)
    }
}

/// The change in one file's state between a baseline record and now.
/// A file absent from both is unchanged. An unreadable probe is always a
/// change so an I/O error can never skip a rebuild.
fn change_of(baseline: Option<&FingerprintRecord>, current: FileStamp) -> Option<ChangeType> {
    let (existed, millis) = match baseline {
        Some(record) => (record.existed, record.last_modified_millis),
        None => (false, 0),
    };
    match current {
        FileStamp::Exists(current_millis) => {
            if !existed {
                Some(ChangeType::Created)
            } else if current_millis != millis {
                Some(ChangeType::LastModifiedChanged)
            } else {
                None
            }
        }
        FileStamp::Missing => {
            if existed {
                Some(ChangeType::Deleted)
            } else {
                None
            }
        }
        FileStamp::Unreadable => Some(if existed {
            ChangeType::LastModifiedChanged
        } else {
            ChangeType::Created
        }),
    }
}

fn union_of(lists: [&Vec<PathBuf>; 4]) -> Vec<PathBuf> {
    let mut union = Vec::new();
    let mut seen = HashSet::new();
    for list in lists {
        for path in list {
            if seen.insert(path.clone()) {
                union.push(path.clone());
            }
        }
    }
    union
}
