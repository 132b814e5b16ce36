//! Binary fingerprint of tracked file timestamps.
//!
//! After a successful native-build configuration the timestamps of every
//! tracked file are snapshotted into a compact binary fingerprint file.
//! The next configuration pass diffs current disk state against this
//! snapshot to decide whether configuring can be skipped. Paths are stored
//! through a string-interning table so the many files sharing a parent
//! folder don't repeat their prefixes.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::{ConfigureError, ConfigureResult};
use crate::io::atomic_write;

const FINGERPRINT_MAGIC: &[u8] = b"C/C++ Configure Fingerprint";
const FINGERPRINT_VERSION: u32 = 1;

/// Result of probing one file's on-disk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStamp {
    /// File exists; mtime in milliseconds since the epoch.
    Exists(i64),
    Missing,
    /// Metadata could not be read (permissions, transient lock). Every
    /// comparison treats this as changed.
    Unreadable,
}

/// Probe a file's timestamp without failing.
pub fn stamp_of(path: &Path) -> FileStamp {
    match fs::metadata(path) {
        Ok(metadata) => {
            let mtime = FileTime::from_last_modification_time(&metadata);
            let millis = mtime.unix_seconds() * 1_000 + i64::from(mtime.nanoseconds() / 1_000_000);
            FileStamp::Exists(millis)
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => FileStamp::Missing,
        Err(_) => FileStamp::Unreadable,
    }
}

/// One tracked file's state at fingerprint time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub file_name: PathBuf,
    pub existed: bool,
    pub last_modified_millis: i64,
}

impl FingerprintRecord {
    /// Snapshot a file's current state. Unreadable files are recorded as
    /// missing so the next evaluation sees them as changed.
    pub fn probe(path: &Path) -> Self {
        match stamp_of(path) {
            FileStamp::Exists(millis) => Self {
                file_name: path.to_path_buf(),
                existed: true,
                last_modified_millis: millis,
            },
            FileStamp::Missing | FileStamp::Unreadable => Self {
                file_name: path.to_path_buf(),
                existed: false,
                last_modified_millis: 0,
            },
        }
    }
}

/// Snapshot of every tracked file plus the declared file sets, taken after
/// a successful configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigureFingerprint {
    pub records: Vec<FingerprintRecord>,
    pub input_files: Vec<PathBuf>,
    pub required_output_files: Vec<PathBuf>,
    pub optional_output_files: Vec<PathBuf>,
    pub hard_configure_files: Vec<PathBuf>,
}

impl ConfigureFingerprint {
    /// Probe the current on-disk state of every declared file. Duplicates
    /// across the four sets produce a single record.
    pub fn capture(
        input_files: &[PathBuf],
        required_output_files: &[PathBuf],
        optional_output_files: &[PathBuf],
        hard_configure_files: &[PathBuf],
    ) -> Self {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        for path in input_files
            .iter()
            .chain(required_output_files)
            .chain(optional_output_files)
            .chain(hard_configure_files)
        {
            if seen.insert(path.clone()) {
                records.push(FingerprintRecord::probe(path));
            }
        }
        Self {
            records,
            input_files: input_files.to_vec(),
            required_output_files: required_output_files.to_vec(),
            optional_output_files: optional_output_files.to_vec(),
            hard_configure_files: hard_configure_files.to_vec(),
        }
    }

    pub fn record_for(&self, path: &Path) -> Option<&FingerprintRecord> {
        self.records.iter().find(|record| record.file_name == *path)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut table = StringTable::default();
        let records: Vec<(u32, u32, &FingerprintRecord)> = self
            .records
            .iter()
            .map(|record| {
                let (parent, name) = table.intern_path(&record.file_name);
                (parent, name, record)
            })
            .collect();
        let lists: [Vec<(u32, u32)>; 4] = [
            &self.input_files,
            &self.required_output_files,
            &self.optional_output_files,
            &self.hard_configure_files,
        ]
        .map(|list| list.iter().map(|path| table.intern_path(path)).collect());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(FINGERPRINT_MAGIC);
        push_u32(&mut bytes, FINGERPRINT_VERSION);
        push_u32(&mut bytes, table.strings.len() as u32);
        for text in &table.strings {
            push_u32(&mut bytes, text.len() as u32);
            bytes.extend_from_slice(text.as_bytes());
        }
        push_u32(&mut bytes, records.len() as u32);
        for (parent, name, record) in records {
            push_u32(&mut bytes, parent);
            push_u32(&mut bytes, name);
            bytes.push(u8::from(record.existed));
            push_i64(&mut bytes, record.last_modified_millis);
        }
        for list in lists {
            push_u32(&mut bytes, list.len() as u32);
            for (parent, name) in list {
                push_u32(&mut bytes, parent);
                push_u32(&mut bytes, name);
            }
        }
        bytes
    }

    /// Decode a fingerprint. Any structural problem (truncation, bad magic,
    /// unknown version, dangling string index, trailing bytes) yields None.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = ByteReader::new(bytes);
        if reader.take(FINGERPRINT_MAGIC.len())? != FINGERPRINT_MAGIC {
            return None;
        }
        if reader.u32()? != FINGERPRINT_VERSION {
            return None;
        }

        let string_count = reader.u32()? as usize;
        let mut strings = Vec::new();
        for _ in 0..string_count {
            strings.push(reader.string()?);
        }

        let record_count = reader.u32()? as usize;
        let mut records = Vec::new();
        for _ in 0..record_count {
            let file_name = path_of(&strings, reader.u32()?, reader.u32()?)?;
            let existed = match reader.u8()? {
                0 => false,
                1 => true,
                _ => return None,
            };
            let last_modified_millis = reader.i64()?;
            records.push(FingerprintRecord {
                file_name,
                existed,
                last_modified_millis,
            });
        }

        let mut lists: Vec<Vec<PathBuf>> = Vec::with_capacity(4);
        for _ in 0..4 {
            let count = reader.u32()? as usize;
            let mut list = Vec::new();
            for _ in 0..count {
                list.push(path_of(&strings, reader.u32()?, reader.u32()?)?);
            }
            lists.push(list);
        }
        if !reader.at_end() {
            return None;
        }

        let mut lists = lists.into_iter();
        Some(Self {
            records,
            input_files: lists.next()?,
            required_output_files: lists.next()?,
            optional_output_files: lists.next()?,
            hard_configure_files: lists.next()?,
        })
    }
}

/// Read and decode a fingerprint file.
pub fn read_configure_fingerprint(path: &Path) -> ConfigureResult<ConfigureFingerprint> {
    let bytes = fs::read(path)?;
    ConfigureFingerprint::from_bytes(&bytes)
        .ok_or_else(|| ConfigureError::CorruptFingerprint(path.to_path_buf()))
}

/// Encode and atomically write a fingerprint file.
pub fn write_configure_fingerprint(
    path: &Path,
    fingerprint: &ConfigureFingerprint,
) -> ConfigureResult<()> {
    atomic_write(path, &fingerprint.to_bytes())?;
    Ok(())
}

#[derive(Default)]
struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    fn intern(&mut self, text: &str) -> u32 {
        if let Some(&id) = self.index.get(text) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), id);
        id
    }

    fn intern_path(&mut self, path: &Path) -> (u32, u32) {
        let (parent, name) = split_path(path);
        (self.intern(&parent), self.intern(&name))
    }
}

/// Split into (parent, file name). Paths with no file name (e.g. `/`) are
/// stored whole under an empty parent so joining reconstructs them.
fn split_path(path: &Path) -> (String, String) {
    match path.file_name() {
        Some(name) => (
            path.parent()
                .map(|parent| parent.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name.to_string_lossy().into_owned(),
        ),
        None => (String::new(), path.to_string_lossy().into_owned()),
    }
}

fn join_path(parent: &str, name: &str) -> PathBuf {
    if parent.is_empty() {
        PathBuf::from(name)
    } else {
        Path::new(parent).join(name)
    }
}

fn path_of(strings: &[String], parent: u32, name: u32) -> Option<PathBuf> {
    let parent = strings.get(parent as usize)?;
    let name = strings.get(name as usize)?;
    Some(join_path(parent, name))
}

pub(crate) fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn push_i64(bytes: &mut Vec<u8>, value: i64) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

/// Bounds-checked little-endian reader over a byte slice. Shared with the
/// compile-commands binary codec.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub(crate) fn take(&mut self, length: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(length)?;
        let slice = self.bytes.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn i64(&mut self) -> Option<i64> {
        Some(i64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    pub(crate) fn string(&mut self) -> Option<String> {
        let length = self.u32()? as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    pub(crate) fn at_end(&self) -> bool {
        self.offset == self.bytes.len()
    }
}
