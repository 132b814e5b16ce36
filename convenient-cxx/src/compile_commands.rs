//! Conversion of `compile_commands.json` to a compact binary form.
//!
//! CMake's `compile_commands.json` repeats the compiler path, the flag
//! list and the working directory for every translation unit, which makes
//! it slow to parse on every sync. Conversion interns those repeated
//! values into tables and derives each entry's build target from its
//! object-file path, producing a versioned binary the IDE side can stream
//! without re-tokenizing clang commands. Conversion is idempotent against
//! the json's timestamp so the json/bin pair can participate in configure
//! fingerprinting as one unit.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use serde::Deserialize;
use tracing::debug;

use crate::cmdline::{PlatformConventions, tokenize_command_line};
use crate::error::{ConfigureError, ConfigureResult, DiagnosticCode};
use crate::fingerprint::{ByteReader, push_u32};
use crate::io::atomic_write;
use crate::logging::ConfigureLog;

/// Header magic of the binary form.
pub const COMPILE_COMMANDS_MAGIC: &[u8] = b"C/C++ Build Metadata";

/// Current binary format version. Older versions are regenerated wholesale.
pub const CURRENT_COMPILE_COMMANDS_VERSION: u32 = 2;

/// One decoded compile command.
///
/// `compiler`, `flags`, `working_directory` and `target` are shared
/// allocations: entries that encoded the same interned value decode to
/// pointer-identical `Arc`s.
#[derive(Debug, Clone)]
pub struct CompileCommand {
    pub source_file: PathBuf,
    pub compiler: Arc<PathBuf>,
    pub flags: Arc<Vec<String>>,
    pub working_directory: Arc<PathBuf>,
    pub output_file: PathBuf,
    pub target: Arc<String>,
    /// Zero-based position of this entry, for progress reporting.
    pub source_file_index: usize,
    pub source_file_count: usize,
}

/// The json surface CMake emits. Either `command` (one string to
/// tokenize) or `arguments` (pre-split) is present per entry.
#[derive(Debug, Deserialize)]
struct JsonCompileCommand {
    directory: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    file: String,
    #[serde(default)]
    output: Option<String>,
}

/// Convert `compile_commands.json` into the binary form at `bin_path`.
///
/// A no-op when `bin_path` already holds a current-version binary at least
/// as new as the json. Otherwise the binary is regenerated from scratch
/// (old-format or corrupt binaries are replaced, never appended to) and
/// its timestamp is set equal to the json's. Entries whose output file or
/// target cannot be determined are recorded in `log` with a stable
/// diagnostic code and skipped; the batch continues. `path_converter`
/// rewrites each path-valued field, for hosts that need to translate
/// between path styles.
pub fn convert_compile_commands(
    json_path: &Path,
    bin_path: &Path,
    conventions: PlatformConventions,
    path_converter: &dyn Fn(&Path) -> PathBuf,
    log: &mut ConfigureLog,
) -> ConfigureResult<()> {
    let json_time = FileTime::from_last_modification_time(&fs::metadata(json_path)?);
    if let Ok(bin_metadata) = fs::metadata(bin_path)
        && compile_commands_file_is_current_version(bin_path)
        && FileTime::from_last_modification_time(&bin_metadata) >= json_time
    {
        debug!(bin = %bin_path.display(), "binary compile commands are up to date");
        return Ok(());
    }

    let entries: Vec<JsonCompileCommand> = serde_json::from_str(&fs::read_to_string(json_path)?)?;
    let mut encoder = Encoder::default();
    let mut skipped = 0usize;

    for entry in &entries {
        let tokens = match (&entry.arguments, &entry.command) {
            (Some(arguments), _) => arguments.clone(),
            (None, Some(command)) => tokenize_command_line(command, conventions),
            (None, None) => Vec::new(),
        };
        let Some((compiler, flags)) = tokens.split_first() else {
            skipped += 1;
            log.error_with(
                DiagnosticCode::CouldNotExtractOutputFileFromClangCommand,
                format!("Compile command for '{}' was empty", entry.file),
            );
            continue;
        };
        let Some(output) = entry
            .output
            .clone()
            .or_else(|| extract_flag_argument("-o", "--output", flags))
        else {
            skipped += 1;
            log.error_with(
                DiagnosticCode::CouldNotExtractOutputFileFromClangCommand,
                format!(
                    "Could not extract output file from the clang command for '{}'",
                    entry.file
                ),
            );
            continue;
        };
        let output = path_converter(Path::new(&output));
        let Some(target) = target_name_from_object_file(&output) else {
            skipped += 1;
            log.error_with(
                DiagnosticCode::ObjectFileCantBeConvertedToTargetName,
                format!(
                    "Object file '{}' has no *.dir ancestor to derive a target name from",
                    output.display()
                ),
            );
            continue;
        };

        encoder.push_entry(
            &path_converter(Path::new(&entry.file)),
            &path_converter(Path::new(compiler)),
            flags,
            &path_converter(Path::new(&entry.directory)),
            &output,
            &target,
        );
    }

    debug!(
        converted = encoder.entry_count(),
        skipped,
        bin = %bin_path.display(),
        "converted compile commands"
    );
    atomic_write(bin_path, &encoder.finish())?;
    filetime::set_file_mtime(bin_path, json_time)?;
    Ok(())
}

/// Read the format version from a binary's header.
pub fn read_compile_commands_version_number(path: &Path) -> ConfigureResult<u32> {
    let not_metadata = || ConfigureError::NotBuildMetadataFile(path.to_path_buf());
    let mut file = File::open(path)?;
    let mut header = vec![0u8; COMPILE_COMMANDS_MAGIC.len() + 4];
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Err(not_metadata()),
        Err(error) => return Err(error.into()),
    }
    if &header[..COMPILE_COMMANDS_MAGIC.len()] != COMPILE_COMMANDS_MAGIC {
        return Err(not_metadata());
    }
    let version: [u8; 4] = header[COMPILE_COMMANDS_MAGIC.len()..]
        .try_into()
        .map_err(|_| not_metadata())?;
    Ok(u32::from_le_bytes(version))
}

/// Pure probe: does `path` hold a current-version binary? Any read or
/// format problem is `false`, never an error.
pub fn compile_commands_file_is_current_version(path: &Path) -> bool {
    matches!(
        read_compile_commands_version_number(path),
        Ok(CURRENT_COMPILE_COMMANDS_VERSION)
    )
}

/// Decode a binary in entry order, invoking `visitor` per entry.
pub fn stream_compile_commands(
    path: &Path,
    visitor: &mut dyn FnMut(&CompileCommand),
) -> ConfigureResult<()> {
    let not_metadata = || ConfigureError::NotBuildMetadataFile(path.to_path_buf());
    let bytes = fs::read(path)?;
    decode(&bytes, visitor).ok_or_else(not_metadata)
}

fn decode(bytes: &[u8], visitor: &mut dyn FnMut(&CompileCommand)) -> Option<()> {
    let mut reader = ByteReader::new(bytes);
    if reader.take(COMPILE_COMMANDS_MAGIC.len())? != COMPILE_COMMANDS_MAGIC {
        return None;
    }
    if reader.u32()? != CURRENT_COMPILE_COMMANDS_VERSION {
        return None;
    }

    let string_count = reader.u32()? as usize;
    let mut strings: Vec<Arc<String>> = Vec::with_capacity(string_count);
    for _ in 0..string_count {
        strings.push(Arc::new(reader.string()?));
    }

    let list_count = reader.u32()? as usize;
    let mut flag_lists: Vec<Arc<Vec<String>>> = Vec::with_capacity(list_count);
    for _ in 0..list_count {
        let length = reader.u32()? as usize;
        let mut list = Vec::with_capacity(length);
        for _ in 0..length {
            list.push(strings.get(reader.u32()? as usize)?.as_ref().clone());
        }
        flag_lists.push(Arc::new(list));
    }

    // Strings used as paths decode once into a shared PathBuf
    let mut path_cache: HashMap<u32, Arc<PathBuf>> = HashMap::new();
    let mut shared_path = |index: u32, strings: &[Arc<String>]| -> Option<Arc<PathBuf>> {
        if let Some(path) = path_cache.get(&index) {
            return Some(Arc::clone(path));
        }
        let path = Arc::new(PathBuf::from(strings.get(index as usize)?.as_str()));
        path_cache.insert(index, Arc::clone(&path));
        Some(path)
    };

    let entry_count = reader.u32()? as usize;
    for index in 0..entry_count {
        let source_file = PathBuf::from(strings.get(reader.u32()? as usize)?.as_str());
        let compiler = shared_path(reader.u32()?, &strings)?;
        let flags = Arc::clone(flag_lists.get(reader.u32()? as usize)?);
        let working_directory = shared_path(reader.u32()?, &strings)?;
        let output_file = PathBuf::from(strings.get(reader.u32()? as usize)?.as_str());
        let target = Arc::clone(strings.get(reader.u32()? as usize)?);
        visitor(&CompileCommand {
            source_file,
            compiler,
            flags,
            working_directory,
            output_file,
            target,
            source_file_index: index,
            source_file_count: entry_count,
        });
    }
    reader.at_end().then_some(())
}

/// Pull the value of a short/long flag pair from a flag list, accepting
/// `-o out`, `-o=out`, `--output out` and `--output=out` spellings.
pub fn extract_flag_argument(short: &str, long: &str, flags: &[String]) -> Option<String> {
    let mut i = 0;
    while i < flags.len() {
        let flag = &flags[i];
        if flag == short || flag == long {
            return flags.get(i + 1).cloned();
        }
        if let Some(rest) = flag.strip_prefix(long)
            && let Some(value) = rest.strip_prefix('=')
        {
            return Some(value.to_string());
        }
        if let Some(rest) = flag.strip_prefix(short)
            && let Some(value) = rest.strip_prefix('=')
        {
            return Some(value.to_string());
        }
        i += 1;
    }
    None
}

/// Remove the arguments an IDE must not see when re-driving the compiler:
/// the `-c <source>` and `-o <output>` pairs and the dependency-generation
/// flags (`-M*`, with `-MF`/`-MT`/`-MQ` consuming their value).
pub fn strip_args_for_ide(source_file: &str, flags: &[String]) -> Vec<String> {
    let mut kept = Vec::new();
    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i].as_str();
        match flag {
            "-c" if flags.get(i + 1).map(String::as_str) == Some(source_file) => i += 2,
            "-o" | "--output" | "-MF" | "-MT" | "-MQ" => i += 2,
            _ if flag.starts_with("-o=") || flag.starts_with("--output=") => i += 1,
            _ if flag.starts_with("-M") => i += 1,
            _ => {
                kept.push(flags[i].clone());
                i += 1;
            }
        }
    }
    kept
}

/// The build target owning an object file: the stem of the nearest
/// ancestor folder named `<target>.dir`.
fn target_name_from_object_file(object_file: &Path) -> Option<String> {
    object_file.ancestors().skip(1).find_map(|ancestor| {
        let name = ancestor.file_name()?.to_string_lossy();
        let stem = name.strip_suffix(".dir")?;
        (!stem.is_empty()).then(|| stem.to_string())
    })
}

/// Interning encoder for the binary form.
#[derive(Default)]
struct Encoder {
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    flag_lists: Vec<Vec<u32>>,
    flag_list_index: HashMap<Vec<u32>, u32>,
    entries: Vec<[u32; 6]>,
}

impl Encoder {
    fn intern(&mut self, text: &str) -> u32 {
        if let Some(&id) = self.string_index.get(text) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.string_index.insert(text.to_string(), id);
        id
    }

    fn intern_path(&mut self, path: &Path) -> u32 {
        self.intern(&path.to_string_lossy())
    }

    fn intern_flags(&mut self, flags: &[String]) -> u32 {
        let ids: Vec<u32> = flags.iter().map(|flag| self.intern(flag)).collect();
        if let Some(&id) = self.flag_list_index.get(&ids) {
            return id;
        }
        let id = self.flag_lists.len() as u32;
        self.flag_lists.push(ids.clone());
        self.flag_list_index.insert(ids, id);
        id
    }

    fn push_entry(
        &mut self,
        source_file: &Path,
        compiler: &Path,
        flags: &[String],
        working_directory: &Path,
        output_file: &Path,
        target: &str,
    ) {
        let entry = [
            self.intern_path(source_file),
            self.intern_path(compiler),
            self.intern_flags(flags),
            self.intern_path(working_directory),
            self.intern_path(output_file),
            self.intern(target),
        ];
        self.entries.push(entry);
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn finish(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(COMPILE_COMMANDS_MAGIC);
        push_u32(&mut bytes, CURRENT_COMPILE_COMMANDS_VERSION);
        push_u32(&mut bytes, self.strings.len() as u32);
        for text in &self.strings {
            push_u32(&mut bytes, text.len() as u32);
            bytes.extend_from_slice(text.as_bytes());
        }
        push_u32(&mut bytes, self.flag_lists.len() as u32);
        for list in &self.flag_lists {
            push_u32(&mut bytes, list.len() as u32);
            for &id in list {
                push_u32(&mut bytes, id);
            }
        }
        push_u32(&mut bytes, self.entries.len() as u32);
        for entry in &self.entries {
            for &field in entry {
                push_u32(&mut bytes, field);
            }
        }
        bytes
    }
}
