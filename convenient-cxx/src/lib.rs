//! Native build configuration engine for CMake and ndk-build.
//!
//! The engine decides, once per configuration pass, how much native-build
//! configuration work is actually needed and supplies the supporting
//! plumbing around that decision:
//! - **cmdline**: typed CMake/ndk-build argument parsing and canonical
//!   re-serialization
//! - **locate**: CMake, NDK and Ninja resolution with structured diagnostics
//! - **cache**: on-disk compiler probe results shared across workers
//! - **fingerprint** / **invalidation**: the NO/SOFT/HARD configure decision
//!   against a recorded timestamp baseline
//! - **io**: atomic writes and the idempotent generated-file writer
//! - **compile_commands**: `compile_commands.json` to binary conversion
//! - **ninja**: streaming `build.ninja` statement parser
//!
//! Everything is synchronous and filesystem-backed; the host build tool
//! owns threading and serializes configuration per variant.

pub mod cache;
pub mod cmdline;
pub mod compile_commands;
pub mod error;
pub mod fingerprint;
pub mod invalidation;
pub mod io;
pub mod locate;
pub mod logging;
pub mod ninja;

pub use cache::{CacheStats, CompilerCacheKey, CompilerSettingsCache};
pub use cmdline::{
    CommandLineArgument, PlatformConventions, parse_cmake_arguments, parse_cmake_command_line,
    parse_ndk_build_arguments, parse_ndk_build_command_line, remove_blank_properties,
    remove_subsumed_arguments, to_string_list,
};
pub use compile_commands::{
    CompileCommand, compile_commands_file_is_current_version, convert_compile_commands,
    read_compile_commands_version_number, stream_compile_commands,
};
pub use error::{ConfigureError, ConfigureResult, DiagnosticCode};
pub use fingerprint::{ConfigureFingerprint, FingerprintRecord};
pub use invalidation::{ChangeType, ConfigureInvalidationState, ConfigureType};
pub use io::{IdempotentFileWriter, atomic_write, compare_file_contents};
pub use locate::{find_cmake_path, find_ndk_path, find_ninja_path};
pub use logging::{ConfigureLog, Diagnostic, Severity};
pub use ninja::{NinjaBuildStatement, NinjaStatement, stream_ninja_statements};
