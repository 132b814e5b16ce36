//! Ninja resolution.
//!
//! Ninja ships inside SDK CMake packages, so a Ninja sitting next to the
//! already-resolved CMake has highest precedence, then the bin folders of
//! other SDK CMake packages, then the process `PATH`. A missing Ninja is
//! the named diagnostic [`DiagnosticCode::NinjaNotFound`], not a generic
//! error, so the host can suggest installing an SDK CMake.

use std::path::{Path, PathBuf};

use crate::error::DiagnosticCode;
use crate::logging::ConfigureLog;

/// Locate the folder holding a ninja executable.
///
/// `resolved_cmake_folder` is the CMake install root already chosen by
/// [`find_cmake_path`](super::find_cmake_path), when there is one; its
/// `bin` folder is checked first. `sdk_cmake_folders` lists other SDK
/// CMake install roots and `environment_paths` yields `PATH` entries; each
/// is fetched only if the earlier locations had no Ninja. `ninja_exists_at`
/// reports whether the given folder holds a ninja executable.
pub fn find_ninja_path(
    resolved_cmake_folder: Option<&Path>,
    sdk_cmake_folders: &mut dyn FnMut() -> Vec<PathBuf>,
    environment_paths: &mut dyn FnMut() -> Vec<PathBuf>,
    ninja_exists_at: &dyn Fn(&Path) -> bool,
    log: &mut ConfigureLog,
) -> Option<PathBuf> {
    if let Some(cmake_folder) = resolved_cmake_folder {
        let bin = cmake_folder.join("bin");
        if ninja_exists_at(&bin) {
            log.info(format!(
                "Using Ninja co-located with CMake at '{}'",
                bin.display()
            ));
            return Some(bin);
        }
    }
    for folder in sdk_cmake_folders() {
        let bin = folder.join("bin");
        if ninja_exists_at(&bin) {
            log.info(format!(
                "Using Ninja from SDK CMake folder '{}'",
                bin.display()
            ));
            return Some(bin);
        }
    }
    for entry in environment_paths() {
        if ninja_exists_at(&entry) {
            log.info(format!("Using Ninja from PATH at '{}'", entry.display()));
            return Some(entry);
        }
    }
    log.error_with(
        DiagnosticCode::NinjaNotFound,
        "Ninja was not found next to CMake, in any SDK CMake folder, or on PATH.",
    );
    None
}
