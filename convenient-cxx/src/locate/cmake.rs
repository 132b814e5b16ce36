//! CMake resolution.
//!
//! Precedence: a `cmake.dir` property wins, then the SDK package
//! repository, then the process `PATH`. A `cmake.dir` holding the wrong
//! version is terminal; one that cannot be probed leaves an error and the
//! search continues. When the DSL pins no version the SDK's fork build is
//! required exactly and may be downloaded on demand; any other requested
//! version must be 3.7 or higher and is matched against SDK packages and
//! `PATH` candidates with production-over-RC tie-breaking. Every rejected
//! location is enumerated in one aggregate error so the user can see the
//! whole search.

use std::path::{Path, PathBuf};

use tracing::debug;

use convenient_sdk::{LocalPackage, Revision};

use crate::logging::ConfigureLog;

/// The SDK's fork build of CMake, required when the DSL pins no version.
pub const DEFAULT_CMAKE_VERSION: &str = "3.6.4111459";

/// Historical DSL alias for the fork build.
const FORK_CMAKE_VERSION_ALIAS: &str = "3.6.0-rc2";

fn default_cmake_revision() -> Revision {
    Revision::new(3, 6, 4111459)
}

/// What the DSL asked for, after alias folding and validation.
enum CmakeRequest {
    /// No version, the alias, or the fork version itself: the pinned SDK
    /// fork build is required exactly.
    ForkDefault,
    /// A concrete 3.7+ version constraint.
    Version(Revision),
}

/// Locate a CMake installation.
///
/// `probe_version` reports the version of the cmake executable inside the
/// given folder, or `None` when it cannot be executed. `repository_packages`
/// lists installed SDK CMake packages and `environment_paths` yields `PATH`
/// entries; both are fetched only if the precedence order reaches them.
/// `downloader` is invoked at most once, when the fork default is required
/// but not yet installed, after which the package listing is re-queried.
///
/// The returned folder is the install root for `cmake.dir` and SDK matches
/// (never ending in `bin`), or the `PATH` entry holding the executable.
/// `None` means resolution failed; the reasons are in `log`.
pub fn find_cmake_path(
    version_from_dsl: Option<&str>,
    cmake_dir: Option<&Path>,
    repository_packages: &mut dyn FnMut() -> Vec<LocalPackage>,
    downloader: &mut dyn FnMut(),
    environment_paths: &mut dyn FnMut() -> Vec<PathBuf>,
    probe_version: &dyn Fn(&Path) -> Option<Revision>,
    log: &mut ConfigureLog,
) -> Option<PathBuf> {
    let request = match version_from_dsl.map(str::trim) {
        None => CmakeRequest::ForkDefault,
        Some(DEFAULT_CMAKE_VERSION) | Some(FORK_CMAKE_VERSION_ALIAS) => CmakeRequest::ForkDefault,
        Some(text) => match Revision::parse(text) {
            Ok(version) if version.major < 3 || (version.major == 3 && version.minor < 7) => {
                log.error(format!(
                    "CMake version '{text}' is too low. Use 3.7.0 or higher."
                ));
                return None;
            }
            Ok(version) => CmakeRequest::Version(version),
            Err(_) => {
                log.error(format!(
                    "CMake version '{text}' is not formatted correctly."
                ));
                CmakeRequest::ForkDefault
            }
        },
    };

    if let Some(cmake_dir) = cmake_dir {
        let requested = match &request {
            CmakeRequest::ForkDefault if version_from_dsl.is_some() => {
                Some(default_cmake_revision())
            }
            CmakeRequest::ForkDefault => None,
            CmakeRequest::Version(version) => Some(*version),
        };
        match inspect_cmake_dir(cmake_dir, requested, probe_version, log) {
            CmakeDirOutcome::Found(folder) => return Some(folder),
            CmakeDirOutcome::Mismatch { found, requested } => {
                // Terminal, but show which SDK packages would also have
                // been rejected so the user sees the whole picture
                let mut message = format!(
                    "CMake version '{found}' found via cmake.dir='{}' does not match requested version '{requested}'.",
                    cmake_dir.display()
                );
                for package in repository_packages() {
                    if !requested.accepts(&package.revision) {
                        message.push('\n');
                        message.push_str(&sdk_rejection_line(&requested, &package.revision));
                    }
                }
                log.error(message);
                return None;
            }
            CmakeDirOutcome::Unprobeable => {}
        }
    }

    match request {
        CmakeRequest::ForkDefault => {
            locate_fork_default(repository_packages, downloader, log)
        }
        CmakeRequest::Version(requested) => locate_matching_version(
            requested,
            repository_packages,
            environment_paths,
            probe_version,
            log,
        ),
    }
}

/// What became of the `cmake.dir` property.
enum CmakeDirOutcome {
    Found(PathBuf),
    /// The install runs but has the wrong version. Terminal: the user
    /// pinned this folder, silently using another would betray that.
    Mismatch { found: Revision, requested: Revision },
    /// No version could be probed. The error is recorded and the search
    /// continues with the SDK and PATH.
    Unprobeable,
}

fn inspect_cmake_dir(
    cmake_dir: &Path,
    requested: Option<Revision>,
    probe_version: &dyn Fn(&Path) -> Option<Revision>,
    log: &mut ConfigureLog,
) -> CmakeDirOutcome {
    // The property may point at the install root or its bin folder; the
    // resolved folder never ends in bin
    let folder = match cmake_dir.file_name() {
        Some(name) if name == "bin" => cmake_dir.parent().unwrap_or(cmake_dir),
        _ => cmake_dir,
    };
    let Some(found) = probe_version(&folder.join("bin")) else {
        log.error(format!(
            "Could not get version from cmake.dir path '{}'.",
            cmake_dir.display()
        ));
        return CmakeDirOutcome::Unprobeable;
    };
    if let Some(requested) = requested
        && !requested.accepts(&found)
    {
        return CmakeDirOutcome::Mismatch { found, requested };
    }
    log.info(format!(
        "Using CMake '{found}' from cmake.dir at '{}'",
        folder.display()
    ));
    CmakeDirOutcome::Found(folder.to_path_buf())
}

/// The pinned fork build comes only from the SDK, downloading it if needed.
fn locate_fork_default(
    repository_packages: &mut dyn FnMut() -> Vec<LocalPackage>,
    downloader: &mut dyn FnMut(),
    log: &mut ConfigureLog,
) -> Option<PathBuf> {
    let default = default_cmake_revision();
    let installed = |packages: &[LocalPackage]| {
        packages
            .iter()
            .find(|package| package.revision == default)
            .map(|package| package.install_folder.clone())
    };

    if let Some(folder) = installed(&repository_packages()) {
        log.info(format!(
            "Using CMake '{DEFAULT_CMAKE_VERSION}' from SDK at '{}'",
            folder.display()
        ));
        return Some(folder);
    }
    debug!("CMake '{DEFAULT_CMAKE_VERSION}' not installed, requesting download");
    downloader();
    let packages = repository_packages();
    if let Some(folder) = installed(&packages) {
        log.info(format!(
            "Using downloaded CMake '{DEFAULT_CMAKE_VERSION}' from SDK at '{}'",
            folder.display()
        ));
        return Some(folder);
    }
    let mut message = format!(
        "CMake '{DEFAULT_CMAKE_VERSION}' is required but has not yet been downloaded from the SDK."
    );
    for package in &packages {
        message.push('\n');
        message.push_str(&format!(
            "- CMake found in SDK at '{}' had version '{}'.",
            package.install_folder.display(),
            package.revision
        ));
    }
    log.error(message);
    None
}

/// Search SDK packages, then `PATH`, for a version satisfying `requested`.
fn locate_matching_version(
    requested: Revision,
    repository_packages: &mut dyn FnMut() -> Vec<LocalPackage>,
    environment_paths: &mut dyn FnMut() -> Vec<PathBuf>,
    probe_version: &dyn Fn(&Path) -> Option<Revision>,
    log: &mut ConfigureLog,
) -> Option<PathBuf> {
    let mut rejections: Vec<String> = Vec::new();
    let mut best: Option<(PathBuf, Revision)> = None;

    for package in repository_packages() {
        if requested.accepts(&package.revision) {
            keep_better(&mut best, package.install_folder, package.revision, requested);
        } else {
            rejections.push(sdk_rejection_line(&requested, &package.revision));
        }
    }
    if let Some((folder, found)) = best {
        log.info(format!(
            "Using CMake '{found}' from SDK at '{}'",
            folder.display()
        ));
        return Some(folder);
    }

    for entry in environment_paths() {
        match probe_version(&entry) {
            None => log.warn(format!(
                "Could not execute cmake at '{}' to get version. Skipping.",
                entry.display()
            )),
            Some(found) if requested.accepts(&found) => {
                keep_better(&mut best, entry, found, requested);
            }
            Some(found) => rejections.push(format!(
                "- CMake '{found}' found in PATH at '{}' did not satisfy requested version '{requested}' because {}.",
                entry.display(),
                explain_version_mismatch(&requested, &found)
            )),
        }
    }
    if let Some((folder, found)) = best {
        log.info(format!(
            "Using CMake '{found}' from PATH at '{}'",
            folder.display()
        ));
        return Some(folder);
    }

    let mut message = format!("CMake '{requested}' was not found in PATH or by cmake.dir property.");
    for rejection in rejections {
        message.push('\n');
        message.push_str(&rejection);
    }
    log.error(message);
    None
}

/// Keep the better of the current best and a new satisfying candidate.
///
/// An exact version match wins outright; otherwise a strictly higher
/// revision replaces the best (so production outranks any RC and a higher
/// RC outranks a lower one), and equal revisions keep the earlier
/// candidate, preserving input order as the final tie-break.
fn keep_better(
    best: &mut Option<(PathBuf, Revision)>,
    candidate: PathBuf,
    version: Revision,
    requested: Revision,
) {
    match best {
        None => *best = Some((candidate, version)),
        Some((_, best_version)) => {
            if *best_version == requested {
                return;
            }
            if version == requested || version > *best_version {
                *best = Some((candidate, version));
            }
        }
    }
}

fn sdk_rejection_line(requested: &Revision, found: &Revision) -> String {
    format!(
        "- CMake '{found}' found in SDK did not satisfy requested version '{requested}' because {}.",
        explain_version_mismatch(requested, found)
    )
}

/// Name the first version field that broke the constraint, for the
/// aggregate not-found error.
fn explain_version_mismatch(requested: &Revision, found: &Revision) -> String {
    if found.major != requested.major {
        format!(
            "MAJOR value {} wasn't exactly {}",
            found.major, requested.major
        )
    } else if requested.precision() >= 2 && found.minor != requested.minor {
        format!(
            "MINOR value {} wasn't exactly {}",
            found.minor, requested.minor
        )
    } else if requested.precision() >= 3 && found.micro != requested.micro {
        format!(
            "MICRO value {} wasn't exactly {}",
            found.micro, requested.micro
        )
    } else {
        format!(
            "RC value {} wasn't exactly {}",
            preview_text(found),
            preview_text(requested)
        )
    }
}

fn preview_text(revision: &Revision) -> String {
    match revision.preview {
        Some(rc) => format!("rc{rc}"),
        None => "none".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn revision(text: &str) -> Revision {
        Revision::parse(text).unwrap()
    }

    fn path(text: &str) -> PathBuf {
        PathBuf::from(text)
    }

    /// Version probe over a fixed folder -> version table. Folders not in
    /// the table behave like executables that fail to run.
    fn probe<'a>(table: &'a [(&'a str, &'a str)]) -> impl Fn(&Path) -> Option<Revision> + 'a {
        move |folder: &Path| {
            table
                .iter()
                .find(|(entry, _)| Path::new(entry) == folder)
                .map(|(_, version)| revision(version))
        }
    }

    #[test]
    fn test_cmake_dir_match_never_touches_sdk_or_path() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.10.2"),
            Some(Path::new("/opt/cmake")),
            &mut || panic!("SDK listing fetched"),
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[("/opt/cmake/bin", "3.10.2")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/opt/cmake")));
        assert!(!log.has_errors());
    }

    #[test]
    fn test_cmake_dir_pointing_at_bin_is_stripped() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            None,
            Some(Path::new("/opt/cmake/bin")),
            &mut || panic!("SDK listing fetched"),
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[("/opt/cmake/bin", "3.10.2")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/opt/cmake")));
    }

    #[test]
    fn test_unprobeable_cmake_dir_records_error_then_searches_sdk() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.10.2"),
            Some(Path::new("/opt/broken")),
            &mut || vec![LocalPackage::new("/sdk/cmake/3.10.2", revision("3.10.2"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.10.2")));
        assert_eq!(
            log.errors(),
            vec!["Could not get version from cmake.dir path '/opt/broken'."]
        );
    }

    #[test]
    fn test_unprobeable_cmake_dir_falls_back_to_fork_default() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            None,
            Some(Path::new("/opt/broken")),
            &mut || vec![LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.6.4111459")));
        assert_eq!(
            log.errors(),
            vec!["Could not get version from cmake.dir path '/opt/broken'."]
        );
    }

    #[test]
    fn test_cmake_dir_version_mismatch_is_an_error_not_a_fallback() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12.0"),
            Some(Path::new("/opt/cmake")),
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[("/opt/cmake/bin", "3.10.2")]),
            &mut log,
        );
        assert_eq!(found, None);
        assert_eq!(
            log.errors(),
            vec![
                "CMake version '3.10.2' found via cmake.dir='/opt/cmake' does not match requested version '3.12.0'."
            ]
        );
    }

    #[test]
    fn test_cmake_dir_mismatch_error_enumerates_rejected_sdk_packages() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12.0"),
            Some(Path::new("/opt/cmake")),
            &mut || vec![LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[("/opt/cmake/bin", "3.10.2")]),
            &mut log,
        );
        assert_eq!(found, None);
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        let lines: Vec<&str> = errors[0].lines().collect();
        assert_eq!(
            lines,
            vec![
                "CMake version '3.10.2' found via cmake.dir='/opt/cmake' does not match requested version '3.12.0'.",
                "- CMake '3.6.4111459' found in SDK did not satisfy requested version '3.12.0' because MINOR value 6 wasn't exactly 12.",
            ]
        );
    }

    #[test]
    fn test_no_dsl_version_requires_fork_default_from_sdk() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            None,
            None,
            &mut || {
                vec![
                    LocalPackage::new("/sdk/cmake/3.10.2", revision("3.10.2")),
                    LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459")),
                ]
            },
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.6.4111459")));
    }

    #[test]
    fn test_fork_alias_folds_to_default() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.6.0-rc2"),
            None,
            &mut || vec![LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.6.4111459")));
        assert!(!log.has_errors());
    }

    #[test]
    fn test_missing_fork_default_invokes_downloader_then_requeries() {
        let mut log = ConfigureLog::new();
        let downloaded = std::cell::Cell::new(false);
        let listings = std::cell::Cell::new(0usize);

        let found = find_cmake_path(
            None,
            None,
            &mut || {
                listings.set(listings.get() + 1);
                if downloaded.get() {
                    vec![LocalPackage::new(
                        "/sdk/cmake/3.6.4111459",
                        revision("3.6.4111459"),
                    )]
                } else {
                    Vec::new()
                }
            },
            &mut || downloaded.set(true),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );

        assert_eq!(found, Some(path("/sdk/cmake/3.6.4111459")));
        assert!(downloaded.get());
        assert_eq!(listings.get(), 2);
    }

    #[test]
    fn test_fork_default_still_missing_after_download_is_an_error() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            None,
            None,
            &mut Vec::new,
            &mut || {},
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, None);
        assert_eq!(
            log.errors(),
            vec!["CMake '3.6.4111459' is required but has not yet been downloaded from the SDK."]
        );
    }

    #[test]
    fn test_fork_default_error_enumerates_other_installed_versions() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            None,
            None,
            &mut || vec![LocalPackage::new("/sdk/cmake/3.10.2", revision("3.10.2"))],
            &mut || {},
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, None);
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        let lines: Vec<&str> = errors[0].lines().collect();
        assert_eq!(
            lines,
            vec![
                "CMake '3.6.4111459' is required but has not yet been downloaded from the SDK.",
                "- CMake found in SDK at '/sdk/cmake/3.10.2' had version '3.10.2'.",
            ]
        );
    }

    #[test]
    fn test_version_below_three_seven_is_rejected() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.6.9999"),
            None,
            &mut || panic!("SDK listing fetched"),
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, None);
        assert_eq!(
            log.errors(),
            vec!["CMake version '3.6.9999' is too low. Use 3.7.0 or higher."]
        );
    }

    #[test]
    fn test_unparseable_version_reports_error_then_uses_default() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.bob"),
            None,
            &mut || vec![LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.6.4111459")));
        assert_eq!(
            log.errors(),
            vec!["CMake version '3.bob' is not formatted correctly."]
        );
    }

    #[test]
    fn test_sdk_match_never_fetches_path() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.10.2"),
            None,
            &mut || vec![LocalPackage::new("/sdk/cmake/3.10.2", revision("3.10.2"))],
            &mut || panic!("downloader invoked"),
            &mut || panic!("PATH fetched"),
            &probe(&[]),
            &mut log,
        );
        assert_eq!(found, Some(path("/sdk/cmake/3.10.2")));
    }

    #[test]
    fn test_partial_version_match_with_rc_and_production() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12"),
            None,
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/a"), path("/b")],
            &probe(&[("/a", "3.12.0-rc1"), ("/b", "3.12.0")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/b")));
    }

    #[test]
    fn test_higher_rc_wins_among_rcs() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12"),
            None,
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/a"), path("/b")],
            &probe(&[("/a", "3.12.0-rc1"), ("/b", "3.12.0-rc2")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/b")));
    }

    #[test]
    fn test_exact_version_matches_two_locations_picks_first() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12.0"),
            None,
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/a"), path("/b")],
            &probe(&[("/a", "3.12.0"), ("/b", "3.12.0")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/a")));
    }

    #[test]
    fn test_exact_match_wins_over_higher_satisfying_version() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12"),
            None,
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/a"), path("/b")],
            &probe(&[("/a", "3.12.5"), ("/b", "3.12.0")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/b")));
    }

    #[test]
    fn test_unprobeable_path_entry_is_skipped_with_warning() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12.0"),
            None,
            &mut Vec::new,
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/broken"), path("/b")],
            &probe(&[("/b", "3.12.0")]),
            &mut log,
        );
        assert_eq!(found, Some(path("/b")));
        assert_eq!(
            log.warnings(),
            vec!["Could not execute cmake at '/broken' to get version. Skipping."]
        );
    }

    #[test]
    fn test_not_found_error_enumerates_every_rejection() {
        let mut log = ConfigureLog::new();
        let found = find_cmake_path(
            Some("3.12"),
            None,
            &mut || vec![LocalPackage::new("/sdk/cmake/3.6.4111459", revision("3.6.4111459"))],
            &mut || panic!("downloader invoked"),
            &mut || vec![path("/a")],
            &probe(&[("/a", "3.13.2")]),
            &mut log,
        );
        assert_eq!(found, None);
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        let lines: Vec<&str> = errors[0].lines().collect();
        assert_eq!(
            lines,
            vec![
                "CMake '3.12' was not found in PATH or by cmake.dir property.",
                "- CMake '3.6.4111459' found in SDK did not satisfy requested version '3.12' because MINOR value 6 wasn't exactly 12.",
                "- CMake '3.13.2' found in PATH at '/a' did not satisfy requested version '3.12' because MINOR value 13 wasn't exactly 12.",
            ]
        );
    }

    #[test]
    fn test_mismatch_explanations_name_the_broken_field() {
        assert_eq!(
            explain_version_mismatch(&revision("4.0.0"), &revision("3.12.0")),
            "MAJOR value 3 wasn't exactly 4"
        );
        assert_eq!(
            explain_version_mismatch(&revision("3.12.2"), &revision("3.12.0")),
            "MICRO value 0 wasn't exactly 2"
        );
        assert_eq!(
            explain_version_mismatch(&revision("3.12.0-rc2"), &revision("3.12.0")),
            "RC value none wasn't exactly rc2"
        );
    }
}
