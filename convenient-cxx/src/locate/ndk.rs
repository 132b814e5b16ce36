//! NDK resolution.
//!
//! Precedence: the `ndk.dir` property, then the deprecated
//! `ANDROID_NDK_HOME` environment variable, then the SDK's `ndk-bundle`
//! folder, then the side-by-side folders under `$sdk/ndk/<version>`.
//! Locations are qualified by the `Pkg.Revision` in their
//! `source.properties`, and every location considered leaves an info line
//! explaining how it fared. A 1- or 2-part DSL version matches installed
//! revisions by prefix; matching more than one flags insufficient
//! precision and picks the highest.

use std::path::{Path, PathBuf};

use convenient_sdk::{Revision, SdkSourceProperties};

use crate::error::DiagnosticCode;
use crate::logging::ConfigureLog;

/// One qualified install location and how it was reached.
struct NdkCandidate {
    folder: PathBuf,
    revision: Revision,
    via_environment: bool,
}

/// Locate an NDK installation.
///
/// `source_properties` reads a location's `source.properties`, returning
/// `None` when the location or the file does not exist.
/// `side_by_side_folder_names` lists the entries of `$sdk/ndk` and is only
/// queried when `ndk.dir` doesn't short-circuit the search.
///
/// An `ndk.dir` that qualifies is returned even when it mismatches the DSL
/// version; the mismatch is recorded as an error for the host to surface.
/// An `ndk.dir` that cannot be qualified leaves its info line and the
/// search continues with the remaining locations.
pub fn find_ndk_path(
    version_from_dsl: Option<&str>,
    ndk_dir: Option<&Path>,
    android_ndk_home: Option<&Path>,
    sdk_folder: Option<&Path>,
    side_by_side_folder_names: &mut dyn FnMut(&Path) -> Vec<String>,
    source_properties: &dyn Fn(&Path) -> Option<SdkSourceProperties>,
    log: &mut ConfigureLog,
) -> Option<PathBuf> {
    let requested = match version_from_dsl.map(str::trim) {
        None => None,
        Some(text) => match Revision::parse(text) {
            Ok(version) => Some(version),
            Err(_) => {
                log.error_with(
                    DiagnosticCode::InvalidVersion,
                    format!("Requested NDK version '{text}' could not be parsed"),
                );
                None
            }
        },
    };

    if let Some(ndk_dir) = ndk_dir
        && let Some(found) = qualify(ndk_dir, "ndk.dir", source_properties, log)
    {
        if let Some(requested) = &requested
            && !requested.accepts(&found)
        {
            log.error(format!(
                "Requested NDK version {requested} did not match the version {found} requested by ndk.dir at {}",
                ndk_dir.display()
            ));
        }
        return Some(ndk_dir.to_path_buf());
    }

    let mut candidates: Vec<NdkCandidate> = Vec::new();
    if let Some(home) = android_ndk_home
        && let Some(revision) = qualify(home, "ANDROID_NDK_HOME", source_properties, log)
    {
        candidates.push(NdkCandidate {
            folder: home.to_path_buf(),
            revision,
            via_environment: true,
        });
    }
    if let Some(sdk_folder) = sdk_folder {
        let bundle = sdk_folder.join("ndk-bundle");
        if let Some(revision) = qualify(&bundle, "ndk-bundle folder", source_properties, log) {
            candidates.push(NdkCandidate {
                folder: bundle,
                revision,
                via_environment: false,
            });
        }
        for name in side_by_side_folder_names(sdk_folder) {
            let folder = sdk_folder.join("ndk").join(&name);
            if let Some(revision) =
                qualify(&folder, "side by side NDK folder", source_properties, log)
            {
                candidates.push(NdkCandidate {
                    folder,
                    revision,
                    via_environment: false,
                });
            }
        }
    }

    let chosen = match &requested {
        Some(requested) => {
            let matching: Vec<&NdkCandidate> = candidates
                .iter()
                .filter(|candidate| requested.accepts(&candidate.revision))
                .collect();
            let chosen = highest(&matching);
            if let Some(chosen) = chosen
                && matching.len() > 1
            {
                if requested.precision() < 3 {
                    log.warn_with(
                        DiagnosticCode::VersionPrecision,
                        format!(
                            "Requested NDK version '{requested}' does not have enough precision, it matched {} installed folders",
                            matching.len()
                        ),
                    );
                }
                log.info(format!(
                    "Found {} NDK folders that matched requested version {requested}, choosing {}",
                    matching.len(),
                    chosen.folder.display()
                ));
            }
            chosen
        }
        None => {
            let all: Vec<&NdkCandidate> = candidates.iter().collect();
            let chosen = highest(&all);
            if let Some(chosen) = chosen {
                log.info(format!(
                    "No user requested version, choosing {} which is version {}",
                    chosen.folder.display(),
                    chosen.revision
                ));
            }
            chosen
        }
    };

    let Some(chosen) = chosen else {
        log.error(not_found_message(requested.as_ref()));
        return None;
    };
    if chosen.via_environment {
        log.warn_with(
            DiagnosticCode::NdkHomeIsDeprecated,
            "Support for ANDROID_NDK_HOME is deprecated and will be removed in the future. \
             Use android.ndkVersion in build.gradle instead.",
        );
    }
    Some(chosen.folder.clone())
}

/// Read a location's revision, leaving an info line when it can't qualify.
fn qualify(
    folder: &Path,
    tag: &str,
    source_properties: &dyn Fn(&Path) -> Option<SdkSourceProperties>,
    log: &mut ConfigureLog,
) -> Option<Revision> {
    let Some(properties) = source_properties(folder) else {
        log.info(format!(
            "Considered {} by {tag} but that location didn't exist",
            folder.display()
        ));
        return None;
    };
    let Some(text) = properties.get(convenient_sdk::SdkSourceProperty::PkgRevision) else {
        log.info(format!(
            "Considered {} by {tag} but it had source.properties with no Pkg.Revision",
            folder.display()
        ));
        return None;
    };
    match Revision::parse(text) {
        Ok(revision) => Some(revision),
        Err(_) => {
            log.info(format!(
                "Considered {} by {tag} but it had invalid Pkg.Revision={text}",
                folder.display()
            ));
            None
        }
    }
}

/// Highest revision wins; equal revisions keep the earlier candidate.
fn highest<'a>(candidates: &[&'a NdkCandidate]) -> Option<&'a NdkCandidate> {
    let mut best: Option<&NdkCandidate> = None;
    for &candidate in candidates {
        match best {
            None => best = Some(candidate),
            Some(current) if candidate.revision > current.revision => best = Some(candidate),
            Some(_) => {}
        }
    }
    best
}

fn not_found_message(requested: Option<&Revision>) -> String {
    match requested {
        Some(requested) => {
            format!("Compatible side by side NDK version was not found for: {requested}")
        }
        None => "Compatible side by side NDK version was not found.".to_string(),
    }
}
