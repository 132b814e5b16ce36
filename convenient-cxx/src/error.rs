//! Error and diagnostic code types shared across the configure engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the configure engine.
///
/// Cache and fingerprint corruption never escapes as an error; those degrade
/// to a miss or a hard configure. What does escape here is real I/O trouble
/// and whole-file format violations the caller asked about directly.
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} is not a valid C/C++ Build Metadata file", .0.display())]
    NotBuildMetadataFile(PathBuf),

    #[error("Fingerprint file {} is corrupt or has an unsupported version", .0.display())]
    CorruptFingerprint(PathBuf),

    #[error("Ninja build file syntax error on line {line}: {message}")]
    NinjaSyntax { line: usize, message: String },
}

pub type ConfigureResult<T> = Result<T, ConfigureError>;

/// Stable codes attached to diagnostics the host forwards to its own issue
/// reporter. The display form is the stable spelling; enum variants may be
/// renamed, the rendered codes may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// A user supplied version string did not parse.
    InvalidVersion,
    /// A 1- or 2-part version constraint matched more than one installed
    /// revision.
    VersionPrecision,
    /// ANDROID_NDK_HOME was used to resolve the NDK.
    NdkHomeIsDeprecated,
    /// No Ninja was found next to CMake, in the SDK, or on PATH.
    NinjaNotFound,
    /// An object file path had no `*.dir` ancestor to derive a target from.
    ObjectFileCantBeConvertedToTargetName,
    /// A clang command had no recognizable `-o <output>` argument.
    CouldNotExtractOutputFileFromClangCommand,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            DiagnosticCode::InvalidVersion => "INVALID_VERSION",
            DiagnosticCode::VersionPrecision => "VERSION_PRECISION",
            DiagnosticCode::NdkHomeIsDeprecated => "NDK_HOME_IS_DEPRECATED",
            DiagnosticCode::NinjaNotFound => "NINJA_NOT_FOUND",
            DiagnosticCode::ObjectFileCantBeConvertedToTargetName => {
                "OBJECT_FILE_CANT_BE_CONVERTED_TO_TARGET_NAME"
            }
            DiagnosticCode::CouldNotExtractOutputFileFromClangCommand => {
                "COULD_NOT_EXTRACT_OUTPUT_FILE_FROM_CLANG_COMMAND"
            }
        };
        write!(f, "{code}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_codes_render_stable_names() {
        assert_eq!(
            DiagnosticCode::ObjectFileCantBeConvertedToTargetName.to_string(),
            "OBJECT_FILE_CANT_BE_CONVERTED_TO_TARGET_NAME"
        );
        assert_eq!(
            DiagnosticCode::CouldNotExtractOutputFileFromClangCommand.to_string(),
            "COULD_NOT_EXTRACT_OUTPUT_FILE_FROM_CLANG_COMMAND"
        );
        assert_eq!(DiagnosticCode::NinjaNotFound.to_string(), "NINJA_NOT_FOUND");
    }

    #[test]
    fn test_metadata_error_message_suffix() {
        let error = ConfigureError::NotBuildMetadataFile(PathBuf::from("/tmp/bad.bin"));
        assert!(
            error
                .to_string()
                .ends_with("is not a valid C/C++ Build Metadata file")
        );
    }
}
