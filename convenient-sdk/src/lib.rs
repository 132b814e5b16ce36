//! SDK and NDK package metadata.
//!
//! Shared building blocks for locating Android native toolchains:
//! - **Revision**: version values with preview (`rcN`) support and the
//!   prefix-constraint matching the locators need
//! - **SdkSourceProperties**: `source.properties` package descriptors
//! - **LocalPackage**: the installed-package listing shape handed to the
//!   locator functions in `convenient-cxx`

use std::path::PathBuf;

use thiserror::Error;

pub mod package;
pub mod revision;
pub mod source_properties;

pub use package::LocalPackage;
pub use revision::Revision;
pub use source_properties::{SdkSourceProperties, SdkSourceProperty};

/// Errors produced while reading package metadata.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("No Pkg.Revision in source.properties at {}", .0.display())]
    MissingRevision(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
