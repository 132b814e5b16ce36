//! Installed package listings handed to the locators.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Revision, SdkError, SdkResult, SdkSourceProperties};

/// One installed SDK package: where it lives and which revision it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPackage {
    pub install_folder: PathBuf,
    pub revision: Revision,
}

impl LocalPackage {
    pub fn new(install_folder: impl Into<PathBuf>, revision: Revision) -> Self {
        Self {
            install_folder: install_folder.into(),
            revision,
        }
    }

    /// Qualify an install folder by the revision in its `source.properties`.
    pub fn from_install_folder(folder: &Path) -> SdkResult<Self> {
        let properties = SdkSourceProperties::from_install_folder(folder)?;
        let revision = properties
            .revision()
            .ok_or_else(|| SdkError::MissingRevision(folder.to_path_buf()))?;
        debug!("Qualified package at {} as {}", folder.display(), revision);
        Ok(Self {
            install_folder: folder.to_path_buf(),
            revision,
        })
    }
}
