//! `source.properties` package descriptors.
//!
//! Every SDK, NDK and CMake package installed by the SDK manager carries a
//! `source.properties` file of `Key = Value` lines. Only a handful of keys
//! matter here, most importantly `Pkg.Revision`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Revision, SdkResult};

/// Well known `source.properties` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkSourceProperty {
    PkgDesc,
    PkgRevision,
}

impl SdkSourceProperty {
    pub fn key(self) -> &'static str {
        match self {
            SdkSourceProperty::PkgDesc => "Pkg.Desc",
            SdkSourceProperty::PkgRevision => "Pkg.Revision",
        }
    }
}

/// Parsed `source.properties` content. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkSourceProperties {
    properties: BTreeMap<String, String>,
}

impl SdkSourceProperties {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self { properties }
    }

    /// Read `source.properties` from the root of an installed package.
    pub fn from_install_folder(folder: &Path) -> SdkResult<Self> {
        Self::from_file(&folder.join("source.properties"))
    }

    pub fn from_file(path: &Path) -> SdkResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse `Key = Value` lines. Blank lines, `#` comments and lines with
    /// no `=` are skipped.
    pub fn parse(content: &str) -> Self {
        let mut properties = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                properties.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { properties }
    }

    pub fn get(&self, property: SdkSourceProperty) -> Option<&str> {
        self.properties.get(property.key()).map(String::as_str)
    }

    /// All properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// The package revision, when present and well formed.
    pub fn revision(&self) -> Option<Revision> {
        self.get(SdkSourceProperty::PkgRevision)
            .and_then(|value| Revision::parse(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ndk_descriptor() {
        let properties = SdkSourceProperties::parse(
            "Pkg.Desc = Android NDK\nPkg.Revision = 17.2.4988734\n",
        );
        assert_eq!(
            properties.get(SdkSourceProperty::PkgDesc),
            Some("Android NDK")
        );
        assert_eq!(
            properties.get(SdkSourceProperty::PkgRevision),
            Some("17.2.4988734")
        );
        assert_eq!(properties.revision(), Some(Revision::new(17, 2, 4988734)));
    }

    #[test]
    fn test_parse_skips_comments_and_noise() {
        let properties = SdkSourceProperties::parse(
            "# header comment\n\nPkg.Revision=3.6.4111459\nnot a property line\n",
        );
        assert_eq!(
            properties.get(SdkSourceProperty::PkgRevision),
            Some("3.6.4111459")
        );
        assert_eq!(properties.get(SdkSourceProperty::PkgDesc), None);
    }

    #[test]
    fn test_malformed_revision_is_none() {
        let properties = SdkSourceProperties::parse("Pkg.Revision = bob\n");
        assert_eq!(properties.get(SdkSourceProperty::PkgRevision), Some("bob"));
        assert_eq!(properties.revision(), None);
    }

    #[test]
    fn test_from_install_folder() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("source.properties"),
            "Pkg.Desc = CMake\nPkg.Revision = 3.10.2\n",
        )
        .unwrap();

        let properties = SdkSourceProperties::from_install_folder(temp.path()).unwrap();
        assert_eq!(properties.revision(), Some(Revision::new(3, 10, 2)));

        let missing = SdkSourceProperties::from_install_folder(&temp.path().join("nowhere"));
        assert!(missing.is_err());
    }
}
