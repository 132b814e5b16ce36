//! Revision values for SDK, NDK and CMake packages.
//!
//! A revision is up to three dotted numeric parts with an optional `rcN`
//! preview suffix: "18.1.23456", "3.12.0-rc1", "21.0.0 rc2". Parsing keeps
//! the number of parts that were actually written so that short forms like
//! "18.1" can act as prefix constraints against fully specified installed
//! versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::{SdkError, SdkResult};

static REVISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:[ -]*rc([0-9]+))?$").unwrap()
});

/// A parsed package revision.
///
/// Unwritten parts default to zero for comparison but the written part
/// count is remembered, so "3.12" still displays and constrains as a two
/// part value.
#[derive(Debug, Clone, Copy)]
pub struct Revision {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    /// `rcN` preview number. `None` is a production release and outranks
    /// every preview of the same numeric version.
    pub preview: Option<u32>,
    precision: u8,
}

impl Revision {
    /// A fully specified three part production revision.
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            preview: None,
            precision: 3,
        }
    }

    /// The same revision marked as preview `rcN`.
    pub fn with_preview(mut self, rc: u32) -> Self {
        self.preview = Some(rc);
        self
    }

    /// Parse `major[.minor[.micro]][ rcN | -rcN]`.
    pub fn parse(text: &str) -> SdkResult<Self> {
        let invalid = || SdkError::InvalidRevision(text.to_string());
        let captures = REVISION_PATTERN.captures(text.trim()).ok_or_else(invalid)?;
        let part = |index: usize| -> SdkResult<Option<u32>> {
            captures
                .get(index)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| invalid()))
                .transpose()
        };

        let major = part(1)?.ok_or_else(invalid)?;
        let minor = part(2)?;
        let micro = part(3)?;
        let preview = part(4)?;
        let precision = 1 + u8::from(minor.is_some()) + u8::from(micro.is_some());

        Ok(Self {
            major,
            minor: minor.unwrap_or(0),
            micro: micro.unwrap_or(0),
            preview,
            precision,
        })
    }

    /// How many dotted parts were written (1 to 3).
    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Whether `candidate` satisfies this value read as a version
    /// constraint. Only the parts that were actually written participate:
    /// "18.1" accepts any 18.1.* revision. A constraint carrying an `rcN`
    /// requires exactly that preview; one without accepts previews and
    /// production releases alike.
    pub fn accepts(&self, candidate: &Revision) -> bool {
        if self.major != candidate.major {
            return false;
        }
        if self.precision >= 2 && self.minor != candidate.minor {
            return false;
        }
        if self.precision >= 3 && self.micro != candidate.micro {
            return false;
        }
        match self.preview {
            Some(rc) => candidate.preview == Some(rc),
            None => true,
        }
    }
}

/// Equality is over the numeric value: "3.12" and "3.12.0" are equal.
impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.micro == other.micro
            && self.preview == other.preview
    }
}

impl Eq for Revision {}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| match (self.preview, other.preview) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(&b),
            })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if self.precision >= 2 {
            write!(f, ".{}", self.minor)?;
        }
        if self.precision >= 3 {
            write!(f, ".{}", self.micro)?;
        }
        if let Some(rc) = self.preview {
            write!(f, "-rc{rc}")?;
        }
        Ok(())
    }
}

impl FromStr for Revision {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
