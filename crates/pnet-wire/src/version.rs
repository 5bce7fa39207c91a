use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

/// A packet definition version, `major.minor`. Minor versions within a
/// major are considered backward compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Version { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| DecodeError::MalformedVersion(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| DecodeError::MalformedVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| DecodeError::MalformedVersion(s.to_string()))?;
        Ok(Version { major, minor })
    }
}
