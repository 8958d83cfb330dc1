use std::fmt;
use std::str::FromStr;

use ql_core::{codes, QuillError};

/// `major.minor.patch` save-format version. A missing patch component reads
/// as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, QuillError> {
        let invalid = || {
            QuillError::new(
                codes::SAVE_VERSION,
                format!("\"{}\" is not a major.minor.patch version.", raw),
            )
        };
        let parts = raw.trim().split('.').collect::<Vec<_>>();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|ch| ch.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    /// True when the two versions differ at most in the patch component.
    pub fn patch_compatible(&self, other: &SemVer) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl FromStr for SemVer {
    type Err = QuillError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
