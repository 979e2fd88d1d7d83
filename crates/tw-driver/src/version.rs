//! Solver release numbers.

use crate::error::{DriverError, DriverResult};
use std::fmt;

/// Release as `major.minor`, e.g. 24.2 for "24.2.0" or "v242".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SolverVersion {
    pub major: u32,
    pub minor: u32,
}

impl SolverVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(text: &str) -> DriverResult<Self> {
        let trimmed = text.trim().trim_start_matches(['v', 'V']);
        let invalid = || DriverError::Version(text.to_string());
        if trimmed.contains('.') {
            let mut parts = trimmed.split('.');
            let major = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?;
            let minor = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?;
            return Ok(Self { major, minor });
        }
        // compact form: 242 -> 24.2
        let code: u32 = trimmed.parse().map_err(|_| invalid())?;
        if code < 100 {
            return Err(invalid());
        }
        Ok(Self {
            major: code / 10,
            minor: code % 10,
        })
    }

    /// Compact code, 242 for 24.2.
    pub fn code(&self) -> u32 {
        self.major * 10 + self.minor
    }

    /// Environment variable holding the installation root of this release.
    pub fn awp_root_var(&self) -> String {
        format!("AWP_ROOT{}", self.code())
    }
}

impl fmt::Display for SolverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(SolverVersion::parse("24.2.0").unwrap(), SolverVersion::new(24, 2));
        assert_eq!(SolverVersion::parse("v231").unwrap(), SolverVersion::new(23, 1));
        assert_eq!(SolverVersion::parse("251").unwrap().code(), 251);
        assert!(SolverVersion::parse("abc").is_err());
        assert!(SolverVersion::parse("24").is_err());
    }

    #[test]
    fn ordering_follows_release() {
        assert!(SolverVersion::new(23, 2) < SolverVersion::new(24, 1));
        assert_eq!(SolverVersion::new(24, 2).awp_root_var(), "AWP_ROOT242");
    }
}
