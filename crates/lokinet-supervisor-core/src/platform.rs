//! Host platform identification.
//!
//! Exactly one backend family is selected per build; it is never switched
//! at runtime.

use serde::{Deserialize, Serialize};

/// Process model families a backend can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// fork/exec with SIGTERM/SIGKILL.
    Posix,
    /// CreateProcess with close requests and TerminateProcess.
    Windows,
    /// In-memory backend used by tests.
    Simulated,
}

impl Platform {
    /// Returns true if graceful stop is delivered as a Unix signal.
    #[must_use]
    pub const fn uses_signals(&self) -> bool {
        matches!(self, Self::Posix)
    }

    /// Returns the platform name as a static string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returns the process model of the host this crate was built for.
#[must_use]
pub const fn detect_platform() -> Platform {
    if cfg!(windows) {
        Platform::Windows
    } else {
        Platform::Posix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::Posix.to_string(), "posix");
        assert_eq!(Platform::Windows.to_string(), "windows");
        assert_eq!(Platform::Simulated.name(), "simulated");
    }

    #[test]
    fn test_uses_signals() {
        assert!(Platform::Posix.uses_signals());
        assert!(!Platform::Windows.uses_signals());
    }

    #[test]
    fn test_detect_platform_matches_cfg() {
        let platform = detect_platform();
        if cfg!(windows) {
            assert_eq!(platform, Platform::Windows);
        } else {
            assert_eq!(platform, Platform::Posix);
        }
    }
}
