//! Settings errors.

use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors raised while loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read.
    #[error("failed to read settings at {path}: {reason}")]
    Read {
        /// File path.
        path: String,
        /// Error description.
        reason: String,
    },

    /// Settings file is not valid JSON.
    #[error("invalid settings JSON at {path}: {reason}")]
    Parse {
        /// File path.
        path: String,
        /// Error description.
        reason: String,
    },

    /// Home directory could not be resolved.
    #[error("could not resolve home directory")]
    NoHome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path() {
        let e = SettingsError::Parse {
            path: "/tmp/settings.json".into(),
            reason: "trailing comma".into(),
        };
        assert!(e.to_string().contains("/tmp/settings.json"));
        assert!(e.to_string().contains("trailing comma"));
    }
}
