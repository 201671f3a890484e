//! Error types for a merge run.
//!
//! Defines [`MergeError`], the unified error type for everything a merge run
//! can hit: the primary tree not being built yet, manifests that are missing or
//! malformed, filesystem copy failures and entry scripts that cannot be parsed.
//!
//! Two variants are recoverable ([`MergeError::is_recoverable`]): the session
//! re-arms on [`MergeError::NotBuiltYet`] and skips the manifest step on
//! [`MergeError::ManifestMissing`]. Everything else aborts the current run.

use std::fmt;
use std::path::PathBuf;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// Unified error type for merge runs.
#[derive(Debug)]
pub enum MergeError {
    /// The primary tree's entry script does not exist yet.
    NotBuiltYet {
        /// Expected location of the entry script.
        entry: PathBuf,
    },

    /// The secondary manifest is absent, so there is nothing to merge.
    ManifestMissing {
        /// Expected location of the manifest.
        path: PathBuf,
    },

    /// A manifest exists but is not well-formed JSON.
    ManifestParse {
        /// The offending manifest.
        path: PathBuf,
        /// Parser message, with line and column.
        detail: String,
    },

    /// A filesystem copy failed.
    CopyFailure {
        /// Copy source.
        from: PathBuf,
        /// Copy destination.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The entry script could not be parsed or rewritten.
    PatchFailure {
        /// The entry script being patched.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// The configuration is invalid.
    Config(ConfigError),

    /// Any other I/O error (reading inputs, writing outputs).
    Io(std::io::Error),
}

impl MergeError {
    /// Whether the session may continue without surfacing this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotBuiltYet { .. } | Self::ManifestMissing { .. })
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotBuiltYet { entry } => {
                write!(
                    f,
                    "entry script '{}' does not exist yet.\n  To fix: wait for the primary build to finish; the merge retries automatically.",
                    entry.display()
                )
            }
            Self::ManifestMissing { path } => {
                write!(
                    f,
                    "manifest '{}' not found; nothing to merge.\n  To fix: build the secondary project so it emits its manifest.",
                    path.display()
                )
            }
            Self::ManifestParse { path, detail } => {
                write!(
                    f,
                    "manifest '{}' is not valid JSON: {detail}\n  To fix: correct the manifest and save it again to trigger a new merge.",
                    path.display()
                )
            }
            Self::CopyFailure { from, to, source } => {
                write!(
                    f,
                    "failed to copy '{}' to '{}': {source}\n  To fix: check file permissions and disk space.",
                    from.display(),
                    to.display()
                )
            }
            Self::PatchFailure { path, detail } => {
                write!(
                    f,
                    "failed to patch entry script '{}': {detail}\n  To fix: check that the primary build emitted a complete script.",
                    path.display()
                )
            }
            Self::Config(err) => {
                write!(
                    f,
                    "configuration error: {err}\n  To fix: edit the config file and correct the issue."
                )
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CopyFailure { source, .. } => Some(source),
            Self::Config(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConfigError> for MergeError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
