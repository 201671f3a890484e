//! Entry-script patching.
//!
//! [`EntryScriptPatcher::patch`] turns the primary tree's compiled entry script
//! into the bridge file: the original text with every call to the host's
//! registration function renamed to the bridge entry point, prefixed with the
//! prelude from [`bridge::prelude`].

pub mod bridge;
pub mod rewrite;

use std::path::Path;

use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::MergeError;
use rewrite::{RewriteError, RewriteRule, rewrite_calls};

/// Builds the bridge file from a compiled entry script.
#[derive(Clone, Debug)]
pub struct EntryScriptPatcher {
    prelude: String,
    rules: Vec<RewriteRule>,
}

impl EntryScriptPatcher {
    /// A patcher renaming `registration(...)` calls to `entry_point(...)`.
    #[must_use]
    pub fn new(bridge: &BridgeConfig) -> Self {
        Self {
            prelude: bridge::prelude(bridge),
            rules: vec![RewriteRule::new(
                bridge.registration.clone(),
                bridge.entry_point.clone(),
            )],
        }
    }

    /// Add another call-site rename.
    #[must_use]
    pub fn with_rule(mut self, rule: RewriteRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Patch entry-script text.
    ///
    /// # Errors
    /// Returns [`RewriteError`] if the script has syntax errors; nothing is
    /// produced in that case.
    pub fn patch(&self, source: &str) -> Result<String, RewriteError> {
        let rewritten = rewrite_calls(source, &self.rules)?;
        debug!(renamed = rewritten.renamed, "entry script call sites renamed");

        let mut out = String::with_capacity(self.prelude.len() + rewritten.source.len());
        out.push_str(&self.prelude);
        out.push_str(&rewritten.source);
        Ok(out)
    }

    /// Read and patch the entry script at `path`.
    ///
    /// # Errors
    /// [`MergeError::NotBuiltYet`] if `path` does not exist,
    /// [`MergeError::PatchFailure`] if it is unreadable as UTF-8 or does not
    /// parse, [`MergeError::Io`] for other read failures.
    pub fn patch_file(&self, path: &Path) -> Result<String, MergeError> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MergeError::NotBuiltYet {
                    entry: path.to_owned(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(MergeError::PatchFailure {
                    path: path.to_owned(),
                    detail: "not valid UTF-8".to_owned(),
                });
            }
            Err(e) => return Err(MergeError::Io(e)),
        };
        self.patch(&source).map_err(|e| MergeError::PatchFailure {
            path: path.to_owned(),
            detail: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
