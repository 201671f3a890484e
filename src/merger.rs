//! The merge run.
//!
//! A run takes the queue of changed output paths and rebuilds the target
//! tree from it:
//!
//! 1. **Prepare**: the primary entry script must exist (otherwise
//!    [`MergeError::NotBuiltYet`]) and is patched into the bridge file.
//! 2. **Copy**: at or above the full-copy threshold the whole output tree is
//!    copied in one pass; below it each queued path is copied on its own, and
//!    a queued primary manifest first triggers a merge with the secondary
//!    manifest already in the target. The entry script and manifest are never
//!    copied; they are written separately.
//! 3. **Bridge**: the patched script (or the configured pre-built file) is
//!    written as the bridge output.
//! 4. **Overlay**: with a secondary tree configured, it is copied over the
//!    target, its entry script is chained behind a `require` of the bridge,
//!    and the primary manifest is merged with its manifest.
//!
//! Preparation touches nothing on disk, so a failed preparation leaves the
//! queue reusable.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MergeOptions;
use crate::error::MergeError;
use crate::manifest::merge_manifests;
use crate::patch::EntryScriptPatcher;
use crate::tree::{copy_path, write_atomic};

/// How the changed files reach the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyStrategy {
    /// One recursive copy of the whole output tree.
    FullTree,
    /// One copy per queued path.
    PerFile,
}

/// Where the bridge output came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeSource {
    /// Patched from the primary entry script.
    Patched,
    /// Copied verbatim from the configured file.
    Verbatim(PathBuf),
}

/// What the secondary-tree overlay did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OverlayReport {
    pub files_copied: usize,
    /// The secondary entry script was chained behind the bridge.
    pub entry_chained: bool,
    /// The manifests were merged into the final manifest.
    pub manifest_merged: bool,
}

/// Summary of one merge run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub strategy: CopyStrategy,
    pub queued: usize,
    pub files_copied: usize,
    /// The per-file pass merged the secondary manifest already in the target.
    pub manifest_merged: bool,
    pub bridge: BridgeSource,
    pub overlay: Option<OverlayReport>,
}

/// Bridge content ready to be written.
#[derive(Clone, Debug)]
pub enum PreparedBridge {
    Patched(String),
    Verbatim(PathBuf),
}

/// Runs merges for one set of [`MergeOptions`].
pub struct ArtifactMerger {
    options: MergeOptions,
    patcher: EntryScriptPatcher,
}

impl ArtifactMerger {
    #[must_use]
    pub fn new(options: MergeOptions) -> Self {
        let patcher = EntryScriptPatcher::new(&options.config.bridge);
        Self { options, patcher }
    }

    /// Replace the patcher, e.g. to add rewrite rules.
    #[must_use]
    pub fn with_patcher(mut self, patcher: EntryScriptPatcher) -> Self {
        self.patcher = patcher;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Strategy for a queue of `queued` notifications.
    #[must_use]
    pub const fn strategy_for(&self, queued: usize) -> CopyStrategy {
        if queued >= self.options.config.full_copy_threshold {
            CopyStrategy::FullTree
        } else {
            CopyStrategy::PerFile
        }
    }

    /// Prepare + apply in one go.
    ///
    /// # Errors
    /// Any [`MergeError`] from [`Self::prepare`] or [`Self::apply`].
    pub fn run(&self, queue: &[PathBuf]) -> Result<RunReport, MergeError> {
        let bridge = self.prepare()?;
        self.apply(bridge, queue)
    }

    /// Check the primary tree is built and produce the bridge content.
    ///
    /// # Errors
    /// [`MergeError::NotBuiltYet`] if the primary entry script is missing,
    /// [`MergeError::PatchFailure`] if it does not parse.
    pub fn prepare(&self) -> Result<PreparedBridge, MergeError> {
        let entry = self.options.config.primary_entry();
        if !entry.exists() {
            return Err(MergeError::NotBuiltYet { entry });
        }
        match &self.options.config.source_app {
            Some(fixed) => Ok(PreparedBridge::Verbatim(fixed.clone())),
            None => self.patcher.patch_file(&entry).map(PreparedBridge::Patched),
        }
    }

    /// Copy the queued changes, write the bridge and apply the overlay.
    ///
    /// # Errors
    /// [`MergeError::CopyFailure`], [`MergeError::ManifestParse`] or
    /// [`MergeError::Io`]; the run stops at the first one.
    pub fn apply(&self, bridge: PreparedBridge, queue: &[PathBuf]) -> Result<RunReport, MergeError> {
        self.apply_with(self.strategy_for(queue.len()), bridge, queue)
    }

    /// A full-tree run regardless of what changed.
    ///
    /// # Errors
    /// As [`Self::run`].
    pub fn run_full_tree(&self) -> Result<RunReport, MergeError> {
        let bridge = self.prepare()?;
        self.apply_with(CopyStrategy::FullTree, bridge, &[])
    }

    fn apply_with(
        &self,
        strategy: CopyStrategy,
        bridge: PreparedBridge,
        queue: &[PathBuf],
    ) -> Result<RunReport, MergeError> {
        let cfg = &self.options.config;
        info!(queued = queue.len(), ?strategy, "merge run");

        let (files_copied, manifest_merged) = match strategy {
            CopyStrategy::FullTree => (self.copy_full_tree()?, false),
            CopyStrategy::PerFile => self.copy_queued(queue)?,
        };

        let bridge_path = cfg.target.join(&cfg.files.bridge_output);
        let bridge = match bridge {
            PreparedBridge::Patched(text) => {
                write_atomic(&bridge_path, text.as_bytes())?;
                BridgeSource::Patched
            }
            PreparedBridge::Verbatim(fixed) => {
                copy_path(&fixed, &bridge_path, &|_, _| false)?;
                BridgeSource::Verbatim(fixed)
            }
        };
        debug!(path = %bridge_path.display(), "bridge written");

        let overlay = match &cfg.copy_dir {
            Some(dir) if dir.exists() => Some(self.overlay(dir)?),
            Some(dir) => {
                debug!(dir = %dir.display(), "secondary tree absent, overlay skipped");
                None
            }
            None => None,
        };

        Ok(RunReport {
            strategy,
            queued: queue.len(),
            files_copied,
            manifest_merged,
            bridge,
            overlay,
        })
    }

    /// The entry script and manifest are written separately, never copied.
    fn is_excluded(&self, src: &Path, dest: &Path) -> bool {
        let cfg = &self.options.config;
        src == cfg.primary_entry()
            || src == cfg.primary_manifest()
            || self.options.is_excluded(src, dest)
    }

    fn copy_full_tree(&self) -> Result<usize, MergeError> {
        let cfg = &self.options.config;
        copy_path(&cfg.output, &cfg.target, &|src, dest| self.is_excluded(src, dest))
    }

    fn copy_queued(&self, queue: &[PathBuf]) -> Result<(usize, bool), MergeError> {
        let cfg = &self.options.config;
        let primary_manifest = cfg.primary_manifest();
        let mut copied = 0;
        let mut manifest_merged = false;
        let mut manifest_seen = false;

        for src in queue {
            let Ok(rel) = src.strip_prefix(&cfg.output) else {
                warn!(path = %src.display(), "queued path outside output tree skipped");
                continue;
            };

            if !manifest_seen && *src == primary_manifest {
                manifest_seen = true;
                manifest_merged = self.merge_staged_manifest()?;
            }

            copied += copy_path(src, &cfg.target.join(rel), &|s, d| self.is_excluded(s, d))?;
        }
        Ok((copied, manifest_merged))
    }

    /// Merge the primary manifest with the secondary one already in the target.
    fn merge_staged_manifest(&self) -> Result<bool, MergeError> {
        let cfg = &self.options.config;
        let secondary = cfg.target.join(&cfg.files.secondary_manifest);
        let dest = cfg.target.join(&cfg.files.manifest);
        skip_missing(merge_manifests(&cfg.primary_manifest(), &secondary, &dest, None))
    }

    fn overlay(&self, dir: &Path) -> Result<OverlayReport, MergeError> {
        let cfg = &self.options.config;
        let files_copied = copy_path(dir, &cfg.target, &|_, _| false)?;
        info!(dir = %dir.display(), files_copied, "secondary tree overlaid");

        let entry = dir.join(&cfg.files.entry_script);
        let secondary_entry = match std::fs::read_to_string(&entry) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %entry.display(), "secondary entry script missing, chain skipped");
                return Ok(OverlayReport {
                    files_copied,
                    entry_chained: false,
                    manifest_merged: false,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(MergeError::PatchFailure {
                    path: entry,
                    detail: "not valid UTF-8".to_owned(),
                });
            }
            Err(e) => return Err(MergeError::Io(e)),
        };

        let chained = format!(
            "require(\"./{}\");\n{secondary_entry}",
            cfg.files.bridge_output
        );
        write_atomic(&cfg.target.join(&cfg.files.entry_script), chained.as_bytes())?;

        let manifest_merged = skip_missing(merge_manifests(
            &cfg.primary_manifest(),
            &dir.join(&cfg.files.manifest),
            &cfg.target.join(&cfg.files.manifest),
            self.options.filter_json(),
        ))?;

        Ok(OverlayReport {
            files_copied,
            entry_chained: true,
            manifest_merged,
        })
    }
}

/// Fold [`MergeError::ManifestMissing`] into "not merged".
fn skip_missing(result: Result<Value, MergeError>) -> Result<bool, MergeError> {
    match result {
        Ok(_) => Ok(true),
        Err(MergeError::ManifestMissing { path }) => {
            debug!(path = %path.display(), "no manifest to merge");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeConfig;

    fn merger(threshold: usize) -> ArtifactMerger {
        let cfg = MergeConfig {
            output: PathBuf::from("/p/dist"),
            target: PathBuf::from("/p/out"),
            full_copy_threshold: threshold,
            ..MergeConfig::default()
        };
        ArtifactMerger::new(MergeOptions::new(cfg).unwrap())
    }

    #[test]
    fn strategy_boundary() {
        let m = merger(5);
        assert_eq!(m.strategy_for(0), CopyStrategy::PerFile);
        assert_eq!(m.strategy_for(4), CopyStrategy::PerFile);
        assert_eq!(m.strategy_for(5), CopyStrategy::FullTree);
        assert_eq!(m.strategy_for(50), CopyStrategy::FullTree);
    }

    #[test]
    fn entry_and_manifest_never_copied() {
        let m = merger(5);
        let dest = Path::new("/p/out/x");
        assert!(m.is_excluded(Path::new("/p/dist/app.js"), dest));
        assert!(m.is_excluded(Path::new("/p/dist/app.json"), dest));
        assert!(!m.is_excluded(Path::new("/p/dist/pages/app.js"), dest));
    }

    #[test]
    fn prepare_without_entry_is_not_built_yet() {
        let m = merger(5);
        assert!(matches!(m.prepare(), Err(MergeError::NotBuiltYet { .. })));
    }

    #[test]
    fn report_serializes_kebab_case() {
        let report = RunReport {
            strategy: CopyStrategy::FullTree,
            queued: 7,
            files_copied: 12,
            manifest_merged: false,
            bridge: BridgeSource::Patched,
            overlay: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "full-tree");
        assert_eq!(json["bridge"], "patched");
    }
}
