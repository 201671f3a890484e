//! Change collection.
//!
//! The build tool reports one [`Notification`] per emitted asset. Markup,
//! manifest, style and misc assets are reported at their source location, so
//! the collector re-roots them under the output tree first. Only paths inside
//! the output tree are queued; the queue is drained by the merge run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Asset role as reported by the build tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Compiled script (`.js`), already reported at its output location.
    Script,
    /// Page markup (`.wxml`).
    Markup,
    /// JSON config (`.json`).
    Manifest,
    /// Stylesheet (`.wxss`).
    Style,
    /// Anything else the build tool copies through (`.wxs`, assets).
    Misc,
}

impl FileKind {
    /// Guess the kind from a mini-program file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js") => Self::Script,
            Some("wxml") => Self::Markup,
            Some("json") => Self::Manifest,
            Some("wxss") => Self::Style,
            _ => Self::Misc,
        }
    }

    /// Whether notifications of this kind carry a source-tree path.
    #[must_use]
    pub const fn reported_at_source(self) -> bool {
        !matches!(self, Self::Script)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script => write!(f, "script"),
            Self::Markup => write!(f, "markup"),
            Self::Manifest => write!(f, "manifest"),
            Self::Style => write!(f, "style"),
            Self::Misc => write!(f, "misc"),
        }
    }
}

/// Error parsing a [`FileKind`] name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFileKind(pub String);

impl fmt::Display for UnknownFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown file type '{}' (expected script, markup, manifest, style or misc)",
            self.0
        )
    }
}

impl std::error::Error for UnknownFileKind {}

impl FromStr for FileKind {
    type Err = UnknownFileKind;

    /// Accepts both role names and the mini-program extensions they stand for.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" | "js" => Ok(Self::Script),
            "markup" | "wxml" => Ok(Self::Markup),
            "manifest" | "json" => Ok(Self::Manifest),
            "style" | "wxss" => Ok(Self::Style),
            "misc" | "wxs" => Ok(Self::Misc),
            other => Err(UnknownFileKind(other.to_owned())),
        }
    }
}

/// One change reported by the build tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub file: PathBuf,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl Notification {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            file: file.into(),
            kind,
        }
    }
}

/// Accumulates changed output paths between merge runs.
#[derive(Clone, Debug)]
pub struct ChangeCollector {
    input: PathBuf,
    output: PathBuf,
    queue: Vec<PathBuf>,
}

impl ChangeCollector {
    #[must_use]
    pub const fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            queue: Vec::new(),
        }
    }

    /// Record `notification`, returning the queued output path, or `None` if
    /// the path falls outside the output tree and was dropped.
    pub fn record(&mut self, notification: &Notification) -> Option<&Path> {
        let path = self.resolve(notification);
        if !path.starts_with(&self.output) {
            trace!(path = %path.display(), "change outside output tree dropped");
            return None;
        }
        debug!(path = %path.display(), kind = %notification.kind, "change queued");
        self.queue.push(path);
        self.queue.last().map(PathBuf::as_path)
    }

    /// Map a notification to the output-tree path it stands for.
    ///
    /// Relative reports are resolved against the working directory first, the
    /// same way the configured trees are.
    #[must_use]
    pub fn resolve(&self, notification: &Notification) -> PathBuf {
        let file = std::path::absolute(&notification.file)
            .unwrap_or_else(|_| notification.file.clone());
        if !notification.kind.reported_at_source() {
            return file;
        }
        match file.strip_prefix(&self.input) {
            Ok(rel) => self.output.join(rel),
            Err(_) => file,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &[PathBuf] {
        &self.queue
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the queue, leaving it empty.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.queue)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
