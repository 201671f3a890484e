//! miniapp-merge library crate.
//!
//! Merges two compiled mini-program output trees into one deployable tree.
//! The primary tree's entry script is patched so a second framework's
//! registration can chain into the first one's lifecycle handlers, and the two
//! app manifests are deep-merged.
//!
//! The `miniapp-merge` binary wraps [`session::MergeSession`]; everything is
//! exposed here so hosts can embed the session directly.

pub mod collect;
pub mod config;
pub mod debounce;
pub mod error;
pub mod manifest;
pub mod merger;
pub mod patch;
pub mod session;
pub mod telemetry;
pub mod tree;

pub use collect::{FileKind, Notification};
pub use config::{MergeConfig, MergeOptions};
pub use error::MergeError;
pub use merger::{ArtifactMerger, CopyStrategy, RunReport};
pub use session::MergeSession;
