//! Manifest merging on disk.
//!
//! [`merge_manifests`] reads the primary and secondary `app.json`, merges them
//! with [`deep_merge::merge`], lets an optional hook post-process the result
//! and writes it as 2-space pretty JSON.

pub mod deep_merge;

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ManifestHook;
use crate::error::MergeError;
use crate::tree::write_atomic;

/// Merge `primary` and `secondary` into `dest`, returning what was written.
///
/// When `hook` is supplied it is called with `(merged, primary, secondary)`;
/// a truthy return value replaces the merge, anything else keeps it.
///
/// # Errors
/// - [`MergeError::ManifestMissing`] if `secondary` does not exist (callers
///   treat this as nothing to merge).
/// - [`MergeError::ManifestParse`] if either file is not a JSON object.
/// - [`MergeError::Io`] if reading `primary` or writing `dest` fails.
pub fn merge_manifests(
    primary: &Path,
    secondary: &Path,
    dest: &Path,
    hook: Option<&ManifestHook>,
) -> Result<Value, MergeError> {
    if !secondary.exists() {
        return Err(MergeError::ManifestMissing {
            path: secondary.to_owned(),
        });
    }

    let primary_json = read_manifest(primary)?;
    let secondary_json = read_manifest(secondary)?;

    let merged = Value::Object(deep_merge::merge(&primary_json, &secondary_json));
    let merged = match hook {
        Some(hook) => {
            let primary_value = Value::Object(primary_json);
            let secondary_value = Value::Object(secondary_json);
            match hook(&merged, &primary_value, &secondary_value) {
                Some(replacement) if is_truthy(&replacement) => {
                    debug!(dest = %dest.display(), "manifest replaced by hook");
                    replacement
                }
                _ => merged,
            }
        }
        None => merged,
    };

    write_manifest(dest, &merged)?;
    Ok(merged)
}

/// Read a manifest and require a top-level JSON object.
///
/// # Errors
/// [`MergeError::Io`] on read failure, [`MergeError::ManifestParse`] on
/// malformed JSON or a non-object top level.
pub fn read_manifest(path: &Path) -> Result<Map<String, Value>, MergeError> {
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(MergeError::ManifestParse {
            path: path.to_owned(),
            detail: format!("top-level value is {}, expected an object", kind_of(&other)),
        }),
        Err(e) => Err(MergeError::ManifestParse {
            path: path.to_owned(),
            detail: e.to_string(),
        }),
    }
}

/// Write `manifest` as pretty JSON (2-space indent), replacing `dest`.
///
/// # Errors
/// Returns [`MergeError::Io`] on write failure.
pub fn write_manifest(dest: &Path, manifest: &Value) -> Result<(), MergeError> {
    let text = serde_json::to_string_pretty(manifest)
        .map_err(|e| MergeError::Io(std::io::Error::other(e)))?;
    write_atomic(dest, text.as_bytes())?;
    Ok(())
}

/// JavaScript truthiness, which the hook contract is phrased in.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
