//! Filesystem primitives for building the merged tree.
//!
//! Plain recursive copies over `std::fs` (no `CoW`, no external tools) plus an
//! atomic file writer. Every copy takes an exclusion predicate with the
//! `(source, destination) -> excluded` shape; an excluded directory skips its
//! whole subtree.

use std::io::Write as _;
use std::path::Path;

use crate::error::MergeError;

/// Recursively copy `src` onto `dest`, overwriting files that already exist.
///
/// `src` may be a file or a directory. Returns the number of files copied.
///
/// # Errors
/// Returns [`MergeError::CopyFailure`] for the first entry that cannot be
/// read, created or copied.
pub fn copy_path(
    src: &Path,
    dest: &Path,
    exclude: &dyn Fn(&Path, &Path) -> bool,
) -> Result<usize, MergeError> {
    if exclude(src, dest) {
        return Ok(0);
    }
    let meta = std::fs::metadata(src).map_err(|e| copy_failure(src, dest, e))?;
    if meta.is_dir() {
        copy_dir(src, dest, exclude)
    } else {
        copy_file(src, dest)?;
        Ok(1)
    }
}

fn copy_dir(
    src: &Path,
    dest: &Path,
    exclude: &dyn Fn(&Path, &Path) -> bool,
) -> Result<usize, MergeError> {
    std::fs::create_dir_all(dest).map_err(|e| copy_failure(src, dest, e))?;
    let entries = std::fs::read_dir(src).map_err(|e| copy_failure(src, dest, e))?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| copy_failure(src, dest, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        copied += copy_path(&from, &to, exclude)?;
    }
    Ok(copied)
}

fn copy_file(src: &Path, dest: &Path) -> Result<(), MergeError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| copy_failure(src, dest, e))?;
    }
    std::fs::copy(src, dest).map_err(|e| copy_failure(src, dest, e))?;
    Ok(())
}

fn copy_failure(from: &Path, to: &Path, source: std::io::Error) -> MergeError {
    MergeError::CopyFailure {
        from: from.to_owned(),
        to: to.to_owned(),
        source,
    }
}

/// Write `contents` to `path` atomically.
///
/// Writes a temporary file in the destination directory, fsyncs it and renames
/// it over `path`. Missing parent directories are created. A failed write
/// leaves any previous file untouched.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
