//! Output path normalization.
//!
//! A requested output location is advisory: if it does not already end with
//! the canonical extension of the target format, the extension is appended
//! (an unrelated extension is kept, not replaced).

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::TargetFormat;

/// Returns the output path carrying the canonical extension for `format`.
///
/// Pure string operation; never touches the filesystem.
pub fn normalized_path(path: &Path, format: TargetFormat) -> PathBuf {
    let extension = format.extension();
    if has_suffix(path, extension) {
        return path.to_path_buf();
    }

    let mut raw = OsString::from(path.as_os_str());
    raw.push(extension);
    PathBuf::from(raw)
}

/// Normalizes `path` for `format`, moving an existing file to the new name.
///
/// Callers that pre-create the output file (e.g. through a document picker)
/// get that file renamed rather than left behind under the old name.
pub fn normalize_output_path(path: &Path, format: TargetFormat) -> io::Result<PathBuf> {
    let normalized = normalized_path(path, format);
    if normalized != path && path.exists() {
        debug!(
            "Renaming output {} -> {}",
            path.display(),
            normalized.display()
        );
        std::fs::rename(path, &normalized)?;
    }
    Ok(normalized)
}

/// Whether writing `format` to `requested` would touch `input`.
///
/// Both the requested path (which [`normalize_output_path`] may rename) and
/// its normalized form are checked. Paths that exist are compared after
/// canonicalization, so `./song` and `song` are the same file.
pub fn would_overwrite(requested: &Path, format: TargetFormat, input: &Path) -> bool {
    let normalized = normalized_path(requested, format);
    let overwrites = [requested, normalized.as_path()]
        .into_iter()
        .any(|candidate| same_file(candidate, input));
    overwrites
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn has_suffix(path: &Path, extension: &str) -> bool {
    path.as_os_str()
        .as_encoded_bytes()
        .ends_with(extension.as_bytes())
}
