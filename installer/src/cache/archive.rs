//! `.tar.zst` archives of directory trees.
//!
//! Entries are stored relative to an extraction root (`/` in production),
//! so an archive of `/opt/local` holds `opt/local/...`. Extraction rejects
//! entries that climb out of the root, directly or through a symlinked
//! directory, or that fall outside the requested paths.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::path::{Component, Path};

/// Errors arising from archive creation or extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// I/O error while reading or writing.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the root.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry path.
        path: String,
    },

    /// An entry is not beneath any of the cached paths.
    #[error("archive entry {path} is outside the cached paths")]
    UnexpectedEntry {
        /// The offending entry path.
        path: String,
    },

    /// A cached path is not beneath the extraction root.
    #[error("{path} is not inside {root}")]
    OutsideRoot {
        /// The cached path.
        path: Utf8PathBuf,
        /// The extraction root.
        root: Utf8PathBuf,
    },

    /// None of the requested paths exist.
    #[error("none of the cached paths exist")]
    NothingToArchive,
}

/// Archive every existing path in `paths` into `dest`.
///
/// Symlinks are stored as links. Returns the number of paths archived.
///
/// # Errors
///
/// Fails when a path lies outside `root`, when none exist, or on I/O
/// errors.
pub fn create_archive(
    dest: &Utf8Path,
    root: &Utf8Path,
    paths: &[Utf8PathBuf],
) -> Result<usize, ArchiveError> {
    let file = std::fs::File::create(dest)?;
    let encoder = zstd::Encoder::new(file, 0)?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut archived = 0;
    for path in paths {
        let name = relative_name(root, path)?;
        if path.is_dir() {
            builder.append_dir_all(name, path)?;
        } else if path.is_file() {
            builder.append_path_with_name(path, name)?;
        } else {
            debug!("skipping missing cache path {path}");
            continue;
        }
        archived += 1;
    }
    if archived == 0 {
        return Err(ArchiveError::NothingToArchive);
    }

    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()?;
    Ok(archived)
}

/// Extract `archive` beneath `root`, accepting only entries under `paths`.
///
/// Returns the number of entries extracted.
///
/// # Errors
///
/// Fails on traversal attempts, unexpected entries, or I/O errors.
pub fn extract_archive(
    archive: &Utf8Path,
    root: &Utf8Path,
    paths: &[Utf8PathBuf],
) -> Result<usize, ArchiveError> {
    let allowed = paths
        .iter()
        .map(|path| relative_name(root, path))
        .collect::<Result<Vec<_>, _>>()?;

    let file = std::fs::File::open(archive)?;
    let decoder = zstd::Decoder::new(file)?;
    let mut reader = tar::Archive::new(decoder);
    reader.set_preserve_permissions(true);
    reader.set_overwrite(true);

    let mut extracted = 0;
    for entry_result in reader.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();

        validate_entry_path(&entry_path)?;
        if !allowed.iter().any(|name| entry_path.starts_with(name)) {
            return Err(ArchiveError::UnexpectedEntry {
                path: entry_path.display().to_string(),
            });
        }

        // Refuses entries whose parent resolves outside `root`, including
        // through a symlinked directory unpacked earlier.
        if !entry.unpack_in(root.as_std_path())? {
            return Err(ArchiveError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
        extracted += 1;
    }
    Ok(extracted)
}

fn relative_name<'a>(root: &Utf8Path, path: &'a Utf8Path) -> Result<&'a Utf8Path, ArchiveError> {
    match path.strip_prefix(root) {
        Ok(name) if !name.as_str().is_empty() => Ok(name),
        _ => Err(ArchiveError::OutsideRoot {
            path: path.to_owned(),
            root: root.to_owned(),
        }),
    }
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ArchiveError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
    if escapes {
        return Err(ArchiveError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
