//! scanner.rs
//!
//! Recursively walks a knowledge-base directory and yields every entry,
//! directories included, as a `FileCandidate`.
//!
//! Nothing is filtered here: hidden files, `.git` and ignore files are all
//! reported so the selector (and the run counters) see the whole tree.
//! Siblings are visited in file-name order so runs are reproducible.

use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("knowledge base root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// One visited filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl From<DirEntry> for FileCandidate {
    fn from(entry: DirEntry) -> Self {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        Self {
            path: entry.into_path(),
            is_dir,
        }
    }
}

/// Depth-first iterator over `root` (the root itself comes first).
/// Entries that cannot be read are logged and left out.
pub fn walk(root: &Path) -> Result<impl Iterator<Item = FileCandidate>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    Ok(skip_unreadable(walker).map(FileCandidate::from))
}

fn skip_unreadable<T>(
    results: impl Iterator<Item = Result<T, ignore::Error>>,
) -> impl Iterator<Item = T> {
    results.filter_map(|result| match result {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!("[walk] skipping unreadable entry: {err}");
            None
        }
    })
}
