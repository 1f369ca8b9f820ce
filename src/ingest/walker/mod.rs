
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::IngestConfig;

/// Decides which directories are walked and which files are ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    suffixes: Vec<String>,
    skip_dirs: Vec<String>,
}

impl FileFilter {
    #[inline]
    pub fn new<E, D>(extensions: E, skip_dirs: D) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            suffixes: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .map(|ext| format!(".{ext}"))
                .collect(),
            skip_dirs: skip_dirs
                .into_iter()
                .map(|dir| dir.as_ref().to_string())
                .collect(),
        }
    }

    #[inline]
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(&config.extensions, &config.skip_dirs)
    }

    /// Whether a file name ends with `.<ext>` for an allowed extension
    #[inline]
    pub fn is_eligible(&self, file_name: &str) -> bool {
        self.suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }

    #[inline]
    pub fn is_skipped_dir(&self, dir_name: &str) -> bool {
        self.skip_dirs.iter().any(|skip| skip == dir_name)
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let skipped = entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.is_skipped_dir(name));
        if skipped {
            debug!("Skipping directory {}", entry.path().display());
        }
        !skipped
    }
}

/// Every eligible file under `root`, in sorted walk order.
///
/// Symlinks are not followed. Entries that cannot be read are logged and
/// left out.
#[inline]
pub fn collect_files(root: &Path, filter: &FileFilter) -> Vec<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| filter.keep_entry(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| filter.is_eligible(name))
        })
        .map(DirEntry::into_path)
        .collect();

    debug!("Found {} eligible files under {}", files.len(), root.display());
    files
}
