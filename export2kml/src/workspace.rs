//! Temporary storage of overlay images produced during a job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Temporary directory holding the overlay images of one job run.
///
/// The directory and everything in it is deleted when the workspace is dropped, whether the job succeeds, fails
/// or is cancelled.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    archive_dir: String,
    used_names: HashSet<String>,
}

/// Location of an overlay image on disk and in the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSlot {
    /// Path of the image relative to the archive root, as referenced from the document.
    pub archive_path: String,
    /// Path of the temporary file.
    pub file: PathBuf,
}

impl Workspace {
    /// Creates a new temporary directory inside `parent`, or inside the system temporary directory if not set.
    pub fn new(parent: Option<&Path>, archive_dir: &str) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("export2kml-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        log::debug!("Created temporary directory {:?}", dir.path());

        Ok(Self {
            dir,
            archive_dir: archive_dir.trim_matches('/').to_string(),
            used_names: HashSet::new(),
        })
    }

    /// Path of the temporary directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserves a unique PNG file name derived from `base_name`.
    pub fn allocate(&mut self, base_name: &str) -> ImageSlot {
        let base = file_stem(base_name);
        let mut name = format!("{base}.png");
        let mut counter = 1;
        while self.used_names.contains(&name) {
            counter += 1;
            name = format!("{base}_{counter}.png");
        }
        self.used_names.insert(name.clone());

        let archive_path = if self.archive_dir.is_empty() {
            name.clone()
        } else {
            format!("{}/{name}", self.archive_dir)
        };

        ImageSlot {
            archive_path,
            file: self.dir.path().join(name),
        }
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        "raster".to_string()
    } else {
        stem
    }
}
