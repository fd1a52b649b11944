//
// storage.rs
// Dicom-Deid-rs
//
// Output layout on disk: working copies under a temporary id, renamed to their scan code once linked.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{DeidError, Result};

/// Target root for anonymized folders plus the optional parallel raster root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    raster_root: Option<PathBuf>,
}

impl OutputLayout {
    /// Creates the roots eagerly. The raster root is the target root's path with `suffix` appended.
    pub fn new(root: impl AsRef<Path>, raster_suffix: Option<&str>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let raster_root = match raster_suffix {
            Some(suffix) => {
                let mut name = root.as_os_str().to_owned();
                name.push(suffix);
                let raster_root = PathBuf::from(name);
                fs::create_dir_all(&raster_root)?;
                Some(raster_root)
            }
            None => None,
        };

        Ok(Self { root, raster_root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raster_root(&self) -> Option<&Path> {
        self.raster_root.as_deref()
    }
}

/// A scrubbed copy of one source folder, still under its temporary id.
#[derive(Debug)]
pub struct WorkingCopy {
    pub id: String,
    pub dicom_dir: PathBuf,
    pub raster_dir: Option<PathBuf>,
}

/// Where a working copy ended up after renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalPaths {
    pub dicom_dir: PathBuf,
    pub raster_dir: Option<PathBuf>,
}

impl WorkingCopy {
    /// Copies `source` into the layout under a fresh working id and makes every file writable.
    pub fn create(source: &Path, layout: &OutputLayout) -> Result<Self> {
        let folder_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = working_id(&folder_name);

        let dicom_dir = layout.root.join(&id);
        let copied = copy_tree(source, &dicom_dir)?;
        make_writable(&dicom_dir)?;

        let raster_dir = match &layout.raster_root {
            Some(root) => {
                let dir = root.join(&id);
                fs::create_dir_all(&dir)?;
                Some(dir)
            }
            None => None,
        };

        info!(folder = %folder_name, working_id = %id, files = copied, "working copy created");
        Ok(Self {
            id,
            dicom_dir,
            raster_dir,
        })
    }

    /// Renames the copy (and its raster twin) to `name`. If the raster rename
    /// fails the first rename is rolled back so nothing is half materialized.
    pub fn finalize(&self, name: &str) -> Result<FinalPaths> {
        let final_dicom = sibling(&self.dicom_dir, name);
        let final_raster = self.raster_dir.as_ref().map(|dir| sibling(dir, name));

        for target in std::iter::once(&final_dicom).chain(final_raster.as_ref()) {
            if target.exists() {
                return Err(DeidError::InvalidInput {
                    path: target.clone(),
                    reason: "output folder already exists".into(),
                });
            }
        }

        fs::rename(&self.dicom_dir, &final_dicom)?;
        if let (Some(from), Some(to)) = (&self.raster_dir, &final_raster) {
            if let Err(e) = fs::rename(from, to) {
                if let Err(undo) = fs::rename(&final_dicom, &self.dicom_dir) {
                    warn!(error = %undo, "could not roll back rename of {}", final_dicom.display());
                }
                return Err(e.into());
            }
        }

        info!(working_id = %self.id, name, "working copy renamed");
        Ok(FinalPaths {
            dicom_dir: final_dicom,
            raster_dir: final_raster,
        })
    }

    /// Removes the copy after a fatal linkage error.
    pub fn discard(self) -> Result<()> {
        for dir in std::iter::once(&self.dicom_dir).chain(self.raster_dir.as_ref()) {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        debug!(working_id = %self.id, "working copy discarded");
        Ok(())
    }
}

fn sibling(dir: &Path, name: &str) -> PathBuf {
    dir.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

/// Temporary identifier: hash of the folder name and the current time.
pub fn working_id(folder_name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(folder_name.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Recursively copies `src` into `dst`, returning the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DeidError::Io(std::io::Error::other(e)))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Grants owner write permission on every file below `dir` (media sets are often read-only).
pub fn make_writable(dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let mut permissions = entry.metadata()?.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }
        #[cfg(not(unix))]
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(entry.path(), permissions)?;
    }
    Ok(())
}

/// Turns a series description into a safe single path component.
pub fn sanitize_component(input: &str) -> String {
    let mapped: String = input
        .trim()
        .replace('*', "Star")
        .chars()
        .map(|c| match c {
            ' ' | ':' => '_',
            '/' | '\\' | '?' => '-',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
        .collect();

    if mapped.chars().all(|c| c == '.') {
        "series".to_string()
    } else {
        mapped
    }
}
