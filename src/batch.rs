use std::path::{Path, PathBuf};

use tracing::{error, info};
use walkdir::WalkDir;

use crate::config::DeidOptions;
use crate::dicomdir::INDEX_FILE;
use crate::error::Result;
use crate::identity::IdentityChoice;
use crate::link_table::LinkTable;
use crate::pipeline::deidentify_folder;

/// Per-folder results of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

/// Immediate sub-folders of `dir` that carry a DICOMDIR, sorted by name.
pub fn candidate_folders(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() && entry.path().join(INDEX_FILE).is_file() {
            folders.push(entry.into_path());
        }
    }
    Ok(folders)
}

/// Process folders strictly one after another. The table is reloaded before
/// and saved after every folder, so each run sees the previous one's rows.
/// A failing folder is logged and skipped; ambiguity is never resolved here.
pub fn process_directory(dir: &Path, options: &DeidOptions) -> Result<BatchSummary> {
    let folders = candidate_folders(dir)?;
    let table_path = options.link_table_path();
    info!(directory = %dir.display(), folders = folders.len(), table = %table_path.display(), "batch start");

    let mut summary = BatchSummary::default();
    for folder in folders {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let table = LinkTable::load_or_default(&table_path)?;
        match deidentify_folder(&folder, options, &table, &IdentityChoice::default()) {
            Ok((outcome, updated)) => {
                updated.save(&table_path)?;
                summary
                    .processed
                    .push((name, outcome.record.scan_code.to_string()));
            }
            Err(e) => {
                error!(folder = %name, error = %e, "folder skipped");
                summary.failed.push((name, e.to_string()));
            }
        }
    }

    info!(
        processed = summary.processed.len(),
        failed = summary.failed.len(),
        "batch finished"
    );
    Ok(summary)
}
