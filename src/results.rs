use crate::error::{RecorderError, Result};
use crate::ledger::{self, REMAINING_TARGETS_FILE, TRIALS_FILE};
use crate::target::TargetCatalog;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const ORIGINAL_TARGETS_FILE: &str = "Original_targets_file_copy.csv";
pub const LOG_FILE: &str = "writracker.log";

/// The folder holding one session's ledger files and trajectories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsDir {
    root: PathBuf,
}

impl ResultsDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Set up a folder for a fresh session: keep a copy of the targets file
    /// for later resumes and seed the remaining-targets queue with it.
    /// Folders with a ledger belong to an earlier session and are refused.
    pub fn prepare_new<P: AsRef<Path>>(root: P, targets_file: &Path) -> Result<Self> {
        let dir = Self::new(root);
        if dir.trials_path().exists() {
            return Err(RecorderError::SessionExists { path: dir.root });
        }
        fs::create_dir_all(&dir.root)?;

        let occupied = fs::read_dir(&dir.root)?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_str() != Some(LOG_FILE));
        if occupied {
            tracing::warn!(
                folder = %dir.root.display(),
                "results folder is not empty, old session files may be overwritten"
            );
        }

        if dir.remaining_targets_path().exists() {
            tracing::info!(
                folder = %dir.root.display(),
                "{REMAINING_TARGETS_FILE} exists, keeping the existing copies"
            );
            return Ok(dir);
        }

        fs::copy(targets_file, dir.original_targets_path())?;
        fs::copy(targets_file, dir.remaining_targets_path())?;
        Ok(dir)
    }

    /// A folder written by an earlier session. Both the ledger and the targets
    /// copy must be there.
    pub fn open_existing<P: AsRef<Path>>(root: P) -> Result<Self> {
        let dir = Self::new(root);
        for required in [dir.trials_path(), dir.original_targets_path()] {
            if !required.is_file() {
                return Err(RecorderError::resume(&dir.root, format!(
                    "missing {}",
                    required.file_name().unwrap_or_default().to_string_lossy()
                )));
            }
        }
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trials_path(&self) -> PathBuf {
        self.root.join(TRIALS_FILE)
    }

    pub fn remaining_targets_path(&self) -> PathBuf {
        self.root.join(REMAINING_TARGETS_FILE)
    }

    pub fn original_targets_path(&self) -> PathBuf {
        self.root.join(ORIGINAL_TARGETS_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Rewrite `trials.csv` and `remaining_targets.csv` from the catalog.
    pub fn save_ledger(&self, catalog: &TargetCatalog) -> Result<()> {
        let trials = self.trials_path();
        write_atomic(&trials, |out| ledger::write_trials(out, catalog))
            .map_err(|e| as_persistence(&trials, e))?;

        let remaining = self.remaining_targets_path();
        write_atomic(&remaining, |out| ledger::write_remaining_targets(out, catalog))
            .map_err(|e| as_persistence(&remaining, e))?;

        tracing::debug!(folder = %self.root.display(), "ledger saved");
        Ok(())
    }
}

fn as_persistence(path: &Path, err: RecorderError) -> RecorderError {
    match err {
        RecorderError::Io(source) => RecorderError::persistence(path, source),
        RecorderError::Persistence { source, .. } => RecorderError::persistence(path, source),
        other => RecorderError::persistence(path, std::io::Error::other(other.to_string())),
    }
}

/// Replace `path` with whatever `write` produces. Readers see either the old
/// or the new file; the temporary file is removed if anything fails.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
