use crate::error::{NavigationError, RecorderError, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Result code of a successfully completed target or trial.
pub const RC_OK: &str = "OK";
/// Result code recorded when a trial is closed without an outcome selected.
pub const RC_NO_VALUE: &str = "noValue";

pub const COL_TARGET_ID: &str = "target_id";
pub const COL_TARGET: &str = "target";
pub const COL_SOUND_FILE: &str = "sound_file_name";

/// One prompt the participant is asked to write
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: String,
    pub value: String,
    pub sound_file_name: Option<String>,
    /// Seconds, known only after the sound was played once
    pub sound_file_length: Option<f64>,
    /// `""` not attempted, `"OK"` done, anything else is an error tag
    pub rc_code: String,
    pub next_trial_id: u32,
    pub trials: Vec<Trial>,
}

impl Target {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            sound_file_name: None,
            sound_file_length: None,
            rc_code: String::new(),
            next_trial_id: 1,
            trials: Vec::new(),
        }
    }

    pub fn with_sound(mut self, sound_file_name: Option<String>) -> Self {
        self.sound_file_name = sound_file_name;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.rc_code == RC_OK
    }

    pub fn is_untouched(&self) -> bool {
        self.rc_code.is_empty()
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok() && !self.is_untouched()
    }

    /// Artifact name of the attempt that would be recorded next
    pub fn trajectory_name(&self) -> String {
        format!("trajectory_target{}_trial{}", self.id, self.next_trial_id)
    }
}

/// One closed attempt at a target. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub id: u64,
    pub target_id: String,
    pub target_value: String,
    pub rc_code: String,
    pub time_in_session: Duration,
    pub date: NaiveDate,
    pub abs_time: NaiveTime,
    pub traj_file_name: String,
    pub sound_file_length: Option<f64>,
}

/// Ordered targets of one session; order is traversal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    sound_enabled: bool,
    /// Ledger trials whose target is no longer in the catalog
    detached: Vec<Trial>,
}

impl TargetCatalog {
    pub fn new(targets: Vec<Target>, sound_enabled: bool) -> Self {
        Self {
            targets,
            sound_enabled,
            detached: Vec::new(),
        }
    }

    /// Load a CSV targets file. Spreadsheets must be exported to CSV first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if let Some(ext @ ("xlsx" | "xls")) = extension.as_deref() {
            return Err(RecorderError::Format(format!(
                "'{ext}' spreadsheets are not supported, export {} as CSV",
                path.display()
            )));
        }
        let file = File::open(path)?;
        let catalog = Self::from_reader(file)?;
        tracing::info!(
            file = %path.display(),
            targets = catalog.len(),
            sound = catalog.sound_enabled,
            "targets loaded"
        );
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };

        let (Some(id_col), Some(value_col)) = (column(COL_TARGET_ID), column(COL_TARGET)) else {
            return Err(RecorderError::Format(format!(
                "targets file must contain the columns '{COL_TARGET_ID}' and '{COL_TARGET}' \
                 (optional: '{COL_SOUND_FILE}')"
            )));
        };
        let sound_col = column(COL_SOUND_FILE);

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let id = record.get(id_col).unwrap_or_default().trim().to_string();
            if id.is_empty() {
                continue;
            }
            if !seen.insert(id.clone()) {
                return Err(RecorderError::Format(format!("duplicate target_id '{id}'")));
            }
            let value = record.get(value_col).unwrap_or_default().trim().to_string();
            let sound = sound_col
                .and_then(|c| record.get(c))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            targets.push(Target::new(id, value).with_sound(sound));
        }

        Ok(Self::new(targets, sound_col.is_some()))
    }

    /// Whether the `sound_file_name` column was present in the source
    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Target> {
        self.targets.get_mut(index)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.iter_mut()
    }

    pub fn find_index_by_id(&self, id: &str) -> std::result::Result<usize, NavigationError> {
        self.targets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| NavigationError::TargetNotFound(id.to_string()))
    }

    pub fn detached_trials(&self) -> &[Trial] {
        &self.detached
    }

    pub(crate) fn detach_trial(&mut self, trial: Trial) {
        self.detached.push(trial);
    }
}
