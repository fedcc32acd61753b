//! Trial history: appending closed trials, the `trials.csv` and
//! `remaining_targets.csv` formats, and rebuilding target state from a
//! previously written ledger.

use crate::error::{RecorderError, Result};
use crate::target::{Target, TargetCatalog, Trial, RC_OK};
use chrono::{Duration, NaiveDate, NaiveTime};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const TRIALS_FILE: &str = "trials.csv";
pub const REMAINING_TARGETS_FILE: &str = "remaining_targets.csv";

pub const TRIALS_COLUMNS: [&str; 9] = [
    "trial_id",
    "target_id",
    "target",
    "rc",
    "time_in_session",
    "date",
    "time_in_day",
    "raw_file_name",
    "sound_file_length",
];

pub const REMAINING_TARGETS_COLUMNS: [&str; 3] = ["target_id", "target", "sound_file_name"];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// One line of `trials.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub trial_id: u64,
    pub target_id: String,
    pub target: String,
    pub rc: String,
    pub time_in_session: String,
    pub date: String,
    pub time_in_day: String,
    pub raw_file_name: String,
    pub sound_file_length: Option<f64>,
}

impl From<&Trial> for TrialRow {
    fn from(trial: &Trial) -> Self {
        Self {
            trial_id: trial.id,
            target_id: trial.target_id.clone(),
            target: trial.target_value.clone(),
            rc: trial.rc_code.clone(),
            time_in_session: format_session_time(trial.time_in_session),
            date: trial.date.format(DATE_FORMAT).to_string(),
            time_in_day: trial.abs_time.format(TIME_FORMAT).to_string(),
            raw_file_name: trial.traj_file_name.clone(),
            sound_file_length: trial.sound_file_length,
        }
    }
}

impl TrialRow {
    fn to_trial(&self) -> std::result::Result<Trial, String> {
        let time_in_session = parse_session_time(&self.time_in_session).ok_or_else(|| {
            format!(
                "trial {}: bad time_in_session '{}'",
                self.trial_id, self.time_in_session
            )
        })?;
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| format!("trial {}: bad date '{}': {e}", self.trial_id, self.date))?;
        let abs_time = NaiveTime::parse_from_str(&self.time_in_day, TIME_FORMAT).map_err(|e| {
            format!(
                "trial {}: bad time_in_day '{}': {e}",
                self.trial_id, self.time_in_day
            )
        })?;

        Ok(Trial {
            id: self.trial_id,
            target_id: self.target_id.clone(),
            target_value: self.target.clone(),
            rc_code: self.rc.clone(),
            time_in_session,
            date,
            abs_time,
            traj_file_name: self.raw_file_name.clone(),
            sound_file_length: self.sound_file_length,
        })
    }
}

#[derive(Debug, Serialize)]
struct RemainingTargetRow<'a> {
    target_id: &'a str,
    target: &'a str,
    sound_file_name: Option<&'a str>,
}

/// Attach a closed trial to its target. The target shows its latest outcome,
/// not its best one.
pub fn append(target: &mut Target, trial: Trial) {
    target.rc_code = trial.rc_code.clone();
    target.trials.push(trial);
}

/// Every trial of the catalog in global chronological (trial id) order.
pub fn serialize_all(catalog: &TargetCatalog) -> Vec<TrialRow> {
    catalog
        .iter()
        .flat_map(|t| t.trials.iter())
        .chain(catalog.detached_trials())
        .sorted_by_key(|t| t.id)
        .map(TrialRow::from)
        .collect()
}

/// Restore `rc_code`, `next_trial_id` and trial history of each target from
/// ledger rows. Returns the next free trial id.
pub fn resume(catalog: &mut TargetCatalog, rows: &[TrialRow]) -> Result<u64> {
    let fail = |reason: String| RecorderError::resume(TRIALS_FILE, reason);

    let by_target = rows
        .iter()
        .into_group_map_by(|row| row.target_id.as_str());

    for unknown in by_target
        .keys()
        .filter(|id| catalog.find_index_by_id(id).is_err())
    {
        tracing::warn!(target_id = %unknown, "ledger rows reference an unknown target, kept as is");
    }
    // carried along so rewriting the ledger does not drop them
    let unknown_rows: Vec<&TrialRow> = rows
        .iter()
        .filter(|r| catalog.find_index_by_id(&r.target_id).is_err())
        .collect();
    for row in unknown_rows {
        let trial = row.to_trial().map_err(fail)?;
        catalog.detach_trial(trial);
    }

    for target in catalog.iter_mut() {
        let Some(target_rows) = by_target.get(target.id.as_str()) else {
            continue;
        };
        let Some(last) = target_rows.last() else {
            continue;
        };

        target.rc_code = if target_rows.iter().any(|r| r.rc == RC_OK) {
            RC_OK.to_string()
        } else {
            last.rc.clone()
        };

        let attempt = trailing_number(&last.raw_file_name).ok_or_else(|| {
            fail(format!(
                "no attempt number at the end of '{}'",
                last.raw_file_name
            ))
        })?;
        target.next_trial_id = attempt.checked_add(1).ok_or_else(|| {
            fail(format!(
                "attempt number at the end of '{}' is out of range",
                last.raw_file_name
            ))
        })?;

        target.trials = target_rows
            .iter()
            .map(|row| row.to_trial())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(fail)?;

        if let Some(length) = target_rows.iter().rev().find_map(|r| r.sound_file_length) {
            target.sound_file_length = Some(length);
        }
    }

    Ok(rows.iter().map(|r| r.trial_id).max().map_or(1, |max| max + 1))
}

/// Read `trials.csv`. Any failure is reported as a resume error.
pub fn read_trials<P: AsRef<Path>>(path: P) -> Result<Vec<TrialRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RecorderError::resume(path, e.to_string()))?;
    read_trials_from(file).map_err(|e| match e {
        RecorderError::Resume { reason, .. } => RecorderError::resume(path, reason),
        other => RecorderError::resume(path, other.to_string()),
    })
}

pub fn read_trials_from<R: Read>(reader: R) -> Result<Vec<TrialRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<TrialRow>, _>>()?;
    Ok(rows)
}

pub fn write_trials<W: Write>(writer: W, catalog: &TargetCatalog) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(TRIALS_COLUMNS)?;
    for row in serialize_all(catalog) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// The resumable work queue: every target not yet marked OK.
pub fn write_remaining_targets<W: Write>(writer: W, catalog: &TargetCatalog) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(REMAINING_TARGETS_COLUMNS)?;
    for target in catalog.iter().filter(|t| t.rc_code != RC_OK) {
        wtr.serialize(RemainingTargetRow {
            target_id: &target.id,
            target: &target.value,
            sound_file_name: target.sound_file_name.as_deref(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

/// `H:MM:SS`
pub fn format_session_time(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

pub fn parse_session_time(text: &str) -> Option<Duration> {
    let mut parts = text.trim().splitn(3, ':').map(|p| p.parse::<i64>().ok());
    let (h, m, s) = (parts.next()??, parts.next()??, parts.next()??);
    Some(Duration::seconds(h * 3600 + m * 60 + s))
}

/// Trailing run of ASCII digits, e.g. `trajectory_target3_trial12` -> 12
pub fn trailing_number(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn catalog() -> TargetCatalog {
        TargetCatalog::new(
            vec![
                Target::new("1", "cat"),
                Target::new("2", "dog"),
                Target::new("3", "bird"),
            ],
            false,
        )
    }

    fn trial(id: u64, target: &Target, rc: &str) -> Trial {
        Trial {
            id,
            target_id: target.id.clone(),
            target_value: target.value.clone(),
            rc_code: rc.to_string(),
            time_in_session: Duration::seconds(65 + id as i64),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            abs_time: NaiveTime::from_hms_opt(10, 0, id as u32).unwrap(),
            traj_file_name: target.trajectory_name(),
            sound_file_length: None,
        }
    }

    fn record(catalog: &mut TargetCatalog, index: usize, id: u64, rc: &str) {
        let target = catalog.get_mut(index).unwrap();
        let t = trial(id, target, rc);
        append(target, t);
        target.next_trial_id += 1;
    }

    #[test]
    fn append_keeps_latest_outcome() {
        let mut catalog = catalog();
        record(&mut catalog, 0, 1, RC_OK);
        record(&mut catalog, 0, 2, "Motor");

        let target = catalog.get(0).unwrap();
        assert_eq!(target.rc_code, "Motor");
        assert_eq!(target.trials.len(), 2);
        assert_eq!(target.next_trial_id, 3);
    }

    #[test]
    fn serialize_all_orders_by_trial_id_across_targets() {
        let mut catalog = catalog();
        record(&mut catalog, 2, 1, "Motor");
        record(&mut catalog, 0, 2, RC_OK);
        record(&mut catalog, 2, 3, RC_OK);
        record(&mut catalog, 1, 4, "Spelling");

        let ids: Vec<_> = serialize_all(&catalog).iter().map(|r| r.trial_id).collect();
        assert_eq!(ids, [1, 2, 3, 4]);
    }

    #[test]
    fn trials_file_layout() {
        let mut catalog = catalog();
        record(&mut catalog, 1, 1, "Spelling");

        let mut out = Vec::new();
        write_trials(&mut out, &catalog).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "trial_id,target_id,target,rc,time_in_session,date,time_in_day,raw_file_name,sound_file_length\n\
             1,2,dog,Spelling,0:01:06,2024-03-01,10:00:01,trajectory_target2_trial1,\n"
        );
    }

    #[test]
    fn empty_ledger_still_has_header() {
        let mut out = Vec::new();
        write_trials(&mut out, &catalog()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn remaining_targets_skip_ok_only() {
        let mut catalog = catalog();
        record(&mut catalog, 0, 1, RC_OK);
        record(&mut catalog, 1, 2, "Motor");

        let mut out = Vec::new();
        write_remaining_targets(&mut out, &catalog).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text, "target_id,target,sound_file_name\n2,dog,\n3,bird,\n");
    }

    #[test]
    fn resume_reproduces_rc_codes_and_attempt_counters() {
        let mut original = catalog();
        record(&mut original, 0, 1, "Motor");
        record(&mut original, 1, 2, "Spelling");
        record(&mut original, 0, 3, RC_OK);
        record(&mut original, 1, 4, "Incomplete");

        let mut out = Vec::new();
        write_trials(&mut out, &original).unwrap();
        let rows = read_trials_from(out.as_slice()).unwrap();

        let mut restored = catalog();
        let next_id = resume(&mut restored, &rows).unwrap();

        assert_eq!(next_id, 5);
        for (a, b) in original.iter().zip(restored.iter()) {
            assert_eq!(a.rc_code, b.rc_code, "rc of target {}", a.id);
            assert_eq!(a.next_trial_id, b.next_trial_id, "attempt of target {}", a.id);
            assert_eq!(a.trials, b.trials);
        }
    }

    #[test]
    fn resume_prefers_any_ok_over_later_errors() {
        let mut original = catalog();
        record(&mut original, 0, 1, RC_OK);
        record(&mut original, 0, 2, "Motor");

        let rows = serialize_all(&original);
        let mut restored = catalog();
        resume(&mut restored, &rows).unwrap();

        assert_eq!(restored.get(0).unwrap().rc_code, RC_OK);
        assert_eq!(restored.get(0).unwrap().next_trial_id, 3);
    }

    #[test]
    fn resume_without_rows_starts_at_one() {
        let mut restored = catalog();
        assert_eq!(resume(&mut restored, &[]).unwrap(), 1);
        assert!(restored.iter().all(|t| t.is_untouched()));
    }

    #[test]
    fn resume_rejects_file_names_without_attempt_number() {
        let mut original = catalog();
        record(&mut original, 0, 1, RC_OK);
        let mut rows = serialize_all(&original);
        rows[0].raw_file_name = "trajectory_target1".into();

        assert_matches!(
            resume(&mut catalog(), &rows),
            Err(RecorderError::Resume { .. })
        );
    }

    #[test]
    fn resume_rejects_attempt_number_at_the_limit() {
        let mut original = catalog();
        record(&mut original, 0, 1, RC_OK);
        let mut rows = serialize_all(&original);
        rows[0].raw_file_name = format!("trajectory_target1_trial{}", u32::MAX);

        assert_matches!(
            resume(&mut catalog(), &rows),
            Err(RecorderError::Resume { reason, .. }) if reason.contains("out of range")
        );
    }

    #[test]
    fn trials_of_unknown_targets_survive_rewrite() {
        let mut original = TargetCatalog::new(
            vec![Target::new("1", "cat"), Target::new("99", "gone")],
            false,
        );
        record(&mut original, 1, 1, "Motor");
        record(&mut original, 0, 2, RC_OK);
        let rows = serialize_all(&original);

        let mut restored = catalog();
        assert_eq!(resume(&mut restored, &rows).unwrap(), 3);
        assert_eq!(restored.detached_trials().len(), 1);
        assert_eq!(restored.detached_trials()[0].target_id, "99");
        assert_eq!(restored.get(0).unwrap().rc_code, RC_OK);

        let mut out = Vec::new();
        write_trials(&mut out, &restored).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1,99,gone,Motor,"));
        assert!(lines[1].starts_with("2,1,cat,OK,"));

        // not part of the work queue
        let mut out = Vec::new();
        write_remaining_targets(&mut out, &restored).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("99"));
    }

    #[test]
    fn missing_ledger_is_a_resume_error() {
        assert_matches!(
            read_trials("/definitely/not/here/trials.csv"),
            Err(RecorderError::Resume { .. })
        );
    }

    #[test]
    fn session_time_round_trip_format() {
        assert_eq!(format_session_time(Duration::seconds(3725)), "1:02:05");
        assert_eq!(parse_session_time("1:02:05"), Some(Duration::seconds(3725)));
        assert_eq!(parse_session_time("garbage"), None);
    }

    #[test]
    fn trailing_number_extraction() {
        assert_eq!(trailing_number("trajectory_target3_trial12"), Some(12));
        assert_eq!(trailing_number("trajectory_target3_trial"), None);
    }
}
