//! The live session aggregate: catalog, navigation position, the trial being
//! recorded and everything the sampling tick needs. Created whole on
//! start/resume and dropped whole on end.

use crate::config::Config;
use crate::controller::Phase;
use crate::error::{RecorderError, Result};
use crate::ledger;
use crate::navigation::{NavCommand, NavOutcome, Navigator};
use crate::results::ResultsDir;
use crate::sound::{round_length, SoundPlayer};
use crate::source::Packet;
use crate::target::{Target, TargetCatalog, Trial, RC_NO_VALUE, RC_OK};
use crate::trajectory::{Rotation, Sample, Screen, TrajectoryHeader, TrajectoryRecorder};
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub cyclic_remaining_targets: bool,
    /// Trials start from `play` instead of the first pen packet
    pub allow_sound_play: bool,
    pub sounds_dir: Option<PathBuf>,
    pub error_tags: Vec<String>,
    pub screen: Screen,
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            cyclic_remaining_targets: cfg.cyclic_remaining_targets,
            allow_sound_play: cfg.sounds_dir.is_some(),
            sounds_dir: cfg.sounds_dir.clone(),
            error_tags: cfg.error_tags.clone(),
            screen: Screen::new(cfg.screen_width, cfg.screen_height),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome chosen by the experimenter for the attempt being recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error(String),
}

impl Outcome {
    pub fn rc_code(&self) -> &str {
        match self {
            Outcome::Ok => RC_OK,
            Outcome::Error(tag) => tag,
        }
    }
}

/// Completion counts, recomputed from the catalog after every ledger change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total_targets: usize,
    pub completed_ok: usize,
    pub completed_error: usize,
    /// Untouched targets, plus error targets when they will be shown again
    pub remaining: usize,
}

impl SessionStats {
    pub fn compute(catalog: &TargetCatalog, cyclic: bool) -> Self {
        let completed_ok = catalog.iter().filter(|t| t.is_ok()).count();
        let completed_error = catalog.iter().filter(|t| t.is_error()).count();
        let untouched = catalog.iter().filter(|t| t.is_untouched()).count();
        Self {
            total_targets: catalog.len(),
            completed_ok,
            completed_error,
            remaining: untouched + if cyclic { completed_error } else { 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PenEdge {
    Press,
    Release,
    Move,
    Hover,
}

/// Pen contact tracking. Strokes are only kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PenState {
    pub pressure: u8,
    pub position: Option<(i32, i32)>,
    pub strokes: Vec<Vec<(i32, i32)>>,
}

impl PenState {
    fn track(&mut self, packet: Packet) -> PenEdge {
        let point = (packet.x, packet.y);
        let edge = match (self.pressure > 0, packet.pressure > 0) {
            (false, true) => {
                self.strokes.push(vec![point]);
                PenEdge::Press
            }
            (true, false) => PenEdge::Release,
            (true, true) => {
                match self.strokes.last_mut() {
                    Some(stroke) => stroke.push(point),
                    None => self.strokes.push(vec![point]),
                }
                PenEdge::Move
            }
            (false, false) => PenEdge::Hover,
        };
        self.pressure = packet.pressure;
        self.position = Some(point);
        edge
    }
}

#[derive(Debug)]
struct ActiveTrial {
    recorder: TrajectoryRecorder,
    started_at: NaiveDateTime,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[derive(Debug)]
pub struct SessionState {
    catalog: TargetCatalog,
    navigator: Navigator,
    results: ResultsDir,
    config: SessionConfig,
    next_trial_id: u64,
    started_at: NaiveDateTime,
    /// Set when navigation ran out of targets; nothing is shown meanwhile
    exhausted: Option<NavOutcome>,
    pending_outcome: Option<Outcome>,
    active: Option<ActiveTrial>,
    pen: PenState,
    rotation: Rotation,
    stats: SessionStats,
    notice: Option<String>,
}

impl SessionState {
    pub fn new(
        catalog: TargetCatalog,
        results: ResultsDir,
        mut config: SessionConfig,
        next_trial_id: u64,
    ) -> Self {
        if config.allow_sound_play && !catalog.sound_enabled() {
            tracing::warn!("no 'sound_file_name' column in targets file, sound playing is disabled");
            config.allow_sound_play = false;
        }
        let stats = SessionStats::compute(&catalog, config.cyclic_remaining_targets);
        Self {
            catalog,
            navigator: Navigator::new(),
            results,
            config,
            next_trial_id,
            started_at: now(),
            exhausted: None,
            pending_outcome: None,
            active: None,
            pen: PenState::default(),
            rotation: Rotation::default(),
            stats,
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.active.is_some() {
            Phase::Recording
        } else if self.exhausted.is_some() || self.current_target().is_none() {
            Phase::Exhausted
        } else {
            Phase::TargetShown
        }
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn results(&self) -> &ResultsDir {
        &self.results
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn pen(&self) -> &PenState {
        &self.pen
    }

    pub fn pending_outcome(&self) -> Option<&Outcome> {
        self.pending_outcome.as_ref()
    }

    pub fn next_trial_id(&self) -> u64 {
        self.next_trial_id
    }

    pub fn skip_ok(&self) -> bool {
        self.navigator.skip_ok()
    }

    pub fn exhausted(&self) -> Option<NavOutcome> {
        self.exhausted
    }

    pub fn current_index(&self) -> Option<usize> {
        self.navigator.current()
    }

    pub fn current_target(&self) -> Option<&Target> {
        self.navigator.current().and_then(|i| self.catalog.get(i))
    }

    /// Path of the trajectory being written, if recording
    pub fn active_trajectory(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.recorder.path())
    }

    pub fn recorded_samples(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.recorder.samples())
    }

    /// Last non-fatal problem worth showing to the operator
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn invalid(&self, operation: &'static str) -> RecorderError {
        RecorderError::InvalidState {
            operation,
            phase: self.phase(),
        }
    }

    fn note(&mut self, message: String) {
        self.notice = Some(message);
    }

    fn can_start_trial(&self) -> bool {
        self.phase() == Phase::TargetShown && self.pending_outcome.is_none()
    }

    /// Open the trajectory of the next attempt on the current target.
    pub fn begin_trial(&mut self) -> Result<()> {
        if !self.can_start_trial() {
            return Err(self.invalid("begin_trial"));
        }
        self.open_trajectory()
    }

    fn open_trajectory(&mut self) -> Result<()> {
        let target = self
            .current_target()
            .ok_or_else(|| self.invalid("begin_trial"))?;
        let started_at = now();
        let header = TrajectoryHeader {
            target_id: target.id.clone(),
            attempt: target.next_trial_id,
            session_start: self.started_at.time(),
            created: started_at,
            screen: self.config.screen,
        };
        let name = target.trajectory_name();
        let recorder = TrajectoryRecorder::open(self.results.root(), &name, &header)?;
        tracing::info!(target_id = %header.target_id, file = %name, "trial started");

        self.pen = PenState::default();
        self.active = Some(ActiveTrial {
            recorder,
            started_at,
        });
        Ok(())
    }

    /// Sound-driven trial start: begins recording and plays the target's clip.
    pub fn play(&mut self, player: &mut dyn SoundPlayer) -> Result<()> {
        if !self.config.allow_sound_play {
            return Err(self.invalid("play"));
        }
        let index = self.navigator.current().ok_or_else(|| self.invalid("play"))?;
        let sound_file = self
            .current_target()
            .and_then(|t| t.sound_file_name.clone());
        let clip = match (&self.config.sounds_dir, sound_file) {
            (Some(dir), Some(file)) => dir.join(file),
            _ => return Err(self.invalid("play")),
        };

        self.begin_trial()?;
        match player.play(&clip) {
            Ok(Some(length)) => {
                if let Some(target) = self.catalog.get_mut(index) {
                    target.sound_file_length = Some(round_length(length));
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "sound playback failed");
                self.note(e.to_string());
            }
        }
        Ok(())
    }

    pub fn select_outcome(&mut self, outcome: Outcome) -> Result<()> {
        if self.active.is_none() {
            return Err(self.invalid("select_outcome"));
        }
        self.pending_outcome = Some(outcome);
        Ok(())
    }

    pub fn clear_outcome(&mut self) -> Result<()> {
        if self.active.is_none() {
            return Err(self.invalid("clear_outcome"));
        }
        self.pending_outcome = None;
        Ok(())
    }

    pub fn add_error_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.config.error_tags.iter().any(|t| t == tag) {
            return false;
        }
        self.config.error_tags.push(tag.to_string());
        true
    }

    /// Feed one pen packet. Opens a trial on the first packet when allowed,
    /// then appends with the x axis mirrored back to screen orientation.
    pub fn sample(&mut self, packet: Packet) -> Result<()> {
        if self.active.is_none() && !self.config.allow_sound_play && self.can_start_trial() {
            self.open_trajectory()?;
        }

        let edge = self.pen.track(packet);
        let mirrored_x = self.config.screen.width - packet.x;
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if edge == PenEdge::Release {
            active
                .recorder
                .append(Sample::new(mirrored_x, packet.y, 0))?;
        }
        active
            .recorder
            .append(Sample::new(mirrored_x, packet.y, packet.pressure))?;
        Ok(())
    }

    /// Finish the attempt being recorded with the given result code.
    pub fn close_trial(&mut self, rc_code: &str) -> Result<Trial> {
        let index = match (&self.active, self.navigator.current()) {
            (Some(_), Some(index)) => index,
            _ => return Err(self.invalid("close_trial")),
        };
        let Some(active) = self.active.take() else {
            return Err(self.invalid("close_trial"));
        };

        let traj_file_name = active.recorder.name().to_string();
        if let Err(e) = active
            .recorder
            .close_with_rotation(self.rotation, self.config.screen.center())
        {
            tracing::error!(file = %traj_file_name, error = %e, "could not finalize trajectory");
            self.note(format!("trajectory {traj_file_name}: {e}"));
        }

        let closed_at = now();
        let trial_id = self.next_trial_id;
        self.next_trial_id += 1;

        let target = self
            .catalog
            .get_mut(index)
            .ok_or(RecorderError::InvalidState {
                operation: "close_trial",
                phase: Phase::Exhausted,
            })?;
        let trial = Trial {
            id: trial_id,
            target_id: target.id.clone(),
            target_value: target.value.clone(),
            rc_code: rc_code.to_string(),
            time_in_session: active.started_at - self.started_at,
            date: closed_at.date(),
            abs_time: closed_at.time(),
            traj_file_name,
            sound_file_length: target.sound_file_length,
        };
        ledger::append(target, trial.clone());
        target.next_trial_id += 1;
        tracing::info!(trial_id, target_id = %trial.target_id, rc = %trial.rc_code, "trial closed");

        self.persist();
        self.stats = SessionStats::compute(&self.catalog, self.config.cyclic_remaining_targets);
        Ok(trial)
    }

    /// Close with whatever outcome is selected, `noValue` when none is.
    pub fn close_with_pending(&mut self) -> Result<Trial> {
        let rc = self
            .pending_outcome
            .as_ref()
            .map_or(RC_NO_VALUE, Outcome::rc_code)
            .to_string();
        self.close_trial(&rc)
    }

    /// Throw away the attempt being recorded and start it over.
    pub fn reset_trial(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Err(self.invalid("reset_trial"));
        };
        active.recorder.discard()?;
        self.pending_outcome = None;
        self.open_trajectory()
    }

    pub fn rotate(&mut self) -> Rotation {
        self.rotation = self.rotation.turned();
        self.rotation
    }

    pub fn navigate(&mut self, command: &NavCommand) -> Result<NavOutcome> {
        if let NavCommand::Goto(id) = command {
            self.catalog.find_index_by_id(id)?;
        }
        if self.active.is_some() {
            self.close_with_pending()?;
        }
        self.pending_outcome = None;
        self.pen = PenState::default();

        let outcome = self.navigator.apply(
            command,
            &self.catalog,
            self.config.cyclic_remaining_targets,
        )?;
        match outcome {
            NavOutcome::Moved(index) => {
                self.exhausted = None;
                if let Some(target) = self.catalog.get(index) {
                    tracing::debug!(target_id = %target.id, index, "target shown");
                }
            }
            NavOutcome::EndOfTargets | NavOutcome::AllTargetsOk => {
                tracing::info!(?outcome, "no more targets to show");
                self.exhausted = Some(outcome);
            }
            NavOutcome::Unchanged | NavOutcome::OnlyCurrentRemaining => {}
        }
        Ok(outcome)
    }

    /// Rewrite both ledger files. Failures are logged and kept as a notice;
    /// the in-memory session carries on.
    pub fn persist(&mut self) {
        if let Err(e) = self.results.save_ledger(&self.catalog) {
            tracing::error!(error = %e, "ledger not saved");
            self.note(format!("{e}. Last trial information was not saved."));
        }
    }

    /// Close any open trial and save. Consumes the session.
    pub fn finish(mut self) -> Result<SessionStats> {
        if self.active.is_some() {
            self.close_with_pending()?;
        }
        self.persist();
        Ok(SessionStats::compute(
            &self.catalog,
            self.config.cyclic_remaining_targets,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::read_trajectory;
    use assert_matches::assert_matches;
    use tempfile::{tempdir, TempDir};

    fn session(cyclic: bool) -> (TempDir, SessionState) {
        let dir = tempdir().unwrap();
        let catalog = TargetCatalog::new(
            vec![
                Target::new("1", "cat"),
                Target::new("2", "dog"),
                Target::new("3", "bird"),
            ],
            false,
        );
        let config = SessionConfig {
            cyclic_remaining_targets: cyclic,
            screen: Screen::new(100, 80),
            ..SessionConfig::default()
        };
        let mut state = SessionState::new(catalog, ResultsDir::new(dir.path()), config, 1);
        state.navigate(&NavCommand::Next).unwrap();
        (dir, state)
    }

    #[test]
    fn first_packet_opens_trial_and_mirrors_x() {
        let (_dir, mut state) = session(true);
        assert_eq!(state.phase(), Phase::TargetShown);

        state.sample(Packet::new(10, 5, 0)).unwrap();
        state.sample(Packet::new(12, 6, 40)).unwrap();
        assert_eq!(state.phase(), Phase::Recording);
        let path = state.active_trajectory().unwrap().to_path_buf();
        assert!(path.ends_with("trajectory_target1_trial1.csv"));

        state.close_trial(RC_OK).unwrap();
        let (_, samples) = read_trajectory(&path).unwrap();
        let points: Vec<_> = samples.iter().map(|s| (s.x, s.y, s.pressure)).collect();
        assert_eq!(points, [(90, 5, 0), (88, 6, 40)]);
    }

    #[test]
    fn release_adds_lift_off_marker() {
        let (_dir, mut state) = session(true);
        for p in [(10, 10, 0), (11, 11, 30), (12, 12, 35), (13, 13, 0)] {
            state.sample(Packet::new(p.0, p.1, p.2)).unwrap();
        }
        assert_eq!(state.recorded_samples(), 5);
        assert_eq!(state.pen().strokes, vec![vec![(11, 11), (12, 12)]]);

        let path = state.active_trajectory().unwrap().to_path_buf();
        state.close_trial("Motor").unwrap();
        let pressures: Vec<_> = read_trajectory(&path)
            .unwrap()
            .1
            .iter()
            .map(|s| s.pressure)
            .collect();
        assert_eq!(pressures, [0, 30, 35, 0, 0]);
    }

    #[test]
    fn close_trial_updates_target_ledger_and_stats() {
        let (dir, mut state) = session(true);
        state.begin_trial().unwrap();
        let trial = state.close_trial("Spelling").unwrap();

        assert_eq!(trial.id, 1);
        assert_eq!(trial.traj_file_name, "trajectory_target1_trial1");
        let target = state.current_target().unwrap();
        assert_eq!(target.rc_code, "Spelling");
        assert_eq!(target.next_trial_id, 2);
        assert_eq!(state.next_trial_id(), 2);
        assert_eq!(
            state.stats(),
            SessionStats {
                total_targets: 3,
                completed_ok: 0,
                completed_error: 1,
                remaining: 3,
            }
        );
        let trials = std::fs::read_to_string(dir.path().join(ledger::TRIALS_FILE)).unwrap();
        assert_eq!(trials.lines().count(), 2);
    }

    #[test]
    fn stats_without_cyclic_do_not_count_errors_as_remaining() {
        let (_dir, mut state) = session(false);
        state.begin_trial().unwrap();
        state.close_trial("Motor").unwrap();
        let stats = state.stats();
        assert_eq!(stats.remaining, 2);
        assert_eq!(
            stats.completed_ok + stats.completed_error + stats.remaining,
            stats.total_targets
        );
    }

    #[test]
    fn selected_outcome_blocks_new_trial_until_navigation() {
        let (_dir, mut state) = session(true);
        state.begin_trial().unwrap();
        state.select_outcome(Outcome::Ok).unwrap();
        state.close_trial(RC_OK).unwrap();

        // a late packet must not open a second file for the same target
        state.sample(Packet::new(1, 1, 20)).unwrap();
        assert_eq!(state.phase(), Phase::TargetShown);
        assert_matches!(state.begin_trial(), Err(RecorderError::InvalidState { .. }));

        state.navigate(&NavCommand::Next).unwrap();
        state.sample(Packet::new(1, 1, 20)).unwrap();
        assert_eq!(state.phase(), Phase::Recording);
    }

    #[test]
    fn navigating_closes_open_trial_with_pending_outcome() {
        let (_dir, mut state) = session(true);
        state.begin_trial().unwrap();
        state
            .select_outcome(Outcome::Error("Incomplete".into()))
            .unwrap();
        state.navigate(&NavCommand::Next).unwrap();

        let first = state.catalog().get(0).unwrap();
        assert_eq!(first.rc_code, "Incomplete");
        assert_eq!(state.current_index(), Some(1));
        assert!(state.pending_outcome().is_none());

        state.begin_trial().unwrap();
        state.navigate(&NavCommand::Prev).unwrap();
        assert_eq!(state.catalog().get(1).unwrap().rc_code, RC_NO_VALUE);
    }

    #[test]
    fn goto_unknown_id_has_no_side_effects() {
        let (_dir, mut state) = session(true);
        state.begin_trial().unwrap();

        assert_matches!(
            state.navigate(&NavCommand::Goto("99".into())),
            Err(RecorderError::Navigation(_))
        );
        assert_eq!(state.phase(), Phase::Recording);
        assert_eq!(state.current_index(), Some(0));
    }

    #[test]
    fn reset_trial_reopens_same_attempt() {
        let (_dir, mut state) = session(true);
        state.sample(Packet::new(1, 1, 10)).unwrap();
        state.select_outcome(Outcome::Ok).unwrap();
        let path = state.active_trajectory().unwrap().to_path_buf();

        state.reset_trial().unwrap();
        assert_eq!(state.active_trajectory(), Some(path.as_path()));
        assert_eq!(state.recorded_samples(), 0);
        assert!(state.pending_outcome().is_none());
    }

    #[test]
    fn outcome_requires_recording() {
        let (_dir, mut state) = session(true);
        assert_matches!(
            state.select_outcome(Outcome::Ok),
            Err(RecorderError::InvalidState { operation: "select_outcome", .. })
        );
        assert_matches!(state.close_trial(RC_OK), Err(RecorderError::InvalidState { .. }));
    }

    #[test]
    fn end_of_targets_stops_sampling() {
        let (_dir, mut state) = session(false);
        state.navigate(&NavCommand::Next).unwrap();
        state.navigate(&NavCommand::Next).unwrap();
        assert_eq!(
            state.navigate(&NavCommand::Next).unwrap(),
            NavOutcome::EndOfTargets
        );
        assert_eq!(state.phase(), Phase::Exhausted);

        state.sample(Packet::new(1, 1, 50)).unwrap();
        assert_eq!(state.phase(), Phase::Exhausted);

        state.navigate(&NavCommand::Prev).unwrap();
        assert_eq!(state.phase(), Phase::TargetShown);
        assert_eq!(state.current_index(), Some(1));
    }

    #[test]
    fn sound_mode_waits_for_play() {
        struct FixedLength;
        impl SoundPlayer for FixedLength {
            fn play(
                &mut self,
                _file: &Path,
            ) -> std::result::Result<Option<f64>, crate::sound::SoundError> {
                Ok(Some(1.234))
            }
        }

        let dir = tempdir().unwrap();
        let catalog = TargetCatalog::new(
            vec![Target::new("1", "cat").with_sound(Some("cat.mp3".into()))],
            true,
        );
        let config = SessionConfig {
            sounds_dir: Some(dir.path().to_path_buf()),
            allow_sound_play: true,
            ..SessionConfig::default()
        };
        let mut state = SessionState::new(catalog, ResultsDir::new(dir.path()), config, 1);
        state.navigate(&NavCommand::Next).unwrap();

        state.sample(Packet::new(1, 1, 30)).unwrap();
        assert_eq!(state.phase(), Phase::TargetShown);

        state.play(&mut FixedLength).unwrap();
        assert_eq!(state.phase(), Phase::Recording);
        let trial = state.close_trial(RC_OK).unwrap();
        assert_eq!(trial.sound_file_length, Some(1.23));
    }

    #[test]
    fn unmeasured_sound_length_stays_empty_in_ledger() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("cat.mp3"), b"ID3").unwrap();
        let catalog = TargetCatalog::new(
            vec![Target::new("1", "cat").with_sound(Some("cat.mp3".into()))],
            true,
        );
        let config = SessionConfig {
            sounds_dir: Some(dir.path().to_path_buf()),
            allow_sound_play: true,
            ..SessionConfig::default()
        };
        let mut state = SessionState::new(catalog, ResultsDir::new(dir.path()), config, 1);
        state.navigate(&NavCommand::Next).unwrap();

        state.play(&mut crate::sound::SilentPlayer).unwrap();
        let trial = state.close_trial(RC_OK).unwrap();
        assert_eq!(trial.sound_file_length, None);
        assert_eq!(state.current_target().unwrap().sound_file_length, None);

        let rows = ledger::read_trials(dir.path().join(ledger::TRIALS_FILE)).unwrap();
        assert_eq!(rows[0].sound_file_length, None);
        let text = std::fs::read_to_string(dir.path().join(ledger::TRIALS_FILE)).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with("trajectory_target1_trial1,"));
    }

    #[test]
    fn sound_request_without_sound_column_is_dropped() {
        let dir = tempdir().unwrap();
        let catalog = TargetCatalog::new(vec![Target::new("1", "cat")], false);
        let config = SessionConfig {
            sounds_dir: Some(dir.path().to_path_buf()),
            allow_sound_play: true,
            ..SessionConfig::default()
        };
        let state = SessionState::new(catalog, ResultsDir::new(dir.path()), config, 1);
        assert!(!state.config().allow_sound_play);
    }

    #[test]
    fn error_tags_are_unique() {
        let (_dir, mut state) = session(true);
        assert!(state.add_error_tag(" Mirror "));
        assert!(!state.add_error_tag("Mirror"));
        assert!(!state.add_error_tag("  "));
        assert_eq!(state.config().error_tags.last().unwrap(), "Mirror");
    }

    #[test]
    fn persistence_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let catalog = TargetCatalog::new(vec![Target::new("1", "cat")], false);
        let mut state =
            SessionState::new(catalog, ResultsDir::new(dir.path()), SessionConfig::default(), 1);
        state.navigate(&NavCommand::Next).unwrap();
        state.begin_trial().unwrap();

        // make the ledger target a directory so the rename fails
        std::fs::create_dir(dir.path().join(ledger::TRIALS_FILE)).unwrap();
        let trial = state.close_trial(RC_OK).unwrap();

        assert_eq!(trial.id, 1);
        assert!(state.take_notice().is_some());
        assert_eq!(state.stats().completed_ok, 1);
    }
}
