use crate::error::{RecorderError, Result};
use crate::ledger;
use crate::navigation::{NavCommand, NavOutcome};
use crate::results::ResultsDir;
use crate::session::{Outcome, SessionConfig, SessionState, SessionStats};
use crate::sound::SoundPlayer;
use crate::source::{Packet, SampleSource};
use crate::target::{Target, TargetCatalog, Trial};
use crate::trajectory::Rotation;
use std::path::Path;

/// Where the controller is in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Idle,
    TargetShown,
    Recording,
    /// Navigation ran out of targets; samples are ignored until it moves again
    Exhausted,
    SessionEnded,
}

/// Catalog and ledger of an earlier session, folded back together
struct PreviousSession {
    results: ResultsDir,
    catalog: TargetCatalog,
    next_trial_id: u64,
    trials: usize,
}

impl PreviousSession {
    fn load(results_root: &Path) -> Result<Self> {
        let results = ResultsDir::open_existing(results_root)?;
        let mut catalog = TargetCatalog::load(results.original_targets_path())
            .map_err(|e| RecorderError::resume(results.root(), e.to_string()))?;
        let rows = ledger::read_trials(results.trials_path())?;
        let next_trial_id = ledger::resume(&mut catalog, &rows)?;
        Ok(Self {
            results,
            catalog,
            next_trial_id,
            trials: rows.len(),
        })
    }
}

/// Completion counts of a results folder, without starting a session.
pub fn summarize(results_root: &Path, cyclic: bool) -> Result<SessionStats> {
    let previous = PreviousSession::load(results_root)?;
    Ok(SessionStats::compute(&previous.catalog, cyclic))
}

/// Owns the single live session, if any.
#[derive(Debug, Default)]
pub struct SessionController {
    state: Option<SessionState>,
    ended: bool,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session from a targets file, writing into `results_root`.
    pub fn start_session(
        &mut self,
        targets_file: &Path,
        results_root: &Path,
        config: SessionConfig,
    ) -> Result<NavOutcome> {
        let catalog = TargetCatalog::load(targets_file)?;
        let results = ResultsDir::prepare_new(results_root, targets_file)?;
        tracing::info!(
            targets = catalog.len(),
            folder = %results.root().display(),
            "session started"
        );
        self.launch(SessionState::new(catalog, results, config, 1))
    }

    /// Continue the session recorded in `results_root`.
    pub fn resume_session(&mut self, results_root: &Path, config: SessionConfig) -> Result<NavOutcome> {
        let previous = PreviousSession::load(results_root)?;
        tracing::info!(
            trials = previous.trials,
            next_trial_id = previous.next_trial_id,
            folder = %previous.results.root().display(),
            "session resumed"
        );
        self.launch(SessionState::new(
            previous.catalog,
            previous.results,
            config,
            previous.next_trial_id,
        ))
    }

    /// The ledger is left alone until the first trial closes.
    fn launch(&mut self, mut state: SessionState) -> Result<NavOutcome> {
        if let Some(previous) = self.state.take() {
            tracing::warn!("replacing a live session");
            previous.finish()?;
        }
        let outcome = state.navigate(&NavCommand::Next)?;
        self.state = Some(state);
        self.ended = false;
        Ok(outcome)
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            Some(state) => state.phase(),
            None if self.ended => Phase::SessionEnded,
            None => Phase::Idle,
        }
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn current_target(&self) -> Option<&Target> {
        self.state.as_ref().and_then(SessionState::current_target)
    }

    pub fn stats(&self) -> Option<SessionStats> {
        self.state.as_ref().map(SessionState::stats)
    }

    fn live(&mut self, operation: &'static str) -> Result<&mut SessionState> {
        let phase = self.phase();
        self.state
            .as_mut()
            .ok_or(RecorderError::InvalidState { operation, phase })
    }

    pub fn begin_trial(&mut self) -> Result<()> {
        self.live("begin_trial")?.begin_trial()
    }

    pub fn play(&mut self, player: &mut dyn SoundPlayer) -> Result<()> {
        self.live("play")?.play(player)
    }

    pub fn select_outcome(&mut self, outcome: Outcome) -> Result<()> {
        self.live("select_outcome")?.select_outcome(outcome)
    }

    pub fn clear_outcome(&mut self) -> Result<()> {
        self.live("clear_outcome")?.clear_outcome()
    }

    pub fn close_trial(&mut self, rc_code: &str) -> Result<Trial> {
        self.live("close_trial")?.close_trial(rc_code)
    }

    pub fn reset_trial(&mut self) -> Result<()> {
        self.live("reset_trial")?.reset_trial()
    }

    pub fn rotate(&mut self) -> Result<Rotation> {
        Ok(self.live("rotate")?.rotate())
    }

    pub fn add_error_tag(&mut self, tag: &str) -> Result<bool> {
        Ok(self.live("add_error_tag")?.add_error_tag(tag))
    }

    pub fn navigate(&mut self, command: &NavCommand) -> Result<NavOutcome> {
        self.live("navigate")?.navigate(command)
    }

    /// One pen packet. Without a live session this does nothing.
    pub fn sample(&mut self, packet: Packet) -> Result<()> {
        match self.state.as_mut() {
            Some(state) => state.sample(packet),
            None => Ok(()),
        }
    }

    /// Sampling tick: poll the source once.
    pub fn on_tick(&mut self, source: &mut dyn SampleSource) -> Result<()> {
        if self.state.is_none() {
            return Ok(());
        }
        match source.poll() {
            Some(packet) => self.sample(packet),
            None => Ok(()),
        }
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.state.as_mut().and_then(SessionState::take_notice)
    }

    /// Close any open trial, save, and drop the session.
    pub fn end_session(&mut self) -> Result<SessionStats> {
        let Some(state) = self.state.take() else {
            return Err(RecorderError::InvalidState {
                operation: "end_session",
                phase: self.phase(),
            });
        };
        let folder = state.results().root().to_path_buf();
        self.ended = true;
        let stats = state.finish()?;
        tracing::info!(
            folder = %folder.display(),
            ok = stats.completed_ok,
            errors = stats.completed_error,
            remaining = stats.remaining,
            "session ended"
        );
        Ok(stats)
    }
}
