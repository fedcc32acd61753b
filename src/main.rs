mod ui;

use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::EnvFilter;
use webbrowser::Browser;
use writracker::{
    config::{parse_error_tags, parse_screen, Config, ConfigStore, FileConfigStore},
    controller::{summarize, SessionController},
    navigation::{NavCommand, NavOutcome},
    results::LOG_FILE,
    runtime::{CrosstermEventSource, FixedTicker, RecorderEvent, Runner},
    session::{Outcome, SessionConfig, SessionStats},
    sound::SilentPlayer,
    source::{NullSource, ReplaySource, SampleSource},
};

const HELP_URL: &str = "http://mathinklab.org/writracker-recorder/";

/// Sampling ticks between two redraws (~100ms)
const REDRAW_EVERY_TICKS: u32 = 20;

/// handwriting acquisition session recorder
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Presents writing targets to a participant, records pen samples of every attempt into trajectory files and keeps a resumable trial log."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// start a new session from a targets file
    Start {
        /// CSV with target_id, target and optional sound_file_name columns
        #[clap(short, long)]
        targets: PathBuf,

        /// folder receiving trials.csv and the trajectory files
        #[clap(short, long)]
        results: PathBuf,

        #[clap(flatten)]
        options: SessionOptions,
    },
    /// continue a session from its results folder
    Resume {
        #[clap(short, long)]
        results: PathBuf,

        #[clap(flatten)]
        options: SessionOptions,
    },
    /// print completion counts of a results folder
    Summary {
        #[clap(short, long)]
        results: PathBuf,

        /// count error targets as remaining
        #[clap(long, overrides_with = "no_retry_errors")]
        retry_errors: bool,

        /// count error targets as done
        #[clap(long, overrides_with = "retry_errors")]
        no_retry_errors: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct SessionOptions {
    /// do not offer error targets again after the last target
    #[clap(long)]
    no_retry_errors: bool,

    /// comma separated error tags, e.g. "Spelling,Motor"
    #[clap(long)]
    error_tags: Option<String>,

    /// folder with the targets' sound files; trials then start with space
    #[clap(long)]
    sounds: Option<PathBuf>,

    /// tablet screen geometry used to mirror and rotate samples
    #[clap(long, value_parser = parse_screen)]
    screen: Option<(i32, i32)>,

    /// feed pen packets from an x,y,raw_pressure CSV instead of a tablet
    #[clap(long)]
    replay: Option<PathBuf>,
}

impl SessionOptions {
    /// Flags win over the stored config and are saved back
    fn apply(&self, cfg: &mut Config) {
        if self.no_retry_errors {
            cfg.cyclic_remaining_targets = false;
        }
        if let Some(tags) = &self.error_tags {
            cfg.error_tags = parse_error_tags(tags);
        }
        if let Some(dir) = &self.sounds {
            cfg.sounds_dir = Some(dir.clone());
        }
        if let Some((w, h)) = self.screen {
            cfg.screen_width = w;
            cfg.screen_height = h;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Command,
    Goto(String),
    NewTag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub controller: SessionController,
    pub source: Box<dyn SampleSource>,
    pub player: SilentPlayer,
    pub input: InputMode,
    pub message: Option<String>,
    pub final_stats: Option<SessionStats>,
}

impl App {
    pub fn new(controller: SessionController, source: Box<dyn SampleSource>) -> Self {
        Self {
            controller,
            source,
            player: SilentPlayer,
            input: InputMode::Command,
            message: None,
            final_stats: None,
        }
    }

    fn report<T>(&mut self, result: writracker::error::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "operation refused");
                self.message = Some(e.to_string());
                None
            }
        }
    }

    fn navigate(&mut self, command: NavCommand) {
        let result = self.controller.navigate(&command);
        if let Some(outcome) = self.report(result) {
            self.message = describe(outcome);
        }
    }

    fn cycle_error_tag(&mut self) {
        let next = self.controller.state().and_then(|state| {
            let tags = &state.config().error_tags;
            if tags.is_empty() {
                return None;
            }
            let index = match state.pending_outcome() {
                Some(Outcome::Error(tag)) => tags
                    .iter()
                    .position(|t| t == tag)
                    .map_or(0, |i| (i + 1) % tags.len()),
                _ => 0,
            };
            Some(tags[index].clone())
        });
        if let Some(tag) = next {
            let result = self.controller.select_outcome(Outcome::Error(tag));
            self.report(result);
        }
    }

    fn end_session(&mut self) {
        if self.controller.state().is_none() {
            return;
        }
        let result = self.controller.end_session();
        if let Some(stats) = self.report(result) {
            self.message = Some(format!("Session ended. {}", stats_line(&stats)));
            self.final_stats = Some(stats);
        }
    }

    pub fn on_tick(&mut self) {
        let result = self.controller.on_tick(self.source.as_mut());
        self.report(result);
        if let Some(notice) = self.controller.take_notice() {
            self.message = Some(notice);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.end_session();
            return Flow::Quit;
        }

        match std::mem::replace(&mut self.input, InputMode::Command) {
            InputMode::Goto(buf) => {
                match text_input(buf, key.code) {
                    TextInput::Editing(buf) => self.input = InputMode::Goto(buf),
                    TextInput::Done(id) => self.navigate(NavCommand::Goto(id.trim().to_string())),
                    TextInput::Cancelled => {}
                }
                return Flow::Continue;
            }
            InputMode::NewTag(buf) => {
                match text_input(buf, key.code) {
                    TextInput::Editing(buf) => self.input = InputMode::NewTag(buf),
                    TextInput::Done(tag) => {
                        let result = self.controller.add_error_tag(&tag);
                        if let Some(added) = self.report(result) {
                            self.message = Some(if added {
                                format!("Error tag '{}' added", tag.trim())
                            } else {
                                "Tag is empty or already exists".into()
                            });
                        }
                    }
                    TextInput::Cancelled => {}
                }
                return Flow::Continue;
            }
            InputMode::Command => {}
        }

        self.message = None;
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.end_session();
                return Flow::Quit;
            }
            KeyCode::Right | KeyCode::Char('n') => self.navigate(NavCommand::Next),
            KeyCode::Left | KeyCode::Char('p') => self.navigate(NavCommand::Prev),
            KeyCode::Char('g') => self.input = InputMode::Goto(String::new()),
            KeyCode::Char('a') => self.input = InputMode::NewTag(String::new()),
            KeyCode::Char('o') => {
                let result = self.controller.select_outcome(Outcome::Ok);
                self.report(result);
            }
            KeyCode::Char('e') => self.cycle_error_tag(),
            KeyCode::Char('c') => {
                let result = self.controller.clear_outcome();
                self.report(result);
            }
            KeyCode::Char(' ') => {
                let result = self.controller.play(&mut self.player);
                self.report(result);
            }
            KeyCode::Char('r') => {
                let result = self.controller.reset_trial();
                self.report(result);
            }
            KeyCode::Char('t') => {
                let result = self.controller.rotate();
                if let Some(rotation) = self.report(result) {
                    self.message = Some(format!("Rotation set to {rotation}"));
                }
            }
            KeyCode::Char('h') => {
                if Browser::is_available() {
                    webbrowser::open(HELP_URL).unwrap_or_default();
                } else {
                    self.message = Some(format!("Help: {HELP_URL}"));
                }
            }
            KeyCode::Char('x') => self.end_session(),
            _ => {}
        }
        Flow::Continue
    }
}

fn describe(outcome: NavOutcome) -> Option<String> {
    match outcome {
        NavOutcome::Moved(_) => None,
        NavOutcome::Unchanged => Some("Already at the first target".into()),
        NavOutcome::EndOfTargets => Some("End of targets list. Use prev or goto to continue.".into()),
        NavOutcome::AllTargetsOk => Some("All targets are marked OK".into()),
        NavOutcome::OnlyCurrentRemaining => Some("This is the only target not marked OK".into()),
    }
}

enum TextInput {
    Editing(String),
    Done(String),
    Cancelled,
}

fn text_input(mut buf: String, code: KeyCode) -> TextInput {
    match code {
        KeyCode::Enter => TextInput::Done(buf),
        KeyCode::Esc => TextInput::Cancelled,
        KeyCode::Backspace => {
            buf.pop();
            TextInput::Editing(buf)
        }
        KeyCode::Char(c) => {
            buf.push(c);
            TextInput::Editing(buf)
        }
        _ => TextInput::Editing(buf),
    }
}

pub fn stats_line(stats: &SessionStats) -> String {
    format!(
        "{} targets: {} OK, {} with errors, {} remaining",
        stats.total_targets, stats.completed_ok, stats.completed_error, stats.remaining
    )
}

/// Log into the results folder so the console stays clean
fn init_logging(results: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(results)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(results.join(LOG_FILE))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let (results, options) = match &cli.command {
        Command::Summary {
            results,
            retry_errors,
            no_retry_errors,
        } => {
            let cyclic = if *no_retry_errors {
                false
            } else if *retry_errors {
                true
            } else {
                FileConfigStore::new().load().cyclic_remaining_targets
            };
            let stats = summarize(results, cyclic)?;
            println!("{}", stats_line(&stats));
            return Ok(());
        }
        Command::Start {
            results, options, ..
        } => (results.clone(), options.clone()),
        Command::Resume { results, options } => {
            if !results.is_dir() {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::ValueValidation,
                    format!("results folder {} does not exist", results.display()),
                )
                .exit();
            }
            (results.clone(), options.clone())
        }
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging(&results)?;

    let store = FileConfigStore::new();
    let mut config = store.load();
    options.apply(&mut config);
    if let Err(e) = store.save(&config) {
        tracing::warn!(file = %store.path().display(), error = %e, "config not saved");
    }

    let source: Box<dyn SampleSource> = match &options.replay {
        Some(path) => Box::new(ReplaySource::load(path)?),
        None => Box::new(NullSource),
    };

    let mut controller = SessionController::new();
    let session_config = SessionConfig::from(&config);
    let first = match &cli.command {
        Command::Start { targets, .. } => {
            controller.start_session(targets, &results, session_config)?
        }
        _ => controller.resume_session(&results, session_config)?,
    };

    let mut app = App::new(controller, source);
    app.message = describe(first);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let run = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    run?;
    if let Some(stats) = &app.final_stats {
        println!("{}", stats_line(stats));
    }
    Ok(())
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::sampling());
    let mut ticks: u32 = 0;

    terminal.draw(|f| ui(app, f))?;
    loop {
        match runner.step() {
            RecorderEvent::Tick => {
                app.on_tick();
                ticks = ticks.wrapping_add(1);
                if ticks % REDRAW_EVERY_TICKS == 0 {
                    terminal.draw(|f| ui(app, f))?;
                }
            }
            RecorderEvent::Resize => {
                terminal.draw(|f| ui(app, f))?;
            }
            RecorderEvent::Key(key) => {
                if app.handle_key(key) == Flow::Quit {
                    break;
                }
                terminal.draw(|f| ui(app, f))?;
            }
        }
    }
    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
