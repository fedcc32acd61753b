use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Tablet polling period
pub const SAMPLE_POLL_MS: u64 = 5;

/// What the console loop reacts to
#[derive(Clone, Debug)]
pub enum RecorderEvent {
    Key(KeyEvent),
    Resize,
    /// Sampling period elapsed without operator input
    Tick,
}

/// Source of operator events (keyboard, resize)
pub trait RecorderEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<RecorderEvent, RecvTimeoutError>;
}

/// Terminal input read on a background thread
pub struct CrosstermEventSource {
    rx: Receiver<RecorderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let ev = match event::read() {
                // Windows reports releases as well
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    RecorderEvent::Key(key)
                }
                Ok(CtEvent::Resize(_, _)) => RecorderEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "terminal input closed");
                    break;
                }
            };
            if tx.send(ev).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RecorderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The tablet sampling cadence
    pub fn sampling() -> Self {
        Self::new(Duration::from_millis(SAMPLE_POLL_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for headless runs
pub struct TestEventSource {
    rx: Receiver<RecorderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<RecorderEvent>) -> Self {
        Self { rx }
    }
}

impl RecorderEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RecorderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Advances the console one event or tick at a time
pub struct Runner<E: RecorderEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: RecorderEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to one tick interval; Tick when nothing arrived
    pub fn step(&self) -> RecorderEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                RecorderEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crossterm::event::{KeyCode, KeyModifiers};

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));

        assert_matches!(runner.step(), RecorderEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(RecorderEvent::Key(KeyEvent::new(KeyCode::Char('n'), KeyModifiers::NONE)))
            .unwrap();
        tx.send(RecorderEvent::Resize).unwrap();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::sampling());

        assert_matches!(runner.step(), RecorderEvent::Key(k) if k.code == KeyCode::Char('n'));
        assert_matches!(runner.step(), RecorderEvent::Resize);
        assert_matches!(runner.step(), RecorderEvent::Tick);
    }

    #[test]
    fn disconnected_source_keeps_ticking() {
        let (tx, rx) = mpsc::channel::<RecorderEvent>();
        drop(tx);
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::sampling());
        assert_matches!(runner.step(), RecorderEvent::Tick);
    }

    #[test]
    fn sampling_ticker_uses_poll_period() {
        assert_eq!(
            FixedTicker::sampling().interval(),
            Duration::from_millis(SAMPLE_POLL_MS)
        );
    }
}
