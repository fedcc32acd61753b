use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot play {file}: {reason}")]
pub struct SoundError {
    pub file: String,
    pub reason: String,
}

/// Audio output. Playback itself lives outside the recorder; it only needs
/// the clip length for the trial log.
pub trait SoundPlayer {
    /// Start playing `file`, returning its length in seconds when the player
    /// can measure it.
    fn play(&mut self, file: &Path) -> Result<Option<f64>, SoundError>;
}

/// Player for setups without audio output: checks the file exists. The
/// length stays unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl SoundPlayer for SilentPlayer {
    fn play(&mut self, file: &Path) -> Result<Option<f64>, SoundError> {
        if !file.is_file() {
            return Err(SoundError {
                file: file.display().to_string(),
                reason: "file not found".into(),
            });
        }
        tracing::debug!(file = %file.display(), "sound playback skipped, no audio output");
        Ok(None)
    }
}

/// Lengths are logged with two decimals
pub fn round_length(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
