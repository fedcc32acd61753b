use crate::error::Result;
use crate::results::write_atomic;
use chrono::{NaiveDateTime, NaiveTime};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRAJECTORY_EXTENSION: &str = "csv";

/// A single pen packet as persisted: pressure normalized to 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub x: i32,
    pub y: i32,
    pub pressure: u8,
}

impl Sample {
    pub fn new(x: i32, y: i32, pressure: u8) -> Self {
        Self { x, y, pressure }
    }
}

/// Size of the acquisition surface in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub width: i32,
    pub height: i32,
}

impl Screen {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.width / 2, self.height / 2)
    }
}

/// View rotation, applied to the recorded points when a trial closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum Rotation {
    #[default]
    #[strum(serialize = "0°")]
    Deg0,
    #[strum(serialize = "90°")]
    Deg90,
    #[strum(serialize = "180°")]
    Deg180,
    #[strum(serialize = "270°")]
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Another quarter turn clockwise
    pub fn turned(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    /// Whether closing a trial rewrites the file. 180° leaves it as recorded.
    pub fn rewrites_points(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Clockwise rotation in screen coordinates (y grows downwards)
    pub fn apply(self, x: i32, y: i32, (cx, cy): (i32, i32)) -> (i32, i32) {
        let (dx, dy) = (x - cx, y - cy);
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (cx - dy, cy + dx),
            Rotation::Deg180 => (cx - dx, cy - dy),
            Rotation::Deg270 => (cx + dy, cy - dx),
        }
    }
}

/// Metadata written as the first line of every trajectory file
#[derive(Debug, Clone)]
pub struct TrajectoryHeader {
    pub target_id: String,
    pub attempt: u32,
    pub session_start: NaiveTime,
    pub created: NaiveDateTime,
    pub screen: Screen,
}

impl TrajectoryHeader {
    fn to_line(&self) -> String {
        format!(
            "# target={} trial={} session_start={} created={} screen={}x{}",
            self.target_id,
            self.attempt,
            self.session_start.format("%H:%M:%S"),
            self.created.format("%Y-%m-%d %H:%M:%S"),
            self.screen.width,
            self.screen.height,
        )
    }
}

/// The open artifact of the trial being recorded
#[derive(Debug)]
pub struct TrajectoryRecorder {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    samples: usize,
}

impl TrajectoryRecorder {
    pub fn open(dir: &Path, name: &str, header: &TrajectoryHeader) -> Result<Self> {
        let path = dir.join(format!("{name}.{TRAJECTORY_EXTENSION}"));
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", header.to_line())?;
        tracing::debug!(file = %path.display(), "trajectory opened");
        Ok(Self {
            name: name.to_string(),
            path,
            writer,
            samples: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Raw append; ranges are the sampling layer's business.
    pub fn append(&mut self, sample: Sample) -> Result<()> {
        writeln!(self.writer, "{},{},{}", sample.x, sample.y, sample.pressure)?;
        self.samples += 1;
        Ok(())
    }

    /// Finish the file, rotating every point about `center` when the rotation
    /// calls for it. Returns the artifact path.
    pub fn close_with_rotation(mut self, rotation: Rotation, center: (i32, i32)) -> Result<PathBuf> {
        self.writer.flush()?;
        drop(self.writer);

        if rotation.rewrites_points() {
            let (header, samples) = read_trajectory(&self.path)?;
            write_atomic(&self.path, |out| {
                writeln!(out, "{header}")?;
                for s in &samples {
                    let (x, y) = rotation.apply(s.x, s.y, center);
                    writeln!(out, "{},{},{}", x, y, s.pressure)?;
                }
                Ok(())
            })?;
            tracing::debug!(file = %self.path.display(), %rotation, "trajectory rotated");
        }
        Ok(self.path)
    }

    /// Close and delete the artifact
    pub fn discard(self) -> Result<()> {
        let path = self.path;
        drop(self.writer);
        fs::remove_file(&path)?;
        tracing::info!(file = %path.display(), "trajectory discarded");
        Ok(())
    }
}

/// Header line and samples of a closed trajectory file
pub fn read_trajectory(path: &Path) -> Result<(String, Vec<Sample>)> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default().to_string();
    let body = lines.collect::<Vec<_>>().join("\n");

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(body.as_bytes());
    let mut samples = Vec::new();
    for record in rdr.deserialize() {
        let (x, y, pressure): (i32, i32, u8) = record?;
        samples.push(Sample::new(x, y, pressure));
    }
    Ok((header, samples))
}
