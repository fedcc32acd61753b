use crate::error::Result;
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

/// Full-scale pressure reported by Wintab-style tablets
pub const RAW_PRESSURE_MAX: u32 = 32767;

/// One pen packet, pressure already normalized to 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub x: i32,
    pub y: i32,
    pub pressure: u8,
}

impl Packet {
    pub fn new(x: i32, y: i32, pressure: u8) -> Self {
        Self { x, y, pressure }
    }
}

pub fn normalize_pressure(raw: u32, max: u32) -> u8 {
    if max == 0 {
        return 0;
    }
    (u64::from(raw.min(max)) * 100 / u64::from(max)) as u8
}

/// Something that can be polled for the latest pen packet.
/// `None` means no packet arrived since the last poll.
pub trait SampleSource {
    fn poll(&mut self) -> Option<Packet>;
}

/// No tablet attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSource;

impl SampleSource for NullSource {
    fn poll(&mut self) -> Option<Packet> {
        None
    }
}

/// Hands out a fixed sequence of packets, one per poll
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    packets: VecDeque<Packet>,
}

impl ScriptedSource {
    pub fn new<I: IntoIterator<Item = Packet>>(packets: I) -> Self {
        Self {
            packets: packets.into_iter().collect(),
        }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl SampleSource for ScriptedSource {
    fn poll(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }
}

/// Replays a recorded `x,y,raw_pressure` CSV (no header) as if it came from
/// the tablet.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    inner: ScriptedSource,
}

impl ReplaySource {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(File::open(path.as_ref())?);
        let mut packets = Vec::new();
        for record in rdr.deserialize() {
            let (x, y, raw): (i32, i32, u32) = record?;
            packets.push(Packet::new(x, y, normalize_pressure(raw, RAW_PRESSURE_MAX)));
        }
        tracing::info!(
            file = %path.as_ref().display(),
            packets = packets.len(),
            "replay loaded"
        );
        Ok(Self {
            inner: ScriptedSource::new(packets),
        })
    }
}

impl SampleSource for ReplaySource {
    fn poll(&mut self) -> Option<Packet> {
        self.inner.poll()
    }
}
