/*
Standard MIDI Files
===================

A file is a header chunk followed by track chunks, all big-endian:

    "MThd" len:u32 format:u16 tracks:u16 division:u16
    "MTrk" len:u32 <delta-time event>*
    "MTrk" len:u32 <delta-time event>*
    ...

Delta times are variable-length quantities: seven bits per byte, high bit
set on every byte but the last, at most four bytes.

Event statuses
--------------

    0x8n note off      2 data bytes   emitted
    0x9n note on       2 data bytes   emitted (velocity 0 means note off)
    0xAn 0xBn 0xEn     2 data bytes   skipped
    0xCn 0xDn          1 data byte    skipped
    0xF0 0xF7 sysex    vlq length     skipped
    0xFF meta          type + vlq     set-tempo (0x51) feeds the tempo map

A data byte where a status byte is expected reuses the last channel status
(running status). System statuses never become the running status.

Timing
------

Ticks become seconds through the tempo map built from every set-tempo event
in the file, defaulting to 500,000 us per quarter note (120 bpm):

    seconds = ticks * tempo_us / (ticks_per_quarter * 1_000_000)

applied piecewise between tempo changes.

A broken header or chunk prelude rejects the whole file. A fault inside a
track body only cuts that track short; events read before the fault are
kept and the track index is reported in `truncated_tracks`.
*/

use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MidiError;

/// Microseconds per quarter note when a file sets no tempo.
pub const DEFAULT_TEMPO: u32 = 500_000;

const HEADER_TAG: &[u8; 4] = b"MThd";
const TRACK_TAG: &[u8; 4] = b"MTrk";
const HEADER_FIELDS: usize = 6;
const MAX_VLQ_BYTES: usize = 4;

const META: u8 = 0xFF;
const META_END_OF_TRACK: u8 = 0x2F;
const META_SET_TEMPO: u8 = 0x51;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
}

impl fmt::Display for MidiEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            MidiEventKind::NoteOn => "note_on",
            MidiEventKind::NoteOff => "note_off",
        })
    }
}

/// One note event, placed in time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Seconds from the start of the file.
    pub timestamp: f64,
    pub kind: MidiEventKind,
    /// MIDI note number (0-127)
    pub note: u8,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Index of the track chunk the event came from
    pub track: usize,
}

impl MidiEvent {
    pub fn note_on(timestamp: f64, note: u8, velocity: u8) -> Self {
        Self {
            timestamp,
            kind: MidiEventKind::NoteOn,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
            channel: 0,
            track: 0,
        }
    }

    pub fn note_off(timestamp: f64, note: u8) -> Self {
        Self {
            timestamp,
            kind: MidiEventKind::NoteOff,
            note: note & 0x7F,
            velocity: 0,
            channel: 0,
            track: 0,
        }
    }

    pub fn frequency(&self) -> f32 {
        note_to_frequency(self.note)
    }
}

/// A parsed file: header fields plus every note event, sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    pub format: u16,
    pub track_count: u16,
    pub ticks_per_quarter: u16,
    pub events: Vec<MidiEvent>,
    /// Tracks whose body ended in a fault.
    pub truncated_tracks: Vec<usize>,
    /// Timestamp of the last event in seconds.
    pub duration: f64,
}

/// Equal-tempered frequency of a MIDI note, A4 (69) = 440 Hz.
pub fn note_to_frequency(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

/// Read and parse a file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<MidiFile, MidiError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let file = parse(&bytes)?;
    info!(
        path = %path.display(),
        format = file.format,
        tracks = file.track_count,
        events = file.events.len(),
        duration = file.duration,
        "loaded MIDI file"
    );
    Ok(file)
}

/// Parse a complete Standard MIDI File held in memory.
pub fn parse(bytes: &[u8]) -> Result<MidiFile, MidiError> {
    let mut reader = Reader::new(bytes);

    let tag = reader.take(4).ok_or(MidiError::Truncated { offset: 0 })?;
    if tag != HEADER_TAG {
        return Err(MidiError::BadHeader);
    }
    let header_len = reader.u32_be().ok_or(MidiError::Truncated { offset: 4 })? as usize;
    let header = reader
        .take(header_len)
        .filter(|body| body.len() >= HEADER_FIELDS)
        .ok_or(MidiError::Truncated { offset: 8 })?;

    let format = u16::from_be_bytes([header[0], header[1]]);
    let track_count = u16::from_be_bytes([header[2], header[3]]);
    // Top bit selects SMPTE timing, which is treated as ticks per quarter.
    let ticks_per_quarter = u16::from_be_bytes([header[4], header[5]]) & 0x7FFF;
    if ticks_per_quarter == 0 {
        return Err(MidiError::InvalidDivision);
    }

    let mut notes = Vec::new();
    let mut tempos = Vec::new();
    let mut truncated_tracks = Vec::new();

    for index in 0..track_count as usize {
        let offset = reader.position();
        let tag = reader.take(4).ok_or(MidiError::Truncated { offset })?;
        if tag != TRACK_TAG {
            return Err(MidiError::BadTrackTag { index });
        }
        let len = reader
            .u32_be()
            .ok_or(MidiError::Truncated { offset: offset + 4 })? as usize;

        // A body shorter than declared is read as far as it goes.
        let available = len.min(reader.remaining());
        let body = reader.take(available).unwrap_or_default();

        let mut track = TrackReader::new(body, index);
        let fault = match track.run(&mut notes, &mut tempos) {
            Err(fault) => Some(fault),
            Ok(()) if available < len => Some(TrackFault::ShortBody { declared: len, found: available }),
            Ok(()) => None,
        };
        if let Some(fault) = fault {
            warn!(track = index, %fault, "MIDI track cut short");
            truncated_tracks.push(index);
        }
    }

    let tempo_map = TempoMap::new(tempos, ticks_per_quarter);
    let mut events: Vec<MidiEvent> = notes
        .into_iter()
        .map(|raw| MidiEvent {
            timestamp: tempo_map.seconds(raw.tick),
            kind: raw.kind,
            note: raw.note,
            velocity: raw.velocity,
            channel: raw.channel,
            track: raw.track,
        })
        .collect();
    // Stable: ties keep track order, then file order within a track.
    events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let duration = events.last().map_or(0.0, |event| event.timestamp);
    Ok(MidiFile {
        format,
        track_count,
        ticks_per_quarter,
        events,
        truncated_tracks,
        duration,
    })
}

/// Big-endian byte cursor.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn u8(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn u32_be(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Variable-length quantity of at most four bytes.
    fn vlq(&mut self) -> Result<u32, TrackFault> {
        let mut value = 0u32;
        for _ in 0..MAX_VLQ_BYTES {
            let byte = self.u8().ok_or(TrackFault::UnexpectedEnd)?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(TrackFault::LongQuantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackFault {
    UnexpectedEnd,
    LongQuantity,
    NoRunningStatus,
    UndefinedStatus(u8),
    ShortBody { declared: usize, found: usize },
}

impl fmt::Display for TrackFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackFault::UnexpectedEnd => f.write_str("event runs past the end of the track"),
            TrackFault::LongQuantity => f.write_str("variable-length quantity longer than 4 bytes"),
            TrackFault::NoRunningStatus => f.write_str("data byte with no running status"),
            TrackFault::UndefinedStatus(status) => write!(f, "undefined status byte {status:#04x}"),
            TrackFault::ShortBody { declared, found } => {
                write!(f, "declared {declared} bytes but only {found} present")
            }
        }
    }
}

/// A note event still in ticks.
struct RawNote {
    tick: u64,
    kind: MidiEventKind,
    note: u8,
    velocity: u8,
    channel: u8,
    track: usize,
}

#[derive(Debug, Clone, Copy)]
struct TempoChange {
    tick: u64,
    tempo: u32,
}

struct TrackReader<'a> {
    reader: Reader<'a>,
    index: usize,
    tick: u64,
    running_status: Option<u8>,
}

impl<'a> TrackReader<'a> {
    fn new(body: &'a [u8], index: usize) -> Self {
        Self {
            reader: Reader::new(body),
            index,
            tick: 0,
            running_status: None,
        }
    }

    /// Read events until the body ends, an end-of-track meta event, or a
    /// fault. Everything read before a fault is already pushed.
    fn run(
        &mut self,
        notes: &mut Vec<RawNote>,
        tempos: &mut Vec<TempoChange>,
    ) -> Result<(), TrackFault> {
        while !self.reader.is_empty() {
            self.tick += u64::from(self.reader.vlq()?);

            let byte = self.reader.peek().ok_or(TrackFault::UnexpectedEnd)?;
            let status = if byte & 0x80 != 0 {
                self.reader.pos += 1;
                byte
            } else {
                self.running_status.ok_or(TrackFault::NoRunningStatus)?
            };

            match status {
                META => {
                    let kind = self.reader.u8().ok_or(TrackFault::UnexpectedEnd)?;
                    let len = self.reader.vlq()? as usize;
                    let data = self.reader.take(len).ok_or(TrackFault::UnexpectedEnd)?;
                    match (kind, data) {
                        (META_END_OF_TRACK, _) => return Ok(()),
                        (META_SET_TEMPO, &[a, b, c]) => {
                            let tempo = u32::from_be_bytes([0, a, b, c]);
                            if tempo > 0 {
                                tempos.push(TempoChange {
                                    tick: self.tick,
                                    tempo,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                SYSEX | SYSEX_ESCAPE => {
                    let len = self.reader.vlq()? as usize;
                    self.reader.take(len).ok_or(TrackFault::UnexpectedEnd)?;
                }
                0xF1..=0xFE => return Err(TrackFault::UndefinedStatus(status)),
                _ => {
                    self.running_status = Some(status);
                    self.channel_event(status, notes)?;
                }
            }
        }
        Ok(())
    }

    fn channel_event(&mut self, status: u8, notes: &mut Vec<RawNote>) -> Result<(), TrackFault> {
        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 | 0x90 => {
                let data = self.reader.take(2).ok_or(TrackFault::UnexpectedEnd)?;
                let (note, velocity) = (data[0] & 0x7F, data[1] & 0x7F);
                let kind = if status & 0xF0 == 0x90 && velocity > 0 {
                    MidiEventKind::NoteOn
                } else {
                    MidiEventKind::NoteOff
                };
                notes.push(RawNote {
                    tick: self.tick,
                    kind,
                    note,
                    velocity,
                    channel,
                    track: self.index,
                });
            }
            0xC0 | 0xD0 => {
                self.reader.take(1).ok_or(TrackFault::UnexpectedEnd)?;
            }
            _ => {
                self.reader.take(2).ok_or(TrackFault::UnexpectedEnd)?;
            }
        }
        Ok(())
    }
}

/// Piecewise tick-to-seconds conversion.
struct TempoMap {
    /// (start tick, seconds at start tick, tempo from there on)
    segments: Vec<(u64, f64, u32)>,
    ticks_per_quarter: f64,
}

impl TempoMap {
    fn new(mut changes: Vec<TempoChange>, ticks_per_quarter: u16) -> Self {
        changes.sort_by_key(|change| change.tick);
        let ticks_per_quarter = f64::from(ticks_per_quarter);

        let mut segments = vec![(0, 0.0, DEFAULT_TEMPO)];
        for change in changes {
            let Some(&(start, seconds, tempo)) = segments.last() else {
                continue;
            };
            if change.tick == start {
                // Later changes at the same tick win.
                if let Some(last) = segments.last_mut() {
                    last.2 = change.tempo;
                }
                continue;
            }
            let at = seconds + span(change.tick - start, tempo, ticks_per_quarter);
            segments.push((change.tick, at, change.tempo));
        }

        Self {
            segments,
            ticks_per_quarter,
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let index = self.segments.partition_point(|&(start, _, _)| start <= tick);
        let (start, seconds, tempo) = self.segments[index.saturating_sub(1)];
        seconds + span(tick - start, tempo, self.ticks_per_quarter)
    }
}

fn span(ticks: u64, tempo: u32, ticks_per_quarter: f64) -> f64 {
    ticks as f64 * f64::from(tempo) / (ticks_per_quarter * 1_000_000.0)
}
