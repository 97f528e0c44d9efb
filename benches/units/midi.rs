//! Parsing a synthetic multi-track file.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput};
use oscillate::io::midi;

/// `tracks` tracks of `notes` quarter notes each, running status throughout.
fn song(tracks: u16, notes: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&tracks.to_be_bytes());
    bytes.extend_from_slice(&480u16.to_be_bytes());

    for t in 0..tracks {
        let mut body = vec![0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20];
        body.extend_from_slice(&[0x00, 0x90]);
        for i in 0..notes {
            let note = 36 + ((i + t as usize * 7) % 48) as u8;
            body.extend_from_slice(&[note, 100, 0x83, 0x60, note, 0x00, 0x00]);
        }
        body.truncate(body.len() - 1);
        body.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
    }
    bytes
}

pub fn bench_midi(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/midi");

    for (tracks, notes) in [(1, 256), (8, 256), (16, 1024)] {
        let bytes = song(tracks, notes);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("parse", format!("{tracks}x{notes}")),
            &bytes,
            |b, bytes| b.iter(|| midi::parse(black_box(bytes))),
        );
    }

    group.finish();
}
