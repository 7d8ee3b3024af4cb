/*
    FluxRip
    https://github.com/dbalsom/fluxrip

    Copyright 2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    tests/stream.rs

    Stream parsing, compaction, block segmentation and hard-sector
    resolution.
*/
mod common;

use crate::common::StreamBuilder;
use fluxrip::{FluxStream, KFX_DEFAULT_SCK};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Index-clock ticks per hard sector for hc=16 at the default index clock
/// (about 0.0115s per sector).
const SECTOR_ICK: u32 = 34539;

const KF_HC16: &str = "hc=16, sck=24027428.5714285, ick=3003428.5714285625";

#[test]
fn test_soft_sector_single_block() {
    init();
    let buf = StreamBuilder::new()
        .kf_info("sck=24027428.5714285")
        .index(0, 0)
        .flux_run(48, 2048)
        .index(98304, 600)
        .eof()
        .build();

    let stream = FluxStream::load(buf).unwrap();
    assert_eq!(stream.block_ct(), 1);

    let mut reader = stream.seek_block(0).unwrap();
    assert_eq!(reader.phys_sector(), 0);

    let mut count = 0;
    let mut total: u64 = 0;
    while let Some(ns) = reader.next_flux() {
        assert!((1997..=1999).contains(&ns), "interval {} out of range", ns);
        count += 1;
        total += ns as u64;
    }
    assert_eq!(count, 2048);

    // The interval sum matches the sample total converted in one step,
    // with no accumulated rounding.
    let expected = (2048.0 * 48.0 * 1.0e9 / KFX_DEFAULT_SCK + 0.5) as u64;
    assert_eq!(total, expected);
}

#[test]
fn test_block_boundaries_contiguous() {
    init();
    let mut b = StreamBuilder::new();
    b.index(0, 0);
    for rev in 1..=4u32 {
        b.flux_run(48, 500);
        b.index(rev * 24000, rev * 600_000);
    }
    b.eof();
    let stream = FluxStream::load(b.build()).unwrap();

    let blocks = stream.blocks();
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert_eq!(stream.block_ct(), 4);
}

#[test]
fn test_load_is_idempotent() {
    init();
    let buf = StreamBuilder::new()
        .kf_info(KF_HC16)
        .index(0, 0)
        .flux_run(48, 400)
        .index(19200, SECTOR_ICK)
        .flux_run(48, 400)
        .index(38400, 2 * SECTOR_ICK)
        .eof()
        .build();

    let first = FluxStream::load(buf.clone()).unwrap();
    let second = FluxStream::load(buf).unwrap();
    assert_eq!(first.blocks(), second.blocks());
    assert_eq!(first.params(), second.params());
}

/// Lay down `pulses.len()` index pulses with flux between them, pulse k at
/// index-clock value `pulses[k]`.
fn hard_sector_stream(pulses: &[u32]) -> Vec<u8> {
    let mut b = StreamBuilder::new();
    b.kf_info(KF_HC16);
    for (i, &ick) in pulses.iter().enumerate() {
        b.index(ick * 8, ick);
        // Flux filler proportional to the gap so no block is empty.
        let gap = pulses.get(i + 1).map(|&next| next - ick).unwrap_or(200);
        b.flux_run(48, (gap / 200).max(2) as usize);
    }
    b.eof();
    b.build()
}

#[test]
fn test_hard_sector_track_index_merge() {
    init();
    // 17 sector pulses close 16 sectors; the track-index hole splits the
    // fifth sector in the middle.
    let mut pulses: Vec<u32> = (0..17u32).map(|k| 1000 + k * SECTOR_ICK).collect();
    pulses.insert(5, 1000 + 4 * SECTOR_ICK + SECTOR_ICK / 2);

    let stream = FluxStream::load(hard_sector_stream(&pulses)).unwrap();
    assert_eq!(stream.block_ct(), 16);

    let seq: Vec<u8> = (0..16)
        .map(|n| stream.seek_block(n).unwrap().phys_sector())
        .collect();
    let expected: Vec<u8> = (0..16u8).map(|n| (n + 11) % 16).collect();
    assert_eq!(seq, expected);
}

#[test]
fn test_hard_sector_phys_numbers_complete() {
    init();
    let mut pulses: Vec<u32> = (0..17u32).map(|k| 1000 + k * SECTOR_ICK).collect();
    pulses.insert(5, 1000 + 4 * SECTOR_ICK + SECTOR_ICK / 2);

    let stream = FluxStream::load(hard_sector_stream(&pulses)).unwrap();

    // Exactly hc usable blocks, and the assigned sector numbers form a
    // complete residue system mod hc.
    let mut seen = [false; 16];
    for n in 0..stream.block_ct() {
        let phys = stream.seek_block(n).unwrap().phys_sector() as usize;
        assert!(!seen[phys], "sector {} assigned twice", phys);
        seen[phys] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn test_hard_sector_lone_short_gap_elided() {
    init();
    // An extra pulse 150 ticks after the fifth sector pulse, with a long
    // gap after it: the short block is elided as a lone track-index marker
    // and numbering resumes one higher.
    let mut pulses: Vec<u32> = (0..17u32).map(|k| 1000 + k * SECTOR_ICK).collect();
    pulses.insert(5, 1000 + 4 * SECTOR_ICK + 150);

    let stream = FluxStream::load(hard_sector_stream(&pulses)).unwrap();
    assert_eq!(stream.block_ct(), 16);
    assert_eq!(stream.seek_block(0).unwrap().phys_sector(), 12);
}

#[test]
fn test_hard_sector_track_index_first() {
    init();
    // The track-index hole falls right after the first sector pulse: no
    // pre-hole sectors, so numbering starts at 0 with no off-by-one.
    let mut pulses: Vec<u32> = vec![1000];
    pulses.push(1150);
    for k in 1..=16u32 {
        pulses.push(1150 + k * SECTOR_ICK);
    }

    let stream = FluxStream::load(hard_sector_stream(&pulses)).unwrap();
    assert_eq!(stream.block_ct(), 16);

    let seq: Vec<u8> = (0..16)
        .map(|n| stream.seek_block(n).unwrap().phys_sector())
        .collect();
    let expected: Vec<u8> = (0..16u8).collect();
    assert_eq!(seq, expected);
}

#[test]
fn test_kf_info_empty_payload() {
    init();
    let buf = StreamBuilder::new()
        .oob(0x04, &[])
        .index(0, 0)
        .flux_run(48, 100)
        .index(4800, 600)
        .eof()
        .build();

    let stream = FluxStream::load(buf).unwrap();
    assert_eq!(stream.params().hc, 0);
    assert_eq!(stream.params().sck, KFX_DEFAULT_SCK);
    assert_eq!(stream.block_ct(), 1);
}

#[test]
fn test_oob_reaching_exact_end_processed() {
    init();
    // A KFInfo block whose payload ends exactly at the buffer end is still
    // applied.
    let mut b = StreamBuilder::new();
    b.flux_run(48, 100);
    b.kf_info("sck=12345678.0");
    let stream = FluxStream::load(b.build()).unwrap();
    assert_eq!(stream.params().sck, 12345678.0);
}

#[test]
fn test_oob_past_end_rejected() {
    init();
    // An OOB block whose declared length runs one byte past the end of the
    // buffer is a premature EOF: the block is not processed, but the flux
    // before it survives.
    let mut b = StreamBuilder::new();
    b.flux_run(48, 100);
    let mut buf = b.build();
    buf.extend_from_slice(&[0x0D, 0x04, 0x10, 0x00]); // declares 16 payload bytes
    buf.extend_from_slice(b"sck=99999.0\x00..."); // only 15 present

    let stream = FluxStream::load(buf).unwrap();
    assert_eq!(stream.params().sck, KFX_DEFAULT_SCK);

    let mut reader = stream.seek_block(0).unwrap();
    let mut count = 0;
    while reader.next_flux().is_some() {
        count += 1;
    }
    assert_eq!(count, 100);
}

#[test]
fn test_stream_position_padded_with_nops() {
    init();
    // A StreamInfo block recording a position 4 bytes ahead of the
    // compacted cursor: the gap is filled with NOP1 so later flux still
    // lines up, and the NOPs themselves yield no intervals.
    let mut b = StreamBuilder::new();
    b.flux_run(48, 10);
    b.stream_info(14, 1);
    b.flux_run(48, 10);
    b.eof();

    let stream = FluxStream::load(b.build()).unwrap();
    let mut reader = stream.seek_block(0).unwrap();
    let mut count = 0;
    while reader.next_flux().is_some() {
        count += 1;
    }
    assert_eq!(count, 20);
}

#[test]
fn test_stream_end_error_code_tolerated() {
    init();
    let buf = StreamBuilder::new()
        .index(0, 0)
        .flux_run(48, 50)
        .index(2400, 600)
        .stream_end(50, 2)
        .eof()
        .build();

    // A hardware error code is logged, not fatal.
    let stream = FluxStream::load(buf).unwrap();
    assert_eq!(stream.block_ct(), 1);
}

#[test]
fn test_host_date_and_time_parsed() {
    init();
    let buf = StreamBuilder::new()
        .kf_info("host_date=2024.01.15, host_time=12:34:56")
        .index(0, 0)
        .flux_run(48, 10)
        .index(480, 600)
        .eof()
        .build();

    let stream = FluxStream::load(buf).unwrap();
    assert_eq!(stream.params().host_date.as_deref(), Some("2024.01.15"));
    assert_eq!(stream.params().host_time.as_deref(), Some("12:34:56"));
}
