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

    src/track/mod.rs

    The byte framer and sector decoder.

    Bits from the phase-locked loop are framed into bytes, address marks
    located, sector records read and CRC-checked. Each physical block gets a
    schedule of retry attempts over (initial sync length, resync period)
    parameter pairs; the first attempt that produces a clean record wins.

    Two framing disciplines are supported, selected by the format profile:
    fixed-layout records synced on an idle run (hard-sectored ZDS media,
    which carries no address marks at all), and the address-mark state
    machine used by soft-sectored FM formats.
*/
pub mod crc;
pub mod slot;

use crate::flux::pll::Pll;
use crate::stream::FluxStream;
use crate::track::slot::{SlotAllocator, SlotMark};
use crate::DecodeFlags;
use strum::{Display, EnumIter};

/// Payload bytes in a sector.
pub const SECTOR_DATA_LEN: usize = 128;
/// Forward/backward chain bytes trailing the payload of a ZDS sector.
pub const SECTOR_CHAIN_LEN: usize = 4;
/// Postamble cells after the CRC; both should carry a data byte of 0.
pub const SECTOR_POSTAMBLE_LEN: usize = 2;
/// One full ZDS record: sector, track, payload, chain, CRC, postamble.
pub const RECORD_CELLS: usize = 2 + SECTOR_DATA_LEN + SECTOR_CHAIN_LEN + 2 + SECTOR_POSTAMBLE_LEN;

/// Sector ids run 0..=31 once the high bit is cleared.
pub const MAX_SECTOR: u8 = 31;
pub const MAX_TRACK: u8 = 76;
pub const SECTOR_SLOTS: usize = MAX_SECTOR as usize + 1;

/// ID record lengths including the address mark and CRC.
const ID_RECORD_LEN: usize = 7;
const ID_RECORD_LEN_HP: usize = 5;

/// Cell-period adaptation band handed to the PLL on every retry.
pub const CLOCK_TOLERANCE_PCT: u32 = 8;

/// Raw FM image of one idle cell pair: clock bits set, data bits clear.
const IDLE_RAW: u16 = 0xAAAA;

#[derive(Copy, Clone, Debug, Display, EnumIter, PartialEq, Eq)]
pub enum EncodingProfile {
    Fm250,
    Fm300,
    Fm500,
    Mfm250,
    Mfm300,
    Mfm500,
    M2Fm500,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CrcMode {
    Normal,
    /// HP drives assemble bytes LSB-first and record the CRC over the
    /// bit-reversed record, without the address mark byte.
    Hp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkerKind {
    Index,
    Id,
    Data,
    Deleted,
}

/// One decodable disk format. Markers are stored as `clock << 8 | data`.
pub struct DiskFormat {
    pub name: &'static str,
    pub profile: EncodingProfile,
    pub crc_mode: CrcMode,
    /// False for formats framed as fixed-layout records with no address
    /// marks (the ZDS layout).
    pub uses_markers: bool,
    pub index_am: u16,
    pub id_am: u16,
    pub data_am: u16,
    pub deleted_am: u16,
    /// Nominal PLL cell width in nanoseconds.
    pub cell_ns: u32,
    /// Nanoseconds per encoded byte, for slot accounting.
    pub byte_ns: f64,
    pub sector_data_len: usize,
    pub sectors_per_track: usize,
    pub inter_sector_bytes: u32,
    pub inter_marker_bytes: u32,
    /// Data-history mask/value pair that ends sync hunting. The ZDS layout
    /// syncs straight onto its first record byte (`10xxxxxx` after a run of
    /// zeros); address-mark formats sync on the idle run alone.
    pub am_prologue_mask: u32,
    pub am_prologue: u32,
    pub crc_init: u16,
}

/// Hard-sectored ZDS 8" media: one record per physical sector, no address
/// marks, chained sectors.
pub const ZDS_FM500: DiskFormat = DiskFormat {
    name: "ZDS FM 500 kbps",
    profile: EncodingProfile::Fm500,
    crc_mode: CrcMode::Normal,
    uses_markers: false,
    index_am: 0x28FC,
    id_am: 0x38FE,
    data_am: 0x38FB,
    deleted_am: 0x38F8,
    cell_ns: 2000,
    byte_ns: 32_000.0,
    sector_data_len: SECTOR_DATA_LEN,
    sectors_per_track: 32,
    inter_sector_bytes: 163,
    inter_marker_bytes: 33,
    am_prologue_mask: 0xFFFF_FFC0,
    am_prologue: 0x80,
    crc_init: 0,
};

/// Soft-sectored FM with IBM-style address marks.
pub const FM500_AM: DiskFormat = DiskFormat {
    name: "FM 500 kbps",
    profile: EncodingProfile::Fm500,
    crc_mode: CrcMode::Normal,
    uses_markers: true,
    index_am: 0x28FC,
    id_am: 0x38FE,
    data_am: 0x38FB,
    deleted_am: 0x38F8,
    cell_ns: 2000,
    byte_ns: 32_000.0,
    sector_data_len: SECTOR_DATA_LEN,
    sectors_per_track: 26,
    inter_sector_bytes: 163,
    inter_marker_bytes: 33,
    am_prologue_mask: 0,
    am_prologue: 0,
    crc_init: 0,
};

impl DiskFormat {
    pub fn classify_marker(&self, cell: u16) -> Option<MarkerKind> {
        match cell {
            c if c == self.index_am => Some(MarkerKind::Index),
            c if c == self.id_am => Some(MarkerKind::Id),
            c if c == self.data_am => Some(MarkerKind::Data),
            c if c == self.deleted_am => Some(MarkerKind::Deleted),
            _ => None,
        }
    }
}

/// One retry attempt's parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryParams {
    /// Minimum clean clock bits before sync is accepted.
    pub init_sync: u32,
    /// PLL period re-estimation interval, in cells.
    pub resync: u32,
}

pub const INIT_SYNC_STEPS: [u32; 6] = [16, 32, 48, 64, 80, 96];
pub const RESYNC_STEPS: [u32; 7] = [2048, 1024, 512, 256, 128, 64, 32];

/// The retry schedule: shortest sync requirement first, and within each
/// sync tier the widest (most trusting) resync period first.
pub fn retry_schedule() -> impl Iterator<Item = RetryParams> {
    INIT_SYNC_STEPS.iter().flat_map(|&init_sync| {
        RESYNC_STEPS
            .iter()
            .map(move |&resync| RetryParams { init_sync, resync })
    })
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum SectorStatus {
    /// Decoded once with a clean CRC.
    Good,
    /// Decoded at least twice with identical contents.
    Matched,
    /// A later clean read disagreed with the stored one.
    Conflict,
    /// No attempt produced a clean record.
    Missing,
}

/// ZDS forward/backward sector chaining bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SectorChain {
    pub bsector: u8,
    pub btrack:  u8,
    pub fsector: u8,
    pub ftrack:  u8,
}

/// A decoded sector record as stored in the track table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorRecord {
    pub sector: u8,
    pub track:  u8,
    pub data:   Vec<u8>,
    pub chain:  Option<SectorChain>,
    pub crc:    u16,
    pub deleted: bool,
}

/// An ID address mark record, kept even when its data record never
/// decoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdMark {
    pub track:  u8,
    pub side:   u8,
    pub sector: u8,
    pub size:   u8,
}

/// One output record per sector slot of the track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorData {
    pub track: u8,
    pub side: u8,
    pub sector_id: u8,
    pub data: Vec<u8>,
    pub status: SectorStatus,
    pub chain: Option<SectorChain>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DecodeStats {
    pub blocks: u32,
    pub attempts: u32,
}

/// The decoded track: one entry per sector slot, in slot order, plus the
/// ids that never produced a record.
#[derive(Clone, Debug, Default)]
pub struct TrackSectors {
    pub side: u8,
    pub sectors: Vec<SectorData>,
    pub missing: Vec<u8>,
    pub id_marks: Vec<IdMark>,
    pub stats: DecodeStats,
}

/// Per-track sector table. Slots are write-once: the first clean record
/// sticks, an identical re-read raises confidence, a differing one is
/// flagged and logged but never replaces the original.
pub struct SectorStore {
    slots: [Option<SectorRecord>; SECTOR_SLOTS],
    matched: [bool; SECTOR_SLOTS],
    conflict: [bool; SECTOR_SLOTS],
}

impl SectorStore {
    pub fn new() -> SectorStore {
        SectorStore {
            slots: std::array::from_fn(|_| None),
            matched: [false; SECTOR_SLOTS],
            conflict: [false; SECTOR_SLOTS],
        }
    }

    pub fn record(&mut self, rec: SectorRecord) {
        let id = rec.sector as usize;
        if id >= SECTOR_SLOTS {
            log::warn!("record(): sector id {} out of range", id);
            return;
        }
        match &self.slots[id] {
            None => {
                self.slots[id] = Some(rec);
            }
            Some(existing) if *existing == rec => {
                self.matched[id] = true;
            }
            Some(existing) => {
                log::warn!(
                    "record(): different info for track/sector {}/{}",
                    existing.track,
                    id
                );
                self.conflict[id] = true;
            }
        }
    }

    pub fn get(&self, id: usize) -> Option<&SectorRecord> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    pub fn status(&self, id: usize) -> SectorStatus {
        if self.slots[id].is_none() {
            SectorStatus::Missing
        }
        else if self.conflict[id] {
            SectorStatus::Conflict
        }
        else if self.matched[id] {
            SectorStatus::Matched
        }
        else {
            SectorStatus::Good
        }
    }
}

impl Default for SectorStore {
    fn default() -> Self {
        SectorStore::new()
    }
}

/// Raw FM image of a marker word: clock and data bits interleaved, clock
/// first.
pub fn marker_raw(marker: u16) -> u16 {
    let mut raw = 0u16;
    for i in (0..8).rev() {
        raw = (raw << 1) | ((marker >> (8 + i)) & 1);
        raw = (raw << 1) | ((marker >> i) & 1);
    }
    raw
}

fn cell_from_raw(raw: u16) -> u16 {
    let mut cell = 0u16;
    for i in (0..8).rev() {
        let clock = (raw >> (2 * i + 1)) & 1;
        let data = (raw >> (2 * i)) & 1;
        cell |= clock << (8 + (i as u16));
        cell |= data << (i as u16);
    }
    cell
}

/// Shift bits until the raw stream shows a full idle cell pair followed by
/// one of the format's address marks. Returns the marker cell, aligned so
/// the next bit pair is the first bit of the following byte.
pub fn await_marker(
    pll: &mut Pll,
    fmt: &DiskFormat,
    max_bits: Option<u32>,
) -> Option<(MarkerKind, u16)> {
    let mut reg: u32 = 0;
    let mut bits: u32 = 0;

    loop {
        let bit = pll.next_bit()?;
        reg = (reg << 1) | bit as u32;
        bits += 1;

        if (reg >> 16) as u16 == IDLE_RAW {
            let cell = cell_from_raw(reg as u16);
            if let Some(kind) = fmt.classify_marker(cell) {
                pll.set_synced();
                return Some((kind, cell));
            }
        }

        if let Some(max) = max_bits {
            if bits >= max {
                return None;
            }
        }
    }
}

/// Assemble one FM byte from the data bits of successive cell pairs.
///
/// In resync mode, first consume bits until a 0 is seen and then until the
/// first 1: the run of zero data bits is the record gap, and the 1 is the
/// record's start bit, which becomes the byte's leading bit. Both a data 1
/// and a marked 1 (clock bit dropped) count as logical 1.
pub fn get_fm_byte(pll: &mut Pll, resync: bool) -> Option<u8> {
    let mut val: u8 = 0;
    let mut bit_cnt = 0;

    if resync {
        // Fix the clock/data phase on an idle pair: a 1 followed by a 0 can
        // only be a clock bit and its empty data cell.
        let mut prev = pll.next_bit()?;
        loop {
            let cur = pll.next_bit()?;
            if prev && !cur {
                break;
            }
            prev = cur;
        }
        // Consume the leading idle, up to the record's start bit.
        let mut sync_cnt = 0;
        while !pll.read_data_bit()? {
            sync_cnt += 1;
        }
        log::trace!("get_fm_byte(): synced on {} idle bits", sync_cnt);
        pll.set_synced();
        val = 1;
        bit_cnt = 1;
    }

    while bit_cnt < 8 {
        val = (val << 1) | pll.read_data_bit()? as u8;
        bit_cnt += 1;
    }
    Some(val)
}

/// Read a record of `count` bytes, the first of which (the address mark's
/// data byte) is already in hand. HP-mode records assemble LSB-first.
fn read_record_bytes(pll: &mut Pll, fmt: &DiskFormat, first: u8, count: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::with_capacity(count);
    buf.push(first);

    while buf.len() < count {
        let val = match fmt.crc_mode {
            CrcMode::Normal => get_fm_byte(pll, false)?,
            CrcMode::Hp => {
                let mut val: u8 = 0;
                for _ in 0..8 {
                    val = (val >> 1) | ((pll.read_data_bit()? as u8) << 7);
                }
                val
            }
        };
        buf.push(val);
    }
    Some(buf)
}

/// CRC-check a record read by `read_record_bytes` according to the format's
/// mode. HP records drop the marker byte and compare bit-reversed.
fn check_record(fmt: &DiskFormat, buf: &[u8]) -> bool {
    match fmt.crc_mode {
        CrcMode::Normal => crc::check_bytes(buf, fmt.crc_init),
        CrcMode::Hp => {
            let rev: Vec<u8> = buf[1..].iter().map(|&b| crc::reverse_bits(b)).collect();
            crc::check_bytes(&rev, fmt.crc_init)
        }
    }
}

/// The framing state machine for address-mark formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DecodeState {
    SeekSync,
    ExpectId,
    ReadId,
    ExpectData,
    ReadData,
}

/// Decode every sector of one revolution-sized block via the address-mark
/// state machine. Returns true if at least one data record was stored; a
/// framing or CRC failure ends the attempt so the retry schedule can try
/// different parameters.
fn decode_marked_block(
    pll: &mut Pll,
    fmt: &DiskFormat,
    store: &mut SectorStore,
    id_marks: &mut Vec<IdMark>,
) -> bool {
    let mut slots = SlotAllocator::new(fmt.inter_sector_bytes, fmt.inter_marker_bytes, fmt.byte_ns);
    let mut state = DecodeState::SeekSync;
    let mut stored = false;
    let mut last_id: Option<IdMark> = None;
    let mut pending: Option<(MarkerKind, u16)> = None;

    loop {
        state = match state {
            DecodeState::SeekSync => {
                if pll.sync(fmt.am_prologue_mask, fmt.am_prologue).is_none() {
                    return stored;
                }
                DecodeState::ExpectId
            }
            DecodeState::ExpectId => match await_marker(pll, fmt, None) {
                None => return stored,
                Some((MarkerKind::Index, _)) => {
                    slots.slot_for(SlotMark::Index, pll.elapsed_ns());
                    DecodeState::ExpectId
                }
                Some((MarkerKind::Id, cell)) => {
                    pending = Some((MarkerKind::Id, cell));
                    DecodeState::ReadId
                }
                Some((kind, _)) => {
                    // A data mark with no preceding ID record; note its
                    // slot and keep hunting.
                    log::debug!("decode_marked_block(): orphan {:?} mark", kind);
                    slots.slot_for(SlotMark::Data, pll.elapsed_ns());
                    DecodeState::ExpectId
                }
            },
            DecodeState::ReadId => {
                slots.slot_for(SlotMark::Id, pll.elapsed_ns());
                let count = match fmt.crc_mode {
                    CrcMode::Normal => ID_RECORD_LEN,
                    CrcMode::Hp => ID_RECORD_LEN_HP,
                };
                let (_, cell) = pending.take().unwrap_or((MarkerKind::Id, fmt.id_am));
                let Some(buf) = read_record_bytes(pll, fmt, (cell & 0xFF) as u8, count) else {
                    return stored;
                };
                if !check_record(fmt, &buf) {
                    log::debug!("decode_marked_block(): id record crc mismatch");
                    return stored;
                }
                let id = IdMark {
                    track: buf[1],
                    side: buf[2],
                    sector: buf[3],
                    size: buf[4],
                };
                if !id_marks.contains(&id) {
                    id_marks.push(id);
                }
                last_id = Some(id);
                DecodeState::ExpectData
            }
            DecodeState::ExpectData => {
                // A data mark should follow within roughly one sector
                // distance; bits are 16 per byte.
                let limit = fmt.inter_sector_bytes * 16;
                match await_marker(pll, fmt, Some(limit)) {
                    None => return stored,
                    Some((MarkerKind::Index, _)) => {
                        slots.slot_for(SlotMark::Index, pll.elapsed_ns());
                        DecodeState::ExpectId
                    }
                    Some((MarkerKind::Id, cell)) => {
                        // The data record for the previous ID never
                        // appeared; its slot stays empty.
                        log::debug!(
                            "decode_marked_block(): no data record for sector {:?}",
                            last_id.map(|id| id.sector)
                        );
                        pending = Some((MarkerKind::Id, cell));
                        DecodeState::ReadId
                    }
                    Some((kind, cell)) => {
                        pending = Some((kind, cell));
                        DecodeState::ReadData
                    }
                }
            }
            DecodeState::ReadData => {
                slots.slot_for(SlotMark::Data, pll.elapsed_ns());
                let (kind, cell) = pending.take().unwrap_or((MarkerKind::Data, fmt.data_am));
                let count = 1 + fmt.sector_data_len + 2;
                let Some(buf) = read_record_bytes(pll, fmt, (cell & 0xFF) as u8, count) else {
                    return stored;
                };
                if !check_record(fmt, &buf) {
                    log::debug!("decode_marked_block(): data record crc mismatch");
                    return stored;
                }
                let Some(id) = last_id.take() else {
                    return stored;
                };
                let crc = u16::from_be_bytes([buf[count - 2], buf[count - 1]]);
                store.record(SectorRecord {
                    sector: id.sector & 0x7F,
                    track: id.track,
                    data: buf[1..1 + fmt.sector_data_len].to_vec(),
                    chain: None,
                    crc,
                    deleted: kind == MarkerKind::Deleted,
                });
                stored = true;
                DecodeState::ExpectId
            }
        };
    }
}

/// Decode one fixed-layout ZDS record from a hard-sector block. The whole
/// record is kept as 16-bit cells until the CRC passes, then demodulated.
fn decode_fixed_block(pll: &mut Pll, fmt: &DiskFormat, store: &mut SectorStore) -> bool {
    let mut cells = [0u16; RECORD_CELLS];

    let Some(first) = pll.sync(fmt.am_prologue_mask, fmt.am_prologue) else {
        return false;
    };
    cells[0] = first;
    for cell in cells.iter_mut().skip(1) {
        let Some(c) = pll.read_cell() else {
            return false;
        };
        *cell = c;
    }

    if !crc::check_cells(&cells[..RECORD_CELLS - SECTOR_POSTAMBLE_LEN], fmt.crc_init) {
        log::debug!("decode_fixed_block(): crc mismatch");
        return false;
    }

    let sector = (cells[0] & 0x7F) as u8;
    let track = (cells[1] & 0xFF) as u8;
    if sector > MAX_SECTOR || track > MAX_TRACK {
        log::warn!("decode_fixed_block(): bad track/sector {}/{}", track, sector);
        return false;
    }

    if cells[136] & 0xFF != 0 || cells[137] & 0xFF != 0 {
        // Outside the CRC span, so only suspicious, not disqualifying.
        log::warn!("decode_fixed_block(): incomplete or invalid postamble");
    }

    let mut data = vec![0u8; SECTOR_DATA_LEN];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (cells[2 + i] & 0xFF) as u8;
    }

    store.record(SectorRecord {
        sector,
        track,
        data,
        chain: Some(SectorChain {
            bsector: (cells[130] & 0xFF) as u8,
            btrack:  (cells[131] & 0xFF) as u8,
            fsector: (cells[132] & 0xFF) as u8,
            ftrack:  (cells[133] & 0xFF) as u8,
        }),
        crc: u16::from_be_bytes([(cells[134] & 0xFF) as u8, (cells[135] & 0xFF) as u8]),
        deleted: false,
    });
    true
}

/// Decode every usable block of a loaded stream against one format.
///
/// Each block runs the retry schedule until a clean record (or, for marked
/// formats, at least one clean sector) is stored or the schedule is
/// exhausted. The result carries one entry per sector slot; sectors that
/// never decoded are reported missing rather than silently omitted.
pub fn decode_track(
    stream: &FluxStream,
    fmt: &DiskFormat,
    side: u8,
    flags: DecodeFlags,
) -> TrackSectors {
    let mut store = SectorStore::new();
    let mut id_marks: Vec<IdMark> = Vec::new();
    let mut stats = DecodeStats::default();

    let mut blk = 0usize;
    while stream.seek_block(blk).is_some() {
        stats.blocks += 1;
        let mut done = false;

        for params in retry_schedule() {
            let Some(reader) = stream.seek_block_with(blk, flags) else {
                break;
            };
            let mut pll = Pll::new(reader, fmt.cell_ns);
            pll.set_resync_period(params.resync);
            if !pll.reset(params.init_sync, CLOCK_TOLERANCE_PCT) {
                // Block with no flux at all; no parameters will help.
                break;
            }

            stats.attempts += 1;
            let ok = if fmt.uses_markers {
                decode_marked_block(&mut pll, fmt, &mut store, &mut id_marks)
            }
            else {
                decode_fixed_block(&mut pll, fmt, &mut store)
            };

            if ok {
                done = true;
                break;
            }
            log::debug!(
                "decode_track(): failed blk {} init_sync {} resync {}",
                blk,
                params.init_sync,
                params.resync
            );
        }

        if !done {
            log::debug!("decode_track(): retries exhausted for block {}", blk);
        }
        blk += 1;
    }

    build_track(fmt, side, store, id_marks, stats)
}

fn build_track(
    fmt: &DiskFormat,
    side: u8,
    store: SectorStore,
    id_marks: Vec<IdMark>,
    stats: DecodeStats,
) -> TrackSectors {
    let spt = fmt.sectors_per_track.min(SECTOR_SLOTS);

    // Missing slots still need a track number for reporting; borrow it from
    // any decoded neighbor.
    let track_num = (0..spt)
        .find_map(|id| store.get(id).map(|rec| rec.track))
        .unwrap_or(0);

    let mut sectors = Vec::with_capacity(spt);
    let mut missing = Vec::new();
    for id in 0..spt {
        match store.get(id) {
            Some(rec) => sectors.push(SectorData {
                track: rec.track,
                side,
                sector_id: id as u8,
                data: rec.data.clone(),
                status: store.status(id),
                chain: rec.chain,
            }),
            None => {
                missing.push(id as u8);
                sectors.push(SectorData {
                    track: track_num,
                    side,
                    sector_id: id as u8,
                    data: Vec::new(),
                    status: SectorStatus::Missing,
                    chain: None,
                });
            }
        }
    }

    if !missing.is_empty() {
        log::info!(
            "build_track(): track {} side {}: missing sectors {:?}",
            track_num,
            side,
            missing
        );
    }

    TrackSectors {
        side,
        sectors,
        missing,
        id_marks,
        stats,
    }
}
