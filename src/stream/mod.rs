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

    src/stream/mod.rs

    A parser for the KryoFlux raw stream format.

    The stream interleaves flux opcodes with out-of-band metadata blocks.
    Parsing compacts the buffer in place so the OOB blocks are elided,
    leaving a contiguous run of flux opcodes indexable by stream position,
    and builds a list of the physical blocks delimited by index pulses.

    For soft-sectored media there is one index pulse per revolution and every
    block is one revolution. For hard-sectored media there is one pulse per
    sector plus a track-index pulse between two sector pulses; the pair of
    short blocks around the track-index hole is merged back into one sector
    and the physical sector numbers are recovered from the pulse count seen
    before the hole.
*/
pub mod oob;

use crate::flux::FluxReader;
use crate::stream::oob::{read_oob, OobBlock};
use crate::{DecodeFlags, FluxStreamError, KFX_DEFAULT_ICK, KFX_DEFAULT_SCK};

pub const OP_NOP1: u8 = 0x08;
pub const OP_NOP2: u8 = 0x09;
pub const OP_NOP3: u8 = 0x0A;
pub const OP_OVL16: u8 = 0x0B;
pub const OP_FLUX3: u8 = 0x0C;
pub const OP_OOB: u8 = 0x0D;

/// Revolutions per second assumed for nominal sector timing. The odd 8"
/// figure is the one the capture hardware calibrates against, not the
/// drive's nameplate speed.
pub const RPS_8INCH: f64 = 5.208;
pub const RPS_5INCH: f64 = 5.0;

/// One entry of the flux opcode space. FLUX2 carries its high bits in the
/// opcode byte itself; FLUX1 *is* the cell value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamOpcode {
    Flux1,
    Flux2,
    Flux3,
    Nop(usize),
    Ovl16,
    Oob,
}

impl StreamOpcode {
    pub fn from_byte(byte: u8) -> StreamOpcode {
        match byte {
            0x00..=0x07 => StreamOpcode::Flux2,
            OP_NOP1 => StreamOpcode::Nop(1),
            OP_NOP2 => StreamOpcode::Nop(2),
            OP_NOP3 => StreamOpcode::Nop(3),
            OP_OVL16 => StreamOpcode::Ovl16,
            OP_FLUX3 => StreamOpcode::Flux3,
            OP_OOB => StreamOpcode::Oob,
            _ => StreamOpcode::Flux1,
        }
    }

    /// Total stream length of the opcode including operand bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            StreamOpcode::Flux1 => 1,
            StreamOpcode::Flux2 => 2,
            StreamOpcode::Flux3 => 3,
            StreamOpcode::Nop(n) => *n,
            StreamOpcode::Ovl16 => 1,
            StreamOpcode::Oob => 1,
        }
    }
}

/// Capture parameters for one loaded stream, populated from OOB KFInfo
/// blocks on top of the KryoFlux defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamParameters {
    /// Sample clock in Hz.
    pub sck: f64,
    /// Index clock in Hz.
    pub ick: f64,
    /// Hard sector count; 0 for soft-sectored media.
    pub hc: u32,
    /// Capture date, informational only.
    pub host_date: Option<String>,
    /// Capture time, informational only.
    pub host_time: Option<String>,
}

impl Default for StreamParameters {
    fn default() -> Self {
        StreamParameters {
            sck: KFX_DEFAULT_SCK,
            ick: KFX_DEFAULT_ICK,
            hc: 0,
            host_date: None,
            host_time: None,
        }
    }
}

impl StreamParameters {
    /// Nominal length of one hard sector in index-clock ticks.
    pub fn nominal_sector_ick(&self) -> f64 {
        let rps = if self.hc == 10 { RPS_5INCH } else { RPS_8INCH };
        self.ick / rps / self.hc as f64
    }
}

/// One segment of the stream delimited by index pulses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhysBlock {
    /// Half-open range of compacted stream positions.
    pub start: u32,
    pub end: u32,
    /// Sample counter at the index pulse opening this block.
    pub sample_count: u32,
    /// Index clock at that pulse. After hard-sector resolution a value of 0
    /// marks a block to skip: the lead-in, the track-index sibling, or the
    /// trailing partial block.
    pub index_count: u32,
    /// Physical sector number; always 0 for soft-sectored media.
    pub phys_sector: u8,
}

impl PhysBlock {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An owned, compacted flux stream plus its physical block list.
///
/// The block list is rebuilt on every load; the buffer is owned by the
/// stream and mutated in place during compaction.
pub struct FluxStream {
    buf: Vec<u8>,
    stream_len: usize,
    params: StreamParameters,
    blocks: Vec<PhysBlock>,
    usable: Vec<usize>,
}

impl FluxStream {
    /// Load a raw KryoFlux stream with default parameters. The parameters
    /// may still be updated by KFInfo blocks within the stream.
    pub fn load(buf: Vec<u8>) -> Result<FluxStream, FluxStreamError> {
        Self::load_with_params(buf, StreamParameters::default())
    }

    /// Load a raw KryoFlux stream, seeding the capture parameters with
    /// caller-supplied values instead of the KryoFlux defaults.
    pub fn load_with_params(
        buf: Vec<u8>,
        params: StreamParameters,
    ) -> Result<FluxStream, FluxStreamError> {
        if buf.is_empty() {
            return Err(FluxStreamError::EmptyStream);
        }

        let mut stream = FluxStream {
            buf,
            stream_len: 0,
            params,
            blocks: vec![PhysBlock::default()],
            usable: Vec::new(),
        };
        stream.compact()?;
        stream.resolve_blocks();

        log::debug!(
            "load(): {} stream bytes, {} blocks ({} usable), hc: {} sck: {:.4} ick: {:.4}",
            stream.stream_len,
            stream.blocks.len(),
            stream.usable.len(),
            stream.params.hc,
            stream.params.sck,
            stream.params.ick,
        );

        Ok(stream)
    }

    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    /// The raw block list, including skipped entries. Mostly useful for
    /// diagnostics.
    pub fn blocks(&self) -> &[PhysBlock] {
        &self.blocks
    }

    /// Number of usable blocks (track-index markers and empty blocks
    /// excluded).
    pub fn block_ct(&self) -> usize {
        self.usable.len()
    }

    /// Position a reader at the n-th usable block. Returns `None` if no
    /// such block exists. Seeking is O(1) in either direction.
    pub fn seek_block(&self, num: usize) -> Option<FluxReader<'_>> {
        self.seek_block_with(num, DecodeFlags::empty())
    }

    pub fn seek_block_with(&self, num: usize, flags: DecodeFlags) -> Option<FluxReader<'_>> {
        let block = self.blocks[*self.usable.get(num)?];
        // A lying index pulse can place a boundary past the end of the
        // compacted stream; stay within it.
        let start = (block.start as usize).min(self.stream_len);
        let end = (block.end as usize).min(self.stream_len);
        Some(FluxReader::new(
            &self.buf[start..end],
            block.phys_sector,
            self.params.sck,
            flags,
        ))
    }

    /// Walk the raw stream, copying flux opcodes down over the out-of-band
    /// blocks and recording index pulses as block boundaries.
    fn compact(&mut self) -> Result<(), FluxStreamError> {
        let len = self.buf.len();
        let mut read = 0usize;
        let mut write = 0usize;

        while read < len {
            let op = StreamOpcode::from_byte(self.buf[read]);
            match op {
                StreamOpcode::Oob => match read_oob(&self.buf, read) {
                    Ok((block, consumed)) => {
                        read += consumed;
                        if !self.handle_oob(block, &mut write, read) {
                            // EOF block: anything further is padding.
                            break;
                        }
                    }
                    Err(_) => {
                        // A truncated OOB header or payload ends the stream;
                        // the last partial block stays open.
                        log::error!("compact(): premature EOF in OOB block @ {:X}", read);
                        break;
                    }
                },
                op => {
                    // In-band opcode: copy it and its operand bytes
                    // compactly. A trailing truncated opcode is copied as-is
                    // and caught again by the flux reader.
                    let n = op.encoded_len().min(len - read);
                    self.buf.copy_within(read..read + n, write);
                    read += n;
                    write += n;
                }
            }
        }

        self.stream_len = write;
        if let Some(last) = self.blocks.last_mut() {
            last.end = write as u32;
        }
        Ok(())
    }

    /// Dispatch one OOB block during compaction. Returns false when parsing
    /// should stop (EOF block).
    fn handle_oob(&mut self, block: OobBlock, write: &mut usize, read: usize) -> bool {
        match block {
            OobBlock::Index(ib) => {
                if let Some(last) = self.blocks.last_mut() {
                    last.end = ib.stream_pos;
                }
                self.blocks.push(PhysBlock {
                    start: ib.stream_pos,
                    end: ib.stream_pos,
                    sample_count: ib.sample_counter,
                    index_count: ib.index_counter,
                    phys_sector: 0,
                });
            }
            OobBlock::StreamInfo(sib) => {
                self.reconcile_stream_pos(sib.stream_pos, write, read);
            }
            OobBlock::StreamEnd(seb) => {
                self.reconcile_stream_pos(seb.stream_pos, write, read);
                if seb.hw_status_code != 0 {
                    log::error!(
                        "handle_oob(): read error {} ({})",
                        seb.hw_status_code,
                        seb.status_str()
                    );
                }
            }
            OobBlock::KfInfo(text) => {
                oob::parse_kf_info(&text, &mut self.params);
            }
            OobBlock::Invalid(_) => {}
            OobBlock::Eof => return false,
        }
        true
    }

    /// Cross-check a recorded stream position against the compacted write
    /// cursor. A recorded position ahead of us means flux bytes were lost in
    /// transfer; the gap is padded with NOP1 filler so later positions still
    /// line up. A recorded position behind us is unrecoverable skew.
    fn reconcile_stream_pos(&mut self, recorded: u32, write: &mut usize, read: usize) {
        let recorded = recorded as usize;
        if recorded == *write {
            return;
        }

        log::warn!(
            "reconcile_stream_pos(): stream position error: expected {} actual is {}",
            recorded,
            *write
        );
        if recorded > *write {
            while *write < recorded && *write < read {
                self.buf[*write] = OP_NOP1;
                *write += 1;
            }
            if *write == recorded {
                log::warn!("reconcile_stream_pos(): realigned with NOP1 filler");
            }
        }
        else {
            log::error!("reconcile_stream_pos(): compacted stream is ahead of recorded position");
        }
    }

    /// Resolve the block list after all OOB blocks have been processed:
    /// merge hard-sector blocks split by the track-index hole, assign
    /// physical sector numbers, and precompute the usable-block index.
    fn resolve_blocks(&mut self) {
        let hc = self.params.hc;
        let n = self.blocks.len();

        if hc != 0 && n > 1 {
            // A gap shorter than 3/4 of the nominal sector is a track-index
            // marker, not a sector pulse.
            let min_sector_ick = (self.params.nominal_sector_ick() * 0.75) as u32;
            let mut seen_track_index = false;
            let mut pre_track_index: u32 = 0;

            let mut i = 0;
            while i + 1 < n {
                let gap = self.blocks[i + 1].index_count.wrapping_sub(self.blocks[i].index_count);
                if self.blocks[i].index_count != 0 && gap < min_sector_ick {
                    if i + 2 >= n {
                        // Missing the final index marker for the next sector.
                        self.blocks[i].index_count = 0;
                    }
                    else if self.blocks[i + 2].index_count.wrapping_sub(self.blocks[i + 1].index_count)
                        < min_sector_ick
                    {
                        // Both gaps short: this sector was split by the
                        // track-index hole. Merge the pair and skip the
                        // sibling.
                        self.blocks[i].end = self.blocks[i + 1].end;
                        self.blocks[i + 1].index_count = 0;
                        if !seen_track_index {
                            pre_track_index += 1;
                            seen_track_index = true;
                        }
                        else {
                            log::warn!(
                                "resolve_blocks(): second short gap pair in one revolution @ block {}",
                                i
                            );
                        }
                    }
                    else {
                        // A lone short gap: the track-index marker is the
                        // first marker of this block.
                        self.blocks[i].index_count = 0;
                        seen_track_index = true;
                    }
                }
                else if !seen_track_index && self.blocks[i].index_count != 0 {
                    pre_track_index += 1;
                }
                i += 1;
            }

            // The trailing partial block is never a sector.
            self.blocks[n - 1].index_count = 0;

            let mut sector_num = hc as i64 - pre_track_index as i64;
            for block in self.blocks[..n - 1].iter_mut() {
                if block.index_count != 0 {
                    block.phys_sector = sector_num.rem_euclid(hc as i64) as u8;
                    sector_num += 1;
                }
            }
        }

        self.usable = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.start < b.end && !(hc != 0 && b.index_count == 0))
            .map(|(i, _)| i)
            .collect();

        for &i in self.usable.iter() {
            let b = &self.blocks[i];
            log::trace!(
                "resolve_blocks(): start {} end {} sector {} index_count {} sample_count {}",
                b.start,
                b.end,
                b.phys_sector,
                b.index_count,
                b.sample_count
            );
        }
    }
}
