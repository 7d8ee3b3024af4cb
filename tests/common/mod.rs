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

    tests/common/mod.rs

    Common support routines for tests: a synthetic KryoFlux stream builder
    and an FM cell encoder.
*/

use fluxrip::track::crc::{crc_bytes, CRC16_INIT};
use hex::encode;
use sha1::{Digest, Sha1};

/// Samples per nominal 2us FM cell at the default sample clock.
#[allow(dead_code)]
pub const CELL_SAMPLES: u32 = 48;

/// Builds a raw KryoFlux stream byte-by-byte, tracking the stream position
/// (which counts in-band bytes only) for OOB block payloads.
pub struct StreamBuilder {
    buf: Vec<u8>,
    stream_pos: u32,
}

#[allow(dead_code)]
impl StreamBuilder {
    pub fn new() -> StreamBuilder {
        StreamBuilder {
            buf: Vec::new(),
            stream_pos: 0,
        }
    }

    pub fn stream_pos(&self) -> u32 {
        self.stream_pos
    }

    fn push(&mut self, byte: u8) {
        self.buf.push(byte);
        self.stream_pos += 1;
    }

    /// Emit one flux cell of `samples`, choosing opcodes the way the
    /// capture hardware does: OVL16 prefixes for overflow, FLUX1 when the
    /// value fits a bare opcode, FLUX2/FLUX3 otherwise.
    pub fn flux(&mut self, mut samples: u32) -> &mut Self {
        while samples > 0xFFFF {
            self.push(0x0B);
            samples -= 0x10000;
        }
        if (0x0E..=0xFF).contains(&samples) {
            self.push(samples as u8);
        }
        else if samples <= 0x7FF {
            self.push((samples >> 8) as u8);
            self.push((samples & 0xFF) as u8);
        }
        else {
            self.push(0x0C);
            self.push((samples & 0xFF) as u8);
            self.push((samples >> 8) as u8);
        }
        self
    }

    pub fn flux_run(&mut self, samples: u32, count: usize) -> &mut Self {
        for _ in 0..count {
            self.flux(samples);
        }
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.push(b);
        }
        self
    }

    /// OOB blocks do not advance the stream position.
    pub fn oob(&mut self, oob_type: u8, payload: &[u8]) -> &mut Self {
        self.buf.push(0x0D);
        self.buf.push(oob_type);
        self.buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// An Index block at the current stream position.
    pub fn index(&mut self, sample_counter: u32, index_counter: u32) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.stream_pos.to_le_bytes());
        payload.extend_from_slice(&sample_counter.to_le_bytes());
        payload.extend_from_slice(&index_counter.to_le_bytes());
        self.oob(0x02, &payload)
    }

    pub fn kf_info(&mut self, text: &str) -> &mut Self {
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        self.oob(0x04, &payload)
    }

    pub fn stream_info(&mut self, stream_pos: u32, transfer_time_ms: u32) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&stream_pos.to_le_bytes());
        payload.extend_from_slice(&transfer_time_ms.to_le_bytes());
        self.oob(0x01, &payload)
    }

    pub fn stream_end(&mut self, stream_pos: u32, result_code: u32) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&stream_pos.to_le_bytes());
        payload.extend_from_slice(&result_code.to_le_bytes());
        self.oob(0x03, &payload)
    }

    pub fn eof(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x0D, 0x0D, 0x0D, 0x0D]);
        self
    }

    /// Encode FM cells as flux: one transition per set bit, clock bits
    /// first, one cell time per bit.
    pub fn fm_cells(&mut self, cells: &[u16]) -> &mut Self {
        let mut gap: u32 = 0;
        for &cell in cells {
            for i in (0..8).rev() {
                for bit in [(cell >> (8 + i)) & 1, (cell >> i) & 1] {
                    gap += CELL_SAMPLES;
                    if bit != 0 {
                        self.flux(gap);
                        gap = 0;
                    }
                }
            }
        }
        // Any trailing gap is closed by the next transition written, or
        // falls off the end of the block.
        if gap != 0 {
            self.flux(gap);
        }
        self
    }

    pub fn build(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// `n` cells of FM idle: full clock, no data.
#[allow(dead_code)]
pub fn idle_cells(n: usize) -> Vec<u16> {
    vec![0xFF00; n]
}

/// Cells for a run of plain data bytes under a full clock.
#[allow(dead_code)]
pub fn data_cells(bytes: &[u8]) -> Vec<u16> {
    bytes.iter().map(|&b| 0xFF00 | b as u16).collect()
}

/// A complete ZDS sector record as cells: sector/track header, payload,
/// chain bytes, CRC and postamble.
#[allow(dead_code)]
pub fn zds_record_cells(sector: u8, track: u8, data: &[u8; 128], chain: [u8; 4]) -> Vec<u16> {
    let mut bytes = Vec::with_capacity(138);
    bytes.push(0x80 | sector);
    bytes.push(track);
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(&chain);
    let crc = crc_bytes(&bytes, CRC16_INIT);
    bytes.extend_from_slice(&crc.to_be_bytes());
    bytes.push(0x00);
    bytes.push(0x00);
    data_cells(&bytes)
}

/// An address-mark record: the marker cell followed by plain bytes and the
/// CRC computed over the marker's data byte and the payload.
#[allow(dead_code)]
pub fn am_record_cells(marker: u16, payload: &[u8]) -> Vec<u16> {
    let mut bytes = vec![(marker & 0xFF) as u8];
    bytes.extend_from_slice(payload);
    let crc = crc_bytes(&bytes, CRC16_INIT);
    bytes.extend_from_slice(&crc.to_be_bytes());

    let mut cells = vec![marker];
    cells.extend(data_cells(&bytes[1..]));
    cells
}

#[allow(dead_code)]
pub fn compute_slice_hash(slice: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(slice);
    let result = hasher.finalize();

    encode(result)
}
