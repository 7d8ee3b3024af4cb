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

    src/flux/mod.rs

    Pull iteration over the flux intervals of one physical block.

    Cell values in the compacted stream are sample counts; the reader
    converts them to nanoseconds against a running sample total so that
    per-interval rounding never accumulates into drift over a revolution.
*/
pub mod pll;

use crate::stream::StreamOpcode;
use crate::DecodeFlags;

#[cfg(feature = "rand")]
use rand::Rng;

/// Yields the flux intervals of one physical block, in nanoseconds.
/// `next_flux` returns `None` at the end of the block; this is the only
/// end-of-data sentinel and every downstream stage propagates it.
pub struct FluxReader<'a> {
    buf: &'a [u8],
    pos: usize,
    phys_sector: u8,
    scaler: f64,
    total_samples: u64,
    prev_ns: u64,
    flags: DecodeFlags,
}

impl<'a> FluxReader<'a> {
    pub fn new(buf: &'a [u8], phys_sector: u8, sck: f64, flags: DecodeFlags) -> FluxReader<'a> {
        let mut reader = FluxReader {
            buf,
            pos: 0,
            phys_sector,
            scaler: 1.0e9 / sck,
            total_samples: 0,
            prev_ns: 0,
            flags,
        };

        #[cfg(feature = "rand")]
        if flags.contains(DecodeFlags::START_JITTER) {
            // Start reading somewhere inside the first few cells, like a
            // head that settles mid-bit.
            let skip = rand::thread_rng().gen_range(0..4);
            for _ in 0..skip {
                _ = reader.next_flux();
            }
        }

        reader
    }

    /// Physical sector number of the block this reader is bounded by.
    /// Always 0 for soft-sectored media.
    pub fn phys_sector(&self) -> u8 {
        self.phys_sector
    }

    /// Nanoseconds elapsed from the start of the block to the last yielded
    /// transition.
    pub fn elapsed_ns(&self) -> u64 {
        self.prev_ns
    }

    /// The next flux interval in nanoseconds, or `None` at end of block.
    /// OVL16 prefixes accumulate into the next emitted cell; NOP opcodes
    /// are skipped. A truncated trailing opcode ends the block.
    pub fn next_flux(&mut self) -> Option<u32> {
        let mut ovl16: u32 = 0;

        while self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            match StreamOpcode::from_byte(byte) {
                StreamOpcode::Flux1 => {
                    self.pos += 1;
                    return Some(self.to_ns(ovl16 + byte as u32));
                }
                StreamOpcode::Flux2 => {
                    if self.pos + 1 >= self.buf.len() {
                        return None;
                    }
                    let cell = ((byte as u32) << 8) + self.buf[self.pos + 1] as u32;
                    self.pos += 2;
                    return Some(self.to_ns(ovl16 + cell));
                }
                StreamOpcode::Flux3 => {
                    if self.pos + 2 >= self.buf.len() {
                        return None;
                    }
                    let cell =
                        u16::from_le_bytes([self.buf[self.pos + 1], self.buf[self.pos + 2]]) as u32;
                    self.pos += 3;
                    return Some(self.to_ns(ovl16 + cell));
                }
                StreamOpcode::Nop(n) => {
                    self.pos += n;
                }
                StreamOpcode::Ovl16 => {
                    self.pos += 1;
                    ovl16 += 0x10000;
                }
                StreamOpcode::Oob => {
                    // Compaction removes all OOB blocks; seeing one here
                    // means the block bounds are wrong.
                    debug_assert!(false, "OOB opcode in compacted stream");
                    log::error!("next_flux(): OOB opcode in compacted stream @ {}", self.pos);
                    self.pos = self.buf.len();
                }
            }
        }
        None
    }

    /// Convert a cell sample count to a nanosecond interval against the
    /// running totals.
    fn to_ns(&mut self, samples: u32) -> u32 {
        #[allow(unused_mut)]
        let mut samples = samples;

        #[cfg(feature = "rand")]
        if self.flags.contains(DecodeFlags::WOBBLE) {
            let wobble: i32 = rand::thread_rng().gen_range(0..4) - 2;
            samples = (samples as i32 + wobble).max(1) as u32;
        }

        self.total_samples += samples as u64;
        let new_ns = (self.scaler * self.total_samples as f64 + 0.5) as u64;
        let delta = (new_ns - self.prev_ns) as u32;
        self.prev_ns = new_ns;
        delta
    }
}
