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

    src/flux/pll.rs

    A software digital phase-locked loop over a flux interval stream.

    The PLL decides, per nominal cell window, whether a flux transition
    arrived in it, emitting one bit per cell. Each arriving transition is
    classified into one of 16 slots across the window; the slot drives a
    table-based phase correction and a set of hysteresis counters that nudge
    the cell period to follow media speed variation, clamped to a few
    percent around nominal.
*/
use crate::flux::FluxReader;

/// Phase correction table, indexed by `(correction row, slot)`. The next
/// cell edge lands at `ctime + table[row][slot] * cell_ticks / 16`, so a
/// perfectly centered transition (slot 7-8) re-centers the window and
/// off-center transitions drag the edge toward the transition.
///
/// Row 1 is the default correction; row 0 is the reduced correction used
/// for the cell after a frequency adjustment or repeated moderate error.
#[rustfmt::skip]
pub const PHASE_ADJUST: [[u32; 16]; 2] = [
    [12, 12, 11, 11, 10, 10, 9, 9, 8, 8, 7, 7, 6, 6, 5, 5],
    [13, 13, 12, 12, 11, 11, 10, 9, 8, 7, 6, 6, 5, 5, 4, 4],
];

/// Frequency nudges fire after this many consecutive off-center transitions.
const FREQ_HYSTERESIS: u8 = 3;
/// The reduced-correction row engages after this many moderate errors.
const PARTIAL_HYSTERESIS: u8 = 2;

/// Adaptive bit extraction over one block's flux intervals.
///
/// All times are nanoseconds from the start of the block. The state is
/// intentionally cheap to rebuild: the sector decoder constructs and resets
/// one of these per retry attempt.
pub struct Pll<'a> {
    reader: FluxReader<'a>,

    /// Nominal cell width in ns, from the format profile.
    cell_ns: u32,
    /// Current adapted cell width.
    cell_ticks: u32,
    min_cell: u32,
    max_cell: u32,

    /// Time of the most recent flux transition.
    ctime: u64,
    /// Time of the next expected cell edge.
    etime: u64,

    // Hysteresis counters: off-center, extreme-early, extreme-late,
    // moderate (partial-correction) transitions.
    f_cnt: u8,
    aif_cnt: u8,
    adf_cnt: u8,
    pc_cnt: u8,
    /// Direction of the current frequency drift.
    up: bool,

    /// While set, a transition arriving inside the current cell restarts
    /// lock acquisition from scratch.
    resync: bool,
    /// Minimum clean clock bits required by `sync()`.
    min_sync_clk: u32,

    /// Flux time accumulated toward the next period re-estimate.
    resync_accum: u64,
    /// Re-estimate the cell period after this much flux, expressed in
    /// nominal cells. 0 disables re-estimation.
    resync_period: u32,
}

impl<'a> Pll<'a> {
    pub fn new(reader: FluxReader<'a>, cell_ns: u32) -> Pll<'a> {
        Pll {
            reader,
            cell_ns,
            cell_ticks: cell_ns,
            min_cell: cell_ns,
            max_cell: cell_ns,
            ctime: 0,
            etime: 0,
            f_cnt: 0,
            aif_cnt: 0,
            adf_cnt: 0,
            pc_cnt: 0,
            up: false,
            resync: true,
            min_sync_clk: 128,
            resync_accum: 0,
            resync_period: 0,
        }
    }

    /// Seed the loop from the first flux interval of the block and set the
    /// adaptation band to `percent` of nominal. Returns false if the block
    /// has no flux at all.
    pub fn reset(&mut self, min_sync_clk: u32, percent: u32) -> bool {
        let Some(first) = self.reader.next_flux() else {
            return false;
        };

        self.ctime = first as u64;
        self.cell_ticks = self.cell_ns;
        self.f_cnt = 0;
        self.aif_cnt = 0;
        self.adf_cnt = 0;
        self.pc_cnt = 0;
        self.up = false;
        // Prime the edge half a cell past the seed transition.
        self.etime = first as u64 + (self.cell_ticks / 2) as u64;
        self.resync = true;
        self.max_cell = self.cell_ns + percent * (self.cell_ns / 100);
        self.min_cell = self.cell_ns - percent * (self.cell_ns / 100);
        self.min_sync_clk = min_sync_clk;
        self.resync_accum = 0;
        true
    }

    /// Re-estimate the cell period every `period` nominal cells worth of
    /// flux. Wider periods trust the loop more; the retry schedule starts
    /// wide and narrows.
    pub fn set_resync_period(&mut self, period: u32) {
        self.resync_period = period;
    }

    /// Mark lock acquired: glitches no longer restart the loop.
    pub fn set_synced(&mut self) {
        self.resync = false;
    }

    pub fn cell_ticks(&self) -> u32 {
        self.cell_ticks
    }

    pub fn up(&self) -> bool {
        self.up
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.reader.elapsed_ns()
    }

    pub fn phys_sector(&self) -> u8 {
        self.reader.phys_sector()
    }

    /// The next decoded bit, or `None` at the end of the block.
    pub fn next_bit(&mut self) -> Option<bool> {
        // Correction row for this cell; drops to the reduced row when the
        // frequency or partial-correction counters fire.
        let mut cstate = 1usize;

        // Pull transitions until one lands at or past the current edge.
        while self.ctime < self.etime {
            let flux = self.next_interval()? as u64;
            if self.resync && self.ctime + flux < self.etime {
                // Glitch while acquiring lock: restart from this transition.
                self.ctime = flux;
                self.cell_ticks = self.cell_ns;
                self.f_cnt = 0;
                self.aif_cnt = 0;
                self.adf_cnt = 0;
                self.pc_cnt = 0;
                self.up = false;
                self.etime = flux + (self.cell_ticks / 2) as u64;
            }
            else {
                self.ctime += flux;
            }
        }

        let slot = (16 * (self.ctime - self.etime) / self.cell_ticks as u64) as usize;
        if slot >= 16 {
            // No transition in this cell; advance one cell and emit 0.
            self.etime += self.cell_ticks as u64;
            return Some(false);
        }

        if !(7..=8).contains(&slot) {
            // Direction flips when the transition crosses the midline.
            if (slot <= 6 && !self.up) || (slot >= 9 && self.up) {
                self.up = !self.up;
                self.pc_cnt = 0;
                self.f_cnt = 0;
            }

            // NOTE: the extreme-slot counters are only consulted when the
            // general counter has not already fired, so at most one counter
            // advances the frequency per cell.
            self.f_cnt += 1;
            let mut adjust = self.f_cnt >= FREQ_HYSTERESIS;
            if !adjust && slot < 3 {
                self.aif_cnt += 1;
                adjust = self.aif_cnt >= FREQ_HYSTERESIS;
            }
            if !adjust && slot > 12 {
                self.adf_cnt += 1;
                adjust = self.adf_cnt >= FREQ_HYSTERESIS;
            }

            if adjust {
                if self.up && self.cell_ticks > self.min_cell {
                    self.cell_ticks -= self.cell_ns / 100;
                }
                else if !self.up && self.cell_ticks < self.max_cell {
                    self.cell_ticks += self.cell_ns / 100;
                }
                self.cell_ticks = self.cell_ticks.clamp(self.min_cell, self.max_cell);
                cstate = 0;
                self.f_cnt = 0;
                self.pc_cnt = 0;
                self.aif_cnt = 0;
                self.adf_cnt = 0;
            }
            else {
                self.pc_cnt += 1;
                if self.pc_cnt >= PARTIAL_HYSTERESIS {
                    cstate = 0;
                    self.pc_cnt = 0;
                }
            }
        }

        self.etime =
            self.ctime + (PHASE_ADJUST[cstate][slot] * self.cell_ticks) as u64 / 16;
        Some(true)
    }

    /// Read one interval, folding it into the period re-estimation window.
    fn next_interval(&mut self) -> Option<u32> {
        let flux = self.reader.next_flux()?;

        if self.resync_period != 0 {
            self.resync_accum += flux as u64;
            if self.resync_accum > (self.resync_period as u64) * (self.cell_ns as u64) {
                // Average the window into a whole number of cells, the same
                // way the byte-domain decoder renormalizes its clock.
                let cells = (self.resync_accum as f64 / self.cell_ticks as f64 + 0.5) as u64;
                if cells > 0 {
                    let new_ticks = (self.resync_accum / cells) as u32;
                    self.cell_ticks = new_ticks.clamp(self.min_cell, self.max_cell);
                }
                self.resync_accum = 0;
            }
        }

        Some(flux)
    }

    /// Hunt for byte synchronization.
    ///
    /// First waits for 64 cells of alternating 1/0 (a run of FM idle: all
    /// clock bits set, all data bits clear), which both locks the loop and
    /// fixes the clock/data phase. Then shifts in clock/data bit pairs until
    /// at least `min_sync_clk` clock bits have been seen, the last 32 clock
    /// bits are all set, and the data history matches the format's
    /// address-mark prologue. Returns the first framed cell with an assumed
    /// clock of 0xFF, or `None` at end of block.
    pub fn sync(&mut self, prologue_mask: u32, prologue: u32) -> Option<u16> {
        let mut pattern: u64 = 0;
        while pattern != 0xAAAA_AAAA_AAAA_AAAA {
            let bit = self.next_bit()?;
            pattern = (pattern << 1) | bit as u64;
        }
        self.set_synced();

        let mut clk_cnt: u32 = 32;
        let mut clk_pattern: u32 = 0xFFFF_FFFF;
        let mut data_pattern: u32 = 0;

        while clk_cnt < self.min_sync_clk
            || clk_pattern != 0xFFFF_FFFF
            || (data_pattern & prologue_mask) != prologue
        {
            let bit = self.next_bit()?;
            clk_pattern = (clk_pattern << 1) | bit as u32;
            let bit = self.next_bit()?;
            data_pattern = (data_pattern << 1) | bit as u32;
            clk_cnt += 2;
        }

        Some(0xFF00 | (data_pattern & 0xFF) as u16)
    }

    /// Assemble the next 16-bit cell: 8 clock/data bit pairs, clock bits in
    /// the high byte and data bits in the low byte.
    pub fn read_cell(&mut self) -> Option<u16> {
        let mut bval: u16 = 0;
        for _ in 0..8 {
            let clock = self.next_bit()?;
            let data = self.next_bit()?;
            bval = (bval << 1) | ((clock as u16) << 8) | data as u16;
        }
        Some(bval)
    }

    /// The next logical data bit: one clock/data pair with the clock bit
    /// discarded. A set data bit counts as 1 whether or not its clock
    /// survived.
    pub fn read_data_bit(&mut self) -> Option<bool> {
        let _clock = self.next_bit()?;
        self.next_bit()
    }
}
