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

    src/track/slot.rs

    Maps stream byte offsets to logical sector slots, so that a sector
    whose address mark never decoded leaves a gap in the track instead of
    shifting every later sector down by one.
*/

/// Byte-offset slack absorbed before a mark is pushed into the next slot.
pub const JITTER_ALLOWANCE: i64 = 20;

/// The kind of mark driving a slot decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotMark {
    /// Index hole / index address mark: start of a track copy.
    Index,
    /// ID address mark.
    Id,
    /// Data or deleted-data address mark.
    Data,
}

pub struct SlotAllocator {
    /// Byte offset of the current slot's base mark.
    slot_byte_number: i64,
    slot: u8,
    /// Nominal bytes between an ID mark and its data mark.
    inter_marker_bytes: i64,
    /// Nominal bytes between consecutive ID marks.
    inter_sector_bytes: i64,
    /// Nanoseconds per encoded byte, from the format profile.
    byte_ns: f64,
}

impl SlotAllocator {
    pub fn new(inter_sector_bytes: u32, inter_marker_bytes: u32, byte_ns: f64) -> SlotAllocator {
        SlotAllocator {
            slot_byte_number: 0,
            slot: 0,
            inter_marker_bytes: inter_marker_bytes as i64,
            inter_sector_bytes: inter_sector_bytes as i64,
            byte_ns,
        }
    }

    fn time_to_byte(&self, elapsed_ns: u64) -> i64 {
        (elapsed_ns as f64 / self.byte_ns + 0.5) as i64
    }

    /// Account for a mark observed `elapsed_ns` into the block and return
    /// the logical slot it belongs to.
    pub fn slot_for(&mut self, mark: SlotMark, elapsed_ns: u64) -> u8 {
        let mut t = self.time_to_byte(elapsed_ns);

        match mark {
            SlotMark::Index => {
                // New track copy.
                self.slot_byte_number = 0;
                self.slot = 0;
            }
            SlotMark::Data if t - self.slot_byte_number < 128 => {
                // Less than a sector past the ID mark: same slot.
            }
            mark => {
                if mark == SlotMark::Data {
                    // Normalize a data mark back to its ID mark position.
                    t -= self.inter_marker_bytes;
                }
                if self.slot_byte_number == 0 {
                    // First mark seen: back its offset up to slot 0.
                    self.slot_byte_number = t;
                    while self.slot_byte_number > self.inter_sector_bytes {
                        self.slot_byte_number -= self.inter_sector_bytes;
                    }
                    self.slot = 0;
                }
                let mut slot_inc: u8 = 0;
                while t - self.slot_byte_number > self.inter_sector_bytes - JITTER_ALLOWANCE {
                    self.slot_byte_number += self.inter_sector_bytes;
                    slot_inc += 1;
                }
                if slot_inc >= 3 {
                    log::warn!("slot_for(): {} consecutive sectors missing", slot_inc);
                }
                self.slot = self.slot.saturating_add(slot_inc);
                if slot_inc != 0 {
                    // Re-base on the observed mark to stop jitter from
                    // accumulating across the gap.
                    self.slot_byte_number = t;
                }
            }
        }
        self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BYTE_NS: f64 = 32_000.0;

    fn at_bytes(n: i64) -> u64 {
        (n as f64 * BYTE_NS) as u64
    }

    #[test]
    fn test_sequential_sectors() {
        let mut slots = SlotAllocator::new(163, 33, BYTE_NS);
        assert_eq!(slots.slot_for(SlotMark::Index, 0), 0);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10)), 0);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10 + 163)), 1);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10 + 2 * 163)), 2);
    }

    #[test]
    fn test_missing_sector_leaves_gap() {
        let mut slots = SlotAllocator::new(163, 33, BYTE_NS);
        slots.slot_for(SlotMark::Index, 0);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10)), 0);
        // The next observed ID is two sector times later: slot 1 is missing.
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10 + 2 * 163)), 2);
    }

    #[test]
    fn test_jitter_absorbed() {
        let mut slots = SlotAllocator::new(163, 33, BYTE_NS);
        slots.slot_for(SlotMark::Index, 0);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10)), 0);
        // A mark up to the jitter allowance early still lands in the next
        // slot, not two ahead.
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10 + 163 - 15)), 1);
    }

    #[test]
    fn test_data_mark_same_slot() {
        let mut slots = SlotAllocator::new(163, 33, BYTE_NS);
        slots.slot_for(SlotMark::Index, 0);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(10)), 0);
        // The data mark a few bytes later belongs to the same slot.
        assert_eq!(slots.slot_for(SlotMark::Data, at_bytes(43)), 0);
    }

    #[test]
    fn test_first_sector_missing() {
        let mut slots = SlotAllocator::new(163, 33, BYTE_NS);
        slots.slot_for(SlotMark::Index, 0);
        // First observed ID is in the second sector position; the base is
        // backed up to where slot 0 would have been, so the ID lands in
        // slot 1 and slot 0 is left as a gap.
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(170)), 1);
        assert_eq!(slots.slot_for(SlotMark::Id, at_bytes(170 + 163)), 2);
    }
}
