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
*/

//! # fluxrip
//!
//! fluxrip is a Rust library for recovering logical sector data from raw
//! magnetic-flux recordings of vintage floppy disks, of the kind produced by
//! KryoFlux-style capture hardware.
//!
//! It is primarily designed for digital-preservation work on 5.25" and 8"
//! media encoded in FM, MFM or M²FM, including hard-sectored formats whose
//! index hole marks every sector rather than only the start of the track.
//!
//! The decode path is a four-stage pull pipeline:
//!
//! 1. [`stream::FluxStream`] parses the raw stream, separating in-band flux
//!    cells from out-of-band metadata, and segments it into physical blocks
//!    delimited by index pulses.
//! 2. [`flux::FluxReader`] yields the flux intervals of one block, in
//!    nanoseconds.
//! 3. [`flux::pll::Pll`] is a software digital phase-locked loop that turns
//!    flux intervals into a bit stream with adaptive cell timing.
//! 4. [`track`] frames bytes out of the bit stream, locates address marks,
//!    reads sector records and verifies their CRCs, scheduling retries with
//!    different sync parameters until each sector decodes or is exhausted.
//!
//! Each stage pulls from the one before it; no state is shared across
//! threads, and everything is scoped to a single decode operation. Given
//! identical input the output is bit-identical, unless one of the debug-only
//! randomization options in [`DecodeFlags`] is enabled.

pub mod flux;
pub mod stream;
pub mod track;

use bitflags::bitflags;
use thiserror::Error;

pub use flux::FluxReader;
pub use stream::{FluxStream, PhysBlock, StreamParameters};
pub use track::{decode_track, DiskFormat, SectorData, SectorRecord, SectorStatus, TrackSectors};

/// KryoFlux master clock, from which the sample and index clocks derive.
pub const KFX_DEFAULT_MCK: f64 = ((18432000.0 * 73.0) / 14.0) / 2.0;
/// Default sample clock (Hz) when the stream carries no `sck` override.
pub const KFX_DEFAULT_SCK: f64 = KFX_DEFAULT_MCK / 2.0;
/// Default index clock (Hz) when the stream carries no `ick` override.
pub const KFX_DEFAULT_ICK: f64 = KFX_DEFAULT_MCK / 16.0;

#[derive(Debug, Error)]
pub enum FluxStreamError {
    #[error("An IO error occurred reading the flux stream")]
    IoError(String),
    #[error("The flux stream ended prematurely inside an out-of-band block")]
    PrematureEof,
    #[error("The flux stream did not contain any usable flux data")]
    EmptyStream,
    #[error("The requested block could not be found")]
    SeekError,
}

impl From<binrw::Error> for FluxStreamError {
    fn from(err: binrw::Error) -> Self {
        FluxStreamError::IoError(err.to_string())
    }
}

bitflags! {
    /// Debug-only decode options. All of these are off by default; enabling
    /// any of them makes the decode non-deterministic.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct DecodeFlags: u32 {
        /// Perturb each flux interval by a few nanoseconds of drive wobble.
        const WOBBLE       = 0b0000_0001;
        /// Skip a random 0-3 leading flux intervals of each block.
        const START_JITTER = 0b0000_0010;
    }
}
