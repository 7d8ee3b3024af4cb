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

    src/stream/oob.rs

    Out-of-band block payloads embedded in a KryoFlux stream at opcode 0x0D,
    and the KFInfo key=value text that carries the capture parameters.
*/
use crate::stream::StreamParameters;
use crate::FluxStreamError;
use binrw::{binrw, BinRead};
use std::io::Cursor;

pub const OOB_HEADER_LEN: usize = 4; // 0x0D, type, len(u16 LE)

pub const STREAM_INFO_PAYLOAD_LEN: usize = 8;
pub const INDEX_PAYLOAD_LEN: usize = 12;
pub const STREAM_END_PAYLOAD_LEN: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OobType {
    Invalid(u8),
    StreamInfo,
    Index,
    StreamEnd,
    KfInfo,
    Eof,
}

impl From<u8> for OobType {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => OobType::StreamInfo,
            0x02 => OobType::Index,
            0x03 => OobType::StreamEnd,
            0x04 => OobType::KfInfo,
            0x0D => OobType::Eof,
            _ => OobType::Invalid(byte),
        }
    }
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct StreamInfoBlock {
    pub stream_pos: u32,
    pub transfer_time_ms: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct IndexBlock {
    pub stream_pos: u32,
    pub sample_counter: u32,
    pub index_counter: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct StreamEndBlock {
    pub stream_pos: u32,
    pub hw_status_code: u32,
}

/// A parsed out-of-band block. `Eof` terminates stream parsing; everything
/// after it is device padding.
#[derive(Debug)]
pub enum OobBlock {
    Invalid(u8),
    StreamInfo(StreamInfoBlock),
    Index(IndexBlock),
    StreamEnd(StreamEndBlock),
    KfInfo(String),
    Eof,
}

impl StreamEndBlock {
    /// Text for the hardware result codes the DiskCon firmware reports.
    pub fn status_str(&self) -> &'static str {
        match self.hw_status_code {
            0 => "Ok",
            1 => "Buffering problem",
            2 => "No index signal",
            _ => "Unknown error",
        }
    }
}

/// Read one OOB block starting at `pos` (the 0x0D opcode byte).
///
/// Returns the parsed block and the total number of stream bytes consumed.
/// A header or payload that runs past the end of the buffer is a premature
/// EOF; the caller decides whether that ends parsing or the load.
pub fn read_oob(buf: &[u8], pos: usize) -> Result<(OobBlock, usize), FluxStreamError> {
    if pos + OOB_HEADER_LEN > buf.len() {
        return Err(FluxStreamError::PrematureEof);
    }

    let oob_type = OobType::from(buf[pos + 1]);
    if oob_type == OobType::Eof {
        // The length field of an EOF block is a filler value; everything
        // after the header is padding.
        return Ok((OobBlock::Eof, buf.len() - pos));
    }

    let len = u16::from_le_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
    let end = pos + OOB_HEADER_LEN + len;
    if end > buf.len() {
        return Err(FluxStreamError::PrematureEof);
    }

    let payload = &buf[pos + OOB_HEADER_LEN..end];
    let consumed = OOB_HEADER_LEN + len;

    let block = match oob_type {
        OobType::StreamInfo => {
            if len != STREAM_INFO_PAYLOAD_LEN {
                log::warn!("read_oob(): bad StreamInfo block length {} - skipped", len);
                OobBlock::Invalid(0x01)
            }
            else {
                OobBlock::StreamInfo(StreamInfoBlock::read(&mut Cursor::new(payload))?)
            }
        }
        OobType::Index => {
            if len != INDEX_PAYLOAD_LEN {
                log::warn!("read_oob(): bad Index block length {} - skipped", len);
                OobBlock::Invalid(0x02)
            }
            else {
                OobBlock::Index(IndexBlock::read(&mut Cursor::new(payload))?)
            }
        }
        OobType::StreamEnd => {
            if len != STREAM_END_PAYLOAD_LEN {
                log::warn!("read_oob(): bad StreamEnd block length {} - skipped", len);
                OobBlock::Invalid(0x03)
            }
            else {
                OobBlock::StreamEnd(StreamEndBlock::read(&mut Cursor::new(payload))?)
            }
        }
        OobType::KfInfo => {
            // Null-terminated ascii; multiple strings may be packed into one
            // payload, so embedded terminators become separators.
            let text: String = payload
                .iter()
                .filter(|&&b| b.is_ascii())
                .map(|&b| if b == 0 { '\n' } else { b as char })
                .collect();
            OobBlock::KfInfo(text)
        }
        OobType::Invalid(byte) => {
            log::warn!("read_oob(): invalid OOB block type {:02X} @ {:X}", byte, pos);
            OobBlock::Invalid(byte)
        }
        OobType::Eof => unreachable!(),
    };

    Ok((block, consumed))
}

/// Apply the `key=value` pairs of a KFInfo block to the stream parameters.
/// Recognized keys are `hc`, `sck`, `ick`, `host_date` and `host_time`;
/// anything else is ignored. An empty payload updates nothing.
pub fn parse_kf_info(text: &str, params: &mut StreamParameters) {
    if text.is_empty() {
        return;
    }

    let re = regex::Regex::new(r"(\w+)=([^,\n]+)").unwrap();
    for caps in re.captures_iter(text) {
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        match key {
            "hc" => {
                if let Ok(hc) = value.parse::<u32>() {
                    params.hc = hc;
                }
            }
            "sck" => {
                if let Ok(sck) = value.parse::<f64>() {
                    log::debug!("parse_kf_info(): set sck to {}", sck);
                    params.sck = sck;
                }
            }
            "ick" => {
                if let Ok(ick) = value.parse::<f64>() {
                    log::debug!("parse_kf_info(): set ick to {}", ick);
                    params.ick = ick;
                }
            }
            "host_date" => {
                params.host_date = Some(value.chars().take(10).collect());
            }
            "host_time" => {
                params.host_time = Some(value.chars().take(8).collect());
            }
            _ => {}
        }
    }
}
