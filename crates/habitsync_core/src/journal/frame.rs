//! Journal frame layout.
//!
//! ```text
//! magic (4) | version (2) | payload length (4) | payload | crc32 (4)
//! ```
//!
//! The CRC covers header and payload. A frame cut short by a crash is a
//! torn tail and ends the journal; anything else that fails to parse is
//! corruption.

use crate::error::{CoreError, CoreResult};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"HSJF";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

const HEADER_SIZE: usize = 10;
const CRC_SIZE: usize = 4;

/// Wraps a payload in a frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Frames recovered from a journal.
#[derive(Debug)]
pub struct DecodedFrames<'a> {
    /// Payloads of every complete frame, in order.
    pub payloads: Vec<&'a [u8]>,
    /// Bytes covered by complete frames. Less than the input length when the
    /// journal ends in a torn frame.
    pub valid_len: usize,
}

/// Splits journal bytes into frame payloads.
pub fn decode_frames<'a>(collection: &'static str, bytes: &'a [u8]) -> CoreResult<DecodedFrames<'a>> {
    let mut payloads = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        if rest[0..4] != FRAME_MAGIC {
            return Err(CoreError::corrupted(
                collection,
                format!("invalid magic at offset {pos}"),
            ));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > FRAME_VERSION {
            return Err(CoreError::corrupted(
                collection,
                format!("unsupported frame version {version} at offset {pos}"),
            ));
        }

        let payload_len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total_len {
            break;
        }

        let payload_end = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            rest[payload_end],
            rest[payload_end + 1],
            rest[payload_end + 2],
            rest[payload_end + 3],
        ]);
        let computed = compute_crc32(&rest[..payload_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                collection,
                expected: stored,
                actual: computed,
            });
        }

        payloads.push(&rest[HEADER_SIZE..payload_end]);
        pos += total_len;
    }

    Ok(DecodedFrames {
        payloads,
        valid_len: pos,
    })
}

/// Computes a CRC32 (IEEE) checksum.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
