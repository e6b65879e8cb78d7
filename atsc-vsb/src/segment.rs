//! Fixed-size records exchanged between pipeline stages.

use crate::plinfo::PipelineInfo;
use crate::{symbol_level, SEGMENT_SIZE, TSP_SIZE, TS_DATA_SIZE, TS_SIZE, TS_SYNC_BYTE};

/// 188-byte MPEG-2 transport packet, sync byte included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegPacket {
    pub data: [u8; TS_SIZE],
}

/// Whitened payload without the sync byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizedPacket {
    pub pli: PipelineInfo,
    pub data: [u8; TS_DATA_SIZE],
}

/// Payload plus 20 bytes of Reed-Solomon parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsEncodedPacket {
    pub pli: PipelineInfo,
    pub data: [u8; TSP_SIZE],
}

/// One segment of 3-bit symbol codes (0..=7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub pli: PipelineInfo,
    pub data: [u8; SEGMENT_SIZE],
}

/// One segment of received soft symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftDataSegment {
    pub pli: PipelineInfo,
    pub data: [f32; SEGMENT_SIZE],
}

impl Default for MpegPacket {
    fn default() -> Self {
        let mut data = [0u8; TS_SIZE];
        data[0] = TS_SYNC_BYTE;
        MpegPacket { data }
    }
}

macro_rules! zeroed_default {
    ($name:ident, $zero:expr) => {
        impl Default for $name {
            fn default() -> Self {
                $name {
                    pli: PipelineInfo::default(),
                    data: $zero,
                }
            }
        }
    };
}

zeroed_default!(RandomizedPacket, [0u8; TS_DATA_SIZE]);
zeroed_default!(RsEncodedPacket, [0u8; TSP_SIZE]);
zeroed_default!(DataSegment, [0u8; SEGMENT_SIZE]);
zeroed_default!(SoftDataSegment, [0f32; SEGMENT_SIZE]);

impl MpegPacket {
    /// Packet with the given 187 payload bytes behind a sync byte.
    pub fn from_payload(payload: &[u8; TS_DATA_SIZE]) -> MpegPacket {
        let mut packet = MpegPacket::default();
        packet.data[1..].copy_from_slice(payload);
        return packet;
    }

    pub fn has_sync_byte(&self) -> bool {
        self.data[0] == TS_SYNC_BYTE
    }
}

impl DataSegment {
    /// Map symbol codes to nominal 8-VSB levels.
    pub fn to_levels(&self) -> [f32; SEGMENT_SIZE] {
        let mut levels = [0f32; SEGMENT_SIZE];
        for (l, s) in levels.iter_mut().zip(self.data.iter()) {
            *l = symbol_level(*s);
        }
        return levels;
    }
}

impl SoftDataSegment {
    pub fn from_segment(segment: &DataSegment) -> SoftDataSegment {
        SoftDataSegment {
            pli: segment.pli,
            data: segment.to_levels(),
        }
    }
}
