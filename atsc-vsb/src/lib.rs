//! ATSC A/53 8-VSB physical layer.
//!
//! The transmit chain turns 188-byte MPEG-2 transport packets into 832-symbol
//! data segments (randomizer, RS(207,187), convolutional byte interleaver,
//! 12-way trellis coder, field-sync multiplexer). The receive chain recovers
//! transport packets from baseband samples (symbol timing, field sync,
//! LMS equalizer, Viterbi decoder, deinterleaver, RS decoder, derandomizer).
//!
//! Every stage implements [`block::Block`], so an external scheduler can drive
//! it with whatever input it has and find out how much was consumed and
//! produced.

pub mod block;
pub mod config;
pub mod equalizer;
pub mod error;
pub mod field_sync;
pub mod fpll;
pub mod fs_checker;
pub mod interleaver;
pub mod io;
pub mod plinfo;
pub mod randomizer;
pub mod receiver;
pub mod rs_codec;
pub mod segment;
pub mod symbol_sync;
pub mod transmitter;
pub mod trellis;
pub mod viterbi;

pub use block::{Block, Work};
pub use config::ReceiverConfig;
pub use error::{AtscError, Result};
pub use plinfo::PipelineInfo;
pub use receiver::{Receiver, ReceiverDiagnostics};
pub use segment::{DataSegment, MpegPacket, RandomizedPacket, RsEncodedPacket, SoftDataSegment};
pub use transmitter::Transmitter;
pub use viterbi::DecoderKind;

pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_SIZE: usize = 188;
pub const TS_DATA_SIZE: usize = TS_SIZE - 1;
pub const TS_PARITY_SIZE: usize = 20;
pub const TSP_SIZE: usize = TS_DATA_SIZE + TS_PARITY_SIZE;
/// Transport error indicator, in the second byte of a transport packet.
pub const TRANSPORT_ERROR_BIT: u8 = 0x80;

pub const SEGMENT_SIZE: usize = 832;
pub const SEGMENT_SYNC_LEN: usize = 4;
/// Segment sync pulse as symbol codes (+5, -5, -5, +5).
pub const SEGMENT_SYNC: [u8; SEGMENT_SYNC_LEN] = [6, 1, 1, 6];
pub const DATA_SEGMENTS_PER_FIELD: usize = 312;
pub const SEGMENTS_PER_FIELD: usize = DATA_SEGMENTS_PER_FIELD + 1;

/// Number of interleaved trellis encoders (and Viterbi decoders).
pub const NCODERS: usize = 12;

/// Nominal 8-VSB level of a 3-bit symbol code.
#[inline]
pub fn symbol_level(code: u8) -> f32 {
    return (2 * code as i32 - 7) as f32;
}
