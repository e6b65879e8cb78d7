//! 12-way interleaved trellis encoder.
//!
//! Each byte of a 12 segment batch is split into four dibits (MSB first) that
//! all go through the same one of twelve rate 2/3 encoders (precoder on X2,
//! 4-state convolutional code on X1). The order in which encoders are visited
//! shifts by four whenever a segment sync is inserted, so the byte-to-encoder
//! assignment of the receiver has to follow exactly the same walk. That walk is
//! captured once in [`mux_plan`] and shared by both sides.

use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::block::{Block, Work};
use crate::segment::{DataSegment, RsEncodedPacket};
use crate::{NCODERS, SEGMENT_SIZE, SEGMENT_SYNC, SEGMENT_SYNC_LEN, TSP_SIZE};

/// Encoder advance applied at every segment boundary.
const ENCODER_SEG_BUMP: usize = 4;
/// Symbols per batch carried by each encoder.
pub const SYMBOLS_PER_ENCODER: usize = SEGMENT_SIZE - SEGMENT_SYNC_LEN;
const BATCH_SYMBOLS: usize = NCODERS * SEGMENT_SIZE;
const BATCH_BYTES: usize = NCODERS * TSP_SIZE;

/// Indexed by `state << 2 | dibit`, where state is (precoder bit, 2-bit
/// convolutional state).
const NEXT_STATE: [u8; 32] = [
    0, 1, 4, 5, 2, 3, 6, 7, 1, 0, 5, 4, 3, 2, 7, 6, 4, 5, 0, 1, 6, 7, 2, 3, 5, 4, 1, 0, 7, 6, 3, 2,
];
const OUT_SYMBOL: [u8; 32] = [
    0, 2, 4, 6, 1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7, 4, 6, 0, 2, 5, 7, 1, 3, 4, 6, 0, 2, 5, 7, 1, 3,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTrellisEncoder {
    state: u8,
}

impl BasicTrellisEncoder {
    pub fn new() -> BasicTrellisEncoder {
        BasicTrellisEncoder { state: 0 }
    }

    /// Encode dibit (X2, X1) into a 3-bit symbol code (Z2, Z1, Z0).
    pub fn encode(&mut self, dibit: u8) -> u8 {
        let index = ((self.state << 2) | (dibit & 3)) as usize;
        self.state = NEXT_STATE[index];
        return OUT_SYMBOL[index];
    }

    pub fn reset(&mut self) {
        self.state = 0;
    }
}

/// One symbol slot of a 12 segment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxSlot {
    /// The n-th segment sync symbol.
    Sync(u8),
    /// Dibit at bit `shift` of byte `byte` of the batch, coded by `encoder`.
    Data { encoder: u8, byte: u16, shift: u8 },
}

static MUX_PLAN: OnceLock<Vec<MuxSlot>> = OnceLock::new();

fn build_mux_plan() -> Vec<MuxSlot> {
    let mut plan = Vec::with_capacity(BATCH_SYMBOLS);
    let mut byte_of_encoder = [0u16; NCODERS];
    // the first chunk reload bumps this to encoder 0
    let mut encoder = NCODERS - ENCODER_SEG_BUMP;
    let mut skip_encoder_bump = false;
    let mut next_segment = 0;
    for chunk in (0..BATCH_BYTES).step_by(NCODERS) {
        // Reload the twelve byte registers, one per encoder.
        if plan.len() >= next_segment {
            encoder = (encoder + ENCODER_SEG_BUMP) % NCODERS;
            skip_encoder_bump = true;
        }
        for i in 0..NCODERS {
            byte_of_encoder[encoder] = (chunk + i) as u16;
            encoder = (encoder + 1) % NCODERS;
        }
        for shift in [6u8, 4, 2, 0] {
            if plan.len() >= next_segment {
                for k in 0..SEGMENT_SYNC_LEN {
                    plan.push(MuxSlot::Sync(k as u8));
                }
                next_segment = plan.len() + SYMBOLS_PER_ENCODER;
                if !skip_encoder_bump {
                    encoder = (encoder + ENCODER_SEG_BUMP) % NCODERS;
                }
                skip_encoder_bump = false;
            }
            for _ in 0..NCODERS {
                plan.push(MuxSlot::Data {
                    encoder: encoder as u8,
                    byte: byte_of_encoder[encoder],
                    shift,
                });
                encoder = (encoder + 1) % NCODERS;
            }
        }
    }
    debug_assert_eq!(plan.len(), BATCH_SYMBOLS);
    return plan;
}

/// Symbol-by-symbol layout of a 12 segment batch.
pub fn mux_plan() -> &'static [MuxSlot] {
    MUX_PLAN.get_or_init(build_mux_plan)
}

/// 12 trellis encoders fed from batches of 12 interleaved packets. Packets are
/// buffered until a batch is complete; a batch must start at a segment number
/// divisible by 12.
#[derive(Debug, Clone)]
pub struct TrellisEncoder {
    encoders: [BasicTrellisEncoder; NCODERS],
    pending: VecDeque<RsEncodedPacket>,
}

impl Default for TrellisEncoder {
    fn default() -> Self {
        TrellisEncoder::new()
    }
}

impl TrellisEncoder {
    pub fn new() -> TrellisEncoder {
        TrellisEncoder {
            encoders: [BasicTrellisEncoder::new(); NCODERS],
            pending: VecDeque::with_capacity(NCODERS),
        }
    }

    pub fn encode_batch(&mut self, input: &[RsEncodedPacket], output: &mut [DataSegment]) {
        assert_eq!(input.len(), NCODERS);
        assert!(output.len() >= NCODERS);
        assert!(
            input[0].pli.is_regular() && input[0].pli.segno() as usize % NCODERS == 0,
            "trellis batch starts at segment {}",
            input[0].pli.segno()
        );
        for (pos, slot) in mux_plan().iter().enumerate() {
            let symbol = match *slot {
                MuxSlot::Sync(k) => SEGMENT_SYNC[k as usize],
                MuxSlot::Data {
                    encoder,
                    byte,
                    shift,
                } => {
                    let byte = byte as usize;
                    let dibit = (input[byte / TSP_SIZE].data[byte % TSP_SIZE] >> shift) & 3;
                    self.encoders[encoder as usize].encode(dibit)
                }
            };
            output[pos / SEGMENT_SIZE].data[pos % SEGMENT_SIZE] = symbol;
        }
        for (out, packet) in output.iter_mut().zip(input.iter()) {
            out.pli = packet.pli;
        }
    }
}

impl Block for TrellisEncoder {
    type Input = RsEncodedPacket;
    type Output = DataSegment;

    fn work(&mut self, input: &[RsEncodedPacket], output: &mut [DataSegment]) -> Work {
        let mut consumed = 0;
        let mut produced = 0;
        for packet in input {
            if self.pending.len() == NCODERS - 1 && output.len() - produced < NCODERS {
                break;
            }
            self.pending.push_back(packet.clone());
            consumed += 1;
            if self.pending.len() == NCODERS {
                let batch: Vec<RsEncodedPacket> = self.pending.drain(..).collect();
                self.encode_batch(&batch, &mut output[produced..produced + NCODERS]);
                produced += NCODERS;
            }
        }
        return Work::new(consumed, produced);
    }

    fn reset(&mut self) {
        for e in self.encoders.iter_mut() {
            e.reset();
        }
        self.pending.clear();
    }
}
