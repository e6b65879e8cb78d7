//! 12-way interleaved trellis decoder.
//!
//! Each of the twelve decoders sees only the symbols its encoder produced, in
//! the order given by [`crate::trellis::mux_plan`]. A single decoder is either
//! a 4-state Viterbi decoder or a plain slicer, both followed by the inverse of
//! the X2 precoder. Per-decoder FIFOs pad the decoding delay out to one full
//! batch so that every decoded byte lands in the packet it came from, twelve
//! segments later.

use std::sync::OnceLock;

use tracing::warn;

use crate::block::{Block, Work};
use crate::interleaver::DelayLine;
use crate::segment::{RsEncodedPacket, SoftDataSegment};
use crate::trellis::{mux_plan, MuxSlot, SYMBOLS_PER_ENCODER};
use crate::{symbol_level, NCODERS, SEGMENT_SIZE, TSP_SIZE};

const TRACEBACK_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DecoderKind {
    /// 4-state Viterbi decoder
    #[default]
    #[clap(name = "viterbi")]
    Viterbi,
    /// Hard decision on the uncoded levels
    #[clap(name = "slicer")]
    Slicer,
}

/// Decoder for the symbol stream of one trellis encoder.
pub trait SymbolDecoder {
    /// Feed one soft symbol and get back the dibit (X2, X1) decided
    /// `delay()` symbols earlier.
    fn decode(&mut self, input: f32) -> u8;
    fn reset(&mut self);
    fn delay(&self) -> usize;
    /// Best path metric after the last step, 0 for decoders without one.
    fn best_metric(&self) -> f32 {
        0.0
    }
}

/// Inverse of the X2 precoder: X2 = Y2 xor previous Y2.
#[derive(Debug, Clone, Copy, Default)]
struct PostCoder {
    previous: u8,
}

impl PostCoder {
    fn apply(&mut self, dibit: u8) -> u8 {
        let y2 = dibit >> 1;
        let x2 = y2 ^ self.previous;
        self.previous = y2;
        return (x2 << 1) | (dibit & 1);
    }
}

#[derive(Debug, Clone)]
pub struct SingleViterbi {
    path_metrics: [[f32; 4]; 2],
    traceback: [[u64; 4]; 2],
    phase: usize,
    post_coder: PostCoder,
    best_metric: f32,
}

impl Default for SingleViterbi {
    fn default() -> Self {
        SingleViterbi::new()
    }
}

impl SingleViterbi {
    pub fn new() -> SingleViterbi {
        SingleViterbi {
            path_metrics: [[0.0; 4]; 2],
            traceback: [[0; 4]; 2],
            phase: 0,
            post_coder: PostCoder::default(),
            best_metric: 0.0,
        }
    }
}

impl SymbolDecoder for SingleViterbi {
    fn decode(&mut self, input: f32) -> u8 {
        let mut distances = [0f32; 8];
        for (z, d) in distances.iter_mut().enumerate() {
            let e = input - symbol_level(z as u8);
            *d = e * e;
        }
        let current = self.phase;
        let next = current ^ 1;
        let mut best_state = 0;
        let mut best_metric = f32::INFINITY;
        for state in 0..4usize {
            let (b1, b0) = ((state >> 1) & 1, state & 1);
            let mut min_metric = f32::INFINITY;
            let mut min_prev = 0;
            let mut min_dibit = 0u64;
            // A predecessor shares its low bit with our high bit; its high bit
            // together with our low bit fixes X1. Z2 is uncoded, giving two
            // parallel branches per transition.
            for prev_b1 in 0..2usize {
                let prev = (prev_b1 << 1) | b1;
                let x1 = b0 ^ prev_b1;
                let z0 = prev & 1;
                for z2 in 0..2usize {
                    let symbol = (z2 << 2) | (x1 << 1) | z0;
                    let metric = self.path_metrics[current][prev] + distances[symbol];
                    if metric < min_metric {
                        min_metric = metric;
                        min_prev = prev;
                        min_dibit = ((z2 << 1) | x1) as u64;
                    }
                }
            }
            self.path_metrics[next][state] = min_metric;
            self.traceback[next][state] = (self.traceback[current][min_prev] << 2) | min_dibit;
            if min_metric < best_metric {
                best_metric = min_metric;
                best_state = state;
            }
        }
        for m in self.path_metrics[next].iter_mut() {
            *m -= best_metric;
        }
        self.phase = next;
        self.best_metric = best_metric;
        let dibit = ((self.traceback[next][best_state] >> (2 * TRACEBACK_DEPTH - 2)) & 3) as u8;
        return self.post_coder.apply(dibit);
    }

    fn reset(&mut self) {
        *self = SingleViterbi::new();
    }

    fn delay(&self) -> usize {
        TRACEBACK_DEPTH - 1
    }

    fn best_metric(&self) -> f32 {
        self.best_metric
    }
}

/// Slices Z2 Z1 straight from the level, ignoring the trellis.
#[derive(Debug, Clone, Default)]
pub struct Slicer {
    post_coder: PostCoder,
}

impl SymbolDecoder for Slicer {
    fn decode(&mut self, input: f32) -> u8 {
        let dibit = if input < -4.0 {
            0
        } else if input < 0.0 {
            1
        } else if input < 4.0 {
            2
        } else {
            3
        };
        return self.post_coder.apply(dibit);
    }

    fn reset(&mut self) {
        self.post_coder = PostCoder::default();
    }

    fn delay(&self) -> usize {
        0
    }
}

/// Receiver side of the mux plan: for decoder `e`, the i-th symbol it reads
/// and the bit position its i-th output dibit goes to.
struct DecoderTables {
    symbol: Vec<[u16; SYMBOLS_PER_ENCODER]>,
    bit: Vec<[u16; SYMBOLS_PER_ENCODER]>,
}

static DECODER_TABLES: OnceLock<DecoderTables> = OnceLock::new();

fn decoder_tables() -> &'static DecoderTables {
    DECODER_TABLES.get_or_init(|| {
        let mut tables = DecoderTables {
            symbol: vec![[0; SYMBOLS_PER_ENCODER]; NCODERS],
            bit: vec![[0; SYMBOLS_PER_ENCODER]; NCODERS],
        };
        let mut fill = [0usize; NCODERS];
        for (pos, slot) in mux_plan().iter().enumerate() {
            if let MuxSlot::Data {
                encoder,
                byte,
                shift,
            } = *slot
            {
                let e = encoder as usize;
                tables.symbol[e][fill[e]] = pos as u16;
                tables.bit[e][fill[e]] = byte * 8 + shift as u16;
                fill[e] += 1;
            }
        }
        tables
    })
}

pub struct ViterbiDecoder {
    decoders: Vec<Box<dyn SymbolDecoder + Send>>,
    fifos: Vec<DelayLine<u8>>,
    pending: Vec<SoftDataSegment>,
}

impl ViterbiDecoder {
    pub fn new(kind: DecoderKind) -> ViterbiDecoder {
        let mut decoders: Vec<Box<dyn SymbolDecoder + Send>> = Vec::with_capacity(NCODERS);
        for _ in 0..NCODERS {
            match kind {
                DecoderKind::Viterbi => decoders.push(Box::new(SingleViterbi::new())),
                DecoderKind::Slicer => decoders.push(Box::new(Slicer::default())),
            }
        }
        let fifos = decoders
            .iter()
            .map(|d| DelayLine::new(SYMBOLS_PER_ENCODER - d.delay()))
            .collect();
        return ViterbiDecoder {
            decoders,
            fifos,
            pending: Vec::with_capacity(NCODERS),
        };
    }

    pub fn best_metrics(&self) -> Vec<f32> {
        self.decoders.iter().map(|d| d.best_metric()).collect()
    }

    /// Decode one aligned batch of twelve segments into twelve packets. The
    /// packets carry the bytes of the batch twelve segments earlier.
    pub fn decode_batch(&mut self, input: &[SoftDataSegment], output: &mut [RsEncodedPacket]) {
        assert_eq!(input.len(), NCODERS);
        assert!(output.len() >= NCODERS);
        let tables = decoder_tables();
        for (out, seg) in output.iter_mut().zip(input.iter()) {
            out.pli = seg.pli.delay(NCODERS);
            out.data = [0; TSP_SIZE];
        }
        for e in 0..NCODERS {
            let decoder = &mut self.decoders[e];
            let fifo = &mut self.fifos[e];
            for i in 0..SYMBOLS_PER_ENCODER {
                let pos = tables.symbol[e][i] as usize;
                let soft = input[pos / SEGMENT_SIZE].data[pos % SEGMENT_SIZE];
                let dibit = fifo.stuff(decoder.decode(soft));
                let bit = tables.bit[e][i] as usize;
                let byte = bit >> 3;
                output[byte / TSP_SIZE].data[byte % TSP_SIZE] |= dibit << (bit & 7);
            }
        }
    }
}

impl Block for ViterbiDecoder {
    type Input = SoftDataSegment;
    type Output = RsEncodedPacket;

    fn work(&mut self, input: &[SoftDataSegment], output: &mut [RsEncodedPacket]) -> Work {
        let mut consumed = 0;
        let mut produced = 0;
        for seg in input {
            if self.pending.len() == NCODERS - 1 && output.len() - produced < NCODERS {
                break;
            }
            consumed += 1;
            if !seg.pli.is_regular() {
                continue;
            }
            match self.pending.last() {
                None => {
                    if seg.pli.segno() as usize % NCODERS != 0 {
                        continue;
                    }
                }
                Some(last) => {
                    if last.pli.next() != seg.pli {
                        warn!(
                            expected = last.pli.next().segno(),
                            got = seg.pli.segno(),
                            "segment sequence broken, dropping partial batch"
                        );
                        self.pending.clear();
                        if seg.pli.segno() as usize % NCODERS != 0 {
                            continue;
                        }
                    }
                }
            }
            self.pending.push(seg.clone());
            if self.pending.len() == NCODERS {
                let batch = std::mem::take(&mut self.pending);
                self.decode_batch(&batch, &mut output[produced..produced + NCODERS]);
                produced += NCODERS;
                self.pending = batch;
                self.pending.clear();
            }
        }
        return Work::new(consumed, produced);
    }

    fn reset(&mut self) {
        for d in self.decoders.iter_mut() {
            d.reset();
        }
        for f in self.fifos.iter_mut() {
            f.reset();
        }
        self.pending.clear();
    }
}
