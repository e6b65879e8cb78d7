//! Data randomizer and derandomizer.
//!
//! The payload of every transport packet is XORed with the output of a 16-bit
//! Galois LFSR that is reloaded at the first data segment of each field. The
//! sync byte is not transmitted; the receiver puts it back.

use std::sync::OnceLock;

use crate::block::{Block, Work};
use crate::plinfo::PipelineInfo;
use crate::segment::{MpegPacket, RandomizedPacket};
use crate::{TRANSPORT_ERROR_BIT, TS_DATA_SIZE, TS_SYNC_BYTE};

const PRELOAD_VALUE: u16 = 0x018f;
const FEEDBACK_MASK: u16 = 0xa638;
/// State bits that feed the eight parallel outputs D7..D0.
const OUTPUT_TAPS: u16 = 0xb23c;

/// (state bit, output bit) pairs of the parallel output taps.
const TAP_MAP: [(u16, u8); 8] = [
    (0x8000, 0x01),
    (0x2000, 0x02),
    (0x1000, 0x04),
    (0x0200, 0x08),
    (0x0020, 0x10),
    (0x0010, 0x20),
    (0x0008, 0x40),
    (0x0004, 0x80),
];

static OUTPUT_MAP: OnceLock<Vec<u8>> = OnceLock::new();

fn slow_output_map(state: u16) -> u8 {
    let mut output = 0;
    for (state_bit, output_bit) in TAP_MAP {
        if state & state_bit != 0 {
            output |= output_bit;
        }
    }
    return output;
}

/// 2^14 entry table indexed by `(state & OUTPUT_TAPS) >> 2`.
fn output_map() -> &'static [u8] {
    OUTPUT_MAP.get_or_init(|| {
        (0u32..1 << 14)
            .map(|i| slow_output_map((i << 2) as u16))
            .collect()
    })
}

#[derive(Debug, Clone)]
pub struct Lfsr {
    state: u16,
}

impl Default for Lfsr {
    fn default() -> Self {
        Lfsr::new()
    }
}

impl Lfsr {
    pub fn new() -> Lfsr {
        Lfsr {
            state: PRELOAD_VALUE,
        }
    }

    pub fn reset(&mut self) {
        self.state = PRELOAD_VALUE;
    }

    pub fn state(&self) -> u16 {
        self.state
    }

    /// Parallel tap outputs of the current state.
    pub fn output(&self) -> u8 {
        return output_map()[((self.state & OUTPUT_TAPS) >> 2) as usize];
    }

    pub fn clk(&mut self) {
        if self.state & 1 != 0 {
            self.state = ((self.state ^ FEEDBACK_MASK) >> 1) | 0x8000;
        } else {
            self.state >>= 1;
        }
    }

    /// Whitening byte for the next eight data bits, MSB first, one clock per
    /// bit.
    pub fn next_byte(&mut self) -> u8 {
        let mut byte = 0;
        for bit in (0..8).rev() {
            byte |= self.output() & (1 << bit);
            self.clk();
        }
        return byte;
    }

    fn whiten(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            *b ^= self.next_byte();
        }
    }
}

/// Strips the sync byte, whitens the payload and stamps each packet with the
/// position of the data segment it will occupy.
#[derive(Debug, Clone)]
pub struct Randomizer {
    lfsr: Lfsr,
    next_pli: PipelineInfo,
}

impl Default for Randomizer {
    fn default() -> Self {
        Randomizer::new()
    }
}

impl Randomizer {
    pub fn new() -> Randomizer {
        Randomizer {
            lfsr: Lfsr::new(),
            next_pli: PipelineInfo::regular(false, 0),
        }
    }

    pub fn randomize(&mut self, packet: &MpegPacket) -> RandomizedPacket {
        assert!(
            packet.has_sync_byte(),
            "transport packet without sync byte (0x{:02x})",
            packet.data[0]
        );
        let pli = self.next_pli;
        if pli.is_first_regular() {
            self.lfsr.reset();
        }
        let mut out = RandomizedPacket {
            pli,
            data: [0; TS_DATA_SIZE],
        };
        out.data.copy_from_slice(&packet.data[1..]);
        self.lfsr.whiten(&mut out.data);
        self.next_pli = pli.next();
        return out;
    }
}

impl Block for Randomizer {
    type Input = MpegPacket;
    type Output = RandomizedPacket;

    fn work(&mut self, input: &[MpegPacket], output: &mut [RandomizedPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.randomize(&input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        self.lfsr.reset();
        self.next_pli = PipelineInfo::regular(false, 0);
    }
}

/// Inverse of [`Randomizer`]: restores the sync byte and reflects the
/// packet's error status in the transport error indicator.
#[derive(Debug, Clone, Default)]
pub struct Derandomizer {
    lfsr: Lfsr,
}

impl Derandomizer {
    pub fn new() -> Derandomizer {
        Derandomizer { lfsr: Lfsr::new() }
    }

    pub fn derandomize(&mut self, packet: &RandomizedPacket) -> MpegPacket {
        assert!(packet.pli.is_regular(), "derandomizer fed a field sync segment");
        if packet.pli.is_first_regular() {
            self.lfsr.reset();
        }
        let mut out = MpegPacket::default();
        out.data[0] = TS_SYNC_BYTE;
        out.data[1..].copy_from_slice(&packet.data);
        self.lfsr.whiten(&mut out.data[1..]);
        if packet.pli.transport_error() {
            out.data[1] |= TRANSPORT_ERROR_BIT;
        } else {
            out.data[1] &= !TRANSPORT_ERROR_BIT;
        }
        return out;
    }
}

impl Block for Derandomizer {
    type Input = RandomizedPacket;
    type Output = MpegPacket;

    fn work(&mut self, input: &[RandomizedPacket], output: &mut [MpegPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.derandomize(&input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        self.lfsr.reset();
    }
}
