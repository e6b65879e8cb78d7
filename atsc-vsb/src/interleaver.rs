//! Convolutional byte interleaver (52 branches, M = 4 bytes).
//!
//! ```text
//! interleaver   branch k: delay k*4 bytes
//! deinterleaver branch k: delay (51-k)*4 bytes, then a 156 byte alignment FIFO
//! ```
//!
//! The pair delays each byte by 52*51*4 + 156 = 10764 bytes, exactly 52 packets
//! of 207 bytes, so a packet leaves the deinterleaver whole, 52 segments after
//! it entered the interleaver. The commutator is forced back to branch 0 at
//! the first data segment of every field.

use crate::block::{Block, Work};
use crate::segment::RsEncodedPacket;
use crate::TSP_SIZE;

pub const INTERLEAVER_BRANCHES: usize = 52;
pub const INTERLEAVER_INCREMENT: usize = 4;
const ALIGNMENT_FIFO_SIZE: usize = 156;
/// Segments between a packet entering the interleaver and leaving the
/// deinterleaver.
pub const INTERLEAVER_DELAY_SEGMENTS: usize = 52;

/// Fixed-depth FIFO: every item pushed in returns the one pushed `depth`
/// items earlier. Starts out filled with `T::default()`.
#[derive(Debug, Clone)]
pub struct DelayLine<T> {
    buffer: Vec<T>,
    index: usize,
}

impl<T: Copy + Default> DelayLine<T> {
    pub fn new(depth: usize) -> DelayLine<T> {
        let mut buffer = Vec::with_capacity(depth);
        buffer.resize(depth, T::default());
        return DelayLine { buffer, index: 0 };
    }

    pub fn depth(&self) -> usize {
        self.buffer.len()
    }

    pub fn stuff(&mut self, input: T) -> T {
        if self.buffer.is_empty() {
            return input;
        }
        let output = std::mem::replace(&mut self.buffer[self.index], input);
        self.index += 1;
        if self.index == self.buffer.len() {
            self.index = 0;
        }
        return output;
    }

    pub fn reset(&mut self) {
        self.buffer.fill(T::default());
        self.index = 0;
    }
}

#[derive(Debug, Clone)]
pub struct ConvolutionalInterleaver {
    branches: Vec<DelayLine<u8>>,
    increment: usize,
    commutator: usize,
}

impl ConvolutionalInterleaver {
    /// `interleave` selects the transmit side (delays growing with the branch
    /// index) or the receive side (delays shrinking).
    pub fn new(interleave: bool, nbranches: usize, increment: usize) -> ConvolutionalInterleaver {
        assert!(nbranches >= 1, "need at least one branch");
        let mut branches = Vec::with_capacity(nbranches);
        for i in 0..nbranches {
            let depth = if interleave {
                i * increment
            } else {
                (nbranches - 1 - i) * increment
            };
            branches.push(DelayLine::new(depth));
        }
        return ConvolutionalInterleaver {
            branches,
            increment,
            commutator: 0,
        };
    }

    /// Move the commutator back to branch 0.
    pub fn sync(&mut self) {
        self.commutator = 0;
    }

    pub fn commutator(&self) -> usize {
        self.commutator
    }

    /// Delay in bytes added by this side plus its complement.
    pub fn end_to_end_delay(&self) -> usize {
        let n = self.branches.len();
        return n * (n - 1) * self.increment;
    }

    pub fn transform(&mut self, input: u8) -> u8 {
        let output = self.branches[self.commutator].stuff(input);
        self.commutator += 1;
        if self.commutator == self.branches.len() {
            self.commutator = 0;
        }
        return output;
    }

    pub fn reset(&mut self) {
        for b in self.branches.iter_mut() {
            b.reset();
        }
        self.commutator = 0;
    }
}

#[derive(Debug, Clone)]
pub struct DataInterleaver {
    interleaver: ConvolutionalInterleaver,
}

impl Default for DataInterleaver {
    fn default() -> Self {
        DataInterleaver::new()
    }
}

impl DataInterleaver {
    pub fn new() -> DataInterleaver {
        DataInterleaver {
            interleaver: ConvolutionalInterleaver::new(
                true,
                INTERLEAVER_BRANCHES,
                INTERLEAVER_INCREMENT,
            ),
        }
    }

    pub fn interleave(&mut self, packet: &RsEncodedPacket) -> RsEncodedPacket {
        assert!(packet.pli.is_regular(), "interleaver fed a field sync segment");
        if packet.pli.is_first_regular() {
            self.interleaver.sync();
        }
        let mut out = RsEncodedPacket {
            pli: packet.pli,
            data: [0; TSP_SIZE],
        };
        for (o, i) in out.data.iter_mut().zip(packet.data.iter()) {
            *o = self.interleaver.transform(*i);
        }
        return out;
    }
}

impl Block for DataInterleaver {
    type Input = RsEncodedPacket;
    type Output = RsEncodedPacket;

    fn work(&mut self, input: &[RsEncodedPacket], output: &mut [RsEncodedPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.interleave(&input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        self.interleaver.reset();
    }
}

#[derive(Debug, Clone)]
pub struct DataDeinterleaver {
    deinterleaver: ConvolutionalInterleaver,
    alignment_fifo: DelayLine<u8>,
}

impl Default for DataDeinterleaver {
    fn default() -> Self {
        DataDeinterleaver::new()
    }
}

impl DataDeinterleaver {
    pub fn new() -> DataDeinterleaver {
        DataDeinterleaver {
            deinterleaver: ConvolutionalInterleaver::new(
                false,
                INTERLEAVER_BRANCHES,
                INTERLEAVER_INCREMENT,
            ),
            alignment_fifo: DelayLine::new(ALIGNMENT_FIFO_SIZE),
        }
    }

    pub fn deinterleave(&mut self, packet: &RsEncodedPacket) -> RsEncodedPacket {
        assert!(packet.pli.is_regular(), "deinterleaver fed a field sync segment");
        if packet.pli.is_first_regular() {
            self.deinterleaver.sync();
        }
        let mut out = RsEncodedPacket {
            pli: packet.pli.delay(INTERLEAVER_DELAY_SEGMENTS),
            data: [0; TSP_SIZE],
        };
        for (o, i) in out.data.iter_mut().zip(packet.data.iter()) {
            *o = self.alignment_fifo.stuff(self.deinterleaver.transform(*i));
        }
        return out;
    }
}

impl Block for DataDeinterleaver {
    type Input = RsEncodedPacket;
    type Output = RsEncodedPacket;

    fn work(&mut self, input: &[RsEncodedPacket], output: &mut [RsEncodedPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.deinterleave(&input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        self.deinterleaver.reset();
        self.alignment_fifo.reset();
    }
}
