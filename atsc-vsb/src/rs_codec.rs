//! Reed-Solomon (207,187) outer code over GF(256), t = 10.

use reed_solomon::{Decoder, DecoderError, Encoder};
use tracing::debug;

use crate::block::{Block, Work};
use crate::segment::{RandomizedPacket, RsEncodedPacket};
use crate::{TSP_SIZE, TS_DATA_SIZE, TS_PARITY_SIZE};

#[derive(Debug)]
pub struct RsEncoder {
    encoder: Encoder,
}

impl Default for RsEncoder {
    fn default() -> Self {
        RsEncoder::new()
    }
}

impl RsEncoder {
    pub fn new() -> RsEncoder {
        RsEncoder {
            encoder: Encoder::new(TS_PARITY_SIZE),
        }
    }

    pub fn encode(&self, packet: &RandomizedPacket) -> RsEncodedPacket {
        let encoded = self.encoder.encode(&packet.data);
        let mut out = RsEncodedPacket {
            pli: packet.pli,
            data: [0; TSP_SIZE],
        };
        out.data[..TS_DATA_SIZE].copy_from_slice(encoded.data());
        out.data[TS_DATA_SIZE..].copy_from_slice(encoded.ecc());
        return out;
    }
}

impl Block for RsEncoder {
    type Input = RandomizedPacket;
    type Output = RsEncodedPacket;

    fn work(&mut self, input: &[RandomizedPacket], output: &mut [RsEncodedPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.encode(&input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {}
}

/// Running totals kept by [`RsDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsStats {
    pub packets: u64,
    pub corrected_symbols: u64,
    pub bad_packets: u64,
}

#[derive(Debug)]
pub struct RsDecoder {
    decoder: Decoder,
    stats: RsStats,
}

impl Default for RsDecoder {
    fn default() -> Self {
        RsDecoder::new()
    }
}

impl RsDecoder {
    pub fn new() -> RsDecoder {
        RsDecoder {
            decoder: Decoder::new(TS_PARITY_SIZE),
            stats: RsStats::default(),
        }
    }

    pub fn stats(&self) -> RsStats {
        self.stats
    }

    /// Correct `packet` in place of a copy. Returns the payload and the number
    /// of corrected byte errors, or -1 when the packet could not be repaired;
    /// in that case the uncorrected payload is returned with its transport
    /// error flag set.
    pub fn decode(&mut self, packet: &RsEncodedPacket) -> (RandomizedPacket, i32) {
        let mut out = RandomizedPacket {
            pli: packet.pli,
            data: [0; TS_DATA_SIZE],
        };
        self.stats.packets += 1;
        match self.decoder.correct_err_count(&packet.data, None) {
            Ok((buffer, errors)) => {
                out.data.copy_from_slice(buffer.data());
                out.pli.set_transport_error(false);
                self.stats.corrected_symbols += errors as u64;
                return (out, errors as i32);
            }
            Err(DecoderError::TooManyErrors) => {
                debug!(segno = packet.pli.segno(), "uncorrectable RS packet");
                out.data.copy_from_slice(&packet.data[..TS_DATA_SIZE]);
                out.pli.set_transport_error(true);
                self.stats.bad_packets += 1;
                return (out, -1);
            }
        }
    }
}

impl Block for RsDecoder {
    type Input = RsEncodedPacket;
    type Output = RandomizedPacket;

    fn work(&mut self, input: &[RsEncodedPacket], output: &mut [RandomizedPacket]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.decode(&input[i]).0;
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        self.stats = RsStats::default();
    }
}
