//! Transmit chain: transport packets in, 8-VSB symbol segments out.

use tracing::debug;

use crate::block::Block;
use crate::field_sync::FieldSyncMux;
use crate::interleaver::DataInterleaver;
use crate::randomizer::Randomizer;
use crate::rs_codec::RsEncoder;
use crate::segment::{DataSegment, MpegPacket};
use crate::trellis::TrellisEncoder;

#[derive(Debug, Default)]
pub struct Transmitter {
    randomizer: Randomizer,
    rs_encoder: RsEncoder,
    interleaver: DataInterleaver,
    trellis: TrellisEncoder,
    field_sync_mux: FieldSyncMux,
    segments_out: u64,
}

impl Transmitter {
    pub fn new() -> Transmitter {
        Transmitter::default()
    }

    /// Segments are released in groups of twelve data segments, with a field
    /// sync segment in front of the first data segment of each field.
    pub fn push_packets(&mut self, packets: &[MpegPacket]) -> Vec<DataSegment> {
        let randomized = self.randomizer.run(packets);
        let encoded = self.rs_encoder.run(&randomized);
        let interleaved = self.interleaver.run(&encoded);
        let coded = self.trellis.run(&interleaved);
        let segments = self.field_sync_mux.run(&coded);
        self.segments_out += segments.len() as u64;
        debug!(packets = packets.len(), segments = segments.len(), "transmitted");
        return segments;
    }

    pub fn segments_out(&self) -> u64 {
        self.segments_out
    }

    pub fn reset(&mut self) {
        self.randomizer.reset();
        self.rs_encoder.reset();
        self.interleaver.reset();
        self.trellis.reset();
        self.field_sync_mux.reset();
        self.segments_out = 0;
    }
}
