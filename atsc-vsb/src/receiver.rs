//! Receive chain: baseband samples in, transport packets out.

use num_complex::Complex32;
use tracing::info;

use crate::block::{drain, Block};
use crate::config::ReceiverConfig;
use crate::equalizer::Equalizer;
use crate::fpll::Fpll;
use crate::fs_checker::FsChecker;
use crate::interleaver::DataDeinterleaver;
use crate::randomizer::Derandomizer;
use crate::rs_codec::{RsDecoder, RsStats};
use crate::segment::{MpegPacket, SoftDataSegment};
use crate::symbol_sync::SymbolSync;
use crate::viterbi::ViterbiDecoder;

/// Snapshot of the receiver state for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverDiagnostics {
    pub rs: RsStats,
    pub packets_out: u64,
    pub viterbi_metrics: Vec<f32>,
    pub equalizer_taps: Vec<f32>,
    pub equalizer_mse: f32,
    pub timing_locked: bool,
    pub field_locked: bool,
    pub field_num: u8,
}

pub struct Receiver {
    config: ReceiverConfig,
    fpll: Fpll,
    symbol_sync: SymbolSync,
    fs_checker: FsChecker,
    equalizer: Equalizer,
    viterbi: ViterbiDecoder,
    deinterleaver: DataDeinterleaver,
    rs_decoder: RsDecoder,
    derandomizer: Derandomizer,
    samples: Vec<f32>,
    packets_out: u64,
    next_report: u64,
}

impl Default for Receiver {
    fn default() -> Self {
        Receiver::new(ReceiverConfig::default())
    }
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Receiver {
        Receiver {
            config,
            fpll: Fpll::new(),
            symbol_sync: SymbolSync::new(config.ratio),
            fs_checker: FsChecker::new(),
            equalizer: Equalizer::new(config.equalizer_step),
            viterbi: ViterbiDecoder::new(config.decoder),
            deinterleaver: DataDeinterleaver::new(),
            rs_decoder: RsDecoder::new(),
            derandomizer: Derandomizer::new(),
            samples: Vec::new(),
            packets_out: 0,
            next_report: config.stats_interval,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Complex baseband with the pilot at DC.
    pub fn push_complex(&mut self, samples: &[Complex32]) -> Vec<MpegPacket> {
        let real: Vec<f32> = if self.config.use_fpll {
            self.fpll.run(samples)
        } else {
            samples.iter().map(|s| s.re).collect()
        };
        return self.push_samples(&real);
    }

    /// Real samples at `ratio` times the symbol rate.
    pub fn push_samples(&mut self, samples: &[f32]) -> Vec<MpegPacket> {
        self.samples.extend_from_slice(samples);
        let segments = drain(&mut self.symbol_sync, &mut self.samples);
        return self.push_segments(&segments);
    }

    /// Symbol-aligned segments starting at the segment sync. Their metadata
    /// is ignored; positions come from the field sync.
    pub fn push_segments(&mut self, segments: &[SoftDataSegment]) -> Vec<MpegPacket> {
        let tagged = self.fs_checker.run(segments);
        let equalized = self.equalizer.run(&tagged);
        let decoded = self.viterbi.run(&equalized);
        let deinterleaved = self.deinterleaver.run(&decoded);
        let corrected = self.rs_decoder.run(&deinterleaved);
        let packets = self.derandomizer.run(&corrected);
        self.packets_out += packets.len() as u64;
        self.report();
        return packets;
    }

    fn report(&mut self) {
        if self.config.stats_interval == 0 || self.packets_out < self.next_report {
            return;
        }
        let rs = self.rs_decoder.stats();
        info!(
            packets = self.packets_out,
            corrected = rs.corrected_symbols,
            bad = rs.bad_packets,
            equalizer_mse = self.equalizer.training_mse(),
            "receiver statistics"
        );
        while self.next_report <= self.packets_out {
            self.next_report += self.config.stats_interval;
        }
    }

    pub fn diagnostics(&self) -> ReceiverDiagnostics {
        ReceiverDiagnostics {
            rs: self.rs_decoder.stats(),
            packets_out: self.packets_out,
            viterbi_metrics: self.viterbi.best_metrics(),
            equalizer_taps: self.equalizer.taps().to_vec(),
            equalizer_mse: self.equalizer.training_mse(),
            timing_locked: self.symbol_sync.is_locked(),
            field_locked: self.fs_checker.is_locked(),
            field_num: self.fs_checker.field_num(),
        }
    }

    pub fn reset(&mut self) {
        self.fpll.reset();
        self.symbol_sync.reset();
        self.fs_checker.reset();
        self.equalizer.reset();
        self.viterbi.reset();
        self.deinterleaver.reset();
        self.rs_decoder.reset();
        self.derandomizer.reset();
        self.samples.clear();
        self.packets_out = 0;
        self.next_report = self.config.stats_interval;
    }
}
