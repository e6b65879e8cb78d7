//! Receive chain tunables.

use crate::equalizer::DEFAULT_STEP_SIZE;
use crate::viterbi::DecoderKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiverConfig {
    /// Receiver sample rate divided by the symbol rate (>= 1.0).
    pub ratio: f64,
    /// LMS step size of the equalizer.
    pub equalizer_step: f32,
    pub decoder: DecoderKind,
    /// Run complex input through the carrier loop instead of taking the
    /// real part as is.
    pub use_fpll: bool,
    /// Packets between statistics reports, 0 to disable.
    pub stats_interval: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            ratio: 1.0,
            equalizer_step: DEFAULT_STEP_SIZE,
            decoder: DecoderKind::Viterbi,
            use_fpll: true,
            stats_interval: 10000,
        }
    }
}

impl ReceiverConfig {
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_decoder(mut self, decoder: DecoderKind) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_fpll(mut self, use_fpll: bool) -> Self {
        self.use_fpll = use_fpll;
        self
    }

    pub fn with_stats_interval(mut self, interval: u64) -> Self {
        self.stats_interval = interval;
        self
    }
}
