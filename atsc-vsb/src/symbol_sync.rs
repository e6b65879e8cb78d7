//! Symbol timing recovery and segment alignment.
//!
//! Samples are taken at the symbol rate times `ratio`. A fractional
//! interpolator resamples them onto the symbol grid. The four-symbol segment
//! sync repeats every 832 symbols, so a bank of 832 saturating integrators,
//! one per symbol position, learns where it sits; the shape of the sync
//! pulse around that position drives the timing loop. Once an integrator is
//! confidently ahead, symbols are emitted in segments that start at the
//! segment sync.

use tracing::{debug, info};

use crate::block::{Block, Work};
use crate::segment::SoftDataSegment;
use crate::SEGMENT_SIZE;

pub const INTERPOLATOR_TAPS: usize = 4;
const LOOP_FILTER_ALPHA: f32 = 0.05;
const TIMING_GAIN: f64 = 1e-5 / (10.0 * SEGMENT_SIZE as f64) * 1e3;
const INTEGRATOR_MAX: i8 = 15;
const INTEGRATOR_MIN: i8 = -16;
const LOCK_THRESHOLD: i8 = 5;
/// Segment sync pattern (+ - - +) as hard decisions, oldest in bit 0.
const SYNC_PATTERN: u8 = 0b1001;

/// 4-point cubic Lagrange interpolator. `interpolate(x, mu)` estimates the
/// signal `mu` (0..1) of a sample past `x[1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpolator;

impl Interpolator {
    pub fn ntaps(&self) -> usize {
        INTERPOLATOR_TAPS
    }

    pub fn interpolate(&self, x: &[f32], mu: f32) -> f32 {
        let t = 1.0 + mu;
        let mut y = 0.0;
        for i in 0..INTERPOLATOR_TAPS {
            let mut l = 1.0;
            for j in 0..INTERPOLATOR_TAPS {
                if j != i {
                    l *= (t - j as f32) / (i as f32 - j as f32);
                }
            }
            y += x[i] * l;
        }
        return y;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePoleIir {
    alpha: f32,
    prev_output: f32,
}

impl SinglePoleIir {
    pub fn new(alpha: f32) -> SinglePoleIir {
        SinglePoleIir {
            alpha,
            prev_output: 0.0,
        }
    }

    pub fn filter(&mut self, input: f32) -> f32 {
        self.prev_output += self.alpha * (input - self.prev_output);
        return self.prev_output;
    }

    pub fn reset(&mut self) {
        self.prev_output = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct SymbolSync {
    interp: Interpolator,
    rx_clock_to_symbol_freq: f64,
    w: f64,
    mu: f64,
    timing_adjust: f32,
    loop_filter: SinglePoleIir,
    counter: usize,
    shift_reg: u8,
    sample_mem: [f32; SEGMENT_SIZE],
    integrators: [i8; SEGMENT_SIZE],
    data: [f32; SEGMENT_SIZE],
    symbol_index: usize,
    seg_locked: bool,
    /// Samples the last step went past the end of the previous input.
    skip: usize,
}

impl SymbolSync {
    /// `ratio` is the receiver sample rate divided by the symbol rate.
    pub fn new(ratio: f64) -> SymbolSync {
        assert!(ratio >= 1.0, "sample rate below symbol rate");
        SymbolSync {
            interp: Interpolator,
            rx_clock_to_symbol_freq: ratio,
            w: ratio,
            mu: 0.0,
            timing_adjust: 0.0,
            loop_filter: SinglePoleIir::new(LOOP_FILTER_ALPHA),
            counter: 0,
            shift_reg: 0,
            sample_mem: [0.0; SEGMENT_SIZE],
            integrators: [INTEGRATOR_MIN; SEGMENT_SIZE],
            data: [0.0; SEGMENT_SIZE],
            symbol_index: 0,
            seg_locked: false,
            skip: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.seg_locked
    }

    pub fn timing_adjust(&self) -> f32 {
        self.timing_adjust
    }

    /// Position of the strongest integrator, first one on ties.
    fn best_integrator(&self) -> usize {
        let mut best = 0;
        for i in 1..SEGMENT_SIZE {
            if self.integrators[i] > self.integrators[best] {
                best = i;
            }
        }
        return best;
    }

    fn end_of_segment(&mut self) {
        let k = self.best_integrator();
        let locked = self.integrators[k] >= LOCK_THRESHOLD;
        if locked != self.seg_locked {
            if locked {
                info!(position = k, "segment sync locked");
            } else {
                info!("segment sync lost");
            }
        }
        self.seg_locked = locked;
        let m = |i: usize| self.sample_mem[(k + SEGMENT_SIZE - i) % SEGMENT_SIZE];
        let timing_error = -m(0) - m(1) + m(2) + m(3);
        self.timing_adjust = self.loop_filter.filter(timing_error);
        debug!(timing_error, adjust = self.timing_adjust, "segment timing");
        self.symbol_index = (SEGMENT_SIZE + 3 - 1 - k) % SEGMENT_SIZE;
    }
}

impl Block for SymbolSync {
    type Input = f32;
    type Output = SoftDataSegment;

    fn work(&mut self, input: &[f32], output: &mut [SoftDataSegment]) -> Work {
        let ntaps = self.interp.ntaps();
        let mut si = self.skip.min(input.len());
        self.skip -= si;
        let mut produced = 0;
        while si + ntaps <= input.len() && produced < output.len() {
            let x = self.interp.interpolate(&input[si..si + ntaps], self.mu as f32);

            self.mu += TIMING_GAIN * self.timing_adjust as f64;
            let s = self.mu + self.w;
            let step = s.floor();
            si += step as usize;
            self.mu = s - step;

            self.sample_mem[self.counter] = x;
            let bit = (x >= 0.0) as u8;
            self.shift_reg = (bit << 3) | (self.shift_reg >> 1);
            let integrator = &mut self.integrators[self.counter];
            if self.shift_reg == SYNC_PATTERN {
                *integrator = (*integrator + 1).min(INTEGRATOR_MAX);
            } else {
                *integrator = (*integrator - 1).max(INTEGRATOR_MIN);
            }

            if self.counter == SEGMENT_SIZE - 1 {
                self.end_of_segment();
                self.counter = 0;
            } else {
                self.counter += 1;
            }

            if self.seg_locked {
                self.data[self.symbol_index] = x;
                self.symbol_index += 1;
                if self.symbol_index == SEGMENT_SIZE {
                    output[produced] = SoftDataSegment {
                        pli: Default::default(),
                        data: self.data,
                    };
                    produced += 1;
                    self.symbol_index = 0;
                }
            }
        }
        if si > input.len() {
            self.skip = si - input.len();
            si = input.len();
        }
        return Work::new(si, produced);
    }

    fn reset(&mut self) {
        *self = SymbolSync::new(self.rx_clock_to_symbol_freq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::drain;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    const LEVELS: [f32; 8] = [-7.0, -5.0, -3.0, -1.0, 1.0, 3.0, 5.0, 7.0];

    #[test]
    fn test_interpolator() {
        let interp = Interpolator;
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((interp.interpolate(&x, 0.0) - 2.0).abs() < 1e-6);
        assert!((interp.interpolate(&x, 0.5) - 2.5).abs() < 1e-6);
        // exact for cubics
        let f = |t: f32| t * t * t - 2.0 * t;
        let x = [f(0.0), f(1.0), f(2.0), f(3.0)];
        assert!((interp.interpolate(&x, 0.25) - f(1.25)).abs() < 1e-4);
    }

    #[test]
    fn test_loop_filter() {
        let mut iir = SinglePoleIir::new(0.5);
        assert_eq!(iir.filter(1.0), 0.5);
        assert_eq!(iir.filter(1.0), 0.75);
        iir.reset();
        assert_eq!(iir.filter(0.0), 0.0);
    }

    #[test]
    fn test_locks_to_segment_sync() {
        let mut rng = StdRng::seed_from_u64(50);
        let mut segments = Vec::new();
        let mut stream: Vec<f32> = (0..300)
            .map(|_| *[-7.0, 7.0].choose(&mut rng).unwrap())
            .collect();
        for _ in 0..60 {
            let mut seg = [0f32; SEGMENT_SIZE];
            seg[..4].copy_from_slice(&[5.0, -5.0, -5.0, 5.0]);
            for x in seg[4..].iter_mut() {
                *x = *LEVELS.choose(&mut rng).unwrap();
            }
            stream.extend_from_slice(&seg);
            segments.push(seg);
        }
        let mut sync = SymbolSync::new(1.0);
        let out = sync.run(&stream);
        assert!(sync.is_locked());
        // lock needs about 21 segments of integrator build-up
        assert!(out.len() > 30, "only {} segments", out.len());
        // the first segment after lock is partial
        for seg in &out[1..] {
            let signs: Vec<f32> = seg.data[..4].iter().map(|x| x.signum()).collect();
            assert_eq!(signs, [1.0, -1.0, -1.0, 1.0]);
            let matched = segments.iter().any(|s| {
                s.iter().zip(seg.data.iter()).all(|(a, b)| (a - b).abs() < 0.25)
            });
            assert!(matched);
        }
    }

    #[test]
    fn test_chunking_does_not_shift_timing() {
        let mut rng = StdRng::seed_from_u64(51);
        let mut stream = Vec::new();
        for _ in 0..60 {
            let mut seg = [0f32; SEGMENT_SIZE];
            seg[..4].copy_from_slice(&[5.0, -5.0, -5.0, 5.0]);
            for x in seg[4..].iter_mut() {
                *x = *LEVELS.choose(&mut rng).unwrap();
            }
            // six samples per symbol, so a step overshoots the four tap window
            for x in seg {
                stream.extend_from_slice(&[x; 6]);
            }
        }
        let whole = SymbolSync::new(6.0).run(&stream);
        assert!(whole.len() > 30, "only {} segments", whole.len());

        let mut sync = SymbolSync::new(6.0);
        let mut pending = Vec::new();
        let mut chunked = Vec::new();
        for chunk in stream.chunks(13312) {
            pending.extend_from_slice(chunk);
            chunked.extend(drain(&mut sync, &mut pending));
        }
        assert_eq!(chunked.len(), whole.len());
        assert!(chunked == whole);
    }

    #[test]
    fn test_leaves_interpolator_tail_unconsumed() {
        let mut sync = SymbolSync::new(1.0);
        let input = [0.5f32; 10];
        let mut out = vec![SoftDataSegment::default(); 1];
        let w = sync.work(&input, &mut out);
        assert_eq!(w.consumed, 10 - INTERPOLATOR_TAPS + 1);
        assert_eq!(w.produced, 0);
    }
}
