//! Decision-free LMS equalizer trained on the field sync.
//!
//! The first 704 symbols of a field sync segment are known, so every field
//! sync is used to adapt a 64-tap FIR (51 taps on earlier symbols, 12 on later
//! ones). Data segments are filtered with the current taps. Because the filter
//! needs 12 symbols of the following segment, each segment leaves one segment
//! late; field sync segments are used up by training and not passed on.

use tracing::trace;

use crate::block::{Block, Work};
use crate::field_sync::{training_sequence, TRAINING_LEN};
use crate::segment::SoftDataSegment;
use crate::SEGMENT_SIZE;

pub const NTAPS: usize = 64;
pub const NPRETAPS: usize = 51;
pub const DEFAULT_STEP_SIZE: f32 = 5e-5;
const NPOSTTAPS: usize = NTAPS - NPRETAPS - 1;
const WINDOW_LEN: usize = NPRETAPS + SEGMENT_SIZE + NPOSTTAPS;

#[derive(Debug, Clone)]
pub struct Equalizer {
    taps: [f32; NTAPS],
    step_size: f32,
    history: [f32; NPRETAPS],
    pending: Option<SoftDataSegment>,
    training: [[f32; TRAINING_LEN]; 2],
    training_mse: f32,
}

impl Default for Equalizer {
    fn default() -> Self {
        Equalizer::new(DEFAULT_STEP_SIZE)
    }
}

impl Equalizer {
    pub fn new(step_size: f32) -> Equalizer {
        let mut taps = [0.0; NTAPS];
        taps[NPRETAPS] = 1.0;
        Equalizer {
            taps,
            step_size,
            history: [0.0; NPRETAPS],
            pending: None,
            training: [training_sequence(false), training_sequence(true)],
            training_mse: 0.0,
        }
    }

    pub fn taps(&self) -> &[f32; NTAPS] {
        &self.taps
    }

    /// Mean squared error over the last training run.
    pub fn training_mse(&self) -> f32 {
        self.training_mse
    }

    fn window(&self, current: &SoftDataSegment, next: &SoftDataSegment) -> Vec<f32> {
        let mut window = Vec::with_capacity(WINDOW_LEN);
        window.extend_from_slice(&self.history);
        window.extend_from_slice(&current.data);
        window.extend_from_slice(&next.data[..NPOSTTAPS]);
        return window;
    }

    fn filter_at(&self, window: &[f32], j: usize) -> f32 {
        return window[j..j + NTAPS]
            .iter()
            .zip(self.taps.iter())
            .map(|(x, t)| x * t)
            .sum();
    }

    /// One LMS pass over the known part of a field sync. Returns the filter
    /// output for each training symbol, taken before the taps move.
    fn adapt(&mut self, window: &[f32], field2: bool) -> [f32; TRAINING_LEN] {
        let mut filtered = [0f32; TRAINING_LEN];
        let mut squared_error = 0.0;
        for j in 0..TRAINING_LEN {
            let y = self.filter_at(window, j);
            filtered[j] = y;
            let e = y - self.training[field2 as usize][j];
            squared_error += e * e;
            let scale = self.step_size * e;
            for (t, x) in self.taps.iter_mut().zip(window[j..j + NTAPS].iter()) {
                *t -= scale * x;
            }
        }
        self.training_mse = squared_error / TRAINING_LEN as f32;
        trace!(mse = self.training_mse, "equalizer trained");
        return filtered;
    }

    fn filter(&self, window: &[f32]) -> [f32; SEGMENT_SIZE] {
        let mut out = [0f32; SEGMENT_SIZE];
        for (j, o) in out.iter_mut().enumerate() {
            *o = self.filter_at(window, j);
        }
        return out;
    }

    /// Process `current` now that the segment after it is known. Returns the
    /// equalized segment for data segments; the filtered field sync stays
    /// here.
    fn process(
        &mut self,
        current: &SoftDataSegment,
        next: &SoftDataSegment,
    ) -> Option<SoftDataSegment> {
        let window = self.window(current, next);
        let out = if current.pli.is_field_sync() {
            self.adapt(&window, current.pli.in_field2());
            None
        } else {
            Some(SoftDataSegment {
                pli: current.pli,
                data: self.filter(&window),
            })
        };
        self.history
            .copy_from_slice(&current.data[SEGMENT_SIZE - NPRETAPS..]);
        return out;
    }
}

impl Block for Equalizer {
    type Input = SoftDataSegment;
    type Output = SoftDataSegment;

    fn work(&mut self, input: &[SoftDataSegment], output: &mut [SoftDataSegment]) -> Work {
        let mut consumed = 0;
        let mut produced = 0;
        while consumed < input.len() {
            let next = &input[consumed];
            if let Some(current) = self.pending.take() {
                if current.pli.is_regular() && produced == output.len() {
                    self.pending = Some(current);
                    break;
                }
                if let Some(seg) = self.process(&current, next) {
                    output[produced] = seg;
                    produced += 1;
                }
            }
            self.pending = Some(next.clone());
            consumed += 1;
        }
        return Work::new(consumed, produced);
    }

    fn reset(&mut self) {
        *self = Equalizer::new(self.step_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_sync::{field_sync_symbols, PRECODE_LEN};
    use crate::plinfo::PipelineInfo;
    use crate::segment::DataSegment;
    use crate::symbol_level;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Field sync followed by `ndata` random data segments, repeated.
    fn clean_stream(rng: &mut StdRng, fields: usize, ndata: usize) -> Vec<SoftDataSegment> {
        let mut out = Vec::new();
        for f in 0..fields {
            let field2 = f % 2 == 1;
            let sync = DataSegment {
                pli: PipelineInfo::field_sync(field2),
                data: field_sync_symbols(field2, &[4; PRECODE_LEN]),
            };
            out.push(SoftDataSegment::from_segment(&sync));
            for segno in 0..ndata {
                let mut seg = SoftDataSegment {
                    pli: PipelineInfo::regular(field2, segno),
                    data: [0.0; SEGMENT_SIZE],
                };
                for x in seg.data.iter_mut() {
                    *x = symbol_level(rng.gen_range(0..8));
                }
                out.push(seg);
            }
        }
        return out;
    }

    fn with_echo(stream: &[SoftDataSegment], gain: f32, delay: usize) -> Vec<SoftDataSegment> {
        let flat: Vec<f32> = stream.iter().flat_map(|s| s.data.iter().copied()).collect();
        let mut out = stream.to_vec();
        for (i, seg) in out.iter_mut().enumerate() {
            for j in 0..SEGMENT_SIZE {
                let n = i * SEGMENT_SIZE + j;
                if n >= delay {
                    seg.data[j] += gain * flat[n - delay];
                }
            }
        }
        return out;
    }

    fn mse(a: &SoftDataSegment, b: &SoftDataSegment) -> f32 {
        let sum: f32 = a.data.iter().zip(b.data.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        return sum / SEGMENT_SIZE as f32;
    }

    #[test]
    fn test_clean_channel_is_transparent() {
        let mut rng = StdRng::seed_from_u64(60);
        let input = clean_stream(&mut rng, 3, 4);
        let mut eq = Equalizer::default();
        let out = eq.run(&input);
        // field syncs are consumed and the last segment is still pending
        assert_eq!(out.len(), 3 * 4 - 1);
        let data: Vec<&SoftDataSegment> = input.iter().filter(|s| s.pli.is_regular()).collect();
        for (o, i) in out.iter().zip(data.iter()) {
            assert_eq!(o, *i);
        }
        assert_eq!(eq.training_mse(), 0.0);
        assert_eq!(eq.taps()[NPRETAPS], 1.0);
    }

    #[test]
    fn test_cancels_echo() {
        let mut rng = StdRng::seed_from_u64(61);
        let clean = clean_stream(&mut rng, 10, 3);
        let received = with_echo(&clean, 0.2, 3);
        let mut eq = Equalizer::default();
        let out = eq.run(&received);
        let data: Vec<&SoftDataSegment> = clean.iter().filter(|s| s.pli.is_regular()).collect();
        let raw: Vec<&SoftDataSegment> = received.iter().filter(|s| s.pli.is_regular()).collect();
        let n = out.len();
        let before = mse(raw[n - 1], data[n - 1]);
        let after = mse(&out[n - 1], data[n - 1]);
        assert!(after < 0.25 * before, "before {before} after {after}");
        assert!(eq.taps()[NPRETAPS - 3] < -0.1);
    }

    #[test]
    fn test_training_output() {
        let mut rng = StdRng::seed_from_u64(63);
        let clean = clean_stream(&mut rng, 2, 1);
        let mut eq = Equalizer::default();
        let window = eq.window(&clean[2], &clean[3]);
        // identity taps pass the field 2 sync straight through
        assert_eq!(eq.adapt(&window, true), training_sequence(true));

        let received = with_echo(&clean, 0.2, 3);
        let mut eq = Equalizer::default();
        let window = eq.window(&received[2], &received[3]);
        let training = training_sequence(true);
        let error = |filtered: &[f32; TRAINING_LEN]| -> f32 {
            let sum: f32 = filtered
                .iter()
                .zip(training.iter())
                .map(|(y, t)| (y - t) * (y - t))
                .sum();
            sum / TRAINING_LEN as f32
        };
        let first = error(&eq.adapt(&window, true));
        let mut last = first;
        for _ in 0..20 {
            last = error(&eq.adapt(&window, true));
        }
        assert!(last < 0.25 * first, "first {first} last {last}");
        assert!((eq.training_mse() - last).abs() < 1e-3);
    }

    #[test]
    fn test_holds_segment_when_output_full() {
        let mut rng = StdRng::seed_from_u64(62);
        let input = clean_stream(&mut rng, 1, 3);
        let mut eq = Equalizer::default();
        let mut out: Vec<SoftDataSegment> = Vec::new();
        // field sync plus first data segment: nothing to emit yet
        assert_eq!(eq.work(&input[..2], &mut out), Work::new(2, 0));
        // the pending data segment needs an output slot
        assert_eq!(eq.work(&input[2..], &mut out), Work::new(0, 0));
        let mut out = vec![SoftDataSegment::default(); 1];
        assert_eq!(eq.work(&input[2..], &mut out), Work::new(1, 1));
        assert_eq!(out[0].pli, input[1].pli);
    }
}
