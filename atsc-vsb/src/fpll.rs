//! Frequency and phase locked loop on the pilot.
//!
//! Complex baseband input with the pilot near DC is mixed down by an NCO. A
//! single-pole filter on the mixed signal isolates the pilot; its phase is the
//! loop error. The output is the real part of the derotated signal with the
//! pilot's DC removed.

use std::f32::consts::PI;

use num_complex::Complex32;

use crate::block::{Block, Work};
use crate::symbol_sync::SinglePoleIir;

const LOOP_ALPHA: f32 = 0.01;
const LOOP_BETA: f32 = LOOP_ALPHA * LOOP_ALPHA / 4.0;
const AFC_ALPHA: f32 = 0.02;
const DC_ALPHA: f32 = 1e-4;
const MAX_PHASE_ERROR: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct Fpll {
    nco_phase: f32,
    nco_freq: f32,
    afc: Complex32,
    dc: SinglePoleIir,
}

impl Default for Fpll {
    fn default() -> Self {
        Fpll::new()
    }
}

impl Fpll {
    pub fn new() -> Fpll {
        Fpll {
            nco_phase: 0.0,
            nco_freq: 0.0,
            afc: Complex32::new(0.0, 0.0),
            dc: SinglePoleIir::new(DC_ALPHA),
        }
    }

    /// NCO phase in radians.
    pub fn phase(&self) -> f32 {
        self.nco_phase
    }

    /// NCO frequency in radians per sample.
    pub fn frequency(&self) -> f32 {
        self.nco_freq
    }

    pub fn process(&mut self, sample: Complex32) -> f32 {
        let (sin, cos) = self.nco_phase.sin_cos();
        let mixed = sample * Complex32::new(cos, -sin);

        self.afc += (mixed - self.afc) * AFC_ALPHA;
        let error = self.afc.arg().clamp(-MAX_PHASE_ERROR, MAX_PHASE_ERROR);

        self.nco_freq += LOOP_BETA * error;
        self.nco_phase += self.nco_freq + LOOP_ALPHA * error;
        while self.nco_phase > PI {
            self.nco_phase -= 2.0 * PI;
        }
        while self.nco_phase < -PI {
            self.nco_phase += 2.0 * PI;
        }

        let pilot = self.dc.filter(mixed.re);
        return mixed.re - pilot;
    }
}

impl Block for Fpll {
    type Input = Complex32;
    type Output = f32;

    fn work(&mut self, input: &[Complex32], output: &mut [f32]) -> Work {
        let n = input.len().min(output.len());
        for i in 0..n {
            output[i] = self.process(input[i]);
        }
        return Work::new(n, n);
    }

    fn reset(&mut self) {
        *self = Fpll::new();
    }
}
