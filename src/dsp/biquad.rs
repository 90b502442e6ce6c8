//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! RBJ-cookbook second-order sections used for every tone-shaping stage of
//! the chain: rumble high-pass, hiss low-pass, presence peaking and shelves.
//!
//! # Design Notes
//! - Coefficients are recomputed only when a parameter actually changes;
//!   filter history survives retuning.
//! - Flat (0 dB) peaking and shelf settings produce exact unity coefficients,
//!   so a neutral EQ is bit-transparent.
//! - Denormal state is flushed to zero rather than biased with a DC offset.
//! - All operations are safe for the audio thread (no allocations).

use crate::dsp::utils::flush_denormal;
use crate::dsp::FrameStage;
use std::f32::consts::PI;

/// Gains closer to 0 dB than this are treated as flat.
const FLAT_GAIN_DB: f32 = 0.01;

/// Biquad filter implementation (IIR 2nd order, transposed direct form II)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        self.z1 = flush_denormal(input * self.a1 + self.z2 - self.b1 * out);
        self.z2 = flush_denormal(input * self.a2 - self.b2 * out);

        out
    }

    /// Clear filter delay state. Not called by coefficient updates.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Unity coefficients; history is kept.
    pub fn set_bypass(&mut self) {
        self.a0 = 1.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
    }

    pub fn is_bypass(&self) -> bool {
        self.a0 == 1.0 && self.a1 == 0.0 && self.a2 == 0.0 && self.b1 == 0.0 && self.b2 == 0.0
    }

    // ---------------------------------------------------------------------
    // Filter design helpers (RBJ-style)
    // ---------------------------------------------------------------------

    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = self.a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    pub fn update_lpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.a1 = (1.0 - cw0) * inv_a0;
        self.a2 = self.a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    pub fn update_low_shelf(&mut self, cutoff: f32, q: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < FLAT_GAIN_DB {
            self.set_bypass();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) - (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cw0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cw0);
        let a2 = (a + 1.0) + (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha;

        self.set_normalized(b0, b1, b2, a0, a1, a2);
    }

    pub fn update_high_shelf(&mut self, cutoff: f32, q: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < FLAT_GAIN_DB {
            self.set_bypass();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) + (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cw0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cw0);
        let a2 = (a + 1.0) - (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha;

        self.set_normalized(b0, b1, b2, a0, a1, a2);
    }

    pub fn update_peaking(&mut self, cutoff: f32, q: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < FLAT_GAIN_DB {
            self.set_bypass();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cw0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cw0;
        let a2 = 1.0 - alpha / a;

        self.set_normalized(b0, b1, b2, a0, a1, a2);
    }

    #[inline]
    fn set_normalized(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        let inv_a0 = 1.0 / a0;
        self.a0 = b0 * inv_a0;
        self.a1 = b1 * inv_a0;
        self.a2 = b2 * inv_a0;
        self.b1 = a1 * inv_a0;
        self.b2 = a2 * inv_a0;
    }
}

// =============================================================================
// Chain Stage
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Highpass,
    Lowpass,
    Peaking,
    LowShelf,
    HighShelf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FilterParams {
    frequency: f32,
    q: f32,
    gain_db: f32,
}

/// A single biquad configured as one of the chain's filter stages.
#[derive(Debug, Clone)]
pub struct FilterStage {
    kind: FilterKind,
    params: FilterParams,
    sample_rate: f32,
    biquad: Biquad,
}

impl FilterStage {
    /// `gain_db` is ignored for high-pass and low-pass.
    pub fn new(kind: FilterKind, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let mut stage = Self {
            kind,
            params: FilterParams {
                frequency,
                q,
                gain_db,
            },
            sample_rate,
            biquad: Biquad::new(),
        };
        stage.update_coefficients();
        stage
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Applies new parameters. Returns true if the coefficients changed.
    pub fn retune(&mut self, frequency: f32, q: f32, gain_db: f32) -> bool {
        let params = FilterParams {
            frequency,
            q,
            gain_db,
        };
        if params == self.params {
            return false;
        }
        self.params = params;
        self.update_coefficients();
        true
    }

    fn update_coefficients(&mut self) {
        let FilterParams {
            frequency,
            q,
            gain_db,
        } = self.params;
        let sr = self.sample_rate;
        match self.kind {
            FilterKind::Highpass => self.biquad.update_hpf(frequency, q, sr),
            FilterKind::Lowpass => self.biquad.update_lpf(frequency, q, sr),
            FilterKind::Peaking => self.biquad.update_peaking(frequency, q, gain_db, sr),
            FilterKind::LowShelf => self.biquad.update_low_shelf(frequency, q, gain_db, sr),
            FilterKind::HighShelf => self.biquad.update_high_shelf(frequency, q, gain_db, sr),
        }
    }
}

impl FrameStage for FilterStage {
    #[inline]
    fn process(&mut self, frame: &mut [f32]) {
        for s in frame.iter_mut() {
            *s = self.biquad.process(*s);
        }
    }

    fn reset(&mut self) {
        self.biquad.reset();
    }
}
