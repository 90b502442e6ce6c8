//! Dynamics Compressor
//!
//! # Perceptual Contract
//! - **Target Source**: Speech after tone shaping.
//! - **Intended Effect**: Tames level swings so the denoised voice sits at a
//!   consistent loudness.
//! - **Failure Modes**:
//!   - "Pumping" if release is too fast for the amount of gain reduction.
//!   - Raising the noise floor when makeup gain is large.
//! - **Will Not Do**:
//!   - Brickwall limiting. Peaks faster than the attack pass through.
//!
//! # Gain Computer
//! 1. Rectified per-sample level in dBFS.
//! 2. Static soft-knee curve gives the target gain reduction in dB.
//! 3. One-pole smoothing of the reduction: attack step while it increases,
//!    release step while it decreases.
//! 4. `gain = db_to_lin(makeup - reduction)` is applied to the sample.
//!
//! A ratio of 1 with no makeup leaves the signal bit-identical.

use crate::config::CompressorParams;
use crate::dsp::utils::{db_to_lin, lin_to_db, step_coeff};
use crate::dsp::FrameStage;

#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: f32,

    attack_step: f32,
    release_step: f32,

    // Smoothed gain reduction (dB, >= 0)
    reduction_db: f32,
    // Metering
    peak_reduction_db: f32,
}

impl Compressor {
    pub fn new(params: CompressorParams, sample_rate: f32) -> Self {
        Self {
            params,
            sample_rate,
            attack_step: step_coeff(params.attack_s, sample_rate),
            release_step: step_coeff(params.release_s, sample_rate),
            reduction_db: 0.0,
            peak_reduction_db: 0.0,
        }
    }

    /// Applies new parameters; the current gain reduction carries over.
    pub fn retune(&mut self, params: CompressorParams) {
        if params == self.params {
            return;
        }
        self.attack_step = step_coeff(params.attack_s, self.sample_rate);
        self.release_step = step_coeff(params.release_s, self.sample_rate);
        self.params = params;
    }

    /// Static curve: gain reduction in dB for a level `over_db` above threshold.
    #[inline]
    fn soft_knee(over_db: f32, ratio: f32, knee_db: f32) -> f32 {
        let half = 0.5 * knee_db;
        if over_db <= -half {
            0.0
        } else if over_db >= half {
            over_db * (1.0 - 1.0 / ratio)
        } else {
            let x = over_db + half;
            let y = (x * x) / (2.0 * knee_db);
            y * (1.0 - 1.0 / ratio)
        }
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let level_db = lin_to_db(input.abs());
        let over_db = level_db - self.params.threshold_db;
        let target_db = Self::soft_knee(over_db, self.params.ratio, self.params.knee_db);

        let step = if target_db > self.reduction_db {
            self.attack_step
        } else {
            self.release_step
        };
        self.reduction_db += step * (target_db - self.reduction_db);
        if !self.reduction_db.is_finite() || self.reduction_db < 0.0 {
            self.reduction_db = 0.0;
        }
        if self.reduction_db > self.peak_reduction_db {
            self.peak_reduction_db = self.reduction_db;
        }

        let gain_db = self.params.makeup_db - self.reduction_db;
        if gain_db == 0.0 {
            input
        } else {
            input * db_to_lin(gain_db)
        }
    }

    /// Current smoothed gain reduction in dB.
    pub fn get_gain_reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Largest reduction seen since the last reset.
    pub fn get_peak_gain_reduction_db(&self) -> f32 {
        self.peak_reduction_db
    }
}

impl FrameStage for Compressor {
    #[inline]
    fn process(&mut self, frame: &mut [f32]) {
        for s in frame.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    fn reset(&mut self) {
        self.reduction_db = 0.0;
        self.peak_reduction_db = 0.0;
    }
}
