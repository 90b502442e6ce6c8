//! Envelope Follower
//!
//! Asymmetric attack/release level tracker. Drives the noise gate and is
//! usable on its own for metering.
//!
//! # Update Rule
//! Per sample, with `x = |input|`:
//!
//! ```text
//! envelope += (x > envelope ? attack : release) * (x - envelope)
//! ```
//!
//! where `attack` and `release` are step fractions in (0, 1] derived from
//! time constants in seconds (`1 - exp(-1 / (t * sr))`, zero time gives 1).
//!
//! # Design Notes
//! - The envelope never goes negative. Non-finite input resets it to zero.
//! - Once a step is too small to move the value in f32, the envelope snaps
//!   to its target, so constant input converges exactly instead of stalling
//!   one ulp short of it.
//! - **No Allocations**: sample-accurate, deterministic, stack-only.

use crate::dsp::utils::step_coeff;

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_s: f32, release_s: f32, sample_rate: f32) -> Self {
        Self {
            envelope: 0.0,
            attack_coeff: step_coeff(attack_s, sample_rate),
            release_coeff: step_coeff(release_s, sample_rate),
        }
    }

    /// Recompute coefficients. The current envelope is kept.
    pub fn set_times(&mut self, attack_s: f32, release_s: f32, sample_rate: f32) {
        self.attack_coeff = step_coeff(attack_s, sample_rate);
        self.release_coeff = step_coeff(release_s, sample_rate);
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let x = input.abs();
        if !x.is_finite() {
            self.envelope = 0.0;
            return self.envelope;
        }

        let coeff = if x > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let next = self.envelope + coeff * (x - self.envelope);

        // Stalled or overshot: land on the target.
        self.envelope = if next == self.envelope || (next - x) * (self.envelope - x) <= 0.0 {
            x
        } else {
            next
        };
        self.envelope
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn attack_coeff(&self) -> f32 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
