//! Noise Gate
//!
//! Envelope-driven gate. The gate is **open when `envelope >= threshold`** and
//! closed below it, so a threshold of zero never mutes anything. A closed gate
//! either silences the sample (`GateMode::Hard`) or scales it by a residual
//! factor (`GateMode::Soft`).
//!
//! The decision is made per sample on the envelope after it has been updated
//! with that sample.

use crate::config::{GateMode, GateParams};
use crate::dsp::envelope::EnvelopeFollower;
use crate::dsp::FrameStage;

#[derive(Debug, Clone)]
pub struct NoiseGate {
    params: GateParams,
    sample_rate: f32,
    follower: EnvelopeFollower,
    open: bool,
}

impl NoiseGate {
    pub fn new(params: GateParams, sample_rate: f32) -> Self {
        Self {
            params,
            sample_rate,
            follower: EnvelopeFollower::new(params.attack_s, params.release_s, sample_rate),
            open: false,
        }
    }

    /// Applies new parameters; the envelope carries over.
    pub fn retune(&mut self, params: GateParams) {
        if params == self.params {
            return;
        }
        if params.attack_s != self.params.attack_s || params.release_s != self.params.release_s {
            self.follower
                .set_times(params.attack_s, params.release_s, self.sample_rate);
        }
        self.params = params;
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let envelope = self.follower.process_sample(input);
        self.open = envelope >= self.params.threshold;
        if self.open {
            return input;
        }
        match self.params.mode {
            GateMode::Hard => 0.0,
            GateMode::Soft { residual } => input * residual,
        }
    }

    /// Whether the last processed sample passed through the open gate.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn get_envelope(&self) -> f32 {
        self.follower.envelope()
    }
}

impl FrameStage for NoiseGate {
    #[inline]
    fn process(&mut self, frame: &mut [f32]) {
        for s in frame.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    fn reset(&mut self) {
        self.follower.reset();
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn params(threshold: f32, attack_s: f32, mode: GateMode) -> GateParams {
        GateParams {
            threshold,
            attack_s,
            release_s: 0.1,
            mode,
        }
    }

    #[test]
    fn test_input_at_threshold_passes_instant_attack() {
        let mut gate = NoiseGate::new(params(0.3, 0.0, GateMode::Hard), SR);
        let mut frame = [0.3f32; 480];
        gate.process(&mut frame);
        assert!(frame.iter().all(|&s| s == 0.3));
        assert!(gate.is_open());
    }

    #[test]
    fn test_input_at_threshold_passes_once_envelope_settles() {
        let mut gate = NoiseGate::new(params(0.3, 0.01, GateMode::Hard), SR);
        let mut frame = vec![0.3f32; 48_000];
        gate.process(&mut frame);
        // Opens during the attack ramp and stays open once settled.
        assert_eq!(frame[0], 0.0);
        assert!(frame[24_000..].iter().all(|&s| s == 0.3));
        assert_eq!(gate.get_envelope(), 0.3);
    }

    #[test]
    fn test_zero_threshold_never_mutes() {
        let mut gate = NoiseGate::new(params(0.0, 0.005, GateMode::Hard), SR);
        let mut frame: Vec<f32> = (0..960).map(|i| ((i % 7) as f32 - 3.0) * 1e-4).collect();
        let expected = frame.clone();
        gate.process(&mut frame);
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_hard_mode_silences_below_threshold() {
        let mut gate = NoiseGate::new(params(0.1, 0.0, GateMode::Hard), SR);
        let mut frame = [0.05f32; 128];
        gate.process(&mut frame);
        assert!(frame.iter().all(|&s| s == 0.0));
        assert!(!gate.is_open());
    }

    #[test]
    fn test_soft_mode_keeps_residual() {
        let mut gate = NoiseGate::new(params(0.1, 0.0, GateMode::Soft { residual: 0.1 }), SR);
        let mut frame = [0.05f32; 128];
        gate.process(&mut frame);
        assert!(frame.iter().all(|&s| (s - 0.005).abs() < 1e-9));
    }

    #[test]
    fn test_release_holds_gate_open_briefly() {
        let mut gate = NoiseGate::new(params(0.1, 0.0, GateMode::Hard), SR);
        let mut loud = [0.5f32; 480];
        gate.process(&mut loud);
        // Envelope decays from 0.5 with a 100 ms release, still above 0.1 here.
        let mut quiet = [0.01f32; 48];
        gate.process(&mut quiet);
        assert!(quiet.iter().all(|&s| s == 0.01));
    }

    #[test]
    fn test_retune_keeps_envelope() {
        let mut gate = NoiseGate::new(params(0.1, 0.0, GateMode::Hard), SR);
        gate.process(&mut [0.4f32; 64]);
        gate.retune(params(0.2, 0.0, GateMode::Soft { residual: 0.5 }));
        assert_eq!(gate.get_envelope(), 0.4);
    }
}
