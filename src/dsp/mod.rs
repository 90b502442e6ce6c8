//! DSP stage chain.
//!
//! Every stage implements [`FrameStage`] and owns its own state. The chain
//! applies stages serially in configured order; reordering is purely a
//! configuration change.

pub mod biquad;
pub mod compressor;
pub mod envelope;
pub mod gate;
pub mod utils;

pub use biquad::{Biquad, FilterKind, FilterStage};
pub use compressor::Compressor;
pub use envelope::EnvelopeFollower;
pub use gate::NoiseGate;

use crate::config::{StageConfig, MAX_STAGES};

/// A stateful per-frame transform. Processes in place; must not allocate.
pub trait FrameStage {
    fn process(&mut self, frame: &mut [f32]);
    fn reset(&mut self);
}

/// One configured stage of the chain.
#[derive(Debug, Clone)]
pub enum Stage {
    Filter(FilterStage),
    Compressor(Compressor),
    Gate(NoiseGate),
}

/// (kind, frequency, q, gain_db) for the filter variants.
fn filter_spec(config: &StageConfig) -> Option<(FilterKind, f32, f32, f32)> {
    match *config {
        StageConfig::Highpass { frequency, q } => Some((FilterKind::Highpass, frequency, q, 0.0)),
        StageConfig::Lowpass { frequency, q } => Some((FilterKind::Lowpass, frequency, q, 0.0)),
        StageConfig::Peaking {
            frequency,
            q,
            gain_db,
        } => Some((FilterKind::Peaking, frequency, q, gain_db)),
        StageConfig::LowShelf {
            frequency,
            q,
            gain_db,
        } => Some((FilterKind::LowShelf, frequency, q, gain_db)),
        StageConfig::HighShelf {
            frequency,
            q,
            gain_db,
        } => Some((FilterKind::HighShelf, frequency, q, gain_db)),
        StageConfig::Compressor(_) | StageConfig::Gate(_) => None,
    }
}

impl Stage {
    pub fn from_config(config: &StageConfig, sample_rate: f32) -> Self {
        match *config {
            StageConfig::Compressor(p) => Stage::Compressor(Compressor::new(p, sample_rate)),
            StageConfig::Gate(p) => Stage::Gate(NoiseGate::new(p, sample_rate)),
            StageConfig::Highpass { frequency, q } => Stage::Filter(FilterStage::new(
                FilterKind::Highpass,
                frequency,
                q,
                0.0,
                sample_rate,
            )),
            StageConfig::Lowpass { frequency, q } => Stage::Filter(FilterStage::new(
                FilterKind::Lowpass,
                frequency,
                q,
                0.0,
                sample_rate,
            )),
            StageConfig::Peaking {
                frequency,
                q,
                gain_db,
            } => Stage::Filter(FilterStage::new(
                FilterKind::Peaking,
                frequency,
                q,
                gain_db,
                sample_rate,
            )),
            StageConfig::LowShelf {
                frequency,
                q,
                gain_db,
            } => Stage::Filter(FilterStage::new(
                FilterKind::LowShelf,
                frequency,
                q,
                gain_db,
                sample_rate,
            )),
            StageConfig::HighShelf {
                frequency,
                q,
                gain_db,
            } => Stage::Filter(FilterStage::new(
                FilterKind::HighShelf,
                frequency,
                q,
                gain_db,
                sample_rate,
            )),
        }
    }

    /// True when `config` describes the same kind of stage as `self`.
    pub fn matches(&self, config: &StageConfig) -> bool {
        match (self, config) {
            (Stage::Filter(f), c) => filter_spec(c).map_or(false, |(kind, ..)| kind == f.kind()),
            (Stage::Compressor(_), StageConfig::Compressor(_)) => true,
            (Stage::Gate(_), StageConfig::Gate(_)) => true,
            _ => false,
        }
    }

    /// Retunes in place, keeping state. Returns false (and does nothing) if
    /// `config` is a different kind of stage.
    pub fn retune(&mut self, config: &StageConfig) -> bool {
        if !self.matches(config) {
            return false;
        }
        match (self, config) {
            (Stage::Filter(f), c) => {
                if let Some((_, frequency, q, gain_db)) = filter_spec(c) {
                    f.retune(frequency, q, gain_db);
                }
            }
            (Stage::Compressor(comp), StageConfig::Compressor(p)) => comp.retune(*p),
            (Stage::Gate(gate), StageConfig::Gate(p)) => gate.retune(*p),
            _ => {}
        }
        true
    }
}

impl FrameStage for Stage {
    #[inline]
    fn process(&mut self, frame: &mut [f32]) {
        match self {
            Stage::Filter(s) => s.process(frame),
            Stage::Compressor(s) => s.process(frame),
            Stage::Gate(s) => s.process(frame),
        }
    }

    fn reset(&mut self) {
        match self {
            Stage::Filter(s) => s.reset(),
            Stage::Compressor(s) => s.reset(),
            Stage::Gate(s) => s.reset(),
        }
    }
}

/// How `StageChain::apply` adopted a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainUpdate {
    /// Same stage layout; parameters updated, state kept.
    Retuned,
    /// Layout changed; stages rebuilt with fresh state.
    Rebuilt,
}

/// Ordered list of stages with storage reserved for `MAX_STAGES`.
pub struct StageChain {
    stages: Vec<Stage>,
    sample_rate: f32,
}

impl StageChain {
    pub fn new(configs: &[StageConfig], sample_rate: f32) -> Self {
        let mut chain = Self {
            stages: Vec::with_capacity(MAX_STAGES),
            sample_rate,
        };
        chain.rebuild(configs);
        chain
    }

    /// Adopts `configs` without allocating. Configs beyond `MAX_STAGES` are
    /// ignored; validated configs never have that many.
    pub fn apply(&mut self, configs: &[StageConfig]) -> ChainUpdate {
        let same_layout = self.stages.len() == configs.len()
            && self
                .stages
                .iter()
                .zip(configs)
                .all(|(stage, config)| stage.matches(config));

        if same_layout {
            for (stage, config) in self.stages.iter_mut().zip(configs) {
                stage.retune(config);
            }
            ChainUpdate::Retuned
        } else {
            self.rebuild(configs);
            ChainUpdate::Rebuilt
        }
    }

    fn rebuild(&mut self, configs: &[StageConfig]) {
        self.stages.clear();
        for config in configs.iter().take(MAX_STAGES) {
            self.stages.push(Stage::from_config(config, self.sample_rate));
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

impl FrameStage for StageChain {
    #[inline]
    fn process(&mut self, frame: &mut [f32]) {
        for stage in self.stages.iter_mut() {
            stage.process(frame);
        }
    }

    fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressorParams, GateMode, GateParams};

    const SR: f32 = 48_000.0;

    fn neutral_chain() -> Vec<StageConfig> {
        vec![
            StageConfig::Peaking {
                frequency: 2_500.0,
                q: 1.0,
                gain_db: 0.0,
            },
            StageConfig::Gate(GateParams {
                threshold: 0.0,
                attack_s: 0.001,
                release_s: 0.1,
                mode: GateMode::Hard,
            }),
            StageConfig::Compressor(CompressorParams {
                threshold_db: -20.0,
                knee_db: 20.0,
                ratio: 1.0,
                attack_s: 0.005,
                release_s: 0.15,
                makeup_db: 0.0,
            }),
        ]
    }

    #[test]
    fn test_neutral_chain_is_identity() {
        let mut chain = StageChain::new(&neutral_chain(), SR);
        let input: Vec<f32> = (0..1_440).map(|i| ((i as f32) * 0.021).sin() * 0.8).collect();
        let mut frame = input.clone();
        chain.process(&mut frame);
        assert_eq!(frame, input);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let mut chain = StageChain::new(&[], SR);
        assert!(chain.is_empty());
        let mut frame = [0.25f32; 480];
        chain.process(&mut frame);
        assert_eq!(frame, [0.25; 480]);
    }

    #[test]
    fn test_order_matters() {
        let gain = StageConfig::Peaking {
            frequency: 1_000.0,
            q: 0.5,
            gain_db: 12.0,
        };
        let gate = StageConfig::Gate(GateParams {
            threshold: 0.05,
            attack_s: 0.0,
            release_s: 0.0,
            mode: GateMode::Hard,
        });
        let input: Vec<f32> = (0..480)
            .map(|i| 0.02 * (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / SR).sin())
            .collect();

        let mut gate_first = StageChain::new(&[gate, gain], SR);
        let mut a = input.clone();
        gate_first.process(&mut a);

        let mut gain_first = StageChain::new(&[gain, gate], SR);
        let mut b = input;
        gain_first.process(&mut b);

        let energy = |x: &[f32]| x.iter().map(|s| s * s).sum::<f32>();
        assert_eq!(energy(&a), 0.0);
        assert!(energy(&b) > 0.0);
    }

    #[test]
    fn test_apply_same_layout_retunes_in_place() {
        let mut configs = neutral_chain();
        let mut chain = StageChain::new(&configs, SR);

        // Push the gate envelope up so we can see it survive the retune.
        chain.process(&mut [0.5f32; 480]);

        configs[0] = StageConfig::Peaking {
            frequency: 2_500.0,
            q: 1.0,
            gain_db: 3.0,
        };
        assert_eq!(chain.apply(&configs), ChainUpdate::Retuned);
        match &chain.stages()[1] {
            Stage::Gate(g) => assert!(g.get_envelope() > 0.4),
            _ => panic!("expected gate at index 1"),
        }
    }

    #[test]
    fn test_apply_new_layout_rebuilds_without_growing() {
        let mut chain = StageChain::new(&neutral_chain(), SR);
        let capacity = chain.stages.capacity();

        let swapped = vec![
            StageConfig::Highpass {
                frequency: 85.0,
                q: 0.707,
            },
            StageConfig::Lowpass {
                frequency: 8_000.0,
                q: 0.7,
            },
        ];
        assert_eq!(chain.apply(&swapped), ChainUpdate::Rebuilt);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.stages.capacity(), capacity);
        assert!(matches!(&chain.stages()[0], Stage::Filter(f) if f.kind() == FilterKind::Highpass));
    }

    #[test]
    fn test_stage_retune_rejects_other_kind() {
        let mut stage = Stage::from_config(&neutral_chain()[0], SR);
        assert!(!stage.retune(&neutral_chain()[1]));
        assert!(stage.retune(&StageConfig::Peaking {
            frequency: 500.0,
            q: 2.0,
            gain_db: -3.0
        }));
    }
}
