use crate::config::{
    CompressorParams, DenoisePlacement, GateMode, GateParams, PipelineConfig, StageConfig,
    DEFAULT_GATE_RESIDUAL,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// FACTORY PRESETS
// =============================================================================

/// Factory pipeline variants for common capture scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    #[serde(rename = "Passthrough")]
    Passthrough,
    #[serde(rename = "Anti-Hiss")]
    AntiHiss,
    #[serde(rename = "RNNoise")]
    Rnnoise,
    #[serde(rename = "Gated Voice")]
    GatedVoice,
    #[serde(rename = "Studio Voice")]
    StudioVoice,
}

/// Broadcast-style voice compressor shared by the dynamics presets.
const VOICE_COMPRESSOR: CompressorParams = CompressorParams {
    threshold_db: -20.0,
    knee_db: 20.0,
    ratio: 8.0,
    attack_s: 0.005,
    // Fast enough to let go between words without pumping
    release_s: 0.15,
    makeup_db: 0.0,
};

/// Soft gate: room tone between phrases drops by 20 dB instead of vanishing.
const VOICE_GATE: GateParams = GateParams {
    threshold: 0.01,
    attack_s: 0.002,
    release_s: 0.12,
    mode: GateMode::Soft {
        residual: DEFAULT_GATE_RESIDUAL,
    },
};

impl Preset {
    pub fn all() -> [Preset; 5] {
        [
            Preset::Passthrough,
            Preset::AntiHiss,
            Preset::Rnnoise,
            Preset::GatedVoice,
            Preset::StudioVoice,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Passthrough => "Passthrough",
            Preset::AntiHiss => "Anti-Hiss",
            Preset::Rnnoise => "RNNoise",
            Preset::GatedVoice => "Gated Voice",
            Preset::StudioVoice => "Studio Voice",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::Passthrough => "No processing - monitor the raw capture",
            Preset::AntiHiss => {
                "Rumble cut, hiss low-pass, presence lift and compression (no neural denoise)"
            }
            Preset::Rnnoise => "Neural denoise only",
            Preset::GatedVoice => "Rumble cut, soft gate and compression after neural denoise",
            Preset::StudioVoice => "Neural denoise first, then corrective EQ, soft gate and compression",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Preset> {
        Preset::all()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Pipeline configuration for this preset at the default geometry.
    pub fn config(&self) -> PipelineConfig {
        match self {
            Preset::Passthrough => PipelineConfig::passthrough(),
            Preset::AntiHiss => PipelineConfig::default()
                .with_denoise(DenoisePlacement::Off)
                .with_stage(StageConfig::Highpass {
                    frequency: 85.0,
                    q: 1.0,
                })
                // Above 8 kHz is mostly hiss on consumer mics
                .with_stage(StageConfig::Lowpass {
                    frequency: 8_000.0,
                    q: 0.7,
                })
                .with_stage(StageConfig::Peaking {
                    frequency: 2_500.0,
                    q: 1.0,
                    gain_db: 3.0,
                })
                .with_stage(StageConfig::Compressor(VOICE_COMPRESSOR)),
            Preset::Rnnoise => {
                PipelineConfig::default().with_denoise(DenoisePlacement::AfterChain)
            }
            Preset::GatedVoice => PipelineConfig::default()
                .with_denoise(DenoisePlacement::BeforeChain)
                .with_stage(StageConfig::Highpass {
                    frequency: 80.0,
                    q: 0.707,
                })
                .with_stage(StageConfig::Gate(VOICE_GATE))
                .with_stage(StageConfig::Compressor(VOICE_COMPRESSOR)),
            Preset::StudioVoice => PipelineConfig::default()
                .with_denoise(DenoisePlacement::BeforeChain)
                .with_stage(StageConfig::Highpass {
                    frequency: 90.0,
                    q: 0.707,
                })
                // Desk thumps / handling noise
                .with_stage(StageConfig::Peaking {
                    frequency: 120.0,
                    q: 1.2,
                    gain_db: -3.0,
                })
                // Boxy "mud"
                .with_stage(StageConfig::Peaking {
                    frequency: 300.0,
                    q: 1.0,
                    gain_db: -4.0,
                })
                .with_stage(StageConfig::Peaking {
                    frequency: 3_000.0,
                    q: 1.0,
                    gain_db: 2.0,
                })
                .with_stage(StageConfig::HighShelf {
                    frequency: 10_000.0,
                    q: 0.7,
                    gain_db: -2.0,
                })
                .with_stage(StageConfig::Gate(VOICE_GATE))
                .with_stage(StageConfig::Compressor(CompressorParams {
                    ratio: 4.0,
                    makeup_db: 2.0,
                    ..VOICE_COMPRESSOR
                })),
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Rnnoise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for preset in Preset::all() {
            assert!(preset.config().validate().is_ok(), "{}", preset.name());
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Preset::from_name("anti-hiss"), Some(Preset::AntiHiss));
        assert_eq!(Preset::from_name("RNNOISE"), Some(Preset::Rnnoise));
        assert_eq!(Preset::from_name("nope"), None);
    }

    #[test]
    fn test_anti_hiss_matches_capture_chain() {
        let config = Preset::AntiHiss.config();
        assert_eq!(config.denoise, DenoisePlacement::Off);
        assert_eq!(config.stages.len(), 4);
        match config.stages[3] {
            StageConfig::Compressor(c) => {
                assert_eq!(c.threshold_db, -20.0);
                assert_eq!(c.ratio, 8.0);
                assert_eq!(c.release_s, 0.15);
            }
            _ => panic!("expected compressor last"),
        }
    }

    #[test]
    fn test_gated_presets_use_soft_residual() {
        for preset in [Preset::GatedVoice, Preset::StudioVoice] {
            let gate = preset.config().stages.iter().find_map(|s| match s {
                StageConfig::Gate(g) => Some(*g),
                _ => None,
            });
            assert_eq!(
                gate.map(|g| g.mode),
                Some(GateMode::Soft { residual: 0.1 })
            );
        }
    }
}
