//! Pipeline configuration and its lock-free handoff to the audio thread.
//!
//! # Purpose
//! A `PipelineConfig` is the full description of one pipeline variant: the
//! block geometry, the ordered list of DSP stages with their parameters, and
//! where the neural denoiser sits relative to the chain. The demo variants
//! (anti-hiss chain, RNNoise only, gated voice, ...) are just different
//! instances of this type, see [`crate::presets`].
//!
//! # Design Notes
//! - Configs are validated before they can reach the audio thread. Invalid
//!   values are rejected, never clamped.
//! - Updates are published as immutable snapshots through `ArcSwap`. The
//!   audio thread loads the current snapshot once per callback and applies
//!   it between blocks.
//! - The block geometry (`sample_rate`, `frame_size`, `quantum_size`,
//!   `max_block`) is fixed for the lifetime of a pipeline.

use crate::error::ConfigError;
use arc_swap::{ArcSwap, Guard};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// Defaults
// =============================================================================

/// Upper bound on chain length. Storage for this many stages is reserved up
/// front so that reconfiguration never allocates on the audio thread.
pub const MAX_STAGES: usize = 16;

/// RNNoise operates at 48 kHz.
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
/// RNNoise frame: 10 ms at 48 kHz.
pub const DEFAULT_FRAME_SIZE: usize = 480;
/// Typical real-time callback size.
pub const DEFAULT_QUANTUM_SIZE: usize = 128;
/// Largest block a single callback may deliver.
pub const DEFAULT_MAX_BLOCK: usize = 2048;

/// Residual level used by the soft gate when none is given.
pub const DEFAULT_GATE_RESIDUAL: f32 = 0.1;

// =============================================================================
// Stage Parameters
// =============================================================================

/// What a closed gate does to the signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Closed gate outputs silence.
    Hard,
    /// Closed gate attenuates to `residual` (0..=1) of the input.
    Soft { residual: f32 },
}

impl Default for GateMode {
    fn default() -> Self {
        GateMode::Soft {
            residual: DEFAULT_GATE_RESIDUAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateParams {
    /// Linear envelope level at or above which the gate is open.
    pub threshold: f32,
    /// Envelope attack time in seconds.
    pub attack_s: f32,
    /// Envelope release time in seconds.
    pub release_s: f32,
    #[serde(default)]
    pub mode: GateMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Threshold in dBFS.
    pub threshold_db: f32,
    /// Knee width in dB. Zero is a hard knee.
    pub knee_db: f32,
    /// Compression ratio; 1.0 is unity.
    pub ratio: f32,
    /// Attack time in seconds.
    pub attack_s: f32,
    /// Release time in seconds.
    pub release_s: f32,
    /// Gain applied after compression, in dB.
    #[serde(default)]
    pub makeup_db: f32,
}

/// One entry of the DSP chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    Highpass { frequency: f32, q: f32 },
    Lowpass { frequency: f32, q: f32 },
    Peaking { frequency: f32, q: f32, gain_db: f32 },
    LowShelf { frequency: f32, q: f32, gain_db: f32 },
    HighShelf { frequency: f32, q: f32, gain_db: f32 },
    Compressor(CompressorParams),
    Gate(GateParams),
}

impl StageConfig {
    fn validate(&self, index: usize, sample_rate: f32) -> Result<(), ConfigError> {
        let nyquist = sample_rate * 0.5;
        match *self {
            StageConfig::Highpass { frequency, q } | StageConfig::Lowpass { frequency, q } => {
                check_frequency(index, frequency, nyquist)?;
                check_positive(index, "q", q)
            }
            StageConfig::Peaking {
                frequency,
                q,
                gain_db,
            }
            | StageConfig::LowShelf {
                frequency,
                q,
                gain_db,
            }
            | StageConfig::HighShelf {
                frequency,
                q,
                gain_db,
            } => {
                check_frequency(index, frequency, nyquist)?;
                check_positive(index, "q", q)?;
                check_finite(index, "gain_db", gain_db)
            }
            StageConfig::Compressor(p) => {
                check_finite(index, "threshold_db", p.threshold_db)?;
                check_non_negative(index, "knee_db", p.knee_db)?;
                if !p.ratio.is_finite() || p.ratio < 1.0 {
                    return Err(invalid(index, "ratio", p.ratio));
                }
                check_non_negative(index, "attack_s", p.attack_s)?;
                check_non_negative(index, "release_s", p.release_s)?;
                check_finite(index, "makeup_db", p.makeup_db)
            }
            StageConfig::Gate(p) => {
                check_non_negative(index, "threshold", p.threshold)?;
                check_non_negative(index, "attack_s", p.attack_s)?;
                check_non_negative(index, "release_s", p.release_s)?;
                if let GateMode::Soft { residual } = p.mode {
                    if !(0.0..=1.0).contains(&residual) {
                        return Err(invalid(index, "residual", residual));
                    }
                }
                Ok(())
            }
        }
    }

    /// True when `other` is the same kind of stage (parameters may differ).
    pub fn same_kind(&self, other: &StageConfig) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

fn invalid(index: usize, param: &'static str, value: f32) -> ConfigError {
    ConfigError::InvalidParameter {
        index,
        param,
        value,
    }
}

fn check_finite(index: usize, param: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(invalid(index, param, v))
    }
}

fn check_positive(index: usize, param: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(invalid(index, param, v))
    }
}

fn check_non_negative(index: usize, param: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(index, param, v))
    }
}

fn check_frequency(index: usize, hz: f32, nyquist: f32) -> Result<(), ConfigError> {
    if hz.is_finite() && hz > 0.0 && hz < nyquist {
        Ok(())
    } else {
        Err(ConfigError::FrequencyOutOfRange { index, hz, nyquist })
    }
}

// =============================================================================
// Pipeline Config
// =============================================================================

/// Where the neural denoiser runs relative to the DSP chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoisePlacement {
    /// Denoiser is never invoked.
    Off,
    /// Frame is denoised, then shaped by the chain.
    BeforeChain,
    /// Frame is shaped by the chain, then denoised.
    #[default]
    AfterChain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: f32,
    /// Samples per processing frame (the model's frame size).
    pub frame_size: usize,
    /// Samples per real-time callback.
    pub quantum_size: usize,
    /// Largest callback block the pipeline must absorb.
    pub max_block: usize,
    pub stages: Vec<StageConfig>,
    pub denoise: DenoisePlacement,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            quantum_size: DEFAULT_QUANTUM_SIZE,
            max_block: DEFAULT_MAX_BLOCK,
            stages: Vec::new(),
            denoise: DenoisePlacement::default(),
        }
    }
}

impl PipelineConfig {
    /// Identity configuration: no stages, denoiser off.
    pub fn passthrough() -> Self {
        Self {
            denoise: DenoisePlacement::Off,
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_denoise(mut self, placement: DenoisePlacement) -> Self {
        self.denoise = placement;
        self
    }

    pub fn with_quantum_size(mut self, quantum_size: usize) -> Self {
        self.quantum_size = quantum_size;
        self
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate * 0.5
    }

    /// Callback deadline in nanoseconds (one quantum of audio time).
    pub fn quantum_budget_ns(&self) -> u64 {
        (self.quantum_size as f64 / self.sample_rate as f64 * 1e9) as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.frame_size == 0 {
            return Err(ConfigError::ZeroSize {
                field: "frame_size",
            });
        }
        if self.quantum_size == 0 {
            return Err(ConfigError::ZeroSize {
                field: "quantum_size",
            });
        }
        if self.max_block < self.quantum_size {
            return Err(ConfigError::MaxBlockTooSmall {
                max_block: self.max_block,
                quantum_size: self.quantum_size,
            });
        }
        if self.stages.len() > MAX_STAGES {
            return Err(ConfigError::TooManyStages {
                count: self.stages.len(),
                max: MAX_STAGES,
            });
        }
        for (index, stage) in self.stages.iter().enumerate() {
            stage.validate(index, self.sample_rate)?;
        }
        Ok(())
    }

    /// Rejects changes to the fields a running pipeline cannot adopt.
    pub fn check_compatible(&self, running: &PipelineConfig) -> Result<(), ConfigError> {
        if self.sample_rate != running.sample_rate {
            return Err(ConfigError::ImmutableField {
                field: "sample_rate",
            });
        }
        if self.frame_size != running.frame_size {
            return Err(ConfigError::ImmutableField {
                field: "frame_size",
            });
        }
        if self.quantum_size != running.quantum_size {
            return Err(ConfigError::ImmutableField {
                field: "quantum_size",
            });
        }
        if self.max_block != running.max_block {
            return Err(ConfigError::ImmutableField { field: "max_block" });
        }
        Ok(())
    }

    /// Parses and validates a JSON config. Missing geometry fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// =============================================================================
// Snapshot Handoff
// =============================================================================

/// Immutable published configuration.
#[derive(Debug)]
pub struct ConfigSnapshot {
    /// Increments on every accepted update. The initial config is 0.
    pub generation: u64,
    pub config: PipelineConfig,
}

struct SharedConfig {
    current: ArcSwap<ConfigSnapshot>,
    /// Newest generation the audio thread has loaded and let go of.
    released: AtomicU64,
    control: Mutex<ControlState>,
}

struct ControlState {
    next_generation: u64,
    /// Superseded snapshots the audio thread may still hold a guard on. Only
    /// the controller drops them, so the audio thread never frees a snapshot.
    retired: Vec<Arc<ConfigSnapshot>>,
}

/// Controller-side handle for swapping the configuration of a running
/// pipeline. Cheap to clone; all clones address the same pipeline.
#[derive(Clone)]
pub struct ConfigHandle {
    shared: Arc<SharedConfig>,
}

impl ConfigHandle {
    pub(crate) fn new(config: PipelineConfig) -> Self {
        Self {
            shared: Arc::new(SharedConfig {
                current: ArcSwap::from_pointee(ConfigSnapshot {
                    generation: 0,
                    config,
                }),
                released: AtomicU64::new(0),
                control: Mutex::new(ControlState {
                    next_generation: 1,
                    retired: Vec::new(),
                }),
            }),
        }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.shared.current.load_full()
    }

    /// Validates and publishes `config`. Returns the new generation number.
    ///
    /// Updates are serialised, so generations are published in increasing
    /// order even with several controllers. The audio thread picks the change
    /// up at the start of its next callback.
    pub fn update(&self, config: PipelineConfig) -> Result<u64, ConfigError> {
        config.validate()?;

        let mut control = self.lock_control();
        config.check_compatible(&self.shared.current.load().config)?;

        let generation = control.next_generation;
        control.next_generation += 1;
        info!(
            "Publishing pipeline config generation {} ({} stages, denoise {:?})",
            generation,
            config.stages.len(),
            config.denoise
        );
        let previous = self
            .shared
            .current
            .swap(Arc::new(ConfigSnapshot { generation, config }));
        control.retired.push(previous);
        self.collect_retired(&mut control);
        Ok(generation)
    }

    /// Snapshots kept alive on behalf of the audio thread.
    pub fn retired_count(&self) -> usize {
        let mut control = self.lock_control();
        self.collect_retired(&mut control);
        control.retired.len()
    }

    /// Audio-thread read. Does not allocate once the calling thread has
    /// loaded at least once.
    #[inline]
    pub(crate) fn load(&self) -> Guard<Arc<ConfigSnapshot>> {
        self.shared.current.load()
    }

    /// Audio-thread notice that its guard on `generation` has been dropped.
    /// Every snapshot older than `generation` becomes unreachable from the
    /// audio thread.
    #[inline]
    pub(crate) fn release(&self, generation: u64) {
        self.shared.released.store(generation, Ordering::Release);
    }

    fn collect_retired(&self, control: &mut ControlState) {
        let released = self.shared.released.load(Ordering::Acquire);
        control.retired.retain(|s| s.generation >= released);
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        // State stays consistent across a panicking holder.
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn peaking(frequency: f32) -> StageConfig {
        StageConfig::Peaking {
            frequency,
            q: 1.0,
            gain_db: 3.0,
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineConfig::passthrough().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let mut c = PipelineConfig::default();
        c.sample_rate = 0.0;
        assert_eq!(c.validate(), Err(ConfigError::InvalidSampleRate(0.0)));

        let mut c = PipelineConfig::default();
        c.sample_rate = f32::NAN;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidSampleRate(_))));

        let mut c = PipelineConfig::default();
        c.frame_size = 0;
        assert_eq!(
            c.validate(),
            Err(ConfigError::ZeroSize {
                field: "frame_size"
            })
        );

        let c = PipelineConfig::default().with_quantum_size(0);
        assert!(matches!(c.validate(), Err(ConfigError::ZeroSize { .. })));

        let mut c = PipelineConfig::default();
        c.max_block = 64;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::MaxBlockTooSmall { .. })
        ));
    }

    #[test]
    fn test_rejects_frequency_at_or_above_nyquist() {
        let c = PipelineConfig::default().with_stage(peaking(24_000.0));
        assert!(matches!(
            c.validate(),
            Err(ConfigError::FrequencyOutOfRange { index: 0, .. })
        ));

        let c = PipelineConfig::default()
            .with_stage(peaking(1_000.0))
            .with_stage(StageConfig::Highpass {
                frequency: 0.0,
                q: 0.7,
            });
        assert!(matches!(
            c.validate(),
            Err(ConfigError::FrequencyOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_dynamics_parameters() {
        let base = CompressorParams {
            threshold_db: -20.0,
            knee_db: 20.0,
            ratio: 8.0,
            attack_s: 0.005,
            release_s: 0.15,
            makeup_db: 0.0,
        };
        let c = PipelineConfig::default().with_stage(StageConfig::Compressor(CompressorParams {
            ratio: 0.5,
            ..base
        }));
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidParameter { param: "ratio", .. })
        ));

        let c = PipelineConfig::default().with_stage(StageConfig::Compressor(CompressorParams {
            attack_s: -0.001,
            ..base
        }));
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidParameter {
                param: "attack_s",
                ..
            })
        ));

        let c = PipelineConfig::default().with_stage(StageConfig::Gate(GateParams {
            threshold: 0.01,
            attack_s: 0.0,
            release_s: 0.1,
            mode: GateMode::Soft { residual: 1.5 },
        }));
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidParameter {
                param: "residual",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_too_many_stages() {
        let mut c = PipelineConfig::default();
        for _ in 0..=MAX_STAGES {
            c.stages.push(peaking(1_000.0));
        }
        assert!(matches!(
            c.validate(),
            Err(ConfigError::TooManyStages { .. })
        ));
    }

    #[test]
    fn test_json_defaults_and_round_trip() {
        let json = r#"{
            "stages": [
                { "kind": "highpass", "frequency": 85.0, "q": 0.707 },
                { "kind": "gate", "threshold": 0.02, "attack_s": 0.001, "release_s": 0.1 }
            ],
            "denoise": "before_chain"
        }"#;
        let c = PipelineConfig::from_json(json).unwrap();
        assert_eq!(c.frame_size, DEFAULT_FRAME_SIZE);
        assert_eq!(c.quantum_size, DEFAULT_QUANTUM_SIZE);
        assert_eq!(c.denoise, DenoisePlacement::BeforeChain);
        match c.stages[1] {
            StageConfig::Gate(g) => assert_eq!(g.mode, GateMode::default()),
            _ => panic!("expected gate"),
        }

        let back = PipelineConfig::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_json_parse_error_and_validation() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        let json = r#"{ "stages": [ { "kind": "lowpass", "frequency": 30000.0, "q": 0.7 } ] }"#;
        assert!(matches!(
            PipelineConfig::from_json(json),
            Err(ConfigError::FrequencyOutOfRange { .. })
        ));
    }

    #[test]
    fn test_handle_update_bumps_generation() {
        let handle = ConfigHandle::new(PipelineConfig::default());
        assert_eq!(handle.current().generation, 0);

        let g1 = handle
            .update(PipelineConfig::default().with_stage(peaking(2_500.0)))
            .unwrap();
        let g2 = handle.update(PipelineConfig::passthrough()).unwrap();
        assert!(g2 > g1);
        assert_eq!(handle.current().generation, g2);
        assert_eq!(handle.load().config.denoise, DenoisePlacement::Off);
    }

    #[test]
    fn test_handle_rejects_geometry_change_and_keeps_current() {
        let handle = ConfigHandle::new(PipelineConfig::default());
        let err = handle
            .update(PipelineConfig::default().with_quantum_size(256))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ImmutableField {
                field: "quantum_size"
            }
        );

        let bad = PipelineConfig::default().with_stage(peaking(-1.0));
        assert!(handle.update(bad).is_err());
        assert_eq!(handle.current().generation, 0);
    }

    #[test]
    fn test_retired_snapshot_outlives_audio_guard() {
        let handle = ConfigHandle::new(PipelineConfig::default());
        let guard = handle.load();
        handle.update(PipelineConfig::passthrough()).unwrap();
        handle.update(PipelineConfig::default()).unwrap();

        // The swap promoted the guard to its own reference; the controller
        // still holds another, so dropping the guard cannot free it.
        assert_eq!(guard.generation, 0);
        assert!(Arc::strong_count(&*guard) >= 2);
        assert_eq!(handle.retired_count(), 2);
        drop(guard);
        assert_eq!(handle.retired_count(), 2);

        // Audio thread moved on to generation 2: 0 and 1 are unreachable.
        handle.release(2);
        assert_eq!(handle.retired_count(), 0);
        handle.update(PipelineConfig::passthrough()).unwrap();
        assert_eq!(handle.retired_count(), 1);
    }

    #[test]
    fn test_concurrent_updates_publish_in_order() {
        let handle = ConfigHandle::new(PipelineConfig::default());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let generation = handle.update(PipelineConfig::passthrough()).unwrap();
                        assert!(handle.current().generation >= generation);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(handle.current().generation, 800);
    }
}
