//! voxframe: real-time frame-adapting denoise pipeline.
//!
//! Audio arrives from a real-time callback in fixed quanta (typically 128
//! samples). The pipeline re-blocks it into the 480-sample frames RNNoise
//! needs, runs a configurable chain of filters, gate and compressor plus the
//! neural denoiser on each frame, and re-blocks the result back to quanta,
//! all without allocating, locking or blocking on the audio thread.
//!
//! ```no_run
//! use voxframe::{DenoisePipeline, Preset};
//!
//! let (mut pipeline, handles) = DenoisePipeline::new(Preset::GatedVoice.config()).unwrap();
//! // Model arrives asynchronously; frames pass through until it is ready.
//! handles.loader.spawn(std::fs::read("rnnoise.weights").unwrap()).unwrap();
//!
//! let input = [0.0f32; 128];
//! let mut output = [0.0f32; 128];
//! pipeline.process(&input, &mut output); // once per audio callback
//! ```

pub mod adapter;
pub mod config;
pub mod dsp;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod presets;
pub mod ring;
pub mod status;

pub use adapter::{FrameAdapter, FrameProcessor, PushReport};
pub use config::{
    CompressorParams, ConfigHandle, DenoisePlacement, GateMode, GateParams, PipelineConfig,
    StageConfig,
};
pub use error::{ConfigError, LoadError};
pub use inference::{DenoiseModel, InferenceBridge, ModelLoader, ModelState, RnnoiseModel};
pub use pipeline::{DenoisePipeline, PipelineHandles};
pub use presets::Preset;
pub use ring::SampleRing;
pub use status::{StatusEvent, StatusMonitor, StatusSnapshot};
