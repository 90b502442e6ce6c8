//! Inference Bridge (neural denoise backend)
//!
//! Goal: run a fixed-frame denoise model (RNNoise) inside the real-time frame
//! loop without ever blocking the audio thread on the model's arrival.
//!
//! Design constraints
//! - Audio thread safe: no allocations or locks in `poll()` / `process()`
//! - Graceful fallback: until a model is ready, and forever after a failed
//!   load, frames pass through bit-identical
//! - The model works in 16-bit PCM range; frames are scaled by 32768 on the
//!   way in and back on the way out
//!
//! # Lifecycle
//! `Unloaded -> Loading -> Ready | Failed`, published through one atomic.
//! The [`ModelLoader`] (any thread) builds the model, parks it in a
//! single-slot lock-free queue and only then publishes `Ready` with release
//! ordering. The bridge observes `Ready` with acquire ordering at the top of
//! a callback and takes the model out of the slot.

use crate::error::LoadError;
use crate::status::StatusEvent;
use log::{error, info, warn};
use nnnoiseless::{DenoiseState, RnnModel};
use ringbuf::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Float <-> 16-bit PCM scale used by RNNoise.
pub const PCM_SCALE: f32 = 32768.0;

/// Blobs shorter than this are rejected before parsing. Real RNNoise weight
/// files are tens of kilobytes.
const MIN_BLOB_BYTES: usize = 1024;

// -----------------------------------------------------------------------------
// Model abstraction
// -----------------------------------------------------------------------------

/// A denoiser that processes exactly `frame_size()` samples per call.
///
/// Samples are in 16-bit PCM range (`[-32768, 32767]`), not normalized.
pub trait DenoiseModel: Send {
    fn frame_size(&self) -> usize;

    /// `input` and `output` both have exactly `frame_size()` samples.
    fn process_frame(&mut self, input: &[f32], output: &mut [f32]);
}

/// RNNoise via the pure-Rust `nnnoiseless` port.
pub struct RnnoiseModel {
    state: Box<DenoiseState<'static>>,
}

impl RnnoiseModel {
    /// Model using the weights compiled into `nnnoiseless`.
    pub fn builtin() -> Self {
        Self {
            state: DenoiseState::new(),
        }
    }

    /// Model built from a serialized RNNoise weight blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self, LoadError> {
        if blob.len() < MIN_BLOB_BYTES {
            return Err(LoadError::Malformed);
        }
        let model = RnnModel::from_bytes(blob).ok_or(LoadError::Malformed)?;
        Ok(Self {
            state: DenoiseState::from_model(model),
        })
    }
}

impl DenoiseModel for RnnoiseModel {
    fn frame_size(&self) -> usize {
        DenoiseState::FRAME_SIZE
    }

    fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
        // Voice activity estimate is not used.
        self.state.process_frame(output, input);
    }
}

// -----------------------------------------------------------------------------
// Lifecycle state
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModelState {
    Unloaded = 0,
    Loading = 1,
    Ready = 2,
    Failed = 3,
}

impl ModelState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ModelState::Loading,
            2 => ModelState::Ready,
            3 => ModelState::Failed,
            _ => ModelState::Unloaded,
        }
    }
}

/// Read-only view of a bridge's lifecycle state, for observers.
#[derive(Clone)]
pub struct ModelStateHandle(Arc<AtomicU8>);

impl ModelStateHandle {
    pub fn get(&self) -> ModelState {
        ModelState::from_u8(self.0.load(Ordering::Acquire))
    }
}

pub type ModelBox = Box<dyn DenoiseModel>;

// -----------------------------------------------------------------------------
// Loader (non-real-time side)
// -----------------------------------------------------------------------------

/// One-shot delivery of a model to its bridge. Consumed by loading.
pub struct ModelLoader {
    frame_size: usize,
    state: Arc<AtomicU8>,
    outbox: Producer<ModelBox>,
}

impl ModelLoader {
    /// Parses an RNNoise weight blob and hands the model to the bridge.
    pub fn load_blob(self, blob: &[u8]) -> Result<(), LoadError> {
        self.load_with(|| RnnoiseModel::from_blob(blob).map(|m| Box::new(m) as ModelBox))
    }

    /// Hands over RNNoise with the weights bundled in `nnnoiseless`.
    pub fn load_builtin(self) -> Result<(), LoadError> {
        self.load_with(|| Ok(Box::new(RnnoiseModel::builtin()) as ModelBox))
    }

    /// Hands over an already-constructed model.
    pub fn install(self, model: ModelBox) -> Result<(), LoadError> {
        self.load_with(move || Ok(model))
    }

    /// Runs `build` on the calling thread and publishes the result.
    pub fn load_with<F>(mut self, build: F) -> Result<(), LoadError>
    where
        F: FnOnce() -> Result<ModelBox, LoadError>,
    {
        self.state.store(ModelState::Loading as u8, Ordering::Release);
        info!("Loading denoise model (frame size {})...", self.frame_size);

        let result = build().and_then(|model| {
            if model.frame_size() != self.frame_size {
                return Err(LoadError::FrameSizeMismatch {
                    model: model.frame_size(),
                    pipeline: self.frame_size,
                });
            }
            self.outbox.push(model).map_err(|_| LoadError::AlreadyLoaded)
        });

        match result {
            Ok(()) => {
                self.state.store(ModelState::Ready as u8, Ordering::Release);
                info!("Denoise model ready.");
                Ok(())
            }
            Err(e) => {
                self.state.store(ModelState::Failed as u8, Ordering::Release);
                error!("Denoise model load failed, staying in passthrough: {}", e);
                Err(e)
            }
        }
    }

    /// Loads `blob` on a dedicated background thread.
    pub fn spawn(self, blob: Vec<u8>) -> std::io::Result<JoinHandle<Result<(), LoadError>>> {
        thread::Builder::new()
            .name("denoise-model-loader".into())
            .spawn(move || self.load_blob(&blob))
    }
}

// -----------------------------------------------------------------------------
// Bridge (real-time side)
// -----------------------------------------------------------------------------

pub struct InferenceBridge {
    frame_size: usize,
    state: Arc<AtomicU8>,
    inbox: Consumer<ModelBox>,
    model: Option<ModelBox>,

    scratch_in: Vec<f32>,
    scratch_out: Vec<f32>,

    // Terminal state (Ready/Failed) already reported
    reported: bool,
    rejected_frames: u64,
}

impl InferenceBridge {
    /// Creates an `Unloaded` bridge and the loader that can complete it.
    pub fn new(frame_size: usize) -> (Self, ModelLoader) {
        let state = Arc::new(AtomicU8::new(ModelState::Unloaded as u8));
        let (outbox, inbox) = RingBuffer::<ModelBox>::new(1).split();

        let bridge = Self {
            frame_size,
            state: Arc::clone(&state),
            inbox,
            model: None,
            scratch_in: vec![0.0; frame_size],
            scratch_out: vec![0.0; frame_size],
            reported: false,
            rejected_frames: 0,
        };
        let loader = ModelLoader {
            frame_size,
            state,
            outbox,
        };
        (bridge, loader)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn model_state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn state_handle(&self) -> ModelStateHandle {
        ModelStateHandle(Arc::clone(&self.state))
    }

    /// True once a model has been adopted and frames go through it.
    pub fn is_active(&self) -> bool {
        self.model.is_some()
    }

    /// Frames whose model output was non-finite and were passed through.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    /// Checks the lifecycle flag. Call at the top of each callback.
    ///
    /// Returns `ModelReady` / `ModelLoadFailed` exactly once, when the loader
    /// reaches a terminal state.
    #[inline]
    pub fn poll(&mut self) -> Option<StatusEvent> {
        if self.reported {
            return None;
        }
        match self.model_state() {
            ModelState::Ready => {
                self.model = self.inbox.pop();
                self.reported = true;
                Some(StatusEvent::ModelReady)
            }
            ModelState::Failed => {
                self.reported = true;
                Some(StatusEvent::ModelLoadFailed)
            }
            ModelState::Unloaded | ModelState::Loading => None,
        }
    }

    /// Denoises one frame in place. Without an adopted model (or for a frame
    /// of the wrong length) the frame is left untouched.
    #[inline]
    pub fn process_in_place(&mut self, frame: &mut [f32]) {
        let model = match self.model.as_mut() {
            Some(model) if frame.len() == self.frame_size => model,
            _ => return,
        };

        for (dst, &src) in self.scratch_in.iter_mut().zip(frame.iter()) {
            *dst = src * PCM_SCALE;
        }
        model.process_frame(&self.scratch_in, &mut self.scratch_out);

        if self.scratch_out.iter().all(|s| s.is_finite()) {
            for (dst, &src) in frame.iter_mut().zip(self.scratch_out.iter()) {
                *dst = src / PCM_SCALE;
            }
        } else {
            self.rejected_frames += 1;
        }
    }

    /// Denoises `input` into `output`. Lengths beyond the shorter slice are
    /// zero-filled in `output`.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        output[n..].fill(0.0);
        self.process_in_place(&mut output[..n]);
    }
}

impl Drop for InferenceBridge {
    fn drop(&mut self) {
        if self.rejected_frames > 0 {
            warn!(
                "Denoise model produced {} non-finite frames (passed through)",
                self.rejected_frames
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
