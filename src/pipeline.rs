//! Real-time denoise pipeline.
//!
//! `DenoisePipeline::process` is the single entry point the audio callback
//! drives, once per quantum. Per call, in order:
//!
//! 1. adopt a newly published config generation (between blocks, never
//!    mid-frame)
//! 2. poll the inference bridge for a model that finished loading
//! 3. push the input quantum into the frame adapter, which runs the chain
//!    and denoiser on every completed frame
//! 4. pull one output quantum (silence on underrun)
//! 5. record timing against the quantum's deadline
//!
//! Nothing in this path allocates, locks, logs, or panics on odd lengths.

use crate::adapter::{FrameAdapter, FrameProcessor};
use crate::config::{ConfigHandle, ConfigSnapshot, DenoisePlacement, PipelineConfig};
use crate::dsp::{FrameStage, StageChain};
use crate::error::ConfigError;
use crate::inference::{InferenceBridge, ModelLoader, ModelState};
use crate::status::{status_channel, StatusEvent, StatusMonitor, StatusSink};
use arc_swap::Guard;
use log::info;
use std::sync::Arc;
use std::time::Instant;

// =============================================================================
// Frame engine
// =============================================================================

/// Per-frame work: the DSP chain and the denoiser in configured order.
pub struct FrameEngine {
    chain: StageChain,
    bridge: InferenceBridge,
    placement: DenoisePlacement,
}

impl FrameEngine {
    pub fn chain(&self) -> &StageChain {
        &self.chain
    }

    pub fn bridge(&self) -> &InferenceBridge {
        &self.bridge
    }

    fn apply(&mut self, config: &PipelineConfig) {
        self.chain.apply(&config.stages);
        self.placement = config.denoise;
    }
}

impl FrameProcessor for FrameEngine {
    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        match self.placement {
            DenoisePlacement::Off => self.chain.process(frame),
            DenoisePlacement::BeforeChain => {
                self.bridge.process_in_place(frame);
                self.chain.process(frame);
            }
            DenoisePlacement::AfterChain => {
                self.chain.process(frame);
                self.bridge.process_in_place(frame);
            }
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Non-real-time handles returned alongside a new pipeline.
pub struct PipelineHandles {
    /// Publishes config updates.
    pub config: ConfigHandle,
    /// Delivers the denoise model, once.
    pub loader: ModelLoader,
    /// Reads counters and events.
    pub status: StatusMonitor,
}

pub struct DenoisePipeline {
    adapter: FrameAdapter<FrameEngine>,
    config: ConfigHandle,
    applied_generation: u64,
    sink: StatusSink,
    budget_ns: u64,
}

impl DenoisePipeline {
    pub fn new(config: PipelineConfig) -> Result<(Self, PipelineHandles), ConfigError> {
        config.validate()?;

        let (bridge, loader) = InferenceBridge::new(config.frame_size);
        let (sink, status) = status_channel(bridge.state_handle());

        let engine = FrameEngine {
            chain: StageChain::new(&config.stages, config.sample_rate),
            bridge,
            placement: config.denoise,
        };
        let adapter = FrameAdapter::new(
            config.frame_size,
            config.quantum_size,
            config.max_block,
            engine,
        );

        info!(
            "Denoise pipeline: {} Hz, frame {}, quantum {}, latency {} samples, {} stages",
            config.sample_rate,
            config.frame_size,
            config.quantum_size,
            adapter.latency_samples(),
            config.stages.len()
        );

        let budget_ns = config.quantum_budget_ns();
        let handle = ConfigHandle::new(config);
        let pipeline = Self {
            adapter,
            config: handle.clone(),
            applied_generation: 0,
            sink,
            budget_ns,
        };
        Ok((
            pipeline,
            PipelineHandles {
                config: handle,
                loader,
                status,
            },
        ))
    }

    /// Processes one callback block. `output` is always completely written.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        #[cfg(feature = "assert_process_allocs")]
        assert_no_alloc::assert_no_alloc(|| self.process_block(input, output));

        #[cfg(not(feature = "assert_process_allocs"))]
        self.process_block(input, output);
    }

    #[inline]
    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let start = Instant::now();
        let counters = self.sink.counters();
        counters.add_callback();

        self.refresh_config();

        if let Some(event) = self.adapter.processor_mut().bridge.poll() {
            self.sink.emit(event);
        }

        let report = self.adapter.push_input(input);
        self.sink.counters().add_frames(report.frames);
        if report.dropped > 0 {
            self.sink.counters().add_overflow(report.dropped);
            self.sink.emit(StatusEvent::Overflow {
                dropped: report.dropped,
            });
        }

        let missing = self.adapter.pull_output(output);
        if missing > 0 {
            self.sink.counters().add_underrun(missing);
            self.sink.emit(StatusEvent::Underrun { missing });
        }

        let elapsed_ns = start.elapsed().as_nanos() as u64;
        self.sink.counters().set_block_time_ns(elapsed_ns);
        if elapsed_ns > self.budget_ns {
            self.sink.counters().add_deadline_miss();
            self.sink.emit(StatusEvent::DeadlineMissed {
                elapsed_ns,
                budget_ns: self.budget_ns,
            });
        }
    }

    fn refresh_config(&mut self) {
        let generation = {
            let snapshot = self.load_snapshot();
            if snapshot.generation != self.applied_generation {
                self.adapter.processor_mut().apply(&snapshot.config);
            }
            snapshot.generation
        };
        // Guard dropped: the controller may free anything older.
        self.config.release(generation);

        if generation == self.applied_generation {
            return;
        }
        self.applied_generation = generation;
        self.sink.counters().set_config_generation(generation);
        self.sink.emit(StatusEvent::ConfigApplied { generation });
    }

    #[inline]
    fn load_snapshot(&self) -> Guard<Arc<ConfigSnapshot>> {
        // arc-swap registers a per-thread node the first time a thread loads.
        #[cfg(feature = "assert_process_allocs")]
        return assert_no_alloc::permit_alloc(|| self.config.load());

        #[cfg(not(feature = "assert_process_allocs"))]
        self.config.load()
    }

    /// Drops buffered audio and filter state; the model stays loaded.
    pub fn reset(&mut self) {
        self.adapter.reset();
        self.adapter.processor_mut().chain.reset();
    }

    pub fn latency_samples(&self) -> usize {
        self.adapter.latency_samples()
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.adapter.frames_dispatched()
    }

    pub fn buffered_input(&self) -> usize {
        self.adapter.buffered_input()
    }

    pub fn model_state(&self) -> ModelState {
        self.adapter.processor().bridge.model_state()
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    pub fn engine(&self) -> &FrameEngine {
        self.adapter.processor()
    }
}

impl Drop for DenoisePipeline {
    fn drop(&mut self) {
        // No further loads; retired snapshots can all go.
        self.config.release(u64::MAX);
    }
}

// =============================================================================
// Tests
// =============================================================================
