//! Thread-safe status reporting for the external observer.
//!
//! Counters are plain atomics written by the audio thread and read by anyone
//! holding a [`StatusMonitor`]. Discrete events travel through a bounded
//! lock-free queue; when the observer falls behind, new events are dropped
//! (and counted) rather than blocking the audio thread. The counters always
//! hold the full picture.

use crate::inference::{ModelState, ModelStateHandle};
use ringbuf::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Events held for the observer; further events are dropped until it catches up.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The denoise model was adopted; frames now go through it.
    ModelReady,
    /// Model loading failed; the pipeline stays in passthrough.
    ModelLoadFailed,
    /// A callback could not be fully served; `missing` samples were silence.
    Underrun { missing: usize },
    /// Processed samples were discarded because the output ring was full.
    Overflow { dropped: usize },
    /// A callback took longer than one quantum of audio time.
    DeadlineMissed { elapsed_ns: u64, budget_ns: u64 },
    /// A new configuration generation took effect.
    ConfigApplied { generation: u64 },
}

/// Shared counters.
#[derive(Default)]
pub struct PipelineStatus {
    callbacks: AtomicU64,
    frames_processed: AtomicU64,
    underruns: AtomicU64,
    underrun_samples: AtomicU64,
    overflow_samples: AtomicU64,
    deadline_misses: AtomicU64,
    last_block_ns: AtomicU64,
    max_block_ns: AtomicU64,
    config_generation: AtomicU64,
    events_dropped: AtomicU64,
}

impl PipelineStatus {
    pub fn add_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_frames(&self, frames: usize) {
        self.frames_processed
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn add_underrun(&self, missing: usize) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        self.underrun_samples
            .fetch_add(missing as u64, Ordering::Relaxed);
    }

    pub fn add_overflow(&self, dropped: usize) {
        self.overflow_samples
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn add_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_block_time_ns(&self, ns: u64) {
        self.last_block_ns.store(ns, Ordering::Relaxed);
        self.max_block_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn set_config_generation(&self, generation: u64) {
        self.config_generation.store(generation, Ordering::Relaxed);
    }

    pub fn get_callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn get_frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn get_underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn get_underrun_samples(&self) -> u64 {
        self.underrun_samples.load(Ordering::Relaxed)
    }

    pub fn get_overflow_samples(&self) -> u64 {
        self.overflow_samples.load(Ordering::Relaxed)
    }

    pub fn get_deadline_misses(&self) -> u64 {
        self.deadline_misses.load(Ordering::Relaxed)
    }

    pub fn get_last_block_ns(&self) -> u64 {
        self.last_block_ns.load(Ordering::Relaxed)
    }

    pub fn get_max_block_ns(&self) -> u64 {
        self.max_block_ns.load(Ordering::Relaxed)
    }

    pub fn get_config_generation(&self) -> u64 {
        self.config_generation.load(Ordering::Relaxed)
    }

    pub fn get_events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub model_state: ModelState,
    pub callbacks: u64,
    pub frames_processed: u64,
    pub underruns: u64,
    pub underrun_samples: u64,
    pub overflow_samples: u64,
    pub deadline_misses: u64,
    pub last_block_ns: u64,
    pub max_block_ns: u64,
    pub config_generation: u64,
    pub events_dropped: u64,
}

/// Audio-thread end: counters plus the event producer.
pub struct StatusSink {
    counters: Arc<PipelineStatus>,
    events: Producer<StatusEvent>,
}

impl StatusSink {
    #[inline]
    pub fn counters(&self) -> &PipelineStatus {
        &self.counters
    }

    /// Queues `event`; if the queue is full the event is dropped and counted.
    #[inline]
    pub fn emit(&mut self, event: StatusEvent) {
        if self.events.push(event).is_err() {
            self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Observer end.
pub struct StatusMonitor {
    counters: Arc<PipelineStatus>,
    events: Consumer<StatusEvent>,
    model_state: ModelStateHandle,
}

impl StatusMonitor {
    pub fn poll_event(&mut self) -> Option<StatusEvent> {
        self.events.pop()
    }

    /// Hands every queued event to `f`, oldest first.
    pub fn drain<F: FnMut(StatusEvent)>(&mut self, mut f: F) {
        while let Some(event) = self.events.pop() {
            f(event);
        }
    }

    pub fn model_state(&self) -> ModelState {
        self.model_state.get()
    }

    pub fn counters(&self) -> &PipelineStatus {
        &self.counters
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let c = &self.counters;
        StatusSnapshot {
            model_state: self.model_state.get(),
            callbacks: c.get_callbacks(),
            frames_processed: c.get_frames_processed(),
            underruns: c.get_underruns(),
            underrun_samples: c.get_underrun_samples(),
            overflow_samples: c.get_overflow_samples(),
            deadline_misses: c.get_deadline_misses(),
            last_block_ns: c.get_last_block_ns(),
            max_block_ns: c.get_max_block_ns(),
            config_generation: c.get_config_generation(),
            events_dropped: c.get_events_dropped(),
        }
    }
}

/// Creates the connected sink/monitor pair.
pub fn status_channel(model_state: ModelStateHandle) -> (StatusSink, StatusMonitor) {
    let counters = Arc::new(PipelineStatus::default());
    let (producer, consumer) = RingBuffer::<StatusEvent>::new(EVENT_QUEUE_CAPACITY).split();
    (
        StatusSink {
            counters: Arc::clone(&counters),
            events: producer,
        },
        StatusMonitor {
            counters,
            events: consumer,
            model_state,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceBridge;

    fn channel() -> (StatusSink, StatusMonitor) {
        let (bridge, _loader) = InferenceBridge::new(480);
        status_channel(bridge.state_handle())
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (mut sink, mut monitor) = channel();
        sink.emit(StatusEvent::Underrun { missing: 128 });
        sink.emit(StatusEvent::ModelReady);

        let mut seen = Vec::new();
        monitor.drain(|e| seen.push(e));
        assert_eq!(
            seen,
            vec![StatusEvent::Underrun { missing: 128 }, StatusEvent::ModelReady]
        );
        assert_eq!(monitor.poll_event(), None);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (mut sink, monitor) = channel();
        for _ in 0..EVENT_QUEUE_CAPACITY + 10 {
            sink.emit(StatusEvent::ModelReady);
        }
        assert_eq!(monitor.snapshot().events_dropped, 10);
    }

    #[test]
    fn test_counters_visible_in_snapshot() {
        let (sink, monitor) = channel();
        let c = sink.counters();
        c.add_callback();
        c.add_frames(2);
        c.add_underrun(128);
        c.add_underrun(64);
        c.set_block_time_ns(500);
        c.set_block_time_ns(200);
        c.add_deadline_miss();

        let snap = monitor.snapshot();
        assert_eq!(snap.model_state, ModelState::Unloaded);
        assert_eq!(snap.callbacks, 1);
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.underruns, 2);
        assert_eq!(snap.underrun_samples, 192);
        assert_eq!(snap.last_block_ns, 200);
        assert_eq!(snap.max_block_ns, 500);
        assert_eq!(snap.deadline_misses, 1);
    }
}
