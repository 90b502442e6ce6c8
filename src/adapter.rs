//! Frame Adapter (quantum <-> frame re-blocking)
//!
//! The real-time callback delivers blocks of `quantum_size` samples, while the
//! processing stage needs exactly `frame_size` samples at a time. The two sizes
//! need not divide each other (128 vs 480 is the common case), so frame
//! boundaries drift relative to callback boundaries.
//!
//! # Design Notes
//! - Input accumulates in a ring of exactly one frame. Every time it fills, the
//!   frame is handed to the processor and the result is appended to the output
//!   ring. All complete frames are drained within a single push.
//! - The output ring is primed with `frame_size - gcd(frame_size, quantum_size)`
//!   zeros. That is the smallest lag for which a steady push/pull cadence never
//!   runs dry, and it is always below `frame_size + quantum_size`.
//! - Nothing here allocates after construction.

use crate::ring::SampleRing;

/// Stage invoked once per complete frame. Works in place.
pub trait FrameProcessor {
    fn process_frame(&mut self, frame: &mut [f32]);
}

impl<F: FnMut(&mut [f32])> FrameProcessor for F {
    fn process_frame(&mut self, frame: &mut [f32]) {
        self(frame)
    }
}

/// Outcome of a single `push_input` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Frames dispatched to the processor during this push.
    pub frames: usize,
    /// Processed samples that did not fit in the output ring.
    pub dropped: usize,
}

pub struct FrameAdapter<P: FrameProcessor> {
    frame_size: usize,
    quantum_size: usize,
    latency: usize,

    input: SampleRing,
    output: SampleRing,
    frame: Vec<f32>,

    processor: P,

    frames_dispatched: u64,
    dropped_total: u64,
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl<P: FrameProcessor> FrameAdapter<P> {
    /// `max_block` is the largest block that will be pushed between two pulls.
    pub fn new(frame_size: usize, quantum_size: usize, max_block: usize, processor: P) -> Self {
        let frame_size = frame_size.max(1);
        let quantum_size = quantum_size.max(1);
        let latency = frame_size - gcd(frame_size, quantum_size);

        let mut output = SampleRing::with_capacity(latency + frame_size + max_block.max(quantum_size));
        output.fill_silence(latency);

        Self {
            frame_size,
            quantum_size,
            latency,
            input: SampleRing::with_capacity(frame_size),
            output,
            frame: vec![0.0; frame_size],
            processor,
            frames_dispatched: 0,
            dropped_total: 0,
        }
    }

    /// Appends `quantum` and processes every frame that becomes complete.
    pub fn push_input(&mut self, quantum: &[f32]) -> PushReport {
        let mut report = PushReport::default();
        let mut rest = quantum;

        while !rest.is_empty() {
            let written = self.input.write(rest);
            rest = &rest[written..];

            while self.input.len() >= self.frame_size {
                self.input.read(&mut self.frame);
                self.processor.process_frame(&mut self.frame);

                let stored = self.output.write(&self.frame);
                report.dropped += self.frame_size - stored;
                report.frames += 1;
            }
        }

        self.frames_dispatched += report.frames as u64;
        self.dropped_total += report.dropped as u64;
        report
    }

    /// Fills `out` with processed samples. Returns the number of samples that
    /// had to be replaced with silence (0 when fully served).
    #[inline]
    pub fn pull_output(&mut self, out: &mut [f32]) -> usize {
        self.output.read(out)
    }

    /// Drops all buffered audio, re-primes the output, and zeroes counters.
    pub fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
        self.output.fill_silence(self.latency);
        self.frames_dispatched = 0;
        self.dropped_total = 0;
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn quantum_size(&self) -> usize {
        self.quantum_size
    }

    /// Fixed lag between an input sample and its processed counterpart.
    pub fn latency_samples(&self) -> usize {
        self.latency
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_total
    }

    /// Input samples waiting for a complete frame.
    pub fn buffered_input(&self) -> usize {
        self.input.len()
    }

    /// Processed samples (including priming) not yet pulled.
    pub fn buffered_output(&self) -> usize {
        self.output.len()
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> impl FnMut(&mut [f32]) {
        |_frame: &mut [f32]| {}
    }

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| (i % 9973) as f32 + 1.0).collect()
    }

    #[test]
    fn test_latency_values() {
        assert_eq!(FrameAdapter::new(480, 128, 2048, identity()).latency_samples(), 448);
        assert_eq!(FrameAdapter::new(480, 256, 2048, identity()).latency_samples(), 448);
        assert_eq!(FrameAdapter::new(480, 480, 2048, identity()).latency_samples(), 0);
        assert_eq!(FrameAdapter::new(480, 160, 2048, identity()).latency_samples(), 320);
        assert_eq!(FrameAdapter::new(512, 128, 2048, identity()).latency_samples(), 384);
    }

    #[test]
    fn test_latency_bound_and_no_underrun_in_steady_state() {
        for &(fa, qa) in &[(480, 128), (480, 256), (480, 480), (480, 1000), (441, 128), (64, 100)] {
            let mut adapter = FrameAdapter::new(fa, qa, 4096, identity());
            assert!(adapter.latency_samples() <= fa + qa - 1);

            let mut out = vec![0.0f32; qa];
            for k in 0..200 {
                adapter.push_input(&ramp(k * qa, qa));
                assert_eq!(adapter.pull_output(&mut out), 0, "underrun at fa={fa} qa={qa} k={k}");
            }
        }
    }

    #[test]
    fn test_identity_round_trip_exact_after_lag() {
        let (fa, qa) = (480, 128);
        let mut adapter = FrameAdapter::new(fa, qa, 2048, identity());
        let lag = adapter.latency_samples();

        let total = qa * 150;
        let input = ramp(0, total);
        let mut output = vec![0.0f32; total];
        for (inp, out) in input.chunks(qa).zip(output.chunks_mut(qa)) {
            adapter.push_input(inp);
            adapter.pull_output(out);
        }

        assert!(output[..lag].iter().all(|&s| s == 0.0));
        for i in 0..total - lag {
            assert_eq!(output[i + lag], input[i]);
        }
    }

    #[test]
    fn test_ten_quanta_of_ones() {
        let mut adapter = FrameAdapter::new(480, 128, 2048, identity());
        let ones = [1.0f32; 128];

        let mut frames = 0;
        for _ in 0..10 {
            frames += adapter.push_input(&ones).frames;
        }
        assert_eq!(frames, 2);
        assert_eq!(adapter.frames_dispatched(), 2);
        assert_eq!(adapter.buffered_input(), 320);
        assert_eq!(adapter.buffered_output(), 448 + 960);

        // Successive pulls walk the stream: 448 zeros, then 960 processed ones.
        let mut stream = Vec::new();
        let mut out = [0.0f32; 128];
        for _ in 0..11 {
            assert_eq!(adapter.pull_output(&mut out), 0);
            stream.extend_from_slice(&out);
        }
        assert_eq!(stream.len(), 1408);
        assert!(stream[..448].iter().all(|&s| s == 0.0));
        assert!(stream[448..].iter().all(|&s| s == 1.0));

        // Ring is drained now; the next pull is pure silence.
        assert_eq!(adapter.pull_output(&mut out), 128);
        assert_eq!(out, [0.0; 128]);
    }

    #[test]
    fn test_pull_before_any_frame_is_silence() {
        let mut adapter = FrameAdapter::new(480, 480, 2048, identity());
        let mut out = [7.0f32; 480];
        assert_eq!(adapter.pull_output(&mut out), 480);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_oversized_push_drains_every_frame() {
        let mut adapter = FrameAdapter::new(480, 128, 4096, identity());
        let block = ramp(0, 2000);
        let report = adapter.push_input(&block);
        assert_eq!(report.frames, 4);
        assert_eq!(report.dropped, 0);
        assert_eq!(adapter.buffered_input(), 80);
    }

    #[test]
    fn test_processor_sees_whole_frames_in_order() {
        let mut seen: Vec<f32> = Vec::new();
        {
            let mut adapter = FrameAdapter::new(480, 128, 2048, |frame: &mut [f32]| {
                assert_eq!(frame.len(), 480);
                seen.extend_from_slice(frame);
                for s in frame.iter_mut() {
                    *s *= 2.0;
                }
            });
            for k in 0..15 {
                adapter.push_input(&ramp(k * 128, 128));
            }
            assert_eq!(adapter.frames_dispatched(), 4);
        }
        assert_eq!(seen, ramp(0, 1920));
    }

    #[test]
    fn test_overflow_is_counted_not_fatal() {
        let mut adapter = FrameAdapter::new(480, 128, 128, identity());
        let capacity = 448 + 480 + 128;
        let mut dropped = 0;
        for _ in 0..20 {
            dropped += adapter.push_input(&[1.0; 128]).dropped;
        }
        assert!(dropped > 0);
        assert_eq!(adapter.dropped_samples(), dropped as u64);
        assert_eq!(adapter.buffered_output(), capacity);
    }

    #[test]
    fn test_reset_reprimes() {
        let mut adapter = FrameAdapter::new(480, 128, 2048, identity());
        for _ in 0..5 {
            adapter.push_input(&[1.0; 128]);
        }
        adapter.reset();
        assert_eq!(adapter.buffered_input(), 0);
        assert_eq!(adapter.buffered_output(), 448);
        assert_eq!(adapter.frames_dispatched(), 0);
    }
}
