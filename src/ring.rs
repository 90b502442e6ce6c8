//! Fixed-capacity sample ring used for re-blocking.
//!
//! Wraps both ends of a `ringbuf` SPSC buffer in one owner. The adapter
//! drives writer and reader from the same thread, so the split halves never
//! cross threads; the lock-free buffer is still used so that no operation
//! can block or grow.
//!
//! Invariant: `0 <= len() <= capacity()`. Reads past the stored data are
//! padded with silence and the shortfall is reported.

use ringbuf::{Consumer, Producer, RingBuffer};

pub struct SampleRing {
    producer: Producer<f32>,
    consumer: Consumer<f32>,
}

impl SampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::<f32>::new(capacity.max(1)).split();
        Self { producer, consumer }
    }

    /// Appends as many of `samples` as fit and returns how many were written.
    #[inline]
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Appends `count` zeros (up to the free space). Returns how many fit.
    pub fn fill_silence(&mut self, count: usize) -> usize {
        let mut written = 0;
        while written < count && self.producer.push(0.0).is_ok() {
            written += 1;
        }
        written
    }

    /// Fills `out` from the ring. Any part that cannot be served is zeroed,
    /// and its length is returned.
    #[inline]
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let got = self.consumer.pop_slice(out);
        let missing = out.len() - got;
        if missing > 0 {
            out[got..].fill(0.0);
        }
        missing
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.producer.remaining()
    }

    pub fn clear(&mut self) {
        while self.consumer.pop().is_some() {}
    }
}
