//! Lock-free SPSC ring buffer for float samples.
//!
//! Producer: the audio capture callback (real-time thread).
//! Consumer: the DSP analysis thread.
//!
//! The producer side is wait-free: no allocation, no locks, no syscalls.
//! Positions are monotonically increasing u64 counters; the producer
//! publishes with a release store after copying, the consumer likewise,
//! and each side reads the other's position with acquire ordering.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RingBuffer {
    buf: UnsafeCell<Box<[f32]>>,
    capacity: u64,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

// SAFETY: single producer and single consumer never touch the same region
// at the same time; region ownership is handed over through the
// acquire/release position stores.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: UnsafeCell::new(vec![0.0; capacity].into_boxed_slice()),
            capacity: capacity as u64,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
        }
    }

    /// Producer side. Writes up to `data.len()` samples, returns the number
    /// actually written (bounded by free space).
    pub fn write(&self, data: &[f32]) -> usize {
        let wr = self.write_pos.load(Ordering::Relaxed);
        let rd = self.read_pos.load(Ordering::Acquire);

        let free = self.capacity - (wr - rd);
        let to_write = (data.len() as u64).min(free) as usize;
        if to_write == 0 {
            return 0;
        }

        let wr_idx = (wr % self.capacity) as usize;
        let first = to_write.min(self.capacity as usize - wr_idx);

        // SAFETY: only the producer writes to [wr, wr+to_write); the
        // consumer cannot read past `wr` until the release store below.
        unsafe {
            let buf = &mut *self.buf.get();
            buf[wr_idx..wr_idx + first].copy_from_slice(&data[..first]);
            if to_write > first {
                buf[..to_write - first].copy_from_slice(&data[first..to_write]);
            }
        }

        self.write_pos.store(wr + to_write as u64, Ordering::Release);
        to_write
    }

    /// Consumer side. Reads up to `out.len()` samples, returns the number
    /// actually read.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let rd = self.read_pos.load(Ordering::Relaxed);
        let wr = self.write_pos.load(Ordering::Acquire);

        let available = wr - rd;
        let to_read = (out.len() as u64).min(available) as usize;
        if to_read == 0 {
            return 0;
        }

        let rd_idx = (rd % self.capacity) as usize;
        let first = to_read.min(self.capacity as usize - rd_idx);

        // SAFETY: only the consumer reads [rd, rd+to_read); the producer
        // cannot overwrite it until the release store below frees it.
        unsafe {
            let buf = &*self.buf.get();
            out[..first].copy_from_slice(&buf[rd_idx..rd_idx + first]);
            if to_read > first {
                out[first..to_read].copy_from_slice(&buf[..to_read - first]);
            }
        }

        self.read_pos.store(rd + to_read as u64, Ordering::Release);
        to_read
    }

    /// Samples currently available to the consumer.
    pub fn available(&self) -> usize {
        let wr = self.write_pos.load(Ordering::Acquire);
        let rd = self.read_pos.load(Ordering::Relaxed);
        (wr - rd) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Reset both positions. Not safe while either side is active.
    pub fn reset(&self) {
        self.write_pos.store(0, Ordering::Relaxed);
        self.read_pos.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_then_read_in_order() {
        let rb = RingBuffer::new(64);
        let input: Vec<f32> = (0..48).map(|i| i as f32).collect();
        assert_eq!(rb.write(&input), 48);
        assert_eq!(rb.available(), 48);

        let mut out = vec![0.0; 48];
        assert_eq!(rb.read(&mut out), 48);
        assert_eq!(out, input);
        assert_eq!(rb.available(), 0);
    }

    #[test]
    fn test_capacity_bound() {
        let rb = RingBuffer::new(8);
        let input = [1.0f32; 12];
        assert_eq!(rb.write(&input), 8);
        assert_eq!(rb.write(&input), 0);
    }

    #[test]
    fn test_wraparound_scenario() {
        // capacity 4: write [1,2,3], read 2 -> [1,2];
        // write [4,5] succeeds (2 written); read 3 -> [3,4,5]
        let rb = RingBuffer::new(4);
        assert_eq!(rb.write(&[1.0, 2.0, 3.0]), 3);

        let mut out = [0.0; 2];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);

        assert_eq!(rb.write(&[4.0, 5.0]), 2);

        let mut rest = [0.0; 3];
        assert_eq!(rb.read(&mut rest), 3);
        assert_eq!(rest, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_partial_read() {
        let rb = RingBuffer::new(16);
        rb.write(&[1.0, 2.0]);
        let mut out = [0.0; 8];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(&out[..2], &[1.0, 2.0]);
    }

    #[test]
    fn test_reset() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0; 5]);
        rb.reset();
        assert_eq!(rb.available(), 0);
        assert_eq!(rb.write(&[2.0; 8]), 8);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let rb = Arc::new(RingBuffer::new(1024));
        let producer = Arc::clone(&rb);

        const TOTAL: usize = 100_000;
        let handle = std::thread::spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                let chunk: Vec<f32> = (sent..(sent + 64).min(TOTAL)).map(|i| i as f32).collect();
                let n = producer.write(&chunk);
                sent += n;
                if n == 0 {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(TOTAL);
        let mut out = [0.0f32; 256];
        while received.len() < TOTAL {
            let n = rb.read(&mut out);
            received.extend_from_slice(&out[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        handle.join().unwrap();

        for (i, v) in received.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
    }
}
