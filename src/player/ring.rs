//! Single-producer/single-consumer sample ring.
//!
//! Sits between the decode step (writer) and the output step (reader).
//! Capacity is a power of two so wrap-around is a mask; indices are free
//! running counters exchanged with acquire/release ordering. Partial
//! transfers are the normal path: callers loop or come back on the next
//! period.
//!
//! `clear` may only be called while both sides are quiesced (the output
//! thread performing a seek owns both ends at that point).

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free SPSC queue of interleaved `f32` samples.
pub struct Ring {
    buf: Box<[f32]>,
    mask: usize,
    /// Total samples ever written (free running).
    write_pos: AtomicUsize,
    /// Total samples ever read (free running).
    read_pos: AtomicUsize,
}

impl Ring {
    /// Create a ring with at least `min_capacity` samples (rounded up to a
    /// power of two).
    pub fn with_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(2).next_power_of_two();
        Self {
            buf: vec![0.0; capacity].into_boxed_slice(),
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Samples ready for the reader.
    pub fn available(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Free room for the writer.
    pub fn space(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Write up to `src.len()` samples; returns how many were accepted.
    pub fn write(&mut self, src: &[f32]) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let n = src.len().min(self.space());
        if n == 0 {
            return 0;
        }

        let start = w & self.mask;
        let first = n.min(self.capacity() - start);
        self.buf[start..start + first].copy_from_slice(&src[..first]);
        if first < n {
            self.buf[..n - first].copy_from_slice(&src[first..n]);
        }

        self.write_pos.store(w.wrapping_add(n), Ordering::Release);
        n
    }

    /// Read up to `dst.len()` samples; returns how many were produced.
    pub fn read(&mut self, dst: &mut [f32]) -> usize {
        let r = self.read_pos.load(Ordering::Acquire);
        let n = dst.len().min(self.available());
        if n == 0 {
            return 0;
        }

        let start = r & self.mask;
        let first = n.min(self.capacity() - start);
        dst[..first].copy_from_slice(&self.buf[start..start + first]);
        if first < n {
            dst[first..n].copy_from_slice(&self.buf[..n - first]);
        }

        self.read_pos.store(r.wrapping_add(n), Ordering::Release);
        n
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        let w = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(w, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(Ring::with_capacity(1000).capacity(), 1024);
        assert_eq!(Ring::with_capacity(1024).capacity(), 1024);
        assert_eq!(Ring::with_capacity(1).capacity(), 2);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut ring = Ring::with_capacity(8);
        let data = [1.0, 2.0, 3.0];
        assert_eq!(ring.write(&data), 3);
        assert_eq!(ring.available(), 3);

        let mut out = [0.0; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, data);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_partial_write_when_full() {
        let mut ring = Ring::with_capacity(4);
        assert_eq!(ring.write(&[1.0; 6]), 4);
        assert_eq!(ring.space(), 0);
        assert_eq!(ring.write(&[2.0]), 0);
    }

    #[test]
    fn test_partial_read_when_short() {
        let mut ring = Ring::with_capacity(4);
        ring.write(&[1.0, 2.0]);
        let mut out = [0.0; 4];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(&out[..2], &[1.0, 2.0]);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let mut ring = Ring::with_capacity(4);
        ring.write(&[1.0, 2.0, 3.0]);
        let mut out = [0.0; 2];
        ring.read(&mut out);

        // Write spans the wrap point now.
        assert_eq!(ring.write(&[4.0, 5.0, 6.0]), 3);
        let mut rest = [0.0; 4];
        assert_eq!(ring.read(&mut rest), 4);
        assert_eq!(rest, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_clear_empties_ring() {
        let mut ring = Ring::with_capacity(8);
        ring.write(&[1.0; 5]);
        ring.clear();
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.space(), ring.capacity());
    }

    proptest! {
        /// available + space == capacity and 0 <= available <= capacity
        /// after every operation of an arbitrary write/read/clear sequence.
        #[test]
        fn prop_accounting_invariant(ops in proptest::collection::vec((0u8..3, 1usize..32), 1..64)) {
            let mut ring = Ring::with_capacity(16);
            let cap = ring.capacity();
            for (op, n) in ops {
                match op {
                    0 => { ring.write(&vec![0.5; n]); }
                    1 => { ring.read(&mut vec![0.0; n]); }
                    _ => ring.clear(),
                }
                prop_assert!(ring.available() <= cap);
                prop_assert_eq!(ring.available() + ring.space(), cap);
            }
        }

        /// Data read equals data written, in order, across wraps.
        #[test]
        fn prop_fifo_order(chunks in proptest::collection::vec(
            proptest::collection::vec(-1.0f32..1.0, 1..16), 1..16))
        {
            let mut ring = Ring::with_capacity(64);
            let mut expected = Vec::new();
            let mut got = Vec::new();

            for chunk in &chunks {
                let n = ring.write(chunk);
                expected.extend_from_slice(&chunk[..n]);

                let mut out = vec![0.0; 8];
                let r = ring.read(&mut out);
                got.extend_from_slice(&out[..r]);
            }

            let mut out = vec![0.0; 64];
            let r = ring.read(&mut out);
            got.extend_from_slice(&out[..r]);

            prop_assert_eq!(got, expected);
        }
    }
}
