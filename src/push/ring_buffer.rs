//! Byte ring for push-style sample delivery
//!
//! One producer (the application's frame loop) writes PCM bytes, one consumer
//! (the refill path) reads them. Memory use is fixed at the ring capacity.

use crate::{DspBufError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upper bound on ring capacity (16 MB)
const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Ring buffer of PCM bytes
///
/// # Thread Safety
/// - One producer thread, one consumer thread
/// - Storage is behind a `parking_lot::Mutex`, positions are atomics so
///   `available_read` never takes the lock
/// - One slot is always left empty to tell full from empty
#[derive(Debug)]
pub struct ByteRing {
    buffer: Mutex<Vec<u8>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    capacity: usize,
    mask: usize,
}

impl ByteRing {
    /// Create a ring; capacity is rounded up to the next power of 2
    ///
    /// # Errors
    ///
    /// [`DspBufError::ConfigError`] if the capacity is 0 or above 16 MB.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(DspBufError::ConfigError(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();
        if capacity > MAX_CAPACITY {
            return Err(DspBufError::ConfigError(format!(
                "Ring buffer capacity {capacity} exceeds maximum size {MAX_CAPACITY}"
            )));
        }

        Ok(ByteRing {
            buffer: Mutex::new(vec![0; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Storage size in bytes (one less is usable)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting to be read
    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Bytes that can be written without overrunning
    pub fn available_write(&self) -> usize {
        self.capacity - 1 - self.available_read()
    }

    /// Write bytes (producer). Returns how many fit.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut buf = self.buffer.lock();

        // Space is computed under the lock so a concurrent flush cannot skew it
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = self.capacity - 1 - write_pos.wrapping_sub(read_pos);

        let to_write = data.len().min(available);
        if to_write == 0 {
            return 0;
        }

        let idx = write_pos & self.mask;
        let first = to_write.min(self.capacity - idx);
        buf[idx..idx + first].copy_from_slice(&data[..first]);
        buf[..to_write - first].copy_from_slice(&data[first..to_write]);
        drop(buf);

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read bytes (consumer). Returns how many were available.
    pub fn read(&self, dest: &mut [u8]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = write_pos.wrapping_sub(read_pos);

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let idx = read_pos & self.mask;
        let first = to_read.min(self.capacity - idx);
        dest[..first].copy_from_slice(&buf[idx..idx + first]);
        dest[first..to_read].copy_from_slice(&buf[..to_read - first]);
        drop(buf);

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Discard everything not yet read
    pub fn flush(&self) {
        let _guard = self.buffer.lock();
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_power_of_two() {
        let ring = ByteRing::new(1000).unwrap();
        assert_eq!(ring.capacity(), 1024);
        assert_eq!(ring.available_write(), 1023);
    }

    #[test]
    fn test_write_and_read() {
        let ring = ByteRing::new(16).unwrap();
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.available_read(), 4);

        let mut dest = [0u8; 8];
        assert_eq!(ring.read(&mut dest), 4);
        assert_eq!(&dest[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let ring = ByteRing::new(16).unwrap();
        ring.write(&[1; 10]);
        let mut sink = [0u8; 10];
        ring.read(&mut sink);

        let data: Vec<u8> = (0..12).collect();
        assert_eq!(ring.write(&data), 12);
        let mut dest = [0u8; 12];
        assert_eq!(ring.read(&mut dest), 12);
        assert_eq!(dest.to_vec(), data);
    }

    #[test]
    fn test_full_ring_rejects_writes() {
        let ring = ByteRing::new(8).unwrap();
        assert_eq!(ring.write(&[0; 20]), 7);
        assert_eq!(ring.write(&[0; 1]), 0);
        assert_eq!(ring.available_read(), 7);
    }

    #[test]
    fn test_flush() {
        let ring = ByteRing::new(16).unwrap();
        ring.write(&[1; 8]);
        ring.flush();
        assert_eq!(ring.available_read(), 0);
    }

    #[test]
    fn test_capacity_errors() {
        assert!(ByteRing::new(0).unwrap_err().to_string().contains("greater than 0"));
        assert!(ByteRing::new(MAX_CAPACITY + 1)
            .unwrap_err()
            .to_string()
            .contains("exceeds maximum"));
    }
}
