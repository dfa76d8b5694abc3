//! Bounded byte ring over encoded chunks
//!
//! Holds the most recent encoded output up to a byte capacity. Whole chunks
//! are evicted oldest-first on overflow, so the retained span is always a
//! contiguous suffix of the stream.

use std::collections::VecDeque;
use std::io::Write;

/// Fixed-capacity, continuously overwritten store of encoded chunks
pub struct RingBuffer {
    chunks: VecDeque<Vec<u8>>,
    capacity_bytes: usize,
    len_bytes: usize,
}

impl RingBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            capacity_bytes,
            len_bytes: 0,
        }
    }

    /// Append a chunk, evicting oldest chunks until it fits. A chunk larger
    /// than the whole capacity is kept alone; the retained span must always
    /// end at the newest write.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }

        while self.len_bytes + chunk.len() > self.capacity_bytes && !self.chunks.is_empty() {
            if let Some(evicted) = self.chunks.pop_front() {
                self.len_bytes -= evicted.len();
            }
        }

        self.len_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Write all retained chunks oldest to newest into `sink` and clear the
    /// ring. Returns the number of bytes written.
    pub fn drain_into<W: Write>(&mut self, sink: &mut W) -> std::io::Result<u64> {
        let mut written = 0u64;
        for chunk in self.chunks.drain(..) {
            sink.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        self.len_bytes = 0;
        Ok(written)
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len_bytes = 0;
    }
}

/// Buffer capacity for a pre-record window: `seconds * bitrate / 8` plus a
/// 20% margin against frame-timing jitter.
pub fn required_capacity(pre_record_seconds: u64, bitrate: u64) -> usize {
    let nominal = pre_record_seconds * bitrate / 8;
    (nominal as f64 * 1.2) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain_preserves_order() {
        let mut ring = RingBuffer::new(1024);
        ring.push(b"aaa".to_vec());
        ring.push(b"bbb".to_vec());
        ring.push(b"ccc".to_vec());

        let mut out = Vec::new();
        let written = ring.drain_into(&mut out).unwrap();

        assert_eq!(written, 9);
        assert_eq!(out, b"aaabbbccc");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut ring = RingBuffer::new(6);
        ring.push(b"aaa".to_vec());
        ring.push(b"bbb".to_vec());
        ring.push(b"ccc".to_vec());

        let mut out = Vec::new();
        ring.drain_into(&mut out).unwrap();

        // "aaa" was evicted to make room; the newest writes survive.
        assert_eq!(out, b"bbbccc");
    }

    #[test]
    fn test_oversize_chunk_kept_alone() {
        let mut ring = RingBuffer::new(4);
        ring.push(b"aa".to_vec());
        ring.push(b"bbbbbbbb".to_vec());

        assert_eq!(ring.len_bytes(), 8);
        let mut out = Vec::new();
        ring.drain_into(&mut out).unwrap();
        assert_eq!(out, b"bbbbbbbb");
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut ring = RingBuffer::new(16);
        ring.push(Vec::new());
        assert!(ring.is_empty());
        assert_eq!(ring.len_bytes(), 0);
    }

    #[test]
    fn test_required_capacity_includes_margin() {
        // 10s at 2 Mbps = 2.5 MB nominal, 3 MB with the 20% margin
        let capacity = required_capacity(10, 2_000_000);
        assert_eq!(capacity, 3_000_000);
    }
}
