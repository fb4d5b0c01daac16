//! Byte-counting write adapter.
//!
//! Compressors report how many bytes they *consumed*, not how many they
//! produced.  [`CountingWriter`] sits between a compressor and the container
//! file, batches small writes into larger ones, and counts every byte it
//! accepts.  Accepted bytes are either written through or held in the batch
//! buffer until the next drain, so after [`CountingWriter::finish`] the count
//! equals the bytes the underlying writer received.  The appender reads the
//! final count to learn each block's compressed length.

use std::io::{self, Write};

/// Default batch capacity: 64 KiB.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

pub struct CountingWriter<W: Write> {
    inner:    W,
    buf:      Vec<u8>,
    capacity: usize,
    count:    u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    /// A `capacity` of zero disables batching.
    pub fn with_capacity(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Bytes accepted so far, including any still held in the batch buffer.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush the batch buffer and return the underlying writer with the
    /// final count.
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        self.flush()?;
        let count = self.count;
        Ok((self.inner, count))
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.buf.len() + buf.len() > self.capacity {
            self.drain()?;
        }
        if buf.len() >= self.capacity {
            self.inner.write_all(buf)?;
        } else {
            self.buf.extend_from_slice(buf);
        }
        self.count += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_preserves_order() {
        let mut out: Vec<u8> = Vec::new();
        let mut w = CountingWriter::with_capacity(&mut out, 8);
        w.write_all(b"hello").unwrap();
        w.write_all(b" world, this is long").unwrap();
        w.write_all(b"!").unwrap();
        assert_eq!(w.count(), 26);
        let (_, count) = w.finish().unwrap();
        assert_eq!(count, 26);
        assert_eq!(&out, b"hello world, this is long!");
    }

    #[test]
    fn count_includes_buffered_bytes_until_finish() {
        let mut out: Vec<u8> = Vec::new();
        let mut w = CountingWriter::with_capacity(&mut out, 64);
        w.write_all(b"held back").unwrap();
        assert_eq!(w.count(), 9);
        let (inner, count) = w.finish().unwrap();
        assert_eq!(count, inner.len() as u64);
    }

    #[test]
    fn zero_capacity_writes_through() {
        let mut out: Vec<u8> = Vec::new();
        let mut w = CountingWriter::with_capacity(&mut out, 0);
        w.write_all(b"abc").unwrap();
        assert_eq!(w.count(), 3);
        drop(w);
        assert_eq!(&out, b"abc");
    }

    #[test]
    fn nothing_written_counts_zero() {
        let mut out: Vec<u8> = Vec::new();
        let (_, count) = CountingWriter::new(&mut out).finish().unwrap();
        assert_eq!(count, 0);
        assert!(out.is_empty());
    }
}
