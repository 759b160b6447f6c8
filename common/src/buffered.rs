//! User-space buffered copy between two descriptors.

use crate::fd::{Fd, Result};

/// Copies bytes through a fixed intermediate buffer with blocking
/// read/write. Used whenever zero-copy splicing is unavailable;
/// intentionally simple, no overlap between the read and the write.
#[derive(Debug)]
pub struct BufferedEngine {
    buf: Vec<u8>,
}

impl BufferedEngine {
    /// Allocate the transfer buffer once, `buf_size` bytes.
    #[must_use]
    pub fn new(buf_size: usize) -> Self {
        Self {
            buf: vec![0u8; buf_size],
        }
    }

    /// Copy `src` to `dst` until end of stream, reporting each chunk.
    pub fn transfer(
        &mut self,
        src: &Fd,
        dst: &Fd,
        mut on_chunk: impl FnMut(u64),
    ) -> Result<()> {
        loop {
            let n = src.read(&mut self.buf)?;
            if n == 0 {
                return Ok(());
            }
            dst.write_all(&self.buf[..n])?;
            on_chunk(n as u64);
        }
    }
}
