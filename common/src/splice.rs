//! Zero-copy transfer via the kernel splice facility.

use nix::fcntl::SpliceFFlags;

use crate::fd::{Fd, Result};

/// Moves bytes between descriptors inside the kernel, at most
/// `chunk_len` bytes per call. Requires at least one pipe endpoint;
/// when the kernel rejects the pair the `SpliceUnsupported` error
/// propagates unchanged - falling back is the caller's decision.
#[derive(Debug)]
pub struct SpliceEngine {
    chunk_len: usize,
}

impl SpliceEngine {
    #[must_use]
    pub fn new(chunk_len: usize) -> Self {
        Self { chunk_len }
    }

    /// Splice `src` to `dst` until end of stream, reporting each chunk.
    pub fn transfer(&self, src: &Fd, dst: &Fd, mut on_chunk: impl FnMut(u64)) -> Result<()> {
        let flags = SpliceFFlags::SPLICE_F_MOVE | SpliceFFlags::SPLICE_F_MORE;
        loop {
            let n = src.splice_to(dst, self.chunk_len, flags)?;
            if n == 0 {
                return Ok(());
            }
            on_chunk(n as u64);
        }
    }
}
