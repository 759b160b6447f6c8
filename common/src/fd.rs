//! Owned file descriptors with typed syscall errors.
//!
//! Every syscall wrapper retries transient failures (EINTR, and EAGAIN
//! where applicable) internally; descriptors managed here operate in
//! blocking mode, so callers never observe partial progress from those
//! conditions.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, SpliceFFlags};
use nix::sys::stat::{Mode, SFlag};

/// Error type for descriptor and transfer operations.
///
/// The taxonomy is deliberately narrow - callers react differently to
/// each kind: `BrokenPipe` means graceful shutdown, `SpliceUnsupported`
/// triggers the buffered fallback, `Open` is tolerated per-source, and
/// everything else is fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arbitrary syscall failure.
    #[error("{0}")]
    Io(#[from] Errno),
    /// Failed to open a named source.
    #[error("{}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Errno,
    },
    /// The write-side peer closed its read end.
    #[error("broken pipe")]
    BrokenPipe,
    /// The kernel rejected splice for this descriptor pair.
    #[error("splice not supported by this descriptor pair: {0}")]
    SpliceUnsupported(Errno),
    /// A record read hit end-of-stream in the middle of a record.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
}

pub type Result<T> = std::result::Result<T, Error>;

/// An open file descriptor with single-owner close semantics.
///
/// At most one live `Fd` owns the underlying descriptor and closes it
/// exactly once, on drop. Instances wrapping inherited standard streams
/// are non-owning and never close. Ownership moves with the value;
/// there is no `Clone`.
#[derive(Debug)]
pub struct Fd {
    raw: RawFd,
    owned: bool,
}

impl Fd {
    /// The process's inherited standard input, non-owning.
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            raw: libc::STDIN_FILENO,
            owned: false,
        }
    }

    /// The process's inherited standard output, non-owning.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            raw: libc::STDOUT_FILENO,
            owned: false,
        }
    }

    /// The process's inherited standard error, non-owning.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            raw: libc::STDERR_FILENO,
            owned: false,
        }
    }

    /// Open `path` with the given flags; the result owns the descriptor.
    pub fn open(path: &Path, flags: OFlag) -> Result<Self> {
        loop {
            match nix::fcntl::open(path, flags, Mode::empty()) {
                Ok(fd) => return Ok(fd.into()),
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(Error::Open {
                        path: path.to_path_buf(),
                        source: errno,
                    });
                }
            }
        }
    }

    /// Create a connected (read, write) pipe pair, both ends owning.
    pub fn pipe() -> Result<(Self, Self)> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        Ok((read.into(), write.into()))
    }

    /// Read as much as one kernel read yields into `buf`.
    ///
    /// Returns 0 at end of stream.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match nix::unistd::read(self, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EAGAIN | Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    /// Read whole records of `record_size` bytes into `buf`.
    ///
    /// Loops until the bytes read so far land on a record boundary,
    /// returning the number of complete records. A clean end of stream
    /// on a boundary is fine; end of stream mid-record is an error.
    pub fn read_records(&self, buf: &mut [u8], record_size: usize) -> Result<usize> {
        debug_assert!(record_size > 0 && buf.len() % record_size == 0);
        let mut filled = 0;
        loop {
            let n = self.read(&mut buf[filled..])?;
            filled += n;
            if filled % record_size == 0 {
                return Ok(filled / record_size);
            }
            if n == 0 {
                return Err(Error::UnexpectedEndOfStream);
            }
        }
    }

    /// Write the entire buffer, looping over partial writes.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match nix::unistd::write(self, buf) {
                Ok(n) => buf = &buf[n..],
                Err(Errno::EAGAIN | Errno::EINTR) => continue,
                Err(Errno::EPIPE) => return Err(Error::BrokenPipe),
                Err(errno) => return Err(errno.into()),
            }
        }
        Ok(())
    }

    /// Toggle O_NONBLOCK on the descriptor.
    pub fn set_nonblocking(&self, enable: bool) -> Result<()> {
        let bits = self.fcntl(|| FcntlArg::F_GETFL)?;
        let mut flags = OFlag::from_bits_retain(bits);
        flags.set(OFlag::O_NONBLOCK, enable);
        self.fcntl(|| FcntlArg::F_SETFL(flags))?;
        Ok(())
    }

    /// Current kernel buffer capacity of a pipe descriptor.
    pub fn pipe_capacity(&self) -> Result<usize> {
        let size = self.fcntl(|| FcntlArg::F_GETPIPE_SZ)?;
        Ok(size as usize)
    }

    /// Resize the kernel buffer of a pipe descriptor.
    pub fn set_pipe_capacity(&self, capacity: usize) -> Result<()> {
        self.fcntl(|| FcntlArg::F_SETPIPE_SZ(capacity as libc::c_int))?;
        Ok(())
    }

    /// Whether this descriptor refers to a pipe (FIFO).
    pub fn is_pipe(&self) -> Result<bool> {
        Ok(self.stat_file_type()? == SFlag::S_IFIFO)
    }

    /// Best-effort growth of a pipe's kernel buffer up to `max` bytes.
    ///
    /// Returns the capacity that was set, or `None` when the descriptor
    /// is not a pipe, its capacity cannot be queried, or no size larger
    /// than the current capacity could be set. On each rejection (e.g.
    /// a system-imposed ceiling) the requested size is halved and
    /// retried while it still exceeds the current capacity. Pure
    /// tuning; never fails.
    pub fn try_extend_pipe_capacity(&self, max: usize) -> Option<usize> {
        let current = match self.is_pipe() {
            Ok(true) => self.pipe_capacity().ok()?,
            _ => return None,
        };
        let mut size = max;
        while size > current {
            if self.set_pipe_capacity(size).is_ok() {
                return Some(size);
            }
            size /= 2;
        }
        None
    }

    /// Whether splice can be attempted between `self` and `out`.
    ///
    /// The kernel requires at least one pipe endpoint.
    pub fn can_splice(&self, out: &Fd) -> Result<bool> {
        Ok(self.is_pipe()? || out.is_pipe()?)
    }

    /// Move up to `len` bytes from `self` to `out` inside the kernel.
    ///
    /// Returns 0 at end of stream. EINVAL maps to `SpliceUnsupported`
    /// so the caller can fall back to a buffered copy.
    pub fn splice_to(&self, out: &Fd, len: usize, flags: SpliceFFlags) -> Result<usize> {
        loop {
            match nix::fcntl::splice(self, None, out, None, len, flags) {
                Ok(n) => return Ok(n),
                Err(Errno::EAGAIN | Errno::EINTR) => continue,
                Err(Errno::EPIPE) => return Err(Error::BrokenPipe),
                Err(errno @ Errno::EINVAL) => return Err(Error::SpliceUnsupported(errno)),
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    fn fcntl<'a>(&self, arg: impl Fn() -> FcntlArg<'a>) -> Result<libc::c_int> {
        loop {
            match nix::fcntl::fcntl(self, arg()) {
                Ok(ret) => return Ok(ret),
                Err(Errno::EAGAIN | Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    fn stat_file_type(&self) -> Result<SFlag> {
        let st = nix::sys::stat::fstat(self)?;
        Ok(SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT)
    }
}

impl From<OwnedFd> for Fd {
    fn from(fd: OwnedFd) -> Self {
        Self {
            raw: fd.into_raw_fd(),
            owned: true,
        }
    }
}

impl AsFd for Fd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // raw stays open for as long as self is alive
        unsafe { BorrowedFd::borrow_raw(self.raw) }
    }
}

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.raw
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.owned {
            if let Err(errno) = nix::unistd::close(self.raw) {
                tracing::debug!("failed to close descriptor {}: {}", self.raw, errno);
            }
        }
    }
}
