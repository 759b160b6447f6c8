//! Transfer orchestration: engine selection and the splice-to-buffered
//! fallback.

use std::path::Path;
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::sys::signal::{SigHandler, Signal};

use crate::buffered::BufferedEngine;
use crate::fd::{Error, Fd, Result};
use crate::speedometer::Speedometer;
use crate::splice::SpliceEngine;

/// Default transfer granularity: pipe capacity, copy buffer size and
/// splice chunk length.
pub const DEFAULT_PIPE_CAPACITY: usize = 1024 * 1024;

const SPLICE_REMARK: &str = "<splice>";
const BUFFERED_REMARK: &str = "<buffered>";

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Pipe capacity to negotiate on both endpoints (best effort).
    pub pipe_capacity: usize,
    /// Delay between progress reports.
    pub interval: Duration,
    /// Suppress progress reporting entirely.
    pub quiet: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            interval: Duration::from_secs(1),
            quiet: false,
        }
    }
}

/// Ignore SIGPIPE process-wide so a closed peer surfaces as the typed
/// broken-pipe error instead of terminating the process.
pub fn ignore_sigpipe() -> Result<()> {
    unsafe { nix::sys::signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }?;
    Ok(())
}

/// One transfer session: a shared destination descriptor, the two
/// engines and the throughput meter, processing sources one at a time.
///
/// All three components share one tuned transfer granularity: the
/// destination's negotiated pipe capacity (or the configured default
/// when the destination is not a pipe or refuses to grow).
#[derive(Debug)]
pub struct Session {
    out: Fd,
    pipe_capacity: usize,
    buffered: BufferedEngine,
    splice: SpliceEngine,
    speed: Speedometer,
}

impl Session {
    #[must_use]
    pub fn new(out: Fd, settings: &Settings) -> Self {
        let chunk_len = out
            .try_extend_pipe_capacity(settings.pipe_capacity)
            .unwrap_or(settings.pipe_capacity);
        tracing::debug!(
            "transfer granularity: {}",
            bytesize::ByteSize(chunk_len as u64)
        );
        let mut speed = Speedometer::new();
        speed.set_interval(settings.interval);
        speed.set_quiet(settings.quiet);
        Self {
            out,
            pipe_capacity: settings.pipe_capacity,
            buffered: BufferedEngine::new(chunk_len),
            splice: SpliceEngine::new(chunk_len),
            speed,
        }
    }

    /// Copy one source to the session destination.
    ///
    /// Attempts the splice engine whenever either endpoint is a pipe;
    /// only the splice-inapplicable error triggers the buffered
    /// fallback, every other failure propagates unchanged.
    pub fn transfer(&mut self, src: &Fd) -> Result<()> {
        let _ = src.try_extend_pipe_capacity(self.pipe_capacity);
        if src.can_splice(&self.out)? {
            self.speed.set_remark(SPLICE_REMARK);
            match self.splice.transfer(src, &self.out, |n| self.speed.measure(n)) {
                Err(Error::SpliceUnsupported(errno)) => {
                    // e.g. a character device source such as /dev/zero
                    tracing::debug!("splice rejected ({}), using buffered copy", errno);
                }
                other => return other,
            }
        }
        self.speed.set_remark(BUFFERED_REMARK);
        self.buffered
            .transfer(src, &self.out, |n| self.speed.measure(n))
    }

    /// Open a named source read-only and copy it to the destination.
    pub fn transfer_path(&mut self, path: &Path) -> Result<()> {
        let src = Fd::open(path, OFlag::O_RDONLY)?;
        self.transfer(&src)
    }

    /// Cumulative bytes transferred this session.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.speed.total_bytes()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn quiet_settings() -> Settings {
        Settings {
            pipe_capacity: 64 * 1024,
            interval: Duration::from_secs(1),
            quiet: true,
        }
    }

    fn temp_file_with(content: &[u8]) -> Result<tempfile::NamedTempFile> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), content)?;
        Ok(file)
    }

    fn open_for_writing(path: &Path) -> Result<Fd> {
        Ok(Fd::open(path, OFlag::O_WRONLY)?)
    }

    #[test]
    fn file_to_file_uses_buffered_copy() -> Result<()> {
        let content: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
        let src = temp_file_with(&content)?;
        let dst = tempfile::NamedTempFile::new()?;

        let mut session = Session::new(open_for_writing(dst.path())?, &quiet_settings());
        session.transfer_path(src.path())?;

        assert_eq!(std::fs::read(dst.path())?, content);
        assert_eq!(session.bytes_transferred(), content.len() as u64);
        Ok(())
    }

    #[test]
    fn pipe_source_goes_through_splice() -> Result<()> {
        let (read, write) = Fd::pipe()?;
        write.write_all(b"zero copy payload")?;
        drop(write);

        let dst = tempfile::NamedTempFile::new()?;
        let mut session = Session::new(open_for_writing(dst.path())?, &quiet_settings());
        session.transfer(&read)?;

        assert_eq!(std::fs::read(dst.path())?, b"zero copy payload");
        assert_eq!(session.bytes_transferred(), 17);
        Ok(())
    }

    #[test]
    fn char_device_source_still_completes() -> Result<()> {
        // /dev/null is spliceable on some kernels and rejected with
        // EINVAL on others; either way the session must finish cleanly
        // with zero bytes
        let src = Fd::open(Path::new("/dev/null"), OFlag::O_RDONLY)?;
        let (read, write) = Fd::pipe()?;

        let mut session = Session::new(write, &quiet_settings());
        session.transfer(&src)?;
        assert_eq!(session.bytes_transferred(), 0);
        drop(session);

        let mut buf = [0u8; 1];
        assert_eq!(read.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn empty_source_measures_nothing() -> Result<()> {
        let src = temp_file_with(b"")?;
        let dst = tempfile::NamedTempFile::new()?;

        let mut session = Session::new(open_for_writing(dst.path())?, &quiet_settings());
        session.transfer_path(src.path())?;
        assert_eq!(session.bytes_transferred(), 0);
        Ok(())
    }

    #[test]
    fn missing_source_is_an_open_error() -> Result<()> {
        let dst = tempfile::NamedTempFile::new()?;
        let mut session = Session::new(open_for_writing(dst.path())?, &quiet_settings());

        let path = Path::new("/no/such/source");
        match session.transfer_path(path) {
            Err(Error::Open { path: p, .. }) => {
                assert_eq!(p, path);
                Ok(())
            }
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[test]
    fn closed_destination_is_a_broken_pipe() -> Result<()> {
        let content = vec![0u8; 256 * 1024];
        let src = temp_file_with(&content)?;

        let (read, write) = Fd::pipe()?;
        drop(read);

        let mut session = Session::new(write, &quiet_settings());
        match session.transfer_path(src.path()) {
            Err(Error::BrokenPipe) => Ok(()),
            other => panic!("expected broken pipe, got {other:?}"),
        }
    }
}
