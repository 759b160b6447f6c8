//! Core of the `rpv` pipe viewer: owned descriptors, the buffered and
//! splice transfer engines, throughput metering and the per-session
//! orchestration tying them together.

pub mod buffered;
pub mod fd;
pub mod speedometer;
pub mod splice;
pub mod transfer;

pub use fd::{Error, Fd, Result};
pub use speedometer::Speedometer;
pub use transfer::{Session, Settings};

/// Initialize stderr logging from a `-v` occurrence count:
/// 0=ERROR, 1=INFO, 2=DEBUG, 3+=TRACE. `RUST_LOG` takes precedence.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
