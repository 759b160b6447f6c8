use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rpv",
    version,
    about = "Copy stdin or files to stdout while measuring throughput",
    long_about = "`rpv` copies bytes from standard input or from named files to standard
output, showing a continuously updated throughput line on standard error.
Whenever either endpoint is a pipe the data is moved inside the kernel
(zero-copy splice); otherwise, or when the kernel rejects the pair, a
buffered copy is used.

EXIT CODES:
    0 - Normal completion, including the output peer closing early
    1 - Any other error

EXAMPLES:
    # Watch the throughput of a pipeline
    dd if=/dev/zero bs=1M count=1024 | rpv > /dev/null

    # Concatenate files to stdout with a faster progress update
    rpv --interval 200ms first.bin second.bin > combined.bin

    # Mix files and standard input; \"-\" reads stdin
    tar c . | rpv archive-header.bin - > archive.bin"
)]
struct Args {
    // Progress & output
    /// Delay between progress line updates
    ///
    /// Accepts a human readable duration, e.g. "200ms", "1s", "5min".
    #[arg(
        long,
        default_value = "1s",
        value_name = "DELAY",
        help_heading = "Progress & output"
    )]
    interval: String,

    /// Quiet mode, don't show the progress line
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    // Performance & tuning
    /// Pipe capacity to negotiate on both transfer endpoints
    ///
    /// Best effort; the negotiated value also sizes the copy buffer and
    /// the splice chunk length.
    #[arg(
        long,
        default_value = "1MiB",
        value_name = "SIZE",
        help_heading = "Performance & tuning"
    )]
    pipe_size: bytesize::ByteSize,

    // ARGUMENTS
    /// Source file path(s); "-" means standard input
    ///
    /// With no paths given, standard input is copied.
    #[arg()]
    paths: Vec<String>,
}

fn run(args: &Args) -> Result<()> {
    let interval = humantime::parse_duration(&args.interval)
        .with_context(|| format!("invalid --interval value {:?}", args.interval))?;
    common::transfer::ignore_sigpipe()?;
    let settings = common::Settings {
        pipe_capacity: args.pipe_size.as_u64() as usize,
        interval,
        quiet: args.quiet,
    };
    let mut session = common::Session::new(common::Fd::stdout(), &settings);
    if args.paths.is_empty() {
        session.transfer(&common::Fd::stdin())?;
        return Ok(());
    }
    for path in &args.paths {
        if path == "-" {
            session.transfer(&common::Fd::stdin())?;
            continue;
        }
        match session.transfer_path(std::path::Path::new(path)) {
            Ok(()) => {}
            // an unopenable source is reported but doesn't abort the rest
            Err(error @ common::Error::Open { .. }) => {
                tracing::error!("{:#}", &error);
                eprintln!("rpv: {error}");
            }
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    common::init_tracing(args.verbose);
    match run(&args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            // the reader going away is graceful early termination
            if matches!(
                error.downcast_ref::<common::Error>(),
                Some(common::Error::BrokenPipe)
            ) {
                tracing::debug!("output peer closed, stopping early");
                return std::process::ExitCode::SUCCESS;
            }
            eprintln!("rpv: {error:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
