use clap::Args;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[derive(Args)]
pub struct OutputArgs {
    /// Increase verbosity. (Can be repeated.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Reduce verbosity. (Can be repeated.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,
}

pub fn init(args: &OutputArgs) {
    let verbosity = i16::from(args.verbose) - i16::from(args.quiet);
    let default_level = match verbosity {
        2.. => LevelFilter::TRACE,
        1 => LevelFilter::DEBUG,
        0 => LevelFilter::INFO,
        -1 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    };

    // logs go to stderr; stdout carries object bytes
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("BLOBSEEK_LOG")
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
