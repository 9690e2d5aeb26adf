#![forbid(unsafe_code)]

mod output;

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use eyre::WrapErr;

use blobseek::{Fadvise, HttpTransport, ObjectHandle, ReadChannel, ReadOptions};

/// Stream a byte range of a remote object to stdout.
#[derive(Parser)]
#[command(name = "blobseek", version)]
struct Cli {
    #[command(flatten)]
    output: output::OutputArgs,
    /// Base URL of the blob service's JSON API.
    #[arg(long)]
    base_url: url::Url,
    /// Object to read, as gs://bucket/object or bucket/object.
    object: ObjectHandle,
    /// First byte to read.
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Number of bytes to read (to the end of the object when absent).
    #[arg(long)]
    length: Option<u64>,
    /// Pin a specific object generation.
    #[arg(long)]
    generation: Option<u64>,
    /// Expected access pattern.
    #[arg(long, value_enum, default_value_t = FadviseArg::Sequential)]
    fadvise: FadviseArg,
    /// Allow (sequential-only) reads of gzip-encoded objects.
    #[arg(long)]
    allow_gzip: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FadviseArg {
    Sequential,
    Random,
    Auto,
}

impl From<FadviseArg> for Fadvise {
    fn from(arg: FadviseArg) -> Fadvise {
        match arg {
            FadviseArg::Sequential => Fadvise::Sequential,
            FadviseArg::Random => Fadvise::Random,
            FadviseArg::Auto => Fadvise::Auto,
        }
    }
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    output::init(&cli.output);

    let mut handle = cli.object.clone();
    if let Some(generation) = cli.generation {
        handle = handle.with_generation(generation);
    }
    let options = ReadOptions::default()
        .with_fadvise(cli.fadvise.into())
        .with_fail_on_gzip(!cli.allow_gzip);
    let transport = Arc::new(HttpTransport::new(cli.base_url.clone()));
    let mut channel = ReadChannel::open(transport, handle, options)
        .wrap_err("opening read channel")?;
    channel.seek(cli.offset)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut remaining = cli.length;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let want = match remaining {
            Some(0) => break,
            Some(n) => n.min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        let n = channel.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        if let Some(left) = remaining.as_mut() {
            *left -= n as u64;
        }
    }
    channel.close()?;
    Ok(())
}
