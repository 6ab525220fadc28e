//! Prepare a dark current ramp for a requested exposure.
//!
//! ```bash
//! cargo run --release --bin dark_prep -- params.yaml
//! RUST_LOG=debug cargo run --release --bin dark_prep -- params.yaml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dark_prep::{DarkPrep, ParamFile};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reshape a dark current exposure to a requested readout")]
struct Args {
    /// YAML parameter file
    paramfile: PathBuf,

    /// Log at info level when RUST_LOG is not set
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let params = ParamFile::load(&args.paramfile)
        .with_context(|| format!("reading {}", args.paramfile.display()))?;
    let config = params.resolve().context("invalid parameter file")?;
    let bundle = config.bundle_path();

    let prep = DarkPrep::new(config)?;
    let prepared = prep.prepare().map_err(|e| {
        log::error!("{:?} error: {e}", e.category());
        e
    })?;

    println!(
        "Prepared {} dark {:?} written to {}",
        prepared.header.readpatt,
        prepared.data.shape(),
        bundle.display()
    );
    Ok(())
}
