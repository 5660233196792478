//! trustdrift replay tool
//!
//! Feeds a JSON Lines interaction log through the controller and prints one
//! status snapshot per line.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use trustdrift::registry::DEFAULT_SHARDS;
use trustdrift::replay::replay;
use trustdrift::{FrameworkConfig, SubjectRegistry};

/// Command-line options.
#[derive(Default)]
struct Options {
    /// JSON configuration file
    config: Option<PathBuf>,
    /// Input log; stdin when absent
    input: Option<PathBuf>,
    /// Append per-subject metrics
    metrics: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    opts.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--input" | "-i" => {
                if i + 1 < args.len() {
                    opts.input = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --input requires a value");
                    std::process::exit(1);
                }
            }
            "--metrics" | "-m" => {
                opts.metrics = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("trustdrift-replay - replay interaction logs through the trust-drift controller");
                println!();
                println!("USAGE:");
                println!("    trustdrift-replay [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <FILE>       JSON configuration [default: built-in]");
                println!("    -i, --input <FILE>        JSON Lines input [default: stdin]");
                println!("    -m, --metrics             Print per-subject metrics after the snapshots");
                println!("    -h, --help                Print help information");
                println!();
                println!("Log verbosity follows RUST_LOG (default: info), written to stderr.");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    opts
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = match &opts.config {
        Some(path) => FrameworkConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => FrameworkConfig::default(),
    };
    let registry = SubjectRegistry::new(config, DEFAULT_SHARDS)?;

    let stdout = io::stdout();
    let writer = BufWriter::new(stdout.lock());
    let summary = match &opts.input {
        Some(path) => replay(&registry, BufReader::new(File::open(path)?), writer, opts.metrics)?,
        None => replay(&registry, io::stdin().lock(), writer, opts.metrics)?,
    };

    if summary.records == 0 {
        eprintln!("warning: no records replayed");
    }
    Ok(())
}
