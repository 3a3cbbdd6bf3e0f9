//! # rx-demo
//!
//! Feeds a list of numbers through one `lib_rx` pipeline and prints what comes
//! out, as JSON. Handy for watching pacing, throttle and debounce behave with
//! real timers.

mod logger;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum, ValueHint};
use lib_rx::{
    compute_with_previous_with, debounce, merge_flat, resolve_source, throttle, to_array, transform_with, RxConfig,
    Stream, ToArrayOptions,
};
use tokio::task::LocalSet;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Op {
    /// Multiply every value by two.
    Double,
    /// Forward at most one value per window.
    Throttle,
    /// Forward the last value of every burst.
    Debounce,
    /// Running sum.
    Running,
    /// Merge the values with a reversed copy of themselves.
    Merge,
}

/// CLI arguments for rx-demo.
#[derive(Parser)]
#[clap(
    name = "rx-demo",
    version = "1.0.0",
    author = "ckir",
    about = "Runs numbers through a reactive pipeline.",
    long_about = "Resolves the given numbers into a paced stream, applies one operator and prints \
                  the collected output as JSON. Engine defaults come from the file named by \
                  RX_CONFIG_FILE, or from --config."
)]
pub struct Cli {
    /// Values to feed, in order.
    #[clap(value_parser, num_args = 1.., required = true)]
    pub values: Vec<i64>,

    /// Operator applied to the stream.
    #[clap(long, short = 'o', value_enum, default_value = "double")]
    pub op: Op,

    /// Pacing between two source values, in milliseconds.
    #[clap(long, short = 'p')]
    pub pacing_ms: Option<u64>,

    /// Window for throttle and debounce, in milliseconds.
    #[clap(long, short = 'e')]
    pub elapsed_ms: Option<u64>,

    /// JSON configuration file.
    #[clap(long, short = 'c', value_hint = ValueHint::FilePath, env = "RX_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error or off.
    #[clap(long, default_value = "info")]
    pub log_level: String,

    /// Directory for log files. Console only when absent.
    #[clap(long, value_hint = ValueHint::DirPath)]
    pub log_dir: Option<PathBuf>,
}

fn build(op: Op, values: Vec<i64>, config: &RxConfig) -> Result<Stream<i64>> {
    let resolve = config.resolve_options();
    let source = resolve_source(values.clone(), &resolve)?;

    let out = match op {
        Op::Double => transform_with(source, config.upstream_options(), |v: i64| v * 2)?,
        Op::Throttle => throttle(source, config.throttle_options())?,
        Op::Debounce => debounce(source, config.debounce_options())?,
        Op::Running => compute_with_previous_with(source, config.upstream_options(), |prev: &i64, cur: &i64| prev + cur)?,
        Op::Merge => {
            let reversed: Vec<i64> = values.into_iter().rev().collect();
            let mirror = resolve_source(reversed, &resolve)?;
            merge_flat(vec![source, mirror], config.merge_flat_options())?
        }
    };
    Ok(out)
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RxConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => RxConfig::default(),
    };
    if let Some(pacing) = args.pacing_ms {
        config.pacing_ms = pacing;
    }
    if let Some(elapsed) = args.elapsed_ms {
        config.throttle_ms = elapsed;
        config.debounce_ms = elapsed;
    }
    log::debug!("{}", config);

    let count = args.values.len();
    let out = build(args.op, args.values, &config)?;
    log::info!("Running {:?} over {} values", args.op, count);

    // Generous bound: every value paced, plus one window for trailing emissions.
    let budget = Duration::from_millis(config.pacing_ms * (count as u64 + 2) + config.throttle_ms.max(config.debounce_ms) * 2);
    let collected = to_array(
        out,
        ToArrayOptions {
            limit: None,
            max_wait: Some(budget + Duration::from_secs(1)),
        },
    )
    .await?;

    println!("{}", serde_json::to_string(&collected)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    logger::setup_logging(args.log_dir.as_deref(), &args.log_level)?;

    LocalSet::new().run_until(run(args)).await
}
