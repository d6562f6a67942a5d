//! Levelbreak CLI: replay bars through the level / breakout / exit pipeline.
//!
//! Commands:
//! - `run` replays a CSV file or a synthetic series bar by bar with a paper gateway
//! - `levels` runs one detection pass and prints accepted and rejected levels
//! - `check-config` validates a TOML config, or prints the defaults

mod bars;
mod replay;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use levelbreak_core::domain::{Bar, Instrument, Timeframe};
use levelbreak_core::events::PipelineEvent;
use levelbreak_core::levels::{scan, DetectorParams};
use levelbreak_core::StrategyConfig;
use tracing_subscriber::EnvFilter;

use crate::replay::{replay, ReplaySummary};

#[derive(Parser)]
#[command(
    name = "levelbreak",
    about = "Key-level breakout pipeline: detection, confirmation, exit management"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay bars through the full pipeline with a paper gateway.
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Print the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run one level detection pass over the input and print the result.
    Levels {
        #[command(flatten)]
        input: InputArgs,

        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a TOML config file; without a path, print the defaults.
    CheckConfig {
        /// Path to a TOML config file.
        path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// CSV file with `timestamp,open,high,low,close,volume` rows.
    #[arg(long, conflicts_with = "synthetic")]
    csv: Option<PathBuf>,

    /// Generate this many synthetic bars instead of reading a file.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Seed for synthetic bars. Defaults to a seed derived from the symbol.
    #[arg(long, requires = "synthetic")]
    seed: Option<u64>,

    /// First price of the synthetic series.
    #[arg(long, default_value_t = 1.1)]
    start_price: f64,

    #[arg(long, default_value = "EURUSD")]
    symbol: String,

    /// M1, M5, M15, M30, H1, H4, D1 or W1.
    #[arg(long, default_value = "H1")]
    timeframe: Timeframe,

    /// Price distance of one pip.
    #[arg(long, default_value_t = 0.0001)]
    pip_size: f64,

    /// Smallest price increment.
    #[arg(long, default_value_t = 0.00001)]
    tick_size: f64,

    /// Path to a TOML strategy config. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl InputArgs {
    fn instrument(&self) -> Instrument {
        Instrument::new(self.symbol.clone(), self.tick_size, self.pip_size)
    }

    fn strategy_config(&self) -> Result<StrategyConfig> {
        match &self.config {
            Some(path) => Ok(StrategyConfig::from_file(path)?),
            None => Ok(StrategyConfig::default()),
        }
    }

    fn bars(&self) -> Result<Vec<Bar>> {
        let bars = match (&self.csv, self.synthetic) {
            (Some(path), _) => bars::load_csv(path)?,
            (None, Some(count)) => bars::synthetic_bars(
                &self.symbol,
                self.timeframe,
                count,
                self.start_price,
                self.seed,
            ),
            (None, None) => bail!("one of --csv or --synthetic is required"),
        };
        if bars.is_empty() {
            bail!("no bars to process");
        }
        Ok(bars)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "levelbreak=debug,levelbreak_core=debug"
    } else {
        "levelbreak=info,levelbreak_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { input, json } => run_replay(&input, json),
        Commands::Levels { input, json } => run_levels(&input, json),
        Commands::CheckConfig { path } => run_check_config(path.as_deref()),
    }
}

fn run_replay(input: &InputArgs, json: bool) -> Result<()> {
    let config = input.strategy_config()?;
    let bars = input.bars()?;
    let summary = replay(bars, input.instrument(), input.timeframe, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn run_levels(input: &InputArgs, json: bool) -> Result<()> {
    let config = input.strategy_config()?;
    config.validate()?;
    let bars = input.bars()?;
    let params = DetectorParams::resolve(&config, input.timeframe, &input.instrument());
    let detection = scan(&bars, &params);

    if json {
        let out = serde_json::json!({
            "symbol": input.symbol,
            "timeframe": input.timeframe,
            "reference_price": bars.last().map(|b| b.close),
            "levels": detection.levels,
            "rejections": detection
                .rejections
                .iter()
                .map(|r| serde_json::json!({
                    "price": r.price,
                    "reason": r.reason.as_str(),
                    "touch_count": r.touch_count,
                    "strength": r.strength,
                }))
                .collect::<Vec<_>>(),
            "insufficient_history": detection.insufficient_history,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("=== Key Levels: {} {} ===", input.symbol, input.timeframe);
    println!(
        "Window:     {} bars (touch zone {:.5}, min excursion {:.5})",
        bars.len().min(params.lookback),
        params.touch_zone,
        params.min_excursion()
    );
    if detection.insufficient_history {
        println!("Not enough history for a confirmed swing.");
        return Ok(());
    }
    println!();
    println!(
        "{:<11} {:>10} {:>8} {:>9}  {:<17} {:<17}",
        "Role", "Price", "Touches", "Strength", "First touch", "Last touch"
    );
    println!("{}", "-".repeat(78));
    for level in detection.levels.iter().rev() {
        println!(
            "{:<11} {:>10.5} {:>8} {:>9.3}  {:<17} {:<17}",
            level.role(),
            level.price,
            level.touch_count,
            level.strength,
            level.first_touch.format("%Y-%m-%d %H:%M"),
            level.last_touch.format("%Y-%m-%d %H:%M"),
        );
    }
    if !detection.rejections.is_empty() {
        println!();
        println!("Rejected candidates: {}", detection.rejections.len());
        for r in &detection.rejections {
            println!(
                "  {:>10.5}  {:<20} touches={}",
                r.price,
                r.reason.as_str(),
                r.touch_count
            );
        }
    }
    println!();
    Ok(())
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        print!("{}", toml::to_string_pretty(&StrategyConfig::default())?);
        return Ok(());
    };
    let config = StrategyConfig::from_file(path)
        .with_context(|| format!("checking {}", path.display()))?;
    println!("{}: OK (fingerprint {})", path.display(), config.fingerprint());
    for tf in Timeframe::ALL {
        let p = DetectorParams::resolve(&config, tf, &Instrument::forex("EURUSD"));
        println!(
            "  {:<4} lookback={:<4} touch_zone={:.5} min_excursion={:.5}",
            tf.as_str(),
            p.lookback,
            p.touch_zone,
            p.min_excursion()
        );
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    let report = &summary.report;
    println!();
    println!("=== Replay: {} ===", summary.key);
    println!("Config:         {}", report.fingerprint);
    println!("Bars:           {} ({} warmup)", summary.bars, summary.warmup);
    if let Some(price) = report.reference_price {
        println!("Last price:     {price:.5}");
    }
    println!();
    println!("--- Events ---");
    for timed in &summary.events {
        let line = match &timed.event {
            PipelineEvent::LevelsChanged { .. } => continue,
            PipelineEvent::BreakoutStarted {
                level,
                breakout_type,
                price,
            } => format!("{breakout_type} breakout of {level:.5} at {price:.5}"),
            PipelineEvent::BreakoutResolved {
                level,
                breakout_type,
                outcome,
                score,
            } => format!("{breakout_type} breakout of {level:.5} {outcome:?} (score {score:.2})"),
            PipelineEvent::PositionOpened {
                ticket,
                side,
                entry,
                stop,
                target,
                lots,
            } => format!(
                "opened #{ticket} {side} {lots} lots at {entry:.5} stop {stop:.5} target {target:.5}"
            ),
            PipelineEvent::StopModified { ticket, stop } => {
                format!("#{ticket} stop -> {stop:.5}")
            }
            PipelineEvent::PartialClose {
                ticket,
                volume_fraction,
                price,
            } => format!("#{ticket} closed {:.0}% at {price:.5}", volume_fraction * 100.0),
            PipelineEvent::PositionClosed {
                ticket,
                exit_type,
                price,
            } => format!("#{ticket} closed at {price:.5} ({exit_type})"),
        };
        println!("{}  {line}", timed.time.format("%Y-%m-%d %H:%M"));
    }

    let c = &report.confirmation_performance;
    let e = &report.exit_performance;
    let closed = summary.periods.iter();
    let started = c.started + closed.clone().map(|p| p.confirmations.started).sum::<usize>();
    let confirmed = c.confirmed + closed.clone().map(|p| p.confirmations.confirmed).sum::<usize>();
    let invalidated =
        c.invalidated + closed.clone().map(|p| p.confirmations.invalidated).sum::<usize>();
    let timed_out = c.timed_out + closed.clone().map(|p| p.confirmations.timed_out).sum::<usize>();
    let exits = e.closed() + closed.clone().map(|p| p.exits.closed()).sum::<usize>();
    let stop_moves =
        e.stop_modifications + closed.map(|p| p.exits.stop_modifications).sum::<usize>();
    println!();
    println!("--- Totals ---");
    println!(
        "Breakouts:      {started} started, {confirmed} confirmed, {invalidated} false, {timed_out} timed out"
    );
    println!("Exits:          {exits} closed, {stop_moves} stop modifications");
    println!();
    println!("--- Levels ---");
    for level in report.levels.iter().rev() {
        println!(
            "{:<11} {:>10.5}  touches={:<3} strength={:.3}",
            level.role(),
            level.price,
            level.touch_count,
            level.strength
        );
    }
    println!();
    println!("Periods closed: {}", summary.periods.len());
    println!("Realized P&L:   {:.5} (price units x lots)", summary.realized_pnl);
    println!("Resting fills:  {}", summary.resting_fills);
    println!("Open positions: {}", summary.open_positions);
    if !summary.errors.is_empty() {
        println!();
        println!("WARNING: {} recoverable error(s)", summary.errors.len());
        for err in summary.errors.iter().take(10) {
            println!("  {err}");
        }
    }
    println!();
}
