//! Tradebot CLI: backtest and live paper-trading commands.
//!
//! Commands:
//! - `backtest`: replay synthetic or CSV prices through the bot
//! - `live`: run the polling loop against a random-walk paper feed
//! - `default-config`: print the default TOML configuration

use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tradebot_core::feed::SimulatedExecutor;
use tradebot_core::rng::RngHierarchy;
use tradebot_core::signals::Strategy;
use tradebot_runner::backtest::SIGNAL_STREAM;
use tradebot_runner::config::IntervalConfig;
use tradebot_runner::data_loader::SERIES_STREAM;
use tradebot_runner::{
    load_csv, save_artifacts, synthetic_series, BacktestResult, BacktestRunner, BotConfig,
    LiveLoopDriver, LiveOptions, LiveSnapshot, LiveSummary, RandomWalkSource, StopHandle,
};

#[derive(Parser)]
#[command(
    name = "tradebot",
    about = "Tradebot CLI: randomized-signal paper trading and backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by both run modes.
#[derive(clap::Args)]
struct Overrides {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy: momentum, breakout, mean_reversion.
    #[arg(long)]
    strategy: Option<String>,

    /// Stop-loss percentage (e.g. 5 for 5%).
    #[arg(long)]
    stop_loss: Option<f64>,

    /// Take-profit percentage (e.g. 10 for 10%).
    #[arg(long)]
    take_profit: Option<f64>,

    /// Master seed. Random when neither this nor the config sets one.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a price series through the bot and report metrics.
    Backtest {
        #[command(flatten)]
        overrides: Overrides,

        /// CSV file with timestamp,symbol,price rows. Synthetic data otherwise.
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Number of synthetic bars per symbol.
        #[arg(long)]
        periods: Option<usize>,

        /// Run symbols on the rayon pool.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Output directory for trades.csv and summary.json.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Skip writing artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,

        /// Print the full result as JSON instead of the text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the live polling loop against a random-walk paper feed.
    Live {
        #[command(flatten)]
        overrides: Overrides,

        /// Stop after this many ticks.
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Fixed seconds between ticks instead of the configured interval.
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Close every open position when the loop stops.
        #[arg(long, default_value_t = false)]
        liquidate_on_stop: bool,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            overrides,
            prices,
            periods,
            parallel,
            output_dir,
            no_save,
            json,
        } => run_backtest_cmd(overrides, prices, periods, parallel, output_dir, no_save, json),
        Commands::Live {
            overrides,
            max_ticks,
            interval_secs,
            liquidate_on_stop,
        } => run_live_cmd(overrides, max_ticks, interval_secs, liquidate_on_stop),
        Commands::DefaultConfig => {
            print!("{}", BotConfig::default().to_toml()?);
            Ok(())
        }
    }
}

/// Load the config (or defaults) and apply command-line overrides.
fn build_config(overrides: &Overrides) -> Result<BotConfig> {
    let mut config = match &overrides.config {
        Some(path) => BotConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BotConfig::default(),
    };
    if let Some(name) = &overrides.strategy {
        config.bot.strategy = name.parse::<Strategy>()?;
    }
    if let Some(sl) = overrides.stop_loss {
        config.risk.stop_loss_pct = sl;
    }
    if let Some(tp) = overrides.take_profit {
        config.risk.take_profit_pct = tp;
    }
    if overrides.seed.is_some() {
        config.bot.seed = overrides.seed;
    }
    config.validate()?;
    Ok(config)
}

fn master_seed(config: &BotConfig) -> u64 {
    config.bot.seed.unwrap_or_else(|| {
        let seed = rand::random();
        info!(seed, "no seed configured, drew one");
        seed
    })
}

#[allow(clippy::too_many_arguments)]
fn run_backtest_cmd(
    overrides: Overrides,
    prices: Option<PathBuf>,
    periods: Option<usize>,
    parallel: bool,
    output_dir: PathBuf,
    no_save: bool,
    json: bool,
) -> Result<()> {
    let mut config = build_config(&overrides)?;
    if parallel {
        config.backtest.parallel = true;
    }
    if let Some(n) = periods {
        config.backtest.periods = n;
        config.validate()?;
    }
    let seed = master_seed(&config);

    let series = match &prices {
        Some(path) => load_csv(path)?,
        None => synthetic_series(
            &config.symbols,
            config.backtest.periods,
            config.backtest.start_date,
            seed,
        )?,
    };

    let result = BacktestRunner::new(config)?.run_seeded(&series, seed)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result, prices.is_none());
    }

    if !no_save {
        let run_dir = save_artifacts(&result, &output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_live_cmd(
    overrides: Overrides,
    max_ticks: Option<u64>,
    interval_secs: Option<u64>,
    liquidate_on_stop: bool,
) -> Result<()> {
    let mut config = build_config(&overrides)?;
    if max_ticks.is_some() {
        config.live.max_ticks = max_ticks;
    }
    if let Some(secs) = interval_secs {
        config.live.interval = IntervalConfig::Fixed { secs };
    }
    if liquidate_on_stop {
        config.live.liquidate_on_stop = true;
    }
    let seed = master_seed(&config);
    let seeds = RngHierarchy::new(seed);

    let feed = RandomWalkSource::new(
        config
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), s.start_price)),
        Box::new(seeds.source_for("live-feed", SERIES_STREAM)),
    );
    let bot = config.build_bot(config.live_settings())?;
    let (tx, rx) = mpsc::channel();
    let driver = LiveLoopDriver::new(
        bot,
        Box::new(feed),
        Box::new(SimulatedExecutor::new()),
        Box::new(seeds.source_for("live-bot", SIGNAL_STREAM)),
        LiveOptions::from_config(&config),
    )
    .with_snapshots(tx);

    let (stop, handle) = driver.spawn().context("failed to spawn live loop thread")?;
    watch_stdin(stop).context("failed to spawn stdin watcher")?;
    info!("press ENTER to stop the live loop");

    // Ends when the driver finishes and drops its sender.
    for snapshot in rx {
        print_tick(&snapshot);
    }

    let summary = handle
        .join()
        .map_err(|_| anyhow::anyhow!("live loop thread panicked"))?;
    print_live_summary(&summary);
    Ok(())
}

/// Request a stop on the first line read from stdin. EOF or a read error
/// leaves the loop running.
fn watch_stdin(stop: StopHandle) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("tradebot-stdin".into())
        .spawn(move || {
            let mut line = String::new();
            if let Ok(n) = std::io::stdin().read_line(&mut line) {
                if n > 0 {
                    info!("stop requested from stdin");
                    stop.stop();
                }
            }
        })?;
    Ok(())
}

fn print_tick(s: &LiveSnapshot) {
    println!(
        "[tick {:>4}] {}  open: {:<2}  trades: {:<4}  pnl: {:>12.2}  win: {:>5.1}%",
        s.tick,
        s.timestamp.format("%Y-%m-%d %H:%M:%S"),
        s.open_positions.len(),
        s.trade_count,
        s.metrics.total_pnl,
        s.metrics.win_ratio * 100.0,
    );
}

fn print_metrics(m: &tradebot_core::metrics::Metrics) {
    println!("--- Performance ---");
    println!("Total P/L:      {:.2}", m.total_pnl);
    println!("Sharpe:         {:.3}", m.sharpe_ratio);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Ratio:      {:.1}%", m.win_ratio * 100.0);
    println!("Wins / Losses:  {} / {}", m.winning_trades, m.losing_trades);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Max Loss Run:   {}", m.max_consecutive_losses);
}

fn print_summary(result: &BacktestResult, synthetic: bool) {
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    if let Some(seed) = result.seed {
        println!("Seed:           {seed}");
    }
    println!("Symbols:        {}", result.symbol_count);
    println!("Bars:           {}", result.bar_count);
    println!("Signals:        {}", result.signal_count);
    println!("Trades:         {}", result.metrics.trade_count);
    println!();
    print_metrics(&result.metrics);
    if synthetic {
        println!();
        println!("NOTE: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_live_summary(summary: &LiveSummary) {
    println!();
    println!("=== Live Session ===");
    println!("Ticks:          {}", summary.ticks);
    println!("Stopped:        {}", summary.stop_reason);
    println!("Trades:         {}", summary.trades.len());
    println!("Still open:     {}", summary.open_positions.len());
    println!();
    print_metrics(&summary.metrics);
    println!();
}
