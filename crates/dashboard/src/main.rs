//! # Staker Dashboard CLI
//!
//! ## Commands
//!
//! - `watch`: run a dashboard session against the in-memory simulated
//!   staking contract and print snapshots until Ctrl+C or `--duration-secs`
//! - `countdown <seconds>`: print the days / hours / minutes / seconds
//!   breakdown
//! - `to-units <amount>`: convert a decimal amount to the smallest unit
//!
//! ## Configuration
//!
//! `watch --config <file>` loads a TOML [`DashboardConfig`]; `STAKER_*`
//! environment variables override it. Without an account the session
//! mirrors a built-in demo account.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use staker_common::{
    format_ether, load_from_file, parse_units, Address, Amount, DashboardConfig, SimulatedStaker,
};
use staker_dashboard::{decompose, Collaborators, DashboardSession, DashboardSnapshot, SessionSettings};

const DEMO_ACCOUNT: &str = "0x00000000000000000000000000000000000000a1";

#[derive(Parser)]
#[command(version, about = "Staking contract dashboard")]
struct Cli {
    /// Log filter directives, e.g. `debug` or `staker_dashboard=trace`.
    /// Overrides `RUST_LOG` and the config.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against the simulated staking contract.
    Watch {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Snapshot print period
        #[arg(long, default_value_t = 1000)]
        print_interval_ms: u64,
        /// Staking threshold of the simulated contract, in ether
        #[arg(long, default_value = "1")]
        threshold: String,
        /// Seconds until the simulated deadline
        #[arg(long, default_value_t = 120)]
        deadline_secs: u64,
        /// Stake the fixed amount once after start
        #[arg(long)]
        stake: bool,
    },

    /// Decompose a number of seconds into days, hours, minutes and seconds.
    Countdown {
        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },

    /// Convert a decimal amount to the smallest unit.
    ToUnits {
        amount: String,
        #[arg(long, default_value_t = 18)]
        decimals: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Watch {
            config,
            duration_secs,
            print_interval_ms,
            threshold,
            deadline_secs,
            stake,
        } => {
            let mut config = match config {
                Some(path) => load_from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => DashboardConfig::default(),
            };
            config.apply_env().context("applying environment overrides")?;
            if config.account.trim().is_empty() {
                config.account = DEMO_ACCOUNT.to_string();
            }
            init_tracing(cli.log_level.as_deref(), &config.log_level)?;

            let threshold = parse_units(&threshold, config.decimals)
                .with_context(|| format!("threshold '{}'", threshold))?;
            let settings = SessionSettings::from_config(&config).context("invalid config")?;
            watch(
                settings,
                threshold,
                deadline_secs,
                stake,
                duration_secs.map(Duration::from_secs),
                Duration::from_millis(print_interval_ms.max(1)),
            )
            .await
        }

        Commands::Countdown { seconds } => {
            let b = decompose(seconds)?;
            println!(
                "{} days {} hours {} minutes {} seconds",
                b.days, b.hours, b.minutes, b.seconds
            );
            Ok(())
        }

        Commands::ToUnits { amount, decimals } => {
            let value = parse_units(&amount, decimals)
                .with_context(|| format!("amount '{}'", amount))?;
            println!("{}", value);
            Ok(())
        }
    }
}

fn init_tracing(flag: Option<&str>, config_level: &str) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(flag, env.as_deref(), config_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

async fn watch(
    settings: SessionSettings,
    threshold: Amount,
    deadline_secs: u64,
    stake: bool,
    duration: Option<Duration>,
    print_interval: Duration,
) -> Result<()> {
    let account: Address = settings.account;
    let chain = SimulatedStaker::new(threshold, deadline_secs);
    chain.fund(account, parse_units("10", settings.decimals)?);

    info!("═══════════════════════════════════════════════════════════════");
    info!("                    Staker Dashboard                           ");
    info!("═══════════════════════════════════════════════════════════════");
    info!("Account:      {}", account);
    info!("Gas tier:     {}", settings.gas_tier);
    info!("Event window: {}", settings.feed.window);
    info!("Threshold:    {}", format_ether(threshold));
    info!("═══════════════════════════════════════════════════════════════");

    let session = DashboardSession::start(Collaborators::simulated(&chain, Some(account)), settings)
        .context("starting session")?;

    // The simulated chain has no clock of its own.
    let clock = {
        let chain = chain.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.tick().await;
            loop {
                tick.tick().await;
                chain.advance_time(1);
            }
        })
    };

    if stake {
        match session.stake_fixed().await {
            Ok(outcome) => info!("staked in block {}", outcome.block_number),
            Err(e) => warn!("stake failed: {}", e),
        }
    }

    let stop = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut printer = tokio::time::interval(print_interval);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = printer.tick() => print_snapshot(&session).await,
        }
    }

    info!("Shutdown requested...");
    clock.abort();
    let metrics = Arc::clone(session.metrics());
    session.shutdown().await;
    print!("{}", metrics.to_prometheus());
    Ok(())
}

async fn print_snapshot(session: &DashboardSession) {
    let s: DashboardSnapshot = session.snapshot();
    let show = |v: Option<Amount>| v.map(format_ether).unwrap_or_else(|| "-".into());
    if s.view.completed {
        println!(
            "staking completed: {} staked in the external contract",
            show(s.pool.external_balance)
        );
    }
    let usd = s
        .your_staked_usd
        .map(|v| format!(" (${:.2})", v))
        .unwrap_or_default();
    println!(
        "total={}/{} yours={}{} completed={} time_left={}d {}h {}m {}s events={}",
        show(s.pool.total_staked),
        show(s.view.threshold),
        show(s.view.balance_staked),
        usd,
        s.view.completed,
        s.countdown.days,
        s.countdown.hours,
        s.countdown.minutes,
        s.countdown.seconds,
        s.recent_events.len()
    );
    for e in &s.recent_events {
        println!(
            "  block {:>6}  {}  {}",
            e.block_number,
            session.display_name(e.sender).await,
            format_ether(e.amount)
        );
    }
}

/// `--log-level` wins, then `RUST_LOG` (ignored if unparsable), then the
/// config's `log_level`.
fn log_filter(flag: Option<&str>, env: Option<&str>, config_level: &str) -> Result<EnvFilter> {
    if let Some(directives) = flag {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("log filter '{}'", directives));
    }
    if let Some(filter) = env.and_then(|e| EnvFilter::try_new(e).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(config_level).with_context(|| format!("log level '{}'", config_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_precedence() {
        let f = log_filter(Some("debug"), Some("warn"), "info")
            .unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(f.to_string(), "debug");

        let f = log_filter(None, Some("staker_dashboard=trace"), "info")
            .unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(f.to_string(), "staker_dashboard=trace");

        let f = log_filter(None, None, "info").unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(f.to_string(), "info");
    }

    #[test]
    fn bad_flag_is_an_error() {
        assert!(log_filter(Some("staker_dashboard=loud"), None, "info").is_err());
    }
}
