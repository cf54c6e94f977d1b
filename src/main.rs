//! pqbench - CLI entry point
//!
//! Two subcommands: `bench` drives the handshake latency campaigns and
//! `score` evaluates CARI maturity profiles. Both read the same YAML
//! configuration file.

// Use mimalloc as global allocator for better p99 latency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use pqbench::campaign::{CampaignStatus, SamplingController};
use pqbench::cari::compare_profiles;
use pqbench::driver::HandshakeDriver;
use pqbench::report::{self, BenchReport, CariReport};
use pqbench::{Config, VERSION};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pqbench")]
#[command(version = VERSION)]
#[command(about = "TLS 1.3 hybrid handshake benchmark and crypto-agility scoring")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", default_value = "pqbench.yaml")]
    config: PathBuf,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the handshake latency campaigns
    Bench,
    /// Evaluate and rank CARI maturity profiles
    Score,
}

fn main() -> anyhow::Result<()> {
    // Install aws-lc-rs as the default crypto provider for rustls; it is
    // the provider that carries the X25519MLKEM768 hybrid group.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // A current-thread runtime keeps every trial on one core: handshake
    // timing is contention-sensitive and must stay strictly sequential.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pqbench=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("pqbench v{}", VERSION);
    info!("Loading configuration from: {}", args.config.display());

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if args.test {
        info!("Configuration test passed");
        return Ok(());
    }

    match args.command {
        Command::Bench => run_bench(&config).await,
        Command::Score => run_score(&config),
    }
}

async fn run_bench(config: &Config) -> anyhow::Result<()> {
    if config.campaigns.is_empty() {
        anyhow::bail!("no campaigns configured");
    }

    let driver = HandshakeDriver::new(&config.driver_config())?;
    let controller = SamplingController::new(driver)
        .with_failure_threshold(config.failure_threshold)
        .with_trial_pause(config.trial_pause())
        .with_config_pause(config.config_pause());

    // Ctrl-C stops before the next trial; collected data stays valid.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, stopping after the current trial");
            cancel_on_signal.cancel();
        }
    });

    info!("Target: {}", config.target);
    let runs = controller
        .run_campaign(&config.campaign_configs(), &cancel)
        .await?;

    if runs.is_empty() {
        warn!("No campaign ran");
        return Ok(());
    }

    let report = BenchReport::assemble(
        &config.target,
        &runs,
        config.baseline_group(),
        config.alpha,
    )?;

    let stamp = report.metadata.generated_at.format("%Y%m%d_%H%M%S");
    let json_path = config.output_dir.join(format!("tls_bench_{}.json", stamp));
    report::write_json(&json_path, &report)?;
    for run in &runs {
        let csv_path = config.output_dir.join(format!(
            "tls_bench_{}_{}.csv",
            run.sample_set.configuration_id(),
            stamp
        ));
        report::write_samples_csv(&csv_path, &run.sample_set)?;
    }

    print_bench_summary(&report);
    Ok(())
}

fn print_bench_summary(report: &BenchReport) {
    println!();
    println!("=== TLS 1.3 Handshake Latency ===");
    println!("Target: {}", report.metadata.target);
    println!("TLS backend: {}", report.metadata.tls_backend);
    println!();

    for group in &report.groups {
        println!("[{}] group {}", group.configuration_id, group.group_name);
        match &group.summary {
            Some(summary) if !summary.is_degenerate() => {
                println!(
                    "  trials: {} measured, {} warm-up, {} failed",
                    summary.count + summary.failure_count,
                    group.warmup_discarded,
                    summary.failure_count
                );
                println!("  mean:   {:>8.2}ms", summary.mean_ms);
                println!("  median: {:>8.2}ms", summary.median_ms);
                println!("  stdev:  {:>8.2}ms", summary.std_dev_ms);
                println!("  p95:    {:>8.2}ms", summary.p95_ms);
                println!("  p99:    {:>8.2}ms", summary.p99_ms);
            }
            Some(_) => {
                println!("  no successful handshake; result inconclusive");
            }
            None => match &group.status {
                CampaignStatus::Inconclusive { failures, budget } => {
                    println!(
                        "  INCONCLUSIVE: {} failures exceeded the budget of {}",
                        failures, budget
                    );
                }
                _ => println!("  no summary available"),
            },
        }
        println!();
    }

    for comparison in &report.comparisons {
        println!(
            "{} vs {}: {:+.2}ms ({:+.1}%), p = {:.4} -> {}",
            comparison.candidate_group,
            comparison.baseline_group,
            comparison.delta_mean_ms,
            comparison.delta_percent,
            comparison.p_value,
            match comparison.verdict {
                pqbench::stats::SignificanceVerdict::Significant =>
                    "statistically significant",
                pqbench::stats::SignificanceVerdict::NotSignificant =>
                    "not statistically significant",
            }
        );
    }
}

fn run_score(config: &Config) -> anyhow::Result<()> {
    if config.profiles.is_empty() {
        anyhow::bail!("no profiles configured");
    }

    let rubric = config.rubric()?;
    info!("Rubric: {} criteria", rubric.len());

    let mut evaluations = Vec::with_capacity(config.profiles.len());
    for (name, raw_scores) in &config.profiles {
        evaluations.push(rubric.evaluate(name, raw_scores)?);
    }
    let report = CariReport::assemble(compare_profiles(evaluations));

    let stamp = report.generated_at.format("%Y%m%d_%H%M%S");
    let json_path = config.output_dir.join(format!("cari_{}.json", stamp));
    report::write_json(&json_path, &report)?;

    println!();
    println!("=== Crypto-Agility Readiness Index ===");
    for profile in &report.ranking {
        println!(
            "#{} {:<24} {:>5.1}% - {}",
            profile.rank,
            profile.evaluation.profile_name,
            profile.evaluation.composite_index * 100.0,
            profile.interpretation
        );
    }
    Ok(())
}
