// CoinDrafts engine CLI - snapshot, settlement, and lifecycle operations
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use coindrafts_engine::backend::{ContestBackend, GraphQlBackend};
use coindrafts_engine::format::{format_percent_change, format_usd};
use coindrafts_engine::models::{now_ms, parse_usd_micros};
use coindrafts_engine::multiplier::compute_multiplier;
use coindrafts_engine::oracle::{CoinCapClient, PriceOracle};
use coindrafts_engine::orchestrator::LifecycleOrchestrator;
use coindrafts_engine::returns::compute_returns;
use coindrafts_engine::snapshot::SnapshotMatcher;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Contest backend GraphQL endpoint
    #[arg(long, default_value = "http://localhost:8080/graphql")]
    backend_url: String,

    /// Market-data API base URL
    #[arg(long, default_value = "https://rest.coincap.io/v3")]
    oracle_url: String,

    /// Market-data API key (falls back to COINCAP_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an auto-start check for a contest
    AutoStart {
        #[arg(short, long)]
        contest_id: String,
    },

    /// Run an auto-settle check for a contest
    AutoSettle {
        #[arg(short, long)]
        contest_id: String,
    },

    /// Capture a price snapshot for a set of assets
    Snapshot {
        /// Asset ids to snapshot (e.g. bitcoin,ethereum,solana)
        #[arg(short, long, value_delimiter = ',', default_value = "bitcoin,ethereum,solana")]
        assets: Vec<String>,

        /// Target epoch milliseconds (defaults to now)
        #[arg(short, long)]
        target_ms: Option<i64>,
    },

    /// Price changes between two points in time for a set of assets
    Returns {
        #[arg(short, long, value_delimiter = ',', default_value = "bitcoin,ethereum")]
        assets: Vec<String>,

        /// Start of the window, epoch milliseconds
        #[arg(long)]
        start_ms: i64,

        /// End of the window, epoch milliseconds (defaults to now)
        #[arg(long)]
        end_ms: Option<i64>,
    },

    /// Preview the reward multiplier for a price-range prediction
    Multiplier {
        /// Lower bound in currency units, e.g. 84000.50
        #[arg(long)]
        min_price: String,

        /// Upper bound in currency units
        #[arg(long)]
        max_price: String,

        /// Stated confidence, 0-100
        #[arg(long, default_value = "50")]
        confidence: u8,

        /// Whether the range came from the AI assistant
        #[arg(long)]
        ai_assisted: bool,
    },

    /// Settle a prediction market against its final price
    SettleMarket {
        #[arg(short, long)]
        contest_id: String,

        /// Final price in currency units, e.g. 84714.00
        #[arg(long)]
        final_price: String,

        /// Participating players
        #[arg(short, long, value_delimiter = ',')]
        players: Vec<String>,
    },

    /// Smoke-test the market-data API
    TestOracle {
        #[arg(short, long, value_delimiter = ',', default_value = "bitcoin")]
        assets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("COINCAP_API_KEY").ok());
    let oracle = Arc::new(CoinCapClient::with_base_url(&cli.oracle_url, api_key));
    let matcher = SnapshotMatcher::new(Arc::clone(&oracle) as _);

    match cli.command {
        Commands::AutoStart { contest_id } => {
            let backend = Arc::new(GraphQlBackend::new(&cli.backend_url));
            let orchestrator = LifecycleOrchestrator::new(backend, matcher);

            let outcome = orchestrator.auto_start_check(&contest_id).await?;
            println!("Auto-start check for {}: {:?}", contest_id, outcome);
        }

        Commands::AutoSettle { contest_id } => {
            let backend = Arc::new(GraphQlBackend::new(&cli.backend_url));
            let orchestrator = LifecycleOrchestrator::new(backend, matcher);

            let outcome = orchestrator.auto_settle_check(&contest_id).await?;
            println!("Auto-settle check for {}: {:?}", contest_id, outcome);
        }

        Commands::Snapshot { assets, target_ms } => {
            let target = target_ms.unwrap_or_else(now_ms);
            info!("Capturing snapshot of {} assets at {}", assets.len(), target);

            let snapshot = matcher.snapshot_at(target, &assets).await?;

            println!("Snapshot at {}:", snapshot.timestamp_ms);
            for asset_id in &assets {
                match snapshot.price_of(asset_id) {
                    Some(price_micros) => println!("  {}: {}", asset_id, format_usd(price_micros)),
                    None => println!("  {}: no data in window", asset_id),
                }
            }
        }

        Commands::Returns {
            assets,
            start_ms,
            end_ms,
        } => {
            let end = end_ms.unwrap_or_else(now_ms);

            let start_snapshot = matcher.snapshot_at(start_ms, &assets).await?;
            let end_snapshot = matcher.snapshot_at(end, &assets).await?;

            let returns = compute_returns(&start_snapshot, &end_snapshot);
            if returns.is_empty() {
                println!("No computable returns for the requested assets");
            }
            for result in returns {
                println!(
                    "  {}: {} -> {} ({})",
                    result.asset_id,
                    format_usd(result.start_price_micros),
                    format_usd(result.end_price_micros),
                    format_percent_change(result.percent_change)
                );
            }
        }

        Commands::Multiplier {
            min_price,
            max_price,
            confidence,
            ai_assisted,
        } => {
            let min_micros = parse_usd_micros(&min_price)
                .with_context(|| format!("invalid min price: {}", min_price))?;
            let max_micros = parse_usd_micros(&max_price)
                .with_context(|| format!("invalid max price: {}", max_price))?;

            let multiplier = compute_multiplier(min_micros, max_micros, confidence, ai_assisted)?;
            println!(
                "Range {} - {} at {}% confidence{}: {:.2}x",
                format_usd(min_micros),
                format_usd(max_micros),
                confidence,
                if ai_assisted { " (AI-assisted)" } else { "" },
                multiplier
            );
        }

        Commands::SettleMarket {
            contest_id,
            final_price,
            players,
        } => {
            let final_price_micros = parse_usd_micros(&final_price)
                .with_context(|| format!("invalid final price: {}", final_price))?;

            let backend = GraphQlBackend::new(&cli.backend_url);
            let outcome = backend
                .settle_market(&contest_id, final_price_micros, &players)
                .await?;
            println!("Settle of {}: {:?}", contest_id, outcome);
        }

        Commands::TestOracle { assets } => {
            let samples = oracle.fetch_current(&assets).await?;
            for sample in &samples {
                println!("{}: {}", sample.asset_id, format_usd(sample.price_micros));
            }
            if samples.is_empty() {
                println!("Oracle returned no prices for {:?}", assets);
            }
        }
    }

    Ok(())
}
