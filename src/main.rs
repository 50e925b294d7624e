mod catalog;
mod db;
mod encode;
mod error;
mod extract;
mod pipeline;
mod regress;
mod store;
mod vocab;

use std::time::Instant;

use clap::{Parser, Subcommand};

use pipeline::{PredictionInput, Predictor, TrainOptions};
use store::ModelStore;

#[derive(Parser)]
#[command(name = "zikom_pricer", about = "Used desktop price scraper + predictor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the catalog and store raw listings
    Scrape {
        /// Max pages to walk (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Train a price model from stored listings and persist it
    Train {
        /// Drop rows whose every field normalized to the default bucket
        #[arg(long)]
        drop_unknown: bool,
    },
    /// Scrape + train in one pipeline
    Run {
        /// Max pages to walk
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        drop_unknown: bool,
    },
    /// Predict the price of one machine from its six attributes
    Predict {
        #[arg(long)]
        processor: String,
        #[arg(long)]
        graphic_card: String,
        #[arg(long)]
        ram: String,
        #[arg(long)]
        disk: String,
        #[arg(long)]
        os: String,
        #[arg(long)]
        condition: String,
    },
    /// Show dataset and model status
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape { limit } => scrape(limit).await,
        Commands::Train { drop_unknown } => train(drop_unknown),
        Commands::Run { limit, drop_unknown } => {
            scrape(limit).await?;
            train(drop_unknown)
        }
        Commands::Predict {
            processor,
            graphic_card,
            ram,
            disk,
            os,
            condition,
        } => predict(PredictionInput {
            processor,
            graphic_card,
            ram,
            disk,
            os,
            condition,
        }),
        Commands::Stats => stats(),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn scrape(limit: Option<usize>) -> anyhow::Result<()> {
    let listings = catalog::fetch_all(limit).await?;
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let saved = db::replace_listings(&conn, &listings)?;
    let priced = listings
        .iter()
        .filter(|l| l.listing.price.is_some())
        .count();
    println!("Saved {} listings ({} with a price).", saved, priced);
    Ok(())
}

fn train(drop_unknown: bool) -> anyhow::Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let listings = db::fetch_listings(&conn)?;
    if listings.is_empty() {
        println!("No listings stored. Run 'scrape' first.");
        return Ok(());
    }

    let opts = TrainOptions {
        keep_all_default_rows: !drop_unknown,
    };
    let mut predictor = Predictor::open(ModelStore::default_location());
    let report = predictor.train(&listings, &opts)?;
    println!(
        "Trained on {}/{} rows ({} held out). mse={:.2} r2={:.4}",
        report.rows_used - report.held_out,
        report.rows_total,
        report.held_out,
        report.metrics.mse,
        report.metrics.r2,
    );
    Ok(())
}

fn predict(input: PredictionInput) -> anyhow::Result<()> {
    let predictor = Predictor::open(ModelStore::default_location());
    let price = predictor.predict(&input)?;
    println!("Estimated price: {:.2} zł", price);
    Ok(())
}

fn stats() -> anyhow::Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let s = db::get_stats(&conn)?;
    println!("Listings: {}", s.total);
    println!("Priced:   {}", s.priced);
    println!("Pages:    {}", s.pages);

    let predictor = Predictor::open(ModelStore::default_location());
    match predictor.artifact() {
        Some(a) => println!(
            "Model:    trained {} on {} rows (mse={:.2}, r2={:.4})",
            a.trained_at.format("%Y-%m-%d %H:%M UTC"),
            a.trained_rows,
            a.metrics.mse,
            a.metrics.r2,
        ),
        None => println!("Model:    none (run 'train')"),
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
