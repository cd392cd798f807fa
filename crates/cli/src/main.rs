use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use datasource::{MovieLensSource, ProductId, UserId};
use engine::DiscoSolver;
use server::{Dispatcher, Pipeline, PipelineConfig, jobs};
use transport::{MemoryStore, ServingStore, StoredRating};

/// prodrecs - Product Recommendation Pipeline
#[derive(Parser)]
#[command(name = "prodrecs")]
#[command(about = "Batch recommendation pipeline over a file warehouse", long_about = None)]
struct Cli {
    /// Path to a JSON config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wipe the partition and ingest a dataset into the warehouse
    Setup {
        /// Path to the ratings file (MovieLens "::" format)
        #[arg(long)]
        ratings_file: PathBuf,

        /// Path to the product catalog file
        #[arg(long)]
        products_file: PathBuf,

        /// Skip malformed rating lines instead of aborting
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Grid-search a new model and publish the bundle
    Train,

    /// Refit the published hyperparameters on the full ratings stream
    Retrain,

    /// Regenerate every recommendation list into the warehouse
    Generate,

    /// Push serving-store users and ratings down to the warehouse
    SyncUp,

    /// Pull finished recommendation lists up into the serving store
    SyncDown,

    /// Run a full cycle: sync up, retrain, generate, sync down
    RunCycle,

    /// Record a rating in the serving store
    Rate {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        product_id: ProductId,

        #[arg(long)]
        rating: f32,
    },

    /// Show a user's ratings and current recommendations
    Show {
        #[arg(long)]
        user_id: UserId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    let store = Arc::new(match &config.store_file {
        Some(path) => MemoryStore::open(path, config.allowed_user_ids.clone())
            .context("failed to open the serving-store snapshot")?,
        None => MemoryStore::new(config.allowed_user_ids.clone()),
    });
    let pipeline = Pipeline::new(config, store.clone(), Arc::new(DiscoSolver));

    match cli.command {
        Commands::Setup {
            ratings_file,
            products_file,
            continue_on_error,
        } => handle_setup(&pipeline, ratings_file, products_file, continue_on_error)?,
        Commands::Train => handle_train(&pipeline).await?,
        Commands::Retrain => {
            pipeline.retrain()?;
            println!("{} model retrained and republished", "✓".green());
        }
        Commands::Generate => {
            let result = pipeline.generate()?;
            println!(
                "{} recommendations generated for {} roster users",
                "✓".green(),
                result["roster_users"]
            );
        }
        Commands::SyncUp => {
            pipeline.sync_up()?;
            println!("{} serving-store state sent to the warehouse", "✓".green());
        }
        Commands::SyncDown => {
            pipeline.sync_down()?;
            println!("{} recommendations sent to the serving store", "✓".green());
        }
        Commands::RunCycle => {
            let start = Instant::now();
            pipeline.run_cycle()?;
            println!("{} full cycle finished in {:.2?}", "✓".green(), start.elapsed());
        }
        Commands::Rate {
            user_id,
            product_id,
            rating,
        } => handle_rate(&*store, user_id, product_id, rating)?,
        Commands::Show { user_id } => handle_show(&pipeline, &*store, user_id)?,
    }

    Ok(())
}

/// Handle the 'setup' command
fn handle_setup(
    pipeline: &Pipeline,
    ratings_file: PathBuf,
    products_file: PathBuf,
    continue_on_error: bool,
) -> Result<()> {
    let source = MovieLensSource::new(
        pipeline.config().partition.clone(),
        ratings_file,
        products_file,
    );

    let start = Instant::now();
    let report = pipeline.bootstrap(&source, continue_on_error)?;
    println!(
        "{} ingested {} ratings ({} skipped) in {:.2?}",
        "✓".green(),
        report.written,
        report.skipped,
        start.elapsed()
    );
    Ok(())
}

/// Handle the 'train' command: dispatch the job and poll it to completion
async fn handle_train(pipeline: &Pipeline) -> Result<()> {
    let dispatcher = Dispatcher::new();
    let env = pipeline.job_env();
    let grid = pipeline.config().grid.clone();

    let id = dispatcher.submit("train-new-model", move || {
        jobs::train_new_model_job(&env, &grid)
    });
    println!("training task {} submitted, polling...", id.to_string().cyan());

    let task = dispatcher
        .wait(id, Duration::from_millis(500))
        .await
        .context("training task vanished from the dispatcher")?;

    match task.state {
        server::TaskState::Success => match task.result {
            Some(serde_json::Value::Null) => {
                println!("{} no grid candidate converged; model not published", "!".yellow());
            }
            Some(params) => {
                println!("{} training finished, selected parameters:", "✓".green());
                println!("{}", serde_json::to_string_pretty(&params)?);
            }
            None => println!("{} training finished", "✓".green()),
        },
        _ => {
            let message = task
                .result
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("training task failed: {message}");
        }
    }
    Ok(())
}

/// Handle the 'rate' command
fn handle_rate(
    store: &dyn ServingStore,
    user_id: UserId,
    product_id: ProductId,
    rating: f32,
) -> Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the epoch")?
        .as_secs() as i64;

    store.add_rating(
        user_id,
        StoredRating {
            product_id,
            rating,
            timestamp,
        },
    )?;
    println!(
        "{} user {} rated product {} at {:.1}",
        "✓".green(),
        user_id,
        product_id,
        rating
    );
    Ok(())
}

/// Handle the 'show' command
fn handle_show(pipeline: &Pipeline, store: &dyn ServingStore, user_id: UserId) -> Result<()> {
    let names: HashMap<ProductId, String> = pipeline
        .warehouse()
        .read_products()
        .unwrap_or_default()
        .into_iter()
        .map(|p| (p.product_id, p.name))
        .collect();
    let name_of =
        |id: ProductId| names.get(&id).cloned().unwrap_or_else(|| format!("product {id}"));

    println!("{}", format!("User {user_id}").bold().blue());

    let ratings = store.ratings(user_id)?;
    println!("Ratings ({}):", ratings.len());
    for r in &ratings {
        println!("  {} {} - {:.1}", "•".cyan(), name_of(r.product_id), r.rating);
    }

    let recommendations = store.recommendations(user_id)?;
    println!("Recommendations ({}):", recommendations.len());
    for (rank, product_id) in recommendations.iter().enumerate() {
        println!(
            "  {}. {}",
            (rank + 1).to_string().green(),
            name_of(*product_id)
        );
    }
    Ok(())
}
