use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use automaker_features::models::{
    CreateFeatureInput, FeatureSummary, StatusFilter, UpdateFeatureInput,
};
use automaker_features::store::identifier;
use automaker_features::FeatureStore;

#[derive(Parser)]
#[command(name = "amf")]
#[command(about = "Inspect and edit Automaker feature records")]
struct Cli {
    /// Project root containing the .automaker directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List features, oldest first
    List {
        /// Only include these statuses (repeatable)
        #[arg(short, long)]
        status: Vec<String>,

        /// Print summaries instead of full records
        #[arg(long)]
        summary: bool,
    },
    /// Show a single feature
    Get { id: String },
    /// Create a feature
    Create {
        #[arg(short, long, default_value = "")]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long, default_value = "")]
        category: String,

        #[arg(short, long)]
        status: Option<String>,

        /// Explicit identifier instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },
    /// Update fields of a feature
    Update {
        id: String,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a feature and its artifacts
    Delete { id: String },
    /// Count features per status
    Counts,
    /// Find a feature by title (case-insensitive)
    Find { title: String },
    /// Migrate legacy layouts into status directories
    Migrate,
    /// List stored summaries for a feature, newest first
    Summaries { id: String },
    /// Print an identifier generated from a description
    NewId { description: String },
}

/// Initialize tracing on stderr so stdout stays machine-readable
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "automaker_features=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let store = FeatureStore::from_env();
    let project = cli.project;

    match cli.command {
        Commands::List { status, summary } => {
            let filter = if status.is_empty() {
                StatusFilter::default()
            } else {
                StatusFilter {
                    include: Some(status),
                    exclude: None,
                }
            };
            let features = store.get_all_filtered(&project, &filter).await?;
            if summary {
                let summaries: Vec<_> = features
                    .into_iter()
                    .map(FeatureSummary::from)
                    .collect();
                print_json(&summaries)?;
            } else {
                print_json(&features)?;
            }
        }
        Commands::Get { id } => {
            let feature = store
                .get(&project, &id)
                .await?
                .with_context(|| format!("feature {} not found", id))?;
            print_json(&feature)?;
        }
        Commands::Create {
            title,
            description,
            category,
            status,
            id,
        } => {
            let input = CreateFeatureInput {
                id,
                title,
                description,
                category,
                status,
                ..Default::default()
            };
            let feature = store
                .create(&project, input)
                .await
                .context("failed to create feature")?;
            print_json(&feature)?;
        }
        Commands::Update {
            id,
            status,
            title,
            description,
        } => {
            let input = UpdateFeatureInput {
                status,
                title,
                description,
                ..Default::default()
            };
            let feature = store
                .update(&project, &id, input)
                .await
                .with_context(|| format!("failed to update feature {}", id))?;
            print_json(&feature)?;
        }
        Commands::Delete { id } => {
            if !store.delete(&project, &id).await {
                anyhow::bail!("feature {} not found or could not be deleted", id);
            }
            println!("Deleted {}", id);
        }
        Commands::Counts => {
            print_json(&store.status_counts(&project).await?)?;
        }
        Commands::Find { title } => {
            match store.find_by_title(&project, &title).await? {
                Some(feature) => print_json(&feature)?,
                None => anyhow::bail!("no feature titled {:?}", title),
            }
        }
        Commands::Migrate => {
            print_json(&store.migrate(&project).await?)?;
        }
        Commands::Summaries { id } => {
            print_json(&store.list_summaries(&project, &id).await?)?;
        }
        Commands::NewId { description } => {
            println!("{}", identifier::generate_feature_id(&description));
        }
    }

    Ok(())
}
