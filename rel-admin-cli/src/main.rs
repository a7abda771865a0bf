//! Rel Administration CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rel_data::{
    Asset, ChangeSet, ChangeSetProcessor, ConflictResolver, DataConfig, Identity, Job, MergeConcurrentEdits,
    RejectConcurrentEdits, SqliteStore, Store, UnitOfWork, Write, WriteBatch,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rel-admin")]
#[command(author = "Rel Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Partition checkout, checkin and locking over a Rel database", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "./rel.sqlite")]
    db: PathBuf,

    /// JSON configuration file
    #[arg(long, global = true, default_value = "./rel.json")]
    config: PathBuf,

    /// Acting user; anonymous when absent
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and a default configuration file
    Init,

    /// Add a partition
    AddPartition {
        #[arg(short, long)]
        name: String,
    },

    /// Print the initial change set of a partition
    Checkout {
        #[arg(short, long)]
        partition: i64,
    },

    /// Apply a change set; prints the reconciliation change set if it was not accepted
    Checkin {
        #[arg(short, long)]
        partition: i64,
        /// Change set JSON file, `-` for stdin
        #[arg(short, long)]
        file: String,
        /// Claim the partition lock if the optimistic commit fails
        #[arg(long)]
        claim: bool,
        #[arg(short, long, value_enum, default_value_t = ResolverKind::Merge)]
        resolver: ResolverKind,
    },

    /// Take the partition lock
    Lock {
        #[arg(short, long)]
        partition: i64,
    },

    /// Release the partition lock
    Unlock {
        #[arg(short, long)]
        partition: i64,
    },

    /// Show the partition lock as seen by the acting user
    Status {
        #[arg(short, long)]
        partition: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResolverKind {
    Merge,
    Reject,
}

impl ResolverKind {
    fn resolver(self) -> Arc<dyn ConflictResolver<Asset>> {
        match self {
            ResolverKind::Merge => Arc::new(MergeConcurrentEdits::with_default_engine()),
            ResolverKind::Reject => Arc::new(RejectConcurrentEdits),
        }
    }
}

fn open_store(path: &Path) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(path).with_context(|| format!("Failed to open database {:?}", path))?;
    Ok(Arc::new(store))
}

fn read_change_set(file: &str) -> Result<ChangeSet> {
    let mut data = String::new();
    if file == "-" {
        std::io::stdin().read_to_string(&mut data)?;
    } else {
        data = std::fs::read_to_string(file).with_context(|| format!("Failed to read change set from {}", file))?;
    }
    serde_json::from_str(&data).with_context(|| "Failed to parse change set JSON")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let identity = cli.user.clone().map(Identity::User).unwrap_or_default();
    let config = DataConfig::load(&cli.config)?;

    let processor = |resolver: Arc<dyn ConflictResolver<Asset>>| -> Result<_> {
        let store = open_store(&cli.db)?;
        Ok(ChangeSetProcessor::with_config(UnitOfWork::new(store), resolver, identity.clone(), config.change_sets))
    };

    match cli.command {
        Commands::Init => {
            open_store(&cli.db)?;
            if !cli.config.exists() {
                config.save(&cli.config)?;
            }
            println!("Initialized database at {}", cli.db.display());
        }

        Commands::AddPartition { name } => {
            let store = open_store(&cli.db)?;
            let batch = WriteBatch { jobs: vec![Write::Insert(Job::new(name))], ..WriteBatch::default() };
            let committed = store.commit(&batch)?;
            for job in committed.jobs {
                println!("Added partition {} ({})", job.id, job.name);
            }
        }

        Commands::Checkout { partition } => {
            let mut p = processor(Arc::new(RejectConcurrentEdits))?;
            let cs = p.build_initial_change_set(partition)?;
            println!("{}", serde_json::to_string_pretty(&cs)?);
        }

        Commands::Checkin { partition, file, claim, resolver } => {
            let cs = read_change_set(&file)?;
            let mut p = processor(resolver.resolver())?;
            let result = p.process(partition, claim, &cs)?;
            if result.is_empty() {
                info!("Change set accepted");
            } else {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }

        Commands::Lock { partition } => {
            let status = processor(Arc::new(RejectConcurrentEdits))?.lock_partition(partition)?;
            println!("Partition {} is {}", partition, status);
        }

        Commands::Unlock { partition } => {
            let status = processor(Arc::new(RejectConcurrentEdits))?.unlock_partition(partition)?;
            println!("Partition {} is {}", partition, status);
        }

        Commands::Status { partition } => {
            let status = processor(Arc::new(RejectConcurrentEdits))?.lock_status(partition)?;
            println!("Partition {} is {} for {}", partition, status, identity);
        }
    }

    Ok(())
}
