use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use traceprint_common::{file_config, AppConfig, CacheGateway, FileConfig, MediaRef, Source, User};
use traceprint_engine::{NullFaceMatcher, NullTranscriber, Transformer};
use traceprint_extract::{FileFeed, Orchestrator};
use traceprint_scan::Pipeline;
use traceprint_store::{migrate, Loader, PgCache, Store};

/// Scan a person's digital footprint across social and search sources.
#[derive(Parser, Debug)]
#[command(name = "traceprint-scan", version)]
struct Args {
    /// Full name of the person to scan
    #[arg(long)]
    name: String,

    /// Email address of the person to scan
    #[arg(long)]
    email: String,

    /// Phone number, with country code
    #[arg(long)]
    phone: Option<String>,

    /// URL of a reference photo for face matching
    #[arg(long)]
    photo: Option<String>,

    /// Directory holding per-source capture files (<source>.json)
    #[arg(long, default_value = "captures")]
    captures: PathBuf,

    /// TOML config file; defaults apply if absent
    #[arg(long, default_value = "config/traceprint.toml")]
    config: PathBuf,

    /// Restrict the scan to specific sources (repeatable)
    #[arg(long = "source")]
    sources: Vec<Source>,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("traceprint=info".parse()?))
        .init();

    let args = Args::parse();
    info!("Traceprint scan starting...");

    let app_config = AppConfig::from_env()?;
    let config = if args.config.exists() {
        file_config::load_config(&args.config)?
    } else {
        info!(path = %args.config.display(), "No config file, using defaults");
        FileConfig::default()
    };

    let pool = PgPool::connect(&app_config.database_url).await?;
    migrate(&pool).await?;

    let cache: Arc<dyn CacheGateway> = Arc::new(PgCache::new(pool.clone()));
    let mut orchestrator =
        Orchestrator::new(FileFeed::new(&args.captures), cache.clone(), &config);
    if !args.sources.is_empty() {
        orchestrator = orchestrator.with_sources(args.sources.clone());
    }

    let transformer = Transformer::new(NullFaceMatcher, NullTranscriber, &config);
    let pipeline = Pipeline::new(
        orchestrator,
        transformer,
        Loader::new(pool.clone()),
        Store::new(pool),
        cache,
        &config,
    );

    let mut user = User::new(&args.name, &args.email);
    if let Some(phone) = &args.phone {
        user = user.with_phone(phone);
    }
    if let Some(photo) = args.photo.as_deref().and_then(MediaRef::from_url) {
        user = user.with_reference_photo(photo);
    }

    let report = pipeline.run(&user).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    if !report.pipeline_success {
        std::process::exit(1);
    }
    Ok(())
}
