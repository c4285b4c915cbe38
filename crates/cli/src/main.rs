use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use listwise_api::ProviderCredentials;
use listwise_engine::{MarketService, Settings};
use listwise_types::{PropertyAddress, PropertyFilters, SyncTarget};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "listwise", version, about = "Keep local market statistics and listings in sync with data providers")]
struct Cli {
    /// Settings file (YAML or JSON). Defaults to $LISTWISE_CONFIG or the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh market snapshots for a batch of locations
    Sync(SyncArgs),
    /// Search stored properties, optionally merged with live listings
    Search(SearchArgs),
    /// Show the stored market snapshot for a location
    Market(MarketArgs),
    /// Fetch property detail for an address
    Details(AddressArgs),
    /// Fetch sale history for an address
    History(AddressArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Target as CITY,STATE[,ZIP]; repeatable
    #[arg(long = "target")]
    targets: Vec<SyncTarget>,

    /// YAML or JSON list of {city, state, zip} targets
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Targets processed at once; overrides the settings file
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    zip: Option<String>,
    #[arg(long)]
    min_price: Option<u64>,
    #[arg(long)]
    max_price: Option<u64>,
    #[arg(long)]
    min_beds: Option<u32>,
    #[arg(long)]
    min_baths: Option<f32>,
    #[arg(long)]
    limit: Option<usize>,
    /// Always query the listing feed
    #[arg(long, conflicts_with = "no_live")]
    live: bool,
    /// Never query the listing feed
    #[arg(long)]
    no_live: bool,
}

#[derive(Debug, Args)]
struct MarketArgs {
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    zip: Option<String>,
    /// Print every stored month instead of the latest
    #[arg(long)]
    all: bool,
}

#[derive(Debug, Args)]
struct AddressArgs {
    /// Street address as "LINE1, CITY, ST ZIP"
    #[arg(long)]
    address: PropertyAddress,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let credentials = ProviderCredentials::from_env();
    if !credentials.has_any() {
        warn!("no provider credentials found in the environment; live lookups will fall back");
    }

    match cli.command {
        Command::Sync(args) => run_sync(settings, &credentials, args).await,
        Command::Search(args) => {
            let service = connect(&settings, &credentials).await?;
            let found = service.search_properties(&args.into_filters()).await?;
            print_json(&found)
        }
        Command::Market(args) => {
            let service = connect(&settings, &credentials).await?;
            if args.all {
                let history = service
                    .market_history(&args.city, &args.state, args.zip.as_deref())
                    .await?;
                return print_json(&history);
            }
            let snapshot = service
                .get_market_data(&args.city, &args.state, args.zip.as_deref())
                .await?;
            print_json(&snapshot)
        }
        Command::Details(args) => {
            let service = connect(&settings, &credentials).await?;
            print_json(&service.property_details(&args.address).await?)
        }
        Command::History(args) => {
            let service = connect(&settings, &credentials).await?;
            print_json(&service.sale_history(&args.address).await?)
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn connect(settings: &Settings, credentials: &ProviderCredentials) -> Result<MarketService> {
    MarketService::connect(settings, credentials)
        .await
        .context("failed to start market service")
}

async fn run_sync(mut settings: Settings, credentials: &ProviderCredentials, args: SyncArgs) -> Result<()> {
    let mut targets = args.targets;
    if let Some(path) = &args.targets_file {
        targets.extend(load_targets(path)?);
    }
    if targets.is_empty() {
        anyhow::bail!("no targets given; use --target CITY,STATE[,ZIP] or --targets-file FILE");
    }
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrency = concurrency.max(1);
    }

    let service = connect(&settings, credentials).await?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; finishing with completed targets");
            trigger.cancel();
        }
    });

    let summary = service
        .synchronize_market_data_with_cancellation(&targets, &cancel)
        .await?;
    print_json(&summary)
}

fn load_targets(path: &Path) -> Result<Vec<SyncTarget>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read targets file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let raw: Vec<SyncTarget> = if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid targets file {}", path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid targets file {}", path.display()))?
    };
    // File targets get the same trimming and zip checks as --target.
    raw.iter()
        .map(|target| SyncTarget::checked(&target.city, &target.state, target.zip.as_deref()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid target in {}", path.display()))
}

impl SearchArgs {
    fn into_filters(self) -> PropertyFilters {
        let live = match (self.live, self.no_live) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        PropertyFilters {
            city: self.city,
            state: self.state,
            zip: self.zip,
            min_price: self.min_price,
            max_price: self.max_price,
            min_beds: self.min_beds,
            min_baths: self.min_baths,
            limit: self.limit,
            live,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
