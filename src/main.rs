use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use plotwatch_core::{
    create_listing_table, open_store, CancelToken, CloudDrive, Coordinates, CountyTable, CsvStore,
    Gazetteer, GeoResolver, ListingStore, MapRenderer, NominatimGeocoder, NotifierConfig, Pipeline,
    ResolverConfig, RetryPolicy, SqliteStore, TelegramNotifier,
};
use plotwatch_scrapers::{ScrapeQuery, ScraperFactory, ScraperType as CoreScraperType, SourceProfile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USER_AGENT: &str = concat!("plotwatch/", env!("CARGO_PKG_VERSION"), " (land listing tracker)");

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a portal search and merge it into the listing store
    #[command(about = "Scrape a portal search and merge it into the listing store")]
    #[command(long_about = "Scrape a portal search, resolve listing locations, merge the result into the listing store, then render the map and send notifications.")]
    Run(RunCommand),

    /// List stored listings
    #[command(about = "List stored listings")]
    List(ListCommand),

    /// Export a listing store to CSV
    #[command(about = "Export a listing store to CSV")]
    #[command(long_about = "Export any listing store, CSV or SQLite, to a CSV file for external analysis.")]
    Export(ExportCommand),

    /// Resolve one location string and print the candidates
    #[command(about = "Resolve one location string and print the candidates")]
    Resolve(ResolveCommand),

    /// Render the map of active listings
    #[command(about = "Render the map of active listings")]
    Map(MapCommand),

    /// Show or roll back SQLite schema migrations
    #[command(about = "Show or roll back SQLite schema migrations")]
    Migrate(MigrateCommand),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliScraperType {
    Otodom,
    Olx,
    NieruchomosciOnline,
}

impl From<CliScraperType> for CoreScraperType {
    fn from(value: CliScraperType) -> Self {
        match value {
            CliScraperType::Otodom => CoreScraperType::Otodom,
            CliScraperType::Olx => CoreScraperType::Olx,
            CliScraperType::NieruchomosciOnline => CoreScraperType::NieruchomosciOnline,
        }
    }
}

/// Options shared by every command that resolves locations
#[derive(Args)]
struct GeoArgs {
    /// Gazetteer file of `town|lat|lon` lines (-g, --gazetteer)
    #[arg(short = 'g', long, default_value = "gazetteer.txt")]
    gazetteer: PathBuf,

    /// Maximum distance from the reference point in km (-k, --max-distance)
    #[arg(short = 'k', long, default_value_t = 50.0)]
    max_distance: f64,

    /// County the search is scoped to, e.g. "powiat wielicki" (--county-hint)
    #[arg(long)]
    county_hint: Option<String>,

    /// Minimum delay between geocoding calls in milliseconds (--geocode-interval-ms)
    #[arg(long, default_value_t = 1000)]
    geocode_interval_ms: u64,
}

impl GeoArgs {
    fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_distance_km: self.max_distance,
            min_call_interval: Duration::from_millis(self.geocode_interval_ms),
            ..ResolverConfig::default()
        }
    }

    fn build_resolver(&self) -> Result<GeoResolver> {
        let gazetteer = Gazetteer::load(&self.gazetteer)
            .with_context(|| format!("Loading gazetteer {}", self.gazetteer.display()))?;
        info!(
            "Gazetteer: {} towns, {} malformed lines skipped",
            gazetteer.len(),
            gazetteer.skipped_lines()
        );

        let geocoder = Arc::new(NominatimGeocoder::new(USER_AGENT)?);
        Ok(GeoResolver::new(
            self.resolver_config(),
            gazetteer,
            CountyTable::malopolska(),
            geocoder,
            RetryPolicy::default(),
        ))
    }
}

#[derive(Parser)]
struct RunCommand {
    /// The portal to scrape (-x, --scraper)
    #[arg(short = 'x', long, value_enum, default_value_t = CliScraperType::Otodom)]
    scraper: CliScraperType,

    /// Search result URL with filters applied (-u, --url)
    #[arg(short = 'u', long)]
    url: String,

    /// JSON selector profile overriding the built-in one (-p, --profile)
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Maximum number of pages to scrape (-c, --max-pages)
    #[arg(short = 'c', long, default_value_t = 5)]
    max_pages: u32,

    /// Listing store, CSV or SQLite by extension (-d, --store)
    #[arg(short = 'd', long, default_value = "listings.csv")]
    store: PathBuf,

    /// Where to write the HTML map (-m, --map)
    #[arg(short = 'm', long)]
    map: Option<PathBuf>,

    /// Post new listings to Telegram (-n, --notify)
    #[arg(short = 'n', long)]
    notify: bool,

    /// Cloud drive folder to sync the store and map with (--cloud-dir)
    #[arg(long)]
    cloud_dir: Option<String>,

    /// Abort the run after this many minutes (--deadline-minutes)
    #[arg(long)]
    deadline_minutes: Option<u64>,

    #[command(flatten)]
    geo: GeoArgs,
}

#[derive(Parser)]
struct ListCommand {
    /// Listing store (-d, --store)
    #[arg(short = 'd', long, default_value = "listings.csv")]
    store: PathBuf,

    /// Only show active listings (-a, --active-only)
    #[arg(short = 'a', long)]
    active_only: bool,

    /// Maximum number of listings to display (-l, --limit)
    #[arg(short = 'l', long, default_value_t = 20)]
    limit: usize,

    /// Sort order by distance (-r, --sort-order)
    #[arg(short = 'r', long, value_enum, default_value_t = SortOrder::Asc)]
    sort_order: SortOrder,
}

#[derive(Parser)]
struct ExportCommand {
    /// Output file path (-o, --output)
    #[arg(short = 'o', long, default_value = "listings-export.csv")]
    output: PathBuf,

    /// Listing store (-d, --store)
    #[arg(short = 'd', long, default_value = "listings.csv")]
    store: PathBuf,
}

#[derive(Parser)]
struct ResolveCommand {
    /// Location text as a portal shows it, e.g. "Zabierzów, krakowski"
    location: String,

    #[command(flatten)]
    geo: GeoArgs,
}

#[derive(Parser)]
struct MapCommand {
    /// Listing store (-d, --store)
    #[arg(short = 'd', long, default_value = "listings.csv")]
    store: PathBuf,

    /// Output file path (-o, --output)
    #[arg(short = 'o', long, default_value = "listings-map.html")]
    output: PathBuf,
}

#[derive(Parser)]
struct MigrateCommand {
    /// SQLite listing store (-d, --database)
    #[arg(short = 'd', long, default_value = "listings.db")]
    database: PathBuf,

    /// Roll back this migration version; must be the latest applied (--rollback)
    #[arg(long)]
    rollback: Option<i32>,
}

#[derive(Debug, ValueEnum, Clone)]
enum SortOrder {
    Asc,
    Desc,
}

fn map_renderer() -> MapRenderer {
    MapRenderer::new(ResolverConfig::default().reference, "Kraków")
}

fn remote_path(dir: &str, local: &Path) -> Option<String> {
    let name = local.file_name()?.to_str()?;
    Some(format!("{}/{}", dir.trim_end_matches('/'), name))
}

async fn run(cmd: RunCommand) -> Result<()> {
    let mut profile = match &cmd.profile {
        Some(path) => SourceProfile::load(path)?,
        None => SourceProfile::builtin(cmd.scraper.into()),
    };
    if let Some(hint) = &cmd.geo.county_hint {
        profile.county_hint = Some(hint.clone());
    }

    let cloud = match &cmd.cloud_dir {
        Some(_) => {
            let drive = CloudDrive::from_env()?;
            if drive.is_none() {
                warn!("ONEDRIVE_ACCESS_TOKEN not set, using local files only");
            }
            drive
        }
        None => None,
    };
    if let (Some(drive), Some(dir)) = (&cloud, &cmd.cloud_dir) {
        if let Some(remote) = remote_path(dir, &cmd.store) {
            drive.pull(&remote, &cmd.store).await;
        }
    }

    let store = open_store(&cmd.store).await?;
    let resolver = cmd.geo.build_resolver()?;

    let notifier = if cmd.notify {
        match NotifierConfig::from_env() {
            Some(config) => Some(TelegramNotifier::new(config)?),
            None => {
                warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set, notifications disabled");
                None
            }
        }
    } else {
        None
    };

    let mut cancel = CancelToken::new();
    if let Some(minutes) = cmd.deadline_minutes {
        cancel = cancel.with_deadline(tokio::time::Instant::now() + Duration::from_secs(minutes * 60));
    }
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current page or listing");
            watcher.cancel();
        }
    });

    let scraper = ScraperFactory::from_profile(profile.clone())?;
    let query = ScrapeQuery::new(cmd.url.clone()).with_cancel_token(cancel.clone());
    let raw = scraper.scrape_listing(query, cmd.max_pages).await?;

    let mut pipeline = Pipeline::new(&resolver, store.as_ref()).with_cancel_token(cancel);
    if let Some(notifier) = &notifier {
        pipeline = pipeline.with_notifier(notifier);
    }
    if let Some(hint) = &profile.county_hint {
        pipeline = pipeline.with_county_hint(hint.clone());
    }

    let outcome = pipeline
        .run(&raw, Local::now().date_naive())
        .await
        .with_context(|| format!("Run against {} failed", store.describe()))?;

    if let Some(map_path) = &cmd.map {
        if let Err(e) = map_renderer().write(map_path, &outcome.records) {
            warn!("Could not render map: {}", e);
        }
    }

    if let (Some(drive), Some(dir)) = (&cloud, &cmd.cloud_dir) {
        for local in std::iter::once(&cmd.store).chain(cmd.map.as_ref()) {
            if let Some(remote) = remote_path(dir, local) {
                drive.push(local, &remote).await;
            }
        }
    }

    println!("{}", format!("Run summary for {}", profile.name).bold().green());
    println!("{}", outcome.summary);
    Ok(())
}

async fn list(cmd: ListCommand) -> Result<()> {
    let store = open_store(&cmd.store).await?;
    let mut records = store.load_all().await?;
    if cmd.active_only {
        records.retain(|r| r.active);
    }

    records.sort_by(|a, b| {
        let a = a.distance_km.unwrap_or(f64::MAX);
        let b = b.distance_km.unwrap_or(f64::MAX);
        a.total_cmp(&b)
    });
    if let SortOrder::Desc = cmd.sort_order {
        records.reverse();
    }
    records.truncate(cmd.limit);

    if records.is_empty() {
        println!("{}", "No listings stored".yellow());
        return Ok(());
    }
    println!("{}", create_listing_table(&records));
    Ok(())
}

async fn export(cmd: ExportCommand) -> Result<()> {
    let store = open_store(&cmd.store).await?;
    let records = store.load_all().await?;
    CsvStore::new(&cmd.output).save_all(&records).await?;
    println!(
        "Exported {} listings to {}",
        records.len().to_string().bold(),
        cmd.output.display()
    );
    Ok(())
}

async fn resolve(cmd: ResolveCommand) -> Result<()> {
    let resolver = cmd.geo.build_resolver()?;
    let resolutions = resolver
        .resolve(&cmd.location, cmd.geo.county_hint.as_deref())
        .await;

    if resolutions.is_empty() {
        println!("{}", format!("No location within {} km", cmd.geo.max_distance).yellow());
        return Ok(());
    }
    for resolution in resolutions {
        let Coordinates { lat, lon } = resolution.coordinates;
        println!("{:>8.2} km  {:.5}, {:.5}", resolution.distance_km, lat, lon);
    }
    Ok(())
}

async fn map(cmd: MapCommand) -> Result<()> {
    let store = open_store(&cmd.store).await?;
    let records = store.load_all().await?;
    map_renderer().write(&cmd.output, &records)?;
    println!("Map saved to {}", cmd.output.display());
    Ok(())
}

async fn migrate(cmd: MigrateCommand) -> Result<()> {
    let db = SqliteStore::open(&cmd.database)
        .await
        .with_context(|| format!("Opening {}", cmd.database.display()))?;

    if let Some(version) = cmd.rollback {
        db.rollback(version).await?;
        println!("{}", format!("Rolled back migration {}", version).yellow());
    }

    let versions = db.migration_versions().await?;
    println!("Applied migrations: {:?}", versions);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(cmd) => run(cmd).await?,
        Commands::List(cmd) => list(cmd).await?,
        Commands::Export(cmd) => export(cmd).await?,
        Commands::Resolve(cmd) => resolve(cmd).await?,
        Commands::Map(cmd) => map(cmd).await?,
        Commands::Migrate(cmd) => migrate(cmd).await?,
    }

    Ok(())
}
