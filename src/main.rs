//! ThreatLens
//!
//! A service for searching, enriching, and monitoring threat indicators.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use threatlens::api::{create_router, AppState};
use threatlens::client::DashboardClient;
use threatlens::collectors::plaintext::default_feeds;
use threatlens::collectors::{run_periodic, DEFAULT_FEED_INTERVAL};
use threatlens::cve_feed::CveFeedClient;
use threatlens::enrichment::geoip::GeoIpClient;
use threatlens::enrichment::neutrino::NeutrinoClient;
use threatlens::lookup::LookupService;
use threatlens::storage::IndicatorStore;

/// ThreatLens
#[derive(Parser, Debug)]
#[command(name = "threatlens")]
#[command(about = "Search, enrich, and monitor threat indicators")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the dashboard API server
    Serve(ServeArgs),
    /// Look up an indicator through a running server
    Lookup(LookupArgs),
    /// Show dashboard statistics from a running server
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Server host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Database URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://threatlens.db?mode=rwc"
    )]
    database_url: String,

    /// Neutrino API user id
    #[arg(long, env = "NEUTRINO_USER_ID")]
    neutrino_user_id: Option<String>,

    /// Neutrino API key
    #[arg(long, env = "NEUTRINO_API_KEY")]
    neutrino_api_key: Option<String>,

    /// Neutrino API base URL
    #[arg(long, env = "NEUTRINO_API_URL", default_value = "https://neutrinoapi.net")]
    neutrino_api_url: Url,

    /// CVE RSS feed URL
    #[arg(
        long,
        env = "CVE_FEED_URL",
        default_value = "https://cvefeed.io/rssfeed/latest.xml"
    )]
    cve_feed_url: Url,

    /// Import the public blocklist feeds on a fixed interval
    #[arg(long, env = "ENABLE_FEEDS", default_value = "false")]
    enable_feeds: bool,

    /// Seconds between feed collection rounds (default 600)
    #[arg(long, env = "FEED_INTERVAL_SECS")]
    feed_interval_secs: Option<u64>,

    /// Run database migrations
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// IP, domain, or email to look up
    query: String,

    /// Dashboard API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    api_url: Url,

    /// GeoIP provider base URL
    #[arg(long, env = "GEOIP_API_URL", default_value = "http://ip-api.com")]
    geoip_api_url: Url,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Dashboard API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    api_url: Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threatlens=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Lookup(args) => lookup(args).await,
        Command::Stats(args) => stats(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting ThreatLens");

    // Connect to database
    let store = IndicatorStore::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        store.migrate().await?;
        tracing::info!("Migrations complete");
    }

    // Live blocklist lookups need provider credentials
    let neutrino = match (args.neutrino_user_id, args.neutrino_api_key) {
        (Some(user_id), Some(api_key)) => {
            tracing::info!("Neutrino live lookups enabled");
            Some(NeutrinoClient::with_base_url(
                args.neutrino_api_url.as_str(),
                user_id,
                api_key,
            ))
        }
        _ => {
            tracing::warn!("Neutrino credentials not set, live lookups disabled");
            None
        }
    };

    // Periodic feed collection
    if args.enable_feeds {
        let every = args
            .feed_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FEED_INTERVAL);
        tracing::info!(every_secs = every.as_secs(), "Feed collection enabled");
        tokio::spawn(run_periodic(default_feeds(), store.clone(), every));
    }

    // Create application state
    let state = Arc::new(AppState {
        store,
        neutrino,
        cve_feed: CveFeedClient::with_feed_url(args.cve_feed_url.as_str()),
        collectors: default_feeds(),
    });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn lookup(args: LookupArgs) -> Result<()> {
    let dashboard = DashboardClient::new(args.api_url.as_str());
    let geoip = GeoIpClient::with_base_url(args.geoip_api_url.as_str());
    let service = LookupService::new(dashboard, geoip);

    let result = service.lookup(&args.query).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn stats(args: StatsArgs) -> Result<()> {
    let dashboard = DashboardClient::new(args.api_url.as_str());

    let (stats, headlines) = tokio::join!(dashboard.dashboard_stats(), dashboard.cve_headlines());

    let report = serde_json::json!({
        "entries": stats.entries,
        "searches": stats.searches,
        "categories": stats.categories,
        "recent_cves": headlines,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
