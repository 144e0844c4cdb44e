//! ubisession - command-line access to Ubisoft services.
//!
//! Every command shares the credentials file of the configured account, so
//! tickets acquired by one invocation are reused by the next until they
//! expire.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ubisession_core::auth::parse_expiry;
use ubisession_core::{
    ApiClient, ApiError, Config, CredentialStore, GraphOutcome, RequestOptions, Tier,
    TokenLifecycle,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Command-line access to Ubisoft services
#[derive(Parser)]
#[command(
    name = "ubisession",
    version,
    after_help = "Account: set AUTH_EMAIL and AUTH_PW, or UBI_BASIC_TOKEN.\nLogging: RUST_LOG=debug for verbose output."
)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a resource with the account's tickets
    Fetch(FetchArgs),
    /// Query marketplace details for an item
    Graph {
        /// Item id (defaults to UBI_ITEM_ID)
        item_id: Option<String>,
    },
    /// Show the stored tickets without contacting the service
    Status,
    /// Delete the stored tickets for the configured account
    Logout,
}

#[derive(Args)]
struct FetchArgs {
    /// Resource URL
    url: String,

    /// Ticket to authorize with (primary or secondary)
    #[arg(long, default_value_t = Tier::Secondary, value_parser = Tier::from_str)]
    tier: Tier,

    /// HTTP method (default: GET, or POST with --data)
    #[arg(short = 'X', long, value_parser = parse_method)]
    method: Option<Method>,

    /// JSON request body
    #[arg(short = 'd', long, value_parser = parse_json)]
    data: Option<Value>,

    /// Extra or overriding header as 'Name: Value'
    #[arg(short = 'H', long = "header", value_parser = parse_header, action = ArgAction::Append)]
    headers: Vec<(HeaderName, HeaderValue)>,

    /// Print the raw body without decoding it
    #[arg(long)]
    text: bool,
}

impl FetchArgs {
    fn request_options(&self) -> RequestOptions {
        let method = match &self.method {
            Some(method) => method.clone(),
            None if self.data.is_some() => Method::POST,
            None => Method::GET,
        };
        let mut options = RequestOptions {
            method,
            body: self.data.clone(),
            ..RequestOptions::default()
        };
        for (name, value) in &self.headers {
            options.headers.insert(name.clone(), value.clone());
        }
        options
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    let name = raw.to_ascii_uppercase();
    Method::from_bytes(name.as_bytes()).with_context(|| format!("Invalid HTTP method '{raw}'"))
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Request body is not valid JSON")
}

/// Parse `Name: Value`.
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Header must look like 'Name: Value'");
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name '{}'", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid value for header {}", name.as_str()))?;
    Ok((name, value))
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must be held for the
/// life of the process.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Fetch(fetch) => run_fetch(&config, fetch).await,
        Command::Graph { item_id } => run_graph(&config, item_id).await,
        Command::Status => show_status(&config),
        Command::Logout => logout(&config),
    }
}

/// Build a client whose requests are abandoned on Ctrl-C.
fn open_client(config: &Config) -> Result<ApiClient> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling in-flight request");
            on_interrupt.cancel();
        }
    });

    Ok(ApiClient::new(config)?.with_cancellation(cancel))
}

fn close_client(client: &mut ApiClient) {
    if let Err(e) = client.close() {
        warn!(error = %e, "Failed to persist credentials");
    }
}

async fn run_fetch(config: &Config, args: FetchArgs) -> Result<()> {
    let options = args.request_options();
    let mut client = open_client(config)?;

    let body = if args.text {
        client.fetch_text(&args.url, args.tier, &options).await
    } else {
        client
            .fetch(&args.url, args.tier, &options)
            .await
            .map(|value| pretty(&value))
    };
    close_client(&mut client);

    println!("{}", body?);
    Ok(())
}

async fn run_graph(config: &Config, item_id: Option<String>) -> Result<()> {
    let item_id = item_id
        .or_else(|| config.item_id.clone())
        .context("No item id given and UBI_ITEM_ID is not set")?;

    let mut client = open_client(config)?;
    let outcome = client.fetch_graph(&item_id).await;
    close_client(&mut client);

    match outcome? {
        GraphOutcome::Snapshot(snapshot) => {
            let missing = snapshot.missing_fields();
            if !missing.is_empty() {
                eprintln!("Note: response did not include {}", missing.join(", "));
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        GraphOutcome::RateLimited => bail!("Rate limited by the marketplace, try again later"),
    }
}

fn show_status(config: &Config) -> Result<()> {
    let tickets = TokenLifecycle::new(config)?;
    let creds = tickets.credentials();

    println!("Credentials: {}", tickets.store().path().display());
    println!("State:       {}", tickets.state());
    if !creds.profile_id.is_empty() {
        println!("Profile:     {}", creds.profile_id);
    }
    for tier in [Tier::Primary, Tier::Secondary] {
        let label = format!("{tier}:");
        println!("{label:<12} {}", describe_ticket(creds.ticket(tier), creds.expiry(tier)));
    }
    Ok(())
}

fn describe_ticket(ticket: &str, expiry: &str) -> String {
    if ticket.is_empty() {
        return "none".to_string();
    }
    match parse_expiry(expiry) {
        Some(at) if at > Utc::now() => format!("valid until {}", at.format(TIME_FORMAT)),
        Some(at) => format!("expired at {}", at.format(TIME_FORMAT)),
        None => format!("unreadable expiry '{expiry}'"),
    }
}

fn logout(config: &Config) -> Result<()> {
    let account = config.account.as_ref().ok_or(ApiError::MissingAccount)?;
    let store = CredentialStore::new(config.creds_path(account));
    store.remove()?;
    println!("Removed {}", store.path().display());
    Ok(())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
