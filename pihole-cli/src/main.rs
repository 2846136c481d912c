//! Pi-hole CLI - command-line front end for the Pi-hole API client
//!
//! Loads configuration, wires a persisted session store into the client and
//! prints the results of each command.

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use pihole_api::{
    ClientConfig, DisableOptions, DomainListEntry, FileSessionStore, PiHoleApi, SessionClient,
    DEFAULT_RECENT_QUERY_COUNT,
};
use pihole_core::{
    default_config_path, init_logging, log_operation_error, log_operation_start,
    log_operation_success, performance::measure_async, LoggingConfig, PiholeConfig, PiholeResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pihole")]
#[command(about = "Control and inspect a Pi-hole from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the Pi-hole is reachable and the password works
    Test,

    /// Show blocking state and today's statistics
    Status {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Enable blocking
    Enable,

    /// Disable blocking, optionally for a limited time
    Disable {
        /// Duration such as 30s, 5m, 1h30m
        #[arg(short, long, conflicts_with = "seconds")]
        duration: Option<String>,

        /// Duration in seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Look up how a domain was last resolved
    Query {
        /// Domain to look up
        domain: String,
    },

    /// List allowed domains
    Allowlist,

    /// List denied domains
    Denylist,

    /// Show the most recent DNS queries
    Recent {
        /// Number of queries to fetch
        #[arg(short = 'n', long, default_value_t = DEFAULT_RECENT_QUERY_COUNT)]
        count: u32,
    },

    /// Forget the cached login session
    Logout,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.command, cli.config.as_deref())?;

    let mut logging_config = LoggingConfig::from(&config.logging);
    if cli.verbose {
        logging_config = logging_config.with_level("debug");
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Pi-hole CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(&config, cli.config, show, init, validate)?,
        command => {
            let api = connect(&config).await?;
            run(&api, command).await?;
        }
    }

    Ok(())
}

/// `config --init` may name a file that does not exist yet
fn load_config(command: &Commands, explicit: Option<&Path>) -> anyhow::Result<PiholeConfig> {
    let creating = matches!(command, Commands::Config { init: true, .. });
    match explicit {
        Some(path) if creating && !path.exists() => {
            let mut config = PiholeConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        _ => PiholeConfig::load(explicit).context("Failed to load configuration"),
    }
}

async fn connect(config: &PiholeConfig) -> PiholeResult<PiHoleApi> {
    config.validate()?;
    let store = Arc::new(FileSessionStore::new(config.session.resolved_cache_dir()));
    let client = SessionClient::new(ClientConfig::from_pihole_config(config), store).await?;
    Ok(PiHoleApi::new(client))
}

async fn run(api: &PiHoleApi, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Test => handle_test(api).await,
        Commands::Status { json } => Ok(handle_status(api, json).await?),
        Commands::Enable => {
            api.enable().await?;
            println!("✅ Blocking enabled");
            Ok(())
        }
        Commands::Disable { duration, seconds } => {
            Ok(handle_disable(api, DisableOptions { duration, seconds }).await?)
        }
        Commands::Query { domain } => Ok(handle_query(api, &domain).await?),
        Commands::Allowlist => {
            print_domain_list("Allowlist", &api.get_allowlist().await?);
            Ok(())
        }
        Commands::Denylist => {
            print_domain_list("Denylist", &api.get_denylist().await?);
            Ok(())
        }
        Commands::Recent { count } => Ok(handle_recent(api, count).await?),
        Commands::Logout => {
            api.session().forget_session().await?;
            println!("👋 Cached session cleared");
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

async fn handle_test(api: &PiHoleApi) -> anyhow::Result<()> {
    println!("🔌 Testing connection to {}", api.session().base_url());
    let result = api.test_connection().await;
    if !result.success {
        let reason = result.error.as_deref().unwrap_or("unknown error");
        println!("❌ Connection failed: {}", reason);
        anyhow::bail!("Connection test failed: {}", reason);
    }
    match result.version {
        Some(version) => println!("✅ Connected (Pi-hole {})", version),
        None => println!("✅ Connected"),
    }
    Ok(())
}

async fn handle_status(api: &PiHoleApi, json: bool) -> PiholeResult<()> {
    log_operation_start!("status");
    let status = match measure_async("get_status", api.get_status()).await {
        Ok(status) => {
            log_operation_success!("status");
            status
        }
        Err(e) => {
            log_operation_error!("status", e);
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let marker = if status.blocking.is_enabled() { "🟢" } else { "🔴" };
    println!("{} Blocking {}", marker, status.blocking);
    println!("   Queries today:    {}", status.dns_queries_today);
    println!(
        "   Blocked today:    {} ({:.1}%)",
        status.ads_blocked_today, status.ads_percentage_today
    );
    println!("   Unique domains:   {}", status.unique_domains);
    println!("   Forwarded/cached: {}/{}", status.queries_forwarded, status.queries_cached);
    println!(
        "   Clients:          {} active, {} seen",
        status.unique_clients, status.clients_ever_seen
    );
    println!("   Gravity domains:  {}", status.gravity.domains_being_blocked);
    if let Some(updated) = format_epoch(status.gravity.last_updated as f64) {
        println!("   Gravity updated:  {}", updated);
    }
    Ok(())
}

async fn handle_disable(api: &PiHoleApi, options: DisableOptions) -> PiholeResult<()> {
    let label = options
        .duration
        .clone()
        .or_else(|| options.seconds.map(|s| format!("{}s", s)));
    api.disable(options).await?;
    match label {
        Some(label) => println!("⏸️  Blocking disabled for {}", label),
        None => println!("⏸️  Blocking disabled until re-enabled"),
    }
    Ok(())
}

async fn handle_query(api: &PiHoleApi, domain: &str) -> PiholeResult<()> {
    let result = api.query_domain(domain).await?;
    println!("🔎 {}", result.domain);
    println!("   Status: {} ({})", result.status, result.reason);
    println!("   Type:   {}", result.query_type);
    println!("   Count:  {}", result.query_count);
    if let Some(seen) = format_epoch(result.last_seen) {
        println!("   Last:   {}", seen);
    }
    Ok(())
}

async fn handle_recent(api: &PiHoleApi, count: u32) -> PiholeResult<()> {
    let queries = api.get_recent_queries(count).await?;
    if queries.is_empty() {
        println!("No queries recorded");
        return Ok(());
    }
    for query in queries {
        println!(
            "{:<20} {:<8} {:<6} {:<16} {}",
            format_epoch(query.timestamp).unwrap_or_default(),
            query.status,
            query.query_type,
            query.client,
            query.domain
        );
    }
    Ok(())
}

fn print_domain_list(title: &str, entries: &[DomainListEntry]) {
    println!("📋 {} ({} entries)", title, entries.len());
    for entry in entries {
        let state = if entry.enabled { "" } else { " [disabled]" };
        if entry.comment.is_empty() {
            println!("   {}{}", entry.domain, state);
        } else {
            println!("   {}{}  # {}", entry.domain, state, entry.comment);
        }
    }
}

fn handle_config(
    config: &PiholeConfig,
    explicit_path: Option<PathBuf>,
    show: bool,
    init: bool,
    validate: bool,
) -> anyhow::Result<()> {
    if init {
        let path = explicit_path.unwrap_or_else(default_config_path);
        if path.exists() {
            anyhow::bail!("Configuration already exists at {:?}", path);
        }
        PiholeConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {:?}", path);
        println!("📝 Set connection.api_token (or PIHOLE_API_TOKEN) before connecting.");
    }

    if show {
        let mut redacted = config.clone();
        if !redacted.connection.api_token.is_empty() {
            redacted.connection.api_token = "<redacted>".to_string();
        }
        println!("📋 Current configuration:");
        println!(
            "{}",
            toml::to_string_pretty(&redacted).context("Failed to render configuration")?
        );
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

fn format_epoch(seconds: f64) -> Option<String> {
    if seconds <= 0.0 {
        return None;
    }
    Utc.timestamp_opt(seconds as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}
