use anyhow::Context;
use autodm_core::classifier::classify_detailed;
use autodm_core::config::AppConfig;
use autodm_core::secrets::mask_secret;
use autodm_core::service::AutoReplyService;
use autodm_function::{FunctionEvent, FunctionHandler, FunctionResponse};
use autodm_instagram::GraphClient;
use autodm_server::gateway::Gateway;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "autodm")]
#[command(version = VERSION)]
#[command(about = "Instagram DM auto-reply webhook service")]
struct Cli {
    /// Config file (TOML or JSON). Defaults to ~/.autodm/config.toml when present.
    #[arg(short, long, global = true, env = "AUTODM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP webhook server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Start even if the access token or account id is missing
        #[arg(long)]
        skip_validation: bool,
    },
    /// Handle function invocation events: one JSON event per stdin line,
    /// one JSON response per stdout line
    Invoke {
        #[arg(long)]
        skip_validation: bool,
    },
    /// Show the category and reply for a message without sending anything
    Classify {
        text: String,
        #[arg(short, long)]
        brand: Option<String>,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".autodm/config.toml"))
        .filter(|path| path.exists())
}

fn load_config(custom: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = custom.map(Path::to_path_buf).or_else(default_config_path);
    AppConfig::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("Failed to load config from {}", p.display()),
        None => "Failed to load config from environment".to_string(),
    })
}

/// Stdout (or stderr, when stdout carries data) for everything except the
/// `audit` target, which goes to a daily-rolling JSONL file if configured.
fn init_logging(
    audit_dir: Option<&Path>,
    log_to_stderr: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let stdout_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let console_layer = if log_to_stderr {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .boxed()
    };
    let console_layer = console_layer
        .with_filter(stdout_filter)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "audit"
        }));

    let (audit_layer, guard) = match audit_dir {
        Some(dir) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::daily(dir, "audit.jsonl"),
            );
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_level(false)
                .with_file(false)
                .with_line_number(false)
                .without_time() // Timestamp is in JSON
                .with_filter(
                    tracing_subscriber::filter::Targets::new().with_target("audit", Level::INFO),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(audit_layer)
        .init();

    guard
}

fn check_config(config: &AppConfig, skip_validation: bool) -> anyhow::Result<()> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(e) if skip_validation => {
            warn!("Configuration incomplete ({}); outbound replies will fail", e);
            Ok(())
        }
        Err(e) => Err(e).context("Invalid configuration (use --skip-validation for local testing)"),
    }
}

fn build_service(config: AppConfig) -> anyhow::Result<Arc<AutoReplyService>> {
    let sender = GraphClient::from_config(&config).context("Failed to build Instagram client")?;
    Ok(Arc::new(AutoReplyService::new(config, Arc::new(sender))))
}

fn log_startup(config: &AppConfig) {
    info!("Brand:          {}", config.brand_name);
    info!("Instagram ID:   {}", config.account_id);
    info!("API version:    {}", config.api_version);
    info!("Messages API:   {}", config.messages_endpoint());
    info!("Access token:   {}", mask_secret(&config.access_token));
    info!("Verify token:   {}", mask_secret(&config.verify_token));
    info!(
        "Signature check: {}",
        if config.app_secret.as_deref().is_some_and(|s| !s.is_empty()) {
            "enabled"
        } else {
            "disabled"
        }
    );
}

async fn run_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    skip_validation: bool,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    check_config(&config, skip_validation)?;
    log_startup(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let service = build_service(config)?;
    Gateway::new(service, addr).start().await
}

async fn run_invoke(config: AppConfig, skip_validation: bool) -> anyhow::Result<()> {
    check_config(&config, skip_validation)?;
    let handler = FunctionHandler::new(build_service(config)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<FunctionEvent>(&line) {
            Ok(event) => handler.handle(event).await,
            Err(e) => {
                error!("Invalid invocation event: {}", e);
                FunctionResponse::json(400, &json!({ "error": e.to_string() }))
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { text, brand } => {
            let brand = match brand {
                Some(b) => b,
                None => load_config(cli.config.as_deref())
                    .map(|c| c.brand_name)
                    .unwrap_or_else(|_| autodm_core::config::DEFAULT_BRAND_NAME.to_string()),
            };
            let result = classify_detailed(&text, &brand);
            println!("category: {}", result.category);
            println!("reply:    {}", result.reply);
            Ok(())
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            if let Err(e) = config.validate() {
                eprintln!("warning: {}", e);
            }
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            skip_validation,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let _guard = init_logging(config.audit_log_dir.as_deref(), false);
            info!("autodm {} starting", VERSION);
            run_serve(config, host, port, skip_validation).await
        }
        Commands::Invoke { skip_validation } => {
            let config = load_config(cli.config.as_deref())?;
            let _guard = init_logging(config.audit_log_dir.as_deref(), true);
            run_invoke(config, skip_validation).await
        }
    }
}
