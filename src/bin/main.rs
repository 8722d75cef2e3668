use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use quote_vault::{AppConfig, DEFAULT_BIND, TokenCodec, TokenConfig, resolve_config_path};

#[derive(Parser)]
#[command(name = "quote-vault")]
#[command(about = "Stateless bearer-token authentication service")]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JWT signing secret (raw, or `base64:<...>`), at least 32 bytes
    #[arg(long, global = true, env = "QUOTE_VAULT_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
    /// Token lifetime in seconds
    #[arg(long, global = true, env = "QUOTE_VAULT_TOKEN_TTL_SECONDS")]
    token_ttl_seconds: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Server {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print a token for a username, signed with the configured key
    IssueToken {
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("quote_vault=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Server { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            info!("Starting quote vault on {}", config.bind);
            quote_vault::server::serve(config).await?;
        }
        Commands::IssueToken { username } => {
            let codec = TokenCodec::from_config(&config.jwt)?;
            let token = codec.sign(&username)?;
            info!(
                username = %username,
                lifetime_seconds = codec.lifetime().num_seconds(),
                "Issued token"
            );
            println!("{}", token);
        }
    }

    Ok(())
}

/// Merge the config file (if any) with CLI/env overrides.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match resolve_config_path(cli.config.clone()) {
        Some(path) => {
            info!("Loading config from {}", path.display());
            AppConfig::from_file(&path)?
        }
        None => AppConfig {
            bind: DEFAULT_BIND.to_string(),
            jwt: TokenConfig::new(String::new()),
        },
    };

    if let Some(secret) = &cli.jwt_secret {
        config.jwt.secret = secret.clone();
    }
    if let Some(ttl) = cli.token_ttl_seconds {
        config.jwt.lifetime_seconds = ttl;
    }

    // Fail fast on a missing or weak secret.
    config.jwt.signing_key()?;
    config.jwt.lifetime()?;

    Ok(config)
}
