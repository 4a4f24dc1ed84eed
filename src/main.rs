//! rtmbot CLI - runs a bot user on the real-time messaging stream.
//!
//! See the `rtmbot` library for the session client itself.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtmbot::env::Environment;
use rtmbot::handshake::HandshakeClient;
use rtmbot::{Config, Event, Session, Verbosity};

/// Reply sent by the echo application.
const ECHO_REPLY: &str = "Ok, message received!";

// CLI
#[derive(Parser)]
#[command(name = "rtmbot")]
#[command(version)]
#[command(about = "Persistent real-time messaging session for a chat bot user")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and answer every user message in its channel
    Run {
        /// Bot token (falls back to RTMBOT_TOKEN / RTMBOT_DEV_TOKEN)
        token: Option<String>,
        /// Log every frame sent and received, including keepalives
        #[arg(long)]
        verbose: bool,
        /// Target environment: dev or prod
        #[arg(long)]
        env: Option<String>,
    },
    /// Perform only the handshake and print the team, bot and roster
    Handshake {
        /// Bot token (falls back to RTMBOT_TOKEN / RTMBOT_DEV_TOKEN)
        token: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

/// Load config and apply the command line on top of it.
fn resolve_config(token: Option<String>, verbose: bool, env: Option<&str>) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(env) = env {
        config.environment = Environment::parse(env);
        config.apply_env_overrides();
    }
    if let Some(token) = token {
        config.token = token;
    }
    if verbose {
        config.verbosity = Verbosity::Verbose;
    }
    Ok(config)
}

fn init_logging(verbosity: Verbosity) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.filter_directive()),
    )
    .format_timestamp_secs()
    .init();
}

async fn run(config: &Config) -> Result<()> {
    let settings = config.session_config()?;
    let mut session = Session::connect(&settings).await?;
    log::info!("Session open on {}", session.info().endpoint);

    loop {
        let event = tokio::select! {
            event = session.receive() => event?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!("Shutting down...");
                break;
            }
        };

        if let Event::Message(message) = &event {
            if !message.is_from_user() {
                continue;
            }
            if let Some(channel) = message.channel.as_deref() {
                session.send(channel, ECHO_REPLY).await?;
            }
        }
    }

    session.shutdown().await?;
    Ok(())
}

async fn handshake(config: &Config) -> Result<()> {
    let settings = config.session_config()?;
    let client = HandshakeClient::new(&settings.api_base_url)?;
    let result = client.start(&settings.credential).await?;

    let summary = serde_json::json!({
        "endpoint": result.endpoint,
        "team": result.team,
        "bot": result.bot,
        "roster": result.roster,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            token,
            verbose,
            env,
        } => {
            let config = resolve_config(token, verbose, env.as_deref())?;
            init_logging(config.verbosity);
            println!("Starting rtmbot v{} ({})", env!("CARGO_PKG_VERSION"), config.environment);
            run(&config).await?;
        }
        Commands::Handshake { token } => {
            let config = resolve_config(token, false, None)?;
            init_logging(config.verbosity);
            handshake(&config).await?;
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
