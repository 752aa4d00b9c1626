mod chat;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lanchat::{ChannelSink, ChatClient, ClientConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Request timeout applied when the config file leaves it unset.
const CLI_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "lanchat", version, about = "LAN chat client")]
struct Cli {
    /// Path to the config file (default: $LANCHAT_CONFIG or ~/.config/lanchat/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server host, overriding the config file.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port, overriding the config file.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Username to register as (default: config file, then host name).
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Register, print incoming events, and send lines typed as `<to> <message>`.
    Chat {
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Send one message and exit.
    Send {
        /// Recipient username.
        to: String,
        /// Message body.
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lanchat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let session = config.session().context("invalid session settings")?;

    let mut options = config.options();
    options.request_timeout = options.request_timeout.or(Some(CLI_REQUEST_TIMEOUT));

    match cli.command.unwrap_or(Command::Chat { json: false }) {
        Command::Chat { json } => {
            let (sink, events) = ChannelSink::new();
            let client = ChatClient::new(session, options, sink);
            chat::run(&client, events, json).await
        }
        Command::Send { to, message } => {
            let (sink, _events) = ChannelSink::new();
            let client = ChatClient::new(session, options, sink);
            let reply = client
                .send(&to, &message)
                .await
                .with_context(|| format!("failed to send to {to}"))?;
            println!("[Sent to {}] {}", to.trim(), message.trim());
            println!("[Server] {reply}");
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().unwrap_or_else(ClientConfig::config_path);
    let mut config = ClientConfig::load_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    if let Some(host) = &cli.host {
        config.server_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(user) = &cli.user {
        config.username = Some(user.clone());
    }
    config.validate()?;
    Ok(config)
}
