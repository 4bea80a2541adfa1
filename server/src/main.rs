use chat_server::config::{Framing, ServerConfig};
use chat_server::network::{self, Server};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with server settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Hours a banned session stays muted
    #[arg(long)]
    ban_hours: Option<u64>,

    /// How received bytes are split into messages
    #[arg(long, value_enum)]
    framing: Option<Framing>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(hours) = self.ban_hours {
            config.ban_duration_hours = hours;
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    info!("Starting chat server with {:?}", config);

    let server = Server::bind(&config).await?;
    let registry = server.registry();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    network::shutdown(&registry).await;
    // Give writer tasks a moment to flush the farewell before the runtime goes away.
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
