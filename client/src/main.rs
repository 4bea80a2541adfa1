use chat_client::network::Client;
use chat_shared::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let server = args
        .server
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));

    info!("Connecting to: {}", server);
    let client = Client::connect(&server).await?;
    client.run(tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("Shutting down");

    Ok(())
}
