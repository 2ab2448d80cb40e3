use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod dataset;
mod engine;
mod models;
mod server;
mod session;
mod settings;

#[derive(Debug, Parser)]
#[command(name = "catalyst")]
#[command(about = "Headless AI business data analyst", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:7272")]
        listen: String,
        /// Base URL of the OpenAI-compatible completion endpoint.
        #[arg(long)]
        model_endpoint: Option<String>,
        /// Model identifier sent with every completion request.
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, model_endpoint, model } => {
            let addr: SocketAddr = listen.parse()?;
            let mut client = models::OpenAICompatible::from_env();
            if let Some(endpoint) = model_endpoint {
                client.base_url = endpoint;
            }
            let global = settings::GlobalConfigDefaults {
                default_model: model,
                ..Default::default()
            };
            let state = server::AppState::new(global, Arc::new(client));
            server::serve(addr, state).await?;
        }
    }
    Ok(())
}
