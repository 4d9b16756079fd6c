mod config;
mod llm;
mod logging;
mod relay;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tracing::info;

use crate::config::AppConfig;
use crate::llm::OpenAIClient;
use crate::relay::Relay;
use crate::server::{AppState, build_router, cors_layer};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chat-relay",
    version,
    about = "Streaming chat backend with image generation over an OpenAI-compatible API"
)]
pub struct Cli {
    /// Address to listen on (default 127.0.0.1:8000)
    #[arg(long)]
    listen: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Chat model name
    #[arg(long)]
    model: Option<String>,

    /// Image model name
    #[arg(long)]
    image_model: Option<String>,

    /// API key (set via env OPENAI_API_KEY recommended)
    #[arg(long)]
    api_key: Option<String>,

    /// Log filter (error,warn,info,debug,trace or an EnvFilter directive)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    log_json: bool,

    /// Explicit config file; skips the default search path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(&logging::resolve_level(cli.log_level.as_deref()), cli.log_json)?;

    let cfg = AppConfig::from_cli(&cli)?;
    info!(
        listen=%cfg.listen,
        base_url=%cfg.base_url,
        model=%cfg.model,
        image_model=%cfg.image_model,
        origins=?cfg.allowed_origins,
        "app config"
    );

    let client = OpenAIClient::new(cfg.base_url.clone(), cfg.require_api_key()?)?
        .with_llm_config(cfg.llm.clone())?
        .with_image_model(cfg.image_model.clone());
    let client = Arc::new(client);

    let relay = Relay::new(client.clone(), client, cfg.model.clone())
        .with_system_prompt(cfg.system_prompt.clone());
    let state = AppState {
        relay: Arc::new(relay),
    };
    let app = build_router(state, cors_layer(&cfg.allowed_origins)?);

    server::serve(cfg.listen, app).await
}
