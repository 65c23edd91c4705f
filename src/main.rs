use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatsummary_backend::{
    api::routes::{self, AppState},
    config::Config,
    services::llm_gateway::GeminiClient,
};

#[derive(Parser, Debug)]
#[command(name = "chatsummary-backend", version, about = "Chat transcript store and adherence summarizer")]
struct Cli {
    /// Config file (TOML/YAML/JSON); defaults to ./chatsummary.toml if present
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load config
    let mut config = Config::load_from(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    // Initialize tracing
    let default_filter = format!(
        "chatsummary_backend={level},tower_http={level}",
        level = config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let gateway = Arc::new(GeminiClient::with_timeout(
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
        config.gemini_api_key.clone(),
        config.llm_timeout(),
    ));

    let addr: SocketAddr = config.bind_address().parse()?;
    let chats_dir = config.chats_dir.clone();
    let model = config.gemini_model.clone();
    let reasoner = config.reasoner_address.clone();
    let triple_extractor = config.triple_extractor_address.clone();

    let state = AppState::build(config, gateway);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Chats directory: {}", chats_dir);
    tracing::info!("Gemini model: {}", model);
    tracing::info!(
        "Reasoner: {}",
        reasoner.as_deref().unwrap_or("not configured")
    );
    tracing::info!(
        "Triple extractor: {}",
        triple_extractor.as_deref().unwrap_or("not configured")
    );

    axum::serve(listener, app).await?;

    Ok(())
}
