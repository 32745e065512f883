//! Console server - hosts the agent-state projection and interrupt surface
//! for a browser, accepts inbound snapshots and forwards edits to the agent.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agent_state::io::agent_client::HttpAgentClient;
use agent_state::io::config::{ConsoleConfig, DEFAULT_CONFIG_PATH, load_config};
use agent_state::io::document::DocumentChannel;
use agent_state::io::local_agent::LocalAgent;
use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::state::{AppState, ConsoleClient};

#[derive(Parser)]
#[command(name = "state-ui")]
#[command(about = "Web console for a data-orchestration agent's shared state")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Console config file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Agent base URL (overrides agent.base_url)
    #[arg(long)]
    agent_url: Option<String>,

    /// JSON file the agent mirrors its document into (overrides snapshot.path)
    #[arg(long)]
    snapshot_file: Option<PathBuf>,

    /// Serve an in-process agent instead of connecting to a remote one
    #[arg(long)]
    local_agent: bool,

    /// Directory containing UI static files (defaults to ./ui/dist)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

impl Args {
    fn console_config(&self) -> anyhow::Result<ConsoleConfig> {
        let mut cfg = load_config(&self.config)?;
        if let Some(url) = &self.agent_url {
            cfg.agent.base_url.clone_from(url);
        }
        if let Some(path) = &self.snapshot_file {
            cfg.snapshot.path = Some(path.clone());
        }
        cfg.validate().context("invalid console configuration")?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("state_ui=info".parse()?)
                .add_directive("agent_state=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let cfg = args.console_config()?;

    let document = DocumentChannel::new();
    let client = if args.local_agent {
        info!("using in-process agent");
        ConsoleClient::Local(LocalAgent::new(document.clone()))
    } else {
        let client = HttpAgentClient::new(&cfg.agent)?;
        info!(agent_url = client.agent_url(), "using remote agent");
        ConsoleClient::Http(client)
    };
    let state = AppState::new(document, client, cfg.events.channel_capacity);

    sse::start_snapshot_pump(state.clone());
    if let Some(path) = cfg.snapshot.path.clone() {
        sse::start_snapshot_watcher(
            state.clone(),
            path,
            Duration::from_millis(cfg.snapshot.poll_interval_ms),
        );
    }

    let api_router = routes::api_router();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", api_router)
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let ui_dir = args
        .ui_dir
        .unwrap_or_else(|| PathBuf::from("ui").join("dist"));

    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            "[agent]\nbase_url = \"http://agent:9000\"\n\n[snapshot]\npoll_interval_ms = 50\n",
        )
        .expect("write config");

        let args = Args::parse_from([
            "state-ui",
            "--config",
            config.to_str().expect("utf8 path"),
            "--agent-url",
            "https://agents.internal",
            "--snapshot-file",
            "state.json",
        ]);
        let cfg = args.console_config().expect("config");
        assert_eq!(cfg.agent.base_url, "https://agents.internal");
        assert_eq!(cfg.snapshot.path, Some(PathBuf::from("state.json")));
        assert_eq!(cfg.snapshot.poll_interval_ms, 50);
    }

    #[test]
    fn invalid_agent_url_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let args = Args::parse_from([
            "state-ui",
            "--config",
            temp.path().join("missing.toml").to_str().expect("utf8 path"),
            "--agent-url",
            "agent:9000",
        ]);
        assert!(args.console_config().is_err());
    }
}
