use anyhow::Context;
use astar_core::config::{Config, WarnLevel};
use astar_server::AppState;
use std::path::Path;
use tracing::{info, warn};

pub fn run(config_path: &Path, port: u16) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;

    let warnings = config.validate();
    for w in &warnings {
        warn!("config: {}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("refusing to start: config validation found errors");
    }
    if config.users.is_empty() {
        warn!("no users configured; every login will fail");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::new(config)?;
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("astar auth server → http://localhost:{actual_port}");

        let result = tokio::select! {
            res = astar_server::serve_on(listener, state) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        };
        info!("server stopped");
        result
    })
}
