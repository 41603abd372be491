//! 主应用程序入口
//!
//! 加载配置，连接 PostgreSQL 与 Redis，启动 Axum Web API 服务。

use std::sync::Arc;

use application::SystemClock;
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppDependencies, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(database = %config.sanitized_database_url(), "configuration loaded");

    let infrastructure = Infrastructure::connect(&config).await?;

    let state = AppState::new(AppDependencies {
        accounts: infrastructure.accounts,
        rooms: infrastructure.rooms,
        messages: infrastructure.messages,
        history_cache: infrastructure.history_cache,
        password_hasher: infrastructure.password_hasher,
        clock: Arc::new(SystemClock),
        chat: config.chat.clone(),
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;

    tracing::info!(addr = %config.listen_addr(), "chat server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
