use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sms_optout::backend::HttpOptOutClient;
use sms_optout::config::AppConfig;
use sms_optout::pipeline::{ReplyProcessor, spawn_reply_poller};
use sms_optout::provider::HttpReplyFetcher;
use sms_optout::routes::{ReplyRouteState, reply_routes};
use sms_optout::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing; keep the file writer guard alive until exit.
    let (file_layer, _log_guard) = match &config.service.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sms-optout.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("📵 SMS opt-out v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Provider: {}", config.provider.base_url);
    eprintln!("   Backend: {}", config.backend.base_url);
    eprintln!("   Database: {}", config.service.db_path.display());
    if config.poll.enabled {
        eprintln!(
            "   Polling: every {} min (on backend failure: {:?})",
            config.poll.interval.as_secs() / 60,
            config.poll.on_backend_failure
        );
    } else {
        eprintln!("   Polling: disabled (manual trigger only)");
    }

    // ── Collaborators ────────────────────────────────────────────────────
    let ledger = Arc::new(
        LibSqlBackend::new_local(&config.service.db_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}",
                    config.service.db_path.display()
                )
            })?,
    );
    let fetcher = Arc::new(
        HttpReplyFetcher::new(config.provider.clone()).context("Failed to build provider client")?,
    );
    let backend = Arc::new(
        HttpOptOutClient::new(&config.backend).context("Failed to build opt-out client")?,
    );

    let processor = Arc::new(
        ReplyProcessor::new(fetcher, backend, ledger)
            .with_failure_policy(config.poll.on_backend_failure),
    );

    // ── Poller ───────────────────────────────────────────────────────────
    let poller = spawn_reply_poller(&config.poll, Arc::clone(&processor));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = reply_routes(ReplyRouteState { processor });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.service.port))?;
    tracing::info!(port = config.service.port, "HTTP server started");
    eprintln!(
        "   Manual trigger: http://0.0.0.0:{}/process-sms-replies\n",
        config.service.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(poller) = poller {
        poller.stop();
        poller.join().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
