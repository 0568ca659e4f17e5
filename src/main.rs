use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use pulse_check::config::AppConfig;
use pulse_check::context::Context;
use pulse_check::error::CancelCause;
use pulse_check::jobs::Services;
use pulse_check::scheduler::CronJob;
use pulse_check::server;

/// How long scheduled and in-flight runs get to wind down after a signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Logs go through a background writer; the guard flushes it on exit.
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(writer)
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let services = Services::from_config(&config).context("failed to build platform clients")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        pool_size = config.scheduler.pool_size,
        "Pulse Check starting"
    );

    let root = Context::new();

    // ── Scheduler ─────────────────────────────────────────────────────────
    let batch = Arc::new(services.scheduled_batch(config.scheduler.pool_size));
    let cron = CronJob::new(&config.scheduler, batch).spawn(root.clone());

    // ── HTTP server ───────────────────────────────────────────────────────
    let listener = server::bind(config.server.port).await?;
    let app = server::routes(services, root.clone(), config.server.request_timeout);
    let http = tokio::spawn(server::serve(listener, app, root.clone()));

    let signal = shutdown_signal().await;
    tracing::info!(signal, "Shutdown requested, waiting for running work");
    root.cancel(CancelCause::Shutdown {
        signal: signal.to_string(),
    });

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        if let Err(e) = cron.await {
            tracing::error!(error = %e, "Cron job ended abnormally");
        }
        match http.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server ended abnormally"),
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "Shutdown timed out");
    }
    tracing::info!("Pulse Check stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM and return its name.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}
