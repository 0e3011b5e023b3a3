use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use inboxpay_infra::Scheduler;
use inboxpay_infra::external::{GmailClient, OpenRouterClient};
use inboxpay_infra::store::PostgresStore;
use inboxpay_worker::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inboxpay_observability::init_from_env();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;

    let gmail = Arc::new(GmailClient::new(
        settings.google_client_id.clone(),
        settings.google_client_secret.clone(),
    ));
    let mut oracle = OpenRouterClient::new(settings.openrouter_api_key.clone());
    if let Some(model) = &settings.openrouter_model {
        oracle = oracle.with_model(model.clone());
    }

    let grace = settings.pipeline.shutdown_grace;
    let scheduler = Scheduler::new(
        Arc::new(PostgresStore::new(pool.clone())),
        gmail.clone(),
        gmail,
        Arc::new(oracle),
        settings.pipeline,
    );

    let cancel = CancellationToken::new();
    let mut handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        joined = &mut handle => {
            pool.close().await;
            joined.context("scheduler task panicked")?;
            anyhow::bail!("scheduler stopped unexpectedly");
        }
    }

    tracing::info!(grace_secs = grace.as_secs(), "shutting down");
    cancel.cancel();

    match tokio::time::timeout(grace, &mut handle).await {
        Ok(joined) => joined.context("scheduler task panicked")?,
        Err(_) => {
            tracing::warn!("in-flight tick did not finish within the grace period; aborting");
            handle.abort();
        }
    }

    pool.close().await;
    tracing::info!("worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
