use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use community_mailer::clock::{Clock, SystemClock};
use community_mailer::config::Settings;
use community_mailer::email::EmailService;
use community_mailer::postgres::PostgresPool;
use community_mailer::provider::create_provider;
use community_mailer::server::{create_app, AppState};
use community_mailer::store::create_message_store;
use community_mailer::tasks::{ProcessorConfig, QueueProcessor};
use community_mailer::telemetry::init_tracing;
use community_mailer::template::{
    create_template_repository, CacheConfig, RenderCache, TemplateRenderer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    // A durable queue must not silently degrade to memory
    let postgres_pool = if settings.storage.backend == "postgres" {
        Some(
            PostgresPool::new(&settings.database)
                .await
                .context("Failed to connect to PostgreSQL")?,
        )
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = create_message_store(&settings.storage, postgres_pool.as_ref());
    let provider = create_provider(&settings).context("Failed to configure email provider")?;

    let templates =
        create_template_repository(&settings.templates, &settings.storage, postgres_pool.as_ref())
            .await
            .context("Failed to load templates")?;
    let cache = settings
        .templates
        .cache_enabled
        .then(|| RenderCache::new(CacheConfig::from(&settings.templates)));
    let renderer = Arc::new(TemplateRenderer::new(templates, cache));

    let email_service = Arc::new(EmailService::new(
        store.clone(),
        renderer,
        clock.clone(),
        settings.email.clone(),
        settings.queue.max_retry_attempts,
    ));
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start queue processor in background
    let processor = QueueProcessor::new(
        store,
        provider.clone(),
        clock,
        ProcessorConfig::from(&settings.queue),
    );
    let processor_shutdown = shutdown_tx.subscribe();
    let processor_handle = tokio::spawn(async move {
        processor.run(processor_shutdown).await;
    });

    // Create Axum app
    let mut state = AppState::new(settings.clone(), email_service, provider.name());
    if let Some(pool) = &postgres_pool {
        state = state.with_postgres(pool.clone());
    }
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for queue processor to finish...");
    if let Err(e) = processor_handle.await {
        tracing::error!(error = %e, "Queue processor task failed");
    }

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the queue processor
    let _ = shutdown_tx.send(());
}
