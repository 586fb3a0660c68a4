use org_service::{
    build_router,
    config::{ServiceConfig, StoreBackend},
    db::{DocumentStore, MemoryStore, MongoStore},
    services::{CasbinAuthorizer, EmailService, HCaptchaVerifier},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ServiceConfig::from_env()?;

    let log_level = init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = config.environment.as_str(),
        "Starting organization service"
    );

    let mut mongo: Option<MongoStore> = None;
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Mongo => {
            let db = MongoStore::connect(&config.store.uri, &config.store.database).await?;
            db.initialize_indexes().await?;
            mongo = Some(db.clone());
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!("Database initialized successfully");

    let authz = Arc::new(CasbinAuthorizer::from_policy_file(&config.policy_path).await?);
    let email = Arc::new(EmailService::new(&config.smtp)?);
    let captcha = Arc::new(HCaptchaVerifier::new(&config.captcha)?);

    let port = config.common.port;
    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = config.environment.as_str(),
    );

    let state = AppState::new(config, store, authz, email, captcha, log_level)?;
    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let _guard = service_span.enter();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(db) = mongo {
        db.shutdown().await;
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
