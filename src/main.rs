// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use elonwallet_backend::{
    api::router,
    auth::{AuthenticationGuard, KeyResolver, LiveKeyResolver, PersistedKeyResolver},
    config::{
        log_format_from_env, Config, ConfigError, KeyResolution, LogFormat, DEFAULT_LOG_FILTER,
    },
    enclave::{DeployerClient, EnclaveClient, EnclaveError},
    mailer::{LogMailer, MailError, Mailer, RelayMailer},
    notification_worker::NotificationWorker,
    state::{AppState, InFlight},
    storage::{Database, StoreError, TransactionScope},
    wallet::ChallengeStore,
};

/// Time in-flight requests get to finish after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build enclave client: {0}")]
    Enclave(#[from] EnclaveError),

    #[error("failed to build mailer: {0}")]
    Mail(#[from] MailError),

    #[error("failed to load TLS certificate: {0}")]
    Tls(std::io::Error),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing(log_format_from_env());

    if let Err(e) = run().await {
        error!(error = %e, "Server stopped with an error");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn run() -> Result<(), StartupError> {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let config = Config::from_env()?;
    let database_path = config.database_path();
    let db = Database::open(&database_path)?;
    info!(path = %database_path.display(), "Database opened");

    // Cancelled on SIGTERM / Ctrl-C, or when a transaction cannot be rolled back.
    let shutdown = CancellationToken::new();
    let transactions = TransactionScope::new(db, shutdown.clone());

    let resolver: Arc<dyn KeyResolver> = match config.key_resolution {
        KeyResolution::Persisted => Arc::new(PersistedKeyResolver),
        KeyResolution::Live => Arc::new(LiveKeyResolver::new(EnclaveClient::new(
            config.key_fetch_timeout,
        )?)),
    };
    info!(strategy = ?config.key_resolution, "Verification key resolution configured");

    let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
        Some(url) => Arc::new(RelayMailer::new(url.clone(), config.email_from.clone())?),
        None => {
            warn!("MAIL_RELAY_URL not set; outgoing mail is only logged");
            Arc::new(LogMailer::new(config.email_from.clone()))
        }
    };

    let state = AppState {
        transactions: transactions.clone(),
        auth: AuthenticationGuard::new(resolver),
        challenges: ChallengeStore::new(),
        deployer: DeployerClient::new(config.deployer_url.as_str())?,
        enclaves: EnclaveClient::new(config.key_fetch_timeout)?,
        mailer: mailer.clone(),
        frontend_url: config.frontend_url.clone(),
        activations: InFlight::new(),
    };

    let worker = NotificationWorker::new(transactions, mailer)
        .with_idle_interval(config.notification_idle);
    let worker_task = tokio::spawn({
        let token = shutdown.child_token();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = worker.run(token).await {
                error!(error = %e, "Notification worker failed; shutting down");
                shutdown.cancel();
            }
        }
    });

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => info!("Shutdown signal received"),
                _ = shutdown.cancelled() => warn!("Shutdown requested internally"),
            }
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let app = router(state);
    let addr = config.bind_address;

    let served = match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .map_err(StartupError::Tls)?;
            info!(%addr, "Elonwallet backend listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            warn!(%addr, "TLS_CERT_PATH/TLS_KEY_PATH not set; listening on plain http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    shutdown.cancel();
    if let Err(e) = worker_task.await {
        error!(error = %e, "Notification worker task panicked");
    }
    info!("Server stopped");

    served.map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
