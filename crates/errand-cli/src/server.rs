//! Backend selection and process lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use errand_core::app::{App, AppBuilder};
use errand_core::impls::{InMemoryKeyStore, InMemoryTaskQueue, MonthlyReport, ReportRequest};
use errand_core::ports::{IdGenerator, KeyStore, SystemClock, TaskQueue, UlidGenerator};
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::http;

/// How long a worker blocks on the queue before checking for shutdown.
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared store and queue the process talks to.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn KeyStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryKeyStore::new()),
            queue: Arc::new(InMemoryTaskQueue::new()),
        }
    }

    /// In-memory without `REDIS_URL`, Redis otherwise.
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        match &settings.redis_url {
            None => Ok(Self::in_memory()),
            Some(url) => connect_redis(url, &settings.queue_name).await,
        }
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str, queue_name: &str) -> anyhow::Result<Backends> {
    use errand_core::impls::{RedisKeyStore, RedisTaskQueue};

    // BRPOP がブロックするので store と queue で接続を分ける
    let store = RedisKeyStore::connect(url)
        .await
        .context("connecting redis key store")?;
    let queue = RedisTaskQueue::connect(url, queue_name)
        .await
        .context("connecting redis task queue")?;
    tracing::info!(queue = queue_name, "using redis backends");
    Ok(Backends {
        store: Arc::new(store),
        queue: Arc::new(queue),
    })
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str, _queue_name: &str) -> anyhow::Result<Backends> {
    anyhow::bail!("REDIS_URL is set but errand was built without the `redis` feature")
}

/// Wire the app from settings: report stub, retry policy and job options.
pub fn build_app(
    settings: &Settings,
    backends: Backends,
    ids: Arc<dyn IdGenerator>,
) -> anyhow::Result<App> {
    let app = AppBuilder::new()
        .store(backends.store)
        .queue(backends.queue)
        .id_generator(ids)
        .register_typed::<ReportRequest, _>(MonthlyReport::new(settings.report_delay))?
        .retry_policy(settings.retry_policy())
        .job_options(settings.job_options())
        .build()?;
    Ok(app)
}

/// Run the roles selected by `settings` until ctrl-c / SIGTERM.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
    let backends = Backends::connect(&settings).await?;
    let app = build_app(&settings, backends, ids.clone())?;

    let workers = settings
        .role
        .runs_workers()
        .then(|| app.spawn_workers(settings.workers, DEQUEUE_TIMEOUT));

    if settings.role.serves_http() {
        let listener = TcpListener::bind(settings.http_addr)
            .await
            .with_context(|| format!("binding {}", settings.http_addr))?;
        tracing::info!(addr = %listener.local_addr()?, role = ?settings.role, "listening");
        axum::serve(listener, http::router(&app, ids))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        tracing::info!(role = ?settings.role, workers = settings.workers, "running workers only");
        shutdown_signal().await;
    }

    if let Some(workers) = workers {
        workers.shutdown_and_join().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown requested");
}
