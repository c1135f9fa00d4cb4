use errand_cli::Settings;
use errand_core::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let settings = Settings::from_env()?;
    tracing::info!(
        role = ?settings.role,
        redis = settings.redis_url.is_some(),
        workers = settings.workers,
        "starting errand"
    );

    errand_cli::server::run(settings).await
}
