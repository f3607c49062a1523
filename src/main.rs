use anyhow::Result;
use mcstatus::config::{AppConfig, FetchMode};
use mcstatus::fetcher::{ConfiguredFetcher, DirectFetcher, HttpStatusFetcher};
use mcstatus::registry::{FileRegistry, Registry, StaticRegistry};
use mcstatus::scheduler::StatusMonitor;
use mcstatus::stats_repo::StatsRepo;
use mcstatus::{routes, writer};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

fn build_registry(config: &AppConfig) -> Registry {
    match &config.registry.path {
        Some(path) => {
            tracing::info!(path = %path, "using file registry");
            Registry::File(FileRegistry::new(path))
        }
        None => {
            tracing::info!(
                servers = config.registry.servers.len(),
                "using static registry from config"
            );
            Registry::Static(StaticRegistry::new(config.registry.servers.clone()))
        }
    }
}

fn build_fetcher(config: &AppConfig) -> Result<ConfiguredFetcher> {
    let ping_timeout = Duration::from_secs(config.probe.ping_timeout_secs);
    Ok(match config.monitor.mode {
        FetchMode::Remote => {
            let url = config.monitor.status_url.clone().unwrap_or_default();
            tracing::info!(url = %url, "polling remote status-check service");
            ConfiguredFetcher::Remote(HttpStatusFetcher::new(
                url,
                Duration::from_secs(config.monitor.request_timeout_secs),
            )?)
        }
        FetchMode::Direct => {
            tracing::info!("pinging servers directly");
            ConfiguredFetcher::Direct(DirectFetcher::new(
                ping_timeout,
                config.probe.max_concurrent_pings,
            ))
        }
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = AppConfig::load()?;
    let registry = Arc::new(build_registry(&app_config));
    let fetcher = build_fetcher(&app_config)?;
    let monitor = StatusMonitor::new(
        fetcher,
        registry.clone(),
        app_config.monitor.scheduler_config(),
    );

    let shutdown = CancellationToken::new();
    let mut writer_handle = None;
    let stats_repo = match &app_config.storage {
        Some(storage) => {
            let repo = Arc::new(StatsRepo::connect(&storage.path, storage.retention_days).await?);
            repo.init().await?;
            if storage.prime_on_start {
                let primed = repo.load_latest().await?;
                tracing::info!(servers = primed.len(), "view primed from stored stats");
                monitor.prime(primed)?;
            }
            writer_handle = Some(writer::spawn_stats_writer(
                monitor.handle().subscribe(),
                repo.clone(),
                writer::StatsWriterConfig {
                    prune_interval_secs: storage.prune_interval_secs,
                },
                Arc::new(AtomicU64::new(0)),
                shutdown.clone(),
            ));
            Some(repo)
        }
        None => None,
    };

    monitor.start()?;

    let app = routes::app(routes::AppDeps {
        view: monitor.handle(),
        registry,
        checker: DirectFetcher::new(
            Duration::from_secs(app_config.probe.ping_timeout_secs),
            app_config.probe.max_concurrent_pings,
        ),
        max_check_servers: app_config.probe.max_check_servers,
        stats_repo,
        stale_after: app_config.monitor.stale_after(),
    });
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    if let Some(handle) = monitor.stop() {
        let _ = handle.await;
    }
    shutdown.cancel();
    if let Some(handle) = writer_handle {
        let _ = handle.await;
    }
    Ok(())
}
