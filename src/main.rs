//! Threat monitor service entrypoint.
//! Boots the Axum HTTP server and the periodic monitoring scan, and stops the
//! scan job when the server shuts down.

use std::net::SocketAddr;

use axum::Router;
use shuttle_axum::AxumService;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use threat_monitor::config::MonitorConfig;
use threat_monitor::metrics::Metrics;
use threat_monitor::scheduler::{JobHandle, PeriodicJob, Scheduler};
use threat_monitor::Service;

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
/// The runtime may already have installed a subscriber, in which case ours
/// is skipped.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("threat_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// HTTP server plus the background scan job. When the server stops, the job
/// is cancelled and awaited before the process exits.
struct MonitorService {
    router: Router,
    scheduler: Scheduler,
    scan_job: JobHandle,
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for MonitorService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let http = AxumService(self.router);
        let served = tokio::select! {
            r = shuttle_runtime::Service::bind(http, addr) => r,
            _ = shutdown_signal() => Ok(()),
        };

        tracing::info!(job = self.scan_job.name(), "stopping background jobs");
        self.scheduler.shutdown();
        self.scan_job.shutdown().await;
        served
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
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
    tracing::info!("shutdown signal received");
}

#[shuttle_runtime::main]
async fn monitor() -> Result<MonitorService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = MonitorConfig::load()?;
    let metrics = Metrics::init()?;
    let service = Service::from_config(&cfg).await?;

    let scheduler = Scheduler::new();
    let scan = service.scan.clone();
    let scan_job = scheduler.spawn(
        PeriodicJob::new("monitoring_scan", cfg.scan_interval()),
        move || {
            let scan = scan.clone();
            async move {
                scan.run_cycle().await;
            }
        },
    );

    tracing::info!(
        every_min = cfg.scan_interval_minutes,
        "monitoring scan scheduled"
    );

    Ok(MonitorService {
        router: service.router().merge(metrics.router()),
        scheduler,
        scan_job,
    })
}
