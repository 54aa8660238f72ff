use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vision_queue_worker::{
    app_state::AppState,
    config::AppConfig,
    routes::{self, InspectState},
    worker::{pool::WorkerPool, WorkerSettings},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting image analysis worker pool");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Metrics are only exported when the inspection server is enabled
    let prometheus_handle = config.http_bind_addr.as_ref().map(|_| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus metrics recorder");
        describe_metrics();
        Arc::new(handle)
    });

    // Initialize capabilities and queue clients
    tracing::info!(
        queue = %config.queue_base_url,
        classifier = %config.classifier_url,
        detector = %config.detector_url,
        "Initializing services"
    );
    let state = AppState::from_config(&config).expect("Failed to initialize services");

    let settings = WorkerSettings {
        backoff: config.backoff(),
    };
    let pool = WorkerPool::start(config.worker_count, state.clone(), settings);
    let monitor = pool.monitor();

    if let Some(bind_addr) = &config.http_bind_addr {
        let app = routes::router(
            InspectState {
                pipeline: state.pipeline.clone(),
                annotator: state.annotator.clone(),
                monitor: monitor.clone(),
            },
            prometheus_handle,
        );

        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .expect("Failed to bind inspection server address");
        tracing::info!("Inspection server listening on {}", bind_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Inspection server error");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining workers");
        }
        _ = monitor.drained() => {
            tracing::error!("No workers remain running");
        }
    }

    let report = pool.stop().await;
    if !report.is_clean() {
        tracing::error!(
            init_failures = report.init_failures(),
            crashes = report.crashes(),
            "Worker pool exited with failures"
        );
        std::process::exit(1);
    }
}

fn describe_metrics() {
    metrics::describe_counter!("worker_jobs_fetched_total", "Jobs received from the queue");
    metrics::describe_counter!(
        "worker_jobs_completed_total",
        "Jobs whose result was accepted by the queue"
    );
    metrics::describe_counter!(
        "worker_jobs_dropped_total",
        "Jobs dropped after a failure, by kind"
    );
    metrics::describe_counter!("queue_fetch_empty_total", "Polls that found no pending job");
    metrics::describe_counter!(
        "queue_fetch_malformed_total",
        "Polls that returned incomplete or undecodable job data"
    );
    metrics::describe_counter!("queue_fetch_errors_total", "Polls that failed in transport");
    metrics::describe_histogram!(
        "worker_job_processing_seconds",
        "Time from fetch to result assembly for one job"
    );
    metrics::describe_gauge!("worker_pool_live_workers", "Workers currently running");
}
