use crate::cli::ServeArgs;
use crate::infra::{build_service, load_directory, AppState};
use crate::routes::with_billing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use kos_billing::billing::{SystemClock, TenantDirectory};
use kos_billing::config::AppConfig;
use kos_billing::error::AppError;
use kos_billing::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let directory = load_directory(args.directory.as_deref())?;
    let tenants = directory.tenants().map(|tenants| tenants.len()).unwrap_or_default();
    let clock = Arc::new(SystemClock::new(config.billing.utc_offset()));
    let service = build_service(directory, clock, &config.billing);

    let app = with_billing_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        tenants,
        tier_policy = ?config.billing.tier_policy,
        "kos billing service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
