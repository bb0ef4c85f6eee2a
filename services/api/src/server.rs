use crate::cli::ServeArgs;
use crate::infra::{api_state, AppState};
use crate::routes::with_service_routes;
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use kantama::config::{AppConfig, ServerConfig};
use kantama::error::AppError;
use kantama::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config.server, args);
    telemetry::init(&config.telemetry)?;

    let readiness = Arc::new(AtomicBool::new(false));
    let app = build_router(&config, readiness.clone())?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness.store(true, Ordering::Release);
    info!(
        ?config.environment,
        %addr,
        uploads = %config.uploads.directory.display(),
        registry = %config.registry.base_url,
        "kantama leasing api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(drain_on_signal(readiness))
        .await?;
    info!("kantama leasing api stopped");
    Ok(())
}

fn apply_overrides(server: &mut ServerConfig, args: ServeArgs) {
    let ServeArgs { host, port } = args;
    if let Some(host) = host.filter(|host| !host.trim().is_empty()) {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }
}

/// Workflow routes plus /health, /ready and /metrics behind the request metrics layer.
fn build_router(config: &AppConfig, readiness: Arc<AtomicBool>) -> Result<Router, AppError> {
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let ops = AppState {
        readiness,
        metrics: Arc::new(prometheus_handle),
    };

    Ok(with_service_routes(api_state(config)?)
        .layer(Extension(ops))
        .layer(prometheus_layer))
}

/// Resolves on ctrl-c or SIGTERM, after marking the service as not ready.
async fn drain_on_signal(readiness: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }

    readiness.store(false, Ordering::Release);
    info!("draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }

    #[test]
    fn command_line_overrides_the_configured_address() {
        let mut server = configured();
        apply_overrides(
            &mut server,
            ServeArgs {
                host: Some("127.0.0.1".to_string()),
                port: Some(9090),
            },
        );
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 9090);
    }

    #[test]
    fn missing_or_blank_overrides_keep_the_configuration() {
        let mut server = configured();
        apply_overrides(
            &mut server,
            ServeArgs {
                host: Some("  ".to_string()),
                port: None,
            },
        );
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);

        apply_overrides(&mut server, ServeArgs::default());
        assert_eq!(server.host, "0.0.0.0");
    }
}
