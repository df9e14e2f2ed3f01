use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use vedic_origins_api::{
    config::{init_tracing, load_config},
    db,
    events::{process_events, EventSender},
    handlers::{self, health::health_check, AppServices},
    openapi,
    payments::RazorpayGateway,
    services::{orders::OrderService, payment_verification::PaymentVerificationService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        "starting vedic-origins-api v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(db::establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        db::run_migrations(&db_pool).await?;
    }

    let (tx, rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let gateway = Arc::new(RazorpayGateway::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    ));

    let services = AppServices {
        orders: Arc::new(OrderService::new(
            db_pool.clone(),
            gateway,
            event_sender.clone(),
            config.cod_fee_amount(),
        )),
        verification: Arc::new(PaymentVerificationService::new(
            db_pool.clone(),
            config.razorpay_key_secret.clone(),
            event_sender.clone(),
        )),
    };

    let cors = build_cors_layer(&config)?;

    let state = AppState {
        db: db_pool,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = Router::new()
        .route("/", get(|| async { "Vedic Origins API" }))
        .route("/health", get(health_check))
        .nest("/api/v1", handlers::api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Builds the CORS layer from configuration. Explicit origins win; otherwise
/// a permissive layer is allowed only in development or by explicit opt-in.
fn build_cors_layer(config: &vedic_origins_api::config::AppConfig) -> anyhow::Result<CorsLayer> {
    use axum::http::{HeaderValue, Method};

    if let Some(origins) = config.cors_allowed_origins.as_deref() {
        let parsed: Result<Vec<HeaderValue>, _> = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(HeaderValue::from_str)
            .collect();
        let parsed = parsed.map_err(|e| anyhow::anyhow!("invalid CORS origin: {}", e))?;
        return Ok(CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]));
    }

    if config.should_allow_permissive_cors() {
        warn!("no CORS origins configured; falling back to permissive CORS");
        return Ok(CorsLayer::permissive());
    }

    error!("CORS origins must be configured outside development");
    anyhow::bail!("cors_allowed_origins is required outside development")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
