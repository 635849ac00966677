//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;

/// REST API under `/api`, with the browser UI served for everything else
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.web.static_dir.clone();

    Router::new()
        // Groups
        .route("/api/groups", get(api::list_groups).post(api::create_group))
        .route("/api/groups/tree", get(api::group_tree))
        .route(
            "/api/groups/{id}",
            get(api::get_group)
                .put(api::update_group)
                .delete(api::delete_group),
        )
        .route(
            "/api/groups/{id}/parent-candidates",
            get(api::group_parent_candidates),
        )
        // Device types
        .route(
            "/api/devicetypes",
            get(api::list_device_types).post(api::create_device_type),
        )
        .route(
            "/api/devicetypes/{id}",
            get(api::get_device_type)
                .put(api::update_device_type)
                .delete(api::delete_device_type),
        )
        .route("/api/devicetypes/{id}/devices", get(api::device_type_devices))
        .route("/api/devicetypes/{id}/firmware", get(api::device_type_firmware))
        // Firmware
        .route(
            "/api/firmwares",
            get(api::list_firmware).post(api::create_firmware),
        )
        .route(
            "/api/firmwares/{id}",
            get(api::get_firmware)
                .put(api::update_firmware)
                .delete(api::delete_firmware),
        )
        // Devices
        .route("/api/devices", get(api::list_devices).post(api::create_device))
        .route(
            "/api/devices/{id}",
            get(api::get_device)
                .put(api::update_device)
                .delete(api::delete_device),
        )
        .route("/api/devices/{id}/firmware", put(api::assign_firmware))
        .route("/api/devices/{id}/firmware-history", get(api::firmware_history))
        // Views for the browser UI
        .route("/api/overview", get(api::overview))
        .route("/api/options/groups", get(api::group_options))
        .route("/api/options/firmware", get(api::firmware_options))
        .route("/api/health", get(api::health))
        // Static files - must be fallback for root
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server (HTTP or HTTPS depending on config)
pub async fn run(state: Arc<AppState>, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    let app = router(state);

    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config).await
    } else {
        run_http(app, bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
