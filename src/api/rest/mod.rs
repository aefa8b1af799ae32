use crate::firmware::FirmwareRegistry;
use crate::telemetry::IngestionPipeline;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use log::{info, warn};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;

pub mod error;
pub mod firmware;
pub mod telemetry;

#[derive(Clone)]
pub struct RestApiConfig {
    pub listen_address: SocketAddr,
    pub max_firmware_size: usize,
    pub api_key: String,
    pub pipeline: IngestionPipeline,
    pub registry: Arc<FirmwareRegistry>,
}

pub struct RestApi {
    config: RestApiConfig,
    router: axum::Router,
}

async fn api_key_mw(
    axum::extract::State(state): axum::extract::State<RestApiConfig>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            [("www-authenticate", r#"ApiKey realm="api""#)],
            "missing or invalid x-api-key",
        )
            .into_response()
    };

    let key = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    match key {
        Some(k) if state.api_key == k => next.run(req).await,
        _ => {
            let peer_opt: Option<SocketAddr> = req
                .extensions()
                .get::<axum::extract::ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            if let Some(peer) = peer_opt {
                warn!(
                    "unauthorized access to endpoint \"{}\" from \"{:?}\"",
                    req.uri().path(),
                    peer
                );
            } else {
                warn!("unauthorized access to endpoint \"{}\"", req.uri().path());
            }

            unauthorized()
        }
    }
}

impl RestApi {
    pub fn new(config: RestApiConfig) -> Self {
        // Devices and the operator push through these; everything else is open.
        let protected = axum::Router::new()
            .route(
                "/api/ingest",
                axum::routing::post(telemetry::ingest),
            )
            .route(
                "/api/firmware/upload",
                axum::routing::post(firmware::upload_firmware).route_layer(
                    axum::extract::DefaultBodyLimit::max(config.max_firmware_size),
                ),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                config.clone(),
                api_key_mw,
            ));

        let router = axum::Router::new()
            .route("/", axum::routing::get(welcome_page))
            .route(
                "/api/readings",
                axum::routing::get(telemetry::list_readings),
            )
            .route(
                "/api/readings/latest",
                axum::routing::get(telemetry::latest_reading),
            )
            .route(
                "/api/firmware/check",
                axum::routing::get(firmware::check_firmware),
            )
            .route(
                "/api/firmware/info",
                axum::routing::get(firmware::get_firmware_info),
            )
            .route(
                "/api/firmware/download/{version}",
                axum::routing::get(firmware::download_firmware),
            )
            .merge(protected)
            .with_state(config.clone());
        RestApi { config, router }
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    pub async fn start_blocking(&mut self) -> std::io::Result<()> {
        let tcp = TcpListener::bind(self.config.listen_address).await?;
        info!(
            "HTTP listening on {}:{}",
            self.config.listen_address.ip(),
            self.config.listen_address.port()
        );
        axum::serve(
            tcp,
            self.router
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("CTRL+C received; shutting down");
        })
        .await
    }
}

#[axum::debug_handler]
async fn welcome_page() -> Html<&'static str> {
    Html(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>Battery Monitor</title>
            <style>
                body { font-family: Arial, sans-serif; text-align: center; margin-top: 50px; }
                h1 { color: #004F31; }
            </style>
        </head>
        <body>
            <h1>Battery Monitor backend</h1>
            <p>Devices push telemetry to <code>/api/ingest</code> and poll <code>/api/firmware/check</code> for updates.</p>
        </body>
        </html>
    "#,
    )
}
