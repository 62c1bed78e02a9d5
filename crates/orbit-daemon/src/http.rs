use crate::core::CoreEvent;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use orbit_proto::protocol::{Command, DisplayState};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    display_rx: watch::Receiver<DisplayState>,
    event_tx: mpsc::Sender<CoreEvent>,
}

fn router(display_rx: watch::Receiver<DisplayState>, event_tx: mpsc::Sender<CoreEvent>) -> Router {
    let app_state = HttpState {
        display_rx,
        event_tx,
    };

    // Permissive CORS so a page on another origin can embed the widget.
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/gesture", post(gesture))
        .route("/api/toggle", post(toggle))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    display_rx: watch::Receiver<DisplayState>,
    event_tx: mpsc::Sender<CoreEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(display_rx, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<DisplayState> {
    Json(state.display_rx.borrow().clone())
}

async fn gesture(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: gesture");
    send_command(&state, Command::Gesture).await
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: toggle");
    send_command(&state, Command::Toggle).await
}

async fn send_command(state: &HttpState, cmd: Command) -> StatusCode {
    if state.event_tx.send(CoreEvent::ClientCommand(cmd)).await.is_err() {
        error!("Failed to forward command to player core");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}
