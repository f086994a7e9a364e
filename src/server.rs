//! ==============================================================================
//! server.rs - kiosk page, display socket and status api
//! ==============================================================================
//!
//! routes:
//!     GET /ws          display websocket (see display.rs for the protocol)
//!     GET /api/state   current phase and displayed texts, as json
//!     GET /*           static kiosk page from the configured directory
//!
//! the socket handler is registered once for the life of the process and
//! dispatches every inbound event to the controller, which decides by its own
//! state whether the event means anything right now.
//!
//! ==============================================================================

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Json, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::controller::SessionController;
use crate::display::{DisplayEvent, DisplayFrame};
use crate::domain::Phase;
use crate::leaderboard::Leaderboard;

#[derive(serde::Serialize)]
pub struct StatusReport {
    pub phase: Phase,
    pub device_id: Option<String>,
    pub nickname: Option<String>,
    /// seconds until the idle watchdog fires
    pub idle_in: Option<u64>,
    pub display_connected: bool,
    pub frame: DisplayFrame,
}

pub fn router<L: Leaderboard>(controller: SessionController<L>, static_dir: &str) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<L>))
        .route("/api/state", get(state_handler::<L>))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(controller)
}

pub async fn run_server<L: Leaderboard>(
    controller: SessionController<L>,
    bind: &str,
    static_dir: &str,
) -> anyhow::Result<()> {
    let app = router(controller, static_dir);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn state_handler<L: Leaderboard>(
    State(controller): State<SessionController<L>>,
) -> Json<StatusReport> {
    let display = controller.display();
    let session = controller.session();
    let idle_in = controller
        .watchdog_deadline()
        .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs());
    Json(StatusReport {
        phase: controller.phase(),
        device_id: session.as_ref().map(|s| s.device_id.clone()),
        nickname: session.and_then(|s| s.candidate_name),
        idle_in,
        display_connected: display.connected().is_some(),
        frame: display.frame(),
    })
}

async fn ws_handler<L: Leaderboard>(
    ws: WebSocketUpgrade,
    State(controller): State<SessionController<L>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, controller))
}

async fn handle_socket<L: Leaderboard>(socket: WebSocket, controller: SessionController<L>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut conn = controller.display().connect();
    let id = conn.id;
    controller.on_display_connected();

    // outgoing: controller texts -> page
    let outgoing = tokio::spawn(async move {
        while let Some(msg) = conn.rx.recv().await {
            let text = msg.to_json().to_string();
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // incoming: page events -> controller
    while let Some(msg) = ws_receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(display = id, error = %e, "display socket error");
                break;
            }
        };

        if !controller.display().is_current(id) {
            tracing::debug!(display = id, "event from replaced display, ignoring");
            continue;
        }

        match DisplayEvent::parse(&text) {
            Some(DisplayEvent::Cancel) => controller.on_cancel(),
            Some(DisplayEvent::NameEntered(submission)) => {
                let controller = controller.clone();
                tokio::spawn(async move { controller.on_name_submitted(submission).await });
            }
            None => {}
        }
    }

    controller.display().disconnect(id);
    outgoing.abort();
}
