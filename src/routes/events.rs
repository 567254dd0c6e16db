use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::{
    error::{AppError, AppResult},
    events::Event,
    middleware::auth::verify_token,
    policy,
    routes::params::EventStreamQuery,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(subscribe))
}

/// Upgrade to a WebSocket that streams the caller's branch group as JSON
/// text frames. Superadmins may name any group, including the branch-0
/// aggregate; everyone else is pinned to their own branch.
#[utoipa::path(
    get,
    path = "/api/events/ws",
    params(
        ("branch_id" = Option<i64>, Query, description = "Group to join, defaults to the caller's branch"),
        ("token" = Option<String>, Query, description = "JWT, since browsers cannot set handshake headers"),
    ),
    responses(
        (status = 101, description = "Switching to WebSocket"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Group not subscribable by caller"),
    ),
    tag = "Events"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let token = query
        .token
        .ok_or_else(|| AppError::Unauthenticated("Access token required".into()))?;
    let user = verify_token(&state.config.jwt_secret, &token)?;

    let branch_id = query.branch_id.unwrap_or(user.branch_id);
    if !policy::can_subscribe(&user, branch_id) {
        return Err(AppError::Forbidden);
    }

    let rx = state.events.subscribe(branch_id);
    tracing::debug!(user_id = user.user_id, branch_id, "event stream opened");

    Ok(ws.on_upgrade(move |socket| run_stream(socket, rx)))
}

async fn run_stream(socket: WebSocket, mut rx: broadcast::Receiver<Event>) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // A slow consumer drops what it missed and keeps going.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Inbound frames, pings included, are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}
