use crate::events::ControlCommand;
use crate::server::AppState;
use crate::service::BoothService;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upgrade handler for the `/ws` control channel
pub async fn control_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_control_socket(socket, state.service))
}

/// Duplex event loop for one connected collaborator.
///
/// Inbound messages are typed commands dispatched to the service; every
/// event-bus broadcast is forwarded outbound so simultaneous collaborators
/// stay in sync. Disconnecting a collaborator has no effect on device
/// state: losing the control connection does not stop the stream.
async fn run_control_socket(mut socket: WebSocket, service: Arc<BoothService>) {
    let collaborator = Uuid::new_v4();
    info!("Control collaborator {} connected", collaborator);

    let mut events = service.event_bus().subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to serialize {}: {}", event.event_type(), e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Collaborator {} lagged, {} events skipped",
                            collaborator, skipped
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else {
                    break;
                };

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ControlCommand>(&text) {
                            Ok(command) => {
                                debug!("Collaborator {} -> {:?}", collaborator, command);
                                if let Some(reply) = service.handle_command(command).await {
                                    match serde_json::to_string(&reply) {
                                        Ok(json) => {
                                            if socket.send(Message::Text(json)).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(e) => warn!(
                                            "Failed to serialize {}: {}",
                                            reply.event_type(),
                                            e
                                        ),
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(
                                    "Collaborator {} sent unparseable command: {}",
                                    collaborator, e
                                );
                            }
                        }
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    info!("Control collaborator {} disconnected", collaborator);
}
