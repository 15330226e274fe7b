use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::sim::SimCommand;
use crate::state::SharedState;
use crate::vehicle::ControlsSnapshot;

/// Messages a client may send.
///
/// ```json
/// {"type":"controls","forward":true,"left":true}
/// {"type":"command","command":"set_weather","weather":"rain"}
/// {"type":"ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Controls(ControlsSnapshot),
    Command(SimCommand),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome { client_id: Uuid },
    Pong,
}

impl ServerMessage {
    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Accept loop. Each connection gets its own task; a failed handshake only
/// drops that connection.
pub async fn serve(
    listener: TcpListener,
    state: Arc<Mutex<SharedState>>,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket listening on ws://{}", addr);
    }

    loop {
        let (raw, peer) = listener.accept().await.map_err(ServerError::Accept)?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(raw, peer, state).await {
                warn!("Connection {} failed: {}", peer, e);
            }
        });
    }
}

/// Outcome of the joined accept-loop task. A panic is a failure, never a
/// clean shutdown.
pub fn server_exit(joined: Result<Result<(), ServerError>, JoinError>) -> Result<(), ServerError> {
    joined.map_err(ServerError::Task)?
}

async fn handle_connection(
    raw: TcpStream,
    peer: SocketAddr,
    state: Arc<Mutex<SharedState>>,
) -> Result<(), ServerError> {
    let ws = accept_async(raw).await?;
    let (mut write, mut read) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client_id = state.lock().await.register_client(tx.clone());
    info!("Client connected: {} ({})", client_id, peer);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    if let Some(welcome) = (ServerMessage::Welcome { client_id }).to_json() {
        let _ = tx.send(welcome);
    }

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!("Client {} read error: {}", client_id, e);
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => {
                if let Some(pong) = ServerMessage::Pong.to_json() {
                    let _ = tx.send(pong);
                }
            }
            Ok(ClientMessage::Controls(controls)) => state.lock().await.set_controls(controls),
            Ok(ClientMessage::Command(command)) => state.lock().await.push_command(command),
            Err(e) => debug!("Ignoring message from {}: {}", client_id, e),
        }
    }

    info!("Client disconnected: {}", client_id);
    state.lock().await.remove_client(&client_id);
    Ok(())
}
