use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sim::{FrameSnapshot, SimCommand};
use crate::vehicle::ControlsSnapshot;

/// Everything the socket tasks and the frame loop share.
///
/// All connected clients drive the same car: the last controls message wins
/// and commands are applied in arrival order at the start of the next frame.
pub struct SharedState {
    pub tick: u64,
    clients: HashMap<Uuid, UnboundedSender<String>>,
    controls: ControlsSnapshot,
    commands: VecDeque<SimCommand>,
}

#[derive(Serialize)]
struct FrameMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    frame: &'a FrameSnapshot,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            controls: ControlsSnapshot::IDLE,
            commands: VecDeque::new(),
        }
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        id
    }

    /// Drops the client. Once nobody is connected the car coasts.
    pub fn remove_client(&mut self, id: &Uuid) {
        self.clients.remove(id);
        if self.clients.is_empty() {
            self.controls = ControlsSnapshot::IDLE;
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn set_controls(&mut self, controls: ControlsSnapshot) {
        self.controls = controls;
    }

    pub fn controls(&self) -> ControlsSnapshot {
        self.controls
    }

    pub fn push_command(&mut self, command: SimCommand) {
        self.commands.push_back(command);
    }

    pub fn drain_commands(&mut self) -> Vec<SimCommand> {
        self.commands.drain(..).collect()
    }

    /// Sends the frame to every client; closed channels are pruned.
    pub fn broadcast_snapshot(&mut self, frame: &FrameSnapshot) {
        if self.clients.is_empty() {
            return;
        }
        let json = match serde_json::to_string(&FrameMessage {
            kind: "frame",
            frame,
        }) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize frame {}: {}", frame.tick, e);
                return;
            }
        };

        self.clients.retain(|id, tx| {
            let alive = tx.send(json.clone()).is_ok();
            if !alive {
                debug!("Pruning closed client {}", id);
            }
            alive
        });
    }
}
