use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Shell,
    Socket,
    Cli,
}

/// Everything a front end can ask the controller to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    // Session
    Start {
        input: Option<String>,
        output: Option<String>,
    },
    Stop,

    // Tone requests
    Tone {
        description: String,
    },
    CancelTone,

    // Chain edits
    Reorder {
        from: usize,
        to: usize,
    },
    SetBypass {
        index: usize,
        bypassed: bool,
    },
    SetParam {
        index: usize,
        name: String,
        value: f64,
    },
    AddUnit {
        kind: String,
        index: Option<usize>,
    },
    RemoveUnit {
        index: usize,
    },

    // Presets
    LoadPreset {
        path: PathBuf,
    },
    SavePreset {
        path: PathBuf,
        name: Option<String>,
    },

    Shutdown,
}

/// Reply to a command: JSON details on success, a message on failure
pub type CommandReply = Result<Value, String>;

/// A command in flight on the bus
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    pub source: CommandSource,
    pub reply: Option<Sender<CommandReply>>,
}

/// Central command bus between front ends and the controller
#[derive(Clone)]
pub struct CommandBus {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl CommandBus {
    pub fn new() -> Self {
        let (tx, rx) = bounded(256);
        Self { tx, rx }
    }

    /// Get a sender that can be cloned and shared
    pub fn sender(&self) -> CommandSender {
        CommandSender { tx: self.tx.clone() }
    }

    pub(crate) fn receiver(&self) -> Receiver<Envelope> {
        self.rx.clone()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Envelope>,
}

impl CommandSender {
    /// Fire and forget (non-blocking, drops if buffer full)
    pub fn send(&self, command: Command, source: CommandSource) -> bool {
        let envelope = Envelope {
            command,
            source,
            reply: None,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("command buffer full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Send and wait up to `timeout` for the controller's reply
    pub fn request(&self, command: Command, source: CommandSource, timeout: Duration) -> CommandReply {
        let (reply_tx, reply_rx) = bounded(1);
        let envelope = Envelope {
            command,
            source,
            reply: Some(reply_tx),
        };
        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err("controller busy, command dropped".to_string()),
            Err(TrySendError::Disconnected(_)) => return Err("controller is not running".to_string()),
        }
        reply_rx
            .recv_timeout(timeout)
            .map_err(|_| "controller did not reply in time".to_string())?
    }
}
