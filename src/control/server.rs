use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{json, Value};

use super::command::{Command, CommandSender, CommandSource};
use super::controller::ControllerSnapshot;
use super::log::EventLog;
use crate::chain::EffectChain;
use crate::fx::EffectKind;

/// Longest a front end waits for the controller; device negotiation is
/// the slowest thing it does
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Method names understood by [`ControlServer::handle`]
pub const METHODS: &[&str] = &[
    "start",
    "stop",
    "tone",
    "cancel_tone",
    "reorder",
    "set_bypass",
    "set_param",
    "add_unit",
    "remove_unit",
    "load_preset",
    "save_preset",
    "get_state",
    "get_chain",
    "get_events",
    "list_kinds",
    "shutdown",
];

/// Maps named methods with JSON arguments onto controller commands and
/// shared state. Shared by the control socket and the shell.
pub struct ControlServer {
    command_sender: CommandSender,
    event_log: Arc<RwLock<EventLog>>,
    snapshot: Arc<RwLock<ControllerSnapshot>>,
}

impl ControlServer {
    pub fn new(
        command_sender: CommandSender,
        event_log: Arc<RwLock<EventLog>>,
        snapshot: Arc<RwLock<ControllerSnapshot>>,
    ) -> Self {
        Self {
            command_sender,
            event_log,
            snapshot,
        }
    }

    /// Send a command and wrap the reply
    fn dispatch(&self, command: Command, source: CommandSource) -> Value {
        match self.command_sender.request(command, source, REPLY_TIMEOUT) {
            Ok(Value::Object(mut details)) => {
                details.insert("status".to_string(), json!("ok"));
                Value::Object(details)
            }
            Ok(other) => json!({ "status": "ok", "result": other }),
            Err(message) => json!({ "status": "error", "message": message }),
        }
    }

    pub fn handle(&self, method: &str, args: &Value, source: CommandSource) -> Value {
        match self.parse_command(method, args) {
            Ok(Some(command)) => self.dispatch(command, source),
            Ok(None) => match method {
                "get_state" => self.get_state(),
                "get_chain" => self.get_chain(),
                "get_events" => {
                    let since_id = args.get("since_id").and_then(|v| v.as_u64()).unwrap_or(0);
                    self.get_events(since_id)
                }
                "list_kinds" => Self::list_kinds(),
                _ => json!({ "status": "error", "message": format!("Unknown method: {}", method) }),
            },
            Err(message) => json!({ "status": "error", "message": message }),
        }
    }

    /// `None` for read-only methods answered from shared state
    fn parse_command(&self, method: &str, args: &Value) -> Result<Option<Command>, String> {
        let command = match method {
            "start" => Command::Start {
                input: optional_str(args, "input"),
                output: optional_str(args, "output"),
            },
            "stop" => Command::Stop,
            "tone" => Command::Tone {
                description: required_str(args, "description")?,
            },
            "cancel_tone" => Command::CancelTone,
            "reorder" => Command::Reorder {
                from: required_index(args, "from")?,
                to: required_index(args, "to")?,
            },
            "set_bypass" => Command::SetBypass {
                index: required_index(args, "index")?,
                bypassed: args
                    .get("bypassed")
                    .and_then(|v| v.as_bool())
                    .ok_or("'bypassed' must be true or false")?,
            },
            "set_param" => Command::SetParam {
                index: required_index(args, "index")?,
                name: required_str(args, "name")?,
                value: args
                    .get("value")
                    .and_then(|v| v.as_f64())
                    .ok_or("'value' must be a number")?,
            },
            "add_unit" => Command::AddUnit {
                kind: required_str(args, "kind")?,
                index: args.get("index").and_then(|v| v.as_u64()).map(|i| i as usize),
            },
            "remove_unit" => Command::RemoveUnit {
                index: required_index(args, "index")?,
            },
            "load_preset" => Command::LoadPreset {
                path: PathBuf::from(required_str(args, "path")?),
            },
            "save_preset" => Command::SavePreset {
                path: PathBuf::from(required_str(args, "path")?),
                name: optional_str(args, "name"),
            },
            "shutdown" => Command::Shutdown,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Session state, binding and counters
    pub fn get_state(&self) -> Value {
        let snapshot = self.snapshot.read();
        json!({
            "state": snapshot.state,
            "binding": snapshot.binding,
            "units": snapshot.chain.len(),
            "stats": snapshot.stats,
            "superseded": snapshot.superseded,
            "pending_tone": snapshot.pending_tone,
            "latest_event_id": self.event_log.read().latest_id()
        })
    }

    pub fn get_chain(&self) -> Value {
        let snapshot = self.snapshot.read();
        json!({ "units": chain_json(&snapshot.chain) })
    }

    /// Events after `since_id`, oldest first
    pub fn get_events(&self, since_id: u64) -> Value {
        let log = self.event_log.read();
        json!({
            "events": log.events_since(since_id),
            "latest_id": log.latest_id()
        })
    }

    /// The effect palette with every parameter's bounds
    pub fn list_kinds() -> Value {
        let kinds: Vec<Value> = EffectKind::all()
            .into_iter()
            .map(|kind| {
                let params: Vec<Value> = kind
                    .params()
                    .iter()
                    .map(|p| {
                        json!({
                            "key": p.key,
                            "name": p.name,
                            "unit": p.unit.suffix(),
                            "min": p.min,
                            "max": p.max,
                            "default": p.default
                        })
                    })
                    .collect();
                json!({ "kind": kind.key(), "name": kind.name(), "params": params })
            })
            .collect();
        json!({ "kinds": kinds })
    }
}

fn chain_json(chain: &EffectChain) -> Vec<Value> {
    chain
        .units()
        .iter()
        .enumerate()
        .map(|(index, unit)| {
            json!({
                "index": index,
                "id": unit.id(),
                "kind": unit.kind().key(),
                "name": unit.kind().name(),
                "bypassed": unit.is_bypassed(),
                "parameters": unit.parameters()
            })
        })
        .collect()
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn required_str(args: &Value, key: &str) -> Result<String, String> {
    optional_str(args, key).ok_or_else(|| format!("'{}' must be a string", key))
}

fn required_index(args: &Value, key: &str) -> Result<usize, String> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|i| i as usize)
        .ok_or_else(|| format!("'{}' must be a non-negative integer", key))
}
