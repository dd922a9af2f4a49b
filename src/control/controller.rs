//! The non-real-time side of the engine.
//!
//! A [`Controller`] owns the streaming session, the current chain and the
//! tone requester. Front ends talk to it through the command bus; it turns
//! every edit into a fresh chain, publishes that chain to the running
//! session and records what happened in the event log.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use super::command::{Command, CommandBus, Envelope};
use super::log::{EventLog, LogEntry};
use crate::chain::{EffectChain, Preset};
use crate::engine::{AudioBackend, DeviceBinding, EngineEvent, Session, SessionState, StatsSnapshot, StreamRequest};
use crate::error::{ChainError, Error};
use crate::fx::EffectKind;
use crate::tone::{ToneOutcome, ToneRequester, ToneTranslator};

/// Engine notices that can queue up between controller wakeups
const ENGINE_EVENT_CAPACITY: usize = 64;

/// How often stats are refreshed and retired chains freed when idle
const TICK: Duration = Duration::from_millis(250);

/// What front ends can read without going through the command bus
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub state: SessionState,
    pub binding: Option<DeviceBinding>,
    pub chain: EffectChain,
    pub stats: StatsSnapshot,
    pub superseded: u64,
    /// Tone request still waiting on the language model
    pub pending_tone: Option<u64>,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Stopped,
            binding: None,
            chain: EffectChain::new(),
            stats: StatsSnapshot::default(),
            superseded: 0,
            pending_tone: None,
        }
    }
}

pub struct Controller {
    backend: Box<dyn AudioBackend>,
    request: StreamRequest,
    session: Session,
    chain: EffectChain,
    tones: ToneRequester,
    pending_tone: Option<u64>,
    commands: Receiver<Envelope>,
    tone_outcomes: Receiver<ToneOutcome>,
    engine_events: Receiver<EngineEvent>,
    log: Arc<RwLock<EventLog>>,
    snapshot: Arc<RwLock<ControllerSnapshot>>,
}

impl Controller {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        request: StreamRequest,
        translator: Arc<dyn ToneTranslator>,
        bus: &CommandBus,
        log: Arc<RwLock<EventLog>>,
    ) -> Self {
        let (engine_tx, engine_events) = bounded(ENGINE_EVENT_CAPACITY);
        let (tone_tx, tone_outcomes) = unbounded();
        Self {
            backend,
            request,
            session: Session::new(engine_tx),
            chain: EffectChain::new(),
            tones: ToneRequester::new(translator, tone_tx),
            pending_tone: None,
            commands: bus.receiver(),
            tone_outcomes,
            engine_events,
            log,
            snapshot: Arc::new(RwLock::new(ControllerSnapshot::default())),
        }
    }

    /// Shared, read-only view for front ends
    pub fn snapshot(&self) -> Arc<RwLock<ControllerSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Handle bus traffic until a `Shutdown` command arrives or every
    /// sender is gone. Stops the session on the way out.
    pub fn run(mut self) {
        tracing::info!("controller running");
        while self.poll(TICK) {}
        if self.session.state() != SessionState::Stopped {
            let _ = self.session.stop();
        }
        self.publish_snapshot();
        tracing::info!("controller stopped");
    }

    /// Wait up to `timeout` for one message and handle it. Returns false
    /// once the controller should exit.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        let failures = self.session.device_failures();
        let keep_going = select! {
            recv(self.commands) -> msg => match msg {
                Ok(envelope) => self.handle_envelope(envelope),
                Err(_) => false,
            },
            recv(self.tone_outcomes) -> msg => {
                if let Ok(outcome) = msg {
                    self.handle_tone_outcome(outcome);
                }
                true
            },
            recv(self.engine_events) -> msg => {
                if let Ok(event) = msg {
                    self.handle_engine_event(event);
                }
                true
            },
            recv(failures) -> msg => {
                if let Ok(message) = msg {
                    self.handle_engine_event(EngineEvent::DeviceFailed { message });
                }
                true
            },
            default(timeout) => true,
        };
        self.session.collect_retired();
        self.publish_snapshot();
        keep_going
    }

    fn handle_envelope(&mut self, envelope: Envelope) -> bool {
        let Envelope { command, source, reply } = envelope;
        let shutdown = command == Command::Shutdown;

        self.log.write().push(LogEntry::Command {
            source,
            command: command.clone(),
        });
        let result = self.execute(command).map_err(|e| {
            tracing::warn!(error = %e, ?source, "command failed");
            self.log.write().push(LogEntry::Error { message: e.to_string() });
            e.to_string()
        });
        // readers of the snapshot must see the effect once the reply arrives
        self.publish_snapshot();
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
        !shutdown
    }

    /// Run one command on the controller thread
    pub fn execute(&mut self, command: Command) -> Result<Value, Error> {
        match command {
            Command::Start { input, output } => self.start(input, output),
            Command::Stop => {
                self.session.stop()?;
                Ok(json!({ "state": self.session.state() }))
            }
            Command::Tone { description } => Ok(self.request_tone(description)),
            Command::CancelTone => {
                let cancelled = self.pending_tone.take();
                self.tones.cancel();
                Ok(json!({ "cancelled": cancelled }))
            }
            Command::Reorder { from, to } => {
                let next = self.chain.reorder(from, to)?;
                self.apply(next)
            }
            Command::SetBypass { index, bypassed } => {
                let next = self.chain.set_bypass(index, bypassed)?;
                self.apply(next)
            }
            Command::SetParam { index, name, value } => {
                let next = self.chain.set_parameter(index, &name, value)?;
                self.apply(next)
            }
            Command::AddUnit { kind, index } => {
                let kind = EffectKind::from_name(&kind).ok_or(ChainError::UnknownKind(kind))?;
                let next = self.chain.insert(index.unwrap_or(self.chain.len()), kind)?;
                self.apply(next)
            }
            Command::RemoveUnit { index } => {
                let next = self.chain.remove(index)?;
                self.apply(next)
            }
            Command::LoadPreset { path } => self.load_preset(&path),
            Command::SavePreset { path, name } => {
                let name = name.unwrap_or_else(|| preset_name(&path));
                Preset::new(name.clone(), self.chain.clone()).save(&path)?;
                Ok(json!({ "name": name, "path": path, "units": self.chain.len() }))
            }
            Command::Shutdown => Ok(json!({ "shutdown": true })),
        }
    }

    fn start(&mut self, input: Option<String>, output: Option<String>) -> Result<Value, Error> {
        let mut request = self.request.clone();
        if input.is_some() {
            request.input_device = input;
        }
        if output.is_some() {
            request.output_device = output;
        }
        let binding = self.session.start(self.backend.as_ref(), &request, &self.chain)?;
        Ok(json!({ "state": self.session.state(), "binding": binding }))
    }

    /// Replace the current chain and hand it to the running session
    fn apply(&mut self, next: EffectChain) -> Result<Value, Error> {
        self.chain = next;
        let version = if self.session.is_running() {
            Some(self.session.submit(&self.chain)?)
        } else {
            None
        };
        tracing::debug!(units = self.chain.len(), ?version, "chain updated");
        Ok(json!({ "units": self.chain.len(), "version": version }))
    }

    fn load_preset(&mut self, path: &Path) -> Result<Value, Error> {
        let (preset, warnings) = Preset::load(path)?;
        {
            let mut log = self.log.write();
            for warning in &warnings {
                log.push(LogEntry::Warning {
                    message: warning.to_string(),
                });
            }
        }
        let mut reply = self.apply(preset.chain)?;
        reply["name"] = json!(preset.name);
        reply["warnings"] = json!(warnings);
        Ok(reply)
    }

    fn request_tone(&mut self, description: String) -> Value {
        let request_id = self.tones.request(description.clone());
        self.pending_tone = Some(request_id);
        tracing::info!(request_id, %description, "tone requested");
        self.log.write().push(LogEntry::ToneRequested {
            request_id,
            description,
        });
        json!({ "request_id": request_id })
    }

    fn handle_tone_outcome(&mut self, outcome: ToneOutcome) {
        if !self.tones.is_current(outcome.request_id) {
            return;
        }
        self.pending_tone = None;

        let ToneOutcome {
            request_id,
            description,
            result,
        } = outcome;
        match result {
            Ok(validated) => {
                let units = validated.chain.len();
                let warnings = validated.warnings;
                match self.apply(validated.chain) {
                    Ok(_) => {
                        tracing::info!(request_id, %description, units, warnings = warnings.len(), "tone applied");
                        self.log.write().push(LogEntry::ToneApplied {
                            request_id,
                            units,
                            warnings,
                        });
                    }
                    Err(e) => {
                        self.log.write().push(LogEntry::ToneFailed {
                            request_id,
                            error: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                tracing::warn!(request_id, error = %e, "tone request failed, keeping current chain");
                self.log.write().push(LogEntry::ToneFailed {
                    request_id,
                    error: e.to_string(),
                });
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::ChainAdopted { version, units } => {
                tracing::debug!(version, units, "chain adopted");
            }
            EngineEvent::UnitFaulted { index, unit, kind } => {
                tracing::error!(index, unit = unit.get(), kind = kind.key(), "effect unit faulted, bypassing");
                if let Some(next) = self.chain.bypass_unit(*unit) {
                    self.chain = next;
                }
            }
            EngineEvent::DeviceFailed { message } => {
                tracing::error!(%message, "audio device failed, stopping session");
                if self.session.state() != SessionState::Stopped {
                    let _ = self.session.stop();
                }
            }
        }
        self.log.write().push(LogEntry::Engine { event });
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.state = self.session.state();
        snapshot.binding = self.session.binding().cloned();
        snapshot.chain = self.chain.clone();
        snapshot.stats = self.session.stats();
        snapshot.superseded = self.session.superseded();
        snapshot.pending_tone = self.pending_tone;
    }
}

fn preset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preset".to_string())
}
