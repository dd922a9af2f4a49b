//! Whole control stack: socket client -> server -> command bus -> controller.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::RwLock;
use serde_json::{json, Value};

use common::{request, ManualBackend};
use tonerig::control::{start_socket_server, CommandBus, ControlServer, Controller, EventLog};
use tonerig::error::TranslationError;
use tonerig::tone::ToneTranslator;

struct CannedTranslator(Value);

impl ToneTranslator for CannedTranslator {
    fn translate(&self, _description: &str) -> Result<Value, TranslationError> {
        Ok(self.0.clone())
    }
}

struct Client {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    next_id: u64,
}

impl Client {
    fn connect(path: &Path) -> Self {
        let stream = UnixStream::connect(path).unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
            next_id: 1,
        }
    }

    fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        writeln!(self.writer, "{}", request).unwrap();
        self.writer.flush().unwrap();

        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], id);
        response["result"].clone()
    }
}

#[test]
fn edits_and_tone_requests_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("tonerig.sock");
    let preset_path = dir.path().join("crunch.json");

    let bus = CommandBus::new();
    let log = Arc::new(RwLock::new(EventLog::new(100)));
    let backend = ManualBackend::default();
    let processor = Arc::clone(&backend.processor);

    // the controller owns the stream handle, so it is built on its own thread
    let (snapshot_tx, snapshot_rx) = bounded(1);
    let controller_log = Arc::clone(&log);
    let bus_for_controller = bus.clone();
    let controller = std::thread::spawn(move || {
        let translator = Arc::new(CannedTranslator(json!({
            "effects": [
                {"effect": "Compressor", "settings": {"threshold_db": -18}},
                {"effect": "Reverb", "settings": {"room_size": 9}}
            ]
        })));
        let controller = Controller::new(
            Box::new(backend),
            request(128),
            translator,
            &bus_for_controller,
            controller_log,
        );
        snapshot_tx.send(controller.snapshot()).unwrap();
        controller.run();
    });

    let server = Arc::new(ControlServer::new(bus.sender(), log, snapshot_rx.recv().unwrap()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let socket = start_socket_server(server, &socket_path, Arc::clone(&shutdown)).unwrap();
    let mut client = Client::connect(&socket_path);

    let reply = client.call("add_unit", json!({ "kind": "distortion" }));
    assert_eq!(reply["status"], "ok");
    let reply = client.call("add_unit", json!({ "kind": "noise gate", "index": 0 }));
    assert_eq!(reply["units"], 2);
    let reply = client.call("set_param", json!({ "index": 1, "name": "drive", "value": 99 }));
    assert_eq!(reply["status"], "ok");

    let chain = client.call("get_chain", json!({}));
    assert_eq!(chain["units"][0]["kind"], "noise_gate");
    assert_eq!(chain["units"][1]["parameters"]["drive"], 60.0);

    let reply = client.call("remove_unit", json!({ "index": 5 }));
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "unit index 5 out of range (chain has 2 units)");

    let reply = client.call("save_preset", json!({ "path": preset_path }));
    assert_eq!(reply["name"], "crunch");

    let reply = client.call("start", json!({}));
    assert_eq!(reply["state"], "running");
    assert!(processor.lock().unwrap().is_some());

    let reply = client.call("tone", json!({ "description": "squashed and roomy" }));
    assert!(reply["request_id"].as_u64().is_some());

    // wait for the tone to land in the shared chain
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let chain = client.call("get_chain", json!({}));
        if chain["units"][0]["kind"] == "compressor" {
            assert_eq!(chain["units"][0]["parameters"]["threshold"], -18.0);
            assert_eq!(chain["units"][1]["parameters"]["decay"], 3.0);
            break;
        }
        assert!(Instant::now() < deadline, "tone never applied");
        std::thread::sleep(Duration::from_millis(20));
    }

    let events = client.call("get_events", json!({ "since_id": 0 }));
    let types: Vec<&str> = events["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert!(types.contains(&"tone_requested"));
    assert!(types.contains(&"tone_applied"));
    assert!(types.contains(&"error"));

    let reply = client.call("load_preset", json!({ "path": preset_path }));
    assert_eq!(reply["units"], 2);
    let state = client.call("get_state", json!({}));
    assert_eq!(state["state"], "running");

    let reply = client.call("shutdown", json!({}));
    assert_eq!(reply["status"], "ok");
    controller.join().unwrap();
    assert!(processor.lock().unwrap().is_none(), "session stopped on shutdown");

    shutdown.store(true, Ordering::Relaxed);
    socket.join().unwrap();
}
