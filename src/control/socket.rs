//! JSON-RPC 2.0 over a Unix domain socket, one request per line.
//!
//! `{"jsonrpc":"2.0","id":1,"method":"set_param","params":{"index":0,"name":"drive","value":30}}`

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{json, Value};

use super::command::CommandSource;
use super::server::ControlServer;

/// Handle a single request line, return the response (or None for notifications)
fn handle_jsonrpc_line(line: &str, server: &ControlServer) -> Option<String> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            let error_response = json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {
                    "code": -32700,
                    "message": format!("Parse error: {}", e)
                }
            });
            return Some(error_response.to_string());
        }
    };

    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(json!({}));

    // requests without an id are notifications: run them, send nothing back
    let Some(id) = request.get("id").cloned() else {
        if super::server::METHODS.contains(&method) {
            server.handle(method, &params, CommandSource::Socket);
        }
        return None;
    };

    let response = if method == "rpc.methods" {
        json!({ "jsonrpc": "2.0", "id": id, "result": super::server::METHODS })
    } else if super::server::METHODS.contains(&method) {
        let result = server.handle(method, &params, CommandSource::Socket);
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    } else {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": -32601,
                "message": format!("Method not found: {}", method)
            }
        })
    };

    Some(response.to_string())
}

/// Handle a single client connection on the socket
fn handle_connection(stream: UnixStream, server: &ControlServer) {
    let reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut writer = stream;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = handle_jsonrpc_line(&line, server) {
            if writeln!(writer, "{}", response).is_err() {
                break;
            }
            if writer.flush().is_err() {
                break;
            }
        }
    }
}

/// Bind `path` and serve connections on a background thread until
/// `shutdown` is set. A stale socket file at `path` is replaced.
pub fn start_socket_server(
    server: Arc<ControlServer>,
    path: &Path,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    // Remove stale socket file
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)?;
    // Non-blocking so we can check the shutdown flag periodically
    listener.set_nonblocking(true)?;
    tracing::info!(path = %path.display(), "control socket listening");

    let path: PathBuf = path.to_path_buf();
    std::thread::Builder::new()
        .name("control-socket".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false).ok();
                        let server = Arc::clone(&server);
                        tracing::debug!("control client connected");
                        std::thread::spawn(move || handle_connection(stream, &server));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "control socket accept failed");
                        break;
                    }
                }
            }
            // Clean up socket file on shutdown
            let _ = std::fs::remove_file(&path);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::command::CommandBus;
    use crate::control::controller::ControllerSnapshot;
    use crate::control::log::EventLog;
    use parking_lot::RwLock;

    fn server() -> (ControlServer, CommandBus) {
        let bus = CommandBus::new();
        let server = ControlServer::new(
            bus.sender(),
            Arc::new(RwLock::new(EventLog::default())),
            Arc::new(RwLock::new(ControllerSnapshot::default())),
        );
        (server, bus)
    }

    fn call(server: &ControlServer, line: &str) -> Value {
        serde_json::from_str(&handle_jsonrpc_line(line, server).unwrap()).unwrap()
    }

    #[test]
    fn parse_errors_are_reported() {
        let (server, _bus) = server();
        let response = call(&server, "{not json");
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }

    #[test]
    fn unknown_methods_are_rejected() {
        let (server, _bus) = server();
        let response = call(&server, r#"{"jsonrpc":"2.0","id":7,"method":"explode"}"#);
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn notifications_get_no_reply() {
        let (server, _bus) = server();
        assert!(handle_jsonrpc_line(r#"{"jsonrpc":"2.0","method":"get_state"}"#, &server).is_none());
    }

    #[test]
    fn serves_requests_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let (server, _bus) = server();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = start_socket_server(Arc::new(server), &path, Arc::clone(&shutdown)).unwrap();

        let stream = UnixStream::connect(&path).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        writeln!(writer, r#"{{"jsonrpc":"2.0","id":1,"method":"list_kinds"}}"#).unwrap();
        writer.flush().unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], 1);
        assert!(response["result"]["kinds"].as_array().unwrap().len() > 10);

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(!path.exists());
    }
}
