//! The language-model client against a minimal HTTP server on localhost.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use serde_json::{json, Value};

use tonerig::config::TranslatorConfig;
use tonerig::error::TranslationError;
use tonerig::tone::{validate, OllamaTranslator, ToneTranslator};

struct Recorded {
    request_line: String,
    body: String,
}

struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Serve one canned reply per connection, in order
fn serve(replies: Vec<Reply>) -> (String, Receiver<Recorded>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = unbounded();

    let handle = std::thread::spawn(move || {
        for reply in replies {
            let Ok((stream, _)) = listener.accept() else { return };
            let recorded = read_request(&stream);
            let _ = tx.send(recorded);
            std::thread::sleep(reply.delay);
            let mut stream = stream;
            let _ = write!(
                stream,
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            let _ = stream.flush();
        }
    });
    (url, rx, handle)
}

fn read_request(stream: &TcpStream) -> Recorded {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut content_length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    Recorded {
        request_line: request_line.trim().to_string(),
        body: String::from_utf8(body).unwrap(),
    }
}

fn translator(url: &str, timeout_secs: u64) -> OllamaTranslator {
    OllamaTranslator::new(&TranslatorConfig {
        url: format!("{}/", url),
        model: "gemma3:latest".to_string(),
        timeout_secs,
    })
    .unwrap()
}

#[test]
fn generate_posts_prompt_and_extracts_chain() {
    let text = "Sure! Here is your tone:\n[{\"kind\": \"distortion\", \"parameters\": {\"drive\": 80}}, {\"kind\": \"delay\"}]\nEnjoy.";
    let (url, requests, server) = serve(vec![Reply::ok(json!({ "model": "gemma3:latest", "response": text, "done": true }))]);
    let translator = translator(&url, 5);

    let payload = translator.translate("crunchy lead with slapback").unwrap();
    let recorded = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(recorded.request_line, "POST /api/generate HTTP/1.1");
    let body: Value = serde_json::from_str(&recorded.body).unwrap();
    assert_eq!(body["model"], "gemma3:latest");
    assert_eq!(body["stream"], false);
    assert!(body["prompt"].as_str().unwrap().ends_with("User Request: crunchy lead with slapback\nJSON Response:"));

    assert_eq!(translator.last_raw_response(), text);
    let validated = validate(&payload).unwrap();
    assert_eq!(validated.chain.len(), 2);
    assert_eq!(validated.chain.get(0).unwrap().parameter("drive"), Some(60.0));
    server.join().unwrap();
}

#[test]
fn lists_installed_models() {
    let (url, requests, server) = serve(vec![Reply::ok(json!({
        "models": [{"name": "gemma3:latest"}, {"name": "llama3.2:3b"}]
    }))]);
    let models = translator(&url, 5).list_models().unwrap();
    assert_eq!(models, vec!["gemma3:latest", "llama3.2:3b"]);
    assert_eq!(requests.recv().unwrap().request_line, "GET /api/tags HTTP/1.1");
    server.join().unwrap();
}

#[test]
fn server_errors_are_reported_by_status() {
    let (url, _requests, server) = serve(vec![Reply {
        status: 500,
        body: json!({"error": "model not loaded"}).to_string(),
        delay: Duration::ZERO,
    }]);
    let err = translator(&url, 5).translate("anything").unwrap_err();
    assert_eq!(err, TranslationError::Status(500));
    server.join().unwrap();
}

#[test]
fn prose_without_json_is_malformed() {
    let (url, _requests, server) = serve(vec![Reply::ok(json!({ "response": "I like turtles" }))]);
    let err = translator(&url, 5).translate("anything").unwrap_err();
    assert!(matches!(err, TranslationError::MalformedResponse(_)));
    server.join().unwrap();
}

#[test]
fn slow_service_times_out() {
    let (url, _requests, server) = serve(vec![Reply {
        status: 200,
        body: json!({ "response": "[]" }).to_string(),
        delay: Duration::from_secs(3),
    }]);
    let err = translator(&url, 1).translate("anything").unwrap_err();
    assert_eq!(err, TranslationError::Timeout { secs: 1 });
    server.join().unwrap();
}

#[test]
fn unreachable_service() {
    // bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let translator = translator(&format!("http://127.0.0.1:{}", port), 2);
    assert!(!translator.is_running());
    let err = translator.translate("anything").unwrap_err();
    assert!(matches!(err, TranslationError::Unreachable { .. }));
}

#[test]
fn root_endpoint_reports_running() {
    let (url, requests, server) = serve(vec![Reply::ok(json!("Ollama is running"))]);
    assert!(translator(&url, 5).is_running());
    assert_eq!(requests.recv().unwrap().request_line, "GET / HTTP/1.1");
    server.join().unwrap();
}
