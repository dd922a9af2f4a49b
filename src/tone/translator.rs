use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TranslatorConfig;
use crate::error::TranslationError;
use crate::fx::{EffectKind, SCHEMA_VERSION};

/// Turns a tone description into an unvalidated chain payload
pub trait ToneTranslator: Send + Sync {
    fn translate(&self, description: &str) -> Result<Value, TranslationError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama-style `/api/generate` endpoint
pub struct OllamaTranslator {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    timeout_secs: u64,
    last_raw: Mutex<String>,
}

impl OllamaTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self, TranslationError> {
        let url = config.url.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslationError::Unreachable {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            last_raw: Mutex::new(String::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Text of the most recent generate response, for diagnostics
    pub fn last_raw_response(&self) -> String {
        self.last_raw.lock().clone()
    }

    fn map_err(&self, e: reqwest::Error) -> TranslationError {
        if e.is_timeout() {
            TranslationError::Timeout {
                secs: self.timeout_secs,
            }
        } else if let Some(status) = e.status() {
            TranslationError::Status(status.as_u16())
        } else if e.is_decode() {
            TranslationError::MalformedResponse(e.to_string())
        } else {
            TranslationError::Unreachable {
                url: self.url.clone(),
                message: e.to_string(),
            }
        }
    }

    /// Whether the service answers its root endpoint
    pub fn is_running(&self) -> bool {
        match self.client.get(&self.url).timeout(Duration::from_secs(2)).send() {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "language-model service not reachable");
                false
            }
        }
    }

    /// Model names the service has installed
    pub fn list_models(&self) -> Result<Vec<String>, TranslationError> {
        let tags: TagsResponse = self
            .client
            .get(format!("{}/api/tags", self.url))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| self.map_err(e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Raw completion text for a tone description
    pub fn generate(&self, description: &str) -> Result<String, TranslationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(description),
            stream: false,
        };
        tracing::info!(model = %self.model, url = %self.url, "requesting tone");

        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| self.map_err(e))?;

        tracing::debug!(raw = %response.response, "language-model response");
        *self.last_raw.lock() = response.response.clone();
        Ok(response.response)
    }
}

impl ToneTranslator for OllamaTranslator {
    fn translate(&self, description: &str) -> Result<Value, TranslationError> {
        let text = self.generate(description)?;
        extract_payload(&text).ok_or_else(|| {
            let preview: String = text.chars().take(80).collect();
            TranslationError::MalformedResponse(format!("no JSON chain in response: {:?}", preview))
        })
    }
}

/// Prompt listing every kind and its parameters with bounds
pub fn build_prompt(description: &str) -> String {
    let mut catalog = String::new();
    for kind in EffectKind::all() {
        let params: Vec<String> = kind
            .params()
            .iter()
            .map(|p| format!("{} {}..{}{}", p.key, p.min, p.max, p.unit.suffix()))
            .collect();
        catalog.push_str(&format!("- {}({})\n", kind.key(), params.join(", ")));
    }

    format!(
        "You are an expert guitar tone engineer. Convert the user's tone description \
         into a JSON array of effects, in signal order (schema v{}).\n\n\
         Supported effects and parameter ranges:\n{}\n\
         Each element must look like {{\"kind\": \"...\", \"parameters\": {{\"name\": number}}}}.\n\
         Do NOT provide any explanations. Output ONLY the JSON array.\n\n\
         Example Response:\n\
         [{{\"kind\": \"compressor\", \"parameters\": {{\"threshold\": -20, \"ratio\": 4}}}}, \
         {{\"kind\": \"distortion\", \"parameters\": {{\"drive\": 30}}}}]\n\n\
         User Request: {}\nJSON Response:",
        SCHEMA_VERSION, catalog, description
    )
}

/// Find the chain payload in free-form model output: the whole text as
/// JSON, else the outermost `[...]` span, else the outermost `{...}` span.
pub fn extract_payload(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_array() || value.is_object() {
            return Some(value);
        }
    }
    span(text, '[', ']').or_else(|| span(text, '{', '}'))
}

fn span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_from_plain_json() {
        assert_eq!(extract_payload(" [{\"kind\": \"gain\"}] "), Some(json!([{"kind": "gain"}])));
    }

    #[test]
    fn payload_from_chatty_text() {
        let text = "Sure! Here is your tone:\n```json\n[\n  {\"kind\": \"reverb\", \"parameters\": {\"decay\": 2}}\n]\n```\nEnjoy.";
        assert_eq!(
            extract_payload(text),
            Some(json!([{"kind": "reverb", "parameters": {"decay": 2}}]))
        );
    }

    #[test]
    fn payload_from_wrapped_object() {
        let text = "Result: {\"plugins\": [{\"plugin\": \"Delay\"}]} done";
        assert_eq!(extract_payload(text), Some(json!([{"plugin": "Delay"}])));

        let text = "Result: {\"effects\": \"none\"} done";
        assert_eq!(extract_payload(text), Some(json!({"effects": "none"})));
    }

    #[test]
    fn no_payload_in_prose() {
        assert_eq!(extract_payload("I cannot help with that."), None);
        assert_eq!(extract_payload("] backwards ["), None);
        assert_eq!(extract_payload("42"), None);
    }

    #[test]
    fn prompt_lists_the_catalog() {
        let prompt = build_prompt("warm jazz tone");
        for kind in EffectKind::all() {
            assert!(prompt.contains(kind.key()), "{}", kind.key());
        }
        assert!(prompt.contains("decay 0.1..3s"));
        assert!(prompt.ends_with("User Request: warm jazz tone\nJSON Response:"));
    }
}
