//! Natural-language tone requests: the language-model client, the request
//! runner and the validator that turns untrusted payloads into chains.

pub mod request;
pub mod translator;
pub mod validator;

pub use request::{ToneOutcome, ToneRequester};
pub use translator::{build_prompt, extract_payload, OllamaTranslator, ToneTranslator};
pub use validator::{validate, ValidatedChain, ValidationWarning};
