use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::translator::ToneTranslator;
use super::validator::{validate, ValidatedChain};
use crate::error::ToneError;

/// Result of one tone request, delivered on the outcome channel
#[derive(Debug, Clone)]
pub struct ToneOutcome {
    pub request_id: u64,
    pub description: String,
    pub result: Result<ValidatedChain, ToneError>,
}

/// Runs tone requests off the caller's thread. Only the newest request is
/// ever delivered: issuing a new one, or calling [`ToneRequester::cancel`],
/// makes any in-flight request's result disappear when it arrives.
pub struct ToneRequester {
    translator: Arc<dyn ToneTranslator>,
    generation: Arc<AtomicU64>,
    outcomes: Sender<ToneOutcome>,
}

impl ToneRequester {
    pub fn new(translator: Arc<dyn ToneTranslator>, outcomes: Sender<ToneOutcome>) -> Self {
        Self {
            translator,
            generation: Arc::new(AtomicU64::new(0)),
            outcomes,
        }
    }

    /// Start a request and return its id
    pub fn request(&self, description: impl Into<String>) -> u64 {
        let description = description.into();
        let id = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let translator = Arc::clone(&self.translator);
        let generation = Arc::clone(&self.generation);
        let outcomes = self.outcomes.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("tone-request-{}", id))
            .spawn(move || {
                let result = translator
                    .translate(&description)
                    .map_err(ToneError::from)
                    .and_then(|payload| validate(&payload).map_err(ToneError::from));

                if generation.load(Ordering::Acquire) != id {
                    tracing::debug!(request_id = id, "tone request superseded, result discarded");
                    return;
                }
                let _ = outcomes.send(ToneOutcome {
                    request_id: id,
                    description,
                    result,
                });
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn tone request thread");
        }
        id
    }

    /// Invalidate whatever request is in flight
    pub fn cancel(&self) {
        let superseded = self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(request_id = superseded, "tone request cancelled");
    }

    /// Whether `request_id` is still the request whose result should apply
    pub fn is_current(&self, request_id: u64) -> bool {
        self.generation.load(Ordering::Acquire) == request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TranslationError, ValidationError};
    use crossbeam_channel::unbounded;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Blocks each call until the test releases it
    struct GatedTranslator {
        gates: Mutex<Vec<crossbeam_channel::Receiver<Value>>>,
    }

    impl ToneTranslator for GatedTranslator {
        fn translate(&self, _description: &str) -> Result<Value, TranslationError> {
            let gate = self.gates.lock().unwrap().remove(0);
            gate.recv().map_err(|_| TranslationError::Cancelled)
        }
    }

    #[test]
    fn last_request_wins() {
        let (release_first, first) = unbounded();
        let (release_second, second) = unbounded();
        let translator = Arc::new(GatedTranslator {
            gates: Mutex::new(vec![first, second]),
        });
        let (tx, rx) = unbounded();
        let requester = ToneRequester::new(translator, tx);

        let a = requester.request("bright");
        std::thread::sleep(Duration::from_millis(50));
        let b = requester.request("dark");
        assert!(requester.is_current(b));

        release_first.send(json!([{"kind": "gain"}])).unwrap();
        release_second.send(json!([{"kind": "lowpass"}])).unwrap();

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.request_id, b);
        assert_ne!(outcome.request_id, a);
        assert_eq!(outcome.description, "dark");
        assert_eq!(outcome.result.unwrap().chain.len(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    struct Fixed(Result<Value, TranslationError>);

    impl ToneTranslator for Fixed {
        fn translate(&self, _description: &str) -> Result<Value, TranslationError> {
            self.0.clone()
        }
    }

    #[test]
    fn failures_are_delivered() {
        let (tx, rx) = unbounded();
        let requester = ToneRequester::new(Arc::new(Fixed(Err(TranslationError::Status(500)))), tx.clone());
        requester.request("anything");
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.result.unwrap_err(), ToneError::Translation(TranslationError::Status(500)));

        let requester = ToneRequester::new(Arc::new(Fixed(Ok(json!([{"kind": "kazoo"}])))), tx);
        requester.request("anything");
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            outcome.result.unwrap_err(),
            ToneError::Validation(ValidationError::NoUsableUnits { dropped: 1 })
        );
    }

    #[test]
    fn cancel_discards_in_flight_result() {
        let (release, gate) = unbounded();
        let translator = Arc::new(GatedTranslator {
            gates: Mutex::new(vec![gate]),
        });
        let (tx, rx) = unbounded();
        let requester = ToneRequester::new(translator, tx);

        let id = requester.request("fuzz");
        requester.cancel();
        assert!(!requester.is_current(id));
        release.send(json!([{"kind": "distortion"}])).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
