//! Single-label classification with a deterministic fallback.
//!
//! [`Classifier::classify`] always yields a label. Any failure to obtain one
//! before the deadline (transport error, bad status, malformed or empty reply,
//! timeout) becomes [`FALLBACK_CODE`], and the failure text is kept on the
//! returned [`Classification`] so the caller can record it per item.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::ChatCompletion;

/// Label assigned when no usable answer arrives in time.
pub const FALLBACK_CODE: &str = "o";

/// Label obtained for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    label: String,
    failure: Option<String>,
}

impl Classification {
    fn answered(label: String) -> Self {
        Self {
            label,
            failure: None,
        }
    }

    fn fallback(failure: String) -> Self {
        Self {
            label: FALLBACK_CODE.to_string(),
            failure: Some(failure),
        }
    }

    /// The lower-cased, trimmed label, or `"o"` after a failure. Never empty.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Why the fallback label was used, if it was.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Classifies prompts through a chat-completion backend.
#[derive(Clone)]
pub struct Classifier {
    client: Arc<dyn ChatCompletion>,
}

impl Classifier {
    pub fn new(client: Arc<dyn ChatCompletion>) -> Self {
        Self { client }
    }

    /// Sends `prompt` and returns the model's label, waiting at most `timeout`.
    ///
    /// Never fails: see the module docs for the fallback contract.
    pub fn classify(&self, prompt: &str, timeout: Duration) -> Classification {
        match self.client.complete(prompt, timeout) {
            Ok(reply) => {
                let label = normalize_label(&reply);
                if label.is_empty() {
                    warn!("model returned an empty label; using fallback '{FALLBACK_CODE}'");
                    Classification::fallback("Model returned an empty response".to_string())
                } else {
                    debug!(label = %label, "classified");
                    Classification::answered(label)
                }
            }
            Err(e) => {
                warn!("classification failed, using fallback '{FALLBACK_CODE}': {e}");
                Classification::fallback(e.to_string())
            }
        }
    }
}

fn normalize_label(reply: &str) -> String {
    reply.trim().to_lowercase()
}
