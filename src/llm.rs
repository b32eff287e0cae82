/// Chat-completions HTTP client module.
///
/// This module provides a blocking client for OpenAI-compatible endpoints,
/// its error type, and the `ChatCompletion` trait the classifier depends on.
mod client;

pub use client::{
    CLASSIFICATION_TEMPERATURE, ChatClient, ChatClientBuilder, ChatCompletion, LlmError,
};
