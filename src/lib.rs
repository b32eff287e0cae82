//! Batch qualitative coding of text snippets with a chat-completion model.
//!
//! A run loads a dataset workbook ([`Dataset`]), builds one prompt per item
//! from the codebook and calibration notes ([`prompt`]), asks the model for a
//! single code ([`Classifier`]), and writes a results workbook ([`writer`]).
//! [`BatchRunner`] sequences the whole run and reports progress through
//! callbacks.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod writer;

#[cfg(test)]
mod fixtures;

pub use classifier::{Classification, Classifier, FALLBACK_CODE};
pub use config::{ConfigError, RunOptions, Settings};
pub use dataset::{Dataset, DatasetError};
pub use llm::{ChatClient, ChatClientBuilder, ChatCompletion, LlmError};
pub use models::{ClassificationResult, CodeDefinition, Item, Mode, RunSummary};
pub use pipeline::{BatchRunner, RunError, RunRequest, RunState};
pub use prompt::PromptError;
pub use writer::PersistError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_accessible_from_crate_root() {
        assert_eq!(FALLBACK_CODE, "o");
        assert_eq!("encode".parse::<Mode>(), Ok(Mode::Encode));

        let options = RunOptions::default();
        assert_eq!(options.timeout.as_secs(), 10);

        let settings = Settings::default();
        assert!(settings.validate().is_err());
    }
}
