//! Classification prompt rendering.
//!
//! The generated prompt lists the assignable codes in sorted order, one
//! definition block per codebook row, any calibration notes, the text to
//! classify, and a closing instruction asking for the bare code. A user-edited
//! template can replace all of that; its `[TEXT]` placeholder is substituted
//! verbatim with each item's text.

use thiserror::Error;

use crate::models::CodeDefinition;

/// Placeholder replaced by the item text in custom templates.
pub const TEXT_PLACEHOLDER: &str = "[TEXT]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    /// A custom template has nowhere to put the item text.
    #[error("Custom prompt template does not contain the [TEXT] placeholder")]
    MissingPlaceholder,
}

/// Returns the assignable codes (filler rows excluded), sorted.
///
/// The order is what the model sees as the canonical option list, so it must
/// not depend on codebook row order.
pub fn valid_codes(definitions: &[CodeDefinition]) -> Vec<String> {
    let mut codes: Vec<String> = definitions
        .iter()
        .filter(|def| !def.is_sentinel())
        .map(|def| def.code.clone())
        .collect();
    codes.sort();
    codes
}

/// Renders the full classification prompt for one text.
pub fn generate_prompt(definitions: &[CodeDefinition], notes: &[String], text: &str) -> String {
    let codes = valid_codes(definitions);

    let mut prompt = format!(
        "You are an experienced qualitative research coder who specialises in coding \
         online learning discussion texts.\n\
         In this task you must classify the text into one of {} categories. \
         The available codes are: {}.\n\n",
        codes.len(),
        codes.join(", ")
    );

    prompt.push_str("Coding framework:\n");
    for def in definitions.iter().filter(|def| !def.is_sentinel()) {
        prompt.push_str(&format!("\nCode {} - {}:\n", def.code, def.label));
        prompt.push_str(&format!("Definition: {}\n", def.explanation));
        prompt.push_str(&format!("Example: {}\n", def.example));
    }

    if !notes.is_empty() {
        prompt.push_str("\nCalibration notes:\n");
        for note in notes {
            prompt.push_str(&format!("- {note}\n"));
        }
    }

    prompt.push_str(&format!("\nText to code: {text}\n"));
    prompt.push_str(
        "\nRespond with the category code only: output just the letter, \
         without any explanation.\n",
    );
    prompt
}

/// Produces the prompt for one item, using `template` when one is supplied.
///
/// A blank template counts as absent.
///
/// # Errors
///
/// Returns `PromptError::MissingPlaceholder` if a non-blank template lacks
/// [`TEXT_PLACEHOLDER`].
pub fn compile(
    definitions: &[CodeDefinition],
    notes: &[String],
    text: &str,
    template: Option<&str>,
) -> Result<String, PromptError> {
    match template.filter(|t| !t.trim().is_empty()) {
        Some(template) if template.contains(TEXT_PLACEHOLDER) => {
            Ok(template.replace(TEXT_PLACEHOLDER, text))
        }
        Some(_) => Err(PromptError::MissingPlaceholder),
        None => Ok(generate_prompt(definitions, notes, text)),
    }
}
