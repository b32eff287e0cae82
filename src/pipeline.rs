//! Batch classification run.
//!
//! [`BatchRunner::run`] loads a dataset workbook, classifies every item in
//! input order, and writes the results workbook. It blocks until the run ends;
//! a host that needs to stay responsive calls it from its own thread and
//! forwards the two callbacks to wherever it renders.
//!
//! Per item the runner reports progress, compiles the prompt, shows a pending
//! preview, classifies, shows the resolved preview, records the result, and
//! then waits out the pacing delay. A failing item is recorded with the
//! fallback code and never aborts the run; only loading and writing are fatal.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::{Classifier, FALLBACK_CODE};
use crate::config::RunOptions;
use crate::dataset::{Dataset, DatasetError};
use crate::llm::ChatCompletion;
use crate::models::{ClassificationResult, Item, Mode, RunSummary};
use crate::prompt;
use crate::writer::{self, PersistError, Statistics};

/// Model-code placeholder shown while a request is in flight.
pub const PENDING_LABEL: &str = "in-progress";
/// Human-code placeholder outside calibration mode.
pub const NOT_APPLICABLE: &str = "N/A";
/// Prompt text previewed when the prompt itself could not be built.
pub const PROMPT_FAILED: &str = "failed to compile prompt";
/// Display texts longer than this many characters are truncated.
pub const DISPLAY_CHARS: usize = 50;

/// Lifecycle of a [`BatchRunner`]. Each `run` call starts from `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Errors that end a run without a result workbook.
#[derive(Debug, Error)]
pub enum RunError {
    /// The input workbook was unusable; no item was processed.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Every item was classified but the result workbook could not be written.
    #[error("{source}")]
    Persist {
        #[source]
        source: PersistError,
        /// The results that failed to save.
        unsaved: Box<RunSummary>,
    },
}

impl RunError {
    /// Results computed before a write failure, so a host can still recover them.
    pub fn unsaved_summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Persist { unsaved, .. } => Some(unsaved),
            Self::Dataset(_) => None,
        }
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub mode: Mode,
    /// User-edited prompt containing `[TEXT]`; blank or `None` uses the generated prompt.
    pub template: Option<String>,
}

/// Drives one classification run at a time.
pub struct BatchRunner {
    classifier: Classifier,
    options: RunOptions,
    state: RunState,
}

/// Accumulators for the item loop.
#[derive(Debug, Default)]
struct Tally {
    results: Vec<ClassificationResult>,
    log: Vec<Vec<String>>,
    correct: usize,
}

impl BatchRunner {
    pub fn new(client: Arc<dyn ChatCompletion>, options: RunOptions) -> Self {
        Self {
            classifier: Classifier::new(client),
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Runs the whole pipeline for `request`.
    ///
    /// `on_progress(current, total)` fires once per item before it is
    /// classified. `on_preview(prompt, human_code, model_code)` fires with
    /// [`PENDING_LABEL`] before the remote call and again with the outcome.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Dataset` if the input cannot be loaded (before any
    /// callback fires) and `RunError::Persist` if the result workbook cannot
    /// be written.
    pub fn run<P, V>(
        &mut self,
        request: &RunRequest,
        on_progress: P,
        on_preview: V,
    ) -> Result<RunSummary, RunError>
    where
        P: FnMut(usize, usize),
        V: FnMut(&str, &str, &str),
    {
        self.state = RunState::Running;
        let result = self.execute(request, on_progress, on_preview);
        self.state = if result.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        result
    }

    fn execute<P, V>(
        &self,
        request: &RunRequest,
        on_progress: P,
        on_preview: V,
    ) -> Result<RunSummary, RunError>
    where
        P: FnMut(usize, usize),
        V: FnMut(&str, &str, &str),
    {
        let started = Instant::now();
        let output_path = writer::unused_path(writer::output_path(
            &request.input,
            &request.output_dir,
            request.mode,
            writer::local_now(),
        ));

        let dataset = Dataset::load(&request.input)?;
        let items = dataset.items(request.mode)?;
        info!(
            input = %request.input.display(),
            mode = %request.mode,
            items = items.len(),
            "starting coding run"
        );

        let tally = self.classify_items(
            &dataset,
            &items,
            request.mode,
            request.template.as_deref(),
            on_progress,
            on_preview,
        );

        let total = items.len();
        let accuracy = (request.mode.is_calibration() && total > 0)
            .then(|| tally.correct as f64 / total as f64);

        let summary = RunSummary {
            mode: request.mode,
            total,
            processed: tally.results.len(),
            correct: tally.correct,
            accuracy,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            output_path,
            per_item_log: tally.log,
            results: tally.results,
        };

        let stats = Statistics {
            elapsed_seconds: summary.elapsed_seconds,
            total: summary.total,
            processed: summary.processed,
            accuracy: summary.accuracy,
        };
        let annotated = writer::annotate(dataset.items_table(), &summary.results, request.mode);

        if let Err(source) = writer::write_results(
            &summary.output_path,
            dataset.codebook_table(),
            &annotated,
            &stats,
            &summary.results,
            request.mode,
        ) {
            return Err(RunError::Persist {
                source,
                unsaved: Box::new(summary),
            });
        }

        info!(
            processed = summary.processed,
            correct = summary.correct,
            failed = summary.failed(),
            elapsed_secs = summary.elapsed_seconds,
            "coding run finished, results saved to {}",
            summary.output_path.display()
        );
        Ok(summary)
    }

    fn classify_items<P, V>(
        &self,
        dataset: &Dataset,
        items: &[Item],
        mode: Mode,
        template: Option<&str>,
        mut on_progress: P,
        mut on_preview: V,
    ) -> Tally
    where
        P: FnMut(usize, usize),
        V: FnMut(&str, &str, &str),
    {
        let total = items.len();
        let mut tally = Tally::default();

        for item in items {
            on_progress(item.index, total);

            let display = display_text(&item.text);
            let human = item.human_code.as_deref().unwrap_or(NOT_APPLICABLE);
            let mut lines = vec![
                format!("Text {}/{}:", item.index, total),
                format!("Content: {display}"),
            ];

            let (model_code, error) = match prompt::compile(
                dataset.definitions(),
                dataset.notes(),
                &item.text,
                template,
            ) {
                Ok(prompt) => {
                    on_preview(&prompt, human, PENDING_LABEL);
                    let classification = self.classifier.classify(&prompt, self.options.timeout);
                    on_preview(&prompt, human, classification.label());
                    (
                        classification.label().to_string(),
                        classification.failure().map(String::from),
                    )
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(item = item.index, "item failed: {message}");
                    on_preview(PROMPT_FAILED, human, &format!("error: {message}"));
                    (FALLBACK_CODE.to_string(), Some(message))
                }
            };

            let correct = mode
                .is_calibration()
                .then(|| item.human_code.as_deref() == Some(model_code.as_str()));
            if correct == Some(true) {
                tally.correct += 1;
            }

            match correct {
                Some(is_correct) => lines.extend([
                    format!("Human code: {human}"),
                    format!("Model code: {model_code}"),
                    format!("Result: {}", if is_correct { "✓" } else { "✗" }),
                ]),
                None => lines.push(format!("Model code: {model_code}")),
            }
            if let Some(message) = &error {
                lines.push(format!("Error: {message}"));
            }

            tally.results.push(ClassificationResult {
                item_index: item.index,
                text: item.text.clone(),
                display_text: display,
                model_code,
                human_code: item.human_code.clone(),
                correct,
                error,
            });
            tally.log.push(lines);

            if !self.options.pacing_delay.is_zero() {
                thread::sleep(self.options.pacing_delay);
            }
        }

        tally
    }
}

/// Truncates `text` to [`DISPLAY_CHARS`] characters, appending `...` when cut.
pub fn display_text(text: &str) -> String {
    if text.chars().count() > DISPLAY_CHARS {
        text.chars().take(DISPLAY_CHARS).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
