use std::path::PathBuf;

use super::Mode;

/// Outcome of classifying one item. Created once, never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub item_index: usize,
    pub text: String,
    /// Display form of the text (at most 50 characters plus an ellipsis).
    pub display_text: String,
    /// Model label, or the fallback `"o"`. Never empty.
    pub model_code: String,
    pub human_code: Option<String>,
    /// Present iff the run is in calibration mode.
    pub correct: Option<bool>,
    /// Failure text captured for this item, if any.
    pub error: Option<String>,
}

/// Terminal value of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: Mode,
    pub total: usize,
    pub processed: usize,
    pub correct: usize,
    /// `correct / total`; only set in calibration mode with at least one item.
    pub accuracy: Option<f64>,
    pub elapsed_seconds: f64,
    pub output_path: PathBuf,
    /// One group of human-readable lines per item, in input order.
    pub per_item_log: Vec<Vec<String>>,
    pub results: Vec<ClassificationResult>,
}

impl RunSummary {
    /// Number of items whose result carries an error.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }

    /// Renders the end-of-run report: every item's log group followed by the
    /// aggregate statistics.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Processing file...".to_string(),
            format!("File contains {} texts to code", self.total),
        ];

        for group in &self.per_item_log {
            lines.extend(group.iter().cloned());
            lines.push("-".repeat(50));
        }

        lines.push(String::new());
        lines.push("Summary:".to_string());
        lines.push("=".repeat(50));
        if let Some(accuracy) = self.accuracy {
            lines.push(format!("Accuracy: {accuracy:.4}"));
        }
        lines.push(format!("Processed: {}/{}", self.processed, self.total));
        lines.push(format!("Elapsed: {:.2}s", self.elapsed_seconds));
        lines.push(String::new());
        lines.push(format!("Results saved to: {}", self.output_path.display()));
        lines
    }
}
