use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Codebook code reserved for filler rows; never an assignable category.
pub const SENTINEL_CODE: &str = "f";

/// Run mode.
///
/// In calibration mode every item carries a human-assigned code and the run
/// scores the model against it. Encode mode only produces model codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Calibrate,
    Encode,
}

impl Mode {
    pub fn is_calibration(self) -> bool {
        matches!(self, Self::Calibrate)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calibrate => write!(f, "calibrate"),
            Self::Encode => write!(f, "encode"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calibrate" | "calibration" => Ok(Self::Calibrate),
            "encode" | "encoding" => Ok(Self::Encode),
            other => Err(format!(
                "unknown mode '{other}' (expected 'calibrate' or 'encode')"
            )),
        }
    }
}

/// One text snippet to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// 1-based position in the input sheet.
    pub index: usize,
    pub text: String,
    /// Present only in calibration mode.
    pub human_code: Option<String>,
}

/// One codebook row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDefinition {
    /// The category symbol the model must answer with (`code_num` column).
    pub code: String,
    /// Short category name (`code` column).
    pub label: String,
    pub explanation: String,
    pub example: String,
}

impl CodeDefinition {
    pub fn is_sentinel(&self) -> bool {
        self.code == SENTINEL_CODE
    }
}
