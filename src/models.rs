mod item;
mod outcome;
mod table;

pub use item::{CodeDefinition, Item, Mode, SENTINEL_CODE};
pub use outcome::{ClassificationResult, RunSummary};
pub use table::{Cell, Table};
