//! Workbook loading for a coding run.
//!
//! A dataset workbook has three parts:
//! - `Coding Results`: one row per text snippet (`text`, plus `hcode` when calibrating)
//! - `code`: the codebook (`code_num`, `code`, `explain`, `example`)
//! - an optional `note`/`notes` sheet: one free-text calibration note per row
//!
//! Loading either yields a fully validated [`Dataset`] or a single
//! [`DatasetError`]; no partial state is returned.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, Sheets, open_workbook_auto};
use thiserror::Error;
use tracing::debug;

use crate::models::{Cell, CodeDefinition, Item, Mode, Table};
use crate::prompt;

pub const ITEMS_SHEET: &str = "Coding Results";
pub const CODEBOOK_SHEET: &str = "code";

/// Errors raised while loading a dataset workbook. All are fatal to a run.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A required sheet is absent from the workbook.
    #[error("Required sheet '{sheet}' not found")]
    MissingSheet { sheet: String },

    /// A required column is absent from a sheet's header row.
    #[error("Sheet '{sheet}' has no '{column}' column")]
    MissingColumn { sheet: String, column: String },

    /// Every codebook row is blank or the filler code.
    #[error("Codebook defines no assignable codes")]
    NoValidCodes,

    /// The workbook could not be opened or a sheet could not be parsed.
    #[error("Error reading workbook {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
}

/// Items, codebook, and notes of one input workbook.
#[derive(Debug, Clone)]
pub struct Dataset {
    items: Table,
    codebook: Table,
    definitions: Vec<CodeDefinition>,
    notes: Vec<String>,
}

impl Dataset {
    /// Opens and validates the workbook at `path`.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::MissingSheet` naming the first absent required
    /// sheet, `DatasetError::Load` if the file cannot be read, and the
    /// validation errors of [`Dataset::from_parts`].
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let load_err = |source| DatasetError::Load {
            path: path.to_path_buf(),
            source,
        };

        let mut workbook = open_workbook_auto(path).map_err(load_err)?;
        let sheet_names = workbook.sheet_names();

        for required in [ITEMS_SHEET, CODEBOOK_SHEET] {
            if !sheet_names.iter().any(|name| name == required) {
                return Err(DatasetError::MissingSheet {
                    sheet: required.to_string(),
                });
            }
        }

        let items = read_table(&mut workbook, ITEMS_SHEET).map_err(load_err)?;
        let codebook = read_table(&mut workbook, CODEBOOK_SHEET).map_err(load_err)?;

        let notes = match sheet_names
            .iter()
            .find(|name| matches!(name.to_lowercase().as_str(), "note" | "notes"))
        {
            Some(name) => read_notes(&mut workbook, name).map_err(load_err)?,
            None => Vec::new(),
        };

        debug!(
            items = items.len(),
            codebook_rows = codebook.len(),
            notes = notes.len(),
            "loaded workbook {}",
            path.display()
        );

        Self::from_parts(items, codebook, notes)
    }

    /// Builds a dataset from already-parsed tables.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::MissingColumn` if the items table lacks `text` or
    /// the codebook lacks one of its four columns, and
    /// `DatasetError::NoValidCodes` if no assignable code remains once the
    /// filler rows are excluded.
    pub fn from_parts(
        items: Table,
        codebook: Table,
        notes: Vec<String>,
    ) -> Result<Self, DatasetError> {
        require_column(&items, ITEMS_SHEET, "text")?;
        let definitions = read_definitions(&codebook)?;

        if prompt::valid_codes(&definitions).is_empty() {
            return Err(DatasetError::NoValidCodes);
        }

        Ok(Self {
            items,
            codebook,
            definitions,
            notes,
        })
    }

    /// The `Coding Results` sheet exactly as loaded.
    pub fn items_table(&self) -> &Table {
        &self.items
    }

    /// The `code` sheet exactly as loaded.
    pub fn codebook_table(&self) -> &Table {
        &self.codebook
    }

    /// Codebook rows in sheet order, sentinel rows included.
    pub fn definitions(&self) -> &[CodeDefinition] {
        &self.definitions
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Extracts the items to classify, in sheet order.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::MissingColumn` when calibrating against a sheet
    /// without an `hcode` column.
    pub fn items(&self, mode: Mode) -> Result<Vec<Item>, DatasetError> {
        let text_col = require_column(&self.items, ITEMS_SHEET, "text")?;
        let hcode_col = if mode.is_calibration() {
            Some(require_column(&self.items, ITEMS_SHEET, "hcode")?)
        } else {
            None
        };

        Ok((0..self.items.len())
            .map(|row| Item {
                index: row + 1,
                text: self.items.text(row, text_col),
                human_code: hcode_col.map(|col| self.items.text(row, col)),
            })
            .collect())
    }

    /// Renders the generated prompt with the literal `[TEXT]` placeholder, so a
    /// user can edit it once and pass it back as a custom template.
    pub fn prompt_template(&self) -> String {
        prompt::generate_prompt(&self.definitions, &self.notes, prompt::TEXT_PLACEHOLDER)
    }
}

fn require_column(table: &Table, sheet: &str, column: &str) -> Result<usize, DatasetError> {
    table
        .column_index(column)
        .ok_or_else(|| DatasetError::MissingColumn {
            sheet: sheet.to_string(),
            column: column.to_string(),
        })
}

fn read_definitions(codebook: &Table) -> Result<Vec<CodeDefinition>, DatasetError> {
    let code_col = require_column(codebook, CODEBOOK_SHEET, "code_num")?;
    let label_col = require_column(codebook, CODEBOOK_SHEET, "code")?;
    let explain_col = require_column(codebook, CODEBOOK_SHEET, "explain")?;
    let example_col = require_column(codebook, CODEBOOK_SHEET, "example")?;

    Ok((0..codebook.len())
        .filter(|&row| !codebook.text(row, code_col).is_empty())
        .map(|row| CodeDefinition {
            code: codebook.text(row, code_col),
            label: codebook.text(row, label_col),
            explanation: codebook.text(row, explain_col),
            example: codebook.text(row, example_col),
        })
        .collect())
}

/// Reads a sheet whose first non-blank row is the header.
///
/// Fully blank rows are dropped wherever they appear, so they are neither
/// classified nor copied to the output.
fn read_table(
    workbook: &mut Sheets<BufReader<File>>,
    sheet: &str,
) -> Result<Table, calamine::Error> {
    let range = workbook.worksheet_range(sheet)?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(to_cell).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(Cell::is_blank));

    let headers = rows
        .next()
        .map(|header| {
            header
                .iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(Table::new(headers, rows.collect()))
}

/// Reads the first column of a header-less notes sheet, dropping blanks.
fn read_notes(
    workbook: &mut Sheets<BufReader<File>>,
    sheet: &str,
) -> Result<Vec<String>, calamine::Error> {
    let range = workbook.worksheet_range(sheet)?;

    Ok(range
        .rows()
        .filter_map(|row| row.first().map(to_cell))
        .filter(|cell| !cell.is_blank())
        .map(|cell| cell.to_string().trim().to_string())
        .collect())
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}
