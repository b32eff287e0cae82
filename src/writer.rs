//! Output workbook for a finished run.
//!
//! Four sheets are written: `code` (the input codebook), `Coding Results`
//! (input rows plus `model_code`, and `is_correct` when calibrating),
//! `Statistics` (one summary row), and `Detailed Results` (one row per item).

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::dataset::{CODEBOOK_SHEET, ITEMS_SHEET};
use crate::models::{Cell, ClassificationResult, Mode, Table};

pub const STATISTICS_SHEET: &str = "Statistics";
pub const DETAILS_SHEET: &str = "Detailed Results";
pub const OUTPUT_EXTENSION: &str = "xlsx";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write results to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },
}

/// Aggregate figures for the `Statistics` sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub elapsed_seconds: f64,
    pub total: usize,
    pub processed: usize,
    pub accuracy: Option<f64>,
}

/// Derives `{output_dir}/{input_stem}_{mode}_{YYYYMMDD_HHMMSS}.xlsx`.
pub fn output_path(input: &Path, output_dir: &Path, mode: Mode, at: OffsetDateTime) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());

    let timestamp = at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());

    output_dir.join(format!("{stem}_{mode}_{timestamp}.{OUTPUT_EXTENSION}"))
}

/// Returns `path`, or the first of `{stem}_2.{ext}`, `{stem}_3.{ext}`, ... that does not exist yet.
pub fn unused_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| OUTPUT_EXTENSION.to_string());

    let free = (2..)
        .map(|n| path.with_file_name(format!("{stem}_{n}.{ext}")))
        .find(|candidate| !candidate.exists());
    free.unwrap_or(path)
}

/// Current local time, or UTC when the local offset cannot be determined.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Returns a copy of `items` with `model_code` (and `is_correct` in calibration mode) set.
///
/// Columns left by an earlier run are overwritten rather than duplicated.
pub fn annotate(items: &Table, results: &[ClassificationResult], mode: Mode) -> Table {
    let codes = results
        .iter()
        .map(|r| Cell::from(r.model_code.as_str()))
        .collect();
    let annotated = items.with_column("model_code", codes);

    if mode.is_calibration() {
        let correct = results
            .iter()
            .map(|r| Cell::Bool(r.correct.unwrap_or(false)))
            .collect();
        annotated.with_column("is_correct", correct)
    } else {
        annotated
    }
}

/// Writes the four result sheets to `path`, creating its directory if needed.
///
/// # Errors
///
/// Returns `PersistError` if the directory cannot be created or the workbook
/// cannot be assembled or saved.
pub fn write_results(
    path: &Path,
    codebook: &Table,
    annotated_items: &Table,
    stats: &Statistics,
    results: &[ClassificationResult],
    mode: Mode,
) -> Result<(), PersistError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = Workbook::new();
    write_table(workbook.add_worksheet(), CODEBOOK_SHEET, codebook).map_err(write_err)?;
    write_table(workbook.add_worksheet(), ITEMS_SHEET, annotated_items).map_err(write_err)?;
    write_table(
        workbook.add_worksheet(),
        STATISTICS_SHEET,
        &statistics_table(stats),
    )
    .map_err(write_err)?;
    write_table(
        workbook.add_worksheet(),
        DETAILS_SHEET,
        &details_table(results, mode),
    )
    .map_err(write_err)?;

    workbook.save(path).map_err(write_err)
}

fn statistics_table(stats: &Statistics) -> Table {
    let accuracy = stats
        .accuracy
        .map(|a| format!("{:.2}%", a * 100.0))
        .unwrap_or_else(|| "N/A".to_string());

    Table::new(
        ["Elapsed time", "Total items", "Processed items", "Accuracy"]
            .map(String::from)
            .to_vec(),
        vec![vec![
            Cell::Text(format!("{:.1}s", stats.elapsed_seconds)),
            Cell::Number(stats.total as f64),
            Cell::Number(stats.processed as f64),
            Cell::Text(accuracy),
        ]],
    )
}

fn details_table(results: &[ClassificationResult], mode: Mode) -> Table {
    let calibrating = mode.is_calibration();

    let mut headers = vec!["index", "text", "display_text", "model_code"];
    if calibrating {
        headers.extend(["human_code", "correct"]);
    }
    headers.push("error");

    let rows = results
        .iter()
        .map(|r| {
            let mut row = vec![
                Cell::Number(r.item_index as f64),
                Cell::from(r.text.as_str()),
                Cell::from(r.display_text.as_str()),
                Cell::from(r.model_code.as_str()),
            ];
            if calibrating {
                row.push(r.human_code.as_deref().map_or(Cell::Empty, Cell::from));
                row.push(r.correct.map_or(Cell::Empty, Cell::Bool));
            }
            row.push(r.error.as_deref().map_or(Cell::Empty, Cell::from));
            row
        })
        .collect();

    Table::new(headers.into_iter().map(String::from).collect(), rows)
}

fn write_table(sheet: &mut Worksheet, name: &str, table: &Table) -> Result<(), XlsxError> {
    sheet.set_name(name)?;

    for (col, header) in table.headers().iter().enumerate() {
        sheet.write_string(0, col as u16, header)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let r = r as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    sheet.write_string(r, col, s)?;
                }
                Cell::Number(n) => {
                    sheet.write_number(r, col, *n)?;
                }
                Cell::Bool(b) => {
                    sheet.write_boolean(r, col, *b)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, open_workbook_auto};
    use tempfile::tempdir;
    use time::macros::datetime;

    fn result(index: usize, model: &str, human: Option<&str>, error: Option<&str>) -> ClassificationResult {
        ClassificationResult {
            item_index: index,
            text: format!("text {index}"),
            display_text: format!("text {index}"),
            model_code: model.to_string(),
            human_code: human.map(String::from),
            correct: human.map(|h| h == model),
            error: error.map(String::from),
        }
    }

    fn items() -> Table {
        Table::new(
            vec!["text".into(), "hcode".into()],
            vec![
                vec![Cell::from("text 1"), Cell::from("a")],
                vec![Cell::from("text 2"), Cell::from("b")],
            ],
        )
    }

    fn codebook() -> Table {
        Table::new(
            ["code_num", "code", "explain", "example"]
                .map(String::from)
                .to_vec(),
            vec![vec![
                Cell::from("a"),
                Cell::from("Statement"),
                Cell::from("Shares an answer"),
                Cell::from("It is 4"),
            ]],
        )
    }

    #[test]
    fn output_path_combines_stem_mode_and_timestamp() {
        let path = output_path(
            Path::new("/data/forum posts.xlsx"),
            Path::new("/out"),
            Mode::Calibrate,
            datetime!(2024-03-05 14:07:09 UTC),
        );
        assert_eq!(
            path,
            PathBuf::from("/out/forum posts_calibrate_20240305_140709.xlsx")
        );
    }

    #[test]
    fn unused_path_adds_counter_when_taken() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data_encode_20240305_140709.xlsx");
        assert_eq!(unused_path(path.clone()), path);

        std::fs::write(&path, b"").unwrap();
        let second = dir.path().join("data_encode_20240305_140709_2.xlsx");
        assert_eq!(unused_path(path.clone()), second);

        std::fs::write(&second, b"").unwrap();
        assert_eq!(
            unused_path(path),
            dir.path().join("data_encode_20240305_140709_3.xlsx")
        );
    }

    #[test]
    fn annotate_adds_correctness_only_when_calibrating() {
        let results = vec![result(1, "a", Some("a"), None), result(2, "a", Some("b"), None)];

        let calibrated = annotate(&items(), &results, Mode::Calibrate);
        assert_eq!(calibrated.headers(), ["text", "hcode", "model_code", "is_correct"]);
        assert_eq!(calibrated.rows()[1][3], Cell::Bool(false));

        let encoded = annotate(&items(), &results, Mode::Encode);
        assert_eq!(encoded.headers(), ["text", "hcode", "model_code"]);
        assert_eq!(encoded.rows()[0][2], Cell::from("a"));
    }

    #[test]
    fn annotate_overwrites_columns_from_a_previous_run() {
        let previous = annotate(
            &items(),
            &[result(1, "b", Some("a"), None), result(2, "b", Some("b"), None)],
            Mode::Calibrate,
        );
        let results = vec![result(1, "a", Some("a"), None), result(2, "a", Some("b"), None)];

        let rerun = annotate(&previous, &results, Mode::Calibrate);

        assert_eq!(rerun.headers(), ["text", "hcode", "model_code", "is_correct"]);
        assert_eq!(rerun.rows()[0][2], Cell::from("a"));
        assert_eq!(rerun.rows()[0][3], Cell::Bool(true));
        assert_eq!(rerun.rows()[1][3], Cell::Bool(false));
        assert_eq!(rerun.column_index("model_code"), Some(2));
    }

    #[test]
    fn statistics_format_accuracy_or_na() {
        let mut stats = Statistics {
            elapsed_seconds: 12.345,
            total: 3,
            processed: 3,
            accuracy: Some(2.0 / 3.0),
        };
        let table = statistics_table(&stats);
        assert_eq!(table.rows()[0][0], Cell::Text("12.3s".into()));
        assert_eq!(table.rows()[0][3], Cell::Text("66.67%".into()));

        stats.accuracy = None;
        assert_eq!(statistics_table(&stats).rows()[0][3], Cell::Text("N/A".into()));
    }

    #[test]
    fn details_columns_depend_on_mode() {
        let results = vec![result(1, "o", None, Some("Request timed out after 10s"))];

        let encode = details_table(&results, Mode::Encode);
        assert_eq!(
            encode.headers(),
            ["index", "text", "display_text", "model_code", "error"]
        );
        assert_eq!(encode.rows()[0][4], Cell::from("Request timed out after 10s"));

        let calibrate = details_table(&results, Mode::Calibrate);
        assert!(calibrate.headers().contains(&"human_code".to_string()));
        assert!(calibrate.headers().contains(&"correct".to_string()));
    }

    #[test]
    fn write_results_produces_four_named_sheets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("data_calibrate_20240101_000000.xlsx");
        let results = vec![result(1, "a", Some("a"), None), result(2, "o", Some("b"), Some("timeout"))];
        let stats = Statistics {
            elapsed_seconds: 1.0,
            total: 2,
            processed: 2,
            accuracy: Some(0.5),
        };

        write_results(
            &path,
            &codebook(),
            &annotate(&items(), &results, Mode::Calibrate),
            &stats,
            &results,
            Mode::Calibrate,
        )
        .expect("results should be written");

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec!["code", "Coding Results", "Statistics", "Detailed Results"]
        );

        let coded = workbook.worksheet_range("Coding Results").unwrap();
        let header: Vec<String> = coded.rows().next().unwrap().iter().map(|d| d.to_string()).collect();
        assert_eq!(header, ["text", "hcode", "model_code", "is_correct"]);
        assert_eq!(coded.get((2, 2)), Some(&Data::String("o".into())));
        assert_eq!(coded.get((2, 3)), Some(&Data::Bool(false)));

        let details = workbook.worksheet_range("Detailed Results").unwrap();
        assert_eq!(details.rows().count(), 3);
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A directory where the file should be
        let path = dir.path().join("taken.xlsx");
        std::fs::create_dir(&path).unwrap();

        let stats = Statistics {
            elapsed_seconds: 0.0,
            total: 0,
            processed: 0,
            accuracy: None,
        };
        let result = write_results(&path, &codebook(), &items(), &stats, &[], Mode::Encode);
        assert!(matches!(result, Err(PersistError::Write { .. })));
    }
}
