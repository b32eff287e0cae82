//! Workbook fixtures shared by unit tests.

use std::path::Path;

use rust_xlsxwriter::Workbook;

/// Writes a workbook with one sheet per `(name, rows)` pair; every cell is a string.
pub(crate) fn write_workbook(path: &Path, sheets: &[(&str, Vec<Vec<&str>>)]) {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("valid sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet
                        .write_string(r as u32, c as u16, *value)
                        .expect("write fixture cell");
                }
            }
        }
    }
    workbook.save(path).expect("save fixture workbook");
}

/// Codebook with codes listed out of order and one filler row.
pub(crate) fn codebook_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["code_num", "code", "explain", "example"],
        vec!["b", "Question", "Asks peers or the instructor for help", "Can someone explain this?"],
        vec!["a", "Statement", "Shares an answer or an opinion", "I think the answer is 4"],
        vec!["f", "Filler", "Placeholder row", "-"],
    ]
}
