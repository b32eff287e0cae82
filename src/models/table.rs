use std::fmt;

/// A single value read from (or written to) a workbook sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Returns true for empty cells and cells holding only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    /// Integral numbers render without a fractional part so that a code typed
    /// as `1` in a spreadsheet reads back as `"1"`, not `"1.0"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A header row plus data rows, as read from one sheet.
///
/// Rows are kept exactly as loaded; derived columns are only ever set on a
/// copy via [`Table::with_column`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates a table, padding short rows with empty cells to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, Cell::Empty);
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of the column whose header matches `name` exactly
    /// (surrounding whitespace ignored).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Reads one cell as trimmed text.
    pub fn text(&self, row: usize, column: usize) -> String {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.to_string().trim().to_string())
            .unwrap_or_default()
    }

    /// Returns a copy of this table with `name` set to `values`.
    ///
    /// An existing column of that name is overwritten in place; otherwise the
    /// column is appended. Missing values (when `values` is shorter than the
    /// table) become empty cells.
    #[must_use]
    pub fn with_column(&self, name: &str, values: Vec<Cell>) -> Self {
        let mut headers = self.headers.clone();
        let column = match self.column_index(name) {
            Some(existing) => existing,
            None => {
                headers.push(name.to_string());
                headers.len() - 1
            }
        };

        let mut values = values.into_iter();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                let value = values.next().unwrap_or(Cell::Empty);
                if column < row.len() {
                    row[column] = value;
                } else {
                    row.resize(column, Cell::Empty);
                    row.push(value);
                }
                row
            })
            .collect();

        Self { headers, rows }
    }
}
