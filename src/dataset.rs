use crate::error::{ClassifyError, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Excel serial date/time, written back with a date format.
    DateTime(f64),
}

impl Cell {
    fn from_data(d: &Data) -> Cell {
        match d {
            Data::Empty => Cell::Empty,
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(e.to_string()),
        }
    }

    /// Text used when a cell becomes a column label.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) | Cell::DateTime(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                format!("{}", *v as i64)
            }
            Cell::Number(v) | Cell::DateTime(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
        }
    }
}

/// Trimmed label, or `Unnamed: <idx>` for a blank header cell.
pub fn normalize_label(raw: &str, idx: usize) -> String {
    let t = raw.trim();
    if t.is_empty() {
        format!("Unnamed: {idx}")
    } else {
        t.to_string()
    }
}

/// One row viewed through the dataset's column labels.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.cells.get(idx)
    }

}

/// Ordered rows sharing one column set. Every row has exactly
/// `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Labels are normalized and rows are padded or cut to the label count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let columns: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| normalize_label(c, i))
            .collect();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Dataset { columns, rows }
    }

    /// Reads the first worksheet of an in-memory xlsx workbook. The first
    /// row supplies the column labels.
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Dataset> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|e: calamine::XlsxError| ClassifyError::load(e.to_string()))?;
        let range = match workbook.worksheet_range_at(0) {
            Some(Ok(r)) => r,
            Some(Err(e)) => return Err(ClassifyError::load(e.to_string())),
            None => return Err(ClassifyError::load("workbook has no worksheets")),
        };

        let mut rows_iter = range.rows();
        let Some(header) = rows_iter.next() else {
            return Ok(Dataset::default());
        };
        let columns: Vec<String> = header
            .iter()
            .map(|d| Cell::from_data(d).display())
            .collect();
        let rows: Vec<Vec<Cell>> = rows_iter
            .map(|r| r.iter().map(Cell::from_data).collect())
            .collect();

        let ds = Dataset::new(columns, rows);
        log::debug!(
            "loaded dataset: {} columns, {} rows",
            ds.columns.len(),
            ds.rows.len()
        );
        Ok(ds)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
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

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        let expected = name.trim();
        self.column_index(expected)
            .ok_or_else(|| ClassifyError::MissingColumn {
                expected: expected.to_string(),
                available: self.columns.clone(),
            })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows.iter().map(move |r| Record {
            columns: &self.columns,
            cells: r,
        })
    }

    /// Row-order-preserving copy of the given rows.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}
