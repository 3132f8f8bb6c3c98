// src/sheet.rs

use calamine::{Data, Reader, Xlsx, XlsxError};
use chrono::{NaiveDateTime, Timelike};
use std::{collections::HashMap, fmt, io::Cursor};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("not a readable xlsx workbook: {0}")]
    Workbook(#[from] XlsxError),
    #[error("workbook contains no worksheets")]
    NoWorksheet,
    #[error("worksheet has no header row")]
    NoHeader,
}

/// A single scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::DateTime(dt) if dt.num_seconds_from_midnight() == 0 => {
                write!(f, "{}", dt.format("%Y-%m-%d"))
            }
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Error(e) => f.write_str(e),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Int(*i),
            Data::Float(x) => CellValue::Float(*x),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => CellValue::DateTime(naive),
                None => CellValue::Float(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}

/// One data row. Values are positionally aligned with [`Dataset::headers`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<CellValue>,
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn cell(&self, index: usize) -> &CellValue {
        self.values.get(index).unwrap_or(&CellValue::Empty)
    }
}

/// Ordered rows plus ordered, unique column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, padding or truncating each row to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(width, CellValue::Empty);
                Row::new(values)
            })
            .collect();
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Parse the first worksheet of an in-memory xlsx workbook.
#[instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
pub fn load_xlsx(bytes: &[u8]) -> Result<Dataset, SheetError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::NoWorksheet)??;

    let mut rows = range
        .rows()
        .map(|r| r.iter().map(CellValue::from).collect::<Vec<_>>())
        .filter(|r| !r.iter().all(CellValue::is_empty));

    let header_cells = rows.next().ok_or(SheetError::NoHeader)?;
    let headers = normalize_headers(&header_cells);
    let body: Vec<Vec<CellValue>> = rows.collect();

    debug!(columns = headers.len(), rows = body.len(), "parsed worksheet");
    Ok(Dataset::new(headers, body))
}

/// Blank headers become `Unnamed: <i>`; repeats get a `.<n>` suffix.
fn normalize_headers(cells: &[CellValue]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(cells.len());

    for (i, cell) in cells.iter().enumerate() {
        let base = match cell.to_string().trim() {
            "" => format!("Unnamed: {i}"),
            name => name.to_string(),
        };
        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{base}.{count}");
        }
        seen.insert(name.clone(), 0);
        out.push(name);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Build an xlsx workbook whose first sheet holds `rows` as text cells.
    pub(crate) fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_load_headers_and_rows() {
        let bytes = xlsx_bytes(&[
            &["NAME", "CONTACTCITY", "PHONE"],
            &["Ann", "Denver", "555-1"],
            &["Bob", "Austin", "555-2"],
        ]);
        let ds = load_xlsx(&bytes).unwrap();
        assert_eq!(ds.headers, vec!["NAME", "CONTACTCITY", "PHONE"]);
        assert_eq!(ds.rows.len(), 2);
        assert_eq!(ds.rows[1].cell(1).to_string(), "Austin");
        assert_eq!(ds.column_index("PHONE"), Some(2));
    }

    #[test]
    fn test_numbers_keep_their_type() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "ZIP").unwrap();
        sheet.write_string(0, 1, "SCORE").unwrap();
        sheet.write_number(1, 0, 80202).unwrap();
        sheet.write_number(1, 1, 2.5).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let ds = load_xlsx(&bytes).unwrap();
        assert_eq!(ds.rows[0].cell(0).to_string(), "80202");
        assert_eq!(ds.rows[0].cell(1).to_string(), "2.5");
    }

    #[test]
    fn test_blank_and_duplicate_headers() {
        let cells = vec![
            CellValue::Text("CITY".into()),
            CellValue::Empty,
            CellValue::Text("CITY".into()),
            CellValue::Text("CITY".into()),
        ];
        assert_eq!(
            normalize_headers(&cells),
            vec!["CITY", "Unnamed: 1", "CITY.1", "CITY.2"]
        );
    }

    #[test]
    fn test_empty_rows_skipped() {
        let bytes = xlsx_bytes(&[&["A", "B"], &["", ""], &["1", "2"]]);
        let ds = load_xlsx(&bytes).unwrap();
        assert_eq!(ds.rows.len(), 1);
    }

    #[test]
    fn test_short_rows_padded() {
        let ds = Dataset::new(
            vec!["A".into(), "B".into()],
            vec![vec![CellValue::Text("x".into())]],
        );
        assert_eq!(ds.rows[0].values().len(), 2);
        assert_eq!(ds.rows[0].cell(1), &CellValue::Empty);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = load_xlsx(b"name,city\nann,denver\n").unwrap_err();
        assert!(matches!(err, SheetError::Workbook(_)));
    }

    #[test]
    fn test_date_display() {
        let midnight = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(CellValue::DateTime(midnight).to_string(), "2024-03-01");
        let later = midnight.with_hour(13).unwrap();
        assert_eq!(
            CellValue::DateTime(later).to_string(),
            "2024-03-01 13:00:00"
        );
    }
}
