//! Column-oriented tabular data with CSV reading and writing
//!
//! Survey exports are small enough to hold in memory. A [`Frame`] keeps each
//! column as a vector of [`Cell`]s; every column has the same length.

use crate::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Field values read as missing
const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

/// A single value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw CSV field
    pub fn parse(field: &str) -> Cell {
        let trimmed = field.trim();
        if MISSING_MARKERS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(field.to_string()),
        }
    }

    /// Cell from an optional number (None and NaN become missing)
    pub fn from_f64(value: Option<f64>) -> Cell {
        match value {
            Some(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text form of a present value; numbers render like the CSV writer
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) => Some(format_number(*v)),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    /// Text form with missing rendered as an empty string
    pub fn display(&self) -> String {
        self.as_text().unwrap_or_default()
    }

    /// JSON form used by API responses
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Missing => serde_json::Value::Null,
            Cell::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Shortest text for a number; integral values carry no decimals
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column of numbers, `None` entries missing
    pub fn from_numbers(name: impl Into<String>, values: &[Option<f64>]) -> Self {
        Self::new(name, values.iter().map(|v| Cell::from_f64(*v)).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when there is at least one value and every present value is a number
    pub fn is_numeric(&self) -> bool {
        let mut seen = false;
        for cell in &self.values {
            match cell {
                Cell::Number(_) => seen = true,
                Cell::Text(_) => return false,
                Cell::Missing => {}
            }
        }
        seen
    }

    /// Present numeric values in row order
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(Cell::as_f64).collect()
    }

    /// Per-row numeric view (`None` for missing or text)
    pub fn as_f64_vec(&self) -> Vec<Option<f64>> {
        self.values.iter().map(Cell::as_f64).collect()
    }

    /// Distinct present values, compared by text form, in order of first appearance
    pub fn unique_texts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for text in self.values.iter().filter_map(Cell::as_text) {
            if seen.insert(text.clone()) {
                out.push(text);
            }
        }
        out
    }

    pub fn n_unique(&self) -> usize {
        self.unique_texts().len()
    }

    pub fn n_missing(&self) -> usize {
        self.values.iter().filter(|c| c.is_missing()).count()
    }
}

/// In-memory table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from columns that all have the same length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let len = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != len) {
                return Err(Error::InvalidInput(format!(
                    "Column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.len(),
                    len
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Parse CSV text; the first record is the header
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut records = read_records(text)?;
        if records.is_empty() {
            return Err(Error::InvalidInput("CSV file is empty".to_string()));
        }
        let header = dedupe_names(records.remove(0));
        Ok(Self::from_records(header, records))
    }

    /// Parse CSV bytes, decoding as UTF-8 or, failing that, Latin-1
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_csv_str(&decode_text(bytes))
    }

    /// Parse CSV text but name columns positionally from `names`
    ///
    /// The file's own header row is discarded. Columns beyond the end of
    /// `names` keep their header text.
    pub fn from_csv_with_names(text: &str, names: &[String]) -> Result<Self> {
        let mut records = read_records(text)?;
        if records.is_empty() {
            return Err(Error::InvalidInput("CSV file is empty".to_string()));
        }
        let mut header = records.remove(0);
        for (i, name) in header.iter_mut().enumerate() {
            if let Some(replacement) = names.get(i) {
                *name = replacement.clone();
            }
        }
        Ok(Self::from_records(dedupe_names(header), records))
    }

    /// Header row only
    pub fn headers_from_csv(text: &str) -> Result<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        match reader.records().next() {
            Some(record) => Ok(record?.iter().map(|s| s.trim().to_string()).collect()),
            None => Err(Error::InvalidInput("CSV file is empty".to_string())),
        }
    }

    fn from_records(header: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let width = records
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(header.len());
        let mut names = header;
        for i in names.len()..width {
            names.push(format!("Unnamed: {}", i));
        }

        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(records.len())))
            .collect();

        for record in &records {
            for (i, column) in columns.iter_mut().enumerate() {
                let cell = record.get(i).map(|f| Cell::parse(f)).unwrap_or(Cell::Missing);
                column.values.push(cell);
            }
        }

        Self { columns }
    }

    /// Serialize as CSV with a header row
    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.n_rows() {
            writer.write_record(self.columns.iter().map(|c| c.values[row].display()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Internal(format!("CSV writer flush failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Column by name or `NotFound`
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::NotFound(format!("Column '{}' not found in data", name)))
    }

    /// Append a column; its length must match the frame
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(Error::InvalidInput(format!(
                "Column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.n_rows()
            )));
        }
        if self.has_column(&column.name) {
            return Err(Error::Conflict(format!(
                "Column '{}' already exists",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Rename columns found in `map` (old name → new name)
    pub fn rename_columns(&mut self, map: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new_name) = map.get(&column.name) {
                column.name = new_name.clone();
            }
        }
    }

    /// New frame with the named columns in the given order
    pub fn select(&self, names: &[String]) -> Result<Frame> {
        let columns = names
            .iter()
            .map(|n| self.require(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Frame { columns })
    }

    /// New frame made of the given row indices (repeats allowed)
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                Column::new(
                    c.name.clone(),
                    indices
                        .iter()
                        .map(|&i| c.values.get(i).cloned().unwrap_or(Cell::Missing))
                        .collect(),
                )
            })
            .collect();
        Frame { columns }
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Frame {
        let indices: Vec<usize> = (0..self.n_rows().min(n)).collect();
        self.take_rows(&indices)
    }

    /// Rows as display strings
    pub fn rows_as_strings(&self) -> Vec<Vec<String>> {
        (0..self.n_rows())
            .map(|r| self.columns.iter().map(|c| c.values[r].display()).collect())
            .collect()
    }

    /// Render the first `max_rows` rows as a [`Table`]
    pub fn to_table(&self, max_rows: usize) -> Table {
        let head = self.head(max_rows);
        Table {
            columns: head.column_names(),
            rows: head.rows_as_strings(),
        }
    }
}

/// Decode raw bytes as UTF-8 (BOM stripped) or Latin-1
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn read_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Suffix repeated header names with `.1`, `.2`, ..., skipping suffixes
/// already taken by another header
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let names: Vec<String> = names.into_iter().map(|raw| raw.trim().to_string()).collect();
    let mut used: HashSet<String> = names.iter().cloned().collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = counts.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return name;
            }
            let mut suffix = *count - 1;
            let mut candidate = format!("{}.{}", name, suffix);
            while used.contains(&candidate) {
                suffix += 1;
                candidate = format!("{}.{}", name, suffix);
            }
            *count = suffix + 1;
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Rendered string table for API responses
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// HTML `<table>` with every cell escaped
    pub fn to_html(&self, class: &str) -> String {
        let mut html = format!("<table class=\"{}\">\n<thead><tr>", html_escape(class));
        for column in &self.columns {
            html.push_str(&format!("<th>{}</th>", html_escape(column)));
        }
        html.push_str("</tr></thead>\n<tbody>\n");
        for row in &self.rows {
            html.push_str("<tr>");
            for cell in row {
                html.push_str(&format!("<td>{}</td>", html_escape(cell)));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>");
        html
    }
}

/// Escape text for inclusion in HTML or SVG
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Age,How satisfied are you?,Gender\n21,Agree,F\n34,,M\n,Strongly agree,F\n";

    #[test]
    fn test_parse_cells_and_missing() {
        let frame = Frame::from_csv_str(SAMPLE).unwrap();
        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.n_cols(), 3);

        let age = frame.column("Age").unwrap();
        assert_eq!(age.values[0], Cell::Number(21.0));
        assert!(age.values[2].is_missing());
        assert!(age.is_numeric());

        let sat = frame.column("How satisfied are you?").unwrap();
        assert!(!sat.is_numeric());
        assert_eq!(sat.n_missing(), 1);
        assert_eq!(sat.unique_texts(), vec!["Agree", "Strongly agree"]);
    }

    #[test]
    fn test_latin1_fallback() {
        let bytes = b"name\nJos\xe9\n";
        let frame = Frame::from_csv_bytes(bytes).unwrap();
        assert_eq!(
            frame.column("name").unwrap().values[0],
            Cell::Text("José".to_string())
        );
    }

    #[test]
    fn test_integral_numbers_written_without_decimals() {
        let frame = Frame::from_columns(vec![
            Column::from_numbers("q1", &[Some(1.0), Some(2.5), None]),
            Column::new(
                "q2",
                vec![Cell::Text("a".into()), Cell::Missing, Cell::Text("b".into())],
            ),
        ])
        .unwrap();
        assert_eq!(frame.to_csv_string().unwrap(), "q1,q2\n1,a\n2.5,\n,b\n");
    }

    #[test]
    fn test_positional_names_replace_header() {
        let names = vec!["q1".to_string(), "q2".to_string()];
        let frame = Frame::from_csv_with_names(SAMPLE, &names).unwrap();
        assert_eq!(frame.column_names(), vec!["q1", "q2", "Gender"]);
    }

    #[test]
    fn test_ragged_rows_padded() {
        let frame = Frame::from_csv_str("a,b\n1\n2,3,4\n").unwrap();
        assert_eq!(frame.n_cols(), 3);
        assert!(frame.column("b").unwrap().values[0].is_missing());
        assert_eq!(frame.column("Unnamed: 2").unwrap().values[1], Cell::Number(4.0));
    }

    #[test]
    fn test_duplicate_headers_suffixed() {
        let frame = Frame::from_csv_str("x,x,x\n1,2,3\n").unwrap();
        assert_eq!(frame.column_names(), vec!["x", "x.1", "x.2"]);
    }

    #[test]
    fn test_duplicate_header_suffix_skips_existing_name() {
        let frame = Frame::from_csv_str("A,A,A.1\n1,2,3\n").unwrap();
        assert_eq!(frame.column_names(), vec!["A", "A.2", "A.1"]);
        assert_eq!(frame.column("A.1").unwrap().values[0].as_f64(), Some(3.0));
    }

    #[test]
    fn test_take_rows_allows_repeats() {
        let frame = Frame::from_csv_str(SAMPLE).unwrap();
        let picked = frame.take_rows(&[1, 1, 0]);
        assert_eq!(picked.n_rows(), 3);
        assert_eq!(
            picked.column("Gender").unwrap().values,
            vec![
                Cell::Text("M".into()),
                Cell::Text("M".into()),
                Cell::Text("F".into())
            ]
        );
    }

    #[test]
    fn test_push_column_length_checked() {
        let mut frame = Frame::from_csv_str(SAMPLE).unwrap();
        let err = frame
            .push_column(Column::from_numbers("bad", &[Some(1.0)]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_table_html_is_escaped() {
        let mut table = Table::new(vec!["<b>".to_string()]);
        table.push_row(vec!["a & b".to_string()]);
        let html = table.to_html("data");
        assert!(html.contains("<th>&lt;b&gt;</th>"));
        assert!(html.contains("<td>a &amp; b</td>"));
    }
}
