//! CSV loading with type inference, and the inverse writer used by snapshots.
//!
//! Column types are inferred from content in the order
//! Numeric → Boolean → Categorical → Text. Standard null markers (empty,
//! `NA`, `N/A`, `null`, `None`, `NaN`, ...) become missing cells.
//!
//! ```
//! use u_attribution::csv_parser::{load_dataset, CsvParser};
//! use u_attribution::dataframe::DataType;
//!
//! let csv = "Treatment,Outcome,Region\n1,10.5,north\n0,7.25,south\n1,12,north\n0,6,north\n0,5,north\n";
//! let df = CsvParser::new().parse_str(csv).unwrap();
//! assert_eq!(df.row_count(), 5);
//! assert_eq!(df.column_by_name("Outcome").unwrap().data_type(), DataType::Numeric);
//! assert_eq!(df.column_by_name("Region").unwrap().data_type(), DataType::Categorical);
//!
//! // Uploads are dispatched on the file name.
//! assert!(load_dataset(csv.as_bytes(), "campaign.csv").is_ok());
//! assert!(load_dataset(csv.as_bytes(), "campaign.xlsx").is_err());
//! ```

use std::collections::{HashMap, HashSet};

use crate::dataframe::{Column, DataFrame, DataType, ValidityBitmap};
use crate::error::AttributionError;

/// Null value markers recognized during parsing.
const DEFAULT_NULL_MARKERS: &[&str] = &[
    "", "NA", "N/A", "na", "n/a", "null", "NULL", "None", "none", "NaN", "nan", "NAN", "#N/A",
];

/// A column is Categorical when `unique / non_null` is below this ratio.
const CATEGORICAL_THRESHOLD: f64 = 0.5;

/// Maximum dictionary size for categorical columns.
const MAX_CATEGORICAL_UNIQUE: usize = 1000;

/// Loads an uploaded file into a [`DataFrame`], dispatching on its extension.
///
/// `.csv` content is decoded as UTF-8, falling back to ISO-8859-1 when the
/// bytes are not valid UTF-8. Spreadsheet formats are rejected with
/// [`AttributionError::UnsupportedFormat`].
pub fn load_dataset(content: &[u8], filename: &str) -> Result<DataFrame, AttributionError> {
    let lower = filename.to_ascii_lowercase();
    if !lower.ends_with(".csv") {
        return Err(AttributionError::UnsupportedFormat {
            filename: filename.to_string(),
        });
    }

    let text = match std::str::from_utf8(content) {
        Ok(s) => std::borrow::Cow::Borrowed(s),
        Err(_) => {
            tracing::debug!(filename, "input is not UTF-8, decoding as ISO-8859-1");
            std::borrow::Cow::Owned(decode_latin1(content))
        }
    };

    let df = CsvParser::new().parse_str(&text)?;
    tracing::info!(
        filename,
        rows = df.row_count(),
        columns = df.column_count(),
        "dataset loaded"
    );
    Ok(df)
}

/// ISO-8859-1 maps every byte to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// CSV parser configuration and entry point.
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
    has_header: bool,
    null_markers: Vec<String>,
}

impl CsvParser {
    /// Comma delimiter, header row, standard null markers.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Sets the field delimiter.
    pub fn delimiter(mut self, delim: u8) -> Self {
        self.delimiter = delim;
        self
    }

    /// Sets whether the first row is a header.
    pub fn has_header(mut self, header: bool) -> Self {
        self.has_header = header;
        self
    }

    /// Replaces the null markers.
    pub fn null_markers(mut self, markers: Vec<String>) -> Self {
        self.null_markers = markers;
        self
    }

    /// Parses CSV text into a DataFrame.
    pub fn parse_str(&self, input: &str) -> Result<DataFrame, AttributionError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);

        let rows = self.split_records(input);
        let Some(first) = rows.first() else {
            return Ok(DataFrame::new());
        };

        let (headers, data_rows) = if self.has_header {
            (first.clone(), &rows[1..])
        } else {
            let headers = (0..first.len()).map(|i| format!("col_{i}")).collect();
            (headers, &rows[..])
        };
        if data_rows.is_empty() {
            return Ok(DataFrame::new());
        }

        let n_cols = headers.len();
        let mut raw_columns: Vec<Vec<&str>> = vec![Vec::with_capacity(data_rows.len()); n_cols];
        for (row_idx, row) in data_rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(AttributionError::CsvParse {
                    line: row_idx + if self.has_header { 2 } else { 1 },
                    message: format!("expected {n_cols} fields, got {}", row.len()),
                });
            }
            for (col_idx, field) in row.iter().enumerate() {
                raw_columns[col_idx].push(field.trim());
            }
        }

        DataFrame::from_columns(
            headers
                .into_iter()
                .zip(raw_columns.iter().map(|raw| self.build_column(raw))),
        )
    }

    /// Reads and parses a CSV file from disk.
    pub fn parse_file(&self, path: &std::path::Path) -> Result<DataFrame, AttributionError> {
        let bytes = std::fs::read(path)?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("data.csv");
        if self.delimiter == b',' && self.has_header {
            load_dataset(&bytes, name)
        } else {
            self.parse_str(&String::from_utf8_lossy(&bytes))
        }
    }

    // ── Record splitting ─────────────────────────────────────────

    /// Splits RFC 4180 text into records of raw fields.
    ///
    /// Handles quoted fields, doubled quotes, embedded newlines, and
    /// `\n`, `\r\n`, or bare `\r` line endings. Blank lines are skipped.
    fn split_records(&self, input: &str) -> Vec<Vec<String>> {
        let delim = self.delimiter as char;
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut record: Vec<String> = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = input.chars().peekable();

        let mut end_record = |record: &mut Vec<String>, field: &mut String| {
            record.push(std::mem::take(field));
            if record.iter().all(|f| f.is_empty()) {
                record.clear();
            } else {
                rows.push(std::mem::take(record));
            }
        };

        while let Some(c) = chars.next() {
            if in_quotes {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    _ => field.push(c),
                }
                continue;
            }
            match c {
                '"' if field.is_empty() => in_quotes = true,
                c if c == delim => record.push(std::mem::take(&mut field)),
                '\n' => end_record(&mut record, &mut field),
                '\r' => {
                    if chars.peek() != Some(&'\n') {
                        end_record(&mut record, &mut field);
                    }
                }
                _ => field.push(c),
            }
        }
        if !field.is_empty() || !record.is_empty() {
            end_record(&mut record, &mut field);
        }
        rows
    }

    // ── Type inference ───────────────────────────────────────────

    fn is_null(&self, value: &str) -> bool {
        self.null_markers.iter().any(|m| m == value)
    }

    /// Infers the column type and builds a typed column.
    fn build_column(&self, values: &[&str]) -> Column {
        let nulls: Vec<bool> = values.iter().map(|v| self.is_null(v)).collect();
        let present: Vec<&str> = values
            .iter()
            .zip(&nulls)
            .filter(|(_, &null)| !null)
            .map(|(&v, _)| v)
            .collect();

        if present.is_empty() {
            return Column::numeric(vec![0.0; values.len()], ValidityBitmap::all_invalid(values.len()));
        }

        match infer_type(&present) {
            DataType::Numeric => {
                let mut validity = ValidityBitmap::empty();
                let nums = values
                    .iter()
                    .zip(&nulls)
                    .map(|(v, &null)| {
                        validity.push(!null);
                        if null {
                            0.0
                        } else {
                            v.parse::<f64>().unwrap_or(0.0)
                        }
                    })
                    .collect();
                Column::numeric(nums, validity)
            }
            DataType::Boolean => {
                let mut validity = ValidityBitmap::empty();
                let bools = values
                    .iter()
                    .zip(&nulls)
                    .map(|(v, &null)| {
                        validity.push(!null);
                        !null && is_truthy(v)
                    })
                    .collect();
                Column::boolean(bools, validity)
            }
            DataType::Categorical => {
                let mut lookup: HashMap<&str, u32> = HashMap::new();
                let mut dictionary: Vec<String> = Vec::new();
                let mut validity = ValidityBitmap::empty();
                let indices = values
                    .iter()
                    .zip(&nulls)
                    .map(|(&v, &null)| {
                        validity.push(!null);
                        if null {
                            return 0;
                        }
                        *lookup.entry(v).or_insert_with(|| {
                            dictionary.push(v.to_string());
                            (dictionary.len() - 1) as u32
                        })
                    })
                    .collect();
                Column::categorical(dictionary, indices, validity)
            }
            DataType::Text => {
                let mut validity = ValidityBitmap::empty();
                let texts = values
                    .iter()
                    .zip(&nulls)
                    .map(|(&v, &null)| {
                        validity.push(!null);
                        if null {
                            String::new()
                        } else {
                            v.to_string()
                        }
                    })
                    .collect();
                Column::text(texts, validity)
            }
        }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the most specific type that fits every present value.
fn infer_type(present: &[&str]) -> DataType {
    if present.iter().all(|s| s.parse::<f64>().is_ok()) {
        return DataType::Numeric;
    }
    if present.iter().all(|s| is_boolean_str(s)) {
        return DataType::Boolean;
    }
    let unique: HashSet<&str> = present.iter().copied().collect();
    let ratio = unique.len() as f64 / present.len() as f64;
    if ratio < CATEGORICAL_THRESHOLD && unique.len() <= MAX_CATEGORICAL_UNIQUE {
        DataType::Categorical
    } else {
        DataType::Text
    }
}

fn is_boolean_str(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no" | "t" | "f" | "y" | "n"
    )
}

fn is_truthy(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "t" | "y")
}

// ── Writer ────────────────────────────────────────────────────────────

/// Serializes a DataFrame as comma-separated CSV with a header row.
///
/// Missing cells are written empty; fields containing commas, quotes, or
/// line breaks are quoted.
pub fn write_csv(df: &DataFrame) -> String {
    let mut out = String::new();
    let header: Vec<String> = df.column_names().iter().map(|n| quote_field(n)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in 0..df.row_count() {
        let fields: Vec<String> = df
            .iter()
            .map(|(_, col)| col.display_at(row).map(|v| quote_field(&v)).unwrap_or_default())
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn quote_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
