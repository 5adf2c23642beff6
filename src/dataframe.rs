//! Column-major dataset for attribution analysis.
//!
//! A [`DataFrame`] stores named, typed columns with a compact validity
//! bitmap for missing cells. Analysis code never reads raw column storage
//! directly: it asks for a column's *numeric coercion*, which maps every cell
//! to `Some(f64)` or `None` regardless of the column's inferred type.
//!
//! # Column Types
//!
//! | Type | Storage | Numeric coercion |
//! |------|---------|------------------|
//! | [`Numeric`](Column::Numeric) | `Vec<f64>` + bitmap | the value (NaN → `None`) |
//! | [`Boolean`](Column::Boolean) | `Vec<bool>` + bitmap | `1.0` / `0.0` |
//! | [`Categorical`](Column::Categorical) | Dictionary + `Vec<u32>` | parsed label, else `None` |
//! | [`Text`](Column::Text) | `Vec<String>` + bitmap | parsed text, else `None` |
//!
//! # Example
//!
//! ```
//! use u_attribution::dataframe::{Column, DataFrame};
//!
//! let mut df = DataFrame::new();
//! df.add_column("spend".to_string(), Column::from_f64(vec![20.5, f64::NAN, 19.8]))
//!     .unwrap();
//! df.add_column("segment".to_string(), Column::from_strings(&["a", "7", "b"]))
//!     .unwrap();
//!
//! assert_eq!(df.row_count(), 3);
//! assert_eq!(df.coerce_numeric("spend").unwrap(), vec![Some(20.5), None, Some(19.8)]);
//! assert_eq!(df.coerce_numeric("segment").unwrap(), vec![None, Some(7.0), None]);
//! ```

use crate::error::AttributionError;

// ── ValidityBitmap ────────────────────────────────────────────────────

/// Bit-packed validity bitmap, one bit per row (1 = present, 0 = missing).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityBitmap {
    bits: Vec<u64>,
    len: usize,
}

impl ValidityBitmap {
    /// Creates a bitmap where all `len` positions are valid.
    pub fn all_valid(len: usize) -> Self {
        let n_words = len.div_ceil(64);
        let mut bits = vec![u64::MAX; n_words];
        let trailing = len % 64;
        if trailing != 0 && n_words > 0 {
            bits[n_words - 1] = (1u64 << trailing) - 1;
        }
        Self { bits, len }
    }

    /// Creates a bitmap where all `len` positions are missing.
    pub fn all_invalid(len: usize) -> Self {
        Self {
            bits: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    /// Creates an empty bitmap with no rows.
    pub fn empty() -> Self {
        Self {
            bits: Vec::new(),
            len: 0,
        }
    }

    /// Returns `true` if the value at `idx` is present.
    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len, "index {idx} out of bounds (len={})", self.len);
        (self.bits[idx / 64] >> (idx % 64)) & 1 == 1
    }

    /// Marks position `idx` as missing.
    #[inline]
    pub fn set_invalid(&mut self, idx: usize) {
        debug_assert!(idx < self.len, "index {idx} out of bounds (len={})", self.len);
        self.bits[idx / 64] &= !(1u64 << (idx % 64));
    }

    /// Appends a new position.
    pub fn push(&mut self, valid: bool) {
        let idx = self.len;
        self.len += 1;
        if idx / 64 >= self.bits.len() {
            self.bits.push(0);
        }
        if valid {
            self.bits[idx / 64] |= 1u64 << (idx % 64);
        }
    }

    /// Returns the number of tracked positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the bitmap tracks zero positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counts missing positions.
    pub fn null_count(&self) -> usize {
        let valid: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        self.len - valid
    }
}

// ── DataType ──────────────────────────────────────────────────────────

/// Semantic data type inferred for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Continuous or integer numeric values (stored as `f64`).
    Numeric,
    /// Boolean (true/false) values.
    Boolean,
    /// Low-cardinality strings (dictionary-encoded).
    Categorical,
    /// High-cardinality or free-form text, including date-like strings.
    Text,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "Numeric"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Categorical => write!(f, "Categorical"),
            Self::Text => write!(f, "Text"),
        }
    }
}

// ── Column ────────────────────────────────────────────────────────────

/// A typed column with a validity bitmap.
///
/// Missing positions hold a placeholder (0.0, false, index 0, empty string)
/// that is never observed through the public accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Dense `f64` values.
    Numeric {
        values: Vec<f64>,
        validity: ValidityBitmap,
    },
    /// Boolean values.
    Boolean {
        values: Vec<bool>,
        validity: ValidityBitmap,
    },
    /// Dictionary-encoded labels.
    Categorical {
        dictionary: Vec<String>,
        indices: Vec<u32>,
        validity: ValidityBitmap,
    },
    /// Free-form strings.
    Text {
        values: Vec<String>,
        validity: ValidityBitmap,
    },
}

impl Column {
    /// Creates a numeric column.
    pub fn numeric(values: Vec<f64>, validity: ValidityBitmap) -> Self {
        Self::Numeric { values, validity }
    }

    /// Creates a boolean column.
    pub fn boolean(values: Vec<bool>, validity: ValidityBitmap) -> Self {
        Self::Boolean { values, validity }
    }

    /// Creates a categorical column from a dictionary and indices.
    pub fn categorical(
        dictionary: Vec<String>,
        indices: Vec<u32>,
        validity: ValidityBitmap,
    ) -> Self {
        Self::Categorical {
            dictionary,
            indices,
            validity,
        }
    }

    /// Creates a text column.
    pub fn text(values: Vec<String>, validity: ValidityBitmap) -> Self {
        Self::Text { values, validity }
    }

    /// Creates a numeric column from raw floats; NaN cells become missing.
    pub fn from_f64(values: Vec<f64>) -> Self {
        let mut validity = ValidityBitmap::empty();
        let values = values
            .into_iter()
            .map(|v| {
                validity.push(!v.is_nan());
                if v.is_nan() {
                    0.0
                } else {
                    v
                }
            })
            .collect();
        Self::Numeric { values, validity }
    }

    /// Creates a fully valid text column.
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Text {
            values: values.iter().map(|s| s.as_ref().to_string()).collect(),
            validity: ValidityBitmap::all_valid(values.len()),
        }
    }

    /// Returns the data type of this column.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Numeric { .. } => DataType::Numeric,
            Self::Boolean { .. } => DataType::Boolean,
            Self::Categorical { .. } => DataType::Categorical,
            Self::Text { .. } => DataType::Text,
        }
    }

    /// Returns the number of rows in this column.
    pub fn len(&self) -> usize {
        self.validity().len()
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the validity bitmap.
    pub fn validity(&self) -> &ValidityBitmap {
        match self {
            Self::Numeric { validity, .. }
            | Self::Boolean { validity, .. }
            | Self::Categorical { validity, .. }
            | Self::Text { validity, .. } => validity,
        }
    }

    /// Returns the number of missing values.
    pub fn null_count(&self) -> usize {
        self.validity().null_count()
    }

    /// Returns `true` if the value at `idx` is present.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.validity().is_valid(idx)
    }

    /// Returns the raw numeric storage, or `None` for non-numeric columns.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Self::Numeric { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Returns the raw boolean storage, or `None` for non-boolean columns.
    pub fn as_boolean(&self) -> Option<&[bool]> {
        match self {
            Self::Boolean { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Returns the string form of a present cell, `None` for missing cells.
    ///
    /// Numbers use Rust's shortest round-trip formatting.
    pub fn display_at(&self, idx: usize) -> Option<String> {
        if !self.is_valid(idx) {
            return None;
        }
        match self {
            Self::Numeric { values, .. } => Some(format_number(values[idx])),
            Self::Boolean { values, .. } => Some(values[idx].to_string()),
            Self::Categorical {
                dictionary,
                indices,
                ..
            } => dictionary.get(indices[idx] as usize).cloned(),
            Self::Text { values, .. } => Some(values[idx].clone()),
        }
    }

    /// Coerces the cell at `idx` to a number.
    ///
    /// Missing cells, NaN, and strings that do not parse as `f64` yield
    /// `None`. Infinite values are numbers and are returned as-is.
    pub fn coerce_at(&self, idx: usize) -> Option<f64> {
        if !self.is_valid(idx) {
            return None;
        }
        let value = match self {
            Self::Numeric { values, .. } => values[idx],
            Self::Boolean { values, .. } => {
                if values[idx] {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Categorical {
                dictionary,
                indices,
                ..
            } => parse_number(dictionary.get(indices[idx] as usize)?)?,
            Self::Text { values, .. } => parse_number(&values[idx])?,
        };
        (!value.is_nan()).then_some(value)
    }

    /// Coerces every cell to a number (see [`coerce_at`](Self::coerce_at)).
    pub fn coerce_numeric(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|i| self.coerce_at(i)).collect()
    }

    /// Returns `true` when every present cell coerces to a number.
    pub fn is_numeric_like(&self) -> bool {
        match self {
            Self::Numeric { .. } | Self::Boolean { .. } => true,
            _ => (0..self.len()).all(|i| !self.is_valid(i) || self.coerce_at(i).is_some()),
        }
    }
}

/// Parses a trimmed string as `f64`; `None` on failure or NaN.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Formats a float the way it was most likely written: integers without a
/// fractional part, everything else in shortest round-trip form.
pub(crate) fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

// ── DataFrame ─────────────────────────────────────────────────────────

/// Column-major tabular data structure.
///
/// All columns have the same number of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
}

impl DataFrame {
    /// Creates an empty DataFrame with no columns or rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a DataFrame from `(name, column)` pairs.
    pub fn from_columns<I>(columns: I) -> Result<Self, AttributionError>
    where
        I: IntoIterator<Item = (String, Column)>,
    {
        let mut df = Self::new();
        for (name, column) in columns {
            df.add_column(name, column)?;
        }
        Ok(df)
    }

    /// Adds a named column.
    ///
    /// Fails if the column length differs from the existing row count
    /// (unless this is the first column).
    pub fn add_column(&mut self, name: String, column: Column) -> Result<(), AttributionError> {
        let col_len = column.len();
        if self.columns.is_empty() {
            self.row_count = col_len;
        } else if col_len != self.row_count {
            return Err(AttributionError::DimensionMismatch {
                expected: self.row_count,
                actual: col_len,
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Returns the number of rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the DataFrame has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Returns `true` if a column called `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Returns the column at `index`.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the column called `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Returns the column called `name` or [`AttributionError::ColumnNotFound`].
    pub fn require_column(&self, name: &str) -> Result<&Column, AttributionError> {
        self.column_by_name(name)
            .ok_or_else(|| AttributionError::ColumnNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Numeric coercion of a whole column, or `None` if it does not exist.
    pub fn coerce_numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column_by_name(name).map(Column::coerce_numeric)
    }

    /// Returns an iterator over `(name, column)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(|s| s.as_str()).zip(self.columns.iter())
    }

    /// Returns a summary of column data types.
    pub fn schema(&self) -> Vec<(&str, DataType)> {
        self.iter().map(|(name, col)| (name, col.data_type())).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
