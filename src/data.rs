//! Data
//!
//! Containers for the tabular data the estimators work on: the named-column
//! [`Dataset`], the borrowed [`Row`] view used for (counterfactual) prediction,
//! and the column-major [`Matrix`] used for design matrices.
use crate::errors::CausalError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column oriented table of named numeric columns.
///
/// Every column has the same number of records. Missing values are encoded
/// as `NaN`; they are tolerated in storage but rejected by
/// [`Dataset::check_complete`] for any column a model references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    lookup: HashMap<String, usize>,
    rows: usize,
}

impl Dataset {
    /// Create a new dataset from `(name, values)` pairs.
    ///
    /// * `columns` - Named columns, all of the same length.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self, CausalError> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        let mut lookup = HashMap::with_capacity(columns.len());
        for (name, col) in columns {
            if col.len() != rows {
                return Err(CausalError::InvalidData(format!(
                    "column {} has {} records, expected {}",
                    name,
                    col.len(),
                    rows
                )));
            }
            if lookup.insert(name.clone(), names.len()).is_some() {
                return Err(CausalError::InvalidParameter(
                    "columns".to_string(),
                    "unique column names".to_string(),
                    name,
                ));
            }
            names.push(name);
            values.push(col);
        }
        Ok(Dataset {
            names,
            columns: values,
            lookup,
            rows,
        })
    }

    /// Create a dataset from row records.
    ///
    /// * `names` - Column names, in the order values appear in each record.
    /// * `records` - One slice of values per record.
    pub fn from_rows<S: AsRef<str>>(names: &[S], records: &[Vec<f64>]) -> Result<Self, CausalError> {
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); names.len()];
        for (i, record) in records.iter().enumerate() {
            if record.len() != names.len() {
                return Err(CausalError::InvalidData(format!(
                    "record {} has {} values, expected {}",
                    i,
                    record.len(),
                    names.len()
                )));
            }
            for (col, v) in columns.iter_mut().zip(record) {
                col.push(*v);
            }
        }
        Dataset::new(
            names
                .iter()
                .map(|n| n.as_ref().to_string())
                .zip(columns)
                .collect(),
        )
    }

    /// Number of records.
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// Names of all columns, in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Does the dataset contain the column `name`?
    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Get an entire column by name.
    pub fn column(&self, name: &str) -> Result<&[f64], CausalError> {
        self.lookup
            .get(name)
            .map(|&i| self.columns[i].as_slice())
            .ok_or_else(|| CausalError::UnknownColumn(name.to_string()))
    }

    /// Get a view of the `i`th record.
    pub fn row(&self, i: usize) -> Row<'_> {
        Row {
            data: self,
            index: i,
            forced: None,
        }
    }

    /// Iterate over all records.
    pub fn iter_rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Return a copy of the dataset with `name` added, or replaced if present.
    pub fn with_column(&self, name: &str, values: Vec<f64>) -> Result<Dataset, CausalError> {
        let mut columns: Vec<(String, Vec<f64>)> = self
            .names
            .iter()
            .cloned()
            .zip(self.columns.iter().cloned())
            .filter(|(n, _)| n != name)
            .collect();
        columns.push((name.to_string(), values));
        Dataset::new(columns)
    }

    /// Build a new dataset from the records at `indices`, repeats allowed.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        let columns: Vec<Vec<f64>> = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i]).collect())
            .collect();
        Dataset {
            names: self.names.clone(),
            columns,
            lookup: self.lookup.clone(),
            rows: indices.len(),
        }
    }

    /// Verify the complete-case invariant for the given columns.
    ///
    /// Fails on the first column that is absent or contains missing values.
    pub fn check_complete<I, S>(&self, columns: I) -> Result<(), CausalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in columns {
            let name = name.as_ref();
            let count = self.column(name)?.iter().filter(|v| v.is_nan()).count();
            if count > 0 {
                return Err(CausalError::MissingData {
                    column: name.to_string(),
                    count,
                });
            }
        }
        Ok(())
    }

    /// Verify that every value of `name` is exactly 0 or 1.
    pub fn check_binary(&self, name: &str) -> Result<(), CausalError> {
        match self.column(name)?.iter().find(|&&v| v != 0.0 && v != 1.0) {
            Some(v) => Err(CausalError::InvalidData(format!(
                "column {} must be binary (0/1), found {}",
                name, v
            ))),
            None => Ok(()),
        }
    }
}

/// Borrowed view of one record of a [`Dataset`].
///
/// A row may carry a single forced value (`with_override`), which shadows the
/// stored value of that column. Estimators use this to predict under
/// counterfactual treatment assignments without copying the data.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    data: &'a Dataset,
    index: usize,
    forced: Option<(&'a str, f64)>,
}

impl<'a> Row<'a> {
    /// Position of the record in its dataset.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of column `name` for this record.
    pub fn get(&self, name: &str) -> Result<f64, CausalError> {
        if let Some((column, value)) = self.forced {
            if column == name {
                return Ok(value);
            }
        }
        Ok(self.data.column(name)?[self.index])
    }

    /// The same record, with `column` forced to `value`.
    pub fn with_override(self, column: &'a str, value: f64) -> Row<'a> {
        Row {
            forced: Some((column, value)),
            ..self
        }
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.index)
            .field("forced", &self.forced)
            .finish()
    }
}

/// Contiguous Column Major Matrix data container.
///
/// Design matrices are stored column-major, so each model term is a
/// contiguous slice.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`, `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}
