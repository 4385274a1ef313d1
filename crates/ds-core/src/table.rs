//! Columnar timeseries storage
//!
//! A [`TimeseriesTable`] keeps one append-only timestamp sequence and a set of
//! parallel scalar/vector columns. Every column covers exactly one value per
//! timestamp; columns introduced mid-stream are back-filled with zeros for all
//! earlier rows. The zeros are a storage trade-off, not missing-data
//! semantics. The table performs no timestamp-ordering validation — ordering
//! is the writer's and the index's concern.

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One sampled value: a scalar or a fixed-length vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl SampleValue {
    /// Number of components carried by this value.
    pub fn dimension(&self) -> usize {
        match self {
            SampleValue::Scalar(_) => 1,
            SampleValue::Vector(components) => components.len(),
        }
    }
}

/// A single timestamped sample across any number of measurement keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp: f64,
    pub values: AHashMap<String, SampleValue>,
}

impl TimeseriesPoint {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            values: AHashMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: SampleValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Kinds of columns a table can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Scalar,
    Vector,
}

/// Catalog entry describing one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnKind,
    pub dimension: usize,
}

/// Fixed-dimension vector column, stored flat in row-major order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorColumn {
    dimension: usize,
    values: Vec<f64>,
}

impl VectorColumn {
    fn zeroed(dimension: usize, rows: usize) -> Self {
        Self {
            dimension,
            values: vec![0.0; dimension * rows],
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row_count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.values.len() / self.dimension
        }
    }

    /// Components of one row.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.dimension)?;
        self.values.get(start..start + self.dimension)
    }

    /// Append one row, truncating or zero-padding to the column dimension.
    fn push_row(&mut self, components: &[f64]) {
        for d in 0..self.dimension {
            self.values.push(components.get(d).copied().unwrap_or(0.0));
        }
    }

    fn push_zero_row(&mut self) {
        self.values.extend(std::iter::repeat(0.0).take(self.dimension));
    }
}

/// Columnar in-memory store of timestamped samples.
///
/// Invariant: after every mutation, each column covers exactly
/// `timestamps.len()` rows.
#[derive(Debug, Clone, Default)]
pub struct TimeseriesTable {
    timestamps: Vec<f64>,
    scalar_columns: IndexMap<String, Vec<f64>>,
    vector_columns: IndexMap<String, VectorColumn>,
}

impl TimeseriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.scalar_columns.contains_key(key) || self.vector_columns.contains_key(key)
    }

    pub fn scalar_column(&self, key: &str) -> Option<&[f64]> {
        self.scalar_columns.get(key).map(Vec::as_slice)
    }

    pub fn vector_column(&self, key: &str) -> Option<&VectorColumn> {
        self.vector_columns.get(key)
    }

    /// Add a scalar column, zero-filled for all existing rows.
    ///
    /// No-op if the key already names a column.
    pub fn append_scalar_column(&mut self, key: &str) {
        if self.has_column(key) {
            return;
        }
        self.scalar_columns
            .insert(key.to_owned(), vec![0.0; self.timestamps.len()]);
    }

    /// Add a vector column of fixed `dimension`, zero-filled for all existing
    /// rows. No-op if the key already names a column.
    pub fn append_vector_column(&mut self, key: &str, dimension: usize) {
        if self.has_column(key) {
            return;
        }
        self.vector_columns
            .insert(key.to_owned(), VectorColumn::zeroed(dimension, self.timestamps.len()));
    }

    /// Append one row per point across every column, growing unseen columns
    /// first. A point that lacks a column's key contributes zero for that row.
    pub fn extend(&mut self, points: &[TimeseriesPoint]) {
        for point in points {
            for (key, value) in &point.values {
                if !self.has_column(key) {
                    match value {
                        SampleValue::Scalar(_) => self.append_scalar_column(key),
                        SampleValue::Vector(components) => {
                            self.append_vector_column(key, components.len())
                        }
                    }
                }
            }
        }

        for point in points {
            self.timestamps.push(point.timestamp);
            for (key, column) in &mut self.scalar_columns {
                match point.values.get(key.as_str()) {
                    Some(SampleValue::Scalar(value)) => column.push(*value),
                    _ => column.push(0.0),
                }
            }
            for (key, column) in &mut self.vector_columns {
                match point.values.get(key.as_str()) {
                    Some(SampleValue::Vector(components)) => column.push_row(components),
                    _ => column.push_zero_row(),
                }
            }
        }
    }

    /// Assemble the row at `index` back into a point.
    pub fn point_at(&self, index: usize) -> Option<TimeseriesPoint> {
        let timestamp = *self.timestamps.get(index)?;
        let mut values = AHashMap::new();
        for (key, column) in &self.scalar_columns {
            values.insert(key.clone(), SampleValue::Scalar(column[index]));
        }
        for (key, column) in &self.vector_columns {
            let components = column.row(index)?;
            values.insert(key.clone(), SampleValue::Vector(components.to_vec()));
        }
        Some(TimeseriesPoint { timestamp, values })
    }

    /// Definitions of every column: scalars first, then vectors, each in
    /// insertion order.
    pub fn column_catalog(&self) -> Vec<ColumnDefinition> {
        let mut definitions = Vec::with_capacity(self.scalar_columns.len() + self.vector_columns.len());
        for key in self.scalar_columns.keys() {
            definitions.push(ColumnDefinition {
                name: key.clone(),
                kind: ColumnKind::Scalar,
                dimension: 1,
            });
        }
        for (key, column) in &self.vector_columns {
            definitions.push(ColumnDefinition {
                name: key.clone(),
                kind: ColumnKind::Vector,
                dimension: column.dimension(),
            });
        }
        definitions
    }

    /// Check the parallel-length invariant; used by tests and debug asserts.
    pub fn columns_consistent(&self) -> bool {
        let rows = self.timestamps.len();
        self.scalar_columns.values().all(|column| column.len() == rows)
            && self
                .vector_columns
                .values()
                .all(|column| column.dimension() == 0 || column.row_count() == rows)
    }
}
