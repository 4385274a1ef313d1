//! Historical fetch collaborator and row normalization
//!
//! Recorded mode acquires its table through a one-shot fetch against an
//! external REST collaborator. Row values arrive as numbers, arrays, or
//! comma-separated numeric strings; everything is normalized here before it
//! reaches the table. The first row fixes each requested key's kind (scalar
//! vs vector) and vector dimension.

use ahash::AHashMap;
use async_trait::async_trait;
use serde::Deserialize;

use ds_core::{ColumnDefinition, SampleValue, TimeseriesPoint, TimeseriesTable};

/// One fetched row: a timestamp plus the requested columns.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalRow {
    pub timestamp: f64,
    #[serde(flatten)]
    pub values: AHashMap<String, HistoricalValue>,
}

/// Value shapes the collaborator may deliver.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HistoricalValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

/// One-shot historical fetch and catalog listing.
#[async_trait]
pub trait HistoricalDataApi: Send + Sync {
    /// Fetch every row for the requested columns, oldest first.
    async fn fetch_rows(&self, columns: &[String]) -> anyhow::Result<Vec<HistoricalRow>>;

    /// Columns the backing project could provide.
    async fn available_columns(&self) -> anyhow::Result<Vec<ColumnDefinition>>;
}

/// Interpret a value as a vector: native arrays pass through, comma-separated
/// numeric strings are parsed. Anything else (including empty arrays and
/// strings with non-numeric parts) is not a vector.
fn parse_vector(value: &HistoricalValue) -> Option<Vec<f64>> {
    match value {
        HistoricalValue::Numbers(components) if !components.is_empty() => {
            Some(components.clone())
        }
        HistoricalValue::Text(text) if text.contains(',') => text
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok())
            .collect(),
        _ => None,
    }
}

fn parse_scalar(value: &HistoricalValue) -> Option<f64> {
    match value {
        HistoricalValue::Number(number) => Some(*number),
        HistoricalValue::Text(text) => text.trim().parse().ok(),
        HistoricalValue::Numbers(_) => None,
    }
}

/// Build a dense table from fetched rows. The first row decides each key's
/// kind; later rows that do not fit contribute zeros for their row.
pub fn build_table(rows: &[HistoricalRow], measurement_keys: &[String]) -> TimeseriesTable {
    let mut table = TimeseriesTable::new();
    let Some(first) = rows.first() else {
        return table;
    };

    let mut vector_keys: AHashMap<&str, usize> = AHashMap::new();
    for key in measurement_keys {
        match first.values.get(key).and_then(parse_vector) {
            Some(components) => {
                table.append_vector_column(key, components.len());
                vector_keys.insert(key.as_str(), components.len());
            }
            None => table.append_scalar_column(key),
        }
    }

    let points: Vec<TimeseriesPoint> = rows
        .iter()
        .map(|row| {
            let mut point = TimeseriesPoint::new(row.timestamp);
            for key in measurement_keys {
                let Some(value) = row.values.get(key) else {
                    continue;
                };
                if vector_keys.contains_key(key.as_str()) {
                    if let Some(components) = parse_vector(value) {
                        point
                            .values
                            .insert(key.clone(), SampleValue::Vector(components));
                    }
                } else if let Some(scalar) = parse_scalar(value) {
                    point.values.insert(key.clone(), SampleValue::Scalar(scalar));
                }
            }
            point
        })
        .collect();

    table.extend(&points);
    table
}
