//! Column-oriented topic-distribution tables.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::store::{read_json, write_json};

/// Typed values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnData {
    /// Integer identifiers or counts.
    Int(Vec<i64>),
    /// Probabilities or sentinel fill.
    Float(Vec<f64>),
    /// Free text such as document identifiers.
    Text(Vec<String>),
}

impl ColumnData {
    /// Number of values in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Text(values) => values.len(),
        }
    }

    /// Returns `true` when the column holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named column of a [`DistributionTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Column values.
    pub values: ColumnData,
}

impl Column {
    /// Creates a float column repeating `value` `height` times.
    #[must_use]
    pub fn filled(name: impl Into<String>, value: f64, height: usize) -> Self {
        Self {
            name: name.into(),
            values: ColumnData::Float(vec![value; height]),
        }
    }
}

/// Ordered collection of uniquely named, equally tall columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Column>", into = "Vec<Column>")]
pub struct DistributionTable {
    columns: Vec<Column>,
}

impl TryFrom<Vec<Column>> for DistributionTable {
    type Error = SweepError;

    fn try_from(columns: Vec<Column>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<DistributionTable> for Vec<Column> {
    fn from(table: DistributionTable) -> Self {
        table.columns
    }
}

impl DistributionTable {
    /// Builds a table, rejecting duplicate names and ragged columns.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Appends a column.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.contains(&column.name) {
            return Err(SweepError::InvalidConfig(format!(
                "duplicate column {:?}",
                column.name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.values.len() != column.values.len() {
                return Err(SweepError::InvalidConfig(format!(
                    "column {:?} has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    first.values.len()
                )));
            }
        }
        self.columns.push(column);
        Ok(())
    }

    /// Number of rows; `0` for a table without columns.
    #[must_use]
    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |column| column.values.len())
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Columns in their current order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in their current order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns `true` when a column called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of `reference` columns absent from `self`, sorted lexicographically.
    #[must_use]
    pub fn missing_from(&self, reference: &Self) -> Vec<String> {
        let own: FxHashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let mut missing: Vec<String> = reference
            .columns
            .iter()
            .filter(|column| !own.contains(column.name.as_str()))
            .map(|column| column.name.clone())
            .collect();
        missing.sort();
        missing
    }

    /// Reorders columns lexicographically by name.
    pub fn sort_columns(&mut self) {
        self.columns.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Reads a table from `.json` or `.csv`, chosen by extension.
    pub fn read(path: &Path) -> Result<Self> {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::read_csv(path)
        } else {
            read_json(path)
        }
    }

    /// Atomically writes the table as JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Reads a CSV file, inferring each column as integer, float, or text.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| SweepError::io(err, Some(path.to_path_buf())))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (cells, value) in raw.iter_mut().zip(record.iter()) {
                cells.push(value.to_owned());
            }
        }
        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, cells)| Column {
                name,
                values: infer(cells),
            })
            .collect();
        Self::new(columns)
    }
}

fn infer(cells: Vec<String>) -> ColumnData {
    let ints: std::result::Result<Vec<i64>, _> =
        cells.iter().map(|cell| cell.trim().parse::<i64>()).collect();
    if let Ok(ints) = ints {
        return ColumnData::Int(ints);
    }
    let floats: std::result::Result<Vec<f64>, _> =
        cells.iter().map(|cell| cell.trim().parse::<f64>()).collect();
    if let Ok(floats) = floats {
        return ColumnData::Float(floats);
    }
    ColumnData::Text(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_duplicate_and_ragged_columns() {
        let doc = Column {
            name: "doc".into(),
            values: ColumnData::Int(vec![1, 2]),
        };
        assert!(DistributionTable::new(vec![doc.clone(), doc.clone()]).is_err());
        assert!(DistributionTable::new(vec![doc, Column::filled("t1", 0.0, 3)]).is_err());
    }

    #[test]
    fn csv_columns_are_typed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("topic_dist.csv");
        fs::write(&path, "doc,source,topic_1\n1,fomc,0.25\n2,press,0.75\n").expect("write csv");
        let table = DistributionTable::read(&path).expect("read csv");
        assert_eq!(table.height(), 2);
        assert_eq!(table.column_names(), vec!["doc", "source", "topic_1"]);
        assert!(matches!(table.columns()[0].values, ColumnData::Int(_)));
        assert!(matches!(table.columns()[1].values, ColumnData::Text(_)));
        assert_eq!(
            table.columns()[2].values,
            ColumnData::Float(vec![0.25, 0.75])
        );
    }

    #[test]
    fn json_round_trip_validates() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("table.json");
        let table = DistributionTable::new(vec![
            Column::filled("b", 0.5, 2),
            Column::filled("a", -1.0, 2),
        ])
        .expect("table");
        table.write_json(&path).expect("write");
        assert_eq!(DistributionTable::read(&path).expect("read"), table);

        fs::write(
            &path,
            r#"[{"name":"a","values":{"float":[1.0]}},{"name":"a","values":{"int":[1]}}]"#,
        )
        .expect("write duplicate");
        assert!(DistributionTable::read(&path).is_err());
    }

    #[test]
    fn missing_columns_are_sorted() {
        let left = DistributionTable::new(vec![Column::filled("t2", 0.1, 1)]).expect("left");
        let right = DistributionTable::new(vec![
            Column::filled("t9", 0.1, 1),
            Column::filled("t2", 0.1, 1),
            Column::filled("t10", 0.1, 1),
        ])
        .expect("right");
        assert_eq!(left.missing_from(&right), vec!["t10", "t9"]);
        assert!(right.missing_from(&right).is_empty());
    }
}
