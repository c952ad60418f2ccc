//! CSV datasets summarised for chart prompts

use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value};

/// Column type as pandas would report it after `read_csv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Date,
    Text,
}

impl ColumnType {
    fn of(cell: &str) -> Self {
        if cell.parse::<i64>().is_ok() {
            ColumnType::Int
        } else if cell.parse::<f64>().is_ok() {
            ColumnType::Float
        } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
            ColumnType::Bool
        } else if chrono::NaiveDate::parse_from_str(cell, "%Y-%m-%d").is_ok()
            || chrono::DateTime::parse_from_rfc3339(cell).is_ok()
        {
            ColumnType::Date
        } else {
            ColumnType::Text
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::Int, ColumnType::Float) | (ColumnType::Float, ColumnType::Int) => {
                ColumnType::Float
            }
            _ => ColumnType::Text,
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Date => "object (ISO dates)",
            ColumnType::Text => "object",
        }
    }

    fn value(&self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Int => cell.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            ColumnType::Float => cell
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnType::Bool => Value::Bool(cell.eq_ignore_ascii_case("true")),
            ColumnType::Date | ColumnType::Text => Value::String(cell.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub has_missing: bool,
}

/// Column types, row count and the first few rows of a CSV file
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub columns: Vec<Column>,
    pub rows: usize,
    sample: Vec<Vec<String>>,
}

impl DatasetSummary {
    pub fn from_path(path: &Path, sample_rows: usize) -> anyhow::Result<Self> {
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;
        Self::from_reader(reader, sample_rows)
            .with_context(|| format!("Failed to read dataset {}", path.display()))
    }

    fn from_reader<R: std::io::Read>(
        mut reader: csv::Reader<R>,
        sample_rows: usize,
    ) -> anyhow::Result<Self> {
        let headers = reader.headers()?.clone();
        let mut kinds: Vec<Option<ColumnType>> = vec![None; headers.len()];
        let mut missing = vec![false; headers.len()];
        let mut sample = Vec::new();
        let mut rows = 0;

        for record in reader.records() {
            let record = record?;
            for (i, cell) in record.iter().enumerate().take(headers.len()) {
                let cell = cell.trim();
                if cell.is_empty() {
                    missing[i] = true;
                    continue;
                }
                let kind = ColumnType::of(cell);
                kinds[i] = Some(kinds[i].map_or(kind, |k| k.merge(kind)));
            }
            if sample.len() < sample_rows {
                sample.push(record.iter().map(|c| c.trim().to_string()).collect());
            }
            rows += 1;
        }

        let columns = headers
            .iter()
            .zip(kinds)
            .zip(missing)
            .map(|((name, kind), has_missing)| Column {
                name: name.to_string(),
                kind: kind.unwrap_or(ColumnType::Text),
                has_missing,
            })
            .collect();

        Ok(Self {
            columns,
            rows,
            sample,
        })
    }

    /// One `- name: dtype` line per column, then the row count
    pub fn schema_text(&self) -> String {
        if self.rows == 0 {
            return "The dataframe is empty.".to_string();
        }
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let missing = if c.has_missing { " (has missing values)" } else { "" };
                format!("- {}: {}{}", c.name, c.kind.dtype(), missing)
            })
            .collect();
        lines.push(format!("({} rows)", self.rows));
        lines.join("\n")
    }

    /// Sample rows as pretty-printed JSON records
    pub fn sample_json(&self) -> String {
        let records: Vec<Value> = self
            .sample
            .iter()
            .map(|row| {
                let record: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.name.clone(), col.kind.value(cell)))
                    .collect();
                Value::Object(record)
            })
            .collect();
        serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SALES: &str = "date,region,units,price,promo\n\
        2024-01-01,north,12,9.5,true\n\
        2024-01-02,south,7,10,false\n\
        2024-01-03,north,,11.25,false\n";

    fn summary(csv_text: &str, sample_rows: usize) -> DatasetSummary {
        DatasetSummary::from_reader(csv::Reader::from_reader(csv_text.as_bytes()), sample_rows)
            .unwrap()
    }

    #[test]
    fn test_infers_column_types() {
        let s = summary(SALES, 5);
        assert_eq!(s.rows, 3);
        let kinds: Vec<_> = s.columns.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnType::Date,
                ColumnType::Text,
                ColumnType::Int,
                ColumnType::Float,
                ColumnType::Bool
            ]
        );
        assert_eq!(
            s.schema_text(),
            "- date: object (ISO dates)\n- region: object\n- units: int64 (has missing values)\n\
             - price: float64\n- promo: bool\n(3 rows)"
        );
    }

    #[test]
    fn test_sample_rows_are_typed() {
        let s = summary(SALES, 2);
        let records: Value = serde_json::from_str(&s.sample_json()).unwrap();
        assert_eq!(
            records,
            json!([
                {"date": "2024-01-01", "region": "north", "units": 12, "price": 9.5, "promo": true},
                {"date": "2024-01-02", "region": "south", "units": 7, "price": 10.0, "promo": false}
            ])
        );
    }

    #[test]
    fn test_empty_dataset() {
        let s = summary("a,b\n", 5);
        assert_eq!(s.rows, 0);
        assert_eq!(s.schema_text(), "The dataframe is empty.");
        assert_eq!(s.sample_json(), "[]");
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetSummary::from_path(&dir.path().join("nope.csv"), 5).unwrap_err();
        assert!(format!("{:#}", err).contains("nope.csv"));
    }
}
