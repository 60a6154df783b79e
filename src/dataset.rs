use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

use crate::config::ColumnNames;
use crate::record::Record;
use crate::utils::AnalysisError;

/// Represents a single table row with named string cells
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataPoint {
    pub fields: HashMap<String, String>,
}

impl DataPoint {
    /// Create a new data point
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the data point
    pub fn add_field(&mut self, key: String, value: String) {
        self.fields.insert(key, value);
    }

    /// Get a field value
    pub fn get_field(&self, key: &str) -> Option<&String> {
        self.fields.get(key)
    }

    /// Get a field value that is present and not blank
    pub fn get_present(&self, key: &str) -> Option<&str> {
        self.get_field(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A named table of string cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    /// Declared column names, in source order
    #[serde(default)]
    pub headers: Vec<String>,
    pub data: Vec<DataPoint>,
}

/// Records pulled out of a dataset, with the count of rows dropped for
/// missing or blank required cells
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub dropped: usize,
}

impl Dataset {
    /// Create a new empty dataset
    pub fn new(name: String) -> Self {
        Self {
            name,
            headers: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Add a data point to the dataset
    pub fn add_point(&mut self, point: DataPoint) {
        self.data.push(point);
    }

    /// Get the number of data points
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get all field names: declared headers plus any key seen in a row
    pub fn get_field_names(&self) -> Vec<String> {
        let mut fields: BTreeSet<String> = self.headers.iter().cloned().collect();
        for point in &self.data {
            fields.extend(point.fields.keys().cloned());
        }
        fields.into_iter().collect()
    }

    /// Load dataset from CSV
    pub fn from_csv(name: String, csv_data: &str) -> crate::Result<Self> {
        Self::from_csv_reader(name, csv_data.as_bytes())
    }

    /// Load dataset from any CSV source
    pub fn from_csv_reader<R: std::io::Read>(name: String, source: R) -> crate::Result<Self> {
        let mut dataset = Dataset::new(name);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        dataset.headers = headers.iter().map(str::to_string).collect();

        for result in reader.records() {
            let record = result?;
            let mut point = DataPoint::new();

            for (i, field) in record.iter().enumerate() {
                if let Some(header) = headers.get(i) {
                    point.add_field(header.to_string(), field.to_string());
                }
            }
            dataset.add_point(point);
        }

        Ok(dataset)
    }

    /// Load dataset from JSON array of objects; `null` cells are left out
    pub fn from_json(name: String, json_data: &str) -> crate::Result<Self> {
        let mut dataset = Dataset::new(name);
        let data: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(json_data)?;

        for item in data {
            let mut point = DataPoint::new();
            for (key, value) in item {
                if !dataset.headers.contains(&key) {
                    dataset.headers.push(key.clone());
                }
                let value_str = match value {
                    serde_json::Value::Null => continue,
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    other => other.to_string(),
                };
                point.add_field(key, value_str);
            }
            dataset.add_point(point);
        }

        Ok(dataset)
    }

    /// Resolve a configured column name against the dataset's fields,
    /// ignoring case and surrounding whitespace
    pub fn resolve_column(&self, wanted: &str) -> Option<String> {
        let wanted = wanted.trim();
        self.get_field_names()
            .into_iter()
            .find(|field| field.trim().eq_ignore_ascii_case(wanted))
    }

    /// Extract typed records
    ///
    /// Family, feature, value and unit columns are always required;
    /// `require_value_id` adds the value identifier column. Missing columns
    /// fail with a schema error before any row is read. Rows with a missing
    /// or blank required cell are dropped and counted.
    pub fn extract_records(
        &self,
        columns: &ColumnNames,
        require_value_id: bool,
    ) -> crate::Result<Extraction> {
        let mut missing = Vec::new();
        let mut resolve = |name: &str, required: bool| {
            let found = self.resolve_column(name);
            if found.is_none() && required {
                missing.push(name.to_string());
            }
            found
        };

        let family = resolve(&columns.family, true);
        let feature = resolve(&columns.feature, true);
        let value_id = resolve(&columns.value_id, require_value_id);
        let value = resolve(&columns.value, true);
        let unit = resolve(&columns.unit, true);

        let (Some(family), Some(feature), Some(value), Some(unit)) = (family, feature, value, unit)
        else {
            return Err(AnalysisError::missing_columns(missing));
        };
        if !missing.is_empty() {
            return Err(AnalysisError::missing_columns(missing));
        }

        let mut records = Vec::with_capacity(self.len());
        let mut dropped = 0;

        for point in &self.data {
            let id = value_id.as_deref().and_then(|col| point.get_present(col));
            let cells = (
                point.get_present(&family),
                point.get_present(&feature),
                point.get_present(&value),
                point.get_present(&unit),
            );

            match cells {
                (Some(f), Some(fe), Some(v), Some(u)) if id.is_some() || !require_value_id => {
                    records.push(Record {
                        family: f.to_string(),
                        feature: fe.to_string(),
                        value_id: id.map(str::to_string),
                        raw_value: Some(v.to_string()),
                        unit: Some(u.to_string()),
                    });
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            info!(
                dataset = %self.name,
                dropped,
                kept = records.len(),
                "dropped rows with missing required cells"
            );
        }

        Ok(Extraction { records, dropped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMETRIC_CSV: &str = "PL_NAME,FET_NAME,VALUE_ID,VALUE,UNIT\n\
        Resistors,Resistance,1,10,Ohm\n\
        Resistors,Resistance,2,,Ohm\n\
        Resistors,Color,3,Blue,-\n\
        Resistors,Tolerance,4,5,\n";

    #[test]
    fn test_data_point_creation() {
        let mut point = DataPoint::new();
        point.add_field("name".to_string(), "test".to_string());
        point.add_field("blank".to_string(), "  ".to_string());

        assert_eq!(point.get_field("name"), Some(&"test".to_string()));
        assert_eq!(point.get_present("blank"), None);
        assert_eq!(point.get_present("missing"), None);
    }

    #[test]
    fn test_csv_loading() {
        let dataset = Dataset::from_csv("parts".to_string(), PARAMETRIC_CSV).unwrap();

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.headers.len(), 5);
        assert_eq!(
            dataset.data[0].get_field("FET_NAME"),
            Some(&"Resistance".to_string())
        );
    }

    #[test]
    fn test_json_loading_skips_null() {
        let json_data = r#"[
            {"PL_NAME": "Fuses", "FET_NAME": "Current", "VALUE": 2, "UNIT": "A"},
            {"PL_NAME": "Fuses", "FET_NAME": "Current", "VALUE": null, "UNIT": "A"}
        ]"#;
        let dataset = Dataset::from_json("fuses".to_string(), json_data).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.data[0].get_field("VALUE"), Some(&"2".to_string()));
        assert_eq!(dataset.data[1].get_field("VALUE"), None);
        assert_eq!(dataset.get_field_names(), vec!["FET_NAME", "PL_NAME", "UNIT", "VALUE"]);
    }

    #[test]
    fn test_extract_records_drops_incomplete_rows() {
        let dataset = Dataset::from_csv("parts".to_string(), PARAMETRIC_CSV).unwrap();
        let extraction = dataset
            .extract_records(&ColumnNames::default(), true)
            .unwrap();

        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.dropped, 2);
        assert_eq!(extraction.records[0].value_id.as_deref(), Some("1"));
        assert_eq!(extraction.records[1].raw_value.as_deref(), Some("Blue"));
    }

    #[test]
    fn test_extract_records_case_insensitive_columns() {
        let csv = "pl_name,Fet_Name,value,unit\nCaps,Capacitance,10,uF\n";
        let dataset = Dataset::from_csv("caps".to_string(), csv).unwrap();
        let extraction = dataset
            .extract_records(&ColumnNames::default(), false)
            .unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].family, "Caps");
        assert_eq!(extraction.records[0].value_id, None);
    }

    #[test]
    fn test_extract_records_schema_error() {
        let csv = "PL_NAME,VALUE\nCaps,10\n";
        let dataset = Dataset::from_csv("caps".to_string(), csv).unwrap();
        let err = dataset
            .extract_records(&ColumnNames::default(), false)
            .unwrap_err();

        match err {
            AnalysisError::Schema { missing } => assert_eq!(missing, vec!["FET_NAME", "UNIT"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_records_requires_value_id_for_detection() {
        let csv = "PL_NAME,FET_NAME,VALUE,UNIT\nCaps,Capacitance,10,uF\n";
        let dataset = Dataset::from_csv("caps".to_string(), csv).unwrap();
        let err = dataset
            .extract_records(&ColumnNames::default(), true)
            .unwrap_err();
        assert!(err.to_string().contains("VALUE_ID"));
    }

    #[test]
    fn test_empty_csv_with_headers_has_schema() {
        let csv = "PL_NAME,FET_NAME,VALUE,UNIT\n";
        let dataset = Dataset::from_csv("empty".to_string(), csv).unwrap();
        let extraction = dataset
            .extract_records(&ColumnNames::default(), false)
            .unwrap();
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.dropped, 0);
    }
}
