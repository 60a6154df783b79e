use arrow::array::{Array, ArrayRef};
use arrow::datatypes::Schema;
use arrow::ipc::reader::StreamReader;
use arrow::util::display::array_value_to_string;
use std::io::Cursor;
use std::sync::Arc;

use crate::dataset::{DataPoint, Dataset};
use crate::utils::AnalysisError;

/// Parse Arrow IPC Stream format data into a string-cell dataset
///
/// # Arguments
/// * `name` - Name for the resulting dataset
/// * `data` - Raw bytes in Arrow IPC Stream format
///
/// # Returns
/// * `Ok(Dataset)` with one data point per row; null cells are left out
/// * `Err(AnalysisError)` if parsing fails
///
/// # Note
/// Columns of any primitive or string type are accepted and rendered with
/// Arrow's display formatting, so numeric `VALUE` columns survive as text.
pub fn parse_arrow_ipc(name: String, data: &[u8]) -> Result<Dataset, AnalysisError> {
    if data.is_empty() {
        return Err(AnalysisError::ArrowError("empty input data".to_string()));
    }

    let cursor = Cursor::new(data);
    let reader = StreamReader::try_new(cursor, None)
        .map_err(|e| AnalysisError::ArrowError(format!("failed to create StreamReader: {}", e)))?;

    let mut dataset = Dataset::new(name);
    dataset.headers = field_names(reader.schema())?;

    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| AnalysisError::ArrowError(format!("failed to read batch: {}", e)))?;

        for row_idx in 0..batch.num_rows() {
            let mut point = DataPoint::new();
            for (col_idx, header) in dataset.headers.iter().enumerate() {
                if let Some(value) = extract_string_value(batch.column(col_idx), row_idx)? {
                    point.add_field(header.clone(), value);
                }
            }
            dataset.add_point(point);
        }
    }

    Ok(dataset)
}

fn field_names(schema: Arc<Schema>) -> Result<Vec<String>, AnalysisError> {
    if schema.fields().is_empty() {
        return Err(AnalysisError::ArrowError("schema has no fields".to_string()));
    }
    Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
}

/// Extract a cell as text; `None` for nulls
fn extract_string_value(array: &ArrayRef, index: usize) -> Result<Option<String>, AnalysisError> {
    if array.is_null(index) {
        return Ok(None);
    }
    array_value_to_string(array, index)
        .map(Some)
        .map_err(|e| AnalysisError::ArrowError(format!("failed to format cell: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use arrow::ipc::writer::StreamWriter;
    use arrow::record_batch::RecordBatch;

    fn create_test_arrow_data() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("PL_NAME", DataType::Utf8, false),
            Field::new("FET_NAME", DataType::Utf8, false),
            Field::new("VALUE", DataType::Float64, true),
            Field::new("UNIT", DataType::Utf8, true),
        ]));

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["Caps", "Caps"])),
            Arc::new(StringArray::from(vec!["Capacitance", "Capacitance"])),
            Arc::new(Float64Array::from(vec![Some(4.7), None])),
            Arc::new(StringArray::from(vec![Some("uF"), Some("uF")])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buffer, &schema)?;
            writer.write(&batch)?;
            writer.finish()?;
        }

        Ok(buffer)
    }

    #[test]
    fn test_parse_arrow_ipc_normal() {
        let data = create_test_arrow_data().unwrap();
        let dataset = parse_arrow_ipc("caps".to_string(), &data).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.headers, vec!["PL_NAME", "FET_NAME", "VALUE", "UNIT"]);
        assert_eq!(dataset.data[0].get_field("VALUE"), Some(&"4.7".to_string()));
        assert_eq!(dataset.data[1].get_field("VALUE"), None);
        assert_eq!(dataset.data[1].get_field("UNIT"), Some(&"uF".to_string()));
    }

    #[test]
    fn test_parse_arrow_ipc_empty() {
        let result = parse_arrow_ipc("empty".to_string(), &[]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty input"));
    }

    #[test]
    fn test_parse_arrow_ipc_garbage() {
        let result = parse_arrow_ipc("bad".to_string(), b"not arrow");
        assert!(matches!(result, Err(AnalysisError::ArrowError(_))));
    }
}
