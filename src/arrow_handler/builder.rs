use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::config::ColumnNames;
use crate::report::{AnnotatedRecord, DetectionReport, ValidationReport};
use crate::utils::AnalysisError;

/// Build Arrow IPC result for anomaly detection
///
/// # Arguments
/// * `report` - Finished detection run; only reported anomalies are written
/// * `columns` - Column names used for the record identity fields
///
/// # Returns
/// * `Ok(Vec<u8>)` - Arrow IPC Stream format bytes
/// * `Err(AnalysisError)` - If building fails
pub fn build_anomaly_result(
    report: &DetectionReport,
    columns: &ColumnNames,
) -> Result<Vec<u8>, AnalysisError> {
    let rows: Vec<&AnnotatedRecord> = report.anomalies().collect();

    let schema = Arc::new(Schema::new(vec![
        Field::new(&columns.family, DataType::Utf8, false),
        Field::new(&columns.feature, DataType::Utf8, false),
        Field::new(&columns.value_id, DataType::Utf8, true),
        Field::new(&columns.value, DataType::Utf8, true),
        Field::new("VALUE_NUMERIC", DataType::Float64, true),
        Field::new(&columns.unit, DataType::Utf8, true),
        Field::new("AVERAGE", DataType::Float64, true),
        Field::new("MEDIAN", DataType::Float64, true),
        Field::new("GROUP", DataType::Utf8, false),
        Field::new("ISOLATION_SCORE", DataType::Float64, true),
        Field::new("ANOMALY", DataType::Boolean, false),
        Field::new("ANOMALY_REASON", DataType::Utf8, false),
    ]));

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.family.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.feature.as_str()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.value_id.as_deref()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.value.as_deref()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.numeric_value))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.unit.as_deref()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.average))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.median))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.group_key.as_str()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.isolation_score))),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.anomaly).collect::<Vec<_>>())),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.reason_text()))),
    ];

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| AnalysisError::ArrowError(format!("failed to create RecordBatch: {}", e)))?;

    serialize_to_ipc(schema, batch)
}

/// Build Arrow IPC result for baseline validation; every evaluated row is written
pub fn build_validation_result(
    report: &ValidationReport,
    columns: &ColumnNames,
) -> Result<Vec<u8>, AnalysisError> {
    let rows = &report.records;

    let schema = Arc::new(Schema::new(vec![
        Field::new(&columns.family, DataType::Utf8, false),
        Field::new(&columns.feature, DataType::Utf8, false),
        Field::new(&columns.value_id, DataType::Utf8, true),
        Field::new(&columns.value, DataType::Utf8, true),
        Field::new("VALUE_NUMERIC", DataType::Float64, true),
        Field::new(&columns.unit, DataType::Utf8, true),
        Field::new("GROUP", DataType::Utf8, false),
        Field::new("ANOMALY", DataType::Boolean, false),
        Field::new("ANOMALY_REASON", DataType::Utf8, false),
        Field::new("VALIDATION_STATUS", DataType::Utf8, false),
        Field::new("REFERENCE_MEAN", DataType::Float64, true),
        Field::new("REFERENCE_STDDEV", DataType::Float64, true),
        Field::new("REFERENCE_COUNT", DataType::UInt64, false),
    ]));

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.family.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.feature.as_str()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.value_id.as_deref()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.value.as_deref()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.numeric_value))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.unit.as_deref()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.group_key.as_str()))),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.anomaly).collect::<Vec<_>>())),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.reason_text()))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.validation_status.as_str()),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.reference_mean))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.reference_stddev))),
        Arc::new(UInt64Array::from_iter_values(
            rows.iter().map(|r| r.reference_count as u64),
        )),
    ];

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| AnalysisError::ArrowError(format!("failed to create RecordBatch: {}", e)))?;

    serialize_to_ipc(schema, batch)
}

/// Serialize RecordBatch to Arrow IPC Stream format
fn serialize_to_ipc(schema: Arc<Schema>, batch: RecordBatch) -> Result<Vec<u8>, AnalysisError> {
    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, &schema).map_err(|e| {
            AnalysisError::ArrowError(format!("failed to create StreamWriter: {}", e))
        })?;
        writer
            .write(&batch)
            .map_err(|e| AnalysisError::ArrowError(format!("failed to write batch: {}", e)))?;
        writer
            .finish()
            .map_err(|e| AnalysisError::ArrowError(format!("failed to finish writer: {}", e)))?;
    }
    Ok(buffer)
}
