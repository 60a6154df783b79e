use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dataset::{Dataset, Extraction};
use crate::insight_core::baseline::{BaselineOutcome, ReferenceBaseline, ValidationStatus};
use crate::insight_core::classify::{is_non_numeric_format_anomaly, ValueClass};
use crate::insight_core::controlled::{is_controlled, GroupAggregate};
use crate::insight_core::feature::{group_features, partition_by};
use crate::insight_core::majority::{family_majorities, majority_disagreement};
use crate::insight_core::model::run_isolation_forest;
use crate::insight_core::reason::{AnomalyReason, Annotation};
use crate::insight_core::units::ValidUnitTable;
use crate::record::Record;
use crate::report::{AnnotatedRecord, DetectionReport, ValidatedRecord, ValidationReport};

/// Anomaly detection and baseline validation over parametric records
///
/// The engine holds only configuration; every run is a pure function of its
/// input records (and the reference baseline for validation).
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    config: EngineConfig,
    units: ValidUnitTable,
}

/// Outlier scan result for one group
#[derive(Debug, Default)]
struct GroupScan {
    /// `(row index, isolation score, is outlier)`
    scored: Vec<(usize, f64, bool)>,
    /// Numeric values of the group, in row order
    values: Vec<f64>,
    aggregate: GroupAggregate,
}

impl AnomalyEngine {
    /// Create an engine with the default configuration and built-in unit table
    pub fn new() -> crate::Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine, loading the unit table named by the config if any
    pub fn with_config(config: EngineConfig) -> crate::Result<Self> {
        let units = match &config.units_path {
            Some(path) => ValidUnitTable::load(path)?,
            None => ValidUnitTable::builtin()?,
        };
        Self::with_units(config, units)
    }

    /// Create an engine over an already loaded unit table
    pub fn with_units(config: EngineConfig, units: ValidUnitTable) -> crate::Result<Self> {
        config.validate()?;
        if !units.diagnostics().is_empty() {
            warn!(
                diagnostics = units.diagnostics().len(),
                "unit table contains repeated keywords"
            );
        }
        Ok(Self { config, units })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn units(&self) -> &ValidUnitTable {
        &self.units
    }

    /// Unit plausibility for a single `(unit, feature)` pair
    pub fn validate_unit(&self, unit: Option<&str>, feature: &str) -> bool {
        self.units.validate_unit(unit, feature)
    }

    /// Extract records from a table and run detection on them
    pub fn detect_dataset(&self, dataset: &Dataset) -> crate::Result<DetectionReport> {
        let Extraction { records, dropped } =
            dataset.extract_records(&self.config.columns, true)?;
        Ok(self.detect_with_dropped(records, dropped))
    }

    /// Run the detection pipeline over in-memory records
    pub fn detect(&self, records: Vec<Record>) -> DetectionReport {
        self.detect_with_dropped(records, 0)
    }

    fn detect_with_dropped(&self, records: Vec<Record>, dropped: usize) -> DetectionReport {
        let classes: Vec<ValueClass> = records
            .iter()
            .map(|r| ValueClass::of(r.raw_value.as_deref()))
            .collect();
        let mut annotations = vec![Annotation::default(); records.len()];

        // Unit plausibility
        for (record, annotation) in records.iter().zip(annotations.iter_mut()) {
            if !self.validate_unit(record.unit.as_deref(), &record.feature) {
                annotation.flag(AnomalyReason::InvalidUnit);
            }
        }

        // Per-group isolation forest
        let group_keys: Vec<String> = records.iter().map(Record::group_key).collect();
        let groups = partition_by(&group_keys, |key| key.clone());
        let mut scans: BTreeMap<&str, GroupScan> = BTreeMap::new();
        for (key, rows) in &groups {
            let mut scan = self.scan_group(key, rows, &classes);
            for &(row, _, outlier) in &scan.scored {
                if outlier {
                    annotations[row].flag(AnomalyReason::IsolationForestOutlier);
                }
            }
            let has_outlier = rows
                .iter()
                .any(|&row| annotations[row].has(AnomalyReason::IsolationForestOutlier));
            scan.aggregate = GroupAggregate::for_group(&scan.values, has_outlier);
            scans.insert(key.as_str(), scan);
        }

        // Family majority type
        let majorities = family_majorities(
            records
                .iter()
                .zip(&classes)
                .map(|(r, c)| (r.family.as_str(), c.is_numeric_like)),
        );
        for (i, record) in records.iter().enumerate() {
            if let Some(reason) = majorities
                .get(record.family.as_str())
                .and_then(|&m| majority_disagreement(m, classes[i].is_numeric_like))
            {
                annotations[i].flag(reason);
            }
        }

        // Non-numeric format
        for (i, record) in records.iter().enumerate() {
            if !classes[i].is_numeric && is_non_numeric_format_anomaly(record.raw_value.as_deref())
            {
                annotations[i].flag(AnomalyReason::NonNumericWithoutAllowedCharacters);
            }
        }

        // Merge group results back by row index
        let mut scores: Vec<Option<f64>> = vec![None; records.len()];
        for scan in scans.values() {
            for &(row, score, _) in &scan.scored {
                scores[row] = Some(score);
            }
        }

        let annotated: Vec<AnnotatedRecord> = records
            .into_iter()
            .zip(group_keys.iter())
            .zip(classes.iter().zip(annotations))
            .enumerate()
            .map(|(i, ((record, key), (class, annotation)))| {
                let aggregate = scans
                    .get(key.as_str())
                    .map(|s| s.aggregate)
                    .unwrap_or_default();
                let controlled = is_controlled(
                    aggregate.average,
                    class.numeric_value,
                    self.config.controlled_tolerance,
                );
                AnnotatedRecord {
                    family: record.family,
                    feature: record.feature,
                    value_id: record.value_id,
                    value: record.raw_value,
                    numeric_value: class.numeric_value,
                    unit: record.unit,
                    average: aggregate.average,
                    median: aggregate.median,
                    group_key: key.clone(),
                    is_numeric: class.is_numeric,
                    is_numeric_like: class.is_numeric_like,
                    isolation_score: scores[i],
                    anomaly: annotation.anomaly,
                    anomaly_reasons: annotation.reasons,
                    controlled,
                }
            })
            .collect();

        let report = DetectionReport::new(annotated, dropped);
        info!(
            analysed = report.summary.analysed_rows,
            dropped = report.summary.dropped_rows,
            flagged = report.summary.flagged,
            controlled = report.summary.controlled,
            reported = report.summary.reported,
            "anomaly detection completed"
        );
        report
    }

    /// Score one group's numeric values; groups with fewer than two are skipped
    fn scan_group(&self, key: &str, rows: &[usize], classes: &[ValueClass]) -> GroupScan {
        let numeric: Vec<(usize, f64)> = rows
            .iter()
            .filter_map(|&row| classes[row].numeric_value.map(|v| (row, v)))
            .collect();
        if numeric.len() <= 1 {
            return GroupScan::default();
        }

        let values: Vec<f64> = numeric.iter().map(|&(_, v)| v).collect();
        let result = group_features(&values)
            .and_then(|features| run_isolation_forest(features, &self.config.forest));

        let (scores, labels) = match result {
            Ok(scored) => scored,
            Err(e) => {
                warn!(group = key, error = %e, "skipping outlier scoring for group");
                return GroupScan::default();
            }
        };

        let scored: Vec<(usize, f64, bool)> = numeric
            .iter()
            .zip(scores.iter().zip(labels.iter()))
            .map(|(&(row, _), (&score, &label))| (row, score, label))
            .collect();
        if labels.iter().any(|&l| l) {
            debug!(group = key, size = values.len(), "isolation forest flagged values");
        }

        GroupScan {
            scored,
            values,
            aggregate: GroupAggregate::default(),
        }
    }

    /// Extract new records from a table and validate them against a baseline
    pub fn validate_dataset(
        &self,
        dataset: &Dataset,
        baseline: &ReferenceBaseline,
    ) -> crate::Result<ValidationReport> {
        let Extraction { records, dropped } =
            dataset.extract_records(&self.config.columns, false)?;
        Ok(self.validate_with_dropped(records, baseline, dropped))
    }

    /// Validate new records against a reference baseline
    ///
    /// Unit and majority checks are evaluated among the new records only.
    /// All records are returned, flagged or not.
    pub fn validate_against_baseline(
        &self,
        records: Vec<Record>,
        baseline: &ReferenceBaseline,
    ) -> ValidationReport {
        self.validate_with_dropped(records, baseline, 0)
    }

    fn validate_with_dropped(
        &self,
        records: Vec<Record>,
        baseline: &ReferenceBaseline,
        dropped: usize,
    ) -> ValidationReport {
        let classes: Vec<ValueClass> = records
            .iter()
            .map(|r| ValueClass::of(r.raw_value.as_deref()))
            .collect();
        let majorities: BTreeMap<String, _> = family_majorities(
            records
                .iter()
                .zip(&classes)
                .map(|(r, c)| (r.family.as_str(), c.is_numeric_like)),
        )
        .into_iter()
        .map(|(family, majority)| (family.to_string(), majority))
        .collect();

        let validated: Vec<ValidatedRecord> = records
            .into_iter()
            .zip(classes)
            .map(|(record, class)| {
                let mut annotation = Annotation::default();
                let mut status = ValidationStatus::Valid;

                if !self.validate_unit(record.unit.as_deref(), &record.feature) {
                    annotation.flag(AnomalyReason::InvalidUnit);
                    status = ValidationStatus::Invalid;
                }
                if let Some(reason) = majorities
                    .get(&record.family)
                    .and_then(|&m| majority_disagreement(m, class.is_numeric_like))
                {
                    annotation.flag(reason);
                    status = ValidationStatus::Invalid;
                }

                let group_key = record.group_key();
                let outcome =
                    baseline.compare(&group_key, class.numeric_value, self.config.outlier_sigma);
                match outcome {
                    BaselineOutcome::NotFound => {
                        annotation.flag(AnomalyReason::GroupNotFoundInReference);
                        status = ValidationStatus::NotFound;
                    }
                    BaselineOutcome::Outlier(_) => {
                        annotation.flag(AnomalyReason::OutlierVsReference);
                        status = ValidationStatus::Outlier;
                    }
                    BaselineOutcome::Within(_) | BaselineOutcome::NoReference => {}
                }

                let mut validated = ValidatedRecord {
                    family: record.family,
                    feature: record.feature,
                    value_id: record.value_id,
                    value: record.raw_value,
                    numeric_value: class.numeric_value,
                    unit: record.unit,
                    group_key,
                    anomaly: annotation.anomaly,
                    anomaly_reasons: annotation.reasons,
                    validation_status: status,
                    reference_mean: None,
                    reference_stddev: None,
                    reference_count: 0,
                };
                validated.set_reference(outcome.reference());
                validated
            })
            .collect();

        let report = ValidationReport::new(validated, dropped);
        info!(
            analysed = report.summary.analysed_rows,
            dropped = report.summary.dropped_rows,
            issues = report.summary.issues,
            "baseline validation completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight_core::baseline::{GroupBaseline, ReferenceStats};
    use crate::utils::AnalysisError;

    fn engine() -> AnomalyEngine {
        AnomalyEngine::new().unwrap()
    }

    fn resistors(values: &[&str]) -> Vec<Record> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Record::new("Resistors", "Resistance", *v, "Ohm").with_value_id(i.to_string())
            })
            .collect()
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.config().controlled_tolerance, 50.0);
        assert!(!engine.units().is_empty());
    }

    #[test]
    fn test_detect_flags_extreme_value() {
        let report = engine().detect(resistors(&["10", "11", "9", "10", "1000"]));

        let flagged: Vec<&AnnotatedRecord> = report.anomalies().collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].numeric_value, Some(1000.0));
        assert_eq!(
            flagged[0].anomaly_reasons,
            vec![AnomalyReason::IsolationForestOutlier]
        );
        assert_eq!(flagged[0].average, Some(208.0));
        assert_eq!(flagged[0].median, Some(10.0));

        // Average and median are attached to every row of the group
        assert!(report.records.iter().all(|r| r.average == Some(208.0)));
        assert!(report.records.iter().all(|r| r.isolation_score.is_some()));
    }

    #[test]
    fn test_controlled_suppresses_close_outlier() {
        // 60 is the most isolated point but sits within 50 of the average (20)
        let report = engine().detect(resistors(&["10", "11", "9", "10", "60"]));

        let outlier = report
            .records
            .iter()
            .find(|r| r.numeric_value == Some(60.0))
            .unwrap();
        assert!(outlier.anomaly);
        assert!(outlier.controlled);
        assert_eq!(report.anomalies().count(), 0);
        assert_eq!(report.summary.controlled, 1);
    }

    #[test]
    fn test_tolerance_is_configurable() {
        let config = EngineConfig {
            controlled_tolerance: 5.0,
            ..EngineConfig::default()
        };
        let engine = AnomalyEngine::with_config(config).unwrap();
        let report = engine.detect(resistors(&["10", "11", "9", "10", "60"]));
        assert_eq!(report.anomalies().count(), 1);
    }

    #[test]
    fn test_detect_survives_extreme_value_range() {
        let records: Vec<Record> = ["1e308", "-1e308", "1"]
            .iter()
            .map(|v| Record::new("Caps", "Capacitance", *v, "F"))
            .collect();
        let report = engine().detect(records);

        assert_eq!(report.summary.analysed_rows, 3);
        assert!(report.records.iter().all(|r| r.isolation_score.is_some()));
    }

    #[test]
    fn test_with_units_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.forest.n_trees = 0;
        let units = ValidUnitTable::builtin().unwrap();
        assert!(matches!(
            AnomalyEngine::with_units(config, units),
            Err(AnalysisError::ConfigError(_))
        ));

        let mut config = EngineConfig::default();
        config.forest.contamination = 0.0;
        let units = ValidUnitTable::builtin().unwrap();
        assert!(AnomalyEngine::with_units(config, units).is_err());
    }

    #[test]
    fn test_no_average_without_forest_outlier() {
        let report = engine().detect(resistors(&["10", "10", "10"]));
        assert!(report.records.iter().all(|r| r.average.is_none()));
        assert!(report.records.iter().all(|r| !r.controlled));
        assert_eq!(report.anomalies().count(), 0);
    }

    #[test]
    fn test_single_numeric_value_skips_forest_only() {
        let records = vec![Record::new("Fuses", "Current", "2", "Hz")];
        let report = engine().detect(records);
        let record = &report.records[0];
        assert_eq!(record.isolation_score, None);
        assert_eq!(record.anomaly_reasons, vec![AnomalyReason::InvalidUnit]);
    }

    #[test]
    fn test_majority_numeric_flags_text_values() {
        let mut records: Vec<Record> = (0..8)
            .map(|i| Record::new("Connectors", "Contact Count", (i % 3 + 2).to_string(), " "))
            .collect();
        records.push(Record::new("Connectors", "Contact Count", "Many", " "));
        records.push(Record::new("Connectors", "Contact Count", "Several", " "));
        // Blank units fail the unit check on every row alike
        let report = engine().detect(records);

        for record in &report.records[8..] {
            assert!(record
                .anomaly_reasons
                .contains(&AnomalyReason::MajorityNumericValueNonNumeric));
            assert!(record
                .anomaly_reasons
                .contains(&AnomalyReason::NonNumericWithoutAllowedCharacters));
        }
        for record in &report.records[..8] {
            assert!(!record
                .anomaly_reasons
                .contains(&AnomalyReason::MajorityNumericValueNonNumeric));
        }
    }

    #[test]
    fn test_majority_non_numeric_flags_numbers() {
        let records = vec![
            Record::new("Cables", "Jacket Color", "Black", "-"),
            Record::new("Cables", "Jacket Color", "Grey", "-"),
            Record::new("Cables", "Jacket Color", "7", "-"),
        ];
        let report = engine().detect(records);

        assert_eq!(
            report.records[2].anomaly_reasons,
            vec![AnomalyReason::MajorityNonNumericValueNumeric]
        );
        // Plain colour names are non-numeric without composite markers
        assert_eq!(
            report.records[0].anomaly_reasons,
            vec![AnomalyReason::NonNumericWithoutAllowedCharacters]
        );
    }

    #[test]
    fn test_reason_order_follows_pipeline() {
        let mut records = resistors(&["10", "11", "9", "10", "1000"]);
        records[4].unit = Some("Hz".to_string());
        let report = engine().detect(records);

        assert_eq!(
            report.records[4].anomaly_reasons,
            vec![
                AnomalyReason::InvalidUnit,
                AnomalyReason::IsolationForestOutlier
            ]
        );
    }

    #[test]
    fn test_detect_dataset_reports_drops() {
        let csv = "PL_NAME,FET_NAME,VALUE_ID,VALUE,UNIT\n\
            Resistors,Resistance,1,10,Ohm\n\
            Resistors,Resistance,2,,Ohm\n";
        let dataset = Dataset::from_csv("parts".to_string(), csv).unwrap();
        let report = engine().detect_dataset(&dataset).unwrap();

        assert_eq!(report.summary.total_rows, 2);
        assert_eq!(report.summary.dropped_rows, 1);
        assert_eq!(report.summary.analysed_rows, 1);
    }

    fn caps_baseline() -> ReferenceBaseline {
        let mut baseline = ReferenceBaseline::default();
        baseline.insert(
            "Caps_Capacitance",
            GroupBaseline {
                record_count: 10,
                stats: Some(ReferenceStats {
                    count: 10,
                    mean: 10.0,
                    std_dev: Some(2.0),
                }),
            },
        );
        baseline
    }

    #[test]
    fn test_validate_outlier_vs_reference() {
        let records = vec![
            Record::new("Caps", "Capacitance", "50", "uF"),
            Record::new("Caps", "Capacitance", "12", "uF"),
        ];
        let report = engine().validate_against_baseline(records, &caps_baseline());

        assert_eq!(report.records[0].validation_status, ValidationStatus::Outlier);
        assert_eq!(
            report.records[0].anomaly_reasons,
            vec![AnomalyReason::OutlierVsReference]
        );
        assert_eq!(report.records[0].reference_mean, Some(10.0));
        assert_eq!(report.records[0].reference_stddev, Some(2.0));
        assert_eq!(report.records[0].reference_count, 10);

        assert_eq!(report.records[1].validation_status, ValidationStatus::Valid);
        assert_eq!(report.records[1].reason_text(), "No issues found");
        assert_eq!(report.count(ValidationStatus::Outlier), 1);
    }

    #[test]
    fn test_validate_not_found_overrides_invalid() {
        let records = vec![Record::new("Diodes", "Forward Voltage", "0.7", "Hz")];
        let report = engine().validate_against_baseline(records, &caps_baseline());
        let record = &report.records[0];

        assert_eq!(record.validation_status, ValidationStatus::NotFound);
        assert_eq!(
            record.anomaly_reasons,
            vec![
                AnomalyReason::InvalidUnit,
                AnomalyReason::GroupNotFoundInReference
            ]
        );
        assert_eq!(record.reference_mean, None);
        assert_eq!(record.reference_count, 0);
    }

    #[test]
    fn test_validate_invalid_unit_in_known_group() {
        let records = vec![Record::new("Caps", "Capacitance", "11", "V")];
        let report = engine().validate_against_baseline(records, &caps_baseline());
        assert_eq!(report.records[0].validation_status, ValidationStatus::Invalid);
        assert_eq!(report.records[0].reference_mean, Some(10.0));
    }

    #[test]
    fn test_validate_majority_among_new_records_only() {
        let records = vec![
            Record::new("Caps", "Capacitance", "10", "uF"),
            Record::new("Caps", "Capacitance", "11", "uF"),
            Record::new("Caps", "Capacitance", "large", "uF"),
        ];
        let report = engine().validate_against_baseline(records, &caps_baseline());
        let record = &report.records[2];

        assert_eq!(record.validation_status, ValidationStatus::Invalid);
        assert_eq!(
            record.anomaly_reasons,
            vec![AnomalyReason::MajorityNumericValueNonNumeric]
        );
        assert_eq!(record.reference_count, 0);
    }

    #[test]
    fn test_validate_dataset_schema_error() {
        let dataset = Dataset::from_csv("new".to_string(), "PL_NAME,VALUE\nCaps,1\n").unwrap();
        let result = engine().validate_dataset(&dataset, &caps_baseline());
        assert!(matches!(
            result,
            Err(crate::utils::AnalysisError::Schema { .. })
        ));
    }
}
