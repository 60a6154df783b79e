use serde::{Deserialize, Serialize};

/// One measurement row: a part family, a feature, a value and its unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub family: String,
    pub feature: String,
    pub value_id: Option<String>,
    pub raw_value: Option<String>,
    pub unit: Option<String>,
}

impl Record {
    /// Create a record with a value and a unit
    pub fn new(
        family: impl Into<String>,
        feature: impl Into<String>,
        raw_value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            feature: feature.into(),
            value_id: None,
            raw_value: Some(raw_value.into()),
            unit: Some(unit.into()),
        }
    }

    /// Attach an opaque value identifier
    pub fn with_value_id(mut self, value_id: impl Into<String>) -> Self {
        self.value_id = Some(value_id.into());
        self
    }

    /// Partition key for outlier scoring: `family_feature`
    pub fn group_key(&self) -> String {
        group_key(&self.family, &self.feature)
    }
}

/// Build the `family_feature` group key
pub fn group_key(family: &str, feature: &str) -> String {
    format!("{}_{}", family, feature)
}
