//! Family majority-type consistency check

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::insight_core::reason::AnomalyReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MajorityType {
    Numeric,
    NonNumeric,
}

/// Numeric-like vs other counts for one family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyTally {
    pub numeric_like: usize,
    pub other: usize,
}

impl FamilyTally {
    pub fn add(&mut self, is_numeric_like: bool) {
        if is_numeric_like {
            self.numeric_like += 1;
        } else {
            self.other += 1;
        }
    }

    /// Ties resolve to non-numeric
    pub fn majority(&self) -> MajorityType {
        if self.numeric_like > self.other {
            MajorityType::Numeric
        } else {
            MajorityType::NonNumeric
        }
    }
}

/// Majority type of every family in `(family, is_numeric_like)` pairs
pub fn family_majorities<'a, I>(values: I) -> BTreeMap<&'a str, MajorityType>
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let mut tallies: BTreeMap<&'a str, FamilyTally> = BTreeMap::new();
    for (family, numeric_like) in values {
        tallies.entry(family).or_default().add(numeric_like);
    }
    tallies
        .into_iter()
        .map(|(family, tally)| (family, tally.majority()))
        .collect()
}

/// Reason for a record whose type disagrees with its family majority
pub fn majority_disagreement(majority: MajorityType, is_numeric_like: bool) -> Option<AnomalyReason> {
    match (majority, is_numeric_like) {
        (MajorityType::Numeric, false) => Some(AnomalyReason::MajorityNumericValueNonNumeric),
        (MajorityType::NonNumeric, true) => Some(AnomalyReason::MajorityNonNumericValueNumeric),
        _ => None,
    }
}
