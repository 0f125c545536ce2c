//! Method-specific positivity cutoffs.
//!
//! The table is plain data keyed by `(axis, method)`. Classification never branches on a
//! method name; it looks the row up here. A replacement table can be loaded from YAML:
//!
//! ```yaml
//! rows:
//!   - axis: amyloid
//!     method: Elecsys
//!     marker: csf_abeta42_40_ratio
//!     positive_when: "<="
//!     cutoff: 0.062
//! ```

use crate::axis::{BiomarkerAxis, Sign};
use crate::method::{AssayMethod, Marker};
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Comparison that makes a reading positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = "<")]
    Below,
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = ">")]
    Above,
}

impl Comparator {
    /// Applies the comparator. A value exactly at the cutoff is positive only for the
    /// inclusive comparators.
    pub fn evaluate(self, value: f64, cutoff: f64) -> Sign {
        let positive = match self {
            Comparator::AtMost => value <= cutoff,
            Comparator::Below => value < cutoff,
            Comparator::AtLeast => value >= cutoff,
            Comparator::Above => value > cutoff,
        };
        if positive {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::AtMost => "<=",
            Comparator::Below => "<",
            Comparator::AtLeast => ">=",
            Comparator::Above => ">",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The rule stored for one `(axis, method)` key.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub marker: Marker,
    pub positive_when: Comparator,
    pub cutoff: f64,
}

/// A flattened table row, as listed and as read from YAML.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdRow {
    pub axis: BiomarkerAxis,
    pub method: AssayMethod,
    pub marker: Marker,
    pub positive_when: Comparator,
    pub cutoff: f64,
}

impl ThresholdRow {
    const fn new(
        axis: BiomarkerAxis,
        method: AssayMethod,
        marker: Marker,
        positive_when: Comparator,
        cutoff: f64,
    ) -> Self {
        Self {
            axis,
            method,
            marker,
            positive_when,
            cutoff,
        }
    }
}

/// Built-in rows. Values are platform-typical cutoffs and are not clinically validated.
pub const DEFAULT_ROWS: &[ThresholdRow] = {
    use AssayMethod::*;
    use BiomarkerAxis::*;
    use Comparator::*;
    use Marker::*;
    &[
        ThresholdRow::new(Amyloid, Elecsys, CsfAbeta42_40Ratio, AtMost, 0.062),
        ThresholdRow::new(Amyloid, Innotest, CsfAbeta42, Below, 550.0),
        ThresholdRow::new(Amyloid, Lumipulse, CsfAbeta42, Below, 599.0),
        ThresholdRow::new(Amyloid, PlasmaSimoa, PlasmaAbeta42_40Ratio, AtMost, 0.092),
        ThresholdRow::new(Tau, Elecsys, CsfPtauAbeta42Ratio, Above, 0.023),
        ThresholdRow::new(Tau, Lumipulse, CsfPtau181, AtLeast, 56.5),
        ThresholdRow::new(Tau, PlasmaSimoa, PlasmaPtau181, AtLeast, 2.5),
        ThresholdRow::new(Neurodegeneration, Innotest, CsfTotalTau, Above, 400.0),
        ThresholdRow::new(
            Neurodegeneration,
            MriFreesurfer,
            NormalizedHippocampalVolume,
            Below,
            4.5,
        ),
    ]
};

/// Lookup table from `(axis, method)` to its positivity rule.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdTable {
    rules: BTreeMap<(BiomarkerAxis, AssayMethod), ThresholdRule>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ThresholdFileWire {
    rows: Vec<ThresholdRow>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::from_rows(DEFAULT_ROWS.iter().copied())
            .unwrap_or_else(|e| panic!("built-in threshold rows are invalid: {e}"))
    }
}

impl ThresholdTable {
    /// Builds a table, rejecting duplicate keys and non-finite cutoffs.
    pub fn from_rows(rows: impl IntoIterator<Item = ThresholdRow>) -> EngineResult<Self> {
        let mut rules = BTreeMap::new();
        for row in rows {
            if !row.cutoff.is_finite() {
                return Err(EngineError::InvalidThresholds(format!(
                    "cutoff for ({}, {}) must be finite",
                    row.axis, row.method
                )));
            }
            let rule = ThresholdRule {
                marker: row.marker,
                positive_when: row.positive_when,
                cutoff: row.cutoff,
            };
            if rules.insert((row.axis, row.method), rule).is_some() {
                return Err(EngineError::InvalidThresholds(format!(
                    "duplicate row for ({}, {})",
                    row.axis, row.method
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Parses a threshold table from YAML text.
    ///
    /// Schema mismatches report the path of the failing field, e.g. `rows[2].positive_when`.
    pub fn from_yaml(yaml_text: &str) -> EngineResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire = match serde_path_to_error::deserialize::<_, ThresholdFileWire>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(EngineError::InvalidThresholds(format!(
                    "threshold file schema mismatch at {path}: {source}"
                )));
            }
        };
        Self::from_rows(wire.rows)
    }

    /// Renders the table in the same YAML shape [`ThresholdTable::from_yaml`] reads.
    pub fn to_yaml(&self) -> EngineResult<String> {
        let wire = ThresholdFileWire {
            rows: self.rows().collect(),
        };
        serde_yaml::to_string(&wire)
            .map_err(|e| EngineError::InvalidThresholds(format!("failed to render table: {e}")))
    }

    pub fn rule(&self, axis: BiomarkerAxis, method: AssayMethod) -> Option<&ThresholdRule> {
        self.rules.get(&(axis, method))
    }

    /// All rows ordered by axis, then method.
    pub fn rows(&self) -> impl Iterator<Item = ThresholdRow> + '_ {
        self.rules.iter().map(|(&(axis, method), rule)| ThresholdRow {
            axis,
            method,
            marker: rule.marker,
            positive_when: rule.positive_when,
            cutoff: rule.cutoff,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_one_row_per_key() {
        let table = ThresholdTable::default();
        assert_eq!(table.len(), DEFAULT_ROWS.len());
    }

    #[test]
    fn inclusive_comparators_include_the_boundary() {
        assert_eq!(Comparator::AtMost.evaluate(0.062, 0.062), Sign::Positive);
        assert_eq!(Comparator::AtLeast.evaluate(56.5, 56.5), Sign::Positive);
    }

    #[test]
    fn strict_comparators_exclude_the_boundary() {
        assert_eq!(Comparator::Below.evaluate(550.0, 550.0), Sign::Negative);
        assert_eq!(Comparator::Above.evaluate(0.023, 0.023), Sign::Negative);
    }

    #[test]
    fn yaml_round_trip_preserves_the_table() {
        let table = ThresholdTable::default();
        let yaml = table.to_yaml().unwrap();
        assert_eq!(ThresholdTable::from_yaml(&yaml).unwrap(), table);
    }

    #[test]
    fn yaml_schema_error_names_the_field() {
        let yaml = r#"
rows:
  - axis: amyloid
    method: Elecsys
    marker: csf_abeta42_40_ratio
    positive_when: "=="
    cutoff: 0.06
"#;
        let err = ThresholdTable::from_yaml(yaml).unwrap_err();
        assert!(
            matches!(&err, EngineError::InvalidThresholds(msg) if msg.contains("rows[0].positive_when")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let row = DEFAULT_ROWS[0];
        let err = ThresholdTable::from_rows([row, row]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidThresholds(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn non_finite_cutoff_is_rejected() {
        let mut row = DEFAULT_ROWS[0];
        row.cutoff = f64::NAN;
        assert!(ThresholdTable::from_rows([row]).is_err());
    }

    #[test]
    fn extra_row_extends_lookup_without_code_changes() {
        let mut rows: Vec<ThresholdRow> = DEFAULT_ROWS.to_vec();
        rows.push(ThresholdRow {
            axis: BiomarkerAxis::Neurodegeneration,
            method: AssayMethod::Lumipulse,
            marker: Marker::CsfTotalTau,
            positive_when: Comparator::AtLeast,
            cutoff: 404.0,
        });
        let table = ThresholdTable::from_rows(rows).unwrap();
        let rule = table
            .rule(BiomarkerAxis::Neurodegeneration, AssayMethod::Lumipulse)
            .unwrap();
        assert_eq!(rule.marker, Marker::CsfTotalTau);
    }
}
