//! Structural validation of the configuration.
//!
//! Problems found here are band-one errors: the offending case or study is
//! skipped, everything else still runs.

use crate::Config;
use crate::schema::StudyDef;
use crate::tree::{as_text, string_list};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Zone {zone} used by periodic pairs '{first}' and '{second}'")]
    PeriodicSideReused {
        zone: String,
        first: String,
        second: String,
    },
}

/// Check a study's definition blocks for shape consistency.
pub fn validate_study(name: &str, study: &StudyDef) -> Result<(), ValidationError> {
    if study.ref_case_filename.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: format!("studies.{name}.refCaseFilename"),
            value: String::new(),
            reason: "a base case-data file is required".to_string(),
        });
    }

    for (index, block) in study.definition.iter().enumerate() {
        let field = format!("studies.{name}.definition[{index}]");
        if block.inputparameters.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("{field}.inputparameters"),
                value: "[]".to_string(),
                reason: "at least one input parameter is required".to_string(),
            });
        }
        if block.value_list.len() != block.inputparameters.len() {
            return Err(ValidationError::InvalidValue {
                field: format!("{field}.valueList"),
                value: format!("{} rows", block.value_list.len()),
                reason: format!(
                    "expected one row per input parameter ({})",
                    block.inputparameters.len()
                ),
            });
        }
        let columns = block.design_point_count();
        if block.value_list.iter().any(|row| row.len() != columns) {
            return Err(ValidationError::InvalidValue {
                field: format!("{field}.valueList"),
                value: format!("{:?}", block.value_list),
                reason: "all rows must have the same number of design points".to_string(),
            });
        }
        block.scale_factors()?;
    }
    Ok(())
}

/// Periodic pairs may not share a side.
pub fn validate_periodic_sides(
    entries: &[(String, Map<String, Value>)],
) -> Result<(), ValidationError> {
    let mut owner: HashMap<String, String> = HashMap::new();
    for (name, entry) in entries {
        for side in ["side1", "side2"] {
            for zone in entry.get(side).map(string_list).unwrap_or_default() {
                if let Some(first) = owner.get(&zone) {
                    return Err(ValidationError::PeriodicSideReused {
                        zone,
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
                owner.insert(zone, name.clone());
            }
        }
    }
    Ok(())
}

/// Collect every structural problem keyed by the case or study it belongs to.
pub fn validate_config(config: &Config) -> Vec<(String, ValidationError)> {
    let mut issues = Vec::new();
    let empty = Map::new();
    let cases = config.cases().unwrap_or(&empty);

    for (name, case) in cases {
        let Some(case) = case.as_object() else {
            issues.push((
                name.clone(),
                ValidationError::InvalidValue {
                    field: format!("cases.{name}"),
                    value: case.to_string(),
                    reason: "a case must be a mapping".to_string(),
                },
            ));
            continue;
        };
        if let Some(reference) = case.get("refCase").and_then(as_text)
            && !reference.is_empty()
            && !cases.contains_key(&reference)
        {
            issues.push((
                name.clone(),
                ValidationError::MissingReference {
                    id: reference,
                    context: format!("cases.{name}.refCase"),
                },
            ));
        }
        let periodic: Vec<_> = case
            .get("locations")
            .and_then(|l| l.get("bz_interfaces_periodic_names"))
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_object().map(|o| (k.clone(), o.clone())))
                    .collect()
            })
            .unwrap_or_default();
        if let Err(e) = validate_periodic_sides(&periodic) {
            issues.push((name.clone(), e));
        }
    }

    for name in config.study_names() {
        match config.study(&name) {
            Ok(study) => {
                if let Err(e) = validate_study(&name, &study) {
                    issues.push((name.clone(), e));
                }
            }
            Err(e) => issues.push((
                name.clone(),
                ValidationError::InvalidValue {
                    field: format!("studies.{name}"),
                    value: String::new(),
                    reason: e.to_string(),
                },
            )),
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn study(value: Value) -> StudyDef {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn well_formed_study_passes() {
        let s = study(json!({
            "refCaseFilename": "base_fin",
            "definition": [{
                "inputparameters": ["BC_omega"],
                "valueList": [[0.9, 1.0, 1.1]],
                "useScaleFactor": true
            }]
        }));
        assert!(validate_study("s", &s).is_ok());
    }

    #[test]
    fn ragged_value_list_is_rejected() {
        let s = study(json!({
            "refCaseFilename": "base_fin",
            "definition": [{
                "inputparameters": ["BC_omega", "BC_OUT_p"],
                "valueList": [[0.9, 1.0], [1.0]]
            }]
        }));
        assert!(matches!(
            validate_study("s", &s),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn row_count_must_match_parameters() {
        let s = study(json!({
            "refCaseFilename": "base_fin",
            "definition": [{"inputparameters": ["a", "b"], "valueList": [[1.0]]}]
        }));
        assert!(validate_study("s", &s).is_err());
    }

    #[test]
    fn periodic_side_reuse_is_detected() {
        let entries = vec![
            (
                "p1".to_string(),
                json!({"side1": "a", "side2": "b"}).as_object().unwrap().clone(),
            ),
            (
                "p2".to_string(),
                json!({"side1": "b", "side2": "c"}).as_object().unwrap().clone(),
            ),
        ];
        let err = validate_periodic_sides(&entries).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PeriodicSideReused {
                zone: "b".to_string(),
                first: "p1".to_string(),
                second: "p2".to_string()
            }
        );
    }
}
