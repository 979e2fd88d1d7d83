//! Design-point values from definition blocks.

use crate::StudyResult;
use std::collections::HashMap;
use tw_config::{DefinitionBlock, ValidationError};

/// Input-parameter values of one design point to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignPointPlan {
    pub values: Vec<(String, f64)>,
}

/// One plan per `valueList` column. Scale-factor parameters multiply the
/// Base DP value; the others take the listed value as is.
pub fn plan_design_points(
    block: &DefinitionBlock,
    base: &HashMap<String, f64>,
) -> StudyResult<Vec<DesignPointPlan>> {
    let factors = block.scale_factors()?;
    let mut plans = Vec::with_capacity(block.design_point_count());
    for column in 0..block.design_point_count() {
        let mut values = Vec::with_capacity(block.inputparameters.len());
        for (row, parameter) in block.inputparameters.iter().enumerate() {
            let listed = block
                .value_list
                .get(row)
                .and_then(|r| r.get(column))
                .copied()
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: "valueList".to_string(),
                    value: format!("[{row}][{column}]"),
                    reason: "missing entry".to_string(),
                })?;
            let value = if factors[row] {
                let base_value =
                    base.get(parameter)
                        .ok_or_else(|| ValidationError::MissingReference {
                            id: parameter.clone(),
                            context: "Base DP input parameters".to_string(),
                        })?;
                base_value * listed
            } else {
                listed
            };
            values.push((parameter.clone(), value));
        }
        plans.push(DesignPointPlan { values });
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tw_config::ScaleFactorSpec;

    fn block(value: serde_json::Value) -> DefinitionBlock {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scale_factors_multiply_base() {
        let block = block(json!({
            "inputparameters": ["BC_omega"],
            "valueList": [[0.9, 1.0, 1.1]],
            "useScaleFactor": true
        }));
        let base = HashMap::from([("BC_omega".to_string(), 1000.0)]);
        let plans = plan_design_points(&block, &base).unwrap();
        let omegas: Vec<f64> = plans.iter().map(|p| p.values[0].1).collect();
        assert_eq!(omegas.len(), 3);
        assert!((omegas[0] - 900.0).abs() < 1e-9);
        assert!((omegas[1] - 1000.0).abs() < 1e-9);
        assert!((omegas[2] - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn mixed_absolute_and_scaled() {
        let block = block(json!({
            "inputparameters": ["BC_omega", "BC_OUT_p"],
            "valueList": [[2.0, 3.0], [100.0, 200.0]],
            "useScaleFactor": [true, false]
        }));
        let base = HashMap::from([("BC_omega".to_string(), 10.0)]);
        let plans = plan_design_points(&block, &base).unwrap();
        assert_eq!(
            plans[1].values,
            vec![("BC_omega".to_string(), 30.0), ("BC_OUT_p".to_string(), 200.0)]
        );
    }

    #[test]
    fn scaling_needs_a_base_value() {
        let block = block(json!({
            "inputparameters": ["BC_omega"],
            "valueList": [[1.0]],
            "useScaleFactor": true
        }));
        assert!(plan_design_points(&block, &HashMap::new()).is_err());
    }

    proptest! {
        #[test]
        fn absolute_values_pass_through(values in proptest::collection::vec(-1e6f64..1e6, 1..10)) {
            let block = DefinitionBlock {
                inputparameters: vec!["p".to_string()],
                value_list: vec![values.clone()],
                use_scale_factor: ScaleFactorSpec::Uniform(false),
            };
            let plans = plan_design_points(&block, &HashMap::new()).unwrap();
            prop_assert_eq!(plans.len(), values.len());
            for (plan, v) in plans.iter().zip(&values) {
                prop_assert_eq!(plan.values[0].1, *v);
            }
        }

        #[test]
        fn unit_factor_reproduces_base(base in -1e6f64..1e6) {
            let block = DefinitionBlock {
                inputparameters: vec!["p".to_string()],
                value_list: vec![vec![1.0]],
                use_scale_factor: ScaleFactorSpec::Uniform(true),
            };
            let base_map = HashMap::from([("p".to_string(), base)]);
            let plans = plan_design_points(&block, &base_map).unwrap();
            prop_assert_eq!(plans[0].values[0].1, base);
        }
    }
}
