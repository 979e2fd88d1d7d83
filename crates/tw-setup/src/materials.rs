//! Fluid material: rename the solver's default fluid and set its properties.

use crate::context::StageContext;
use crate::error::{SetupError, SetupResult};
use serde_json::{Map, Value};
use tw_config::tree::as_text;
use tw_driver::{cell_zone_path, type_segment};

/// Materials that `fluid_properties` may name instead of spelling them out.
pub const MATERIAL_LIBRARY: &str = include_str!("../templates/materials.json");

pub const PROPERTIES: [&str; 5] = [
    "density",
    "specific_heat",
    "thermal_conductivity",
    "molecular_weight",
    "viscosity",
];

pub fn library() -> SetupResult<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(MATERIAL_LIBRARY)
        .map_err(|e| SetupError::MaterialLibrary(e.to_string()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err(SetupError::MaterialLibrary(
            "top level must be a mapping".to_string(),
        )),
    }
}

/// Property mapping for a case: inline, or looked up by name in the library.
pub fn resolve_properties(fluid: &Value) -> SetupResult<Map<String, Value>> {
    match fluid {
        Value::String(name) => {
            let lib = library()?;
            lib.get(name)
                .and_then(Value::as_object)
                .cloned()
                .ok_or_else(|| SetupError::UnknownMaterial {
                    name: name.clone(),
                    known: lib.keys().cloned().collect::<Vec<_>>().join(", "),
                })
        }
        Value::Object(map) => Ok(map.clone()),
        _ => Ok(Map::new()),
    }
}

pub fn default_fluid_name(energy: bool) -> &'static str {
    if energy {
        "custom-comp-fluid"
    } else {
        "custom-incomp-fluid"
    }
}

pub fn apply(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    let props = resolve_properties(&ctx.case.fluid_properties())?;
    let fl_name = ctx
        .case
        .text_or("setup", "fl_name", default_fluid_name(energy));

    let fluids = ctx.driver.children("setup/materials/fluid");
    match fluids.first() {
        Some(first) if *first == fl_name => {}
        Some(first) if fluids.contains(&fl_name) => {
            tracing::warn!(key = "setup.fl_name", "material '{fl_name}' already exists, keeping '{first}' untouched");
        }
        Some(first) => {
            let first = first.clone();
            ctx.driver
                .try_rename("setup/materials/fluid", &first, &fl_name, "setup.fl_name")?;
        }
        None => {
            ctx.driver
                .try_create("setup/materials/fluid", &fl_name, "setup.fl_name")?;
        }
    }

    for (name, value) in &props {
        if !PROPERTIES.contains(&name.as_str()) {
            tracing::warn!(key = %format!("fluid_properties.{name}"), "unknown material property");
        }
    }
    for prop in PROPERTIES {
        if let Some(value) = props.get(prop) {
            apply_property(ctx, &fl_name, prop, value)?;
        }
    }

    for zone in ctx.driver.cell_zones() {
        let path = format!("{}/general/material", cell_zone_path(&zone));
        ctx.driver
            .try_set(&path, Value::from(fl_name.as_str()), "setup.fl_name")?;
    }
    tracing::info!(case = ctx.case.name(), material = %fl_name, "material set");
    Ok(())
}

fn apply_property(
    ctx: &mut StageContext<'_>,
    material: &str,
    prop: &str,
    value: &Value,
) -> SetupResult<()> {
    let path = format!("setup/materials/fluid/{material}/{prop}");
    let key = format!("fluid_properties.{prop}");
    let option_path = format!("{path}/option");
    match value {
        Value::Number(_) => {
            if ctx.driver.set_enum(&option_path, "constant", &key)? {
                ctx.driver
                    .try_set(&format!("{path}/value"), value.clone(), &key)?;
            }
        }
        Value::String(option) => {
            ctx.driver.set_enum(&option_path, option, &key)?;
        }
        Value::Object(spec) => {
            let option = spec.get("option").and_then(as_text);
            if let Some(option) = &option {
                if !ctx.driver.set_enum(&option_path, option, &key)? {
                    return Ok(());
                }
            }
            let attribute = match option.as_deref() {
                None | Some("constant") => "value".to_string(),
                Some(other) => type_segment(other),
            };
            match spec.get("settings") {
                Some(Value::Object(fields)) => {
                    for (field, v) in fields {
                        ctx.driver.try_set(
                            &format!("{path}/{attribute}/{field}"),
                            v.clone(),
                            &key,
                        )?;
                    }
                }
                Some(v) if !v.is_null() => {
                    ctx.driver
                        .try_set(&format!("{path}/{attribute}"), v.clone(), &key)?;
                }
                _ => {}
            }
        }
        other => {
            tracing::warn!(key = %key, "unsupported property value {other}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn library_lookup() {
        let props = resolve_properties(&json!("air-ideal-gas")).unwrap();
        assert_eq!(props["density"], json!("ideal-gas"));
        let err = resolve_properties(&json!("unobtainium")).unwrap_err();
        assert!(err.skips_case());
        assert!(err.to_string().contains("water"));
    }

    #[test]
    fn inline_properties_pass_through() {
        let props = resolve_properties(&json!({"density": 1000.0})).unwrap();
        assert_eq!(props.len(), 1);
        assert!(resolve_properties(&json!(null)).unwrap().is_empty());
    }
}
