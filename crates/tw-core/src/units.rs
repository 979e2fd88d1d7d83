// tw-core/src/units.rs

use crate::{TwError, TwResult};
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{
    AngularVelocity as UomAngularVelocity, MassRate as UomMassRate, Pressure as UomPressure,
    ThermodynamicTemperature as UomThermodynamicTemperature,
};
use uom::si::mass_rate::kilogram_per_second;
use uom::si::pressure::pascal;
use uom::si::thermodynamic_temperature::kelvin;

// Public canonical unit types (SI, f64)
pub type AngularVelocity = UomAngularVelocity;
pub type MassRate = UomMassRate;
pub type Pressure = UomPressure;
pub type Temperature = UomThermodynamicTemperature;

/// Remove `[...]` unit annotations and parentheses from an expression definition.
pub fn strip_units(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '(' | ')' => {}
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// True if the definition, once stripped of units and parentheses, is a plain number.
pub fn is_bare_number(text: &str) -> bool {
    strip_units(text).parse::<f64>().is_ok()
}

/// A numeric solver literal such as `120000 [Pa]` or `0.9`.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: f64,
    pub unit: Option<String>,
}

impl Literal {
    pub fn parse(text: &str) -> TwResult<Self> {
        let trimmed = text.trim().trim_start_matches('(').trim_end_matches(')').trim();
        let (number, unit) = match trimmed.find('[') {
            Some(open) => {
                let close = trimmed[open..].find(']').map(|c| open + c).ok_or_else(|| {
                    TwError::InvalidLiteral {
                        what: "unit annotation",
                        text: text.to_string(),
                    }
                })?;
                let unit = trimmed[open + 1..close].trim().to_string();
                if !trimmed[close + 1..].trim().is_empty() {
                    return Err(TwError::InvalidLiteral {
                        what: "literal",
                        text: text.to_string(),
                    });
                }
                (trimmed[..open].trim(), Some(unit))
            }
            None => (trimmed, None),
        };
        let value = number.parse::<f64>().map_err(|_| TwError::InvalidLiteral {
            what: "literal",
            text: text.to_string(),
        })?;
        Ok(Self {
            value,
            unit: unit.filter(|u| !u.is_empty()),
        })
    }

    fn unit(&self) -> &str {
        self.unit.as_deref().unwrap_or("")
    }

    pub fn pressure(&self) -> TwResult<Pressure> {
        use uom::si::pressure::{
            atmosphere, bar, kilopascal, megapascal, pascal, pound_force_per_square_inch,
        };
        let v = self.value;
        Ok(match self.unit() {
            "" | "Pa" => Pressure::new::<pascal>(v),
            "kPa" => Pressure::new::<kilopascal>(v),
            "MPa" => Pressure::new::<megapascal>(v),
            "bar" => Pressure::new::<bar>(v),
            "atm" => Pressure::new::<atmosphere>(v),
            "psi" => Pressure::new::<pound_force_per_square_inch>(v),
            other => return Err(unknown("pressure", other)),
        })
    }

    pub fn temperature(&self) -> TwResult<Temperature> {
        use uom::si::thermodynamic_temperature::{degree_celsius, kelvin};
        let v = self.value;
        Ok(match self.unit() {
            "" | "K" => Temperature::new::<kelvin>(v),
            "C" | "degC" => Temperature::new::<degree_celsius>(v),
            other => return Err(unknown("temperature", other)),
        })
    }

    pub fn angular_velocity(&self) -> TwResult<AngularVelocity> {
        use uom::si::angular_velocity::{radian_per_second, revolution_per_minute};
        let v = self.value;
        Ok(match self.unit() {
            "" | "rad/s" | "rad s^-1" => AngularVelocity::new::<radian_per_second>(v),
            "rev/min" | "rpm" => AngularVelocity::new::<revolution_per_minute>(v),
            other => return Err(unknown("angular velocity", other)),
        })
    }

    pub fn mass_rate(&self) -> TwResult<MassRate> {
        use uom::si::mass_rate::{gram_per_second, kilogram_per_second};
        let v = self.value;
        Ok(match self.unit() {
            "" | "kg/s" | "kg s^-1" => MassRate::new::<kilogram_per_second>(v),
            "g/s" => MassRate::new::<gram_per_second>(v),
            other => return Err(unknown("mass flow", other)),
        })
    }

    /// Value in SI base units for the quantities a boundary condition
    /// carries; other units pass through unconverted.
    pub fn si_value(&self) -> f64 {
        if let Ok(p) = self.pressure() {
            return p.get::<pascal>();
        }
        if let Ok(t) = self.temperature() {
            return t.get::<kelvin>();
        }
        if let Ok(w) = self.angular_velocity() {
            return w.get::<radian_per_second>();
        }
        if let Ok(mdot) = self.mass_rate() {
            return mdot.get::<kilogram_per_second>();
        }
        self.value
    }
}

fn unknown(what: &'static str, unit: &str) -> TwError {
    TwError::UnknownUnit {
        what,
        unit: unit.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_with_unit() {
        let lit = Literal::parse("120000 [Pa]").unwrap();
        assert_eq!(lit.value, 120_000.0);
        assert_eq!(lit.unit.as_deref(), Some("Pa"));
        assert_eq!(lit.pressure().unwrap().get::<pascal>(), 120_000.0);
    }

    #[test]
    fn literal_bar_converts_to_pascal() {
        let p = Literal::parse("1.2 [bar]").unwrap().pressure().unwrap();
        assert!((p.get::<pascal>() - 120_000.0).abs() < 1e-6);
    }

    #[test]
    fn literal_celsius_converts_to_kelvin() {
        let t = Literal::parse("26.85 [C]").unwrap().temperature().unwrap();
        assert!((t.get::<kelvin>() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn reference_to_other_expression_is_not_a_literal() {
        assert!(Literal::parse("BC_IN_pt * 2").is_err());
        assert!(!is_bare_number("BC_IN_pt * 2"));
        assert!(is_bare_number("(101325 [Pa])"));
    }

    #[test]
    fn strip_units_removes_annotations() {
        assert_eq!(strip_units("100 [rad/s]"), "100");
        assert_eq!(strip_units("(2*BC_x) [m]"), "2*BC_x");
    }

    #[test]
    fn unknown_unit_is_reported() {
        let err = Literal::parse("3 [furlong]").unwrap().pressure().unwrap_err();
        assert!(format!("{err}").contains("furlong"));
    }

    #[test]
    fn si_values() {
        assert!((Literal::parse("1.2 [bar]").unwrap().si_value() - 120_000.0).abs() < 1e-6);
        assert!((Literal::parse("3000 [rev/min]").unwrap().si_value() - 100.0 * std::f64::consts::PI).abs() < 1e-9);
        assert_eq!(Literal::parse("0.9").unwrap().si_value(), 0.9);
        assert_eq!(Literal::parse("2 [m]").unwrap().si_value(), 2.0);
    }

    proptest! {
        #[test]
        fn annotated_numbers_round_trip(v in -1e9f64..1e9, unit in "(Pa|K|kg/s|rad/s)") {
            let text = format!("{v} [{unit}]");
            let lit = Literal::parse(&text).unwrap();
            prop_assert_eq!(lit.value, v);
            prop_assert_eq!(lit.unit.as_deref(), Some(unit.as_str()));
            prop_assert!(is_bare_number(&text));
        }
    }
}
