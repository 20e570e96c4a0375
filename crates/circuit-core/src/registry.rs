//! The closed set of component kinds the circuit model understands.
//!
//! Each kind has a [`KindSpec`] describing how many terminals it takes and
//! what shape of value it carries. The circuit model consults the table on
//! every add/update; supporting a new kind means adding a row here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::model::{ComponentValue, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentKind {
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    Diode,
    Bjt,
    Mosfet,
    /// Multi-terminal device modeled as a parameterized sub-circuit (op-amps etc).
    Device,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 9] = [
        ComponentKind::Resistor,
        ComponentKind::Capacitor,
        ComponentKind::Inductor,
        ComponentKind::VoltageSource,
        ComponentKind::CurrentSource,
        ComponentKind::Diode,
        ComponentKind::Bjt,
        ComponentKind::Mosfet,
        ComponentKind::Device,
    ];

    /// SPICE element letter, also the canonical wire token.
    pub fn letter(&self) -> &'static str {
        match self {
            ComponentKind::Resistor => "R",
            ComponentKind::Capacitor => "C",
            ComponentKind::Inductor => "L",
            ComponentKind::VoltageSource => "V",
            ComponentKind::CurrentSource => "I",
            ComponentKind::Diode => "D",
            ComponentKind::Bjt => "Q",
            ComponentKind::Mosfet => "M",
            ComponentKind::Device => "X",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Resistor => "resistor",
            ComponentKind::Capacitor => "capacitor",
            ComponentKind::Inductor => "inductor",
            ComponentKind::VoltageSource => "voltage source",
            ComponentKind::CurrentSource => "current source",
            ComponentKind::Diode => "diode",
            ComponentKind::Bjt => "bipolar transistor",
            ComponentKind::Mosfet => "MOS transistor",
            ComponentKind::Device => "device",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(
            self,
            ComponentKind::VoltageSource | ComponentKind::CurrentSource
        )
    }

    pub fn spec(&self) -> &'static KindSpec {
        // The table is indexed in declaration order.
        &REGISTRY[*self as usize]
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let kind = match token.as_str() {
            "r" | "resistor" => ComponentKind::Resistor,
            "c" | "capacitor" => ComponentKind::Capacitor,
            "l" | "inductor" => ComponentKind::Inductor,
            "v" | "voltage_source" | "vsource" => ComponentKind::VoltageSource,
            "i" | "current_source" | "isource" => ComponentKind::CurrentSource,
            "d" | "diode" => ComponentKind::Diode,
            "q" | "bjt" | "bipolar_transistor" => ComponentKind::Bjt,
            "m" | "mosfet" | "mos_transistor" => ComponentKind::Mosfet,
            "x" | "u" | "device" | "subcircuit" => ComponentKind::Device,
            _ => return Err(CircuitError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ComponentKind {
    type Error = CircuitError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ComponentKind> for String {
    fn from(kind: ComponentKind) -> Self {
        kind.letter().to_string()
    }
}

/// Number of terminals a kind connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminals {
    Exact(usize),
    AtLeast(usize),
}

impl Terminals {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Terminals::Exact(n) => count == n,
            Terminals::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Terminals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminals::Exact(n) => write!(f, "exactly {n}"),
            Terminals::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// The variant of [`ComponentValue`] a kind expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A single magnitude; `positive` requires it to be strictly greater than zero.
    Scalar { positive: bool },
    /// Either a DC magnitude or a waveform description (`type` = dc | sine | pulse).
    Source,
    /// Named model parameters.
    Parameters,
}

/// Waveform parameters accepted by independent sources, by waveform type.
pub const SINE_PARAMS: &[&str] = &["amplitude", "frequency", "offset"];
pub const PULSE_PARAMS: &[&str] = &[
    "initial",
    "pulsed",
    "delay",
    "rise_time",
    "fall_time",
    "pulse_width",
    "period",
];

#[derive(Debug)]
pub struct KindSpec {
    pub kind: ComponentKind,
    pub terminals: Terminals,
    pub shape: ValueShape,
    /// Unit implied by a scalar value.
    pub unit: Option<&'static str>,
    /// Terminal names in node order, used for pin labels and diagnostics.
    /// Devices with extra terminals number the rest from `pins.len() + 1`.
    pub pins: &'static [&'static str],
}

static REGISTRY: [KindSpec; 9] = [
    KindSpec {
        kind: ComponentKind::Resistor,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Scalar { positive: true },
        unit: Some("Ω"),
        pins: &["1", "2"],
    },
    KindSpec {
        kind: ComponentKind::Capacitor,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Scalar { positive: true },
        unit: Some("F"),
        pins: &["1", "2"],
    },
    KindSpec {
        kind: ComponentKind::Inductor,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Scalar { positive: true },
        unit: Some("H"),
        pins: &["1", "2"],
    },
    KindSpec {
        kind: ComponentKind::VoltageSource,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Source,
        unit: Some("V"),
        pins: &["+", "-"],
    },
    KindSpec {
        kind: ComponentKind::CurrentSource,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Source,
        unit: Some("A"),
        pins: &["+", "-"],
    },
    KindSpec {
        kind: ComponentKind::Diode,
        terminals: Terminals::Exact(2),
        shape: ValueShape::Parameters,
        unit: None,
        pins: &["A", "K"],
    },
    KindSpec {
        kind: ComponentKind::Bjt,
        terminals: Terminals::Exact(3),
        shape: ValueShape::Parameters,
        unit: None,
        pins: &["C", "B", "E"],
    },
    KindSpec {
        kind: ComponentKind::Mosfet,
        terminals: Terminals::Exact(4),
        shape: ValueShape::Parameters,
        unit: None,
        pins: &["D", "G", "S", "B"],
    },
    KindSpec {
        kind: ComponentKind::Device,
        terminals: Terminals::AtLeast(3),
        shape: ValueShape::Parameters,
        unit: None,
        pins: &["out", "-", "+"],
    },
];

/// Resolution limit for `adc`/`dac` devices.
pub const MAX_CONVERTER_BITS: f64 = 32.0;

/// SPICE splits node names on whitespace and treats punctuation as syntax,
/// so labels are restricted to identifier characters.
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Look up a kind by its token (`"R"`, `"resistor"`, ...).
pub fn lookup(token: &str) -> Result<&'static KindSpec> {
    token.parse::<ComponentKind>().map(|kind| kind.spec())
}

impl KindSpec {
    /// Validate a node list and value against this kind.
    pub fn check(&self, nodes: &[String], value: &ComponentValue) -> Result<()> {
        self.check_nodes(nodes)?;
        self.check_value(value)
    }

    pub fn check_nodes(&self, nodes: &[String]) -> Result<()> {
        if !self.terminals.accepts(nodes.len()) {
            return Err(CircuitError::invalid(
                self.kind,
                format!(
                    "expected {} nodes ({}), got {}",
                    self.terminals,
                    self.pins.join(" "),
                    nodes.len()
                ),
            ));
        }
        for (pos, node) in nodes.iter().enumerate() {
            if node.trim().is_empty() {
                return Err(CircuitError::invalid(
                    self.kind,
                    format!("node {} ({}) has an empty label", pos + 1, self.pin_name(pos)),
                ));
            }
            if !is_valid_label(node) {
                return Err(CircuitError::invalid(
                    self.kind,
                    format!(
                        "node label '{node}' on pin {} may only contain letters, digits and '_'",
                        self.pin_name(pos)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Name of terminal `pos`, e.g. `B` for a transistor's second node.
    pub fn pin_name(&self, pos: usize) -> String {
        self.pins
            .get(pos)
            .map(|p| p.to_string())
            .unwrap_or_else(|| (pos + 1).to_string())
    }

    pub fn check_value(&self, value: &ComponentValue) -> Result<()> {
        match (self.shape, value) {
            (ValueShape::Scalar { positive }, ComponentValue::Scalar(v)) => {
                self.check_magnitude(*v, positive)
            }
            (ValueShape::Scalar { .. }, ComponentValue::Parameters(_)) => Err(
                CircuitError::invalid(self.kind, "expected a single numeric value"),
            ),
            (ValueShape::Source, ComponentValue::Scalar(v)) => self.check_magnitude(*v, false),
            (ValueShape::Source, ComponentValue::Parameters(params)) => {
                let waveform = match params.get("type") {
                    None => "dc",
                    Some(ParamValue::Text(t)) => t.as_str(),
                    Some(ParamValue::Number(_)) => {
                        return Err(CircuitError::invalid(
                            self.kind,
                            "waveform 'type' must be a string",
                        ))
                    }
                };
                let numeric: &[&str] = match waveform.to_ascii_lowercase().as_str() {
                    "dc" => {
                        if !matches!(params.get("value"), Some(ParamValue::Number(_))) {
                            return Err(CircuitError::invalid(
                                self.kind,
                                "dc waveform requires a numeric 'value'",
                            ));
                        }
                        &["value"]
                    }
                    "sine" => SINE_PARAMS,
                    "pulse" => PULSE_PARAMS,
                    other => {
                        return Err(CircuitError::invalid(
                            self.kind,
                            format!("unsupported waveform type '{other}'"),
                        ))
                    }
                };
                for key in numeric {
                    if let Some(ParamValue::Text(_)) = params.get(*key) {
                        return Err(CircuitError::invalid(
                            self.kind,
                            format!("waveform parameter '{key}' must be numeric"),
                        ));
                    }
                }
                Ok(())
            }
            (ValueShape::Parameters, ComponentValue::Scalar(_)) => Err(CircuitError::invalid(
                self.kind,
                "expected a parameter mapping",
            )),
            (ValueShape::Parameters, ComponentValue::Parameters(params)) => {
                if let Some(ParamValue::Number(_)) = params.get("model") {
                    return Err(CircuitError::invalid(
                        self.kind,
                        "parameter 'model' must be a string",
                    ));
                }
                if self.kind == ComponentKind::Device {
                    return self.check_device(value);
                }
                Ok(())
            }
        }
    }

    fn check_device(&self, value: &ComponentValue) -> Result<()> {
        let Some(device) = value.device() else {
            return Err(CircuitError::invalid(
                self.kind,
                "device requires a string 'device' parameter",
            ));
        };
        if matches!(device.to_ascii_lowercase().as_str(), "adc" | "dac") {
            if let Some(bits) = value.param("bits") {
                let valid = bits
                    .as_f64()
                    .is_some_and(|b| b.fract() == 0.0 && (1.0..=MAX_CONVERTER_BITS).contains(&b));
                if !valid {
                    return Err(CircuitError::invalid(
                        self.kind,
                        format!("{device} 'bits' must be a whole number from 1 to {MAX_CONVERTER_BITS}, got {bits}"),
                    ));
                }
            }
            if let Some(reference) = value.param("reference") {
                if !reference.as_f64().is_some_and(|r| r.is_finite() && r > 0.0) {
                    return Err(CircuitError::invalid(
                        self.kind,
                        format!("{device} 'reference' must be a positive number, got {reference}"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_magnitude(&self, v: f64, positive: bool) -> Result<()> {
        if !v.is_finite() {
            return Err(CircuitError::invalid(self.kind, "value must be finite"));
        }
        if positive && v <= 0.0 {
            return Err(CircuitError::invalid(
                self.kind,
                format!("value must be positive, got {v}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn params(entries: &[(&str, ParamValue)]) -> ComponentValue {
        ComponentValue::Parameters(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn nodes(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_rows_match_kinds() {
        for kind in ComponentKind::ALL {
            assert_eq!(kind.spec().kind, kind);
        }
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("R".parse::<ComponentKind>().unwrap(), ComponentKind::Resistor);
        assert_eq!("r".parse::<ComponentKind>().unwrap(), ComponentKind::Resistor);
        assert_eq!(
            "Voltage Source".parse::<ComponentKind>().unwrap(),
            ComponentKind::VoltageSource
        );
        assert_eq!("U".parse::<ComponentKind>().unwrap(), ComponentKind::Device);
        assert!(matches!(
            lookup("Z"),
            Err(CircuitError::UnknownKind(token)) if token == "Z"
        ));
    }

    #[test]
    fn test_terminal_counts() {
        let r = ComponentKind::Resistor.spec();
        assert!(r.check_nodes(&nodes(&["a", "b"])).is_ok());
        assert!(r.check_nodes(&nodes(&["a"])).is_err());
        assert!(r.check_nodes(&nodes(&["a", "b", "c"])).is_err());

        let x = ComponentKind::Device.spec();
        assert!(x.check_nodes(&nodes(&["out", "n", "p"])).is_ok());
        assert!(x.check_nodes(&nodes(&["out", "n", "p", "vcc", "vee"])).is_ok());
        assert!(x.check_nodes(&nodes(&["out", "n"])).is_err());

        assert!(r.check_nodes(&nodes(&["a", " "])).is_err());
    }

    #[test]
    fn test_node_labels() {
        let q = ComponentKind::Bjt.spec();
        assert!(q.check_nodes(&nodes(&["v_cc1", "B", "0"])).is_ok());
        let err = q.check_nodes(&nodes(&["c", "in put", "e"])).unwrap_err();
        insta::assert_snapshot!(err, @"invalid bipolar transistor component: node label 'in put' on pin B may only contain letters, digits and '_'");
        for bad in ["a(b)", "x=1", "n*", "in+", "µ"] {
            assert!(q.check_nodes(&nodes(&["c", bad, "e"])).is_err(), "{bad}");
        }
        let err = q.check_nodes(&nodes(&["c"])).unwrap_err();
        insta::assert_snapshot!(err, @"invalid bipolar transistor component: expected exactly 3 nodes (C B E), got 1");
    }

    #[test]
    fn test_scalar_shape() {
        let r = ComponentKind::Resistor.spec();
        assert!(r.check_value(&ComponentValue::Scalar(1000.0)).is_ok());
        assert!(r.check_value(&ComponentValue::Scalar(0.0)).is_err());
        assert!(r.check_value(&ComponentValue::Scalar(f64::NAN)).is_err());
        assert!(r.check_value(&params(&[])).is_err());
    }

    #[test]
    fn test_source_shape() {
        let v = ComponentKind::VoltageSource.spec();
        assert!(v.check_value(&ComponentValue::Scalar(-5.0)).is_ok());
        assert!(v
            .check_value(&params(&[
                ("type", ParamValue::Text("sine".into())),
                ("amplitude", ParamValue::Number(1.0)),
                ("frequency", ParamValue::Number(1e3)),
            ]))
            .is_ok());
        assert!(v
            .check_value(&params(&[("type", ParamValue::Text("square".into()))]))
            .is_err());
        assert!(v
            .check_value(&params(&[
                ("type", ParamValue::Text("pulse".into())),
                ("period", ParamValue::Text("soon".into())),
            ]))
            .is_err());
        assert!(v.check_value(&params(&[])).is_err());
    }

    #[test]
    fn test_parameter_shape() {
        let d = ComponentKind::Diode.spec();
        assert!(d.check_value(&params(&[])).is_ok());
        assert!(d.check_value(&ComponentValue::Scalar(1.0)).is_err());

        let x = ComponentKind::Device.spec();
        assert!(x
            .check_value(&params(&[("device", ParamValue::Text("opamp".into()))]))
            .is_ok());
        assert!(x
            .check_value(&params(&[("gain", ParamValue::Number(1e5))]))
            .is_err());
        assert!(x
            .check_value(&params(&[("uvx_type", ParamValue::Text("opamp".into()))]))
            .is_ok());
    }

    #[test]
    fn test_converter_parameters() {
        let x = ComponentKind::Device.spec();
        let adc = |extra: &[(&str, ParamValue)]| {
            let mut entries = vec![("device", ParamValue::Text("adc".into()))];
            entries.extend(extra.iter().cloned());
            params(&entries)
        };
        assert!(x.check_value(&adc(&[])).is_ok());
        assert!(x
            .check_value(&adc(&[("bits", ParamValue::Number(10.0)), ("reference", ParamValue::Number(3.3))]))
            .is_ok());
        assert!(x.check_value(&adc(&[("bits", ParamValue::Number(0.0))])).is_err());
        assert!(x.check_value(&adc(&[("bits", ParamValue::Number(8.5))])).is_err());
        assert!(x.check_value(&adc(&[("bits", ParamValue::Number(64.0))])).is_err());
        assert!(x.check_value(&adc(&[("reference", ParamValue::Number(-1.0))])).is_err());
        assert!(x
            .check_value(&params(&[
                ("uvx_type", ParamValue::Text("dac".into())),
                ("reference", ParamValue::Text("vdd".into())),
            ]))
            .is_err());
    }
}
