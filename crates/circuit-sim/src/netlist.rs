use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::io::Write;

use circuit_core::{is_ground, Component, ComponentKind, ComponentValue, Snapshot};
use itertools::Itertools;

use crate::analysis::AnalysisRequest;
use crate::error::SimulationError;

/// Time-domain shape of an independent source.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    Dc(f64),
    Sine {
        offset: f64,
        amplitude: f64,
        frequency: f64,
    },
    Pulse {
        initial: f64,
        pulsed: f64,
        delay: f64,
        rise_time: f64,
        fall_time: f64,
        pulse_width: f64,
        period: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub waveform: Waveform,
    /// Small-signal magnitude used by AC analysis.
    pub ac: Option<f64>,
}

impl Source {
    /// Value seen by a DC solve (the t=0 value for time-varying sources).
    pub fn dc_value(&self) -> f64 {
        match self.waveform {
            Waveform::Dc(v) => v,
            Waveform::Sine { offset, .. } => offset,
            Waveform::Pulse { initial, .. } => initial,
        }
    }

    fn from_value(value: &ComponentValue) -> Self {
        let param = |key: &str, default: f64| value.param_f64(key).unwrap_or(default);
        let waveform = match value {
            ComponentValue::Scalar(v) => Waveform::Dc(*v),
            ComponentValue::Parameters(_) => {
                match value.param_str("type").map(str::to_ascii_lowercase).as_deref() {
                    Some("sine") => Waveform::Sine {
                        offset: param("offset", 0.0),
                        amplitude: param("amplitude", 1.0),
                        frequency: param("frequency", 1e3),
                    },
                    Some("pulse") => Waveform::Pulse {
                        initial: param("initial", 0.0),
                        pulsed: param("pulsed", 5.0),
                        delay: param("delay", 0.0),
                        rise_time: param("rise_time", 1e-9),
                        fall_time: param("fall_time", 1e-9),
                        pulse_width: param("pulse_width", 1e-3),
                        period: param("period", 2e-3),
                    },
                    _ => Waveform::Dc(param("value", 0.0)),
                }
            }
        };
        Source {
            waveform,
            ac: value.param_f64("ac"),
        }
    }
}

/// A `.model` card shared by semiconductor elements.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceModel {
    pub name: String,
    /// SPICE model type: D, NPN, PNP, NMOS, PMOS.
    pub model_type: &'static str,
    pub params: BTreeMap<String, f64>,
}

impl DeviceModel {
    const RESERVED: [&'static str; 2] = ["model", "polarity"];

    fn from_value(value: &ComponentValue, model_type: &'static str, default_name: &str) -> Self {
        let params = value
            .parameters()
            .into_iter()
            .flatten()
            .filter(|(key, _)| !Self::RESERVED.contains(&key.as_str()))
            .filter_map(|(key, v)| v.as_f64().map(|n| (key.clone(), n)))
            .collect();
        Self {
            name: value
                .param_str("model")
                .unwrap_or(default_name)
                .to_string(),
            model_type,
            params,
        }
    }
}

/// Solver-facing form of one component.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Resistor(f64),
    Capacitor(f64),
    Inductor(f64),
    VoltageSource(Source),
    CurrentSource(Source),
    Diode(DeviceModel),
    Bjt(DeviceModel),
    Mosfet(DeviceModel),
    /// Ideal voltage-controlled amplifier; nodes are `out, in-, in+`.
    OpAmp { gain: f64 },
    /// Two-level comparator; nodes are `out, in-, in+`.
    Comparator { high: f64, low: f64 },
    /// Quantizer; nodes are `out, in`. The output is the input rounded to
    /// one of `2^bits` levels between 0 and `reference`.
    Adc { bits: u32, reference: f64 },
    /// Scales an input in the 0..1 range to `0..reference`; nodes are `out, in`.
    Dac { reference: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetlistElement {
    pub designator: String,
    pub kind: ComponentKind,
    /// Node labels with ground spellings rewritten to `"0"`.
    pub nodes: Vec<String>,
    pub element: Element,
}

impl NetlistElement {
    fn from_component(component: &Component) -> Result<Self, SimulationError> {
        let designator = component.designator();
        let value = &component.value;
        let scalar = || value.scalar().unwrap_or_default();
        let element = match component.kind {
            ComponentKind::Resistor => Element::Resistor(scalar()),
            ComponentKind::Capacitor => Element::Capacitor(scalar()),
            ComponentKind::Inductor => Element::Inductor(scalar()),
            ComponentKind::VoltageSource => Element::VoltageSource(Source::from_value(value)),
            ComponentKind::CurrentSource => Element::CurrentSource(Source::from_value(value)),
            ComponentKind::Diode => Element::Diode(DeviceModel::from_value(value, "D", "default_diode")),
            ComponentKind::Bjt => {
                let (model_type, default_name) = match value.param_str("polarity") {
                    Some(p) if p.eq_ignore_ascii_case("pnp") => ("PNP", "default_pnp"),
                    _ => ("NPN", "default_npn"),
                };
                Element::Bjt(DeviceModel::from_value(value, model_type, default_name))
            }
            ComponentKind::Mosfet => {
                let (model_type, default_name) = match value.param_str("polarity") {
                    Some(p) if p.eq_ignore_ascii_case("pmos") => ("PMOS", "default_pmos"),
                    _ => ("NMOS", "default_nmos"),
                };
                Element::Mosfet(DeviceModel::from_value(value, model_type, default_name))
            }
            ComponentKind::Device => {
                let device = value.device().unwrap_or_default();
                match device.to_ascii_lowercase().as_str() {
                    "opamp" => Element::OpAmp {
                        gain: value.param_f64("gain").unwrap_or(1e6),
                    },
                    "comparator" => Element::Comparator {
                        high: value.param_f64("high").unwrap_or(5.0),
                        low: value.param_f64("low").unwrap_or(0.0),
                    },
                    "adc" => Element::Adc {
                        bits: value.param_f64("bits").map_or(8, |b| b as u32),
                        reference: value.param_f64("reference").unwrap_or(5.0),
                    },
                    "dac" => Element::Dac {
                        reference: value.param_f64("reference").unwrap_or(5.0),
                    },
                    _ => {
                        return Err(SimulationError::UnsupportedDevice {
                            designator,
                            device: device.to_string(),
                        })
                    }
                }
            }
        };
        Ok(NetlistElement {
            designator,
            kind: component.kind,
            nodes: component.nodes.iter().map(|n| normalize_node(n)).collect(),
            element,
        })
    }
}

pub fn normalize_node(node: &str) -> String {
    if is_ground(node) {
        "0".to_string()
    } else {
        node.to_string()
    }
}

/// Declarative netlist: the `(kind, nodes, value)` list a solver consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Netlist {
    pub title: String,
    pub elements: Vec<NetlistElement>,
}

impl Netlist {
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, SimulationError> {
        let elements = snapshot
            .components()
            .map(NetlistElement::from_component)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Netlist {
            title: snapshot.name.clone(),
            elements,
        })
    }

    /// Non-ground node labels in first-seen order.
    pub fn nodes(&self) -> Vec<&str> {
        self.elements
            .iter()
            .flat_map(|e| e.nodes.iter())
            .map(String::as_str)
            .filter(|n| *n != "0")
            .unique()
            .collect()
    }

    pub fn element(&self, designator: &str) -> Option<&NetlistElement> {
        self.elements
            .iter()
            .find(|e| e.designator.eq_ignore_ascii_case(designator))
    }

    /// Elements whose branch current SPICE reports (voltage sources and inductors).
    pub fn current_branches(&self) -> impl Iterator<Item = &NetlistElement> {
        self.elements
            .iter()
            .filter(|e| matches!(e.element, Element::VoltageSource(_) | Element::Inductor(_)))
    }

    /// Check request parameters that refer to circuit elements.
    pub fn check_request(&self, request: &AnalysisRequest) -> Result<(), SimulationError> {
        if let AnalysisRequest::DcSweep(dc) = request {
            match self.element(&dc.source).map(|e| &e.element) {
                Some(Element::VoltageSource(_) | Element::CurrentSource(_)) => {}
                _ => {
                    return Err(SimulationError::InvalidAnalysis(format!(
                        "dc sweep source '{}' is not an independent source in this circuit",
                        dc.source
                    )))
                }
            }
        }
        Ok(())
    }

    /// Write a complete SPICE deck.
    pub fn write_spice(&self, out: &mut impl Write) -> std::io::Result<()> {
        self.write_deck(out, None)
    }

    /// Write the deck with an optional `.control` block placed before `.end`.
    pub fn write_deck(&self, out: &mut impl Write, control: Option<&str>) -> std::io::Result<()> {
        writeln!(out, "* {}", self.title)?;

        let mut models = Vec::new();
        let mut seen_models = HashSet::new();
        for e in &self.elements {
            let nodes = e.nodes.join(" ");
            let d = &e.designator;
            match &e.element {
                Element::Resistor(v) | Element::Capacitor(v) | Element::Inductor(v) => {
                    writeln!(out, "{d} {nodes} {}", spice_number(*v))?
                }
                Element::VoltageSource(source) | Element::CurrentSource(source) => {
                    writeln!(out, "{d} {nodes} {}", source_spec(source))?
                }
                Element::Diode(model) | Element::Bjt(model) | Element::Mosfet(model) => {
                    writeln!(out, "{d} {nodes} {}", model.name)?;
                    if seen_models.insert(model.name.clone()) {
                        models.push(model);
                    }
                }
                Element::OpAmp { gain } => {
                    let (o, n, p) = (&e.nodes[0], &e.nodes[1], &e.nodes[2]);
                    writeln!(out, "R{d}_in {p} {n} 1e9")?;
                    writeln!(out, "E{d} {o} 0 {p} {n} {}", spice_number(*gain))?;
                }
                Element::Comparator { high, low } => {
                    let (o, n, p) = (&e.nodes[0], &e.nodes[1], &e.nodes[2]);
                    writeln!(
                        out,
                        "B{d} {o} 0 V=(v({p})-v({n})) > 0 ? {} : {}",
                        spice_number(*high),
                        spice_number(*low)
                    )?;
                }
                Element::Adc { bits, reference } => {
                    let (o, i) = (&e.nodes[0], &e.nodes[1]);
                    let levels = spice_number((1u64 << bits) as f64 - 1.0);
                    let reference = spice_number(*reference);
                    writeln!(
                        out,
                        "B{d} {o} 0 V=floor(v({i})*{levels}/{reference}+0.5)*{reference}/{levels}"
                    )?;
                }
                Element::Dac { reference } => {
                    let (o, i) = (&e.nodes[0], &e.nodes[1]);
                    writeln!(out, "B{d} {o} 0 V=v({i})*{}", spice_number(*reference))?;
                }
            }
        }

        for model in models {
            let params = model
                .params
                .iter()
                .map(|(k, v)| format!("{k}={}", spice_number(*v)))
                .join(" ");
            writeln!(out, ".model {} {}({params})", model.name, model.model_type)?;
        }

        if let Some(control) = control {
            write!(out, "{control}")?;
        }
        writeln!(out, ".end")
    }

    pub fn to_spice(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_spice(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn source_spec(source: &Source) -> String {
    let mut spec = match &source.waveform {
        Waveform::Dc(v) => format!("DC {}", spice_number(*v)),
        Waveform::Sine {
            offset,
            amplitude,
            frequency,
        } => format!(
            "SIN({} {} {})",
            spice_number(*offset),
            spice_number(*amplitude),
            spice_number(*frequency)
        ),
        Waveform::Pulse {
            initial,
            pulsed,
            delay,
            rise_time,
            fall_time,
            pulse_width,
            period,
        } => format!(
            "PULSE({})",
            [initial, pulsed, delay, rise_time, fall_time, pulse_width, period]
                .iter()
                .map(|v| spice_number(**v))
                .join(" ")
        ),
    };
    if let Some(ac) = source.ac {
        spec.push_str(&format!(" AC {}", spice_number(ac)));
    }
    spec
}

/// Render a number the way SPICE reads it back exactly.
pub fn spice_number(v: impl Into<f64>) -> impl Display {
    let v: f64 = v.into();
    if v != 0.0 && (v.abs() >= 1e6 || v.abs() < 1e-3) {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_core::{templates, Circuit, CircuitId, ParamValue, Parameters};

    fn from_template(template: templates::Template) -> Netlist {
        let mut circuit = Circuit::new(CircuitId(1), template.name);
        for spec in &template.components {
            circuit.add_spec(spec).unwrap();
        }
        Netlist::from_snapshot(&circuit.snapshot()).unwrap()
    }

    #[test]
    fn test_divider_deck() {
        let netlist = from_template(templates::voltage_divider());
        insta::assert_snapshot!(netlist.to_spice(), @r"
        * voltage_divider
        V1 in 0 DC 9
        R2 in out 10000
        R3 out 0 10000
        .end
        ");
    }

    #[test]
    fn test_common_emitter_deck() {
        let netlist = from_template(templates::common_emitter());
        insta::assert_snapshot!(netlist.to_spice(), @r"
        * common_emitter
        V1 vcc 0 DC 12
        R2 vcc collector 4700
        R3 emitter 0 1000
        R4 vcc base 47000
        R5 base 0 10000
        Q6 collector base emitter 2N3904
        V7 input 0 SIN(0 0.01 1000)
        C8 input base 1e-5
        C9 collector output 1e-5
        R10 output 0 100000
        .model 2N3904 NPN(bf=100)
        .end
        ");
    }

    #[test]
    fn test_opamp_expansion() {
        let netlist = from_template(templates::inverting_amplifier());
        let deck = netlist.to_spice();
        assert!(deck.contains("RX4_in 0 inv 1e9\n"));
        assert!(deck.contains("EX4 out 0 0 inv 1e6\n"));
    }

    #[test]
    fn test_ground_aliases_are_normalized() {
        let mut circuit = Circuit::new(CircuitId(1), "gnd");
        circuit
            .add_component(ComponentKind::VoltageSource, ["a", "GND"], 1.0)
            .unwrap();
        circuit
            .add_component(ComponentKind::Resistor, ["a", "ground"], 1.0)
            .unwrap();
        let netlist = Netlist::from_snapshot(&circuit.snapshot()).unwrap();
        assert_eq!(netlist.elements[0].nodes, vec!["a", "0"]);
        assert_eq!(netlist.elements[1].nodes, vec!["a", "0"]);
        assert_eq!(netlist.nodes(), vec!["a"]);
    }

    fn device(entries: &[(&str, ParamValue)]) -> Parameters {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_converter_devices() {
        let mut circuit = Circuit::new(CircuitId(1), "converters");
        circuit
            .add_component(ComponentKind::VoltageSource, ["vin", "0"], 1.2)
            .unwrap();
        circuit
            .add_component(
                ComponentKind::Device,
                ["code", "vin", "0"],
                device(&[("device", "adc".into()), ("bits", 4.0.into()), ("reference", 3.3.into())]),
            )
            .unwrap();
        circuit
            .add_component(
                ComponentKind::Device,
                ["aout", "code", "0"],
                device(&[("uvx_type", "dac".into())]),
            )
            .unwrap();
        let netlist = Netlist::from_snapshot(&circuit.snapshot()).unwrap();
        assert_eq!(
            netlist.elements[1].element,
            Element::Adc {
                bits: 4,
                reference: 3.3
            }
        );
        insta::assert_snapshot!(netlist.to_spice(), @r"
        * converters
        V1 vin 0 DC 1.2
        BX2 code 0 V=floor(v(vin)*15/3.3+0.5)*3.3/15
        BX3 aout 0 V=v(code)*5
        .end
        ");
    }

    #[test]
    fn test_device_type_alias() {
        let mut circuit = Circuit::new(CircuitId(1), "alias");
        circuit
            .add_component(
                ComponentKind::Device,
                ["out", "inv", "0"],
                device(&[("uvx_type", "opamp".into()), ("gain", 1e5.into())]),
            )
            .unwrap();
        let netlist = Netlist::from_snapshot(&circuit.snapshot()).unwrap();
        assert_eq!(netlist.elements[0].element, Element::OpAmp { gain: 1e5 });
    }

    #[test]
    fn test_unsupported_device() {
        let mut circuit = Circuit::new(CircuitId(1), "pll");
        circuit
            .add_component(ComponentKind::Device, ["o", "i", "0"], device(&[("device", "pll".into())]))
            .unwrap();
        let err = Netlist::from_snapshot(&circuit.snapshot()).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::UnsupportedDevice { ref device, .. } if device == "pll"
        ));
    }

    #[test]
    fn test_spice_number() {
        assert_eq!(spice_number(10000.0).to_string(), "10000");
        assert_eq!(spice_number(1e-6).to_string(), "1e-6");
        assert_eq!(spice_number(2.5e6).to_string(), "2.5e6");
        assert_eq!(spice_number(0.0).to_string(), "0");
    }
}
