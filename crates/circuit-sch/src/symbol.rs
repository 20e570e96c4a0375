use circuit_core::{Component, ComponentKind};
use log::warn;
use serde::Serialize;

/// Drawing symbol for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    Diode,
    Npn,
    Pnp,
    Nmos,
    Pmos,
    OpAmp,
    /// Labeled box for devices without a dedicated symbol.
    Placeholder,
}

impl Symbol {
    pub fn for_component(component: &Component) -> Symbol {
        let polarity = component
            .value
            .param_str("polarity")
            .map(str::to_ascii_lowercase);
        match component.kind {
            ComponentKind::Resistor => Symbol::Resistor,
            ComponentKind::Capacitor => Symbol::Capacitor,
            ComponentKind::Inductor => Symbol::Inductor,
            ComponentKind::VoltageSource => Symbol::VoltageSource,
            ComponentKind::CurrentSource => Symbol::CurrentSource,
            ComponentKind::Diode => Symbol::Diode,
            ComponentKind::Bjt if polarity.as_deref() == Some("pnp") => Symbol::Pnp,
            ComponentKind::Bjt => Symbol::Npn,
            ComponentKind::Mosfet if polarity.as_deref() == Some("pmos") => Symbol::Pmos,
            ComponentKind::Mosfet => Symbol::Nmos,
            ComponentKind::Device => {
                let device = component.value.device().unwrap_or_default();
                match device.to_ascii_lowercase().as_str() {
                    "opamp" | "comparator" => Symbol::OpAmp,
                    _ => {
                        warn!(
                            "{}: no symbol for device '{device}', drawing a placeholder",
                            component.designator()
                        );
                        Symbol::Placeholder
                    }
                }
            }
        }
    }

    /// Symbols drawn inline between two nodes; the rest are drawn as a body
    /// with one lead per pin.
    pub fn is_two_terminal(&self) -> bool {
        matches!(
            self,
            Symbol::Resistor
                | Symbol::Capacitor
                | Symbol::Inductor
                | Symbol::VoltageSource
                | Symbol::CurrentSource
                | Symbol::Diode
        )
    }

    /// Caption inside a body symbol.
    pub fn caption(&self) -> &'static str {
        match self {
            Symbol::Npn => "NPN",
            Symbol::Pnp => "PNP",
            Symbol::Nmos => "NMOS",
            Symbol::Pmos => "PMOS",
            Symbol::OpAmp => "OPAMP",
            Symbol::Placeholder => "?",
            Symbol::Resistor => "R",
            Symbol::Capacitor => "C",
            Symbol::Inductor => "L",
            Symbol::VoltageSource => "V",
            Symbol::CurrentSource => "I",
            Symbol::Diode => "D",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_core::{Circuit, CircuitId, Parameters};

    fn device(params: &[(&str, &str)]) -> Component {
        let mut circuit = Circuit::new(CircuitId(1), "symbols");
        let params: Parameters = params
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).into()))
            .collect();
        let is_device = params.contains_key("device") || params.contains_key("uvx_type");
        let nodes: &[&str] = if is_device {
            &["o", "n", "p"]
        } else {
            &["c", "b", "e"]
        };
        let kind = if is_device {
            ComponentKind::Device
        } else {
            ComponentKind::Bjt
        };
        circuit
            .add_component(kind, nodes.iter().copied(), params)
            .unwrap()
    }

    #[test]
    fn test_device_symbols() {
        assert_eq!(Symbol::for_component(&device(&[("device", "OpAmp")])), Symbol::OpAmp);
        assert_eq!(
            Symbol::for_component(&device(&[("device", "adc")])),
            Symbol::Placeholder
        );
        assert_eq!(Symbol::for_component(&device(&[("uvx_type", "opamp")])), Symbol::OpAmp);
    }

    #[test]
    fn test_bjt_polarity() {
        assert_eq!(Symbol::for_component(&device(&[("model", "2N3904")])), Symbol::Npn);
        assert_eq!(
            Symbol::for_component(&device(&[("model", "2N3906"), ("polarity", "PNP")])),
            Symbol::Pnp
        );
    }
}
