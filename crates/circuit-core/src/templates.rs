//! Starter circuits offered to assistants as prompts.

use crate::model::{ComponentSpec, ParamValue, Parameters};

#[derive(Debug, Clone)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub components: Vec<ComponentSpec>,
}

fn params(entries: &[(&str, ParamValue)]) -> Parameters {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn voltage_divider() -> Template {
    Template {
        name: "voltage_divider",
        description: "9 V source across two equal 10 kΩ resistors; `out` sits at half the supply",
        components: vec![
            ComponentSpec::new("V", ["in", "0"], 9.0),
            ComponentSpec::new("R", ["in", "out"], 10e3),
            ComponentSpec::new("R", ["out", "0"], 10e3),
        ],
    }
}

pub fn rc_low_pass() -> Template {
    Template {
        name: "rc_low_pass",
        description: "First-order RC low-pass filter, output across the capacitor",
        components: vec![
            ComponentSpec::new("V", ["1", "0"], 5.0),
            ComponentSpec::new("R", ["1", "2"], 1e3),
            ComponentSpec::new("C", ["2", "0"], 1e-6),
        ],
    }
}

pub fn common_emitter() -> Template {
    Template {
        name: "common_emitter",
        description: "NPN common-emitter amplifier with divider bias and AC coupling",
        components: vec![
            ComponentSpec::new("V", ["vcc", "0"], 12.0),
            ComponentSpec::new("R", ["vcc", "collector"], 4.7e3),
            ComponentSpec::new("R", ["emitter", "0"], 1e3),
            ComponentSpec::new("R", ["vcc", "base"], 47e3),
            ComponentSpec::new("R", ["base", "0"], 10e3),
            ComponentSpec::new(
                "Q",
                ["collector", "base", "emitter"],
                params(&[("model", "2N3904".into()), ("bf", 100.0.into())]),
            ),
            ComponentSpec::new(
                "V",
                ["input", "0"],
                params(&[
                    ("type", "sine".into()),
                    ("amplitude", 0.01.into()),
                    ("frequency", 1e3.into()),
                ]),
            ),
            ComponentSpec::new("C", ["input", "base"], 10e-6),
            ComponentSpec::new("C", ["collector", "output"], 10e-6),
            ComponentSpec::new("R", ["output", "0"], 100e3),
        ],
    }
}

pub fn inverting_amplifier() -> Template {
    Template {
        name: "inverting_amplifier",
        description: "Op-amp inverting amplifier with a gain of -10",
        components: vec![
            ComponentSpec::new("V", ["in", "0"], 0.1),
            ComponentSpec::new("R", ["in", "inv"], 1e3),
            ComponentSpec::new("R", ["inv", "out"], 10e3),
            ComponentSpec::new(
                "X",
                ["out", "inv", "0"],
                params(&[("device", "opamp".into()), ("gain", 1e6.into())]),
            ),
            ComponentSpec::new("R", ["out", "0"], 10e3),
        ],
    }
}

pub fn all() -> Vec<Template> {
    vec![
        voltage_divider(),
        rc_low_pass(),
        common_emitter(),
        inverting_amplifier(),
    ]
}

pub fn find(name: &str) -> Option<Template> {
    all().into_iter().find(|t| t.name == name)
}
