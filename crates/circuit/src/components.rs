use anyhow::{bail, Context, Result};
use circuit_core::{
    CircuitId, Component, ComponentId, ComponentKind, ComponentValue, ParamValue, Parameters,
};
use clap::Args;
use colored::Colorize;

use crate::output::{print_json, OutputFormat};
use crate::workspace::{GlobalArgs, Workspace};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Circuit id
    pub circuit: u32,

    /// Component kind (R, C, L, V, I, D, Q, M, X or its name)
    pub kind: String,

    /// Node labels, one per terminal
    #[arg(required = true, num_args = 1..)]
    pub nodes: Vec<String>,

    #[command(flatten)]
    pub value: ValueArgs,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Circuit id
    pub circuit: u32,

    /// Component designator (R2) or id (2)
    pub component: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Circuit id
    pub circuit: u32,

    /// Component designator (R2) or id (2)
    pub component: String,

    #[command(flatten)]
    pub value: ValueArgs,
}

#[derive(Args, Debug)]
pub struct ValueArgs {
    /// Scalar value with optional SI suffix (10k, 4.7u, 1meg) or a JSON object
    #[arg(short, long, allow_hyphen_values = true)]
    pub value: Option<String>,

    /// Device parameter as KEY=VALUE (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

impl ValueArgs {
    fn parse(&self) -> Result<ComponentValue> {
        match (&self.value, self.params.is_empty()) {
            (Some(_), false) => bail!("Use either --value or --param, not both"),
            (Some(value), true) => parse_value(value),
            (None, false) => parse_params(&self.params).map(ComponentValue::Parameters),
            (None, true) => Ok(ComponentValue::default()),
        }
    }
}

pub fn add(args: AddArgs, global: &GlobalArgs) -> Result<()> {
    let kind: ComponentKind = args.kind.parse()?;
    let value = args.value.parse()?;
    let ws = Workspace::open(global)?;
    let component = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| {
            c.add_component(kind, args.nodes.iter().cloned(), value)
        })?;
    ws.save()?;
    report("Added", &component, global)
}

pub fn remove(args: RmArgs, global: &GlobalArgs) -> Result<()> {
    let id = parse_component_ref(&args.component)?;
    let ws = Workspace::open(global)?;
    let version = ws.directory.with_circuit(CircuitId(args.circuit), |c| {
        c.remove_component(id)?;
        Ok(c.current_version())
    })?;
    ws.save()?;
    match global.format {
        OutputFormat::Human => println!(
            "{} Removed component {id} (now v{version})",
            "✓".green()
        ),
        OutputFormat::Json => print_json(&serde_json::json!({
            "removed": id,
            "version": version,
        }))?,
    }
    Ok(())
}

pub fn set(args: SetArgs, global: &GlobalArgs) -> Result<()> {
    let id = parse_component_ref(&args.component)?;
    let value = args.value.parse()?;
    let ws = Workspace::open(global)?;
    let component = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| c.update_component(id, value))?;
    ws.save()?;
    report("Updated", &component, global)
}

fn report(verb: &str, component: &Component, global: &GlobalArgs) -> Result<()> {
    match global.format {
        OutputFormat::Human => {
            let label = component.value_label();
            println!(
                "{} {verb} {} {} {}",
                "✓".green(),
                component.designator().bold(),
                component.nodes.join(" "),
                if label.is_empty() { "-".to_string() } else { label }
            );
        }
        OutputFormat::Json => print_json(component)?,
    }
    Ok(())
}

/// Accept either a bare id (`2`) or a designator (`R2`). The letter of a
/// designator is not checked against the component's kind.
fn parse_component_ref(reference: &str) -> Result<ComponentId> {
    let digits = reference.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    digits
        .parse::<u32>()
        .map(ComponentId)
        .with_context(|| format!("Invalid component reference '{reference}'"))
}

fn parse_value(input: &str) -> Result<ComponentValue> {
    let input = input.trim();
    if input.starts_with('{') {
        let params: Parameters = serde_json::from_str(input)
            .with_context(|| format!("Invalid parameter object '{input}'"))?;
        return Ok(ComponentValue::Parameters(params));
    }
    parse_si(input)
        .map(ComponentValue::Scalar)
        .with_context(|| format!("Invalid value '{input}'"))
}

fn parse_params(entries: &[String]) -> Result<Parameters> {
    entries
        .iter()
        .map(|entry| {
            let Some((key, value)) = entry.split_once('=') else {
                bail!("Invalid parameter '{entry}', expected KEY=VALUE");
            };
            let value = match parse_si(value) {
                Ok(n) => ParamValue::Number(n),
                Err(_) => ParamValue::Text(value.to_string()),
            };
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

/// Parse a number with an optional SPICE-style scale suffix.
pub(crate) fn parse_si(input: &str) -> Result<f64> {
    const SUFFIXES: [(&str, f64); 11] = [
        ("meg", 1e6),
        ("f", 1e-15),
        ("p", 1e-12),
        ("n", 1e-9),
        ("u", 1e-6),
        ("µ", 1e-6),
        ("m", 1e-3),
        ("k", 1e3),
        ("g", 1e9),
        ("t", 1e12),
        ("", 1.0),
    ];

    let lower = input.trim().to_lowercase();
    for (suffix, scale) in SUFFIXES {
        let Some(number) = lower.strip_suffix(suffix) else {
            continue;
        };
        if let Ok(n) = number.parse::<f64>() {
            if n.is_finite() {
                return Ok(n * scale);
            }
        }
    }
    bail!("expected a number with an optional suffix (f, p, n, u, m, k, meg, g, t)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_si() {
        assert_eq!(parse_si("10k").unwrap(), 10e3);
        assert!((parse_si("4.7u").unwrap() - 4.7e-6).abs() < 1e-18);
        assert!((parse_si("4.7µ").unwrap() - 4.7e-6).abs() < 1e-18);
        assert_eq!(parse_si("1MEG").unwrap(), 1e6);
        assert_eq!(parse_si("2m").unwrap(), 2e-3);
        assert_eq!(parse_si("-5").unwrap(), -5.0);
        assert_eq!(parse_si("1e3").unwrap(), 1e3);
        assert!(parse_si("10kohm").is_err());
        assert!(parse_si("abc").is_err());
        assert!(parse_si("inf").is_err());
    }

    #[test]
    fn test_parse_value_json() {
        let value = parse_value(r#"{"model": "2N3904", "bf": 100}"#).unwrap();
        assert_eq!(value.param_str("model"), Some("2N3904"));
        assert_eq!(value.param_f64("bf"), Some(100.0));
    }

    #[test]
    fn test_value_args() {
        let args = ValueArgs {
            value: None,
            params: vec!["device=opamp".into(), "gain=100k".into()],
        };
        let value = args.parse().unwrap();
        assert_eq!(value.param_str("device"), Some("opamp"));
        assert_eq!(value.param_f64("gain"), Some(100e3));

        let both = ValueArgs {
            value: Some("1k".into()),
            params: vec!["a=b".into()],
        };
        assert!(both.parse().is_err());

        let none = ValueArgs {
            value: None,
            params: vec![],
        };
        assert_eq!(none.parse().unwrap(), ComponentValue::default());
    }

    #[test]
    fn test_parse_component_ref() {
        assert_eq!(parse_component_ref("R2").unwrap(), ComponentId(2));
        assert_eq!(parse_component_ref("12").unwrap(), ComponentId(12));
        assert!(parse_component_ref("R").is_err());
        assert!(parse_component_ref("Rx").is_err());
    }
}
