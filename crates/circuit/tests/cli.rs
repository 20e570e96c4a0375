use std::process::Output;

use assert_cmd::Command;
use assert_fs::fixture::{FileWriteStr, PathChild};
use assert_fs::TempDir;
use serde_json::Value;

/// A scratch working directory; every command runs inside it, so the store
/// and schematics land there too.
struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
        }
    }

    fn write(&self, rel: &str, contents: &str) -> &Self {
        self.root.child(rel).write_str(contents).unwrap();
        self
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::cargo_bin("circuit")
            .unwrap()
            .current_dir(self.root.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .unwrap()
    }

    /// Run and require success, returning stdout.
    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "circuit {} failed:\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Run and require failure, returning stderr.
    fn fail(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "circuit {} unexpectedly succeeded",
            args.join(" ")
        );
        String::from_utf8_lossy(&output.stderr).into_owned()
    }

    fn json(&self, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.extend(["-f", "json"]);
        serde_json::from_str(&self.ok(&args)).unwrap()
    }
}

#[test]
fn test_divider_operating_point() {
    let sb = Sandbox::new();
    let state = sb.json(&["new", "--template", "voltage_divider"]);
    assert_eq!(state["circuit_id"], 1);
    assert_eq!(state["version"], 3);

    let result = sb.json(&["sim", "1"]);
    assert_eq!(result["analysis"], "operating_point");
    let out = result["nodes"]["out"].as_f64().unwrap();
    assert!((out - 4.5).abs() < 1e-6, "out = {out}");
    let input = result["nodes"]["in"].as_f64().unwrap();
    assert!((input - 9.0).abs() < 1e-6);
    assert!(result["nodes"].get("0").is_none());
    let i = result["branches"]["V1"].as_f64().unwrap();
    assert!((i + 4.5e-4).abs() < 1e-9, "I(V1) = {i}");

    let human = sb.ok(&["sim", "1"]);
    assert!(human.contains("V(out)"));
    assert!(human.contains("4.5V"));
}

#[test]
fn test_dc_sweep() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let result = sb.json(&[
        "sim", "1", "-a", "dc", "-p", "source=V1", "-p", "start=0", "-p", "stop=4", "-p",
        "step=2",
    ]);
    assert_eq!(result["analysis"], "dc_sweep");
    assert_eq!(result["sweep"]["source"], "V1");
    let out: Vec<f64> = result["nodes"]["out"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(out.len(), 3);
    assert!((out[2] - 2.0).abs() < 1e-6);
}

#[test]
fn test_empty_circuit_is_underconstrained() {
    let sb = Sandbox::new();
    sb.ok(&["new", "scratch"]);
    let stderr = sb.fail(&["sim", "1"]);
    assert!(stderr.contains("underconstrained circuit"), "{stderr}");
}

#[test]
fn test_edit_history_and_rollback() {
    let sb = Sandbox::new();
    sb.ok(&["new", "bench"]);
    sb.ok(&["add", "1", "V", "in", "0", "-v", "5"]);
    let resistor = sb.json(&["add", "1", "R", "in", "0", "-v", "1k"]);
    assert_eq!(resistor["id"], 2);
    assert_eq!(resistor["value"], 1000.0);

    sb.ok(&["set", "1", "R2", "-v", "2.2k"]);
    sb.ok(&["rm", "1", "2"]);
    let state = sb.json(&["show", "1"]);
    assert_eq!(state["version"], 4);
    assert_eq!(state["components"].as_array().unwrap().len(), 1);

    let history = sb.json(&["history", "1"]);
    let changes: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["change"]["op"].as_str().unwrap())
        .collect();
    assert_eq!(changes, ["created", "added", "added", "updated", "removed"]);

    let restored = sb.json(&["rollback", "1", "2"]);
    assert_eq!(restored["version"], 5);
    let components = restored["components"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[1]["value"], 1000.0);

    // Old versions stay readable after the rollback.
    let v4 = sb.json(&["show", "1", "--version", "4"]);
    assert_eq!(v4["components"].as_array().unwrap().len(), 1);
}

#[test]
fn test_rejected_add_keeps_version() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let stderr = sb.fail(&["add", "1", "R", "lonely", "-v", "1k"]);
    assert!(stderr.contains("invalid resistor component"), "{stderr}");
    let stderr = sb.fail(&["add", "1", "Z", "a", "b"]);
    assert!(stderr.contains("unknown component kind 'Z'"), "{stderr}");
    sb.fail(&["rm", "1", "R9"]);
    sb.fail(&["rollback", "1", "42"]);

    let state = sb.json(&["show", "1"]);
    assert_eq!(state["version"], 3);
}

#[test]
fn test_list_and_delete() {
    let sb = Sandbox::new();
    sb.ok(&["new", "first"]);
    sb.ok(&["new", "--template", "rc_low_pass"]);
    let list = sb.json(&["list"]);
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[1]["name"], "rc_low_pass");
    assert_eq!(list[1]["components"], 3);

    let table = sb.ok(&["list"]);
    assert!(table.contains("rc_low_pass"));

    sb.ok(&["delete", "1"]);
    let list = sb.json(&["list"]);
    assert_eq!(list.as_array().unwrap().len(), 1);
    sb.fail(&["show", "1"]);

    // Ids are never reused.
    let state = sb.json(&["new"]);
    assert_eq!(state["circuit_id"], 3);
}

#[test]
fn test_unknown_template() {
    let sb = Sandbox::new();
    let stderr = sb.fail(&["new", "--template", "flux_capacitor"]);
    assert!(stderr.contains("Unknown template 'flux_capacitor'"));
    assert!(stderr.contains("voltage_divider"));
}

#[test]
fn test_config_store_path() {
    let sb = Sandbox::new();
    sb.write(
        "circuit.toml",
        r#"
[store]
path = "data/circuits.json"

[schematic]
output_dir = "out"
"#,
    );
    sb.ok(&["new", "--template", "voltage_divider"]);
    assert!(sb.root.child("data/circuits.json").path().exists());
    assert!(!sb.root.child(".circuits.json").path().exists());

    sb.ok(&["draw", "1"]);
    assert!(sb.root.child("out/circuit_1_v3.svg").path().exists());
}

#[test]
fn test_invalid_config() {
    let sb = Sandbox::new();
    sb.write("circuit.toml", "[simulation]\nsolver = \"hspice\"\n");
    let stderr = sb.fail(&["list"]);
    assert!(stderr.contains("Failed to parse circuit.toml"), "{stderr}");
}

#[test]
fn test_draw_default_path() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let written = sb.json(&["draw", "1", "--title", "Divider"]);
    assert_eq!(written["version"], 3);

    let svg = std::fs::read_to_string(sb.root.child("schematics/circuit_1_v3.svg").path()).unwrap();
    assert!(svg.contains(">Divider<"));

    let stderr = sb.fail(&["draw", "1", "-o", "divider.png"]);
    assert!(stderr.contains("unsupported schematic format 'png'"), "{stderr}");
}

#[test]
fn test_draw_help_names_svg() {
    let sb = Sandbox::new();
    let help = sb.ok(&["draw", "--help"]);
    let help = help.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(help.contains("SVG is the only supported format"), "{help}");
}

#[test]
fn test_rename_keeps_version() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let renamed = sb.json(&["rename", "1", "bias network"]);
    assert_eq!(renamed["name"], "bias network");
    assert_eq!(renamed["version"], 3);

    let state = sb.json(&["show", "1"]);
    assert_eq!(state["name"], "bias network");
    assert_eq!(state["version"], 3);
    let history = sb.json(&["history", "1"]);
    assert_eq!(history.as_array().unwrap().len(), 4);

    let stderr = sb.fail(&["rename", "1", "  "]);
    assert!(stderr.contains("must not be empty"), "{stderr}");
    sb.fail(&["rename", "9", "ghost"]);
}

#[test]
fn test_spice_unsafe_labels_rejected() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let stderr = sb.fail(&["add", "1", "R", "in put", "0", "-v", "1k"]);
    assert!(stderr.contains("may only contain letters, digits and '_'"), "{stderr}");
    let stderr = sb.fail(&["add", "1", "R", "OUT", "0", "-v", "1k"]);
    assert!(stderr.contains("labels are not case-sensitive"), "{stderr}");
    assert_eq!(sb.json(&["show", "1"])["version"], 3);
}

#[test]
fn test_netlist() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "voltage_divider"]);
    let deck = sb.ok(&["netlist", "1"]);
    assert!(deck.contains("V1 in 0 DC 9"), "{deck}");
    assert!(deck.contains("R2 in out 10000"), "{deck}");
    assert!(deck.trim_end().ends_with(".end"));

    sb.ok(&["netlist", "1", "-o", "divider.cir"]);
    let written = std::fs::read_to_string(sb.root.child("divider.cir").path()).unwrap();
    assert_eq!(written, deck);
}

#[test]
fn test_builtin_rejects_transient() {
    let sb = Sandbox::new();
    sb.ok(&["new", "--template", "rc_low_pass"]);
    let stderr = sb.fail(&[
        "sim",
        "1",
        "-a",
        "tran",
        "-p",
        "step_time=1u",
        "-p",
        "end_time=1m",
        "--solver",
        "builtin",
    ]);
    assert!(stderr.contains("builtin failed"), "{stderr}");
}
