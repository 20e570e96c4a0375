use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "circuit.toml";

/// Complete representation of a circuit.toml configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CircuitToml {
    /// Where circuits are persisted between invocations
    #[serde(default)]
    pub store: StoreConfig,

    /// Solver selection
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Schematic output
    #[serde(default)]
    pub schematic: SchematicConfig,
}

/// Configuration for [store] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// In-process linear DC solver
    #[default]
    Builtin,
    /// ngspice in batch mode
    Ngspice,
}

/// Configuration for [simulation] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default)]
    pub solver: SolverKind,

    /// ngspice executable name or path
    #[serde(default = "default_ngspice")]
    pub ngspice: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            ngspice: default_ngspice(),
        }
    }
}

/// Configuration for [schematic] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchematicConfig {
    /// Directory schematics are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for SchematicConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".circuits.json")
}

fn default_ngspice() -> String {
    "ngspice".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("schematics")
}

impl CircuitToml {
    /// Parse a circuit.toml file from string content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse circuit.toml: {e}"))
    }

    /// Read and parse a circuit.toml file from the filesystem
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load `path` if given, otherwise `circuit.toml` in `dir` when present,
    /// otherwise defaults. Relative paths in the file are resolved against
    /// the file's directory.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        let candidate = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = dir.join(CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default().relative_to(dir));
                }
                p
            }
        };
        let base = candidate
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());
        Ok(Self::from_file(&candidate)?.relative_to(&base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        if self.schematic.output_dir.is_relative() {
            self.schematic.output_dir = base.join(&self.schematic.output_dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CircuitToml::parse("").unwrap();
        assert_eq!(config, CircuitToml::default());
        assert_eq!(config.simulation.solver, SolverKind::Builtin);
        assert_eq!(config.simulation.ngspice, "ngspice");
    }

    #[test]
    fn test_parse_sections() {
        let config = CircuitToml::parse(
            r#"
[store]
path = "data/circuits.json"

[simulation]
solver = "ngspice"
ngspice = "/opt/ngspice/bin/ngspice"
"#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("data/circuits.json"));
        assert_eq!(config.simulation.solver, SolverKind::Ngspice);
        assert_eq!(config.schematic.output_dir, PathBuf::from("schematics"));
    }

    #[test]
    fn test_parse_error() {
        let err = CircuitToml::parse("[simulation]\nsolver = \"spectre\"").unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse circuit.toml"));
    }

    #[test]
    fn test_discover_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[schematic]\noutput_dir = \"out\"\n",
        )
        .unwrap();
        let config = CircuitToml::discover(None, dir.path()).unwrap();
        assert_eq!(config.schematic.output_dir, dir.path().join("out"));
        assert_eq!(config.store.path, dir.path().join(".circuits.json"));
    }
}
