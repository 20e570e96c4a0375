use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::is_ground;
use crate::registry::ComponentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitId(pub u32);

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component identifier, unique within one circuit and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

pub type Parameters = BTreeMap<String, ParamValue>;

/// Value carried by a component. Which variant is valid depends on the kind,
/// see [`ValueShape`](crate::registry::ValueShape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Scalar(f64),
    Parameters(Parameters),
}

impl Default for ComponentValue {
    fn default() -> Self {
        ComponentValue::Parameters(Parameters::new())
    }
}

impl From<f64> for ComponentValue {
    fn from(v: f64) -> Self {
        ComponentValue::Scalar(v)
    }
}

impl From<Parameters> for ComponentValue {
    fn from(p: Parameters) -> Self {
        ComponentValue::Parameters(p)
    }
}

impl ComponentValue {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            ComponentValue::Scalar(v) => Some(*v),
            ComponentValue::Parameters(_) => None,
        }
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        match self {
            ComponentValue::Parameters(p) => Some(p),
            ComponentValue::Scalar(_) => None,
        }
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.parameters().and_then(|p| p.get(key))
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(ParamValue::as_f64)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(ParamValue::as_str)
    }

    /// Device type of an `X` component. `uvx_type` is the older spelling.
    pub fn device(&self) -> Option<&str> {
        self.param_str("device")
            .or_else(|| self.param_str("uvx_type"))
    }
}

/// Format a magnitude with an SI prefix, e.g. `10000.0` → `10k`.
pub fn format_si(value: f64, unit: &str) -> String {
    const PREFIXES: [(f64, &str); 9] = [
        (1e9, "G"),
        (1e6, "M"),
        (1e3, "k"),
        (1.0, ""),
        (1e-3, "m"),
        (1e-6, "µ"),
        (1e-9, "n"),
        (1e-12, "p"),
        (1e-15, "f"),
    ];
    if value == 0.0 || !value.is_finite() {
        return format!("{value}{unit}");
    }
    let magnitude = value.abs();
    let (scale, prefix) = PREFIXES
        .iter()
        .find(|(scale, _)| magnitude >= *scale)
        .copied()
        .unwrap_or((1e-15, "f"));
    let scaled = value / scale;
    let text = format!("{scaled:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text}{prefix}{unit}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub nodes: Vec<String>,
    pub value: ComponentValue,
}

impl Component {
    /// SPICE-style reference designator, e.g. `R3`.
    pub fn designator(&self) -> String {
        format!("{}{}", self.kind.letter(), self.id)
    }

    /// Human-readable value, used for schematic labels.
    pub fn value_label(&self) -> String {
        match (&self.value, self.kind.spec().unit) {
            (ComponentValue::Scalar(v), Some(unit)) => format_si(*v, unit),
            (ComponentValue::Scalar(v), None) => format_si(*v, ""),
            (ComponentValue::Parameters(p), _) => {
                if let Some(label) = ["device", "uvx_type", "model", "type"]
                    .iter()
                    .find_map(|key| p.get(*key).and_then(ParamValue::as_str))
                {
                    label.to_string()
                } else {
                    String::new()
                }
            }
        }
    }
}

/// A component as requested by a caller, before the circuit assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub nodes: Vec<String>,
    #[serde(default)]
    pub value: ComponentValue,
}

impl ComponentSpec {
    pub fn new(
        kind: impl Into<String>,
        nodes: impl IntoIterator<Item = impl Into<String>>,
        value: impl Into<ComponentValue>,
    ) -> Self {
        Self {
            kind: kind.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }
}

pub type ComponentMap = BTreeMap<ComponentId, Component>;

/// What produced a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    Created,
    Added { id: ComponentId },
    Removed { id: ComponentId },
    Updated { id: ComponentId },
    RolledBack { to: usize },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Created => write!(f, "created"),
            Change::Added { id } => write!(f, "added component {id}"),
            Change::Removed { id } => write!(f, "removed component {id}"),
            Change::Updated { id } => write!(f, "updated component {id}"),
            Change::RolledBack { to } => write!(f, "rolled back to version {to}"),
        }
    }
}

/// One immutable entry of the version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub version: usize,
    pub change: Change,
    #[serde(with = "component_list")]
    pub components: Arc<ComponentMap>,
}

/// Serialize a component map as the list of its components; ids live on the components.
mod component_list {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &Arc<ComponentMap>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Arc<ComponentMap>, D::Error> {
        let list = Vec::<Component>::deserialize(d)?;
        Ok(Arc::new(list.into_iter().map(|c| (c.id, c)).collect()))
    }
}

/// Stable wire shape of a circuit: `{circuit_id, name, version, components}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub circuit_id: CircuitId,
    pub name: String,
    pub version: usize,
    pub components: Vec<Component>,
}

/// Read-only view of a circuit at one version. Holds its own reference to the
/// component map, so later mutations of the circuit never show through.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub circuit_id: CircuitId,
    pub name: String,
    pub version: usize,
    components: Arc<ComponentMap>,
}

impl Snapshot {
    /// Components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn nodes(&self) -> BTreeSet<String> {
        collect_nodes(&self.components)
    }

    pub fn component_map(&self) -> &ComponentMap {
        &self.components
    }

    pub fn state(&self) -> CircuitState {
        CircuitState {
            circuit_id: self.circuit_id,
            name: self.name.clone(),
            version: self.version,
            components: self.components.values().cloned().collect(),
        }
    }
}

fn collect_nodes(components: &ComponentMap) -> BTreeSet<String> {
    components
        .values()
        .flat_map(|c| c.nodes.iter().cloned())
        .collect()
}

/// A circuit: a mutable set of components plus an append-only version history.
///
/// Every successful mutation appends exactly one [`Revision`]; version 0 is the
/// empty circuit. Failed operations validate before touching any state, so they
/// leave both the components and the history as they were.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCircuit")]
pub struct Circuit {
    #[serde(rename = "circuit_id")]
    id: CircuitId,
    name: String,
    next_component_id: u32,
    history: Vec<Revision>,
    #[serde(skip)]
    current: Arc<ComponentMap>,
}

impl Circuit {
    pub fn new(id: CircuitId, name: impl Into<String>) -> Self {
        let current = Arc::new(ComponentMap::new());
        Self {
            id,
            name: name.into(),
            next_component_id: 1,
            history: vec![Revision {
                version: 0,
                change: Change::Created,
                components: Arc::clone(&current),
            }],
            current,
        }
    }

    pub fn id(&self) -> CircuitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renaming is not a versioned mutation.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn current_version(&self) -> usize {
        self.history.len() - 1
    }

    pub fn history(&self) -> &[Revision] {
        &self.history
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.current.get(&id)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        nodes: impl IntoIterator<Item = impl Into<String>>,
        value: impl Into<ComponentValue>,
    ) -> Result<Component> {
        let nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        let value = value.into();
        kind.spec().check(&nodes, &value)?;
        self.check_label_case(kind, &nodes)?;

        let component = Component {
            id: ComponentId(self.next_component_id),
            kind,
            nodes,
            value,
        };
        self.next_component_id += 1;

        let mut components = ComponentMap::clone(&self.current);
        components.insert(component.id, component.clone());
        self.commit(Change::Added { id: component.id }, components);
        debug!(
            "circuit {}: added {} {:?} (v{})",
            self.id,
            component.designator(),
            component.nodes,
            self.current_version()
        );
        Ok(component)
    }

    /// Add a component described by a loosely typed request; the kind token
    /// goes through the registry.
    pub fn add_spec(&mut self, spec: &ComponentSpec) -> Result<Component> {
        let kind: ComponentKind = spec.kind.parse()?;
        self.add_component(kind, spec.nodes.iter().cloned(), spec.value.clone())
    }

    /// Remove a component. Other components sharing its node labels are left
    /// untouched; connectivity is purely by label.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        if !self.current.contains_key(&id) {
            return Err(CircuitError::ComponentNotFound(id));
        }
        let mut components = ComponentMap::clone(&self.current);
        components.remove(&id);
        self.commit(Change::Removed { id }, components);
        debug!(
            "circuit {}: removed component {id} (v{})",
            self.id,
            self.current_version()
        );
        Ok(())
    }

    /// Replace a component's value. Kind and nodes are fixed at creation.
    pub fn update_component(
        &mut self,
        id: ComponentId,
        value: impl Into<ComponentValue>,
    ) -> Result<Component> {
        let existing = self
            .current
            .get(&id)
            .ok_or(CircuitError::ComponentNotFound(id))?;
        let value = value.into();
        existing.kind.spec().check_value(&value)?;

        let updated = Component {
            value,
            ..existing.clone()
        };
        let mut components = ComponentMap::clone(&self.current);
        components.insert(id, updated.clone());
        self.commit(Change::Updated { id }, components);
        debug!(
            "circuit {}: updated {} (v{})",
            self.id,
            updated.designator(),
            self.current_version()
        );
        Ok(updated)
    }

    pub fn get_version(&self, version: usize) -> Result<Arc<ComponentMap>> {
        self.history
            .get(version)
            .map(|rev| Arc::clone(&rev.components))
            .ok_or(CircuitError::VersionNotFound {
                requested: version,
                current: self.current_version(),
            })
    }

    /// Restore the components of an earlier version. The restore is itself
    /// appended as a new version; no history is discarded and the id counter
    /// keeps counting forward.
    pub fn rollback(&mut self, version: usize) -> Result<Snapshot> {
        let components = self.get_version(version)?;
        self.history.push(Revision {
            version: self.history.len(),
            change: Change::RolledBack { to: version },
            components: Arc::clone(&components),
        });
        self.current = components;
        debug!(
            "circuit {}: rolled back to v{version} (v{})",
            self.id,
            self.current_version()
        );
        Ok(self.snapshot())
    }

    /// Distinct node labels referenced by any component.
    pub fn list_nodes(&self) -> BTreeSet<String> {
        collect_nodes(&self.current)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            circuit_id: self.id,
            name: self.name.clone(),
            version: self.current_version(),
            components: Arc::clone(&self.current),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state()
    }

    /// SPICE folds node names to lower case, so two labels that differ only
    /// by case would silently become one node.
    fn check_label_case(&self, kind: ComponentKind, nodes: &[String]) -> Result<()> {
        let mut known: Vec<&str> = self
            .current
            .values()
            .flat_map(|c| c.nodes.iter().map(String::as_str))
            .collect();
        for node in nodes {
            if is_ground(node) {
                continue;
            }
            if let Some(existing) = known
                .iter()
                .find(|k| k.eq_ignore_ascii_case(node) && **k != node.as_str())
            {
                return Err(CircuitError::invalid(
                    kind,
                    format!("node label '{node}' clashes with '{existing}' (labels are not case-sensitive in SPICE)"),
                ));
            }
            known.push(node);
        }
        Ok(())
    }

    fn commit(&mut self, change: Change, components: ComponentMap) {
        let components = Arc::new(components);
        self.history.push(Revision {
            version: self.history.len(),
            change,
            components: Arc::clone(&components),
        });
        self.current = components;
    }
}

/// Persisted form of a [`Circuit`], checked before it becomes one.
#[derive(Deserialize)]
struct RawCircuit {
    circuit_id: CircuitId,
    name: String,
    next_component_id: u32,
    history: Vec<Revision>,
}

impl TryFrom<RawCircuit> for Circuit {
    type Error = CircuitError;

    fn try_from(raw: RawCircuit) -> Result<Self> {
        let id = raw.circuit_id;
        let corrupt = |msg: String| CircuitError::CorruptStore(format!("circuit {id}: {msg}"));

        let Some(last) = raw.history.last() else {
            return Err(corrupt("empty history".to_string()));
        };
        for (index, rev) in raw.history.iter().enumerate() {
            if rev.version != index {
                return Err(corrupt(format!(
                    "revision {index} is labelled version {}",
                    rev.version
                )));
            }
            for (id, component) in rev.components.iter() {
                if id.0 >= raw.next_component_id {
                    return Err(corrupt(format!(
                        "component {id} was never allocated (next id is {})",
                        raw.next_component_id
                    )));
                }
                component
                    .kind
                    .spec()
                    .check(&component.nodes, &component.value)
                    .map_err(|e| corrupt(format!("version {index}: {e}")))?;
            }
        }
        if let Some(first) = raw.history.first() {
            if first.change != Change::Created || !first.components.is_empty() {
                return Err(corrupt("version 0 is not the empty circuit".to_string()));
            }
        }

        let current = Arc::clone(&last.components);
        Ok(Circuit {
            id: raw.circuit_id,
            name: raw.name,
            next_component_id: raw.next_component_id,
            history: raw.history,
            current,
        })
    }
}
