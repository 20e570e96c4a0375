use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::model::{Circuit, CircuitId, ComponentSpec};

/// Shared handle to one circuit. The mutex is the serialization scope for
/// mutations of that circuit; distinct circuits never contend.
pub type CircuitHandle = Arc<Mutex<Circuit>>;

/// Lock a circuit handle. A panic in another holder does not corrupt the
/// circuit (mutations are all-or-nothing), so poisoning is ignored.
pub fn lock_circuit(handle: &CircuitHandle) -> MutexGuard<'_, Circuit> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSummary {
    pub circuit_id: CircuitId,
    pub name: String,
    pub version: usize,
    pub components: usize,
}

/// Registry of live circuits keyed by id. Owned by whoever dispatches
/// requests; nothing in this crate keeps a global instance.
#[derive(Debug)]
pub struct CircuitDirectory {
    circuits: BTreeMap<CircuitId, CircuitHandle>,
    next_id: u32,
}

impl Default for CircuitDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitDirectory {
    pub fn new() -> Self {
        Self {
            circuits: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> CircuitId {
        let id = CircuitId(self.next_id);
        self.next_id += 1;
        id
    }

    fn default_name(id: CircuitId) -> String {
        format!("Circuit {id}")
    }

    /// Create an empty circuit at version 0.
    pub fn create_circuit(&mut self, name: Option<&str>) -> CircuitId {
        let id = self.allocate_id();
        let name = name.map(str::to_string).unwrap_or_else(|| Self::default_name(id));
        debug!("created circuit {id} ({name})");
        self.circuits
            .insert(id, Arc::new(Mutex::new(Circuit::new(id, name))));
        id
    }

    /// Create a circuit and add `components` one by one (one version each).
    /// If any component is rejected nothing is registered and the id is not consumed.
    pub fn create_circuit_with(
        &mut self,
        name: Option<&str>,
        components: &[ComponentSpec],
    ) -> Result<CircuitId> {
        let id = CircuitId(self.next_id);
        let name = name.map(str::to_string).unwrap_or_else(|| Self::default_name(id));
        let mut circuit = Circuit::new(id, name);
        for spec in components {
            circuit.add_spec(spec)?;
        }
        self.allocate_id();
        debug!(
            "created circuit {id} ({}) with {} components",
            circuit.name(),
            circuit.len()
        );
        self.circuits.insert(id, Arc::new(Mutex::new(circuit)));
        Ok(id)
    }

    pub fn get_circuit(&self, id: CircuitId) -> Result<CircuitHandle> {
        self.circuits
            .get(&id)
            .cloned()
            .ok_or(CircuitError::CircuitNotFound(id))
    }

    /// Run `f` against a circuit while holding its lock.
    pub fn with_circuit<T>(
        &self,
        id: CircuitId,
        f: impl FnOnce(&mut Circuit) -> Result<T>,
    ) -> Result<T> {
        let handle = self.get_circuit(id)?;
        let mut circuit = lock_circuit(&handle);
        f(&mut circuit)
    }

    pub fn delete_circuit(&mut self, id: CircuitId) -> Result<()> {
        self.circuits
            .remove(&id)
            .map(|_| debug!("deleted circuit {id}"))
            .ok_or(CircuitError::CircuitNotFound(id))
    }

    pub fn list_circuits(&self) -> Vec<CircuitSummary> {
        self.circuits
            .values()
            .map(|handle| {
                let circuit = lock_circuit(handle);
                CircuitSummary {
                    circuit_id: circuit.id(),
                    name: circuit.name().to_string(),
                    version: circuit.current_version(),
                    components: circuit.len(),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Write every circuit, including its full history, as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = StoreDocument {
            next_id: self.next_id,
            circuits: self
                .circuits
                .values()
                .map(|handle| lock_circuit(handle).clone())
                .collect(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)?;
        info!(
            "saved {} circuits to {}",
            document.circuits.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a directory written by [`CircuitDirectory::save`]. A missing file
    /// yields an empty directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no circuit store at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let document: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            CircuitError::CorruptStore(format!("failed to parse {}: {e}", path.display()))
        })?;

        let mut circuits = BTreeMap::new();
        for circuit in document.circuits {
            let id = circuit.id();
            if id.0 >= document.next_id {
                return Err(CircuitError::CorruptStore(format!(
                    "circuit {id} was never allocated (next id is {})",
                    document.next_id
                )));
            }
            if circuits
                .insert(id, Arc::new(Mutex::new(circuit)))
                .is_some()
            {
                return Err(CircuitError::CorruptStore(format!(
                    "duplicate circuit id {id}"
                )));
            }
        }
        info!("loaded {} circuits from {}", circuits.len(), path.display());
        Ok(Self {
            circuits,
            next_id: document.next_id,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct StoreDocument {
    next_id: u32,
    circuits: Vec<Circuit>,
}
