//! Simulation of circuit snapshots: netlist generation, readiness checks and
//! pluggable solvers.

pub mod analysis;
pub mod error;
pub mod netlist;
pub mod readiness;
pub mod result;
pub mod solver;

use circuit_core::Snapshot;
use log::{debug, info};

pub use analysis::{AcSweep, AnalysisRequest, DcSweep, Transient, Variation, MAX_SWEEP_POINTS};
pub use error::{SimulationError, Underconstrained};
pub use netlist::{Element, Netlist, NetlistElement};
pub use readiness::check_ready;
pub use result::{Phasors, SimulationResult, Sweep};
pub use solver::{LinearSolver, NgspiceSolver, Solver};

/// Run `request` against a snapshot.
///
/// The request and the circuit are validated before the solver is invoked;
/// an underconstrained circuit never reaches it. Results come back with the
/// circuit's own node labels and designators.
pub fn simulate(
    snapshot: &Snapshot,
    request: &AnalysisRequest,
    solver: &dyn Solver,
) -> Result<SimulationResult, SimulationError> {
    request.validate()?;
    check_ready(snapshot)?;
    let netlist = Netlist::from_snapshot(snapshot)?;
    netlist.check_request(request)?;

    info!(
        "Simulating circuit {} v{} ({}) with {}",
        snapshot.circuit_id,
        snapshot.version,
        request.name(),
        solver.name()
    );
    debug!("netlist:\n{}", netlist.to_spice());

    let raw = solver
        .solve(&netlist, request)
        .map_err(|e| SimulationError::Engine {
            solver: solver.name().to_string(),
            message: format!("{e:#}"),
        })?;
    Ok(raw.normalize(&netlist))
}
