//! Pluggable circuit solvers.
//!
//! A [`Solver`] receives a [`Netlist`] that already passed readiness checks
//! and returns raw results. Names in those results may use the solver's own
//! spelling (`v(out)`, `v1#branch`); [`crate::simulate`] normalizes them.

mod linear;
mod ngspice;

pub use linear::LinearSolver;
pub use ngspice::NgspiceSolver;

use crate::analysis::AnalysisRequest;
use crate::netlist::Netlist;
use crate::result::SimulationResult;

pub trait Solver {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    fn solve(&self, netlist: &Netlist, request: &AnalysisRequest) -> anyhow::Result<SimulationResult>;
}

impl<S: Solver + ?Sized> Solver for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, netlist: &Netlist, request: &AnalysisRequest) -> anyhow::Result<SimulationResult> {
        (**self).solve(netlist, request)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, netlist: &Netlist, request: &AnalysisRequest) -> anyhow::Result<SimulationResult> {
        (**self).solve(netlist, request)
    }
}
