use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SimulationError;

/// What to compute. Serialized as `{"kind": ..., "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parameters", rename_all = "snake_case")]
pub enum AnalysisRequest {
    OperatingPoint,
    DcSweep(DcSweep),
    AcSweep(AcSweep),
    Transient(Transient),
}

/// Most points a DC sweep may produce.
pub const MAX_SWEEP_POINTS: usize = 100_000;

/// Sweep the DC value of one independent source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcSweep {
    /// Designator of the swept source, e.g. `V1`.
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl DcSweep {
    /// Number of sweep points, or `None` when `step` never walks from `start`
    /// to `stop` within [`MAX_SWEEP_POINTS`].
    pub fn point_count(&self) -> Option<usize> {
        let span = (self.stop - self.start) / self.step;
        if !span.is_finite() || span < 0.0 {
            return None;
        }
        let count = (span + 1e-9).floor() + 1.0;
        (count <= MAX_SWEEP_POINTS as f64).then_some(count as usize)
    }

    /// Sweep points, `start` and (within rounding) `stop` included. Empty
    /// when [`DcSweep::point_count`] rejects the sweep.
    pub fn points(&self) -> Vec<f64> {
        let count = self.point_count().unwrap_or(0);
        (0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variation {
    #[default]
    Dec,
    Oct,
    Lin,
}

impl Variation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variation::Dec => "dec",
            Variation::Oct => "oct",
            Variation::Lin => "lin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcSweep {
    #[serde(default = "default_start_frequency")]
    pub start_frequency: f64,
    #[serde(default = "default_stop_frequency")]
    pub stop_frequency: f64,
    /// Points per decade/octave, or in total for a linear sweep.
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub variation: Variation,
}

impl Default for AcSweep {
    fn default() -> Self {
        Self {
            start_frequency: default_start_frequency(),
            stop_frequency: default_stop_frequency(),
            points: default_points(),
            variation: Variation::default(),
        }
    }
}

fn default_start_frequency() -> f64 {
    1.0
}

fn default_stop_frequency() -> f64 {
    1e6
}

fn default_points() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transient {
    pub step_time: f64,
    pub end_time: f64,
}

impl AnalysisRequest {
    /// Build a request from a loosely typed kind token and parameter object,
    /// as a dispatch layer receives them. Accepts the SPICE short names
    /// (`op`, `dc`, `ac`, `tran`) as well.
    pub fn from_parameters(kind: &str, parameters: &Map<String, Value>) -> Result<Self, SimulationError> {
        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            "op" | "operating_point" => "operating_point",
            "dc" | "dc_sweep" => "dc_sweep",
            "ac" | "ac_sweep" => "ac_sweep",
            "tran" | "transient" => "transient",
            other => {
                return Err(SimulationError::InvalidAnalysis(format!(
                    "unsupported analysis type '{other}'"
                )))
            }
        };
        let document = if kind == "operating_point" {
            serde_json::json!({ "kind": kind })
        } else {
            serde_json::json!({ "kind": kind, "parameters": parameters })
        };
        let request: AnalysisRequest = serde_json::from_value(document)
            .map_err(|e| SimulationError::InvalidAnalysis(format!("{kind}: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisRequest::OperatingPoint => "operating_point",
            AnalysisRequest::DcSweep(_) => "dc_sweep",
            AnalysisRequest::AcSweep(_) => "ac_sweep",
            AnalysisRequest::Transient(_) => "transient",
        }
    }

    /// Reject parameter combinations no solver could run.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |msg: String| Err(SimulationError::InvalidAnalysis(msg));
        match self {
            AnalysisRequest::OperatingPoint => Ok(()),
            AnalysisRequest::DcSweep(dc) => {
                if [dc.start, dc.stop, dc.step].iter().any(|v| !v.is_finite()) {
                    return invalid("dc sweep bounds must be finite".into());
                }
                if dc.step == 0.0 || (dc.stop - dc.start) / dc.step < 0.0 {
                    return invalid(format!(
                        "dc sweep step {} never reaches {} from {}",
                        dc.step, dc.stop, dc.start
                    ));
                }
                if dc.point_count().is_none() {
                    return invalid(format!(
                        "dc sweep from {} to {} in steps of {} exceeds {MAX_SWEEP_POINTS} points",
                        dc.start, dc.stop, dc.step
                    ));
                }
                Ok(())
            }
            AnalysisRequest::AcSweep(ac) => {
                if !(ac.start_frequency > 0.0 && ac.stop_frequency >= ac.start_frequency) {
                    return invalid(format!(
                        "ac sweep needs 0 < start_frequency <= stop_frequency, got {} and {}",
                        ac.start_frequency, ac.stop_frequency
                    ));
                }
                if ac.points == 0 {
                    return invalid("ac sweep needs at least one point".into());
                }
                Ok(())
            }
            AnalysisRequest::Transient(tran) => {
                if !(tran.step_time > 0.0 && tran.end_time > tran.step_time) {
                    return invalid(format!(
                        "transient needs 0 < step_time < end_time, got {} and {}",
                        tran.step_time, tran.end_time
                    ));
                }
                Ok(())
            }
        }
    }
}
