//! Non-fatal conditions reported alongside inference results.

use serde::{Deserialize, Serialize};

/// A recoverable problem noticed during inference or fitting.
///
/// Warnings never abort a run. They are logged through `tracing` when
/// raised and returned with the result so callers can surface them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Every state assigned zero likelihood to the observation at
    /// `timestep`; the step was scored with a floored log-likelihood.
    NumericalInstability { timestep: usize },

    /// The EM objective went down between two iterations.
    DivergentLikelihood {
        iteration: usize,
        previous: f64,
        current: f64,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::NumericalInstability { timestep } => {
                write!(f, "zero likelihood under every state at timestep {}", timestep)
            }
            Warning::DivergentLikelihood {
                iteration,
                previous,
                current,
            } => write!(
                f,
                "objective decreased at iteration {}: {:.6} -> {:.6}",
                iteration, previous, current
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_serializes_with_kind_tag() {
        let w = Warning::NumericalInstability { timestep: 3 };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "numerical_instability");
        assert_eq!(json["timestep"], 3);
    }

    #[test]
    fn warning_display() {
        let w = Warning::DivergentLikelihood {
            iteration: 4,
            previous: -10.0,
            current: -10.5,
        };
        assert!(w.to_string().contains("iteration 4"));
    }
}
