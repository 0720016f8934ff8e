use dcsa_core::{DenseSolverKind, GridError, GridResult};
use serde::{Deserialize, Serialize};

/// Parameters of a DC load flow and of the contingency engine built on it.
///
/// ```
/// use dcsa_algo::dc::DcLoadFlowParameters;
///
/// let params = DcLoadFlowParameters::from_json(r#"{ "use_transformer_ratio": false }"#).unwrap();
/// assert!(!params.use_transformer_ratio);
/// assert_eq!(params.low_impedance_threshold, 1e-8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcLoadFlowParameters {
    /// Scale branch power factors by the tap ratio
    pub use_transformer_ratio: bool,
    /// Expose phase-shifter taps as solver variables instead of constants
    pub phase_shifter_tap_as_variable: bool,
    /// Branches with |x| below this are zero-impedance
    pub low_impedance_threshold: f64,
    /// ε of the `1 − ε` connectivity-loss sensitivity screen
    pub connectivity_loss_threshold: f64,
    /// Upper bound on the dense states matrix size, in bytes
    pub max_states_matrix_bytes: usize,
    /// Backend for the per-scenario transfer-factor systems
    pub dense_solver: DenseSolverKind,
}

impl Default for DcLoadFlowParameters {
    fn default() -> Self {
        Self {
            use_transformer_ratio: true,
            phase_shifter_tap_as_variable: false,
            low_impedance_threshold: 1e-8,
            connectivity_loss_threshold: 1e-6,
            max_states_matrix_bytes: isize::MAX as usize,
            dense_solver: DenseSolverKind::default(),
        }
    }
}

impl DcLoadFlowParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(input: &str) -> GridResult<Self> {
        let params: Self = serde_json::from_str(input)?;
        params.validate()?;
        Ok(params)
    }

    pub fn with_transformer_ratio(mut self, enabled: bool) -> Self {
        self.use_transformer_ratio = enabled;
        self
    }

    pub fn with_phase_shifter_tap_as_variable(mut self, enabled: bool) -> Self {
        self.phase_shifter_tap_as_variable = enabled;
        self
    }

    pub fn with_low_impedance_threshold(mut self, threshold: f64) -> Self {
        self.low_impedance_threshold = threshold;
        self
    }

    pub fn with_connectivity_loss_threshold(mut self, epsilon: f64) -> Self {
        self.connectivity_loss_threshold = epsilon;
        self
    }

    pub fn with_max_states_matrix_bytes(mut self, bytes: usize) -> Self {
        self.max_states_matrix_bytes = bytes;
        self
    }

    pub fn with_dense_solver(mut self, kind: DenseSolverKind) -> Self {
        self.dense_solver = kind;
        self
    }

    pub fn validate(&self) -> GridResult<()> {
        if !(self.low_impedance_threshold.is_finite() && self.low_impedance_threshold >= 0.0) {
            return Err(GridError::Config(format!(
                "low_impedance_threshold must be a non-negative number, got {}",
                self.low_impedance_threshold
            )));
        }
        if !(self.connectivity_loss_threshold > 0.0 && self.connectivity_loss_threshold < 1.0) {
            return Err(GridError::Config(format!(
                "connectivity_loss_threshold must be in (0, 1), got {}",
                self.connectivity_loss_threshold
            )));
        }
        Ok(())
    }
}
