use monorange_core::Real;
use serde::{Deserialize, Serialize};

/// Robust loss kernels for iteratively re-weighted least squares (IRLS).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustKernel {
    /// Plain L2.
    #[default]
    None,
    /// Quadratic up to `delta` pixels, linear beyond.
    Huber { delta: Real },
    /// `c^2 * ln(1 + r^2 / c^2)`.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// IRLS weight `w(r)` for a residual of magnitude `r`.
    pub fn weight(self, r: Real) -> Real {
        let r = r.abs();
        match self {
            RobustKernel::None => 1.0,
            RobustKernel::Huber { delta } => {
                if r <= delta {
                    1.0
                } else {
                    delta / r
                }
            }
            RobustKernel::Cauchy { c } => 1.0 / (1.0 + (r * r) / (c * c)),
        }
    }
}
