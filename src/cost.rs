//! Cost function types.

use crate::error::{Error, Result};

use serde_derive::{Deserialize, Serialize};

/// [Loss function](https://en.wikipedia.org/wiki/Loss_function) types
/// used to seed the error of an output layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    /// Half the squared difference.
    Quadratic,
    /// Binary cross-entropy. Only defined for activations strictly inside
    /// `(0, 1)`, so it must be paired with a bounded output activator.
    CrossEntropy,
}

impl Cost {
    /// Evaluates the cost of a single `activation` against its `target`.
    pub fn f(&self, activation: f64, target: f64) -> Result<f64> {
        match *self {
            Cost::Quadratic => {
                let diff = activation - target;
                Ok(0.5 * diff * diff)
            }
            Cost::CrossEntropy => {
                check_cross_entropy(activation, target)?;
                Ok(-(target * activation.ln()
                    + (1.0 - target) * (1.0 - activation).ln()))
            }
        }
    }

    /// Evaluates the derivative of the cost with respect to `activation`.
    pub fn df(&self, activation: f64, target: f64) -> Result<f64> {
        match *self {
            Cost::Quadratic => Ok(activation - target),
            Cost::CrossEntropy => {
                check_cross_entropy(activation, target)?;
                Ok((1.0 - target) / (1.0 - activation) - target / activation)
            }
        }
    }
}

fn check_cross_entropy(activation: f64, target: f64) -> Result<()> {
    if !(activation > 0.0 && activation < 1.0) {
        return Err(Error::CrossEntropyActivation(activation));
    }
    if !(0.0..=1.0).contains(&target) {
        return Err(Error::CrossEntropyTarget(target));
    }
    Ok(())
}
