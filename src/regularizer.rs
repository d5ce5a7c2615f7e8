//! Weight regularization types.

use serde_derive::{Deserialize, Serialize};

/// [Regularization](https://en.wikipedia.org/wiki/Regularization_(mathematics))
/// penalties applied to weights during correction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularizer {
    /// No penalty.
    Null,
    /// Lasso penalty, `param * |w|`.
    L1,
    /// Ridge penalty, `param * w^2 / 2`.
    L2,
}

impl Default for Regularizer {
    fn default() -> Self {
        Regularizer::Null
    }
}

impl Regularizer {
    /// Evaluates the derivative of the penalty at `weight`.
    pub fn df(&self, param: f64, weight: f64) -> f64 {
        match *self {
            Regularizer::Null => 0.0,
            Regularizer::L1 => {
                if weight > 0.0 {
                    param
                } else if weight < 0.0 {
                    -param
                } else {
                    0.0
                }
            }
            Regularizer::L2 => param * weight,
        }
    }
}
