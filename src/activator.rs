//! Activation function types.

use serde_derive::{Deserialize, Serialize};

/// Sums at or above this value are not evaluated directly by `Logistic`.
const LOGISTIC_POS_BOUNDARY: f64 = 36.0;
/// Sums at or below this value are not evaluated directly by `Logistic`.
const LOGISTIC_NEG_BOUNDARY: f64 = -99.0;

/// Slope used by `Activator::leaky_relu` below zero.
pub const DEFAULT_LEAKY_SLOPE: f64 = 0.01;

/// [Activation function](https://en.wikipedia.org/wiki/Activation_function)
/// types.
///
/// Activators are stateless: any two equal values are interchangeable.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activator {
    /// Passes the sum through unchanged.
    Identity,
    /// Rectified Linear Unit
    #[serde(rename = "relu")]
    ReLU,
    /// Leaky Rectified Linear Unit
    ///
    /// Takes the slope to use for negative inputs.
    #[serde(rename = "leaky_relu")]
    LeakyReLU(f64),
    /// Logistic sigmoid, clamped at fixed boundaries so `e^-x` never
    /// overflows.
    Logistic,
    /// `x / (1 + |x|)`
    Softsign,
    /// Hyperbolic tan function
    #[serde(rename = "tanh")]
    TanH,
}

impl Activator {
    /// A leaky ReLU with the conventional `0.01` slope.
    pub fn leaky_relu() -> Self {
        Activator::LeakyReLU(DEFAULT_LEAKY_SLOPE)
    }

    /// Evaluates `f(sum)` for the selected activation function.
    pub fn f(&self, sum: f64) -> f64 {
        match *self {
            Activator::Identity => sum,
            Activator::ReLU => if sum < 0.0 { 0.0 } else { sum },
            Activator::LeakyReLU(slope) => {
                if sum < 0.0 { slope * sum } else { sum }
            }
            Activator::Logistic => {
                if sum >= LOGISTIC_POS_BOUNDARY {
                    logistic(LOGISTIC_POS_BOUNDARY)
                } else if sum <= LOGISTIC_NEG_BOUNDARY {
                    logistic(LOGISTIC_NEG_BOUNDARY)
                } else {
                    logistic(sum)
                }
            }
            Activator::Softsign => sum / (1.0 + sum.abs()),
            Activator::TanH => sum.tanh(),
        }
    }

    /// Evaluates the derivative `f'(sum)`.
    ///
    /// Note that this takes the *input* sum, not the activated output.
    pub fn df(&self, sum: f64) -> f64 {
        match *self {
            Activator::Identity => 1.0,
            Activator::ReLU => if sum < 0.0 { 0.0 } else { 1.0 },
            Activator::LeakyReLU(slope) => if sum < 0.0 { slope } else { 1.0 },
            Activator::Logistic => {
                let y = self.f(sum);
                y * (1.0 - y)
            }
            Activator::Softsign => {
                let d = 1.0 + sum.abs();
                1.0 / (d * d)
            }
            Activator::TanH => {
                let y = sum.tanh();
                1.0 - y * y
            }
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [Activator; 6] = [
        Activator::Identity,
        Activator::ReLU,
        Activator::LeakyReLU(DEFAULT_LEAKY_SLOPE),
        Activator::Logistic,
        Activator::Softsign,
        Activator::TanH,
    ];

    #[test]
    fn relu_family() {
        assert_eq!(Activator::ReLU.f(-2.0), 0.0);
        assert_eq!(Activator::ReLU.f(1.1), 1.1);
        assert_eq!(Activator::ReLU.df(1.1), 1.0);
        assert_eq!(Activator::ReLU.df(-1.1), 0.0);
        assert_relative_eq!(Activator::leaky_relu().f(-2.0), -0.02);
        assert_relative_eq!(Activator::leaky_relu().df(-2.0), 0.01);
        assert_eq!(Activator::leaky_relu().df(3.0), 1.0);
    }

    #[test]
    fn logistic_midpoint() {
        assert_relative_eq!(Activator::Logistic.f(0.0), 0.5);
        assert_relative_eq!(Activator::Logistic.df(0.0), 0.25);
    }

    #[test]
    fn logistic_clamps_far_inputs() {
        let high = Activator::Logistic.f(1000.0);
        let low = Activator::Logistic.f(-1000.0);
        assert!(high.is_finite() && low.is_finite());
        assert_eq!(high, logistic(LOGISTIC_POS_BOUNDARY));
        assert_eq!(low, logistic(LOGISTIC_NEG_BOUNDARY));
        assert_eq!(Activator::Logistic.f(36.0), high);
        assert!(low > 0.0);
        assert!(Activator::Logistic.df(1000.0).is_finite());
        assert!(Activator::Logistic.df(-1000.0).is_finite());
    }

    #[test]
    fn softsign_and_tanh() {
        assert_relative_eq!(Activator::Softsign.f(1.0), 0.5);
        assert_relative_eq!(Activator::Softsign.df(-1.0), 0.25);
        assert_relative_eq!(Activator::TanH.f(0.5), 0.5f64.tanh());
        assert_relative_eq!(Activator::TanH.df(0.0), 1.0);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1e-6;
        for activator in ALL.iter() {
            for &x in &[-2.5, -0.7, 0.3, 1.9] {
                let numeric =
                    (activator.f(x + h) - activator.f(x - h)) / (2.0 * h);
                assert_relative_eq!(
                    activator.df(x),
                    numeric,
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn serde_names() {
        let parsed: Activator = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(parsed, Activator::ReLU);
        let parsed: Activator =
            serde_json::from_str("{\"leaky_relu\": 0.2}").unwrap();
        assert_eq!(parsed, Activator::LeakyReLU(0.2));
    }
}
