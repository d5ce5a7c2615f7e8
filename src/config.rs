//! JSON configuration for building and training networks.
//!
//! A configuration file describes the network topology and the training
//! hyperparameters:
//!
//! ```json
//! {
//!   "network": {
//!     "seed": 42,
//!     "input": { "channels": 1, "positions": 8 },
//!     "layers": [
//!       { "channels": 4, "activation": "relu", "receptive_field": [0, 1, 2, 3], "stride": 2 },
//!       { "channels": 1, "activation": "logistic" }
//!     ]
//!   },
//!   "training": {
//!     "learning_rate": 0.1,
//!     "batch_size": 4,
//!     "cost": "cross_entropy",
//!     "regularizer": "l2",
//!     "regularization_param": 0.001,
//!     "epochs": 200
//!   }
//! }
//! ```
//!
//! A layer without a `receptive_field` is fully connected and has one
//! position per channel unless `positions` says otherwise.

use crate::activator::Activator;
use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::layers::KernelShape;
use crate::node::Shape;
use crate::regularizer::Regularizer;

use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub training: TrainingConfig,
}

/// Topology of a network: the raw input shape and every layer after it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Seed for weight initialization.
    #[serde(default)]
    pub seed: u64,
    pub input: Shape,
    pub layers: Vec<LayerConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub channels: usize,
    pub activation: Activator,
    /// Offsets read at each stride; the whole input when absent.
    pub receptive_field: Option<Vec<usize>>,
    /// Defaults to 1.
    pub stride: Option<usize>,
    /// Defaults to every in-bounds stride.
    pub positions: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    /// Examples per correction; one when absent.
    pub batch_size: Option<usize>,
    #[serde(default = "default_cost")]
    pub cost: Cost,
    #[serde(default)]
    pub regularizer: Regularizer,
    #[serde(default)]
    pub regularization_param: f64,
    /// Stop after this many epochs.
    pub epochs: Option<usize>,
    /// Stop once the mean cost per example drops below this.
    pub error_threshold: Option<f64>,
    /// Log progress every this many epochs.
    pub log_every: Option<usize>,
}

fn default_cost() -> Cost {
    Cost::Quadratic
}

impl LayerConfig {
    /// Kernel geometry of this layer over an `input`-shaped predecessor.
    pub fn kernel_shape(&self, input: Shape) -> KernelShape {
        match self.receptive_field {
            Some(ref field) => KernelShape::new(
                input.channels,
                field.clone(),
                self.stride.unwrap_or(1),
            ),
            None => KernelShape::full(input.channels, input.positions),
        }
    }

    /// Node grid shape of this layer over an `input`-shaped predecessor.
    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let positions = match self.positions {
            Some(positions) => positions,
            None => self
                .kernel_shape(input)
                .output_positions(input.positions)
                .ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "receptive field does not fit an input of {} positions",
                        input.positions
                    ))
                })?,
        };
        Ok(Shape::new(self.channels, positions))
    }

    fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidConfig(format!("layer #{}: {}", index, reason)))
        };
        if self.channels == 0 {
            return invalid("channels must be greater than zero");
        }
        if self.positions == Some(0) {
            return invalid("positions must be greater than zero");
        }
        if self.stride == Some(0) {
            return invalid("stride must be greater than zero");
        }
        if let Some(ref field) = self.receptive_field {
            if field.is_empty() {
                return invalid("receptive_field must not be empty");
            }
        } else if self.stride.is_some() {
            return invalid("stride requires a receptive_field");
        }
        if let Activator::LeakyReLU(slope) = self.activation {
            if !slope.is_finite() || slope < 0.0 {
                return invalid("leaky_relu slope must be non-negative");
            }
        }
        Ok(())
    }
}

impl NetworkConfig {
    /// Checks every layer, including that each receptive field fits the
    /// layer before it.
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() {
            return Err(Error::InvalidConfig(
                "input must have at least one channel and position".into(),
            ));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network needs at least one layer after its input".into(),
            ));
        }
        let mut shape = self.input;
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate(i)?;
            shape = layer.output_shape(shape)?;
        }
        Ok(())
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(
                "learning_rate must be positive".into(),
            ));
        }
        if self.batch_size == Some(0) {
            return Err(Error::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if !self.regularization_param.is_finite()
            || self.regularization_param < 0.0
        {
            return Err(Error::InvalidConfig(
                "regularization_param must be non-negative".into(),
            ));
        }
        match (self.epochs, self.error_threshold) {
            (None, None) => Err(Error::InvalidConfig(
                "one of epochs or error_threshold is required".into(),
            )),
            (Some(_), Some(_)) => Err(Error::InvalidConfig(
                "set only one of epochs or error_threshold".into(),
            )),
            (Some(0), None) => Err(Error::InvalidConfig(
                "epochs must be greater than zero".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.training.validate()
    }
}

/// Parses and validates a configuration from JSON text.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads a configuration from the JSON file at `path`.
///
/// # Examples
///
/// ```no_run
/// use neurons_kernel::config::load_config;
///
/// let config = load_config("configs/strided.json").unwrap();
/// assert!(config.training.learning_rate > 0.0);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}
