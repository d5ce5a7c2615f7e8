//! A [Feedforward neural network]
//! (https://en.wikipedia.org/wiki/Feedforward_neural_network) built as a
//! fixed chain of layers.
//!
//! # Example
//!
//! Let's build a small network that reads four positions of one channel
//! through a strided kernel, then squashes everything into one output:
//!
//! ```
//! # use neurons_kernel::activator::Activator;
//! # use neurons_kernel::feed_forward::Network;
//! # use neurons_kernel::layers::{KernelShape, Layer};
//! # use neurons_kernel::node::Shape;
//! # use rand::rngs::StdRng;
//! # use rand::SeedableRng;
//! let mut rng = StdRng::seed_from_u64(7);
//! let input = Layer::input(Shape::new(1, 4), Activator::Identity)?;
//! let hidden = Layer::convolutional(
//!     Shape::new(2, 2),
//!     Activator::TanH,
//!     KernelShape::new(1, vec![0, 1], 2),
//!     &mut rng,
//! )?;
//! let output = Layer::dense(1, hidden.shape(), Activator::Logistic, &mut rng)?;
//! let mut network = Network::new(vec![input, hidden, output])?;
//!
//! let out = network.run(&[vec![0.0, 0.5, 1.0, 0.5]])?;
//! assert!(out[0][0] > 0.0 && out[0][0] < 1.0);
//! # Ok::<(), neurons_kernel::error::Error>(())
//! ```

use crate::activator::Activator;
use crate::config::NetworkConfig;
use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::layers::{Input, Kernel, Layer};
use crate::node::{Grid, Shape};
use crate::regularizer::Regularizer;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_derive::{Deserialize, Serialize};

/// A feedforward neural network.
#[derive(Debug)]
pub struct Network {
    layers: Vec<Layer>,
}

/// Every kernel weight of a network, indexed `[layer][kernel][weight]`,
/// with each kernel's bias last.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub layers: Vec<Vec<Vec<f64>>>,
}

impl Network {
    /// Chains `layers` from input to output, connecting each to its
    /// predecessor.
    ///
    /// The first layer is fed raw values and must not own kernels; every
    /// other layer must.
    pub fn new(mut layers: Vec<Layer>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(Error::TooFewLayers(2));
        }
        if !layers[0].kernels().is_empty() {
            return Err(Error::InputLayerKernels);
        }
        for i in 1..layers.len() {
            if layers[i].kernels().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "layer #{} has no kernels to read its input",
                    i
                )));
            }
            let (input, layer) = mut_layers(&mut layers, i - 1);
            layer.connect(input)?;
        }
        let network = Network { layers };
        debug!(
            "assembled network of {} layers, {} parameters",
            network.layers.len(),
            network.parameter_count()
        );
        Ok(network)
    }

    /// Builds a freshly initialized network from its configuration.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut layers = Vec::with_capacity(config.layers.len() + 1);
        layers.push(Layer::input(config.input, Activator::Identity)?);
        let mut shape = config.input;
        for layer in &config.layers {
            let output = layer.output_shape(shape)?;
            layers.push(Layer::convolutional(
                output,
                layer.activation,
                layer.kernel_shape(shape),
                &mut rng,
            )?);
            shape = output;
        }
        Network::new(layers)
    }

    /// Returns the shape of raw input the network accepts.
    pub fn input_shape(&self) -> Shape {
        self.layers[0].shape()
    }

    /// Returns the shape of the output layer.
    pub fn output_shape(&self) -> Shape {
        self.output_layer().shape()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of trainable weights in the whole network.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Clears every node's sums ahead of the next example.
    pub fn clear(&mut self) {
        for layer in &mut self.layers {
            layer.clear_node_sums();
        }
    }

    /// Propagates `input` through every layer, front to back.
    pub fn forward(&mut self, input: &[Vec<f64>]) -> Result<()> {
        self.layers[0].propagate(Input::Raw(input))?;
        for i in 1..self.layers.len() {
            let (input, layer) = mut_layers(&mut self.layers, i - 1);
            layer.propagate(Input::Layer(input))?;
        }
        Ok(())
    }

    /// Seeds the output error from `target` and backpropagates it through
    /// every layer, back to front, accumulating gradients on the way.
    pub fn backward(&mut self, target: &[Vec<f64>], cost: &Cost) -> Result<()> {
        self.output_shape().check(target)?;
        let last = self.layers.len() - 1;
        for i in (1..self.layers.len()).rev() {
            let targets = if i == last { Some(target) } else { None };
            let (input, layer) = mut_layers(&mut self.layers, i - 1);
            layer.backpropagate(Some(input), targets, cost)?;
        }
        self.layers[0].backpropagate(None, None, cost)
    }

    /// Feeds `input` through a freshly cleared network, returning the
    /// output layer's activations.
    pub fn run(&mut self, input: &[Vec<f64>]) -> Result<Grid> {
        self.clear();
        self.forward(input)?;
        Ok(self.output_layer().activation_values())
    }

    /// Runs one example forward and backward, returning its total cost.
    ///
    /// Gradients accumulate until `correct` is called.
    pub fn train_example(
        &mut self,
        input: &[Vec<f64>],
        target: &[Vec<f64>],
        cost: &Cost,
    ) -> Result<f64> {
        self.clear();
        self.forward(input)?;
        let error = self.cost(target, cost)?;
        self.backward(target, cost)?;
        trace!("example cost {}", error);
        Ok(error)
    }

    /// Applies the accumulated gradients of the current batch to every
    /// kernel.
    pub fn correct(
        &mut self,
        rate: f64,
        regularizer: &Regularizer,
        param: f64,
    ) -> Result<()> {
        for layer in &mut self.layers {
            layer.correct_kernels(rate, regularizer, param)?;
        }
        Ok(())
    }

    /// Copies out every kernel weight.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            layers: self
                .layers
                .iter()
                .map(|layer| layer.kernels().iter().map(Kernel::weights).collect())
                .collect(),
        }
    }

    /// Overwrites every kernel weight from `snapshot`.
    ///
    /// The snapshot must match this network's layout exactly; nothing is
    /// written otherwise.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.layers.len() != self.layers.len() {
            return Err(Error::SizeConflict {
                what: "snapshot layers",
                expected: self.layers.len(),
                found: snapshot.layers.len(),
            });
        }
        for (layer, kernels) in self.layers.iter().zip(&snapshot.layers) {
            if kernels.len() != layer.kernels().len() {
                return Err(Error::SizeConflict {
                    what: "snapshot kernels",
                    expected: layer.kernels().len(),
                    found: kernels.len(),
                });
            }
            for (kernel, weights) in layer.kernels().iter().zip(kernels) {
                if weights.len() != kernel.parameter_count() {
                    return Err(Error::SizeConflict {
                        what: "kernel weights",
                        expected: kernel.parameter_count(),
                        found: weights.len(),
                    });
                }
            }
        }
        for (layer, kernels) in self.layers.iter_mut().zip(&snapshot.layers) {
            for (kernel, weights) in layer.kernels_mut().iter_mut().zip(kernels) {
                kernel.set_weights(weights)?;
            }
        }
        Ok(())
    }

    /// Total cost of the current output activations against `target`.
    fn cost(&self, target: &[Vec<f64>], cost: &Cost) -> Result<f64> {
        let output = self.output_layer().activation_values();
        self.output_shape().check(target)?;
        let mut total = 0.0;
        for (&a, &t) in output.iter().flatten().zip(target.iter().flatten()) {
            total += cost.f(a, t)?;
        }
        Ok(total)
    }

    fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }
}

/// Splits out a layer and its successor.
fn mut_layers(layers: &mut [Layer], layer: usize) -> (&mut Layer, &mut Layer) {
    let (before, after) = layers[layer..].split_at_mut(1);
    (&mut before[0], &mut after[0])
}
