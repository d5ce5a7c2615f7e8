//! Layers: grids of nodes populated by banks of kernels.

mod kernel;

pub use self::kernel::{Kernel, KernelShape};

use crate::activator::Activator;
use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::node::{Grid, NodeGrid, Shape};
use crate::regularizer::Regularizer;

use itertools::izip;
use log::debug;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_LAYER_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies one layer for the life of the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

impl LayerId {
    fn next() -> Self {
        LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a layer reads from during its forward pass.
#[derive(Copy, Clone, Debug)]
pub enum Input<'a> {
    /// Raw values, indexed `[channel][position]`, for the first layer of a
    /// network.
    Raw(&'a [Vec<f64>]),
    /// The already-activated layer this layer is connected to.
    Layer(&'a Layer),
}

/// A channel-by-position grid of nodes, with one kernel per channel
/// populating it from a previous layer.
///
/// Layers must be propagated in input-to-output order and backpropagated
/// in output-to-input order. Running them out of order is not detected;
/// it simply reads stale activations or deltas.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    nodes: NodeGrid,
    /// One kernel per output channel, empty for an input layer.
    kernels: Vec<Kernel>,
    activator: Activator,
    /// Identity and shape of the connected input layer, if any.
    input: Option<(LayerId, Shape)>,
    /// Whether another layer consumes this one.
    claimed: bool,
}

impl Layer {
    /// Creates a layer with no learnable input, fed raw values.
    pub fn input(shape: Shape, activator: Activator) -> Result<Self> {
        Layer::new(shape, activator, Vec::new())
    }

    /// Creates a layer from explicit kernels, one per channel, each bound
    /// to its channel's nodes.
    pub fn new(
        shape: Shape,
        activator: Activator,
        mut kernels: Vec<Kernel>,
    ) -> Result<Self> {
        let nodes = NodeGrid::new(shape)?;
        if !kernels.is_empty() && kernels.len() != shape.channels {
            return Err(Error::SizeConflict {
                what: "kernels per layer",
                expected: shape.channels,
                found: kernels.len(),
            });
        }
        for kernel in &mut kernels {
            kernel.connect_output_nodes(shape.positions)?;
        }
        debug!(
            "created {}x{} layer with {} kernels ({:?})",
            shape.channels,
            shape.positions,
            kernels.len(),
            activator
        );
        Ok(Layer {
            id: LayerId::next(),
            nodes,
            kernels,
            activator,
            input: None,
            claimed: false,
        })
    }

    /// Creates a layer whose kernels all share one randomly initialized
    /// geometry.
    pub fn convolutional<R>(
        shape: Shape,
        activator: Activator,
        kernel: KernelShape,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let kernels = (0..shape.channels)
            .map(|_| Kernel::new(kernel.clone(), rng))
            .collect::<Result<Vec<_>>>()?;
        Layer::new(shape, activator, kernels)
    }

    /// Creates a fully connected layer of `outputs` single-position
    /// channels, each reading every node of an `input`-shaped layer.
    pub fn dense<R>(
        outputs: usize,
        input: Shape,
        activator: Activator,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        Layer::convolutional(
            Shape::new(outputs, 1),
            activator,
            KernelShape::full(input.channels, input.positions),
            rng,
        )
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn shape(&self) -> Shape {
        self.nodes.shape()
    }

    pub fn nodes(&self) -> &NodeGrid {
        &self.nodes
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    pub fn kernels_mut(&mut self) -> &mut [Kernel] {
        &mut self.kernels
    }

    pub fn activator(&self) -> Activator {
        self.activator
    }

    /// Shape of the connected input layer, if any.
    pub fn input_shape(&self) -> Option<Shape> {
        self.input.map(|(_, shape)| shape)
    }

    /// Returns true if `layer` is the one this layer reads from.
    pub fn is_connected_to(&self, layer: &Layer) -> bool {
        self.input.map(|(id, _)| id) == Some(layer.id)
    }

    /// Checks that `layer` is the connected input.
    fn check_input(&self, layer: &Layer) -> Result<()> {
        match self.input {
            None => Err(Error::InputUnbound),
            Some((id, _)) if id != layer.id => Err(Error::NotConnected),
            Some(_) => Ok(()),
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Number of trainable weights across every kernel.
    pub fn parameter_count(&self) -> usize {
        self.kernels.iter().map(Kernel::parameter_count).sum()
    }

    /// Connects `input` as this layer's source, handing its whole node
    /// grid to every kernel.
    ///
    /// Fails if this layer already has an input, if `input` is already
    /// consumed by another layer, or if any kernel's receptive field does
    /// not fit the input. Nothing is left half-connected on failure.
    pub fn connect(&mut self, input: &mut Layer) -> Result<()> {
        if self.input.is_some() {
            return Err(Error::InputOverride);
        }
        if input.claimed {
            return Err(Error::LayerClaimed);
        }
        let shape = input.shape();
        for i in 0..self.kernels.len() {
            if let Err(err) = self.kernels[i].connect_input_nodes(shape) {
                for kernel in &mut self.kernels[..i] {
                    kernel.disconnect_input_nodes();
                }
                return Err(err);
            }
        }
        input.claimed = true;
        self.input = Some((input.id, shape));
        debug!(
            "connected {}x{} layer to {}x{} input",
            self.shape().channels,
            self.shape().positions,
            shape.channels,
            shape.positions
        );
        Ok(())
    }

    /// Reverses `connect`, releasing `input` for another consumer.
    pub fn disconnect(&mut self, input: &mut Layer) -> Result<()> {
        if !self.is_connected_to(input) {
            return Err(Error::NotConnected);
        }
        for kernel in &mut self.kernels {
            kernel.disconnect_input_nodes();
        }
        input.claimed = false;
        self.input = None;
        Ok(())
    }

    /// Accumulates this layer's input sums, then activates every node.
    ///
    /// Raw input is added directly to the sums and kernels are skipped;
    /// otherwise every kernel strides over the connected layer.
    pub fn propagate(&mut self, input: Input<'_>) -> Result<()> {
        match input {
            Input::Raw(values) => {
                self.shape().check(values)?;
                for (node, &value) in
                    self.nodes.iter_mut().zip(values.iter().flatten())
                {
                    node.add_to_activation_sum(value);
                }
            }
            Input::Layer(layer) => {
                self.check_input(layer)?;
                let Layer { nodes, kernels, .. } = self;
                for (channel, kernel) in kernels.iter_mut().enumerate() {
                    kernel.propagate_all(&layer.nodes, nodes.channel_mut(channel))?;
                }
            }
        }
        let activator = self.activator;
        for node in self.nodes.iter_mut() {
            node.trigger_activation(&activator);
        }
        Ok(())
    }

    /// Resolves this layer's deltas and relays them into `input`.
    ///
    /// `targets` seed the error of an output layer through `cost`;
    /// otherwise the deltas already pushed in by the next layer are used.
    /// Layers with kernels require their connected `input`, which is
    /// checked before any delta is touched.
    pub fn backpropagate(
        &mut self,
        input: Option<&mut Layer>,
        targets: Option<&[Vec<f64>]>,
        cost: &Cost,
    ) -> Result<()> {
        let input = if self.kernels.is_empty() {
            None
        } else {
            match input {
                Some(input) => {
                    self.check_input(input)?;
                    Some(input)
                }
                None => return Err(Error::InputUnbound),
            }
        };
        if let Some(targets) = targets {
            self.shape().check(targets)?;
            for (node, &target) in
                izip!(self.nodes.iter_mut(), targets.iter().flatten())
            {
                node.set_initial_delta(cost, target)?;
            }
        }
        let activator = self.activator;
        for node in self.nodes.iter_mut() {
            node.trigger_delta(&activator);
        }
        if let Some(input) = input {
            let Layer { nodes, kernels, .. } = self;
            for (channel, kernel) in kernels.iter_mut().enumerate() {
                kernel.backpropagate_all(&mut input.nodes, nodes.channel(channel))?;
            }
        }
        Ok(())
    }

    /// Clears every node's sums. Kernel gradients are untouched.
    pub fn clear_node_sums(&mut self) {
        self.nodes.clear_sums();
    }

    /// Corrects every kernel once, consuming the batch's gradients.
    pub fn correct_kernels(
        &mut self,
        rate: f64,
        regularizer: &Regularizer,
        param: f64,
    ) -> Result<()> {
        for kernel in &mut self.kernels {
            kernel.correct_connections(rate, regularizer, param)?;
        }
        Ok(())
    }

    pub fn activation_values(&self) -> Grid {
        self.nodes.activation_values()
    }

    pub fn delta_values(&self) -> Grid {
        self.nodes.delta_values()
    }
}
