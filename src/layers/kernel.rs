use crate::connection::{BiasConnection, Connection, NodeConnection};
use crate::error::{Error, Result};
use crate::node::{GridIndex, Node, NodeGrid, Shape};
use crate::regularizer::Regularizer;

use itertools::iproduct;
use rand::Rng;
use rand_distr::StandardNormal;
use serde_derive::{Deserialize, Serialize};
use std::iter;

/// Geometry of a kernel: how many input channels it reads, which offsets
/// it reads at each stride, and how far each stride advances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelShape {
    pub channels: usize,
    pub receptive_field: Vec<usize>,
    pub stride: usize,
}

impl KernelShape {
    pub fn new(channels: usize, receptive_field: Vec<usize>, stride: usize) -> Self {
        KernelShape {
            channels,
            receptive_field,
            stride,
        }
    }

    /// A field reading every position of an input `positions` wide, once.
    pub fn full(channels: usize, positions: usize) -> Self {
        KernelShape::new(channels, (0..positions).collect(), 1)
    }

    /// Returns the number of in-bounds strides over an input `positions`
    /// wide, or `None` if not even the first stride fits.
    pub fn output_positions(&self, positions: usize) -> Option<usize> {
        let reach = *self.receptive_field.iter().max()?;
        if self.stride == 0 || reach >= positions {
            return None;
        }
        Some((positions - 1 - reach) / self.stride + 1)
    }

    fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::ZeroSize { what: "kernel channels" });
        }
        if self.receptive_field.is_empty() {
            return Err(Error::EmptyReceptiveField);
        }
        if self.stride == 0 {
            return Err(Error::ZeroSize { what: "stride length" });
        }
        Ok(())
    }
}

/// A group of connections shared by every node of one output channel.
///
/// The same `NodeConnection` for a given `(channel, offset)` pair is
/// rebound at every stride, so its gradient accumulator sums the partial
/// derivatives of all positions that share its weight.
#[derive(Clone, Debug)]
pub struct Kernel {
    /// Connections indexed `[channel][receptive field offset]`.
    connections: Vec<Vec<NodeConnection>>,
    bias: BiasConnection,
    receptive_field: Vec<usize>,
    stride: usize,
    input: Option<Shape>,
    output_len: Option<usize>,
}

impl Kernel {
    /// Creates a kernel with normally distributed weights scaled by the
    /// square root of its fan-in, and a zero bias.
    pub fn new<R>(shape: KernelShape, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        shape.validate()?;
        let fan_in = shape.channels * shape.receptive_field.len();
        let scale = 1.0 / (fan_in as f64).sqrt();
        let weights: Vec<f64> = (0..fan_in)
            .map(|_| rng.sample::<f64, _>(StandardNormal) * scale)
            .chain(iter::once(0.0))
            .collect();
        Kernel::with_weights(shape, &weights)
    }

    /// Creates a kernel with explicit weights, laid out channel-major then
    /// by offset, with the bias last.
    pub fn with_weights(shape: KernelShape, weights: &[f64]) -> Result<Self> {
        shape.validate()?;
        let mut kernel = Kernel {
            connections: vec![
                vec![NodeConnection::new(0.0); shape.receptive_field.len()];
                shape.channels
            ],
            bias: BiasConnection::new(0.0),
            receptive_field: shape.receptive_field,
            stride: shape.stride,
            input: None,
            output_len: None,
        };
        kernel.set_weights(weights)?;
        Ok(kernel)
    }

    pub fn shape(&self) -> KernelShape {
        KernelShape::new(self.channels(), self.receptive_field.clone(), self.stride)
    }

    pub fn channels(&self) -> usize {
        self.connections.len()
    }

    pub fn receptive_field(&self) -> &[usize] {
        &self.receptive_field
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of trainable weights, including the bias.
    pub fn parameter_count(&self) -> usize {
        self.channels() * self.receptive_field.len() + 1
    }

    /// Connections indexed `[channel][receptive field offset]`.
    pub fn connections(&self) -> &[Vec<NodeConnection>] {
        &self.connections
    }

    pub fn connection(&self, channel: usize, offset: usize) -> Option<&NodeConnection> {
        self.connections.get(channel).and_then(|row| row.get(offset))
    }

    pub fn bias(&self) -> &BiasConnection {
        &self.bias
    }

    pub fn input_shape(&self) -> Option<Shape> {
        self.input
    }

    pub fn output_len(&self) -> Option<usize> {
        self.output_len
    }

    /// Returns a copy of every weight, the bias last.
    pub fn weights(&self) -> Vec<f64> {
        self.connections
            .iter()
            .flatten()
            .map(Connection::weight)
            .chain(iter::once(self.bias.weight()))
            .collect()
    }

    /// Overwrites every weight, the bias last.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.parameter_count() {
            return Err(Error::SizeConflict {
                what: "kernel weights",
                expected: self.parameter_count(),
                found: weights.len(),
            });
        }
        for (connection, &weight) in
            self.connections.iter_mut().flatten().zip(weights)
        {
            connection.set_weight(weight);
        }
        self.bias.set_weight(weights[weights.len() - 1]);
        Ok(())
    }

    /// Binds the shape of the grid this kernel reads from.
    pub fn connect_input_nodes(&mut self, shape: Shape) -> Result<()> {
        if self.input.is_some() {
            return Err(Error::InputOverride);
        }
        if shape.channels != self.channels() {
            return Err(Error::SizeConflict {
                what: "input channels",
                expected: self.channels(),
                found: shape.channels,
            });
        }
        if shape.positions == 0 {
            return Err(Error::ZeroSize {
                what: "input positions",
            });
        }
        if let Some(len) = self.output_len {
            self.check_receptive_field(shape.positions, len)?;
        }
        self.input = Some(shape);
        Ok(())
    }

    /// Binds the length of the node slice this kernel writes to.
    pub fn connect_output_nodes(&mut self, len: usize) -> Result<()> {
        if self.output_len.is_some() {
            return Err(Error::OutputOverride);
        }
        if len == 0 {
            return Err(Error::ZeroSize {
                what: "output positions",
            });
        }
        if let Some(shape) = self.input {
            self.check_receptive_field(shape.positions, len)?;
        }
        self.output_len = Some(len);
        Ok(())
    }

    pub fn disconnect_input_nodes(&mut self) {
        self.input = None;
    }

    pub fn disconnect_output_nodes(&mut self) {
        self.output_len = None;
    }

    /// Strides over every output node, adding weighted input activations
    /// to each.
    pub fn propagate_all(
        &mut self,
        inputs: &NodeGrid,
        outputs: &mut [Node],
    ) -> Result<()> {
        let len = self.check_bound(inputs.shape(), outputs.len())?;
        let Kernel {
            connections,
            bias,
            receptive_field,
            stride,
            ..
        } = self;
        for position in 0..len {
            let base = position * *stride;
            for (channel, offset) in
                iproduct!(0..connections.len(), 0..receptive_field.len())
            {
                let input = GridIndex {
                    channel,
                    position: base + receptive_field[offset],
                };
                with_binding(
                    &mut connections[channel][offset],
                    input,
                    position,
                    |connection| connection.propagate(inputs, outputs),
                )?;
            }
            bias.set_output(position)?;
            let result = bias.propagate(inputs, outputs);
            bias.clear_output();
            result?;
        }
        Ok(())
    }

    /// Strides over every output node, relaying its delta into the input
    /// grid and accumulating each connection's gradient.
    pub fn backpropagate_all(
        &mut self,
        inputs: &mut NodeGrid,
        outputs: &[Node],
    ) -> Result<()> {
        let len = self.check_bound(inputs.shape(), outputs.len())?;
        let Kernel {
            connections,
            bias,
            receptive_field,
            stride,
            ..
        } = self;
        for position in 0..len {
            let base = position * *stride;
            for (channel, offset) in
                iproduct!(0..connections.len(), 0..receptive_field.len())
            {
                let input = GridIndex {
                    channel,
                    position: base + receptive_field[offset],
                };
                with_binding(
                    &mut connections[channel][offset],
                    input,
                    position,
                    |connection| connection.backpropagate(inputs, outputs),
                )?;
            }
            bias.set_output(position)?;
            let result = bias.backpropagate(inputs, outputs);
            bias.clear_output();
            result?;
        }
        Ok(())
    }

    /// Corrects every connection once. Gradients were already summed
    /// across strides.
    pub fn correct_connections(
        &mut self,
        rate: f64,
        regularizer: &Regularizer,
        param: f64,
    ) -> Result<()> {
        for connection in self.connections.iter_mut().flatten() {
            connection.correct(rate, regularizer, param)?;
        }
        self.bias.correct(rate, regularizer, param)
    }

    fn check_bound(&self, inputs: Shape, outputs: usize) -> Result<usize> {
        let expected = self.input.ok_or(Error::InputUnbound)?;
        let len = self.output_len.ok_or(Error::OutputUnbound)?;
        if inputs != expected {
            return Err(Error::ShapeMismatch {
                expected: (expected.channels, expected.positions),
                found: (inputs.channels, inputs.positions),
            });
        }
        if outputs != len {
            return Err(Error::SizeConflict {
                what: "output nodes",
                expected: len,
                found: outputs,
            });
        }
        Ok(len)
    }

    /// Every offset at every stride must land inside the input, and every
    /// input position must be read by some stride.
    fn check_receptive_field(&self, positions: usize, output_len: usize) -> Result<()> {
        let mut visited = vec![false; positions];
        for stride in 0..output_len {
            let base = stride * self.stride;
            for (offset, &relative) in self.receptive_field.iter().enumerate() {
                let position = base + relative;
                if position >= positions {
                    return Err(Error::ReceptiveFieldOutOfBounds { offset, stride });
                }
                visited[position] = true;
            }
        }
        match visited.iter().position(|&seen| !seen) {
            Some(position) => Err(Error::UncoveredInput { position }),
            None => Ok(()),
        }
    }
}

/// Binds `connection` for one stride, runs `step`, and always unbinds.
fn with_binding<F>(
    connection: &mut NodeConnection,
    input: GridIndex,
    output: usize,
    step: F,
) -> Result<()>
where
    F: FnOnce(&mut NodeConnection) -> Result<()>,
{
    connection.set_input(input)?;
    if let Err(err) = connection.set_output(output) {
        connection.clear_input();
        return Err(err);
    }
    let result = step(connection);
    connection.clear_output();
    connection.clear_input();
    result
}
