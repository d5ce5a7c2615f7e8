//! Weighted edges between nodes.
//!
//! A connection only holds *indices* into the grids it is bound to. The
//! grids themselves are owned by layers and handed in on every call, so a
//! single connection can be rebound cheaply from one stride position to
//! the next while keeping its weight and gradient accumulator.

use crate::error::{Error, Result};
use crate::node::{GridIndex, Node, NodeGrid};
use crate::regularizer::Regularizer;

/// Running sum and count of per-example weight gradients.
///
/// Accumulation is a plain sum, so partial accumulators built from
/// disjoint examples can be combined with `merge` in any order.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Gradient {
    sum: f64,
    count: usize,
}

impl Gradient {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the averaged gradient, failing if nothing was accumulated.
    pub fn mean(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(Error::NoDeltas);
        }
        Ok(self.sum / self.count as f64)
    }

    /// Folds another accumulator into this one.
    pub fn merge(&mut self, other: &Gradient) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn reset(&mut self) {
        *self = Gradient::default();
    }
}

/// Behavior shared by node and bias connections.
pub trait Connection {
    fn weight(&self) -> f64;

    fn set_weight(&mut self, weight: f64);

    fn gradient(&self) -> &Gradient;

    fn gradient_mut(&mut self) -> &mut Gradient;

    /// Binds the output node, given as an index into the output slice.
    fn set_output(&mut self, position: usize) -> Result<()>;

    fn clear_output(&mut self);

    /// Adds this connection's weighted input to the output's activation
    /// sum.
    fn propagate(&self, inputs: &NodeGrid, outputs: &mut [Node]) -> Result<()>;

    /// Relays the output's error upstream and accumulates this
    /// connection's gradient.
    fn backpropagate(
        &mut self,
        inputs: &mut NodeGrid,
        outputs: &[Node],
    ) -> Result<()>;

    /// Regularization term contributed to this connection's correction.
    fn compute_regularization(&self, regularizer: &Regularizer, param: f64)
        -> f64;

    /// Applies the averaged gradient and regularization to the weight,
    /// then resets the accumulator.
    fn correct(
        &mut self,
        rate: f64,
        regularizer: &Regularizer,
        param: f64,
    ) -> Result<()> {
        let mean = self.gradient().mean()?;
        let penalty = self.compute_regularization(regularizer, param);
        let weight = self.weight() - rate * (mean + penalty);
        self.set_weight(weight);
        self.gradient_mut().reset();
        Ok(())
    }
}

/// A connection from one node to another.
#[derive(Clone, Debug)]
pub struct NodeConnection {
    weight: f64,
    gradient: Gradient,
    input: Option<GridIndex>,
    output: Option<usize>,
}

impl NodeConnection {
    pub fn new(weight: f64) -> Self {
        NodeConnection {
            weight,
            gradient: Gradient::default(),
            input: None,
            output: None,
        }
    }

    /// Binds the input node. Fails if an input is already bound.
    pub fn set_input(&mut self, index: GridIndex) -> Result<()> {
        if self.input.is_some() {
            return Err(Error::InputOverride);
        }
        self.input = Some(index);
        Ok(())
    }

    pub fn clear_input(&mut self) {
        self.input = None;
    }

    fn bound(&self) -> Result<(GridIndex, usize)> {
        let input = self.input.ok_or(Error::InputUnbound)?;
        let output = self.output.ok_or(Error::OutputUnbound)?;
        Ok((input, output))
    }
}

impl Connection for NodeConnection {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn gradient(&self) -> &Gradient {
        &self.gradient
    }

    fn gradient_mut(&mut self) -> &mut Gradient {
        &mut self.gradient
    }

    fn set_output(&mut self, position: usize) -> Result<()> {
        bind_output(&mut self.output, position)
    }

    fn clear_output(&mut self) {
        self.output = None;
    }

    fn propagate(&self, inputs: &NodeGrid, outputs: &mut [Node]) -> Result<()> {
        let (input, output) = self.bound()?;
        let activation = input_node(inputs, input)?.activation_value();
        output_node_mut(outputs, output)?
            .add_to_activation_sum(self.weight * activation);
        Ok(())
    }

    fn backpropagate(
        &mut self,
        inputs: &mut NodeGrid,
        outputs: &[Node],
    ) -> Result<()> {
        let (input, output) = self.bound()?;
        let delta = output_node(outputs, output)?.delta_value();
        let node = inputs.get_mut(input).ok_or(Error::MissingNode {
            channel: input.channel,
            position: input.position,
        })?;
        node.add_to_delta_sum(self.weight * delta);
        self.gradient.add(node.activation_value() * delta);
        Ok(())
    }

    fn compute_regularization(&self, regularizer: &Regularizer, param: f64)
        -> f64 {
        regularizer.df(param, self.weight)
    }
}

/// A connection from a constant input of one to a node.
#[derive(Clone, Debug)]
pub struct BiasConnection {
    weight: f64,
    gradient: Gradient,
    output: Option<usize>,
}

impl BiasConnection {
    const INPUT: f64 = 1.0;

    pub fn new(weight: f64) -> Self {
        BiasConnection {
            weight,
            gradient: Gradient::default(),
            output: None,
        }
    }
}

impl Connection for BiasConnection {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn gradient(&self) -> &Gradient {
        &self.gradient
    }

    fn gradient_mut(&mut self) -> &mut Gradient {
        &mut self.gradient
    }

    fn set_output(&mut self, position: usize) -> Result<()> {
        bind_output(&mut self.output, position)
    }

    fn clear_output(&mut self) {
        self.output = None;
    }

    fn propagate(&self, _: &NodeGrid, outputs: &mut [Node]) -> Result<()> {
        let output = self.output.ok_or(Error::OutputUnbound)?;
        output_node_mut(outputs, output)?
            .add_to_activation_sum(self.weight * Self::INPUT);
        Ok(())
    }

    /// Biases have nothing upstream, so only the gradient is accumulated.
    fn backpropagate(&mut self, _: &mut NodeGrid, outputs: &[Node]) -> Result<()> {
        let output = self.output.ok_or(Error::OutputUnbound)?;
        let delta = output_node(outputs, output)?.delta_value();
        self.gradient.add(Self::INPUT * delta);
        Ok(())
    }

    /// Biases are never penalized.
    fn compute_regularization(&self, _: &Regularizer, _: f64) -> f64 {
        0.0
    }
}

fn bind_output(slot: &mut Option<usize>, position: usize) -> Result<()> {
    if slot.is_some() {
        return Err(Error::OutputOverride);
    }
    *slot = Some(position);
    Ok(())
}

fn input_node(inputs: &NodeGrid, index: GridIndex) -> Result<&Node> {
    inputs.get(index).ok_or(Error::MissingNode {
        channel: index.channel,
        position: index.position,
    })
}

fn output_node(outputs: &[Node], position: usize) -> Result<&Node> {
    outputs.get(position).ok_or(Error::MissingOutput { position })
}

fn output_node_mut(outputs: &mut [Node], position: usize) -> Result<&mut Node> {
    outputs
        .get_mut(position)
        .ok_or(Error::MissingOutput { position })
}
