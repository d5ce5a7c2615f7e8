//! Scalar units and the channel-by-position grids that hold them.

use crate::activator::Activator;
use crate::cost::Cost;
use crate::error::{Error, Result};

use serde_derive::{Deserialize, Serialize};

/// A raw value grid, indexed `[channel][position]`.
pub type Grid = Vec<Vec<f64>>;

/// A single scalar unit.
///
/// Sums are accumulated during one example and cleared before the next;
/// values are derived from the sums by the owning layer and persist until
/// they are overwritten.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    activation_sum: f64,
    activation_value: f64,
    delta_sum: f64,
    delta_value: f64,
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    pub fn activation_sum(&self) -> f64 {
        self.activation_sum
    }

    pub fn activation_value(&self) -> f64 {
        self.activation_value
    }

    pub fn delta_sum(&self) -> f64 {
        self.delta_sum
    }

    pub fn delta_value(&self) -> f64 {
        self.delta_value
    }

    pub fn add_to_activation_sum(&mut self, value: f64) {
        self.activation_sum += value;
    }

    pub fn add_to_delta_sum(&mut self, value: f64) {
        self.delta_sum += value;
    }

    /// Activates the accumulated input sum.
    pub fn trigger_activation(&mut self, activator: &Activator) {
        self.activation_value = activator.f(self.activation_sum);
    }

    /// Differentiates the accumulated error through the activator.
    pub fn trigger_delta(&mut self, activator: &Activator) {
        self.delta_value = self.delta_sum * activator.df(self.activation_sum);
    }

    /// Seeds the error of a terminal node from its `target` output.
    pub fn set_initial_delta(&mut self, cost: &Cost, target: f64) -> Result<()> {
        self.delta_sum = cost.df(self.activation_value, target)?;
        Ok(())
    }

    /// Zeroes both sums. Values are left for reading.
    pub fn clear_sums(&mut self) {
        self.activation_sum = 0.0;
        self.delta_sum = 0.0;
    }
}

/// Dimensions of a node grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub channels: usize,
    pub positions: usize,
}

impl Shape {
    pub fn new(channels: usize, positions: usize) -> Self {
        Shape {
            channels,
            positions,
        }
    }

    /// Total number of nodes in a grid of this shape.
    pub fn len(&self) -> usize {
        self.channels * self.positions
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verifies that `grid` is exactly `channels` rows of `positions`
    /// values.
    pub fn check(&self, grid: &[Vec<f64>]) -> Result<()> {
        let found_positions = grid.first().map_or(0, Vec::len);
        let ragged = grid.iter().any(|row| row.len() != found_positions);
        if grid.len() != self.channels
            || found_positions != self.positions
            || ragged
        {
            return Err(Error::ShapeMismatch {
                expected: (self.channels, self.positions),
                found: (grid.len(), found_positions),
            });
        }
        Ok(())
    }
}

/// Address of one node within a grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridIndex {
    pub channel: usize,
    pub position: usize,
}

/// A channel-by-position grid of nodes, stored row-major by channel.
#[derive(Clone, Debug)]
pub struct NodeGrid {
    shape: Shape,
    nodes: Vec<Node>,
}

impl NodeGrid {
    /// Allocates a grid of zeroed nodes. Both dimensions must be non-zero.
    pub fn new(shape: Shape) -> Result<Self> {
        if shape.channels == 0 {
            return Err(Error::ZeroSize { what: "channel count" });
        }
        if shape.positions == 0 {
            return Err(Error::ZeroSize {
                what: "positions per channel",
            });
        }
        Ok(NodeGrid {
            shape,
            nodes: vec![Node::new(); shape.len()],
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    pub fn positions(&self) -> usize {
        self.shape.positions
    }

    pub fn get(&self, index: GridIndex) -> Option<&Node> {
        self.offset(index).map(move |i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, index: GridIndex) -> Option<&mut Node> {
        match self.offset(index) {
            Some(i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    /// Returns the nodes of a single channel.
    ///
    /// Panics if `channel` is out of range.
    pub fn channel(&self, channel: usize) -> &[Node] {
        let start = channel * self.shape.positions;
        &self.nodes[start..start + self.shape.positions]
    }

    /// Returns the nodes of a single channel, mutably.
    ///
    /// Panics if `channel` is out of range.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Node] {
        let start = channel * self.shape.positions;
        &mut self.nodes[start..start + self.shape.positions]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn clear_sums(&mut self) {
        for node in &mut self.nodes {
            node.clear_sums();
        }
    }

    /// Copies every node's activation value into a `[channel][position]`
    /// grid.
    pub fn activation_values(&self) -> Grid {
        self.collect(Node::activation_value)
    }

    /// Copies every node's delta value into a `[channel][position]` grid.
    pub fn delta_values(&self) -> Grid {
        self.collect(Node::delta_value)
    }

    fn collect<F>(&self, value: F) -> Grid
    where
        F: Fn(&Node) -> f64,
    {
        self.nodes
            .chunks(self.shape.positions)
            .map(|row| row.iter().map(&value).collect::<Vec<f64>>())
            .collect()
    }

    fn offset(&self, index: GridIndex) -> Option<usize> {
        if index.channel < self.shape.channels
            && index.position < self.shape.positions
        {
            Some(index.channel * self.shape.positions + index.position)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn accumulate_and_activate() {
        let mut node = Node::new();
        node.add_to_activation_sum(1.0);
        node.add_to_activation_sum(0.1);
        node.trigger_activation(&Activator::ReLU);
        assert_relative_eq!(node.activation_value(), 1.1);

        node.set_initial_delta(&Cost::Quadratic, 1.0).unwrap();
        node.trigger_delta(&Activator::ReLU);
        assert_relative_eq!(node.delta_sum(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(node.delta_value(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn clear_keeps_values() {
        let mut node = Node::new();
        node.add_to_activation_sum(-2.0);
        node.add_to_delta_sum(4.0);
        node.trigger_activation(&Activator::Identity);
        node.trigger_delta(&Activator::Identity);
        node.clear_sums();
        assert_eq!(node.activation_sum(), 0.0);
        assert_eq!(node.delta_sum(), 0.0);
        assert_eq!(node.activation_value(), -2.0);
        assert_eq!(node.delta_value(), 4.0);
    }

    #[test]
    fn initial_delta_propagates_domain_error() {
        let mut node = Node::new();
        node.trigger_activation(&Activator::Identity);
        assert!(node.set_initial_delta(&Cost::CrossEntropy, 1.0).is_err());
    }

    #[test]
    fn grid_layout() {
        let mut grid = NodeGrid::new(Shape::new(2, 3)).unwrap();
        let index = GridIndex {
            channel: 1,
            position: 2,
        };
        grid.get_mut(index).unwrap().add_to_activation_sum(5.0);
        grid.get_mut(index)
            .unwrap()
            .trigger_activation(&Activator::Identity);
        assert_eq!(grid.channel(1)[2].activation_value(), 5.0);
        assert_eq!(
            grid.activation_values(),
            vec![vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 5.0]]
        );
        assert!(grid
            .get(GridIndex {
                channel: 2,
                position: 0
            })
            .is_none());
    }

    #[test]
    fn zero_sized_grid() {
        assert!(NodeGrid::new(Shape::new(0, 3)).is_err());
        assert!(NodeGrid::new(Shape::new(3, 0)).is_err());
    }

    #[test]
    fn shape_check() {
        let shape = Shape::new(2, 2);
        assert!(shape.check(&[vec![0.0, 1.0], vec![2.0, 3.0]]).is_ok());
        assert!(shape.check(&[vec![0.0, 1.0]]).is_err());
        assert!(shape.check(&[vec![0.0, 1.0], vec![2.0]]).is_err());
    }
}
