//! Labelled examples and sampling without replacement.

use crate::error::{Error, Result};
use crate::node::{Grid, Shape};
use crate::scale::Scale;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One labelled example: a raw input grid and the expected output grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Example {
    raw: Grid,
    label: Grid,
}

impl Example {
    /// Both grids must be non-empty and rectangular.
    pub fn new(raw: Grid, label: Grid) -> Result<Self> {
        grid_shape(&raw, "raw channels")?;
        grid_shape(&label, "label channels")?;
        Ok(Example { raw, label })
    }

    pub fn raw(&self) -> &[Vec<f64>] {
        &self.raw
    }

    pub fn label(&self) -> &[Vec<f64>] {
        &self.label
    }

    pub fn raw_shape(&self) -> Shape {
        Shape::new(self.raw.len(), self.raw[0].len())
    }

    pub fn label_shape(&self) -> Shape {
        Shape::new(self.label.len(), self.label[0].len())
    }

    /// Returns a copy of the raw grid with each element zeroed with
    /// probability `rate`, which must lie in `[0, 1]`.
    pub fn noisy_raw<R>(&self, rate: f64, rng: &mut R) -> Result<Grid>
    where
        R: Rng + ?Sized,
    {
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::InvalidRate(rate));
        }
        Ok(self
            .raw
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&value| if rng.gen::<f64>() < rate { 0.0 } else { value })
                    .collect::<Vec<f64>>()
            })
            .collect())
    }
}

fn grid_shape(grid: &[Vec<f64>], what: &'static str) -> Result<Shape> {
    let positions = match grid.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => return Err(Error::ZeroSize { what }),
    };
    let shape = Shape::new(grid.len(), positions);
    shape.check(grid)?;
    Ok(shape)
}

/// A store of same-shaped examples with an epoch shuffle buffer.
///
/// Every example is drawn exactly once per epoch, in uniformly random
/// order, until the buffer is reset.
#[derive(Clone, Debug)]
pub struct DataSet {
    examples: Vec<Example>,
    /// Indices not yet drawn this epoch.
    buffer: Vec<usize>,
    rng: StdRng,
}

impl DataSet {
    pub fn new(seed: u64) -> Self {
        DataSet {
            examples: Vec::new(),
            buffer: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Adds an example, which must match the shapes of those already held.
    pub fn add_example(&mut self, example: Example) -> Result<()> {
        if let Some(first) = self.examples.first() {
            check_shape(first.raw_shape(), example.raw_shape())?;
            check_shape(first.label_shape(), example.label_shape())?;
        }
        self.examples.push(example);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Removes the example at `index`, also dropping it from the current
    /// epoch if it has not been drawn yet.
    pub fn remove_example(&mut self, index: usize) -> Option<Example> {
        if index >= self.examples.len() {
            return None;
        }
        let example = self.examples.remove(index);
        self.buffer.retain(|&i| i != index);
        for i in &mut self.buffer {
            if *i > index {
                *i -= 1;
            }
        }
        Some(example)
    }

    /// Drops every example and empties the buffer.
    pub fn clear(&mut self) {
        self.examples.clear();
        self.buffer.clear();
    }

    /// Refills the shuffle buffer with every example.
    pub fn reset_epoch_buffer(&mut self) {
        self.buffer = (0..self.examples.len()).collect();
    }

    /// Number of examples left to draw this epoch.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if a full batch of `size` examples, and at least one,
    /// remains this epoch.
    pub fn has_next_batch(&self, size: usize) -> bool {
        self.buffer.len() >= size.max(1)
    }

    /// Draws a random example not yet seen this epoch.
    pub fn next_example(&mut self) -> Result<&Example> {
        if self.buffer.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        let i = self.rng.gen_range(0..self.buffer.len());
        let index = self.buffer.swap_remove(i);
        Ok(&self.examples[index])
    }

    pub fn raws(&self) -> Vec<&[Vec<f64>]> {
        self.examples.iter().map(Example::raw).collect()
    }

    pub fn labels(&self) -> Vec<&[Vec<f64>]> {
        self.examples.iter().map(Example::label).collect()
    }

    /// Replaces every raw grid with its scaled-down form. Nothing changes
    /// if any example fails to scale.
    pub fn scale_raws(&mut self, scale: &dyn Scale) -> Result<()> {
        let scaled = self
            .examples
            .iter()
            .map(|example| scale.scale_down(&example.raw))
            .collect::<Result<Vec<_>>>()?;
        for (example, raw) in self.examples.iter_mut().zip(scaled) {
            example.raw = raw;
        }
        Ok(())
    }
}

fn check_shape(expected: Shape, found: Shape) -> Result<()> {
    if expected != found {
        return Err(Error::ShapeMismatch {
            expected: (expected.channels, expected.positions),
            found: (found.channels, found.positions),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn example(value: f64) -> Example {
        Example::new(vec![vec![value, -value]], vec![vec![value]]).unwrap()
    }

    fn data(count: usize) -> DataSet {
        let mut data = DataSet::new(11);
        for i in 0..count {
            data.add_example(example(i as f64)).unwrap();
        }
        data
    }

    #[test]
    fn rejects_empty_grids() {
        assert!(matches!(
            Example::new(vec![], vec![vec![1.0]]),
            Err(Error::ZeroSize { .. })
        ));
        assert!(matches!(
            Example::new(vec![vec![1.0]], vec![vec![]]),
            Err(Error::ZeroSize { .. })
        ));
        assert!(matches!(
            Example::new(vec![vec![1.0], vec![1.0, 2.0]], vec![vec![1.0]]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_mismatched_example() {
        let mut data = data(1);
        let wide = Example::new(vec![vec![1.0, 2.0, 3.0]], vec![vec![1.0]]).unwrap();
        assert!(matches!(
            data.add_example(wide),
            Err(Error::ShapeMismatch { .. })
        ));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn every_example_once_per_epoch() {
        let mut data = data(10);
        for _ in 0..3 {
            data.reset_epoch_buffer();
            let mut seen = HashSet::new();
            while data.remaining() > 0 {
                let example = data.next_example().unwrap();
                assert!(seen.insert(example.label()[0][0] as usize));
            }
            assert_eq!(seen.len(), 10);
            assert!(matches!(data.next_example(), Err(Error::EmptyBuffer)));
        }
    }

    #[test]
    fn batches() {
        let mut data = data(5);
        assert!(!data.has_next_batch(1));
        data.reset_epoch_buffer();
        assert!(data.has_next_batch(5));
        assert!(!data.has_next_batch(6));
        for _ in 0..4 {
            data.next_example().unwrap();
        }
        assert!(data.has_next_batch(0));
        assert!(data.has_next_batch(1));
        assert!(!data.has_next_batch(2));
        data.next_example().unwrap();
        assert!(!data.has_next_batch(0));
    }

    #[test]
    fn clear_empties_buffer() {
        let mut data = data(3);
        data.reset_epoch_buffer();
        data.clear();
        assert!(data.is_empty());
        assert_eq!(data.remaining(), 0);
    }

    #[test]
    fn noise_rates() {
        let example = Example::new(vec![vec![1.0; 50]; 2], vec![vec![0.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(example.noisy_raw(0.0, &mut rng).unwrap(), example.raw());
        assert!(example
            .noisy_raw(1.0, &mut rng)
            .unwrap()
            .iter()
            .flatten()
            .all(|&v| v == 0.0));
        let zeroed = example
            .noisy_raw(0.5, &mut rng)
            .unwrap()
            .iter()
            .flatten()
            .filter(|&&v| v == 0.0)
            .count();
        assert!(zeroed > 20 && zeroed < 80);
        assert!(example.raw().iter().flatten().all(|&v| v == 1.0));
    }

    #[test]
    fn noise_rate_is_checked() {
        let example = example(1.0);
        let mut rng = StdRng::seed_from_u64(0);
        for &rate in &[-0.1, 1.5, std::f64::NAN] {
            let err = example.noisy_raw(rate, &mut rng).unwrap_err();
            assert!(matches!(err, Error::InvalidRate(_)));
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        }
    }

    #[test]
    fn removal_updates_epoch() {
        let mut data = data(5);
        data.reset_epoch_buffer();
        let first = data.next_example().unwrap().label()[0][0] as usize;
        let target = if first == 2 { 3 } else { 2 };

        let removed = data.remove_example(target).unwrap();
        assert_eq!(removed.label()[0][0] as usize, target);
        assert_eq!(data.len(), 4);
        assert_eq!(data.remaining(), 3);
        assert!(data.remove_example(4).is_none());

        let mut seen = HashSet::new();
        while data.remaining() > 0 {
            let label = data.next_example().unwrap().label()[0][0] as usize;
            assert!(seen.insert(label));
        }
        assert!(!seen.contains(&target));
        assert!(!seen.contains(&first));
        assert_eq!(seen.len(), 3);

        assert!(data.remove_example(0).is_some());
        data.reset_epoch_buffer();
        assert_eq!(data.remaining(), 3);
    }

    #[test]
    fn raws_and_labels() {
        let data = data(2);
        assert_eq!(data.raws()[1], &[vec![1.0, -1.0]][..]);
        assert_eq!(data.labels()[0], &[vec![0.0]][..]);
    }
}
