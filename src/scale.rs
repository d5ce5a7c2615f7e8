//! [Feature scaling](https://en.wikipedia.org/wiki/Feature_scaling) of raw
//! input grids.
//!
//! Every scale is fitted element by element: each `[channel][position]`
//! slot gets its own factors, computed across the whole corpus.

use crate::error::{Error, Result};
use crate::node::{Grid, Shape};

/// A reversible, per-element rescaling of data grids.
pub trait Scale {
    /// Computes this scale's factors from `corpus`.
    fn fit(&mut self, corpus: &[&[Vec<f64>]]) -> Result<()>;

    /// Maps raw data into the scaled domain.
    fn scale_down(&self, grid: &[Vec<f64>]) -> Result<Grid>;

    /// Maps scaled data back into the raw domain.
    fn scale_up(&self, grid: &[Vec<f64>]) -> Result<Grid>;

    fn is_fitted(&self) -> bool;
}

/// Leaves data untouched. Always fitted.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullScale;

impl Scale for NullScale {
    fn fit(&mut self, _corpus: &[&[Vec<f64>]]) -> Result<()> {
        Ok(())
    }

    fn scale_down(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        Ok(grid.to_vec())
    }

    fn scale_up(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        Ok(grid.to_vec())
    }

    fn is_fitted(&self) -> bool {
        true
    }
}

/// `scaled = (raw - shift) / width`, per element.
#[derive(Clone, Debug, PartialEq)]
struct Affine {
    shape: Shape,
    shift: Vec<f64>,
    width: Vec<f64>,
}

impl Affine {
    fn new(shape: Shape, shift: Vec<f64>, width: Vec<f64>) -> Result<Self> {
        if shift.len() != shape.len() || width.len() != shape.len() {
            return Err(Error::InvalidFactor(
                "factor count does not match the data shape",
            ));
        }
        if width.iter().any(|&w| w == 0.0 || !w.is_finite()) {
            return Err(Error::InvalidFactor(
                "each element must have a non-zero spread",
            ));
        }
        Ok(Affine { shape, shift, width })
    }

    fn down(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        self.map(grid, |x, shift, width| (x - shift) / width)
    }

    fn up(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        self.map(grid, |y, shift, width| y * width + shift)
    }

    fn map<F>(&self, grid: &[Vec<f64>], f: F) -> Result<Grid>
    where
        F: Fn(f64, f64, f64) -> f64,
    {
        self.shape.check(grid)?;
        let positions = self.shape.positions;
        Ok(grid
            .iter()
            .enumerate()
            .map(|(channel, row)| {
                row.iter()
                    .enumerate()
                    .map(|(position, &value)| {
                        let i = channel * positions + position;
                        f(value, self.shift[i], self.width[i])
                    })
                    .collect::<Vec<f64>>()
            })
            .collect())
    }
}

/// Per-element minimum and maximum of a corpus, flattened row-major.
fn bounds(corpus: &[&[Vec<f64>]]) -> Result<(Shape, Vec<f64>, Vec<f64>)> {
    let shape = corpus_shape(corpus)?;
    let mut mins = vec![f64::INFINITY; shape.len()];
    let mut maxes = vec![f64::NEG_INFINITY; shape.len()];
    for grid in corpus {
        for (i, &value) in grid.iter().flatten().enumerate() {
            mins[i] = mins[i].min(value);
            maxes[i] = maxes[i].max(value);
        }
    }
    Ok((shape, mins, maxes))
}

/// Every grid of `corpus` must share the first grid's non-empty shape.
fn corpus_shape(corpus: &[&[Vec<f64>]]) -> Result<Shape> {
    let first = corpus
        .first()
        .ok_or(Error::ZeroSize { what: "scaling corpus" })?;
    let shape = Shape::new(first.len(), first.first().map_or(0, Vec::len));
    if shape.is_empty() {
        return Err(Error::ZeroSize {
            what: "scaling corpus grids",
        });
    }
    for grid in corpus {
        shape.check(grid)?;
    }
    Ok(shape)
}

fn flatten(grid: &[Vec<f64>]) -> Result<(Shape, Vec<f64>)> {
    let shape = corpus_shape(&[grid])?;
    Ok((shape, grid.iter().flatten().cloned().collect()))
}

fn fitted(factors: &Option<Affine>) -> Result<&Affine> {
    factors.as_ref().ok_or(Error::UnfittedScale)
}

/// Min-max scaling into `[0, 1]`.
#[derive(Clone, Debug, Default)]
pub struct NormalScale {
    factors: Option<Affine>,
}

impl NormalScale {
    pub fn new() -> Self {
        NormalScale::default()
    }

    /// Creates a fitted scale from explicit per-element bounds.
    pub fn from_bounds(mins: &[Vec<f64>], maxes: &[Vec<f64>]) -> Result<Self> {
        let (shape, mins) = flatten(mins)?;
        let (_, maxes) = flatten_as(shape, maxes)?;
        let width = maxes.iter().zip(&mins).map(|(max, min)| max - min).collect();
        Ok(NormalScale {
            factors: Some(Affine::new(shape, mins, width)?),
        })
    }
}

impl Scale for NormalScale {
    fn fit(&mut self, corpus: &[&[Vec<f64>]]) -> Result<()> {
        let (shape, mins, maxes) = bounds(corpus)?;
        let width = maxes.iter().zip(&mins).map(|(max, min)| max - min).collect();
        self.factors = Some(Affine::new(shape, mins, width)?);
        Ok(())
    }

    fn scale_down(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.down(grid)
    }

    fn scale_up(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.up(grid)
    }

    fn is_fitted(&self) -> bool {
        self.factors.is_some()
    }
}

/// Min-max scaling into `[-1, 1]`.
#[derive(Clone, Debug, Default)]
pub struct SymmetricNormalScale {
    factors: Option<Affine>,
}

impl SymmetricNormalScale {
    pub fn new() -> Self {
        SymmetricNormalScale::default()
    }

    /// Creates a fitted scale from explicit per-element bounds.
    pub fn from_bounds(mins: &[Vec<f64>], maxes: &[Vec<f64>]) -> Result<Self> {
        let (shape, mins) = flatten(mins)?;
        let (_, maxes) = flatten_as(shape, maxes)?;
        Ok(SymmetricNormalScale {
            factors: Some(symmetric(shape, &mins, &maxes)?),
        })
    }
}

fn symmetric(shape: Shape, mins: &[f64], maxes: &[f64]) -> Result<Affine> {
    let shift = maxes.iter().zip(mins).map(|(max, min)| (max + min) / 2.0).collect();
    let width = maxes.iter().zip(mins).map(|(max, min)| (max - min) / 2.0).collect();
    Affine::new(shape, shift, width)
}

impl Scale for SymmetricNormalScale {
    fn fit(&mut self, corpus: &[&[Vec<f64>]]) -> Result<()> {
        let (shape, mins, maxes) = bounds(corpus)?;
        self.factors = Some(symmetric(shape, &mins, &maxes)?);
        Ok(())
    }

    fn scale_down(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.down(grid)
    }

    fn scale_up(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.up(grid)
    }

    fn is_fitted(&self) -> bool {
        self.factors.is_some()
    }
}

/// [Standardization](https://en.wikipedia.org/wiki/Standard_score) to zero
/// mean and unit population standard deviation.
#[derive(Clone, Debug, Default)]
pub struct StandardScale {
    factors: Option<Affine>,
}

impl StandardScale {
    pub fn new() -> Self {
        StandardScale::default()
    }

    /// Creates a fitted scale from explicit per-element moments.
    pub fn from_moments(means: &[Vec<f64>], std_devs: &[Vec<f64>]) -> Result<Self> {
        let (shape, means) = flatten(means)?;
        let (_, std_devs) = flatten_as(shape, std_devs)?;
        Ok(StandardScale {
            factors: Some(Affine::new(shape, means, std_devs)?),
        })
    }
}

impl Scale for StandardScale {
    fn fit(&mut self, corpus: &[&[Vec<f64>]]) -> Result<()> {
        let shape = corpus_shape(corpus)?;
        let count = corpus.len() as f64;
        let mut means = vec![0.0; shape.len()];
        for grid in corpus {
            for (mean, &value) in means.iter_mut().zip(grid.iter().flatten()) {
                *mean += value / count;
            }
        }
        let mut variances = vec![0.0; shape.len()];
        for grid in corpus {
            for (i, &value) in grid.iter().flatten().enumerate() {
                let diff = value - means[i];
                variances[i] += diff * diff / count;
            }
        }
        let std_devs = variances.into_iter().map(f64::sqrt).collect();
        self.factors = Some(Affine::new(shape, means, std_devs)?);
        Ok(())
    }

    fn scale_down(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.down(grid)
    }

    fn scale_up(&self, grid: &[Vec<f64>]) -> Result<Grid> {
        fitted(&self.factors)?.up(grid)
    }

    fn is_fitted(&self) -> bool {
        self.factors.is_some()
    }
}

fn flatten_as(shape: Shape, grid: &[Vec<f64>]) -> Result<(Shape, Vec<f64>)> {
    shape.check(grid)?;
    Ok((shape, grid.iter().flatten().cloned().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corpus() -> Vec<Grid> {
        vec![
            vec![vec![0.0, 10.0], vec![-4.0, 1.0]],
            vec![vec![2.0, 30.0], vec![4.0, 2.0]],
            vec![vec![4.0, 20.0], vec![0.0, 6.0]],
        ]
    }

    fn refs(corpus: &[Grid]) -> Vec<&[Vec<f64>]> {
        corpus.iter().map(|grid| grid.as_slice()).collect()
    }

    #[test]
    fn normal_range() {
        let corpus = corpus();
        let mut scale = NormalScale::new();
        scale.fit(&refs(&corpus)).unwrap();
        let scaled = scale.scale_down(&corpus[1]).unwrap();
        assert_eq!(scaled, vec![vec![0.5, 1.0], vec![1.0, 0.2]]);
        let scaled = scale.scale_down(&corpus[0]).unwrap();
        assert_eq!(scaled, vec![vec![0.0, 0.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn symmetric_range() {
        let corpus = corpus();
        let mut scale = SymmetricNormalScale::new();
        scale.fit(&refs(&corpus)).unwrap();
        let scaled = scale.scale_down(&corpus[1]).unwrap();
        assert_eq!(scaled[0], vec![0.0, 1.0]);
        assert_eq!(scale.scale_down(&corpus[0]).unwrap()[0][0], -1.0);
    }

    #[test]
    fn standard_moments() {
        let corpus = corpus();
        let mut scale = StandardScale::new();
        scale.fit(&refs(&corpus)).unwrap();
        let scaled: Vec<Grid> = corpus
            .iter()
            .map(|grid| scale.scale_down(grid).unwrap())
            .collect();
        for channel in 0..2 {
            for position in 0..2 {
                let values: Vec<f64> =
                    scaled.iter().map(|grid| grid[channel][position]).collect();
                let mean = values.iter().sum::<f64>() / 3.0;
                let variance =
                    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / 3.0;
                assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
                assert_relative_eq!(variance, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn round_trips() {
        let corpus = corpus();
        let mut scales: Vec<Box<dyn Scale>> = vec![
            Box::new(NullScale),
            Box::new(NormalScale::new()),
            Box::new(SymmetricNormalScale::new()),
            Box::new(StandardScale::new()),
        ];
        let sample = vec![vec![3.0, -7.5], vec![12.0, 0.25]];
        for scale in &mut scales {
            scale.fit(&refs(&corpus)).unwrap();
            let restored = scale.scale_up(&scale.scale_down(&sample).unwrap()).unwrap();
            for (a, e) in restored.iter().flatten().zip(sample.iter().flatten()) {
                assert_relative_eq!(a, e, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn fit_failures() {
        let mut scale = NormalScale::new();
        assert!(matches!(scale.fit(&[]), Err(Error::ZeroSize { .. })));

        let ragged = vec![vec![vec![1.0, 2.0]], vec![vec![1.0]]];
        assert!(matches!(
            scale.fit(&refs(&ragged)),
            Err(Error::ShapeMismatch { .. })
        ));

        let flat = vec![vec![vec![1.0, 2.0]], vec![vec![1.0, 3.0]]];
        assert!(matches!(
            scale.fit(&refs(&flat)),
            Err(Error::InvalidFactor(_))
        ));
        assert!(matches!(
            StandardScale::new().fit(&refs(&flat)),
            Err(Error::InvalidFactor(_))
        ));
        assert!(!scale.is_fitted());
    }

    #[test]
    fn scaling_failures() {
        let scale = StandardScale::new();
        assert!(matches!(
            scale.scale_down(&[vec![1.0]]),
            Err(Error::UnfittedScale)
        ));
        let mut scale = NormalScale::new();
        scale.fit(&refs(&corpus())).unwrap();
        assert!(matches!(
            scale.scale_up(&[vec![1.0, 2.0]]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn explicit_factors() {
        let scale = NormalScale::from_bounds(&[vec![0.0, -1.0]], &[vec![2.0, 1.0]]).unwrap();
        assert_eq!(scale.scale_down(&[vec![1.0, 0.0]]).unwrap(), vec![vec![0.5, 0.5]]);
        let scale =
            SymmetricNormalScale::from_bounds(&[vec![0.0]], &[vec![4.0]]).unwrap();
        assert_eq!(scale.scale_down(&[vec![3.0]]).unwrap(), vec![vec![0.5]]);
        let scale = StandardScale::from_moments(&[vec![1.0]], &[vec![2.0]]).unwrap();
        assert_eq!(scale.scale_up(&[vec![1.5]]).unwrap(), vec![vec![4.0]]);
        assert!(matches!(
            NormalScale::from_bounds(&[vec![1.0]], &[vec![1.0]]),
            Err(Error::InvalidFactor(_))
        ));
        assert!(matches!(
            NormalScale::from_bounds(&[vec![1.0]], &[vec![1.0, 2.0]]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
