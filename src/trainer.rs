//! Utilities for training neural networks.
//!
//! # Example
//!
//! Let's train a small network to compute the OR function:
//!
//! ```
//! # use neurons_kernel::activator::Activator;
//! # use neurons_kernel::cost::Cost;
//! # use neurons_kernel::dataset::{DataSet, Example};
//! # use neurons_kernel::feed_forward::Network;
//! # use neurons_kernel::layers::Layer;
//! # use neurons_kernel::node::Shape;
//! # use neurons_kernel::trainer::*;
//! # use rand::rngs::StdRng;
//! # use rand::SeedableRng;
//! let mut data = DataSet::new(1);
//! for &(a, b) in &[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
//!     let label = if a + b > 0.0 { 1.0 } else { 0.0 };
//!     data.add_example(Example::new(vec![vec![a, b]], vec![vec![label]])?)?;
//! }
//!
//! let mut rng = StdRng::seed_from_u64(2);
//! let input = Layer::input(Shape::new(1, 2), Activator::Identity)?;
//! let output = Layer::dense(1, input.shape(), Activator::Logistic, &mut rng)?;
//! let mut network = Trainer::new(Network::new(vec![input, output])?)
//!     .cost(Cost::CrossEntropy)
//!     .learning_rate(1.0)
//!     .logging(Logging::Silent)
//!     .stop_condition(StopCondition::Iterations(500))
//!     .train(&mut data)?;
//!
//! assert!(network.run(&[vec![0.0, 0.0]])?[0][0] < 0.5);
//! assert!(network.run(&[vec![1.0, 0.0]])?[0][0] > 0.5);
//! # Ok::<(), neurons_kernel::error::Error>(())
//! ```

use crate::config::TrainingConfig;
use crate::cost::Cost;
use crate::dataset::DataSet;
use crate::error::{Error, Result};
use crate::feed_forward::Network;
use crate::node::Shape;
use crate::regularizer::Regularizer;

use log::info;
use std::time::{Duration, Instant};

/// A builder for training networks.
#[derive(Debug)]
pub struct Trainer {
    network: Network,
    learning_mode: LearningMode,
    learning_rate: f64,
    cost: Cost,
    regularizer: Regularizer,
    regularization_param: f64,
    logging: Logging,
    stop_condition: StopCondition,
}

impl Trainer {
    /// Creates a new Trainer instance.
    ///
    /// The trainer is initialized with some default values. These defaults are:
    ///
    /// * A stochastic learning mode.
    /// * A learning rate of 0.1.
    /// * A quadratic cost and no regularization.
    /// * Stops after 1000 training iterations.
    /// * Logs on training completion.
    pub fn new(network: Network) -> Self {
        Trainer {
            network,
            learning_mode: LearningMode::Stochastic,
            learning_rate: 0.1,
            cost: Cost::Quadratic,
            regularizer: Regularizer::Null,
            regularization_param: 0.0,
            logging: Logging::Completion,
            stop_condition: StopCondition::Iterations(1000),
        }
    }

    /// Creates a trainer for `network` with hyperparameters from `config`.
    pub fn from_config(network: Network, config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        let learning_mode = match config.batch_size {
            Some(size) if size > 1 => LearningMode::Batch(size),
            _ => LearningMode::Stochastic,
        };
        let stop_condition = match config.epochs {
            Some(epochs) => StopCondition::Iterations(epochs),
            None => StopCondition::ErrorThreshold(
                config.error_threshold.unwrap_or_default(),
            ),
        };
        let logging = match config.log_every {
            Some(freq) => Logging::Iterations(freq),
            None => Logging::Completion,
        };
        Ok(Trainer::new(network)
            .learning_mode(learning_mode)
            .learning_rate(config.learning_rate)
            .cost(config.cost)
            .regularizer(config.regularizer, config.regularization_param)
            .logging(logging)
            .stop_condition(stop_condition))
    }

    /// Sets the `LearningMode` to use for training.
    pub fn learning_mode(mut self, mode: LearningMode) -> Self {
        self.learning_mode = mode;
        self
    }

    /// Sets the learning rate to use during gradient descent.
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    /// Sets the cost function seeding the output error.
    pub fn cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }

    /// Sets the weight penalty and its strength.
    pub fn regularizer(mut self, regularizer: Regularizer, param: f64) -> Self {
        self.regularizer = regularizer;
        self.regularization_param = param;
        self
    }

    /// Sets the type of logging to be emitted during training.
    pub fn logging(mut self, logging: Logging) -> Self {
        self.logging = logging;
        self
    }

    /// Sets the condition to finish training.
    pub fn stop_condition<C>(mut self, condition: C) -> Self
    where
        C: Into<StopCondition>,
    {
        self.stop_condition = condition.into();
        self
    }

    /// Trains the network on the examples in `data`.
    ///
    /// Each iteration is one epoch: examples are drawn without replacement
    /// in batches, and the network is corrected after every full batch.
    /// Examples left over once no full batch remains wait for the next
    /// epoch's draw.
    ///
    /// Returns:
    ///   The trained network, or an error if invalid training parameters
    ///   were provided.
    pub fn train(mut self, data: &mut DataSet) -> Result<Network> {
        self.validate(data)?;

        let start_time = Instant::now();
        let batch_size = match self.learning_mode {
            LearningMode::Stochastic => 1,
            LearningMode::Batch(size) => size,
        };
        let mut iteration = 0;
        let mut training_error;
        loop {
            training_error = 0.0;
            let mut seen = 0;
            data.reset_epoch_buffer();
            while data.has_next_batch(batch_size) {
                for _ in 0..batch_size {
                    let example = data.next_example()?;
                    training_error += self.network.train_example(
                        example.raw(),
                        example.label(),
                        &self.cost,
                    )?;
                    seen += 1;
                }
                self.network.correct(
                    self.learning_rate,
                    &self.regularizer,
                    self.regularization_param,
                )?;
            }
            training_error /= seen as f64;
            iteration += 1;

            self.logging.iteration(iteration, training_error);
            if self
                .stop_condition
                .should_stop(iteration, training_error, start_time)
            {
                break;
            }
        }
        self.logging
            .completion(iteration, training_error, start_time);
        Ok(self.network)
    }

    /// Verifies that the training parameters fit `data`, returning an
    /// error if something is wrong.
    fn validate(&self, data: &DataSet) -> Result<()> {
        let first = data.examples().first().ok_or(Error::ZeroSize {
            what: "training examples",
        })?;
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(
                "learning rate must be positive".into(),
            ));
        }
        if let LearningMode::Batch(size) = self.learning_mode {
            if size == 0 {
                return Err(Error::ZeroSize { what: "batch size" });
            }
            if size > data.len() {
                return Err(Error::SizeConflict {
                    what: "batch size at most the example count",
                    expected: data.len(),
                    found: size,
                });
            }
        }
        check_shape(self.network.input_shape(), first.raw_shape())?;
        check_shape(self.network.output_shape(), first.label_shape())
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

/// The learning mode to use for training
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LearningMode {
    /// Apply weight updates after every training example
    Stochastic,
    /// Apply weights updates in batches of the provided size
    ///
    /// Must not exceed the total number of training examples.
    Batch(usize),
}

/// Logging frequency to use during training
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Logging {
    /// No logs will be emitted
    Silent,
    /// A summary will be logged at completion
    Completion,
    /// A summary will be logged after every `n` training iterations
    Iterations(usize),
}

impl Logging {
    /// Performs logging at the current `iteration` of training.
    fn iteration(&self, iteration: usize, training_error: f64) {
        if let Logging::Iterations(freq) = *self {
            if freq > 0 && iteration % freq == 0 {
                info!("iteration {}: mean cost={}", iteration, training_error);
            }
        }
    }

    /// Performs logging at the end of training.
    fn completion(
        &self,
        iterations: usize,
        training_error: f64,
        start_time: Instant,
    ) {
        if let Logging::Silent = *self {
            return;
        }
        info!(
            "ran {} iterations in {:.3} seconds, final mean cost={}",
            iterations,
            start_time.elapsed().as_secs_f64(),
            training_error
        );
    }
}

/// When to stop training
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StopCondition {
    /// Stops after the provided number of training iterations
    Iterations(usize),
    /// Stops when the training error drops below the provided threshold
    ErrorThreshold(f64),
    /// Stops after the provided duration
    Duration(Duration),
}

impl From<Duration> for StopCondition {
    fn from(duration: Duration) -> StopCondition {
        StopCondition::Duration(duration)
    }
}

impl StopCondition {
    /// Returns true if training is complete.
    fn should_stop(
        &self,
        iteration: usize,
        training_error: f64,
        start_time: Instant,
    ) -> bool {
        match *self {
            StopCondition::Iterations(iterations) => iteration >= iterations,
            StopCondition::ErrorThreshold(threshold) => training_error < threshold,
            StopCondition::Duration(duration) => start_time.elapsed() > duration,
        }
    }
}
