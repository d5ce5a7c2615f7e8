//! A feed-forward neural network engine built from individual nodes and
//! weighted connections, with strided, weight-sharing kernels.

pub mod activator;
pub mod config;
pub mod connection;
pub mod cost;
pub mod dataset;
pub mod error;
pub mod feed_forward;
pub mod layers;
pub mod node;
pub mod regularizer;
pub mod scale;
pub mod trainer;

pub use crate::error::{Error, ErrorKind, Result};
