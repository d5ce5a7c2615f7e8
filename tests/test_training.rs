//! End-to-end tests: building networks by hand and from configuration
//! files, scaling data, and training.

use approx::assert_relative_eq;
use neurons_kernel::activator::Activator;
use neurons_kernel::config::load_config;
use neurons_kernel::cost::Cost;
use neurons_kernel::dataset::{DataSet, Example};
use neurons_kernel::feed_forward::Network;
use neurons_kernel::layers::{Kernel, KernelShape, Layer};
use neurons_kernel::node::Shape;
use neurons_kernel::regularizer::Regularizer;
use neurons_kernel::scale::{Scale, StandardScale};
use neurons_kernel::trainer::{Logging, StopCondition, Trainer};
use neurons_kernel::{Error, ErrorKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;

#[test]
fn test_single_unit_step() {
    let input = Layer::input(Shape::new(1, 1), Activator::Identity).unwrap();
    let kernel = Kernel::with_weights(KernelShape::new(1, vec![0], 1), &[0.5, 0.1]).unwrap();
    let hidden = Layer::new(Shape::new(1, 1), Activator::ReLU, vec![kernel]).unwrap();
    let mut network = Network::new(vec![input, hidden]).unwrap();

    let cost = network
        .train_example(&[vec![2.0]], &[vec![1.0]], &Cost::Quadratic)
        .unwrap();
    assert_relative_eq!(cost, 0.005, epsilon = 1e-12);
    network.correct(1.0, &Regularizer::Null, 0.0).unwrap();

    let weights = &network.snapshot().layers[1][0];
    assert_relative_eq!(weights[0], 0.3, epsilon = 1e-12);
    assert_relative_eq!(weights[1], 0.0, epsilon = 1e-12);
}

#[test]
fn test_out_of_bounds_field_fails_at_assembly() {
    let mut rng = StdRng::seed_from_u64(0);
    let input = Layer::input(Shape::new(1, 5), Activator::Identity).unwrap();
    let conv = Layer::convolutional(
        Shape::new(1, 3),
        Activator::ReLU,
        KernelShape::new(1, vec![0, 1, 2], 2),
        &mut rng,
    )
    .unwrap();
    let err = Network::new(vec![input, conv]).unwrap_err();
    assert!(matches!(err, Error::ReceptiveFieldOutOfBounds { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

/// A pulse is "late" if its peak sits in the second half of the signal.
fn pulse_data(seed: u64) -> DataSet {
    let mut data = DataSet::new(seed);
    for peak in 0..8 {
        for &height in &[50.0, 100.0, 150.0] {
            let signal = (0..8)
                .map(|p| if p == peak { height } else { 10.0 })
                .collect();
            let label = if peak >= 4 { 1.0 } else { 0.0 };
            data.add_example(Example::new(vec![signal], vec![vec![label]]).unwrap())
                .unwrap();
        }
    }
    data
}

const PULSE_CONFIG: &str = r#"{
    "network": {
        "seed": 17,
        "input": { "channels": 1, "positions": 8 },
        "layers": [
            { "channels": 4, "activation": "tanh", "receptive_field": [0, 1, 2, 3], "stride": 2 },
            { "channels": 1, "activation": "logistic" }
        ]
    },
    "training": {
        "learning_rate": 0.3,
        "batch_size": 4,
        "cost": "cross_entropy",
        "regularizer": "l2",
        "regularization_param": 0.0001,
        "epochs": 500
    }
}"#;

#[test]
fn test_train_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.json");
    fs::write(&path, PULSE_CONFIG).unwrap();
    let config = load_config(&path).unwrap();

    let mut data = pulse_data(5);
    let mut scale = StandardScale::new();
    scale.fit(&data.raws()).unwrap();
    data.scale_raws(&scale).unwrap();

    let network = Network::from_config(&config.network).unwrap();
    assert_eq!(network.input_shape(), Shape::new(1, 8));
    assert_eq!(network.layers()[1].shape(), Shape::new(4, 3));
    assert_eq!(network.output_shape(), Shape::new(1, 1));

    let mut network = Trainer::from_config(network, &config.training)
        .unwrap()
        .logging(Logging::Silent)
        .train(&mut data)
        .unwrap();

    let mut correct = 0;
    for example in data.examples() {
        let out = network.run(example.raw()).unwrap()[0][0];
        if (out > 0.5) == (example.label()[0][0] > 0.5) {
            correct += 1;
        }
    }
    assert!(correct >= data.len() * 9 / 10, "{} of {}", correct, data.len());
}

#[test]
fn test_same_seed_same_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.json");
    fs::write(&path, PULSE_CONFIG).unwrap();
    let config = load_config(&path).unwrap();

    let first = Network::from_config(&config.network).unwrap();
    let second = Network::from_config(&config.network).unwrap();
    assert_eq!(first.snapshot(), second.snapshot());

    let train = |network: Network| {
        Trainer::new(network)
            .logging(Logging::Silent)
            .stop_condition(StopCondition::Iterations(3))
            .train(&mut pulse_data(1))
            .unwrap()
            .snapshot()
    };
    assert_eq!(train(first), train(second));
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, PULSE_CONFIG.replace("\"stride\": 2", "\"stride\": 0")).unwrap();
    assert!(matches!(load_config(&path), Err(Error::InvalidConfig(_))));

    fs::write(&path, "{").unwrap();
    assert_eq!(load_config(&path).unwrap_err().kind(), ErrorKind::Io);
}

#[test]
fn test_unscaled_inputs_rejected_after_fit() {
    let data = pulse_data(2);
    let mut scale = StandardScale::new();
    assert!(matches!(
        scale.scale_down(data.examples()[0].raw()),
        Err(Error::UnfittedScale)
    ));
    scale.fit(&data.raws()).unwrap();
    assert!(matches!(
        scale.scale_down(&[vec![1.0; 4]]),
        Err(Error::ShapeMismatch { .. })
    ));
}
