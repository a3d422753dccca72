//! A small library for building, training and persisting feedforward neural networks with
//! pluggable activations, losses and weight initializers.
//!
//! ```no_run
//! use ffnet::{activation::ActivationKind, layer::Layer, network::Network, training::TrainOptions};
//!
//! let mut network = Network::<f32>::with_seed("xor", 0);
//! network.add_layer(Layer::new(2, ActivationKind::Identity, "input"));
//! network.add_layer(Layer::new(4, ActivationKind::ReLU, "hidden"));
//! network.add_layer(Layer::new(1, ActivationKind::Sigmoid, "output"));
//! network.set_learning_rate(0.1);
//!
//! let inputs = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
//! let targets = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
//! network.train(&inputs, &targets, TrainOptions::new(1000, 4)).unwrap();
//! let prediction = network.predict(&[1.0, 0.0]).unwrap();
//! ```

pub mod activation;
pub mod config;
pub mod dataloader;
pub mod datasets;
pub mod init;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optim;
pub mod persist;
pub mod scalar;
pub mod training;
pub mod unit;
