//! Structural and training configuration
//!
//! These are plain value types. A configuration source (a CLI, a file) deserializes or builds
//! them and hands them to [`crate::network::Network::from_config`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{activation::ActivationKind, init::InitKind, loss::LossKind, optim::OptimizerKind};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Network configuration has no layers")]
    NoLayers,
    #[error("Layer {index} has zero units")]
    EmptyLayer { index: usize },
    #[error("Layer {index} has dropout rate {rate}, expected a value in [0, 1]")]
    InvalidDropout { index: usize, rate: f64 },
    #[error("Learning rate must be positive and finite, got {0}")]
    InvalidLearningRate(f64),
    #[error("Batch size must be positive")]
    ZeroBatchSize,
    #[error("Validation split must be in [0, 1), got {0}")]
    InvalidValidationSplit(f64),
}

/// Describes one layer to append to a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub size: usize,
    pub activation: ActivationKind,
    pub dropout_rate: f64,
    pub weight_init: InitKind,
    pub name: String,
    pub trainable: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            size: 1,
            activation: ActivationKind::default(),
            dropout_rate: 0.0,
            weight_init: InitKind::default(),
            name: String::new(),
            trainable: true,
        }
    }
}

impl LayerConfig {
    pub fn new(size: usize, activation: ActivationKind) -> Self {
        Self {
            size,
            activation,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dropout(mut self, dropout_rate: f64) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    pub fn with_init(mut self, weight_init: InitKind) -> Self {
        self.weight_init = weight_init;
        self
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }
}

/// Hyperparameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// fraction of the samples held out for validation
    pub validation_split: f64,
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 32,
            epochs: 100,
            validation_split: 0.2,
            shuffle: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ConfigError::InvalidValidationSplit(self.validation_split));
        }
        Ok(())
    }
}

/// Full description of a network: its layers in order (input first) and training setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
    pub layers: Vec<LayerConfig>,
    pub loss: LossKind,
    pub optimizer: OptimizerKind,
    pub training: TrainingConfig,
    /// seeds the network's generator, `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "Neural Network".to_string(),
            layers: vec![],
            loss: LossKind::default(),
            optimizer: OptimizerKind::default(),
            training: TrainingConfig::default(),
            seed: None,
        }
    }
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer: LayerConfig) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.size == 0 {
                return Err(ConfigError::EmptyLayer { index });
            }
            if !(0.0..=1.0).contains(&layer.dropout_rate) {
                return Err(ConfigError::InvalidDropout {
                    index,
                    rate: layer.dropout_rate,
                });
            }
        }
        self.training.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_config() -> NetworkConfig {
        NetworkConfig::new("xor")
            .with_layer(LayerConfig::new(2, ActivationKind::Identity))
            .with_layer(LayerConfig::new(4, ActivationKind::ReLU))
            .with_layer(LayerConfig::new(1, ActivationKind::Sigmoid))
    }

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.name, "Neural Network");
        assert_eq!(config.loss, LossKind::MeanSquaredError);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.training.learning_rate, 0.001);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.epochs, 100);
        assert!(config.training.shuffle);

        let layer = LayerConfig::default();
        assert_eq!(layer.activation, ActivationKind::ReLU);
        assert_eq!(layer.weight_init, InitKind::Xavier);
        assert!(layer.trainable);
    }

    #[test]
    fn test_validate() {
        assert_eq!(xor_config().validate(), Ok(()));
        assert_eq!(NetworkConfig::new("empty").validate(), Err(ConfigError::NoLayers));

        let config = xor_config().with_layer(LayerConfig::new(0, ActivationKind::ReLU));
        assert_eq!(config.validate(), Err(ConfigError::EmptyLayer { index: 3 }));

        let config = xor_config().with_layer(LayerConfig::new(2, ActivationKind::ReLU).with_dropout(-0.1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDropout { index: 3, rate: -0.1 })
        );

        let config = xor_config().with_training(TrainingConfig {
            learning_rate: 0.0,
            ..Default::default()
        });
        assert_eq!(config.validate(), Err(ConfigError::InvalidLearningRate(0.0)));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "name": "partial",
            "layers": [{ "size": 3 }, { "size": 2, "activation": "softmax", "weight_init": "he" }],
            "loss": "cross-entropy",
            "seed": 7
        }"#;
        let config: NetworkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "partial");
        assert_eq!(config.layers[0], LayerConfig::new(3, ActivationKind::ReLU));
        assert_eq!(config.layers[1].activation, ActivationKind::Softmax);
        assert_eq!(config.layers[1].weight_init, InitKind::He);
        assert_eq!(config.loss, LossKind::CrossEntropy);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.training, TrainingConfig::default());
    }
}
