//! JSON persistence of a network's structure, parameters and unit state
//!
//! Enum kinds are stored as their integer codes. Every field of a document is optional when
//! loading: a missing field keeps the network's current value (or the default for new layers
//! and units).

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::{
    activation::ActivationKind,
    layer::Layer,
    loss::LossKind,
    network::{Network, NetworkError},
    optim::OptimizerKind,
    scalar::Scalar,
    unit::Unit,
};

const INDENT: &[u8] = b"    ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Scalar")]
pub struct NetworkDocument<T> {
    pub name: Option<String>,
    pub learning_rate: Option<T>,
    pub loss_type: Option<i64>,
    pub optimizer_type: Option<i64>,
    pub layers: Option<Vec<LayerDocument<T>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Scalar")]
pub struct LayerDocument<T> {
    pub name: Option<String>,
    pub size: Option<usize>,
    pub activation_type: Option<i64>,
    pub dropout_rate: Option<T>,
    pub trainable: Option<bool>,
    pub neurons: Option<Vec<UnitDocument<T>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Scalar")]
pub struct UnitDocument<T> {
    pub id: Option<usize>,
    pub activation: Option<T>,
    pub bias: Option<T>,
    pub weighted_input: Option<T>,
    pub gradient: Option<T>,
    pub delta: Option<T>,
    pub trainable: Option<bool>,
    pub name: Option<String>,
    pub input_weights: Option<Vec<T>>,
}

impl<T: Scalar> From<&Unit<T>> for UnitDocument<T> {
    fn from(unit: &Unit<T>) -> Self {
        Self {
            id: Some(unit.id()),
            activation: Some(unit.activation()),
            bias: Some(unit.bias()),
            weighted_input: Some(unit.pre_activation()),
            gradient: Some(unit.gradient()),
            delta: Some(unit.error_term()),
            trainable: Some(unit.is_trainable()),
            name: Some(unit.name().to_string()),
            input_weights: Some(unit.weights().to_vec()),
        }
    }
}

impl<T: Scalar> UnitDocument<T> {
    fn into_unit(self, index: usize) -> Unit<T> {
        let mut unit = Unit::new(self.id.unwrap_or(index));
        if let Some(activation) = self.activation {
            unit.set_activation(activation);
        }
        if let Some(bias) = self.bias {
            unit.set_bias(bias);
        }
        if let Some(weighted_input) = self.weighted_input {
            unit.set_pre_activation(weighted_input);
        }
        if let Some(gradient) = self.gradient {
            unit.set_gradient(gradient);
        }
        if let Some(delta) = self.delta {
            unit.set_error_term(delta);
        }
        if let Some(trainable) = self.trainable {
            unit.set_trainable(trainable);
        }
        if let Some(name) = self.name {
            unit.set_name(name);
        }
        if let Some(weights) = self.input_weights {
            unit.set_weights(weights);
        }
        unit
    }
}

impl<T: Scalar> From<&Layer<T>> for LayerDocument<T> {
    fn from(layer: &Layer<T>) -> Self {
        Self {
            name: Some(layer.name().to_string()),
            size: Some(layer.size()),
            activation_type: Some(layer.activation_kind().code()),
            dropout_rate: Some(layer.dropout_rate()),
            trainable: Some(layer.is_trainable()),
            neurons: Some(layer.units().iter().map(UnitDocument::from).collect()),
        }
    }
}

impl<T: Scalar> LayerDocument<T> {
    fn into_layer(self) -> Result<Layer<T>, NetworkError> {
        let activation = match self.activation_type {
            Some(code) => ActivationKind::from_code(code).ok_or(NetworkError::UnknownCode {
                kind: "activation",
                code,
            })?,
            None => ActivationKind::default(),
        };
        let units = match self.neurons {
            Some(neurons) => {
                if let Some(size) = self.size.filter(|&size| size != neurons.len()) {
                    log::warn!(
                        "Layer '{}' declares size {} but lists {} neurons, using the neurons",
                        self.name.as_deref().unwrap_or_default(),
                        size,
                        neurons.len()
                    );
                }
                neurons
                    .into_iter()
                    .enumerate()
                    .map(|(i, unit)| unit.into_unit(i))
                    .collect()
            }
            None => (0..self.size.unwrap_or(1)).map(Unit::new).collect(),
        };
        let mut layer = Layer::from_units(
            units,
            self.name.unwrap_or_default(),
            activation,
            T::zero(),
            self.trainable.unwrap_or(true),
        );
        if let Some(rate) = self.dropout_rate {
            layer.set_dropout_rate(rate);
        }
        Ok(layer)
    }
}

impl<T: Scalar> Network<T> {
    pub fn to_document(&self) -> NetworkDocument<T> {
        NetworkDocument {
            name: Some(self.name().to_string()),
            learning_rate: Some(self.learning_rate()),
            loss_type: Some(self.loss_kind().code()),
            optimizer_type: Some(self.optimizer_kind().code()),
            layers: Some(self.layers().iter().map(LayerDocument::from).collect()),
        }
    }

    /// Serializes the network as pretty-printed JSON with 4-space indentation
    pub fn to_json(&self) -> Result<String, NetworkError> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;
        String::from_utf8(buf).map_err(|e| NetworkError::Io(std::io::Error::other(e)))
    }

    fn write_json<W: Write>(&self, writer: W) -> Result<(), NetworkError> {
        let mut serializer =
            serde_json::Serializer::with_formatter(writer, PrettyFormatter::with_indent(INDENT));
        self.to_document().serialize(&mut serializer)?;
        Ok(())
    }

    /// Loads the state described by `json` into this network. On error the network is untouched.
    pub fn from_json(&mut self, json: &str) -> Result<(), NetworkError> {
        let document = serde_json::from_str::<NetworkDocument<T>>(json)?;
        self.apply_document(document)
    }

    /// Applies a document. Everything is decoded before the network is modified, so an unknown
    /// code leaves it as it was.
    pub fn apply_document(&mut self, document: NetworkDocument<T>) -> Result<(), NetworkError> {
        let loss = document
            .loss_type
            .map(|code| {
                LossKind::from_code(code).ok_or(NetworkError::UnknownCode { kind: "loss", code })
            })
            .transpose()?;
        let optimizer = document
            .optimizer_type
            .map(|code| {
                OptimizerKind::from_code(code).ok_or(NetworkError::UnknownCode {
                    kind: "optimizer",
                    code,
                })
            })
            .transpose()?;
        let layers = document
            .layers
            .map(|layers| {
                layers
                    .into_iter()
                    .map(LayerDocument::into_layer)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        if let Some(name) = document.name {
            self.set_name(name);
        }
        if let Some(learning_rate) = document.learning_rate {
            self.set_learning_rate(learning_rate);
        }
        if let Some(loss) = loss {
            self.set_loss_kind(loss);
        }
        if let Some(optimizer) = optimizer {
            self.set_optimizer_kind(optimizer);
        }
        if let Some(layers) = layers {
            self.replace_layers(layers);
            self.warn_on_shape_mismatch();
        }
        Ok(())
    }

    fn warn_on_shape_mismatch(&self) {
        for (i, pair) in self.layers().windows(2).enumerate() {
            let prev_size = pair[0].size();
            if let Some(unit) = pair[1].units().iter().find(|u| u.n_inputs() != prev_size) {
                log::warn!(
                    "Layer {} unit {} of network '{}' has {} input weights, previous layer has {} units",
                    i + 1,
                    unit.id(),
                    self.name(),
                    unit.n_inputs(),
                    prev_size
                );
            }
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        let path = path.as_ref();
        let result = File::create(path)
            .map_err(NetworkError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                self.write_json(&mut writer)?;
                writer.flush()?;
                Ok(())
            });
        match &result {
            Ok(()) => log::info!("Saved network '{}' to file: {}", self.name(), path.display()),
            Err(e) => log::error!("Failed to save network to {}: {}", path.display(), e),
        }
        result
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        let path = path.as_ref();
        let result = File::open(path)
            .map_err(NetworkError::from)
            .and_then(|file| {
                let document: NetworkDocument<T> =
                    serde_json::from_reader(BufReader::new(file))?;
                self.apply_document(document)
            });
        match &result {
            Ok(()) => log::info!("Loaded network from file: {}", path.display()),
            Err(e) => log::error!("Failed to load network from {}: {}", path.display(), e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use serde_json::Value;

    use crate::{datasets::Dataset, training::TrainOptions};

    use super::*;

    fn trained_network() -> Network<f64> {
        let mut network = Network::with_seed("persisted", 9);
        network.add_layer(Layer::new(2, ActivationKind::Identity, "input"));
        let mut hidden = Layer::new(3, ActivationKind::Tanh, "hidden");
        hidden.set_dropout_rate(0.25);
        network.add_layer(hidden);
        network.add_layer(Layer::new(2, ActivationKind::Softmax, "output"));
        network.set_learning_rate(0.05);
        network.set_loss_kind(LossKind::CrossEntropy);
        network.set_optimizer_kind(OptimizerKind::RMSprop);

        let mut rng = Pcg64Mcg::seed_from_u64(0);
        let (inputs, targets) = Dataset::Line.generate::<f64, _>(20, &mut rng);
        network
            .train(&inputs, &targets, TrainOptions::new(3, 5))
            .unwrap();
        network
    }

    fn assert_same_parameters(a: &Network<f64>, b: &Network<f64>) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.learning_rate(), b.learning_rate());
        assert_eq!(a.loss_kind(), b.loss_kind());
        assert_eq!(a.optimizer_kind(), b.optimizer_kind());
        assert_eq!(a.layer_count(), b.layer_count());
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.name(), lb.name());
            assert_eq!(la.size(), lb.size());
            assert_eq!(la.activation_kind(), lb.activation_kind());
            assert_eq!(la.dropout_rate(), lb.dropout_rate());
            assert_eq!(la.is_trainable(), lb.is_trainable());
            assert_eq!(la.biases(), lb.biases());
            assert_eq!(la.weight_matrix(), lb.weight_matrix());
        }
    }

    #[test]
    fn test_json_round_trip() {
        let network = trained_network();
        let json = network.to_json().unwrap();
        let mut restored = Network::<f64>::new("placeholder");
        restored.from_json(&json).unwrap();
        assert_same_parameters(&network, &restored);
        assert_eq!(network.layers()[1].units(), restored.layers()[1].units());
    }

    #[test]
    fn test_json_layout() {
        let network = trained_network();
        let json = network.to_json().unwrap();
        assert!(json.contains("\n    \"name\": \"persisted\""));

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["loss_type"], 1);
        assert_eq!(value["optimizer_type"], 2);
        assert_eq!(value["learning_rate"], 0.05);
        let hidden = &value["layers"][1];
        assert_eq!(hidden["size"], 3);
        assert_eq!(hidden["activation_type"], 3);
        assert_eq!(hidden["dropout_rate"], 0.25);
        assert_eq!(hidden["trainable"], true);
        let unit = &hidden["neurons"][0];
        for key in [
            "id",
            "activation",
            "bias",
            "weighted_input",
            "gradient",
            "delta",
            "trainable",
            "name",
            "input_weights",
        ] {
            assert!(unit.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(unit["input_weights"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_partial_document_keeps_current_values() {
        let mut network = trained_network();
        let before = network.to_json().unwrap();
        network.from_json(r#"{ "learning_rate": 0.5 }"#).unwrap();
        assert_eq!(network.learning_rate(), 0.5);
        assert_eq!(network.name(), "persisted");
        assert_eq!(network.layer_count(), 3);

        network.set_learning_rate(0.05);
        assert_eq!(network.to_json().unwrap(), before);
    }

    #[test]
    fn test_layers_without_neurons_use_size() {
        let mut network = Network::<f32>::with_seed("sized", 0);
        network
            .from_json(
                r#"{ "layers": [
                    { "size": 3, "activation_type": 0 },
                    { "name": "out", "activation_type": 2, "dropout_rate": 2.0 },
                    { "neurons": [{ "bias": 0.5 }, {}] }
                ] }"#,
            )
            .unwrap();
        assert_eq!(network.layer_count(), 3);
        assert_eq!(network.layer(0).unwrap().size(), 3);
        assert_eq!(network.layer(0).unwrap().activation_kind(), ActivationKind::Identity);

        let out = network.layer(1).unwrap();
        assert_eq!(out.size(), 1);
        assert_eq!(out.name(), "out");
        assert_eq!(out.activation_kind(), ActivationKind::Sigmoid);
        assert_eq!(out.dropout_rate(), 1.0);

        let last = network.layer(2).unwrap();
        assert_eq!(last.activation_kind(), ActivationKind::ReLU);
        assert_eq!(last.biases(), vec![0.5, 0.0]);
        assert_eq!(last.unit(1).unwrap().id(), 1);
    }

    #[test]
    fn test_neurons_take_precedence_over_size() {
        let mut network = Network::<f64>::with_seed("mismatched", 0);
        network
            .from_json(
                r#"{ "layers": [
                    { "name": "input", "size": 2, "activation_type": 0 },
                    { "name": "output", "size": 4, "neurons": [{ "input_weights": [0.5, -0.5] }] }
                ] }"#,
            )
            .unwrap();
        let output = network.layer(1).unwrap();
        assert_eq!(output.size(), 1);
        assert_eq!(output.weight_matrix(), vec![vec![0.5, -0.5]]);
        assert_eq!(network.forward(&[1.0, 1.0]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_failed_load_leaves_network_untouched() {
        let mut network = trained_network();
        let before = network.to_json().unwrap();

        assert!(matches!(
            network.from_json(r#"{ "name": "changed", "loss_type": 42 }"#),
            Err(NetworkError::UnknownCode { kind: "loss", code: 42 })
        ));
        assert!(matches!(
            network.from_json(r#"{ "name": "changed", "layers": [{ "activation_type": 9 }] }"#),
            Err(NetworkError::UnknownCode {
                kind: "activation",
                code: 9
            })
        ));
        assert!(matches!(
            network.from_json("{ not json"),
            Err(NetworkError::Json(_))
        ));
        assert_eq!(network.to_json().unwrap(), before);
    }

    #[test]
    fn test_file_round_trip() {
        let network = trained_network();
        let path = std::env::temp_dir().join(format!("ffnet_persist_{}.json", std::process::id()));
        network.save_to_file(&path).unwrap();

        let mut restored = Network::<f64>::new("placeholder");
        restored.load_from_file(&path).unwrap();
        assert_same_parameters(&network, &restored);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            restored.load_from_file(&path),
            Err(NetworkError::Io(_))
        ));
        assert_same_parameters(&network, &restored);
    }
}
