//! A feedforward network: ordered layers trained by backpropagation
//!
//! Layer 0 is the input layer, its activations are written directly from the caller's input and
//! its units carry no weights. Every later layer holds one weight per unit of its predecessor.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use thiserror::Error;

use crate::{
    config::{ConfigError, LayerConfig, NetworkConfig},
    dataloader::{DataLoader, DataLoaderError},
    init::InitKind,
    layer::{Layer, LayerError},
    loss::LossKind,
    optim::OptimizerKind,
    scalar::Scalar,
    training::{TrainOptions, TrainingHandle, TrainingHistory, TrainingOutcome},
    unit::Unit,
};

const DEFAULT_LEARNING_RATE: f64 = 0.001;
/// Epoch metrics are logged at `info` every this many epochs
const LOG_EVERY: usize = 10;

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Network has no layers")]
    EmptyNetwork,
    #[error("Network needs at least 2 layers, has {0}")]
    TooFewLayers(usize),
    #[error("Input size mismatch: expected {expected}, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error("Target size mismatch: network outputs {expected} values, got {got} targets")]
    TargetSizeMismatch { expected: usize, got: usize },
    #[error("Got {inputs} input samples but {targets} target samples")]
    SampleCountMismatch { inputs: usize, targets: usize },
    #[error("Layer index {index} out of range for a network of {len} layers")]
    LayerIndexOutOfRange { index: usize, len: usize },
    #[error("Batch size must be positive")]
    InvalidBatchSize,
    #[error("Cannot train on an empty dataset")]
    EmptyDataset,
    #[error("Unknown {kind} code {code}")]
    UnknownCode { kind: &'static str, code: i64 },
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Data(#[from] DataLoaderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A feedforward neural network
#[derive(Debug)]
pub struct Network<T> {
    name: String,
    layers: Vec<Layer<T>>,
    learning_rate: T,
    loss: LossKind,
    optimizer: OptimizerKind,
    control: TrainingHandle,
    /// enables dropout in forward passes, set for the duration of [`Network::train`]
    training_mode: bool,
    rng: Pcg64Mcg,
}

impl<T: Scalar> Network<T> {
    /// Creates an empty network with a generator seeded from the thread RNG
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rng(name.into(), Pcg64Mcg::from_rng(&mut rand::rng()))
    }

    /// Creates an empty network whose initialization, dropout and shuffling are reproducible
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(name.into(), Pcg64Mcg::seed_from_u64(seed))
    }

    fn with_rng(name: String, rng: Pcg64Mcg) -> Self {
        Self {
            name,
            layers: vec![],
            learning_rate: T::lit(DEFAULT_LEARNING_RATE),
            loss: LossKind::default(),
            optimizer: OptimizerKind::default(),
            control: TrainingHandle::new(),
            training_mode: false,
            rng,
        }
    }

    /// Builds a network from a validated configuration. Each layer is initialized with its own
    /// `weight_init` against the layer before it.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetworkError> {
        config.validate()?;
        let mut network = match config.seed {
            Some(seed) => Self::with_seed(config.name.clone(), seed),
            None => Self::new(config.name.clone()),
        };
        network.learning_rate = T::lit(config.training.learning_rate);
        network.loss = config.loss;
        network.optimizer = config.optimizer;
        for layer in &config.layers {
            network.add_layer_config(layer);
        }
        log::debug!(
            "Built network '{}' from config with {} layers",
            network.name,
            network.layers.len()
        );
        Ok(network)
    }

    /// Appends a layer, initializing its weights against the current last layer
    pub fn add_layer(&mut self, mut layer: Layer<T>) {
        if let Some(prev) = self.layers.last() {
            let init = layer.init_kind();
            layer.initialize_weights(prev.size(), init, &mut self.rng);
        }
        self.layers.push(layer);
        log::debug!(
            "Added layer to network '{}'. Total layers: {}",
            self.name,
            self.layers.len()
        );
    }

    pub fn add_layer_config(&mut self, config: &LayerConfig) {
        self.add_layer(Layer::from_config(config));
    }

    /// Removes the layer at `index`. Every layer after it is re-initialized against its new
    /// predecessor, so their trained weights are lost.
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer<T>, NetworkError> {
        if index >= self.layers.len() {
            log::warn!(
                "Attempted to remove layer {} from network with {} layers",
                index,
                self.layers.len()
            );
            return Err(NetworkError::LayerIndexOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        let removed = self.layers.remove(index);
        for i in index.max(1)..self.layers.len() {
            let prev_size = self.layers[i - 1].size();
            let layer = &mut self.layers[i];
            let init = layer.init_kind();
            layer.initialize_weights(prev_size, init, &mut self.rng);
        }
        log::debug!(
            "Removed layer {} from network '{}'. Total layers: {}",
            index,
            self.name,
            self.layers.len()
        );
        Ok(removed)
    }

    pub fn clear_layers(&mut self) {
        self.layers.clear();
        log::debug!("Cleared all layers from network '{}'", self.name);
    }

    /// Redraws the weights of every layer after the input layer with the same strategy
    pub fn initialize_weights(&mut self, kind: InitKind) {
        for i in 1..self.layers.len() {
            let prev_size = self.layers[i - 1].size();
            self.layers[i].initialize_weights(prev_size, kind, &mut self.rng);
        }
        log::debug!(
            "Initialized weights for network '{}' using {} initialization",
            self.name,
            kind
        );
    }

    /// Clears the transient state of every layer and the training control state. Weights are kept.
    pub fn reset(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.reset();
        }
        self.control.reset();
        self.training_mode = false;
        log::debug!("Reset network '{}'", self.name);
    }

    /// Runs the inputs through the network and returns the output layer's activations.
    /// Dropout is only applied while training.
    pub fn forward(&mut self, inputs: &[T]) -> Result<Vec<T>, NetworkError> {
        let Some(input_layer) = self.layers.first_mut() else {
            log::error!("Cannot perform forward pass on empty network");
            return Err(NetworkError::EmptyNetwork);
        };
        if inputs.len() != input_layer.size() {
            log::error!(
                "Input size {} doesn't match first layer size {}",
                inputs.len(),
                input_layer.size()
            );
            return Err(NetworkError::InputSizeMismatch {
                expected: input_layer.size(),
                got: inputs.len(),
            });
        }
        input_layer.set_activations(inputs)?;

        for i in 1..self.layers.len() {
            let prev_activations = self.layers[i - 1].activations();
            let layer = &mut self.layers[i];
            layer.forward(&prev_activations)?;
            layer.apply_activation();
            layer.apply_dropout(self.training_mode, &mut self.rng);
        }
        Ok(self.layers.last().map(Layer::activations).unwrap_or_default())
    }

    /// Backpropagates the loss of `outputs` against `targets` and takes one gradient descent
    /// step on every trainable layer. Returns the loss.
    ///
    /// The output layer's error terms are the loss gradient itself, the output activation's
    /// derivative is not applied. This pairs naturally with sigmoid + BCE and softmax + CE.
    pub fn backward(&mut self, targets: &[T], outputs: &[T]) -> Result<T, NetworkError> {
        let n_layers = self.layers.len();
        if n_layers < 2 {
            log::error!("Cannot perform backward pass on network with less than 2 layers");
            return Err(NetworkError::TooFewLayers(n_layers));
        }
        let output_size = self.layers[n_layers - 1].size();
        if outputs.len() != output_size {
            return Err(NetworkError::TargetSizeMismatch {
                expected: output_size,
                got: outputs.len(),
            });
        }
        if targets.len() != outputs.len() {
            log::error!(
                "Target size {} doesn't match output size {}",
                targets.len(),
                outputs.len()
            );
            return Err(NetworkError::TargetSizeMismatch {
                expected: outputs.len(),
                got: targets.len(),
            });
        }

        let loss = self.loss.compute(outputs, targets);
        let output_gradients = self.loss.gradient(outputs, targets);
        self.layers[n_layers - 1].set_deltas(&output_gradients)?;

        for i in (1..n_layers - 1).rev() {
            let (head, tail) = self.layers.split_at_mut(i + 1);
            let next = &tail[0];
            let next_deltas = next.deltas();
            let next_weights = next.units().iter().map(Unit::weights).collect::<Vec<_>>();
            head[i].compute_gradients(&next_deltas, &next_weights)?;
        }

        for i in 1..n_layers {
            let prev_activations = self.layers[i - 1].activations();
            self.layers[i].update_weights(self.learning_rate, &prev_activations)?;
        }
        Ok(loss)
    }

    /// One forward and backward pass on a single sample
    pub fn train_sample(&mut self, inputs: &[T], targets: &[T]) -> Result<T, NetworkError> {
        let outputs = self.forward(inputs)?;
        self.backward(targets, &outputs)
    }

    /// Trains sample by sample and returns the mean loss of the batch
    pub fn train_batch<I: AsRef<[T]>, U: AsRef<[T]>>(
        &mut self,
        inputs: &[I],
        targets: &[U],
    ) -> Result<T, NetworkError> {
        if inputs.len() != targets.len() {
            log::error!(
                "Input batch size {} doesn't match target batch size {}",
                inputs.len(),
                targets.len()
            );
            return Err(NetworkError::SampleCountMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Ok(T::zero());
        }
        let mut total_loss = T::zero();
        for (x, y) in inputs.iter().zip(targets.iter()) {
            total_loss = total_loss + self.train_sample(x.as_ref(), y.as_ref())?;
        }
        Ok(total_loss / T::lit(inputs.len() as f64))
    }

    /// Mini-batch training. Each epoch shuffles the samples (when enabled), trains every batch,
    /// then records the mean batch loss and the accuracy over the whole training set.
    ///
    /// A stop requested through the [`TrainingHandle`] is honoured before the next epoch starts.
    pub fn train(
        &mut self,
        inputs: &[Vec<T>],
        targets: &[Vec<T>],
        mut options: TrainOptions<'_, T>,
    ) -> Result<TrainingHistory<T>, NetworkError> {
        if self.layers.len() < 2 {
            return Err(NetworkError::TooFewLayers(self.layers.len()));
        }
        if inputs.len() != targets.len() {
            return Err(NetworkError::SampleCountMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Err(NetworkError::EmptyDataset);
        }
        if options.batch_size == 0 {
            return Err(NetworkError::InvalidBatchSize);
        }
        self.check_sample_shapes(inputs, targets)?;
        if let Some((val_inputs, val_targets)) = options.validation {
            if val_inputs.len() != val_targets.len() {
                return Err(NetworkError::SampleCountMismatch {
                    inputs: val_inputs.len(),
                    targets: val_targets.len(),
                });
            }
            self.check_sample_shapes(val_inputs, val_targets)?;
        }
        let loader = DataLoader::new(inputs, targets, options.batch_size, options.shuffle)?;

        log::info!(
            "Starting training for network '{}': {} epochs, batch size {}",
            self.name,
            options.epochs,
            options.batch_size
        );
        self.control.begin();
        self.training_mode = true;
        let result = self.run_epochs(&loader, inputs, targets, &mut options);
        self.training_mode = false;
        self.control.finish();

        match &result {
            Ok(history) if history.outcome == TrainingOutcome::Stopped => log::info!(
                "Training stopped for network '{}' after {} epochs",
                self.name,
                history.epochs_run()
            ),
            Ok(_) => log::info!("Training completed for network '{}'", self.name),
            Err(e) => log::error!("Training failed for network '{}': {}", self.name, e),
        }
        result
    }

    /// Rejects the first sample whose input or target width does not fit the network
    fn check_sample_shapes(
        &self,
        inputs: &[Vec<T>],
        targets: &[Vec<T>],
    ) -> Result<(), NetworkError> {
        let (Some(input_size), Some(output_size)) = (self.input_size(), self.output_size()) else {
            return Err(NetworkError::EmptyNetwork);
        };
        if let Some(input) = inputs.iter().find(|x| x.len() != input_size) {
            log::error!(
                "Training input of size {} doesn't match first layer size {}",
                input.len(),
                input_size
            );
            return Err(NetworkError::InputSizeMismatch {
                expected: input_size,
                got: input.len(),
            });
        }
        if let Some(target) = targets.iter().find(|y| y.len() != output_size) {
            log::error!(
                "Training target of size {} doesn't match output size {}",
                target.len(),
                output_size
            );
            return Err(NetworkError::TargetSizeMismatch {
                expected: output_size,
                got: target.len(),
            });
        }
        Ok(())
    }

    fn run_epochs(
        &mut self,
        loader: &DataLoader<'_, T>,
        inputs: &[Vec<T>],
        targets: &[Vec<T>],
        options: &mut TrainOptions<'_, T>,
    ) -> Result<TrainingHistory<T>, NetworkError> {
        let mut history = TrainingHistory::default();
        let epochs = options.epochs;
        for epoch in 0..epochs {
            if self.control.stop_requested() {
                history.outcome = TrainingOutcome::Stopped;
                break;
            }

            let mut epoch_loss = T::zero();
            let mut n_batches = 0;
            for (batch_inputs, batch_targets) in loader.iter(&mut self.rng) {
                epoch_loss = epoch_loss + self.train_batch(&batch_inputs, &batch_targets)?;
                n_batches += 1;
            }
            epoch_loss = epoch_loss / T::lit(n_batches.max(1) as f64);

            let train_outputs = self.predict_batch(inputs)?;
            let train_accuracy = compute_accuracy(&train_outputs, targets);
            history.train_loss.push(epoch_loss);
            history.train_accuracy.push(train_accuracy);

            if let Some((val_inputs, val_targets)) = options.validation {
                let (val_loss, val_accuracy) = self.evaluate(val_inputs, val_targets)?;
                history.val_loss.push(val_loss);
                history.val_accuracy.push(val_accuracy);
            }

            self.control
                .set_progress((epoch + 1) as f64 / epochs as f64);
            if let Some(callback) = options.callback.as_mut() {
                callback(epoch, epoch_loss, train_accuracy);
            }

            if epoch % LOG_EVERY == 0 || epoch + 1 == epochs {
                log::info!(
                    "Epoch {}/{}: Loss = {:.6}, Accuracy = {:.4}",
                    epoch + 1,
                    epochs,
                    epoch_loss,
                    train_accuracy
                );
            }
        }
        Ok(history)
    }

    /// Returns `(mean loss, accuracy)` of the network's predictions. An empty dataset evaluates
    /// to `(0, 0)`.
    pub fn evaluate(
        &mut self,
        inputs: &[Vec<T>],
        targets: &[Vec<T>],
    ) -> Result<(T, T), NetworkError> {
        if inputs.len() != targets.len() {
            log::error!(
                "Input data size {} doesn't match target data size {}",
                inputs.len(),
                targets.len()
            );
            return Err(NetworkError::SampleCountMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Ok((T::zero(), T::zero()));
        }
        let outputs = self.predict_batch(inputs)?;
        let total_loss = outputs
            .iter()
            .zip(targets.iter())
            .map(|(y_pred, y_true)| self.loss.compute(y_pred, y_true))
            .sum::<T>();
        let avg_loss = total_loss / T::lit(outputs.len() as f64);
        Ok((avg_loss, compute_accuracy(&outputs, targets)))
    }

    /// Forward pass with dropout disabled
    pub fn predict(&mut self, inputs: &[T]) -> Result<Vec<T>, NetworkError> {
        let was_training = self.training_mode;
        self.training_mode = false;
        let outputs = self.forward(inputs);
        self.training_mode = was_training;
        outputs
    }

    pub fn predict_batch<I: AsRef<[T]>>(&mut self, inputs: &[I]) -> Result<Vec<Vec<T>>, NetworkError> {
        inputs.iter().map(|x| self.predict(x.as_ref())).collect()
    }

    /// Handle to observe progress and request a stop from another thread
    pub fn training_handle(&self) -> TrainingHandle {
        self.control.clone()
    }

    pub fn is_training(&self) -> bool {
        self.control.is_training()
    }

    /// Requests the current training run to stop at the next epoch boundary
    pub fn stop_training(&self) {
        self.control.stop();
    }

    pub fn training_progress(&self) -> f64 {
        self.control.progress()
    }

    /// Reseeds the network's generator
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Pcg64Mcg::seed_from_u64(seed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn learning_rate(&self) -> T {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: T) {
        self.learning_rate = learning_rate;
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss
    }

    pub fn set_loss_kind(&mut self, loss: LossKind) {
        self.loss = loss;
    }

    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer
    }

    pub fn set_optimizer_kind(&mut self, optimizer: OptimizerKind) {
        self.optimizer = optimizer;
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer<T>> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer<T>> {
        self.layers.get_mut(index)
    }

    pub fn layers(&self) -> &[Layer<T>] {
        &self.layers
    }

    pub(crate) fn replace_layers(&mut self, layers: Vec<Layer<T>>) {
        self.layers = layers;
    }

    pub fn input_size(&self) -> Option<usize> {
        self.layers.first().map(Layer::size)
    }

    pub fn output_size(&self) -> Option<usize> {
        self.layers.last().map(Layer::size)
    }

    /// Number of weights and biases, the input layer has none
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().skip(1).map(Layer::n_parameters).sum()
    }

    /// Human readable description, one line per layer
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Network '{}': {} layers, {} parameters, loss {}, optimizer {}, learning rate {}",
            self.name,
            self.layers.len(),
            self.parameter_count(),
            self.loss,
            self.optimizer,
            self.learning_rate
        )];
        lines.extend(self.layers.iter().enumerate().map(|(i, layer)| {
            format!(
                "  [{}] {}: {} units, {}, dropout {}{}",
                i,
                if layer.name().is_empty() { "-" } else { layer.name() },
                layer.size(),
                layer.activation_kind(),
                layer.dropout_rate(),
                if layer.is_trainable() { "" } else { ", frozen" }
            )
        }));
        lines.join("\n")
    }
}

/// Fraction of samples classified correctly. A single output is thresholded at 0.5, otherwise
/// the index of the largest output is compared with the index of the largest target.
pub fn compute_accuracy<T: Scalar, O: AsRef<[T]>, U: AsRef<[T]>>(outputs: &[O], targets: &[U]) -> T {
    if outputs.is_empty() || outputs.len() != targets.len() {
        return T::zero();
    }
    let half = T::lit(0.5);
    let correct = outputs
        .iter()
        .zip(targets.iter())
        .filter(|(output, target)| {
            let (output, target) = (output.as_ref(), target.as_ref());
            if let ([prediction], Some(&expected)) = (output, target.first()) {
                let class = if *prediction > half { T::one() } else { T::zero() };
                (class - expected).abs() < half
            } else {
                !output.is_empty() && argmax(output) == argmax(target)
            }
        })
        .count();
    T::lit(correct as f64) / T::lit(outputs.len() as f64)
}

/// Index of the first largest value
fn argmax<T: Scalar>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
