//! A layer of units sharing one activation and dropout policy

use rand::Rng;
use thiserror::Error;

use crate::{
    activation::{ActivationKind, softmax},
    config::LayerConfig,
    init::InitKind,
    optim,
    scalar::Scalar,
    unit::Unit,
};

/// Errors for a single layer
#[derive(Debug, Error, PartialEq)]
pub enum LayerError {
    #[error("Input size mismatch: expected {expected}, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error("Value count mismatch: layer has {expected} units, got {got} values")]
    UnitCountMismatch { expected: usize, got: usize },
    #[error("Next layer supplied {deltas} error terms but {weights} weight rows")]
    DeltaWeightMismatch { deltas: usize, weights: usize },
    #[error("Weight row {row} of the next layer has {len} weights, need at least {needed}")]
    WeightRowTooShort { row: usize, len: usize, needed: usize },
}

/// A layer of a neural network
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    units: Vec<Unit<T>>,
    name: String,
    activation: ActivationKind,
    dropout_rate: T,
    trainable: bool,
    /// `false` for units dropped in the last forward pass
    dropout_mask: Vec<bool>,
    /// strategy used whenever the layer is (re)attached to a network
    init: InitKind,
}

impl<T: Scalar> Layer<T> {
    /// Creates a new layer of `size` units with zeroed state. Weights are drawn once the layer is
    /// attached after another layer.
    pub fn new(size: usize, activation: ActivationKind, name: impl Into<String>) -> Self {
        Self::from_units(
            (0..size).map(Unit::new).collect(),
            name.into(),
            activation,
            T::zero(),
            true,
        )
    }

    pub fn from_config(config: &LayerConfig) -> Self {
        let mut layer = Self::new(config.size, config.activation, config.name.clone());
        layer.set_dropout_rate(T::lit(config.dropout_rate));
        layer.trainable = config.trainable;
        layer.init = config.weight_init;
        layer
    }

    pub(crate) fn from_units(
        units: Vec<Unit<T>>,
        name: String,
        activation: ActivationKind,
        dropout_rate: T,
        trainable: bool,
    ) -> Self {
        let dropout_mask = vec![true; units.len()];
        Self {
            units,
            name,
            activation,
            dropout_rate,
            trainable,
            dropout_mask,
            init: InitKind::default(),
        }
    }

    /// Computes every unit's weighted input from the previous layer's activations
    pub fn forward(&mut self, inputs: &[T]) -> Result<(), LayerError> {
        for unit in self.units.iter_mut() {
            if unit.n_inputs() != inputs.len() {
                return Err(LayerError::InputSizeMismatch {
                    expected: unit.n_inputs(),
                    got: inputs.len(),
                });
            }
            let sum = unit.weighted_sum(inputs);
            unit.set_pre_activation(sum);
        }
        Ok(())
    }

    /// Applies the layer's activation. Softmax is computed over all units at once.
    pub fn apply_activation(&mut self) {
        if self.activation == ActivationKind::Softmax {
            let net_inputs = self.units.iter().map(Unit::net_input).collect::<Vec<_>>();
            for (unit, value) in self.units.iter_mut().zip(softmax(&net_inputs)) {
                unit.set_activation(value);
            }
        } else {
            let f = self.activation.function::<T>();
            for unit in self.units.iter_mut() {
                unit.apply_activation(f);
            }
        }
    }

    /// Inverted dropout: while training each unit is kept with probability `1 - rate` and
    /// survivors are scaled by `1 / (1 - rate)` so the expected activation is unchanged.
    pub fn apply_dropout<R: Rng>(&mut self, training: bool, rng: &mut R) {
        if !training || self.dropout_rate <= T::zero() {
            self.dropout_mask.fill(true);
            return;
        }
        let keep_prob = T::one() - self.dropout_rate;
        let p = keep_prob.as_f64().clamp(0.0, 1.0);
        for (unit, keep) in self.units.iter_mut().zip(self.dropout_mask.iter_mut()) {
            *keep = rng.random_bool(p);
            if *keep {
                unit.set_activation(unit.activation() / keep_prob);
            } else {
                unit.set_activation(T::zero());
            }
        }
    }

    /// Backpropagates the next layer's error terms through its weights:
    /// `error_i = (sum_j delta_j * w_j[i]) * f'(net_i)`
    pub fn compute_gradients<W: AsRef<[T]>>(
        &mut self,
        next_deltas: &[T],
        next_weights: &[W],
    ) -> Result<(), LayerError> {
        if next_deltas.len() != next_weights.len() {
            return Err(LayerError::DeltaWeightMismatch {
                deltas: next_deltas.len(),
                weights: next_weights.len(),
            });
        }
        if let Some((row, w)) = next_weights
            .iter()
            .enumerate()
            .find(|(_, w)| w.as_ref().len() < self.units.len())
        {
            return Err(LayerError::WeightRowTooShort {
                row,
                len: w.as_ref().len(),
                needed: self.units.len(),
            });
        }

        let f_prime = self.activation.derivative_function::<T>();
        for (i, unit) in self.units.iter_mut().enumerate() {
            let upstream = next_deltas
                .iter()
                .zip(next_weights.iter())
                .map(|(&delta, w)| delta * w.as_ref()[i])
                .sum::<T>();
            unit.set_gradient(upstream);
            unit.set_error_term(upstream * unit.activation_derivative(f_prime));
        }
        Ok(())
    }

    /// Gradient descent on every weight and bias. No-op for frozen layers.
    pub fn update_weights(&mut self, lr: T, prev_activations: &[T]) -> Result<(), LayerError> {
        if !self.trainable {
            return Ok(());
        }
        for unit in self.units.iter_mut() {
            if unit.n_inputs() != prev_activations.len() {
                return Err(LayerError::InputSizeMismatch {
                    expected: unit.n_inputs(),
                    got: prev_activations.len(),
                });
            }
            let delta = unit.error_term();
            for (w, &a) in unit.weights_mut().iter_mut().zip(prev_activations.iter()) {
                *w = optim::step(*w, lr, delta * a);
            }
            unit.set_bias(optim::step(unit.bias(), lr, delta));
        }
        Ok(())
    }

    /// Redraws every weight (and bias) against a previous layer of `prev_size` units
    pub fn initialize_weights<R: Rng>(&mut self, prev_size: usize, kind: InitKind, rng: &mut R) {
        let fan_out = self.units.len();
        if let Some(value) = kind.constant::<T>() {
            for unit in self.units.iter_mut() {
                unit.set_weights(vec![value; prev_size]);
                unit.set_bias(value);
            }
            return;
        }
        for unit in self.units.iter_mut() {
            let weights = (0..prev_size)
                .map(|_| kind.draw::<T, R>(rng, prev_size, fan_out))
                .collect();
            unit.set_weights(weights);
            unit.set_bias(kind.bias::<T>());
        }
    }

    pub fn reset(&mut self) {
        for unit in self.units.iter_mut() {
            unit.reset();
        }
        self.dropout_mask.fill(true);
    }

    pub fn size(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[Unit<T>] {
        &self.units
    }

    pub fn unit(&self, index: usize) -> Option<&Unit<T>> {
        self.units.get(index)
    }

    pub fn unit_mut(&mut self, index: usize) -> Option<&mut Unit<T>> {
        self.units.get_mut(index)
    }

    pub fn activations(&self) -> Vec<T> {
        self.units.iter().map(Unit::activation).collect()
    }

    /// Writes activations directly, used for the input layer
    pub fn set_activations(&mut self, activations: &[T]) -> Result<(), LayerError> {
        self.check_count(activations.len())?;
        for (unit, &a) in self.units.iter_mut().zip(activations.iter()) {
            unit.set_activation(a);
        }
        Ok(())
    }

    pub fn biases(&self) -> Vec<T> {
        self.units.iter().map(Unit::bias).collect()
    }

    pub fn set_biases(&mut self, biases: &[T]) -> Result<(), LayerError> {
        self.check_count(biases.len())?;
        for (unit, &b) in self.units.iter_mut().zip(biases.iter()) {
            unit.set_bias(b);
        }
        Ok(())
    }

    pub fn deltas(&self) -> Vec<T> {
        self.units.iter().map(Unit::error_term).collect()
    }

    pub fn set_deltas(&mut self, deltas: &[T]) -> Result<(), LayerError> {
        self.check_count(deltas.len())?;
        for (unit, &d) in self.units.iter_mut().zip(deltas.iter()) {
            unit.set_error_term(d);
        }
        Ok(())
    }

    /// One row of incoming weights per unit
    pub fn weight_matrix(&self) -> Vec<Vec<T>> {
        self.units.iter().map(|u| u.weights().to_vec()).collect()
    }

    pub fn set_weight_matrix(&mut self, weights: Vec<Vec<T>>) -> Result<(), LayerError> {
        self.check_count(weights.len())?;
        for (unit, row) in self.units.iter_mut().zip(weights) {
            unit.set_weights(row);
        }
        Ok(())
    }

    fn check_count(&self, got: usize) -> Result<(), LayerError> {
        if got != self.units.len() {
            return Err(LayerError::UnitCountMismatch {
                expected: self.units.len(),
                got,
            });
        }
        Ok(())
    }

    /// Number of incoming weights per unit
    pub fn n_inputs(&self) -> usize {
        self.units.first().map_or(0, Unit::n_inputs)
    }

    pub fn n_parameters(&self) -> usize {
        self.units.iter().map(|u| u.n_inputs() + 1).sum()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn activation_kind(&self) -> ActivationKind {
        self.activation
    }

    pub fn set_activation_kind(&mut self, activation: ActivationKind) {
        self.activation = activation;
    }

    pub fn dropout_rate(&self) -> T {
        self.dropout_rate
    }

    /// Sets the dropout rate, clamped into `[0, 1]`
    pub fn set_dropout_rate(&mut self, rate: T) {
        self.dropout_rate = rate.max(T::zero()).min(T::one());
    }

    pub fn dropout_mask(&self) -> &[bool] {
        &self.dropout_mask
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }

    pub fn init_kind(&self) -> InitKind {
        self.init
    }

    pub fn set_init_kind(&mut self, init: InitKind) {
        self.init = init;
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use crate::assert_eq_float;

    use super::*;

    // Testing utility for a deterministic and simple layer, every weight and bias is one
    fn layer_ones(n_inputs: usize, n_outputs: usize, activation: ActivationKind) -> Layer<f32> {
        let mut layer = Layer::new(n_outputs, activation, "ones");
        let mut rng = Pcg64Mcg::seed_from_u64(0);
        layer.initialize_weights(n_inputs, InitKind::One, &mut rng);
        layer
    }

    #[test]
    fn test_layer_forward() {
        let mut layer = layer_ones(2, 3, ActivationKind::Identity);
        layer.forward(&[1.0, 2.0]).unwrap();
        layer.apply_activation();
        // pre-activation excludes the bias, the activation includes it
        assert!(layer.units().iter().all(|u| u.pre_activation() == 3.0));
        assert_eq!(layer.activations(), vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_dim_mismatch() {
        let mut layer = layer_ones(2, 3, ActivationKind::ReLU);
        let err = layer.forward(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            LayerError::InputSizeMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_softmax_layer() {
        let mut layer = Layer::<f32>::new(2, ActivationKind::Softmax, "out");
        layer
            .set_weight_matrix(vec![vec![1.0], vec![2.0]])
            .unwrap();
        layer.forward(&[1.0]).unwrap();
        layer.apply_activation();
        let outputs = layer.activations();
        assert_eq_float!(outputs[0], 0.2689414);
        assert_eq_float!(outputs[1], 0.7310585);
    }

    #[test]
    fn test_dropout_disabled() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let mut layer = layer_ones(2, 4, ActivationKind::Identity);
        layer.set_dropout_rate(0.5);
        layer.forward(&[1.0, 1.0]).unwrap();
        layer.apply_activation();
        let before = layer.activations();

        // not training
        layer.apply_dropout(false, &mut rng);
        assert_eq!(layer.activations(), before);
        assert!(layer.dropout_mask().iter().all(|&m| m));

        // rate zero while training
        layer.set_dropout_rate(0.0);
        layer.apply_dropout(true, &mut rng);
        assert_eq!(layer.activations(), before);
    }

    #[test]
    fn test_dropout_full_rate_zeroes_everything() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let mut layer = layer_ones(2, 16, ActivationKind::Identity);
        layer.set_dropout_rate(1.0);
        for _ in 0..100 {
            layer.forward(&[1.0, 1.0]).unwrap();
            layer.apply_activation();
            layer.apply_dropout(true, &mut rng);
            assert!(layer.activations().iter().all(|&a| a == 0.0));
            assert!(layer.dropout_mask().iter().all(|&m| !m));
        }
    }

    #[test]
    fn test_dropout_scales_survivors() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let mut layer = layer_ones(1, 1000, ActivationKind::Identity);
        layer.set_dropout_rate(0.5);
        layer.forward(&[1.0]).unwrap();
        layer.apply_activation();
        layer.apply_dropout(true, &mut rng);
        for (a, &kept) in layer.activations().iter().zip(layer.dropout_mask()) {
            if kept {
                assert_eq!(*a, 4.0);
            } else {
                assert_eq!(*a, 0.0);
            }
        }
        let n_kept = layer.dropout_mask().iter().filter(|&&m| m).count();
        assert!((400..600).contains(&n_kept));

        layer.reset();
        assert!(layer.dropout_mask().iter().all(|&m| m));
    }

    #[test]
    fn test_compute_gradients() {
        let mut layer = layer_ones(1, 2, ActivationKind::ReLU);
        layer.forward(&[1.0]).unwrap();
        layer.apply_activation();
        // unit 0 and 1 both have net input 2 so f'(x) = 1
        let next_deltas = [0.5f32, -1.0];
        let next_weights = vec![vec![2.0f32, 3.0], vec![1.0, 4.0]];
        layer.compute_gradients(&next_deltas, &next_weights).unwrap();
        assert_eq!(layer.deltas(), vec![0.5 * 2.0 - 1.0, 0.5 * 3.0 - 4.0]);
        assert_eq!(layer.unit(1).unwrap().gradient(), -2.5);
    }

    #[test]
    fn test_compute_gradients_shape_errors() {
        let mut layer = layer_ones(1, 2, ActivationKind::ReLU);
        let err = layer
            .compute_gradients(&[1.0], &[vec![1.0, 1.0], vec![1.0, 1.0]])
            .unwrap_err();
        assert_eq!(err, LayerError::DeltaWeightMismatch { deltas: 1, weights: 2 });
        let err = layer
            .compute_gradients(&[1.0], &[vec![1.0]])
            .unwrap_err();
        assert_eq!(
            err,
            LayerError::WeightRowTooShort {
                row: 0,
                len: 1,
                needed: 2
            }
        );
    }

    #[test]
    fn test_update_weights() {
        let mut layer = layer_ones(2, 1, ActivationKind::Identity);
        layer.set_deltas(&[0.5]).unwrap();
        layer.update_weights(0.1, &[1.0, 2.0]).unwrap();
        let unit = layer.unit(0).unwrap();
        assert_eq_float!(unit.weights()[0], 1.0 - 0.1 * 0.5 * 1.0);
        assert_eq_float!(unit.weights()[1], 1.0 - 0.1 * 0.5 * 2.0);
        assert_eq_float!(unit.bias(), 1.0 - 0.1 * 0.5);

        // frozen layers are left alone
        let mut frozen = layer_ones(2, 1, ActivationKind::Identity);
        frozen.set_trainable(false);
        frozen.set_deltas(&[0.5]).unwrap();
        frozen.update_weights(0.1, &[1.0, 2.0]).unwrap();
        assert_eq!(frozen.unit(0).unwrap().weights(), &[1.0, 1.0]);
    }

    #[test]
    fn test_initialize_weights() {
        let mut rng = Pcg64Mcg::seed_from_u64(4);
        let mut layer = Layer::<f64>::new(3, ActivationKind::Tanh, "hidden");
        layer.initialize_weights(5, InitKind::Xavier, &mut rng);
        let limit = (6.0f64 / 8.0).sqrt();
        assert_eq!(layer.n_inputs(), 5);
        for unit in layer.units() {
            assert_eq!(unit.n_inputs(), 5);
            assert!(unit.weights().iter().all(|w| w.abs() <= limit));
            assert_eq!(unit.bias(), 0.0);
        }
        assert_eq!(layer.n_parameters(), 18);

        layer.initialize_weights(2, InitKind::Zero, &mut rng);
        assert_eq!(layer.weight_matrix(), vec![vec![0.0; 2]; 3]);
        assert_eq!(layer.biases(), vec![0.0; 3]);
    }

    #[test]
    fn test_from_config_clamps_dropout() {
        let config = LayerConfig::new(4, ActivationKind::GELU)
            .with_name("hidden")
            .with_dropout(1.5)
            .with_trainable(false)
            .with_init(InitKind::He);
        let layer = Layer::<f32>::from_config(&config);
        assert_eq!(layer.size(), 4);
        assert_eq!(layer.name(), "hidden");
        assert_eq!(layer.dropout_rate(), 1.0);
        assert!(!layer.is_trainable());
        assert_eq!(layer.init_kind(), InitKind::He);
        assert_eq!(layer.activation_kind(), ActivationKind::GELU);
    }

    #[test]
    fn test_set_values_count_checked() {
        let mut layer = Layer::<f32>::new(2, ActivationKind::ReLU, "");
        assert_eq!(
            layer.set_activations(&[1.0]),
            Err(LayerError::UnitCountMismatch { expected: 2, got: 1 })
        );
        layer.set_activations(&[1.0, 2.0]).unwrap();
        assert_eq!(layer.activations(), vec![1.0, 2.0]);
    }
}
