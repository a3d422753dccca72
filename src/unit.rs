//! A single trainable node of a layer

use crate::scalar::Scalar;

/// A single neuron in a layer of a NN
#[derive(Debug, Clone, PartialEq)]
pub struct Unit<T> {
    id: usize,
    /// output of the unit after activation (and dropout)
    activation: T,
    bias: T,
    /// weighted sum of the inputs, without the bias
    pre_activation: T,
    /// error signal flowing back from the next layer, before the activation derivative
    gradient: T,
    /// dloss / d(pre_activation)
    error_term: T,
    trainable: bool,
    name: String,
    /// one weight per unit of the previous layer, empty for the input layer
    weights: Vec<T>,
}

impl<T: Scalar> Default for Unit<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Scalar> Unit<T> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            activation: T::zero(),
            bias: T::zero(),
            pre_activation: T::zero(),
            gradient: T::zero(),
            error_term: T::zero(),
            trainable: true,
            name: String::new(),
            weights: vec![],
        }
    }

    /// Clears the transient state of the unit. Weights and bias are kept.
    pub fn reset(&mut self) {
        self.activation = T::zero();
        self.pre_activation = T::zero();
        self.gradient = T::zero();
        self.error_term = T::zero();
    }

    /// Sets `activation = f(pre_activation + bias)`
    pub fn apply_activation(&mut self, f: impl Fn(T) -> T) {
        self.activation = f(self.net_input());
    }

    /// Returns `f'(pre_activation + bias)` without touching the unit
    pub fn activation_derivative(&self, f_prime: impl Fn(T) -> T) -> T {
        f_prime(self.net_input())
    }

    /// Computes the weighted sum of the inputs. Callers guarantee `inputs.len() == weights.len()`.
    pub(crate) fn weighted_sum(&self, inputs: &[T]) -> T {
        self.weights
            .iter()
            .zip(inputs.iter())
            .map(|(&w, &x)| w * x)
            .sum::<T>()
    }

    /// `pre_activation + bias`, the value fed to the activation function
    pub fn net_input(&self) -> T {
        self.pre_activation + self.bias
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn activation(&self) -> T {
        self.activation
    }

    pub fn set_activation(&mut self, activation: T) {
        self.activation = activation;
    }

    pub fn bias(&self) -> T {
        self.bias
    }

    pub fn set_bias(&mut self, bias: T) {
        self.bias = bias;
    }

    pub fn pre_activation(&self) -> T {
        self.pre_activation
    }

    pub fn set_pre_activation(&mut self, pre_activation: T) {
        self.pre_activation = pre_activation;
    }

    pub fn gradient(&self) -> T {
        self.gradient
    }

    pub fn set_gradient(&mut self, gradient: T) {
        self.gradient = gradient;
    }

    pub fn error_term(&self) -> T {
        self.error_term
    }

    pub fn set_error_term(&mut self, error_term: T) {
        self.error_term = error_term;
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [T] {
        &mut self.weights
    }

    pub fn set_weights(&mut self, weights: Vec<T>) {
        self.weights = weights;
    }

    pub fn n_inputs(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::activation::{relu, relu_derivative};

    use super::*;

    // Testing utility for a deterministic and simple unit
    fn unit_with(pre_activation: f32, bias: f32) -> Unit<f32> {
        let mut unit = Unit::new(42);
        unit.set_pre_activation(pre_activation);
        unit.set_bias(bias);
        unit
    }

    #[test]
    fn test_default_state() {
        let unit = Unit::<f32>::new(42);
        assert_eq!(unit.id(), 42);
        assert_eq!(unit.activation(), 0.0);
        assert_eq!(unit.bias(), 0.0);
        assert_eq!(unit.pre_activation(), 0.0);
        assert_eq!(unit.gradient(), 0.0);
        assert_eq!(unit.error_term(), 0.0);
        assert!(unit.is_trainable());
        assert_eq!(unit.name(), "");
        assert_eq!(unit.n_inputs(), 0);
    }

    #[test]
    fn test_apply_activation_includes_bias() {
        let mut unit = unit_with(1.0, 0.5);
        unit.apply_activation(relu);
        assert_eq!(unit.activation(), 1.5);

        let mut unit = unit_with(-2.0, 0.5);
        unit.apply_activation(relu);
        assert_eq!(unit.activation(), 0.0);
    }

    #[test]
    fn test_activation_derivative_does_not_mutate() {
        let unit = unit_with(1.0, 0.5);
        let before = unit.clone();
        assert_eq!(unit.activation_derivative(relu_derivative), 1.0);
        assert_eq!(unit, before);
        assert_eq!(unit_with(-2.0, 0.5).activation_derivative(relu_derivative), 0.0);
    }

    #[test]
    fn test_reset_keeps_parameters() {
        let mut unit = unit_with(1.2, 0.1);
        unit.set_weights(vec![0.1, 0.2, 0.3]);
        unit.set_activation(0.5);
        unit.set_gradient(0.3);
        unit.set_error_term(0.4);
        unit.reset();
        assert_eq!(unit.activation(), 0.0);
        assert_eq!(unit.pre_activation(), 0.0);
        assert_eq!(unit.gradient(), 0.0);
        assert_eq!(unit.error_term(), 0.0);
        assert_eq!(unit.bias(), 0.1);
        assert_eq!(unit.weights(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_weighted_sum() {
        let mut unit = Unit::<f64>::new(0);
        unit.set_weights(vec![1.0, -2.0]);
        assert_eq!(unit.weighted_sum(&[3.0, 0.5]), 2.0);
    }
}
