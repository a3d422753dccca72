//! Loss functions and their gradients with respect to the predictions
//!
//! All losses take `(y_pred, y_true)` of equal length. Mismatched lengths yield a zero loss and
//! a zero gradient instead of an error, callers that care check shapes beforehand.

use std::fmt::{self, Display};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// Predictions are clamped into `[EPSILON, 1 - EPSILON]` before taking logarithms
pub const EPSILON: f64 = 1e-15;
pub const HUBER_DELTA: f64 = 1.0;
pub const FOCAL_ALPHA: f64 = 1.0;
pub const FOCAL_GAMMA: f64 = 2.0;

pub type LossFn<T> = fn(&[T], &[T]) -> T;
pub type LossGradientFn<T> = fn(&[T], &[T]) -> Vec<T>;

/// Toggles between loss functions. The integer codes are part of the persisted format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
pub enum LossKind {
    #[default]
    #[value(name = "mse")]
    #[serde(rename = "mse")]
    MeanSquaredError,
    #[value(name = "cross-entropy")]
    #[serde(rename = "cross-entropy")]
    CrossEntropy,
    #[value(name = "binary-cross-entropy")]
    #[serde(rename = "binary-cross-entropy")]
    BinaryCrossEntropy,
    #[value(name = "huber")]
    #[serde(rename = "huber")]
    Huber,
    #[value(name = "focal")]
    #[serde(rename = "focal")]
    Focal,
}

impl LossKind {
    pub const ALL: [LossKind; 5] = [
        LossKind::MeanSquaredError,
        LossKind::CrossEntropy,
        LossKind::BinaryCrossEntropy,
        LossKind::Huber,
        LossKind::Focal,
    ];

    pub fn code(self) -> i64 {
        match self {
            LossKind::MeanSquaredError => 0,
            LossKind::CrossEntropy => 1,
            LossKind::BinaryCrossEntropy => 2,
            LossKind::Huber => 3,
            LossKind::Focal => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Resolves the kind to its `(loss, gradient)` pair
    pub fn functions<T: Scalar>(self) -> (LossFn<T>, LossGradientFn<T>) {
        (self.function(), self.gradient_function())
    }

    pub fn function<T: Scalar>(self) -> LossFn<T> {
        match self {
            LossKind::MeanSquaredError => mse::<T>,
            LossKind::CrossEntropy => cross_entropy::<T>,
            LossKind::BinaryCrossEntropy => binary_cross_entropy::<T>,
            LossKind::Huber => |y_pred, y_true| huber(y_pred, y_true, T::lit(HUBER_DELTA)),
            LossKind::Focal => {
                |y_pred, y_true| focal(y_pred, y_true, T::lit(FOCAL_ALPHA), T::lit(FOCAL_GAMMA))
            }
        }
    }

    pub fn gradient_function<T: Scalar>(self) -> LossGradientFn<T> {
        match self {
            LossKind::MeanSquaredError => mse_gradient::<T>,
            LossKind::CrossEntropy => cross_entropy_gradient::<T>,
            LossKind::BinaryCrossEntropy => binary_cross_entropy_gradient::<T>,
            LossKind::Huber => {
                |y_pred, y_true| huber_gradient(y_pred, y_true, T::lit(HUBER_DELTA))
            }
            LossKind::Focal => |y_pred, y_true| {
                focal_gradient(y_pred, y_true, T::lit(FOCAL_ALPHA), T::lit(FOCAL_GAMMA))
            },
        }
    }

    pub fn compute<T: Scalar>(self, y_pred: &[T], y_true: &[T]) -> T {
        (self.function::<T>())(y_pred, y_true)
    }

    pub fn gradient<T: Scalar>(self, y_pred: &[T], y_true: &[T]) -> Vec<T> {
        (self.gradient_function::<T>())(y_pred, y_true)
    }
}

impl Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::MeanSquaredError => write!(f, "mse"),
            LossKind::CrossEntropy => write!(f, "cross-entropy"),
            LossKind::BinaryCrossEntropy => write!(f, "binary-cross-entropy"),
            LossKind::Huber => write!(f, "huber"),
            LossKind::Focal => write!(f, "focal"),
        }
    }
}

fn clamp_probability<T: Scalar>(p: T) -> T {
    let eps = T::lit(EPSILON);
    p.min(T::one() - eps).max(eps)
}

fn n_elements<T: Scalar>(values: &[T]) -> T {
    T::lit(values.len() as f64)
}

/// Zero gradient returned on shape mismatch
fn zero_gradient<T: Scalar>(y_pred: &[T]) -> Vec<T> {
    vec![T::zero(); y_pred.len()]
}

/// Mean Squared Error between two vectors of values
pub fn mse<T: Scalar>(y_pred: &[T], y_true: &[T]) -> T {
    if y_pred.len() != y_true.len() || y_pred.is_empty() {
        return T::zero();
    }
    let loss = y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&a, &b)| (a - b) * (a - b))
        .sum::<T>();
    loss / n_elements(y_pred)
}

/// dloss / dy_pred = 2/N * (y_pred - y_true)
pub fn mse_gradient<T: Scalar>(y_pred: &[T], y_true: &[T]) -> Vec<T> {
    if y_pred.len() != y_true.len() {
        return zero_gradient(y_pred);
    }
    let n = n_elements(y_pred);
    y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&a, &b)| T::lit(2.0) * (a - b) / n)
        .collect()
}

/// Categorical cross entropy, summed over the classes
pub fn cross_entropy<T: Scalar>(y_pred: &[T], y_true: &[T]) -> T {
    if y_pred.len() != y_true.len() {
        return T::zero();
    }
    -y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| t * clamp_probability(p).ln())
        .sum::<T>()
}

pub fn cross_entropy_gradient<T: Scalar>(y_pred: &[T], y_true: &[T]) -> Vec<T> {
    if y_pred.len() != y_true.len() {
        return zero_gradient(y_pred);
    }
    y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| -t / clamp_probability(p))
        .collect()
}

/// Binary cross entropy, averaged over the outputs
pub fn binary_cross_entropy<T: Scalar>(y_pred: &[T], y_true: &[T]) -> T {
    if y_pred.len() != y_true.len() || y_pred.is_empty() {
        return T::zero();
    }
    let loss = y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let p = clamp_probability(p);
            t * p.ln() + (T::one() - t) * (T::one() - p).ln()
        })
        .sum::<T>();
    -loss / n_elements(y_pred)
}

pub fn binary_cross_entropy_gradient<T: Scalar>(y_pred: &[T], y_true: &[T]) -> Vec<T> {
    if y_pred.len() != y_true.len() {
        return zero_gradient(y_pred);
    }
    let n = n_elements(y_pred);
    y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let p = clamp_probability(p);
            (p - t) / (p * (T::one() - p)) / n
        })
        .collect()
}

/// Huber loss: quadratic for errors within `delta`, linear beyond, averaged over the outputs
pub fn huber<T: Scalar>(y_pred: &[T], y_true: &[T], delta: T) -> T {
    if y_pred.len() != y_true.len() || y_pred.is_empty() {
        return T::zero();
    }
    let half = T::lit(0.5);
    let loss = y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let diff = (p - t).abs();
            if diff <= delta {
                half * diff * diff
            } else {
                delta * diff - half * delta * delta
            }
        })
        .sum::<T>();
    loss / n_elements(y_pred)
}

pub fn huber_gradient<T: Scalar>(y_pred: &[T], y_true: &[T], delta: T) -> Vec<T> {
    if y_pred.len() != y_true.len() {
        return zero_gradient(y_pred);
    }
    let n = n_elements(y_pred);
    y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let diff = p - t;
            let grad = if diff.abs() <= delta {
                diff
            } else if diff > T::zero() {
                delta
            } else {
                -delta
            };
            grad / n
        })
        .collect()
}

/// Focal loss, `-alpha * (1 - pt)^gamma * ln(pt)` averaged over the outputs. Confident correct
/// predictions (`pt` close to one) contribute little.
pub fn focal<T: Scalar>(y_pred: &[T], y_true: &[T], alpha: T, gamma: T) -> T {
    if y_pred.len() != y_true.len() || y_pred.is_empty() {
        return T::zero();
    }
    let loss = y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let pt = prob_of_target(clamp_probability(p), t);
            alpha * (T::one() - pt).powf(gamma) * pt.ln()
        })
        .sum::<T>();
    -loss / n_elements(y_pred)
}

pub fn focal_gradient<T: Scalar>(y_pred: &[T], y_true: &[T], alpha: T, gamma: T) -> Vec<T> {
    if y_pred.len() != y_true.len() {
        return zero_gradient(y_pred);
    }
    let n = n_elements(y_pred);
    y_pred
        .iter()
        .zip(y_true.iter())
        .map(|(&p, &t)| {
            let p = clamp_probability(p);
            let pt = prob_of_target(p, t);
            let scale = alpha * (T::one() - pt).powf(gamma);
            let log_term = alpha * gamma * (T::one() - pt).powf(gamma - T::one()) * pt.ln();
            let grad = if t == T::one() {
                -scale / p + log_term
            } else {
                scale / (T::one() - p) - log_term
            };
            grad / n
        })
        .collect()
}

fn prob_of_target<T: Scalar>(p: T, t: T) -> T {
    t * p + (T::one() - t) * (T::one() - p)
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;

    use super::*;

    #[test]
    fn test_mse_loss() {
        let y_pred = [2.0f32, 3.0];
        let y_true = [1.0f32, 5.0];
        assert_eq!(mse(&y_pred, &y_true), 2.5);

        // dloss / dy_pred = 1/N * 2 * (y_pred - y_true)
        let grad = mse_gradient(&y_pred, &y_true);
        assert_eq!(grad, vec![1.0, -2.0]);
    }

    #[test]
    fn test_mismatched_lengths_yield_zero() {
        let y_pred = [0.2f64, 0.8];
        let y_true = [1.0f64];
        for kind in LossKind::ALL {
            assert_eq!(kind.compute(&y_pred, &y_true), 0.0);
            assert_eq!(kind.gradient(&y_pred, &y_true), vec![0.0, 0.0]);
        }
    }

    #[test]
    fn test_cross_entropy_clamps_zero_predictions() {
        let loss = cross_entropy(&[0.0f64, 1.0], &[1.0, 0.0]);
        assert!(loss.is_finite());
        assert_eq_float!(loss, -(1e-15f64).ln(), 1e-9);

        let grad = cross_entropy_gradient(&[0.5f64, 0.25], &[1.0, 0.0]);
        assert_eq_float!(grad[0], -2.0);
        assert_eq_float!(grad[1], 0.0);
    }

    #[test]
    fn test_binary_cross_entropy() {
        let loss = binary_cross_entropy(&[0.5f64], &[1.0]);
        assert_eq_float!(loss, std::f64::consts::LN_2);
        let loss = binary_cross_entropy(&[0.0f64, 1.0], &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss < 1e-9);

        // (p - t) / (p (1 - p)) / n
        let grad = binary_cross_entropy_gradient(&[0.5f64, 0.25], &[1.0, 0.0]);
        assert_eq_float!(grad[0], -1.0);
        assert_eq_float!(grad[1], 0.25 / (0.25 * 0.75) / 2.0);
    }

    #[test]
    fn test_huber_linear_regime() {
        let delta = 1.0f64;
        let loss = huber(&[0.0, 0.0], &[3.0, 3.0], delta);
        // both elements are in the linear regime: delta * |diff| - 0.5 * delta^2, averaged
        let per_element = delta * 3.0 - 0.5 * delta * delta;
        assert_eq_float!(loss, per_element);
        assert_eq_float!(LossKind::Huber.compute::<f64>(&[0.0, 0.0], &[3.0, 3.0]), 2.5);

        let grad = huber_gradient(&[0.0, 0.0], &[3.0, -3.0], delta);
        assert_eq!(grad, vec![-0.5, 0.5]);
    }

    #[test]
    fn test_huber_quadratic_regime() {
        let loss = huber(&[0.5f32], &[0.0], 1.0);
        assert_eq_float!(loss, 0.125);
        assert_eq!(huber_gradient(&[0.5f32], &[0.0], 1.0), vec![0.5]);
    }

    #[test]
    fn test_focal_down_weights_easy_examples() {
        let easy = focal(&[0.95f64], &[1.0], 1.0, 2.0);
        let hard = focal(&[0.3f64], &[1.0], 1.0, 2.0);
        assert!(easy < hard);
        // with gamma = 0 focal loss is binary cross entropy
        assert_eq_float!(
            focal(&[0.3f64, 0.8], &[1.0, 0.0], 1.0, 0.0),
            binary_cross_entropy(&[0.3, 0.8], &[1.0, 0.0])
        );
    }

    #[test]
    fn test_focal_gradient_matches_finite_differences() {
        let h = 1e-7;
        for (p, t) in [(0.3f64, 1.0f64), (0.6, 0.0)] {
            let numeric = (focal(&[p + h], &[t], 1.0, 2.0) - focal(&[p - h], &[t], 1.0, 2.0))
                / (2.0 * h);
            let analytic = focal_gradient(&[p], &[t], 1.0, 2.0)[0];
            assert_eq_float!(analytic, numeric, 1e-5);
        }
    }

    #[test]
    fn test_codes_round_trip() {
        for kind in LossKind::ALL {
            assert_eq!(LossKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(LossKind::from_code(-1), None);
        assert_eq!(LossKind::Focal.code(), 4);
    }
}
