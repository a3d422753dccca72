//! Activation functions and their derivatives
//!
//! Every scalar activation is a pair `(f, f')` of plain functions. Softmax works on a whole layer
//! at once and is handled separately by [`crate::layer::Layer::apply_activation`].

use std::fmt::{self, Display};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// Slope used by leaky ReLU for negative inputs
pub const LEAKY_RELU_ALPHA: f64 = 0.01;
/// Saturation value used by ELU for negative inputs
pub const ELU_ALPHA: f64 = 1.0;
/// `exp` overflows for larger magnitudes, so sigmoid clamps its input to this range
const SIGMOID_CLAMP: f64 = 500.0;

/// A scalar transfer function or its derivative
pub type ScalarFn<T> = fn(T) -> T;

/// Toggles between activation functions. The integer codes are part of the persisted format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
pub enum ActivationKind {
    #[value(name = "identity")]
    #[serde(rename = "identity")]
    Identity,
    #[default]
    #[value(name = "relu")]
    #[serde(rename = "relu")]
    ReLU,
    #[value(name = "sigmoid")]
    #[serde(rename = "sigmoid")]
    Sigmoid,
    #[value(name = "tanh")]
    #[serde(rename = "tanh")]
    Tanh,
    #[value(name = "leaky-relu")]
    #[serde(rename = "leaky-relu")]
    LeakyReLU,
    #[value(name = "elu")]
    #[serde(rename = "elu")]
    ELU,
    #[value(name = "swish")]
    #[serde(rename = "swish")]
    Swish,
    #[value(name = "gelu")]
    #[serde(rename = "gelu")]
    GELU,
    #[value(name = "softmax")]
    #[serde(rename = "softmax")]
    Softmax,
}

impl ActivationKind {
    pub const ALL: [ActivationKind; 9] = [
        ActivationKind::Identity,
        ActivationKind::ReLU,
        ActivationKind::Sigmoid,
        ActivationKind::Tanh,
        ActivationKind::LeakyReLU,
        ActivationKind::ELU,
        ActivationKind::Swish,
        ActivationKind::GELU,
        ActivationKind::Softmax,
    ];

    pub fn code(self) -> i64 {
        match self {
            ActivationKind::Identity => 0,
            ActivationKind::ReLU => 1,
            ActivationKind::Sigmoid => 2,
            ActivationKind::Tanh => 3,
            ActivationKind::LeakyReLU => 4,
            ActivationKind::ELU => 5,
            ActivationKind::Swish => 6,
            ActivationKind::GELU => 7,
            ActivationKind::Softmax => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Resolves the kind to its `(f, f')` pair. Softmax resolves to identity since it can only be
    /// computed over a whole layer.
    pub fn functions<T: Scalar>(self) -> (ScalarFn<T>, ScalarFn<T>) {
        (self.function(), self.derivative_function())
    }

    pub fn function<T: Scalar>(self) -> ScalarFn<T> {
        match self {
            ActivationKind::Identity | ActivationKind::Softmax => identity::<T>,
            ActivationKind::ReLU => relu::<T>,
            ActivationKind::Sigmoid => sigmoid::<T>,
            ActivationKind::Tanh => tanh::<T>,
            ActivationKind::LeakyReLU => |x| leaky_relu(x, T::lit(LEAKY_RELU_ALPHA)),
            ActivationKind::ELU => |x| elu(x, T::lit(ELU_ALPHA)),
            ActivationKind::Swish => swish::<T>,
            ActivationKind::GELU => gelu::<T>,
        }
    }

    pub fn derivative_function<T: Scalar>(self) -> ScalarFn<T> {
        match self {
            ActivationKind::Identity | ActivationKind::Softmax => identity_derivative::<T>,
            ActivationKind::ReLU => relu_derivative::<T>,
            ActivationKind::Sigmoid => sigmoid_derivative::<T>,
            ActivationKind::Tanh => tanh_derivative::<T>,
            ActivationKind::LeakyReLU => |x| leaky_relu_derivative(x, T::lit(LEAKY_RELU_ALPHA)),
            ActivationKind::ELU => |x| elu_derivative(x, T::lit(ELU_ALPHA)),
            ActivationKind::Swish => swish_derivative::<T>,
            ActivationKind::GELU => gelu_derivative::<T>,
        }
    }

    pub fn apply<T: Scalar>(self, x: T) -> T {
        (self.function::<T>())(x)
    }

    pub fn derivative<T: Scalar>(self, x: T) -> T {
        (self.derivative_function::<T>())(x)
    }
}

impl Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationKind::Identity => write!(f, "identity"),
            ActivationKind::ReLU => write!(f, "relu"),
            ActivationKind::Sigmoid => write!(f, "sigmoid"),
            ActivationKind::Tanh => write!(f, "tanh"),
            ActivationKind::LeakyReLU => write!(f, "leaky-relu"),
            ActivationKind::ELU => write!(f, "elu"),
            ActivationKind::Swish => write!(f, "swish"),
            ActivationKind::GELU => write!(f, "gelu"),
            ActivationKind::Softmax => write!(f, "softmax"),
        }
    }
}

impl FromStr for ActivationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

pub fn identity<T: Scalar>(x: T) -> T {
    x
}

pub fn identity_derivative<T: Scalar>(_x: T) -> T {
    T::one()
}

pub fn relu<T: Scalar>(x: T) -> T {
    x.max(T::zero())
}

pub fn relu_derivative<T: Scalar>(x: T) -> T {
    if x > T::zero() { T::one() } else { T::zero() }
}

pub fn leaky_relu<T: Scalar>(x: T, alpha: T) -> T {
    if x > T::zero() { x } else { alpha * x }
}

pub fn leaky_relu_derivative<T: Scalar>(x: T, alpha: T) -> T {
    if x > T::zero() { T::one() } else { alpha }
}

pub fn sigmoid<T: Scalar>(x: T) -> T {
    let limit = T::lit(SIGMOID_CLAMP);
    let x = x.max(-limit).min(limit);
    T::one() / (T::one() + (-x).exp())
}

pub fn sigmoid_derivative<T: Scalar>(x: T) -> T {
    let s = sigmoid(x);
    s * (T::one() - s)
}

pub fn tanh<T: Scalar>(x: T) -> T {
    x.tanh()
}

pub fn tanh_derivative<T: Scalar>(x: T) -> T {
    let t = x.tanh();
    T::one() - t * t
}

pub fn elu<T: Scalar>(x: T, alpha: T) -> T {
    if x > T::zero() {
        x
    } else {
        alpha * (x.exp() - T::one())
    }
}

pub fn elu_derivative<T: Scalar>(x: T, alpha: T) -> T {
    if x > T::zero() { T::one() } else { alpha * x.exp() }
}

/// `x * sigmoid(x)`
pub fn swish<T: Scalar>(x: T) -> T {
    x * sigmoid(x)
}

pub fn swish_derivative<T: Scalar>(x: T) -> T {
    let s = sigmoid(x);
    let sw = x * s;
    sw + s * (T::one() - sw)
}

const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
const GELU_COEFF: f64 = 0.044_715;

/// GELU using the tanh approximation
pub fn gelu<T: Scalar>(x: T) -> T {
    let inner = T::lit(SQRT_2_OVER_PI) * (x + T::lit(GELU_COEFF) * x * x * x);
    T::lit(0.5) * x * (T::one() + inner.tanh())
}

pub fn gelu_derivative<T: Scalar>(x: T) -> T {
    let c = T::lit(SQRT_2_OVER_PI);
    let coeff = T::lit(GELU_COEFF);
    let x_squared = x * x;
    let inner = c * (x + coeff * x_squared * x);
    let tanh_inner = inner.tanh();
    let sech_squared = T::one() - tanh_inner * tanh_inner;
    T::lit(0.5) * (T::one() + tanh_inner)
        + T::lit(0.5) * x * sech_squared * c * (T::one() + T::lit(3.0) * coeff * x_squared)
}

/// Softmax over a vector. The maximum is subtracted before exponentiating so large inputs do
/// not overflow.
pub fn softmax<T: Scalar>(x: &[T]) -> Vec<T> {
    let Some(max) = x.iter().copied().reduce(T::max) else {
        return vec![];
    };
    let exps = x.iter().map(|&v| (v - max).exp()).collect::<Vec<_>>();
    let sum = exps.iter().copied().sum::<T>();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Entry `d softmax_i / d x_j` of the softmax Jacobian, `None` when either index is out of range
pub fn softmax_derivative<T: Scalar>(x: &[T], i: usize, j: usize) -> Option<T> {
    let sm = softmax(x);
    let (&si, &sj) = (sm.get(i)?, sm.get(j)?);
    Some(if i == j { si * (T::one() - si) } else { -si * sj })
}
