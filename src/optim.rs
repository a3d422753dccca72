//! Optimizer selection and the parameter update rule
//!
//! Only plain gradient descent has a numeric implementation. The other kinds are kept so
//! configurations and saved networks that name them still load; they update parameters exactly
//! like [`OptimizerKind::SGD`].

use std::fmt::{self, Display};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
pub enum OptimizerKind {
    #[value(name = "sgd")]
    #[serde(rename = "sgd")]
    SGD,
    #[default]
    #[value(name = "adam")]
    #[serde(rename = "adam")]
    Adam,
    #[value(name = "rmsprop")]
    #[serde(rename = "rmsprop")]
    RMSprop,
    #[value(name = "adagrad")]
    #[serde(rename = "adagrad")]
    AdaGrad,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 4] = [
        OptimizerKind::SGD,
        OptimizerKind::Adam,
        OptimizerKind::RMSprop,
        OptimizerKind::AdaGrad,
    ];

    pub fn code(self) -> i64 {
        match self {
            OptimizerKind::SGD => 0,
            OptimizerKind::Adam => 1,
            OptimizerKind::RMSprop => 2,
            OptimizerKind::AdaGrad => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::SGD => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::RMSprop => write!(f, "rmsprop"),
            OptimizerKind::AdaGrad => write!(f, "adagrad"),
        }
    }
}

/// Single gradient descent step on one parameter
pub fn step<T: Scalar>(param: T, lr: T, grad: T) -> T {
    param - lr * grad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_step() {
        assert_eq!(step(1.0f32, 0.1, 1.0), 0.9);
        assert_eq!(step(2.0f64, 0.5, -2.0), 3.0);
    }

    #[test]
    fn test_codes_round_trip() {
        for kind in OptimizerKind::ALL {
            assert_eq!(OptimizerKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(OptimizerKind::from_code(4), None);
        assert_eq!(OptimizerKind::Adam.code(), 1);
    }
}
