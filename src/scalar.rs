//! Floating point bound shared by every component of the network

use std::{
    fmt::{Debug, Display},
    iter::Sum,
};

use num_traits::Float;
use serde::{Serialize, de::DeserializeOwned};

/// Numeric type a network is built on. Implemented for `f32` and `f64`.
pub trait Scalar:
    Float + Sum + Default + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Converts a constant written as `f64` into this precision
    fn lit(value: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl Scalar for f32 {
    fn lit(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    fn lit(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[macro_export]
    macro_rules! assert_eq_float {
        ($a:expr, $b:expr) => {
            assert!((($a) - ($b)).abs() < 1e-6, "{} != {}", $a, $b);
        };
        ($a:expr, $b:expr, $tol:expr) => {
            assert!((($a) - ($b)).abs() < $tol, "{} != {}", $a, $b);
        };
    }

    #[test]
    fn test_lit_round_trip() {
        assert_eq!(f32::lit(0.5), 0.5f32);
        assert_eq!(f64::lit(0.1), 0.1f64);
        assert_eq!(0.25f32.as_f64(), 0.25);
    }
}
