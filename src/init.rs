//! Weight initialization strategies
//!
//! Each strategy draws one weight from a fan-in/fan-out pair. Randomness always comes from the
//! generator passed in by the caller so initialization is reproducible under a seed.

use std::fmt::{self, Display};

use clap::ValueEnum;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;

/// Toggles between initialization strategies. The integer codes are stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
pub enum InitKind {
    /// Uniform in `[-1, 1]`
    #[value(name = "random")]
    #[serde(rename = "random")]
    Random,
    #[default]
    #[value(name = "xavier")]
    #[serde(rename = "xavier")]
    Xavier,
    #[value(name = "he")]
    #[serde(rename = "he")]
    He,
    #[value(name = "zero")]
    #[serde(rename = "zero")]
    Zero,
    #[value(name = "one")]
    #[serde(rename = "one")]
    One,
    #[value(name = "lecun")]
    #[serde(rename = "lecun")]
    LeCun,
    /// Standard normal
    #[value(name = "normal")]
    #[serde(rename = "normal")]
    Normal,
}

impl InitKind {
    pub const ALL: [InitKind; 7] = [
        InitKind::Random,
        InitKind::Xavier,
        InitKind::He,
        InitKind::Zero,
        InitKind::One,
        InitKind::LeCun,
        InitKind::Normal,
    ];

    pub fn code(self) -> i64 {
        match self {
            InitKind::Random => 0,
            InitKind::Xavier => 1,
            InitKind::He => 2,
            InitKind::Zero => 3,
            InitKind::One => 4,
            InitKind::LeCun => 5,
            InitKind::Normal => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Value a constant strategy assigns to every weight and bias, `None` for random strategies
    pub fn constant<T: Scalar>(self) -> Option<T> {
        match self {
            InitKind::Zero => Some(T::zero()),
            InitKind::One => Some(T::one()),
            _ => None,
        }
    }

    /// Draws a single weight
    pub fn draw<T: Scalar, R: Rng>(self, rng: &mut R, fan_in: usize, fan_out: usize) -> T {
        match self {
            InitKind::Random => uniform(rng, -T::one(), T::one()),
            InitKind::Xavier => xavier(rng, fan_in, fan_out),
            InitKind::He => he(rng, fan_in),
            InitKind::LeCun => lecun(rng, fan_in),
            InitKind::Normal => normal(rng, T::zero(), T::one()),
            InitKind::Zero => T::zero(),
            InitKind::One => T::one(),
        }
    }

    /// Initial bias. Only the constant strategies give a non-zero bias.
    pub fn bias<T: Scalar>(self) -> T {
        self.constant().unwrap_or_else(T::zero)
    }
}

impl Display for InitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitKind::Random => write!(f, "random"),
            InitKind::Xavier => write!(f, "xavier"),
            InitKind::He => write!(f, "he"),
            InitKind::Zero => write!(f, "zero"),
            InitKind::One => write!(f, "one"),
            InitKind::LeCun => write!(f, "lecun"),
            InitKind::Normal => write!(f, "normal"),
        }
    }
}

/// Uniform in `[min, max]`. Degenerate or non-finite bounds collapse to `min`.
pub fn uniform<T: Scalar, R: Rng>(rng: &mut R, min: T, max: T) -> T {
    let (lo, hi) = (min.as_f64(), max.as_f64());
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return min;
    }
    T::lit(rng.random_range(lo..=hi))
}

/// Normal with the given mean and standard deviation
pub fn normal<T: Scalar, R: Rng>(rng: &mut R, mean: T, std_dev: T) -> T {
    let z: f64 = rng.sample(StandardNormal);
    mean + std_dev * T::lit(z)
}

/// Xavier/Glorot: uniform in `±sqrt(6 / (fan_in + fan_out))`
pub fn xavier<T: Scalar, R: Rng>(rng: &mut R, fan_in: usize, fan_out: usize) -> T {
    let fan = fan_in + fan_out;
    if fan == 0 {
        return T::zero();
    }
    let limit = T::lit((6.0 / fan as f64).sqrt());
    uniform(rng, -limit, limit)
}

/// He: normal with standard deviation `sqrt(2 / fan_in)`, suited to ReLU layers
pub fn he<T: Scalar, R: Rng>(rng: &mut R, fan_in: usize) -> T {
    if fan_in == 0 {
        return T::zero();
    }
    normal(rng, T::zero(), T::lit((2.0 / fan_in as f64).sqrt()))
}

/// LeCun: normal with standard deviation `sqrt(1 / fan_in)`
pub fn lecun<T: Scalar, R: Rng>(rng: &mut R, fan_in: usize) -> T {
    if fan_in == 0 {
        return T::zero();
    }
    normal(rng, T::zero(), T::lit((1.0 / fan_in as f64).sqrt()))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    #[test]
    fn test_xavier_within_limit() {
        let mut rng = Pcg64Mcg::seed_from_u64(42);
        let limit = (6.0f64 / (3 + 5) as f64).sqrt();
        for _ in 0..1000 {
            let w: f64 = xavier(&mut rng, 3, 5);
            assert!(w.abs() <= limit);
        }
    }

    #[test]
    fn test_he_statistics() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let n = 20_000;
        let samples = (0..n).map(|_| he::<f64, _>(&mut rng, 8)).collect::<Vec<_>>();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.02);
        // expected variance 2 / fan_in
        assert!((var - 0.25).abs() < 0.02);
    }

    #[test]
    fn test_constants_and_bias() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);
        assert_eq!(InitKind::Zero.draw::<f32, _>(&mut rng, 4, 4), 0.0);
        assert_eq!(InitKind::One.draw::<f32, _>(&mut rng, 4, 4), 1.0);
        assert_eq!(InitKind::One.bias::<f32>(), 1.0);
        assert_eq!(InitKind::He.bias::<f32>(), 0.0);
        assert_eq!(InitKind::Xavier.constant::<f32>(), None);
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let draws = |seed| {
            let mut rng = Pcg64Mcg::seed_from_u64(seed);
            InitKind::ALL
                .iter()
                .map(|kind| kind.draw::<f64, _>(&mut rng, 4, 2))
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(3), draws(3));
    }

    #[test]
    fn test_degenerate_fans() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        assert_eq!(xavier::<f32, _>(&mut rng, 0, 0), 0.0);
        assert_eq!(he::<f32, _>(&mut rng, 0), 0.0);
        assert_eq!(uniform(&mut rng, 2.0f32, 2.0), 2.0);
    }

    #[test]
    fn test_codes_round_trip() {
        for kind in InitKind::ALL {
            assert_eq!(InitKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(InitKind::from_code(7), None);
    }
}
