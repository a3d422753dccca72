//! Generates small classification datasets and utilities for plotting them, decision boundaries
//! and training curves
//!
//! By convention class 0 is plotted in red and class 1 is plotted in blue.

use std::{
    error::Error,
    f64::consts::PI,
    fmt::{self, Display},
};

use clap::ValueEnum;
use plotters::{
    chart::ChartBuilder,
    element::PathElement,
    prelude::{BitMapBackend, Circle, IntoDrawingArea, Rectangle},
    series::LineSeries,
    style::{BLACK, BLUE, Color, GREEN, MAGENTA, RED, RGBColor, WHITE},
};
use rand::Rng;

use crate::{network::Network, scalar::Scalar, training::TrainingHistory};

/// Toggles between dataset types
#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// The four rows of the XOR truth table with a single 0/1 target
    Truth,
    Line,
    Circle,
    #[value(name = "xor")]
    XOR,
    Moon,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Truth => write!(f, "truth"),
            Dataset::Line => write!(f, "line"),
            Dataset::Circle => write!(f, "circle"),
            Dataset::XOR => write!(f, "xor"),
            Dataset::Moon => write!(f, "moon"),
        }
    }
}

impl Dataset {
    /// Generates the samples and targets. Targets are one hot encoded over two classes, except
    /// for [`Dataset::Truth`] which has a single target and ignores `class_size`.
    pub fn generate<T: Scalar, R: Rng>(
        self,
        class_size: usize,
        rng: &mut R,
    ) -> (Vec<Vec<T>>, Vec<Vec<T>>) {
        let (data, classes) = match self {
            Dataset::Truth => return gen_truth_table(),
            Dataset::Line => gen_linear_data(class_size, rng),
            Dataset::Circle => gen_circle_data(class_size, rng),
            Dataset::XOR => gen_xor_data(class_size, rng),
            Dataset::Moon => gen_moon_data(class_size, rng),
        };
        let data = data
            .into_iter()
            .map(|[x, y]| vec![T::lit(x), T::lit(y)])
            .collect();
        let labels = classes.into_iter().map(one_hot).collect();
        (data, labels)
    }

    /// Range of both plot axes
    pub fn bounds(self) -> (f32, f32) {
        match self {
            Dataset::Truth => (-0.5, 1.5),
            _ => (-6.0, 6.0),
        }
    }

    /// Number of network outputs the targets need
    pub fn n_outputs(self) -> usize {
        match self {
            Dataset::Truth => 1,
            _ => 2,
        }
    }
}

fn one_hot<T: Scalar>(class: usize) -> Vec<T> {
    (0..2)
        .map(|i| if i == class { T::one() } else { T::zero() })
        .collect()
}

/// The XOR truth table
pub fn gen_truth_table<T: Scalar>() -> (Vec<Vec<T>>, Vec<Vec<T>>) {
    let rows = [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)];
    rows.iter()
        .map(|&(a, b, y)| (vec![T::lit(a), T::lit(b)], vec![T::lit(y)]))
        .unzip()
}

type Points = (Vec<[f64; 2]>, Vec<usize>);

/// Generates a simple linearly separable dataset
pub fn gen_linear_data<R: Rng>(class_size: usize, rng: &mut R) -> Points {
    let mut data = Vec::new();
    let mut labels = Vec::new();

    for _ in 0..class_size {
        let x = rng.random_range(-5.0..5.0);
        let y = rng.random_range(-5.0..5.0);
        data.push([x, y]);
        labels.push(if x > y { 0 } else { 1 });
    }

    (data, labels)
}

/// Generates a binary classification dataset of two concentric circles
pub fn gen_circle_data<R: Rng>(class_size: usize, rng: &mut R) -> Points {
    let mut data = Vec::new();
    let mut labels = Vec::new();

    for (class, radius) in [(0, 3.0), (1, 5.0)] {
        for _ in 0..class_size {
            let angle: f64 = rng.random_range(0.0..2.0 * PI);
            let radius_delta = radius * rng.random_range(-0.25..0.25);
            let x = (radius + radius_delta) * angle.cos();
            let y = (radius + radius_delta) * angle.sin();
            data.push([x, y]);
            labels.push(class);
        }
    }

    (data, labels)
}

/// Points of the plane labelled by the sign of `x * y`, class 0 in the first and third quadrants
pub fn gen_xor_data<R: Rng>(class_size: usize, rng: &mut R) -> Points {
    let mut data = Vec::new();
    let mut labels = Vec::new();

    for _ in 0..class_size {
        let x = rng.random_range(-5.0..5.0);
        let y = rng.random_range(-5.0..5.0);
        data.push([x, y]);
        labels.push(if x > 0.0 && y > 0.0 || x < 0.0 && y < 0.0 { 0 } else { 1 });
    }

    (data, labels)
}

/// Generates a moons dataset (two interleaving partial circles)
pub fn gen_moon_data<R: Rng>(class_size: usize, rng: &mut R) -> Points {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    let radius = 3.0;

    for class in [0, 1] {
        for _ in 0..class_size {
            let theta: f64 = rng.random_range(PI * -1.0 / 4.0..PI * 5.0 / 4.0);
            let (x, y) = if class == 0 {
                (radius * theta.cos(), radius * theta.sin())
            } else {
                (radius * theta.cos() + 2.0, -radius * theta.sin() - 0.2)
            };
            let noise_x = rng.random_range(-0.1..0.1);
            let noise_y = rng.random_range(-0.1..0.1);
            data.push([x + noise_x, y + noise_y]);
            labels.push(class);
        }
    }

    (data, labels)
}

/// Returns the class of a target or output. A single value is thresholded at 0.5, otherwise
/// the index of the maximum value is taken.
pub fn get_class<T: Scalar>(label: &[T]) -> usize {
    match label {
        [value] => usize::from(*value > T::lit(0.5)),
        _ => label
            .iter()
            .enumerate()
            .fold((0, T::neg_infinity()), |best, (i, &v)| {
                if v > best.1 { (i, v) } else { best }
            })
            .0,
    }
}

fn to_point<T: Scalar>(sample: &[T]) -> (f32, f32) {
    (sample[0].as_f64() as f32, sample[1].as_f64() as f32)
}

/// Plots the data points and labels for a given dataset
pub fn plot_data<T: Scalar>(
    data: &[Vec<T>],
    labels: &[Vec<T>],
    file_name: &str,
    dataset: Dataset,
) -> Result<(), Box<dyn Error>> {
    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let (lo, hi) = dataset.bounds();
    let mut chart = ChartBuilder::on(&root_area)
        .caption(format!("Dataset: {}", dataset), ("sans-serif", 50))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(lo..hi, lo..hi)?;

    chart.configure_mesh().draw()?;

    chart.draw_series(data.iter().zip(labels.iter()).map(|(sample, label)| {
        let color = if get_class(label) == 0 { RED } else { BLUE };
        Circle::new(to_point(sample), 3, color.filled())
    }))?;

    root_area.present()?;
    log::info!("Data plot has been saved to '{}'.", file_name);

    Ok(())
}

/// Plots the decision boundary of a network on a given dataset by sampling a grid of points and
/// predicting each of them
pub fn plot_decision_boundary<T: Scalar>(
    network: &mut Network<T>,
    file_name: &str,
    dataset: Dataset,
    data: &[Vec<T>],
    labels: &[Vec<T>],
) -> Result<(), Box<dyn Error>> {
    let (grid_min, grid_max) = dataset.bounds();
    let step = (grid_max - grid_min) / 60.0;
    let n_steps = ((grid_max - grid_min) / step).round() as i32;

    let mut cells = Vec::with_capacity((n_steps * n_steps) as usize);
    for xi in 0..n_steps {
        let x = grid_min + xi as f32 * step;
        for yi in 0..n_steps {
            let y = grid_min + yi as f32 * step;
            let output = network.predict(&[T::lit(x as f64), T::lit(y as f64)])?;
            cells.push((x, y, get_class(&output)));
        }
    }

    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .caption(
            format!("Decision Boundary for {}", dataset),
            ("sans-serif", 50),
        )
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(grid_min..grid_max, grid_min..grid_max)?;

    chart.configure_mesh().draw()?;

    let red_bg = RGBColor(255, 200, 200);
    let blue_bg = RGBColor(200, 200, 255);

    chart.draw_series(cells.into_iter().map(|(x, y, class)| {
        let color = if class == 0 { red_bg } else { blue_bg };
        Rectangle::new(
            [
                (x - step / 2.0, y - step / 2.0),
                (x + step / 2.0, y + step / 2.0),
            ],
            color.filled(),
        )
    }))?;

    // plot the data points
    chart.draw_series(data.iter().zip(labels.iter()).map(|(sample, label)| {
        let color = if get_class(label) == 0 { RED } else { BLUE };
        Circle::new(to_point(sample), 3, color.filled())
    }))?;

    root_area.present()?;
    log::info!("Decision boundary plot saved to '{}'.", file_name);
    Ok(())
}

/// Plots the per-epoch loss and accuracy curves of a training run
pub fn plot_history<T: Scalar>(
    history: &TrainingHistory<T>,
    file_name: &str,
) -> Result<(), Box<dyn Error>> {
    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let curves = [
        ("train loss", &history.train_loss, RED),
        ("train accuracy", &history.train_accuracy, BLUE),
        ("validation loss", &history.val_loss, MAGENTA),
        ("validation accuracy", &history.val_accuracy, GREEN),
    ];
    let y_max = curves
        .iter()
        .flat_map(|(_, values, _)| values.iter())
        .map(|v| v.as_f64() as f32)
        .filter(|v| v.is_finite())
        .fold(1.0f32, f32::max);

    let mut chart = ChartBuilder::on(&root_area)
        .caption("Training history", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0..history.epochs_run().max(1), 0.0f32..y_max)?;

    chart.configure_mesh().x_desc("epoch").draw()?;

    for (label, values, color) in curves {
        if values.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(
                values
                    .iter()
                    .enumerate()
                    .map(|(epoch, v)| (epoch, v.as_f64() as f32)),
                color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root_area.present()?;
    log::info!("Training history plot saved to '{}'.", file_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    #[test]
    fn test_truth_table() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);
        let (data, labels) = Dataset::Truth.generate::<f32, _>(100, &mut rng);
        assert_eq!(data.len(), 4);
        assert_eq!(data[1], vec![0.0, 1.0]);
        assert_eq!(labels, vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]]);
    }

    #[test]
    fn test_generated_sizes_and_one_hot_labels() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        for (dataset, expected) in [
            (Dataset::Line, 50),
            (Dataset::Circle, 100),
            (Dataset::XOR, 50),
            (Dataset::Moon, 100),
        ] {
            let (data, labels) = dataset.generate::<f64, _>(50, &mut rng);
            assert_eq!(data.len(), expected, "{}", dataset);
            assert_eq!(labels.len(), expected);
            assert!(data.iter().all(|d| d.len() == 2));
            assert!(labels.iter().all(|l| l.len() == 2 && l.iter().sum::<f64>() == 1.0));
        }
    }

    #[test]
    fn test_xor_labels_follow_quadrants() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let (data, labels) = Dataset::XOR.generate::<f64, _>(200, &mut rng);
        for (sample, label) in data.iter().zip(labels.iter()) {
            let same_sign = sample[0] * sample[1] > 0.0;
            assert_eq!(get_class(label) == 0, same_sign);
        }
    }

    #[test]
    fn test_get_class() {
        assert_eq!(get_class(&[0.7f32]), 1);
        assert_eq!(get_class(&[0.2f32]), 0);
        assert_eq!(get_class(&[0.1f64, 0.6, 0.3]), 1);
        assert_eq!(get_class(&[0.5f64, 0.5]), 0);
    }
}
