//! Trains a small feedforward network on a synthetic dataset using the library provided by
//! `ffnet`
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run -- -h
//! RUST_LOG=info cargo run
//! RUST_LOG=info cargo run -- --dataset circle --hidden-units 8 --epochs 200 --plot
//! ```
//!
//! The trained network is saved as JSON and reloaded to check the saved file reproduces it.

use std::{error::Error, fs, path::Path};

use clap::Parser;
use ffnet::{
    activation::ActivationKind,
    config::{LayerConfig, NetworkConfig, TrainingConfig},
    dataloader::train_validation_split,
    datasets::{Dataset, plot_data, plot_decision_boundary, plot_history},
    init::InitKind,
    loss::LossKind,
    network::Network,
    training::TrainOptions,
};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

#[derive(Parser)]
struct Args {
    #[clap(short, long, default_value_t = Dataset::Truth)]
    dataset: Dataset,
    /// Samples per class, ignored by the truth table
    #[clap(short, long, default_value_t = 200)]
    class_size: usize,
    #[clap(short, long, default_value_t = 4)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 1000)]
    epochs: usize,
    #[clap(short, long, default_value_t = 0.1)]
    lr: f64,
    #[clap(long, default_value_t = 4)]
    hidden_units: usize,
    #[clap(long, default_value_t = ActivationKind::ReLU)]
    hidden_activation: ActivationKind,
    #[clap(long, default_value_t = ActivationKind::Sigmoid)]
    output_activation: ActivationKind,
    #[clap(long, default_value_t = InitKind::Xavier)]
    init: InitKind,
    #[clap(long, default_value_t = LossKind::MeanSquaredError)]
    loss: LossKind,
    /// Dropout rate of the hidden layer
    #[clap(long, default_value_t = 0.0)]
    dropout: f64,
    /// Fraction of the samples held out for validation, the truth table is never split
    #[clap(long, default_value_t = 0.2)]
    validation_split: f64,
    /// Seeds dataset generation and the network, random when omitted
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long, default_value_t = 100)]
    print_epochs: usize,
    #[clap(short, long, default_value_t = format!("output"))]
    output_dir: String,
    #[clap(short, long, default_value_t = format!("network.json"))]
    model_file: String,
    /// Saves dataset, training history and decision boundary plots to the output directory
    #[clap(long, default_value_t = false)]
    plot: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => Pcg64Mcg::seed_from_u64(seed),
        None => Pcg64Mcg::from_rng(&mut rand::rng()),
    };
    fs::create_dir_all(&args.output_dir)?;

    let (data, labels) = args.dataset.generate::<f32, _>(args.class_size, &mut rng);
    if args.plot {
        plot_data(
            &data,
            &labels,
            &format!("{}/dataset_{}.png", args.output_dir, args.dataset),
            args.dataset,
        )?;
    }

    let validation_split = if args.dataset == Dataset::Truth {
        0.0
    } else {
        args.validation_split
    };
    let ((train_x, train_y), (val_x, val_y)) =
        train_validation_split(&data, &labels, validation_split, &mut rng)?;

    let mut config = NetworkConfig::new(format!("{}-classifier", args.dataset))
        .with_layer(LayerConfig::new(2, ActivationKind::Identity).with_name("input"))
        .with_layer(
            LayerConfig::new(args.hidden_units, args.hidden_activation)
                .with_name("hidden")
                .with_dropout(args.dropout)
                .with_init(args.init),
        )
        .with_layer(
            LayerConfig::new(args.dataset.n_outputs(), args.output_activation)
                .with_name("output")
                .with_init(args.init),
        )
        .with_loss(args.loss)
        .with_training(TrainingConfig {
            learning_rate: args.lr,
            batch_size: args.batch_size,
            epochs: args.epochs,
            validation_split,
            shuffle: true,
        });
    config.seed = args.seed;

    let mut network = Network::<f32>::from_config(&config)?;
    log::info!("{}", network.summary());

    let print_every = args.print_epochs.max(1);
    let mut options = TrainOptions::<f32>::new(config.training.epochs, config.training.batch_size)
        .with_shuffle(config.training.shuffle)
        .with_callback(|epoch, loss, accuracy| {
            if (epoch + 1) % print_every == 0 {
                log::info!("epoch: {}, loss: {:.6}, accuracy: {:.4}", epoch + 1, loss, accuracy);
            }
        });
    if !val_x.is_empty() {
        options = options.with_validation(&val_x, &val_y);
    }
    let history = network.train(&train_x, &train_y, options)?;

    let (loss, accuracy) = network.evaluate(&data, &labels)?;
    log::info!(
        "Finished after {} epochs: loss {:.6}, accuracy {:.4}",
        history.epochs_run(),
        loss,
        accuracy
    );
    if let (Some(val_loss), Some(val_accuracy)) =
        (history.val_loss.last(), history.val_accuracy.last())
    {
        log::info!("Validation loss {:.6}, accuracy {:.4}", val_loss, val_accuracy);
    }
    if args.dataset == Dataset::Truth {
        for (input, target) in data.iter().zip(labels.iter()) {
            let output = network.predict(input)?;
            log::info!("{:?} -> {:.4} (target {})", input, output[0], target[0]);
        }
    }

    let model_path = Path::new(&args.output_dir).join(&args.model_file);
    network.save_to_file(&model_path)?;
    let mut restored = Network::<f32>::new("restored");
    restored.load_from_file(&model_path)?;
    let (restored_loss, _) = restored.evaluate(&data, &labels)?;
    log::info!(
        "Reloaded '{}' from {}: loss {:.6}",
        restored.name(),
        model_path.display(),
        restored_loss
    );

    if args.plot {
        plot_history(
            &history,
            &format!("{}/history_{}.png", args.output_dir, args.dataset),
        )?;
        plot_decision_boundary(
            &mut network,
            &format!("{}/decision_boundary_{}.png", args.output_dir, args.dataset),
            args.dataset,
            &data,
            &labels,
        )?;
    }

    Ok(())
}
