//! Cooperative control of a training run and its per-epoch record

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::scalar::Scalar;

#[derive(Debug, Default)]
struct ControlState {
    training: AtomicBool,
    stop_requested: AtomicBool,
    /// `f64` bits of the progress fraction
    progress: AtomicU64,
}

/// Shared view of a network's training state. Clones observe and control the same run, so a
/// handle can be sent to another thread before training starts.
///
/// A stop request is honoured at the next epoch boundary.
#[derive(Debug, Clone, Default)]
pub struct TrainingHandle {
    state: Arc<ControlState>,
}

impl TrainingHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_training(&self) -> bool {
        self.state.training.load(Ordering::SeqCst)
    }

    /// Asks the running training loop to stop. Does nothing else.
    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested.load(Ordering::SeqCst)
    }

    /// Fraction of epochs completed in `[0, 1]`
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.state.progress.load(Ordering::SeqCst))
    }

    pub(crate) fn begin(&self) {
        self.state.stop_requested.store(false, Ordering::SeqCst);
        self.set_progress(0.0);
        self.state.training.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self) {
        self.state.training.store(false, Ordering::SeqCst);
        self.set_progress(1.0);
    }

    pub(crate) fn set_progress(&self, progress: f64) {
        self.state
            .progress
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.state.training.store(false, Ordering::SeqCst);
        self.state.stop_requested.store(false, Ordering::SeqCst);
        self.set_progress(0.0);
    }
}

pub type EpochCallback<'a, T> = Box<dyn FnMut(usize, T, T) + 'a>;

/// Options of [`crate::network::Network::train`]
pub struct TrainOptions<'a, T> {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub validation: Option<(&'a [Vec<T>], &'a [Vec<T>])>,
    /// Called after every epoch with `(epoch, loss, accuracy)`
    pub callback: Option<EpochCallback<'a, T>>,
}

impl<'a, T: Scalar> TrainOptions<'a, T> {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        Self {
            epochs,
            batch_size,
            shuffle: true,
            validation: None,
            callback: None,
        }
    }

    pub fn with_validation(mut self, inputs: &'a [Vec<T>], targets: &'a [Vec<T>]) -> Self {
        self.validation = Some((inputs, targets));
        self
    }

    pub fn with_callback(mut self, callback: impl FnMut(usize, T, T) + 'a) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

/// How a training run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    Completed,
    Stopped,
}

/// Per-epoch metrics of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingHistory<T> {
    pub train_loss: Vec<T>,
    pub train_accuracy: Vec<T>,
    pub val_loss: Vec<T>,
    pub val_accuracy: Vec<T>,
    pub outcome: TrainingOutcome,
}

impl<T> Default for TrainingHistory<T> {
    fn default() -> Self {
        Self {
            train_loss: vec![],
            train_accuracy: vec![],
            val_loss: vec![],
            val_accuracy: vec![],
            outcome: TrainingOutcome::Completed,
        }
    }
}

impl<T: Scalar> TrainingHistory<T> {
    pub fn epochs_run(&self) -> usize {
        self.train_loss.len()
    }

    pub fn final_loss(&self) -> Option<T> {
        self.train_loss.last().copied()
    }

    pub fn final_accuracy(&self) -> Option<T> {
        self.train_accuracy.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_lifecycle() {
        let handle = TrainingHandle::new();
        assert!(!handle.is_training());
        assert_eq!(handle.progress(), 0.0);

        handle.stop();
        handle.begin();
        // a new run clears a stale stop request
        assert!(!handle.stop_requested());
        assert!(handle.is_training());

        handle.set_progress(0.25);
        assert_eq!(handle.progress(), 0.25);
        handle.set_progress(3.0);
        assert_eq!(handle.progress(), 1.0);

        handle.finish();
        assert!(!handle.is_training());
        assert_eq!(handle.progress(), 1.0);

        handle.reset();
        assert_eq!(handle.progress(), 0.0);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = TrainingHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.stop()).join().unwrap();
        assert!(handle.stop_requested());
    }

    #[test]
    fn test_options_callback() {
        let mut seen = vec![];
        {
            let mut options = TrainOptions::<f32>::new(3, 2)
                .with_shuffle(false)
                .with_callback(|epoch, loss, _| seen.push((epoch, loss)));
            assert!(!options.shuffle);
            if let Some(callback) = options.callback.as_mut() {
                callback(0, 0.5, 1.0);
            }
        }
        assert_eq!(seen, vec![(0, 0.5)]);
    }
}
