//! Data loader

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;

/// Errors for the dataloader
#[derive(Debug, Error, PartialEq)]
pub enum DataLoaderError {
    #[error(
        "All input vectors must have the same dimension. Received different sizes: {input_dims:?}"
    )]
    InputDimensionMismatch { input_dims: HashSet<usize> },
    #[error("Targets must have the same length as the data: {label_len} targets, {data_len} samples")]
    LabelLengthMismatch { label_len: usize, data_len: usize },
    #[error("Batch size must be positive")]
    ZeroBatchSize,
}

/// Data loader, returns batches of borrowed samples and targets optionally shuffled
/// Takes inspiration from the PyTorch DataLoader
/// <https://pytorch.org/docs/stable/data.html#torch.utils.data.DataLoader>
#[derive(Debug, Clone)]
pub struct DataLoader<'a, T> {
    data: &'a [Vec<T>],
    labels: &'a [Vec<T>],
    batch_size: usize,
    shuffle: bool,
}

impl<'a, T> DataLoader<'a, T> {
    pub fn new(
        data: &'a [Vec<T>],
        labels: &'a [Vec<T>],
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Self, DataLoaderError> {
        if batch_size == 0 {
            return Err(DataLoaderError::ZeroBatchSize);
        }
        if data.len() != labels.len() {
            return Err(DataLoaderError::LabelLengthMismatch {
                label_len: labels.len(),
                data_len: data.len(),
            });
        }
        let input_dims = data.iter().map(|d| d.len()).collect::<HashSet<_>>();
        if input_dims.len() > 1 {
            return Err(DataLoaderError::InputDimensionMismatch { input_dims });
        }
        Ok(Self {
            data,
            labels,
            batch_size,
            shuffle,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of batches per pass, the last one may be smaller than the batch size
    pub fn n_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }

    /// Iterates over one pass of the data. When shuffling, the permutation is drawn from `rng`.
    pub fn iter<R: Rng + ?Sized>(&self, rng: &mut R) -> DataLoaderIterator<'a, T> {
        let mut indices = (0..self.data.len()).collect::<Vec<_>>();
        if self.shuffle {
            indices.shuffle(rng);
        }
        DataLoaderIterator {
            data: self.data,
            labels: self.labels,
            batch_size: self.batch_size,
            indices,
            curr_iter: 0,
        }
    }
}

/// An iterator which returns mini batches of data and labels until the end of the dataset
pub struct DataLoaderIterator<'a, T> {
    data: &'a [Vec<T>],
    labels: &'a [Vec<T>],
    batch_size: usize,
    // optionally shuffled indices
    indices: Vec<usize>,
    curr_iter: usize,
}

impl<'a, T> Iterator for DataLoaderIterator<'a, T> {
    type Item = (Vec<&'a [T]>, Vec<&'a [T]>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr_iter >= self.data.len() {
            return None;
        }
        let end = (self.curr_iter + self.batch_size).min(self.data.len());
        let batch = &self.indices[self.curr_iter..end];
        let batch_data = batch
            .iter()
            .map(|&i| self.data[i].as_slice())
            .collect::<Vec<_>>();
        let batch_labels = batch
            .iter()
            .map(|&i| self.labels[i].as_slice())
            .collect::<Vec<_>>();
        self.curr_iter = end;
        Some((batch_data, batch_labels))
    }
}

/// Owned samples and targets
pub type Split<T> = (Vec<Vec<T>>, Vec<Vec<T>>);

/// Shuffles the samples and holds out `validation_split` of them (rounded down) for validation.
/// Returns `(train, validation)`.
pub fn train_validation_split<T: Clone, R: Rng + ?Sized>(
    data: &[Vec<T>],
    labels: &[Vec<T>],
    validation_split: f64,
    rng: &mut R,
) -> Result<(Split<T>, Split<T>), DataLoaderError> {
    if data.len() != labels.len() {
        return Err(DataLoaderError::LabelLengthMismatch {
            label_len: labels.len(),
            data_len: data.len(),
        });
    }
    let mut indices = (0..data.len()).collect::<Vec<_>>();
    indices.shuffle(rng);
    let n_val = (data.len() as f64 * validation_split.clamp(0.0, 1.0)).floor() as usize;
    let (val_idx, train_idx) = indices.split_at(n_val);
    let gather = |idx: &[usize]| -> Split<T> {
        (
            idx.iter().map(|&i| data[i].clone()).collect(),
            idx.iter().map(|&i| labels[i].clone()).collect(),
        )
    };
    Ok((gather(train_idx), gather(val_idx)))
}
