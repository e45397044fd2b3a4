use crate::error::{Error, Result};
use crate::utils::log::Logger;

use ndarray::{s, Array1, Array2, ArrayD, ArrayView, ArrayView2, Dimension};
use std::ops::Range;

/// Where the rows of an insertion batch land in the buffer.
///
/// `buffer[i]` receives `samples[i]` for each pair of ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPlan {
    /// No wrap, or an exact fill up to the end of the buffer.
    Contiguous {
        buffer: Range<usize>,
        new_index: usize,
    },
    /// The head of the batch fills up to the end, the tail starts over at 0.
    Split {
        head: Range<usize>,
        tail: Range<usize>,
        split_at: usize,
        new_index: usize,
    },
}

impl InsertPlan {
    pub fn new_index(&self) -> usize {
        match self {
            InsertPlan::Contiguous { new_index, .. } | InsertPlan::Split { new_index, .. } => {
                *new_index
            }
        }
    }
}

/// Fixed-capacity circular store of `(sample, timestamp)` rows.
///
/// Each row has a fixed `feature_shape` (e.g. `[channels]` or
/// `[channels, bands]`) and is stored flattened, row-major. The buffer is
/// filled with `T::default()` at construction, so slots that were never
/// written read back as zero in `unfold`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Array2<T>,
    times: Vec<f64>,
    feature_shape: Vec<usize>,
    write_index: usize,
    last_timestamp: f64,
    logger: Logger,
}

impl<T: Clone + Default> RingBuffer<T> {
    pub fn new(capacity: usize, feature_shape: &[usize], logger: Logger) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "ring buffer capacity must be at least one row".to_string(),
            ));
        }
        if feature_shape.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "ring buffer feature shape {:?} has an empty dimension",
                feature_shape
            )));
        }

        let row_len = feature_shape.iter().product::<usize>();
        Ok(Self {
            data: Array2::from_elem((capacity, row_len), T::default()),
            times: vec![0.0; capacity],
            feature_shape: feature_shape.to_vec(),
            write_index: 0,
            last_timestamp: 0.0,
            logger: logger.named("ring_buffer"),
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.nrows()
    }

    pub fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    /// Index of the next row to be written.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Timestamp of the most recently inserted row, `0.0` before any insert.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// Physical layout of the buffer, one flattened row per sample.
    pub fn data(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Physical layout of the timestamps.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn insert_plan(&self, n_samples: usize) -> InsertPlan {
        let capacity = self.capacity();
        let old_index = self.write_index;
        let new_index = (old_index + n_samples) % capacity;

        if old_index < new_index {
            InsertPlan::Contiguous {
                buffer: old_index..new_index,
                new_index,
            }
        } else if new_index == 0 {
            InsertPlan::Contiguous {
                buffer: old_index..capacity,
                new_index,
            }
        } else {
            let n_full = capacity - old_index;
            InsertPlan::Split {
                head: old_index..capacity,
                tail: 0..new_index,
                split_at: n_full,
                new_index,
            }
        }
    }

    /// Inserts a batch of rows with one timestamp per row.
    ///
    /// The first axis of `samples` is the row axis, the remaining axes must
    /// equal `feature_shape`. An empty batch is a no-op (reported at warning
    /// level), a batch larger than the capacity keeps only its most recent
    /// `capacity` rows. Mismatched lengths or shapes are rejected before
    /// anything is written.
    pub fn add_samples<D: Dimension>(
        &mut self,
        samples: ArrayView<'_, T, D>,
        times: &[f64],
    ) -> Result<()> {
        let shape = samples.shape();
        if shape.is_empty() || shape[1..] != self.feature_shape[..] {
            return Err(Error::ShapeMismatch {
                expected: self.feature_shape.clone(),
                actual: shape.get(1..).map(|s| s.to_vec()).unwrap_or_default(),
            });
        }

        let n_samples = shape[0];
        if n_samples != times.len() {
            return Err(Error::LengthMismatch {
                samples: n_samples,
                times: times.len(),
            });
        }

        if n_samples == 0 {
            self.logger
                .warning("Received empty data, not adding to buffer");
            return Ok(());
        }

        let row_len = self.data.ncols();
        let flat = samples.to_shape((n_samples, row_len))?;

        let capacity = self.capacity();
        let offset = if n_samples > capacity {
            self.logger.warning(format!(
                "Received {} samples for a buffer of {} rows. Will only add data to fill \
                 buffer once with the latest data",
                n_samples, capacity
            ));
            n_samples - capacity
        } else {
            0
        };
        let flat = flat.slice(s![offset.., ..]);
        let times = &times[offset..];
        let n = times.len();

        let plan = self.insert_plan(n);
        match &plan {
            InsertPlan::Contiguous { buffer, .. } => {
                self.data
                    .slice_mut(s![buffer.clone(), ..])
                    .assign(&flat);
                self.times[buffer.clone()].copy_from_slice(times);
            }
            InsertPlan::Split {
                head,
                tail,
                split_at,
                ..
            } => {
                self.logger.debug("Splitting data to add as buffer is full");
                self.data
                    .slice_mut(s![head.clone(), ..])
                    .assign(&flat.slice(s![..*split_at, ..]));
                self.data
                    .slice_mut(s![tail.clone(), ..])
                    .assign(&flat.slice(s![*split_at.., ..]));
                self.times[head.clone()].copy_from_slice(&times[..*split_at]);
                self.times[tail.clone()].copy_from_slice(&times[*split_at..]);
            }
        }

        self.write_index = plan.new_index();
        self.last_timestamp = times[n - 1];
        Ok(())
    }

    /// All rows in chronological order, oldest first, shaped
    /// `[capacity, feature_shape...]`.
    pub fn unfold(&self) -> Result<ArrayD<T>> {
        self.latest(self.capacity())
    }

    /// Timestamps in chronological order, oldest first.
    pub fn unfold_times(&self) -> Array1<f64> {
        self.times[self.write_index..]
            .iter()
            .chain(&self.times[..self.write_index])
            .copied()
            .collect()
    }

    /// The `n` most recent rows, oldest first. `n` is clamped to the capacity.
    pub fn latest(&self, n: usize) -> Result<ArrayD<T>> {
        let rows = self.latest_rows(n);
        let mut shape = Vec::with_capacity(self.feature_shape.len() + 1);
        shape.push(rows.nrows());
        shape.extend_from_slice(&self.feature_shape);
        Ok(rows.into_shape_with_order(shape)?)
    }

    /// Timestamps of the `n` most recent rows, oldest first.
    pub fn latest_times(&self, n: usize) -> Array1<f64> {
        let (start, first, n) = self.latest_span(n);
        self.times[start..start + first]
            .iter()
            .chain(&self.times[..n - first])
            .copied()
            .collect()
    }

    /// Physical start of the `n` most recent rows, how many of them lie
    /// before the end of the buffer, and `n` clamped to the capacity.
    fn latest_span(&self, n: usize) -> (usize, usize, usize) {
        let capacity = self.capacity();
        let n = n.min(capacity);
        let start = (self.write_index + capacity - n) % capacity;
        let first = (capacity - start).min(n);
        (start, first, n)
    }

    fn latest_rows(&self, n: usize) -> Array2<T> {
        let (start, first, n) = self.latest_span(n);
        let mut rows = Array2::from_elem((n, self.data.ncols()), T::default());
        rows.slice_mut(s![..first, ..])
            .assign(&self.data.slice(s![start..start + first, ..]));
        if first < n {
            rows.slice_mut(s![first.., ..])
                .assign(&self.data.slice(s![..n - first, ..]));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use ndarray::{Array, Array3};

    fn ones(rows: usize, cols: usize, value: f32) -> Array2<f32> {
        Array2::from_elem((rows, cols), value)
    }

    fn arange(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn init_is_zero_filled() {
        let rb = RingBuffer::<f32>::new(10, &[3], Logger::disabled()).unwrap();
        assert_eq!(rb.capacity(), 10);
        assert_eq!(rb.data().shape(), &[10, 3]);
        assert!(rb.data().iter().all(|&v| v == 0.0));
        assert_eq!(rb.write_index(), 0);
        assert_eq!(rb.last_timestamp(), 0.0);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(RingBuffer::<f32>::new(0, &[3], Logger::disabled()).is_err());
        assert!(RingBuffer::<f32>::new(4, &[3, 0], Logger::disabled()).is_err());
    }

    #[test]
    fn adding_and_wrapping_around() {
        let mut rb = RingBuffer::<f32>::new(10, &[3], Logger::disabled()).unwrap();
        let rb2 = RingBuffer::<f32>::new(10, &[3], Logger::disabled()).unwrap();

        rb.add_samples(ones(5, 3, 1.0).view(), &arange(5)).unwrap();
        assert!(rb.data().slice(s![..5, ..]).iter().all(|&v| v == 1.0));
        assert!(rb.data().slice(s![5.., ..]).iter().all(|&v| v == 0.0));

        // buffers should not be linked
        assert!(rb2.data().iter().all(|&v| v == 0.0));

        rb.add_samples(ones(7, 3, 3.0).view(), &arange(7)).unwrap();
        assert_eq!(rb.write_index(), 2);
        assert!(rb.data().slice(s![..2, ..]).iter().all(|&v| v == 3.0));
        assert!(rb.data().slice(s![2..5, ..]).iter().all(|&v| v == 1.0));
        assert!(rb.data().slice(s![5.., ..]).iter().all(|&v| v == 3.0));
        assert_eq!(rb.last_timestamp(), 6.0);
    }

    #[test]
    fn unfold_puts_newest_last() {
        let mut rb = RingBuffer::<f32>::new(10, &[3], Logger::disabled()).unwrap();
        rb.add_samples(ones(5, 3, 1.0).view(), &arange(5)).unwrap();

        let d = rb.unfold().unwrap();
        assert_eq!(d.shape(), &[10, 3]);
        assert!(d.slice(s![5.., ..]).iter().all(|&v| v == 1.0));
        assert!(d.slice(s![..5, ..]).iter().all(|&v| v == 0.0));

        let t = rb.unfold_times();
        assert_eq!(t.as_slice().unwrap(), &[0., 0., 0., 0., 0., 0., 1., 2., 3., 4.]);
    }

    #[test]
    fn insert_plan_cases() {
        let mut rb = RingBuffer::<f64>::new(10, &[1], Logger::disabled()).unwrap();
        assert_eq!(
            rb.insert_plan(4),
            InsertPlan::Contiguous {
                buffer: 0..4,
                new_index: 4
            }
        );
        assert_eq!(
            rb.insert_plan(10),
            InsertPlan::Contiguous {
                buffer: 0..10,
                new_index: 0
            }
        );

        rb.add_samples(Array2::<f64>::zeros((6, 1)).view(), &arange(6))
            .unwrap();
        assert_eq!(
            rb.insert_plan(4),
            InsertPlan::Contiguous {
                buffer: 6..10,
                new_index: 0
            }
        );
        assert_eq!(
            rb.insert_plan(7),
            InsertPlan::Split {
                head: 6..10,
                tail: 0..3,
                split_at: 4,
                new_index: 3
            }
        );
        // a full batch starting mid-buffer wraps back onto the write index
        assert_eq!(
            rb.insert_plan(10),
            InsertPlan::Split {
                head: 6..10,
                tail: 0..6,
                split_at: 4,
                new_index: 6
            }
        );
    }

    #[test]
    fn multi_dimensional_adding() {
        let mut rb = RingBuffer::<f32>::new(10, &[3, 2], Logger::disabled()).unwrap();
        assert_eq!(rb.data().shape(), &[10, 6]);

        rb.add_samples(Array3::<f32>::ones((5, 3, 2)).view(), &arange(5))
            .unwrap();
        assert!(rb.data().slice(s![..5, ..]).iter().all(|&v| v == 1.0));

        let x = Array3::<f32>::from_elem((7, 3, 2), 3.0);
        rb.add_samples(x.view(), &arange(7)).unwrap();
        assert!(rb.data().slice(s![..2, ..]).iter().all(|&v| v == 3.0));
        assert!(rb.data().slice(s![5.., ..]).iter().all(|&v| v == 3.0));
        assert!(rb.data().slice(s![2..5, ..]).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn oversized_input_keeps_latest_rows() {
        let logger = Logger::memory(LogLevel::Debug);
        let mut rb = RingBuffer::<f32>::new(10, &[3, 2], logger.clone()).unwrap();

        let x = Array::from_shape_fn((15, 3, 2), |(i, _, _)| i as f32);
        rb.add_samples(x.view(), &arange(15)).unwrap();

        let unfolded = rb.unfold().unwrap();
        assert_eq!(unfolded.shape(), &[10, 3, 2]);
        for (row, expected) in unfolded.outer_iter().zip(5..15) {
            assert!(row.iter().all(|&v| v == expected as f32));
        }
        assert_eq!(rb.unfold_times().to_vec(), arange(15)[5..].to_vec());
        assert_eq!(rb.last_timestamp(), 14.0);
        assert_eq!(logger.count(LogLevel::Warning), 1);
    }

    #[test]
    fn empty_input_is_a_warned_noop() {
        let logger = Logger::memory(LogLevel::Debug);
        let mut rb = RingBuffer::<f64>::new(4, &[2], logger.clone()).unwrap();
        rb.add_samples(Array2::from_elem((3, 2), 7.0).view(), &[1.0, 2.0, 3.0])
            .unwrap();
        let before = rb.clone();

        rb.add_samples(Array2::<f64>::zeros((0, 2)).view(), &[])
            .unwrap();

        assert_eq!(rb.write_index(), before.write_index());
        assert_eq!(rb.last_timestamp(), before.last_timestamp());
        assert_eq!(rb.data(), before.data());
        assert_eq!(rb.times(), before.times());
        assert_eq!(logger.count(LogLevel::Warning), 1);
    }

    #[test]
    fn mismatches_are_rejected_without_writing() {
        let mut rb = RingBuffer::<f64>::new(4, &[2], Logger::disabled()).unwrap();

        let err = rb
            .add_samples(Array2::<f64>::ones((3, 2)).view(), &[0.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { samples: 3, times: 2 }));

        let err = rb
            .add_samples(Array2::<f64>::ones((2, 3)).view(), &[0.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        assert_eq!(rb.write_index(), 0);
        assert!(rb.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn scalar_rows() {
        let mut rb = RingBuffer::<i32>::new(3, &[], Logger::disabled()).unwrap();
        rb.add_samples(ndarray::arr1(&[1, 2, 3, 4]).view(), &[0.0, 1.0, 2.0, 3.0])
            .unwrap();
        let unfolded: Vec<i32> = rb.unfold().unwrap().iter().copied().collect();
        assert_eq!(unfolded, vec![2, 3, 4]);
    }

    #[test]
    fn latest_returns_most_recent_rows() {
        let mut rb = RingBuffer::<f64>::new(5, &[1], Logger::disabled()).unwrap();
        let x = Array2::from_shape_fn((7, 1), |(i, _)| i as f64);
        rb.add_samples(x.view(), &arange(7)).unwrap();

        let last3 = rb.latest(3).unwrap();
        assert_eq!(last3.iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0, 6.0]);
        assert_eq!(rb.latest_times(3).to_vec(), vec![4.0, 5.0, 6.0]);
        assert_eq!(rb.latest(50).unwrap().shape(), &[5, 1]);
        assert_eq!(rb.latest(0).unwrap().shape(), &[0, 1]);
    }

    #[test]
    fn latest_times_match_unfolded_tail() {
        let mut rb = RingBuffer::<f64>::new(6, &[2], Logger::disabled()).unwrap();
        let x = Array2::<f64>::zeros((4, 2));

        for batch in 0..4 {
            let times: Vec<f64> = (0..4).map(|i| (batch * 4 + i) as f64 * 0.5).collect();
            rb.add_samples(x.view(), &times).unwrap();

            let all = rb.unfold_times();
            for n in 0..=6 {
                assert_eq!(rb.latest_times(n), all.slice(s![6 - n..]));
            }
            assert_eq!(rb.latest_times(100), all);
        }
    }

    #[test]
    fn text_rows() {
        let mut rb = RingBuffer::<String>::new(3, &[1], Logger::disabled()).unwrap();
        let rows = Array2::from_shape_vec(
            (2, 1),
            vec!["Marker - 1".to_string(), "Marker - 2".to_string()],
        )
        .unwrap();
        rb.add_samples(rows.view(), &[0.5, 0.75]).unwrap();

        assert_eq!(rb.data()[[0, 0]], "Marker - 1");
        assert_eq!(rb.data()[[2, 0]], "");
        assert_eq!(rb.last_timestamp(), 0.75);
    }
}
