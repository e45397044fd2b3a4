//! In-process streams: an outlet that producers push into and inlets that
//! pull from it, plus a registry that resolves them by name.

use super::inlet::{NumericChunkMut, StreamInfo, StreamInlet, StreamResolver, ValueType};
use crate::error::{Error, Result};

use ndarray::ArrayView2;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
enum Row {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

type Queue = Arc<Mutex<VecDeque<(Row, f64)>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer side of an in-process stream.
///
/// Every inlet opened on the outlet receives its own copy of all samples
/// pushed after it was opened.
#[derive(Debug, Clone)]
pub struct ReplayOutlet {
    info: StreamInfo,
    subscribers: Arc<Mutex<Vec<Queue>>>,
}

impl ReplayOutlet {
    pub fn new(info: StreamInfo) -> Self {
        Self {
            info,
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn open_inlet(&self) -> ReplayInlet {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        lock(&self.subscribers).push(Arc::clone(&queue));
        ReplayInlet {
            info: self.info.clone(),
            queue,
        }
    }

    /// Pushes `rows x channels` numeric samples with one timestamp per row.
    pub fn push_chunk(&self, samples: ArrayView2<'_, f64>, times: &[f64]) -> Result<()> {
        if !self.info.value_type.is_numeric() {
            return Err(Error::ValueTypeMismatch {
                expected: self.info.value_type.to_string(),
                actual: "numeric".to_string(),
            });
        }
        self.check_shape(samples.nrows(), samples.ncols(), times.len())?;

        let rows = samples
            .rows()
            .into_iter()
            .map(|row| Row::Numeric(row.to_vec()));
        self.publish(rows.zip(times.iter().copied()));
        Ok(())
    }

    pub fn push_sample(&self, sample: &[f64], time: f64) -> Result<()> {
        let view = ArrayView2::from_shape((1, sample.len()), sample)?;
        self.push_chunk(view, &[time])
    }

    /// Pushes rows of a string stream.
    pub fn push_text(&self, samples: &[Vec<String>], times: &[f64]) -> Result<()> {
        if self.info.value_type != ValueType::String {
            return Err(Error::ValueTypeMismatch {
                expected: self.info.value_type.to_string(),
                actual: ValueType::String.to_string(),
            });
        }
        let n_cols = samples
            .iter()
            .map(Vec::len)
            .find(|&len| len != self.info.channel_count)
            .unwrap_or(self.info.channel_count);
        self.check_shape(samples.len(), n_cols, times.len())?;

        let rows = samples.iter().map(|row| Row::Text(row.clone()));
        self.publish(rows.zip(times.iter().copied()));
        Ok(())
    }

    fn check_shape(&self, n_rows: usize, n_cols: usize, n_times: usize) -> Result<()> {
        if n_cols != self.info.channel_count {
            return Err(Error::ShapeMismatch {
                expected: vec![self.info.channel_count],
                actual: vec![n_cols],
            });
        }
        if n_rows != n_times {
            return Err(Error::LengthMismatch {
                samples: n_rows,
                times: n_times,
            });
        }
        Ok(())
    }

    fn publish(&self, entries: impl Iterator<Item = (Row, f64)>) {
        let entries: Vec<(Row, f64)> = entries.collect();
        for queue in lock(&self.subscribers).iter() {
            lock(queue).extend(entries.iter().cloned());
        }
    }
}

/// Consumer side of a `ReplayOutlet`.
#[derive(Debug)]
pub struct ReplayInlet {
    info: StreamInfo,
    queue: Queue,
}

impl ReplayInlet {
    /// Samples waiting to be pulled.
    pub fn available(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl StreamInlet for ReplayInlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn pull_numeric(&mut self, mut dest: NumericChunkMut<'_>) -> Result<Vec<f64>> {
        let mut queue = lock(&self.queue);
        let n = queue.len().min(dest.capacity());
        let mut times = Vec::with_capacity(n);

        for (i, (row, time)) in queue.drain(..n).enumerate() {
            match row {
                Row::Numeric(values) => dest.set_row(i, &values),
                Row::Text(_) => {
                    return Err(Error::ValueTypeMismatch {
                        expected: dest.value_type().to_string(),
                        actual: ValueType::String.to_string(),
                    })
                }
            }
            times.push(time);
        }
        Ok(times)
    }

    fn pull_text(&mut self, max_samples: usize) -> Result<(Vec<Vec<String>>, Vec<f64>)> {
        let mut queue = lock(&self.queue);
        let n = queue.len().min(max_samples);
        let mut samples = Vec::with_capacity(n);
        let mut times = Vec::with_capacity(n);

        for (row, time) in queue.drain(..n) {
            match row {
                Row::Text(values) => samples.push(values),
                Row::Numeric(values) => samples.push(values.iter().map(f64::to_string).collect()),
            }
            times.push(time);
        }
        Ok((samples, times))
    }
}

/// Resolves in-process outlets by name.
#[derive(Debug, Default)]
pub struct ReplayRegistry {
    outlets: Vec<ReplayOutlet>,
}

impl ReplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an outlet and announces it. The registry assigns the source id.
    pub fn create_outlet(&mut self, mut info: StreamInfo) -> ReplayOutlet {
        info.source_id = format!("replay-{}", self.outlets.len());
        let outlet = ReplayOutlet::new(info);
        self.outlets.push(outlet.clone());
        outlet
    }

    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }
}

impl StreamResolver for ReplayRegistry {
    fn resolve_by_name(&self, name: &str) -> Vec<StreamInfo> {
        self.outlets
            .iter()
            .filter(|outlet| outlet.info().name == name)
            .map(|outlet| outlet.info().clone())
            .collect()
    }

    fn open_inlet(&self, info: &StreamInfo) -> Result<Box<dyn StreamInlet>> {
        self.outlets
            .iter()
            .find(|outlet| outlet.info().source_id == info.source_id)
            .map(|outlet| Box::new(outlet.open_inlet()) as Box<dyn StreamInlet>)
            .ok_or_else(|| Error::StreamNotFound(info.name.clone()))
    }

    fn stream_names(&self) -> Vec<String> {
        self.outlets
            .iter()
            .map(|outlet| outlet.info().name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::inlet::NumericSample;
    use ndarray::{array, Array2};

    #[test]
    fn inlets_receive_samples_pushed_after_opening() {
        let outlet = ReplayOutlet::new(StreamInfo::new("test", 2, 100.0, ValueType::Float64));
        outlet.push_sample(&[1.0, 2.0], 0.0).unwrap();

        let mut first = outlet.open_inlet();
        outlet.push_chunk(array![[1.0, 2.0], [3.0, 4.0]].view(), &[0.01, 0.02]).unwrap();
        let second = outlet.open_inlet();
        outlet.push_sample(&[5.0, 6.0], 0.03).unwrap();

        assert_eq!(first.available(), 3);
        assert_eq!(second.available(), 1);

        let mut staging = Array2::<f64>::zeros((2, 2));
        let times = first.pull_numeric(f64::chunk_mut(staging.view_mut())).unwrap();
        assert_eq!(times, vec![0.01, 0.02]);
        assert_eq!(staging, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(first.available(), 1);
    }

    #[test]
    fn outlet_validates_pushes() {
        let numeric = ReplayOutlet::new(StreamInfo::new("n", 2, 100.0, ValueType::Int32));
        assert!(matches!(
            numeric.push_sample(&[1.0, 2.0, 3.0], 0.0),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            numeric.push_text(&[vec!["a".to_string(), "b".to_string()]], &[0.0]),
            Err(Error::ValueTypeMismatch { .. })
        ));

        let text = ReplayOutlet::new(StreamInfo::new("t", 1, 0.0, ValueType::String));
        assert!(matches!(
            text.push_sample(&[1.0], 0.0),
            Err(Error::ValueTypeMismatch { .. })
        ));
        assert!(matches!(
            text.push_text(&[vec!["a".to_string()]], &[0.0, 1.0]),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = ReplayRegistry::new();
        registry.create_outlet(StreamInfo::new("eeg", 4, 500.0, ValueType::Float32));
        let markers = registry.create_outlet(StreamInfo::new("markers", 1, 0.0, ValueType::String));
        registry.create_outlet(StreamInfo::new("eeg", 8, 500.0, ValueType::Float32));

        assert_eq!(registry.stream_names(), vec!["eeg", "markers", "eeg"]);
        let found = registry.resolve_by_name("eeg");
        assert_eq!(found.len(), 2);
        assert_ne!(found[0].source_id, found[1].source_id);
        assert!(registry.resolve_by_name("emg").is_empty());

        let mut inlet = registry.open_inlet(markers.info()).unwrap();
        markers
            .push_text(&[vec!["start".to_string()]], &[1.5])
            .unwrap();
        let (samples, times) = inlet.pull_text(10).unwrap();
        assert_eq!(samples, vec![vec!["start".to_string()]]);
        assert_eq!(times, vec![1.5]);

        let unknown = StreamInfo::new("ghost", 1, 0.0, ValueType::String);
        assert!(matches!(
            registry.open_inlet(&unknown),
            Err(Error::StreamNotFound(_))
        ));
    }
}
