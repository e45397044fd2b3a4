use super::inlet::{NumericSample, StreamInfo, StreamInlet, StreamResolver, ValueType};
use crate::config::StreamWatcherConfig;
use crate::error::{Error, Result};
use crate::processing::ring_buffer::RingBuffer;
use crate::utils::log::Logger;

use ndarray::{s, Array1, Array2, Ix2};

// -----------------------------------------------------------------------------
// BUFFERS
// -----------------------------------------------------------------------------

/// Ring buffer plus pull staging area for one numeric element type.
#[derive(Debug)]
pub struct NumericLane<T> {
    ring: RingBuffer<T>,
    staging: Array2<T>,
}

impl<T: NumericSample> NumericLane<T> {
    fn new(capacity: usize, n_channels: usize, max_chunk: usize, logger: &Logger) -> Result<Self> {
        Ok(Self {
            ring: RingBuffer::new(capacity, &[n_channels], logger.clone())?,
            staging: Array2::from_elem((max_chunk, n_channels), T::default()),
        })
    }

    fn pull(&mut self, inlet: &mut dyn StreamInlet) -> Result<usize> {
        let times = inlet.pull_numeric(T::chunk_mut(self.staging.view_mut()))?;
        let n = times.len();
        if n > 0 {
            self.ring
                .add_samples(self.staging.slice(s![..n, ..]), &times)?;
        }
        Ok(n)
    }

    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }

    pub fn staging(&self) -> &Array2<T> {
        &self.staging
    }

    /// Chronological contents converted to `f64`.
    fn unfold_f64(&self) -> Result<Array2<f64>> {
        Ok(self.ring.unfold()?.mapv(T::to_f64).into_dimensionality::<Ix2>()?)
    }
}

/// Storage of a connected stream, one variant per element type.
#[derive(Debug)]
pub enum WatcherBuffer {
    Float32(NumericLane<f32>),
    Float64(NumericLane<f64>),
    Int8(NumericLane<i8>),
    Int16(NumericLane<i16>),
    Int32(NumericLane<i32>),
    Int64(NumericLane<i64>),
    Text(RingBuffer<String>),
}

macro_rules! on_numeric_lane {
    ($buffer:expr, $lane:ident => $numeric:expr, $ring:ident => $text:expr) => {
        match $buffer {
            WatcherBuffer::Float32($lane) => $numeric,
            WatcherBuffer::Float64($lane) => $numeric,
            WatcherBuffer::Int8($lane) => $numeric,
            WatcherBuffer::Int16($lane) => $numeric,
            WatcherBuffer::Int32($lane) => $numeric,
            WatcherBuffer::Int64($lane) => $numeric,
            WatcherBuffer::Text($ring) => $text,
        }
    };
}

impl WatcherBuffer {
    fn new(
        value_type: ValueType,
        capacity: usize,
        n_channels: usize,
        max_chunk: usize,
        logger: &Logger,
    ) -> Result<Self> {
        Ok(match value_type {
            ValueType::Float32 => {
                WatcherBuffer::Float32(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::Float64 => {
                WatcherBuffer::Float64(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::Int8 => {
                WatcherBuffer::Int8(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::Int16 => {
                WatcherBuffer::Int16(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::Int32 => {
                WatcherBuffer::Int32(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::Int64 => {
                WatcherBuffer::Int64(NumericLane::new(capacity, n_channels, max_chunk, logger)?)
            }
            ValueType::String => {
                WatcherBuffer::Text(RingBuffer::new(capacity, &[n_channels], logger.clone())?)
            }
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            WatcherBuffer::Float32(_) => ValueType::Float32,
            WatcherBuffer::Float64(_) => ValueType::Float64,
            WatcherBuffer::Int8(_) => ValueType::Int8,
            WatcherBuffer::Int16(_) => ValueType::Int16,
            WatcherBuffer::Int32(_) => ValueType::Int32,
            WatcherBuffer::Int64(_) => ValueType::Int64,
            WatcherBuffer::Text(_) => ValueType::String,
        }
    }

    pub fn capacity(&self) -> usize {
        on_numeric_lane!(self, lane => lane.ring.capacity(), ring => ring.capacity())
    }

    /// Rows of the pull staging area, `0` for string streams.
    pub fn staging_rows(&self) -> usize {
        on_numeric_lane!(self, lane => lane.staging.nrows(), _ring => 0)
    }

    pub fn write_index(&self) -> usize {
        on_numeric_lane!(self, lane => lane.ring.write_index(), ring => ring.write_index())
    }

    pub fn last_timestamp(&self) -> f64 {
        on_numeric_lane!(self, lane => lane.ring.last_timestamp(), ring => ring.last_timestamp())
    }

    fn unfold_times(&self) -> Array1<f64> {
        on_numeric_lane!(self, lane => lane.ring.unfold_times(), ring => ring.unfold_times())
    }

    fn unfold_f64(&self) -> Result<Array2<f64>> {
        on_numeric_lane!(self, lane => lane.unfold_f64(), _ring => Err(Error::ValueTypeMismatch {
            expected: "numeric".to_string(),
            actual: ValueType::String.to_string(),
        }))
    }

    fn pull(&mut self, inlet: &mut dyn StreamInlet, max_chunk: usize) -> Result<usize> {
        on_numeric_lane!(self, lane => lane.pull(inlet), ring => {
            let (samples, times) = inlet.pull_text(max_chunk)?;
            if times.is_empty() {
                return Ok(0);
            }
            let n_channels = ring.feature_shape()[0];
            let mut rows = Array2::from_elem((samples.len(), n_channels), String::new());
            for (i, sample) in samples.into_iter().enumerate() {
                if sample.len() != n_channels {
                    return Err(Error::ShapeMismatch {
                        expected: vec![n_channels],
                        actual: vec![sample.len()],
                    });
                }
                for (dst, src) in rows.row_mut(i).iter_mut().zip(sample) {
                    *dst = src;
                }
            }
            ring.add_samples(rows.view(), &times)?;
            Ok(times.len())
        })
    }
}

// -----------------------------------------------------------------------------
// STREAM WATCHER
// -----------------------------------------------------------------------------

/// Keeps the most recent samples of one named stream in a ring buffer.
///
/// The buffer is sized once per connection from the stream's nominal rate
/// and its element type decides whether chunks are pulled through a typed
/// numeric staging area or as rows of strings.
#[derive(Debug)]
pub struct StreamWatcher {
    config: StreamWatcherConfig,
    inlet: Option<Box<dyn StreamInlet>>,
    buffer: Option<WatcherBuffer>,
    channel_names: Vec<String>,
    n_new: usize,
    logger: Logger,
}

impl StreamWatcher {
    pub fn new(config: StreamWatcherConfig, logger: Logger) -> Self {
        Self {
            config,
            inlet: None,
            buffer: None,
            channel_names: Vec::new(),
            n_new: 0,
            logger: logger.named("stream_watcher"),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StreamWatcherConfig {
        &self.config
    }

    /// Resolves the configured stream name and connects to the first match.
    pub fn connect(&mut self, resolver: &dyn StreamResolver) -> Result<()> {
        let name = self.config.name.clone();
        let streams = resolver.resolve_by_name(&name);
        let info = match streams.as_slice() {
            [] => return Err(Error::StreamNotFound(name)),
            [only] => only,
            [first, ..] => {
                self.logger.warning(format!(
                    "Selecting stream by name={:?} was ambiguous ({} streams) - taking first",
                    name,
                    streams.len()
                ));
                first
            }
        };

        let inlet = resolver.open_inlet(info)?;
        self.connect_inlet(inlet)
    }

    /// Switches to another stream name and connects to it.
    pub fn connect_to(&mut self, resolver: &dyn StreamResolver, name: &str) -> Result<()> {
        self.config.name = name.to_string();
        self.connect(resolver)
    }

    /// Sets up the buffer for an already opened inlet and pulls once.
    pub fn connect_inlet(&mut self, inlet: Box<dyn StreamInlet>) -> Result<()> {
        if self.config.max_chunk_samples == 0 {
            return Err(Error::InvalidConfig(
                "max_chunk_samples must be at least 1".to_string(),
            ));
        }

        let info = inlet.info().clone();
        let capacity = self.buffer_capacity(&info);
        let channel_names = info.resolved_channel_names();
        if info.channel_names.is_none() {
            self.logger.debug("No channel info - continue with default: ch_1, ch_2,...");
        }

        let buffer = WatcherBuffer::new(
            info.value_type,
            capacity,
            channel_names.len(),
            self.config.max_chunk_samples,
            &self.logger,
        )?;

        self.logger.info(format!(
            "Connected to stream {:?}: {} channels of {} at {} Hz, buffer of {} samples",
            info.name,
            channel_names.len(),
            info.value_type,
            info.nominal_srate,
            capacity
        ));

        self.config.name = info.name;
        self.channel_names = channel_names;
        self.buffer = Some(buffer);
        self.inlet = Some(inlet);
        self.n_new = 0;

        // the first pull is usually empty, get it out of the way
        self.update()?;
        Ok(())
    }

    fn buffer_capacity(&self, info: &StreamInfo) -> usize {
        if info.is_irregular() {
            self.config.irregular_capacity
        } else {
            (info.nominal_srate * self.config.buffer_seconds) as usize
        }
    }

    /// Pulls whatever arrived since the last call into the buffer.
    ///
    /// Returns the number of new samples, which is also added to `n_new`.
    pub fn update(&mut self) -> Result<usize> {
        let (inlet, buffer) = match (self.inlet.as_mut(), self.buffer.as_mut()) {
            (Some(inlet), Some(buffer)) => (inlet, buffer),
            _ => return Err(Error::NotConnected),
        };

        let n = buffer.pull(&mut **inlet, self.config.max_chunk_samples)?;
        self.n_new += n;
        Ok(n)
    }

    /// Drops the inlet and the buffer.
    pub fn disconnect(&mut self) {
        if let Some(inlet) = self.inlet.take() {
            self.logger.info(format!(
                "Disconnecting from stream {:?}",
                inlet.info().name
            ));
        }
        self.buffer = None;
        self.channel_names.clear();
        self.n_new = 0;
    }

    pub fn is_connected(&self) -> bool {
        self.inlet.is_some()
    }

    pub fn info(&self) -> Option<&StreamInfo> {
        self.inlet.as_ref().map(|inlet| inlet.info())
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.buffer.as_ref().map(WatcherBuffer::value_type)
    }

    pub fn buffer(&self) -> Result<&WatcherBuffer> {
        self.buffer.as_ref().ok_or(Error::NotConnected)
    }

    /// Samples pulled since `n_new` was last reset.
    pub fn n_new(&self) -> usize {
        self.n_new
    }

    pub fn set_n_new(&mut self, n: usize) {
        self.n_new = n;
    }

    pub fn reset_n_new(&mut self) {
        self.n_new = 0;
    }

    /// Chronological buffer contents of a numeric stream as `f64`,
    /// shaped `(capacity, channels)`.
    pub fn unfold(&self) -> Result<Array2<f64>> {
        self.buffer()?.unfold_f64()
    }

    /// Chronological buffer contents of a string stream.
    pub fn unfold_text(&self) -> Result<Array2<String>> {
        match self.buffer()? {
            WatcherBuffer::Text(ring) => Ok(ring.unfold()?.into_dimensionality::<Ix2>()?),
            other => Err(Error::ValueTypeMismatch {
                expected: ValueType::String.to_string(),
                actual: other.value_type().to_string(),
            }),
        }
    }

    pub fn unfold_times(&self) -> Result<Array1<f64>> {
        Ok(self.buffer()?.unfold_times())
    }

    /// The `n_new` most recent samples of a numeric stream, oldest first.
    pub fn new_samples(&self) -> Result<Array2<f64>> {
        let data = self.unfold()?;
        let n = self.n_new.min(data.nrows());
        Ok(data.slice(s![data.nrows() - n.., ..]).to_owned())
    }

    /// Timestamps of the `n_new` most recent samples, oldest first.
    pub fn new_times(&self) -> Result<Array1<f64>> {
        let times = self.unfold_times()?;
        let n = self.n_new.min(times.len());
        Ok(times.slice(s![times.len() - n..]).to_owned())
    }
}
