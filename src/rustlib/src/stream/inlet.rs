use crate::error::Result;

use ndarray::ArrayViewMut2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-sample element type announced by a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float32,
    #[serde(alias = "double64")]
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
}

impl ValueType {
    /// Parses a channel format name, falling back to `Float32` for anything
    /// unknown.
    pub fn from_format(format: &str) -> Self {
        match format.to_ascii_lowercase().as_str() {
            "float64" | "double64" | "double" => ValueType::Float64,
            "int8" => ValueType::Int8,
            "int16" => ValueType::Int16,
            "int32" => ValueType::Int32,
            "int64" => ValueType::Int64,
            "string" => ValueType::String,
            _ => ValueType::Float32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::String => "string",
        }
    }

    pub fn is_numeric(&self) -> bool {
        *self != ValueType::String
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a live stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    /// Unique id of the source, used to tell streams with equal names apart.
    pub source_id: String,
    /// Samples per second, `0.0` for irregular streams.
    pub nominal_srate: f64,
    pub channel_count: usize,
    pub channel_names: Option<Vec<String>>,
    pub value_type: ValueType,
}

impl StreamInfo {
    pub fn new(name: &str, channel_count: usize, nominal_srate: f64, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            stream_type: String::new(),
            source_id: String::new(),
            nominal_srate,
            channel_count,
            channel_names: None,
            value_type,
        }
    }

    pub fn with_type(mut self, stream_type: &str) -> Self {
        self.stream_type = stream_type.to_string();
        self
    }

    pub fn with_channel_names(mut self, names: Vec<String>) -> Self {
        self.channel_names = Some(names);
        self
    }

    pub fn is_irregular(&self) -> bool {
        !(self.nominal_srate.is_finite() && self.nominal_srate > 0.0)
    }

    /// Channel labels of the stream, `ch_1..ch_n` when none are provided or
    /// their number does not match the channel count.
    pub fn resolved_channel_names(&self) -> Vec<String> {
        match &self.channel_names {
            Some(names) if names.len() == self.channel_count => names.clone(),
            _ => (1..=self.channel_count).map(|i| format!("ch_{}", i)).collect(),
        }
    }
}

// NUMERIC SAMPLES -------------------------------------------------------------

/// Mutable staging area of one numeric element type that an inlet pulls into.
#[derive(Debug)]
pub enum NumericChunkMut<'a> {
    Float32(ArrayViewMut2<'a, f32>),
    Float64(ArrayViewMut2<'a, f64>),
    Int8(ArrayViewMut2<'a, i8>),
    Int16(ArrayViewMut2<'a, i16>),
    Int32(ArrayViewMut2<'a, i32>),
    Int64(ArrayViewMut2<'a, i64>),
}

impl NumericChunkMut<'_> {
    /// Number of rows that fit into the staging area.
    pub fn capacity(&self) -> usize {
        match self {
            NumericChunkMut::Float32(v) => v.nrows(),
            NumericChunkMut::Float64(v) => v.nrows(),
            NumericChunkMut::Int8(v) => v.nrows(),
            NumericChunkMut::Int16(v) => v.nrows(),
            NumericChunkMut::Int32(v) => v.nrows(),
            NumericChunkMut::Int64(v) => v.nrows(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            NumericChunkMut::Float32(_) => ValueType::Float32,
            NumericChunkMut::Float64(_) => ValueType::Float64,
            NumericChunkMut::Int8(_) => ValueType::Int8,
            NumericChunkMut::Int16(_) => ValueType::Int16,
            NumericChunkMut::Int32(_) => ValueType::Int32,
            NumericChunkMut::Int64(_) => ValueType::Int64,
        }
    }

    /// Writes `values` into row `index`, casting to the element type.
    pub fn set_row(&mut self, index: usize, values: &[f64]) {
        match self {
            NumericChunkMut::Float32(v) => assign_row(v, index, values),
            NumericChunkMut::Float64(v) => assign_row(v, index, values),
            NumericChunkMut::Int8(v) => assign_row(v, index, values),
            NumericChunkMut::Int16(v) => assign_row(v, index, values),
            NumericChunkMut::Int32(v) => assign_row(v, index, values),
            NumericChunkMut::Int64(v) => assign_row(v, index, values),
        }
    }
}

fn assign_row<T: NumericSample>(view: &mut ArrayViewMut2<'_, T>, index: usize, values: &[f64]) {
    for (dst, &src) in view.row_mut(index).iter_mut().zip(values) {
        *dst = T::from_f64(src);
    }
}

/// Element types a numeric stream can carry.
pub trait NumericSample: Copy + Default + Send + fmt::Debug + 'static {
    const VALUE_TYPE: ValueType;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn chunk_mut(view: ArrayViewMut2<'_, Self>) -> NumericChunkMut<'_>;
}

macro_rules! numeric_sample {
    ($ty:ty, $variant:ident) => {
        impl NumericSample for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn chunk_mut(view: ArrayViewMut2<'_, Self>) -> NumericChunkMut<'_> {
                NumericChunkMut::$variant(view)
            }
        }
    };
}

numeric_sample!(f32, Float32);
numeric_sample!(f64, Float64);
numeric_sample!(i8, Int8);
numeric_sample!(i16, Int16);
numeric_sample!(i32, Int32);
numeric_sample!(i64, Int64);

// PRODUCER INTERFACE ----------------------------------------------------------

/// A connection to one live stream.
pub trait StreamInlet: Send {
    fn info(&self) -> &StreamInfo;

    /// Pulls up to `dest.capacity()` samples into the leading rows of `dest`
    /// and returns one timestamp per written row. Returns an empty vector if
    /// nothing new arrived.
    fn pull_numeric(&mut self, dest: NumericChunkMut<'_>) -> Result<Vec<f64>>;

    /// Pulls up to `max_samples` rows of a string stream.
    fn pull_text(&mut self, max_samples: usize) -> Result<(Vec<Vec<String>>, Vec<f64>)>;
}

impl fmt::Debug for dyn StreamInlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamInlet")
            .field("name", &self.info().name)
            .field("source_id", &self.info().source_id)
            .finish()
    }
}

/// Discovery of live streams.
pub trait StreamResolver {
    /// All streams currently announced under `name`.
    fn resolve_by_name(&self, name: &str) -> Vec<StreamInfo>;

    fn open_inlet(&self, info: &StreamInfo) -> Result<Box<dyn StreamInlet>>;

    fn stream_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn value_type_from_format() {
        assert_eq!(ValueType::from_format("double64"), ValueType::Float64);
        assert_eq!(ValueType::from_format("INT16"), ValueType::Int16);
        assert_eq!(ValueType::from_format("string"), ValueType::String);
        assert_eq!(ValueType::from_format("something"), ValueType::Float32);
        assert!(!ValueType::String.is_numeric());
        assert_eq!(ValueType::Int64.to_string(), "int64");
    }

    #[test]
    fn channel_names_fall_back_to_numbered() {
        let info = StreamInfo::new("eeg", 3, 100.0, ValueType::Float32);
        assert_eq!(info.resolved_channel_names(), vec!["ch_1", "ch_2", "ch_3"]);

        let named = info
            .clone()
            .with_channel_names(vec!["Fz".into(), "Cz".into(), "Pz".into()]);
        assert_eq!(named.resolved_channel_names(), vec!["Fz", "Cz", "Pz"]);

        let inconsistent = info.with_channel_names(vec!["Fz".into()]);
        assert_eq!(inconsistent.resolved_channel_names().len(), 3);
    }

    #[test]
    fn irregular_rate() {
        assert!(StreamInfo::new("m", 1, 0.0, ValueType::String).is_irregular());
        assert!(!StreamInfo::new("m", 1, 250.0, ValueType::Float32).is_irregular());
    }

    #[test]
    fn set_row_casts_to_element_type() {
        let mut staging = Array2::<i16>::zeros((4, 2));
        let mut chunk = i16::chunk_mut(staging.view_mut());
        assert_eq!(chunk.capacity(), 4);
        assert_eq!(chunk.value_type(), ValueType::Int16);
        chunk.set_row(1, &[3.0, -7.0]);

        assert_eq!(staging.row(1).to_vec(), vec![3, -7]);
        assert_eq!(staging.row(0).to_vec(), vec![0, 0]);
    }
}
