use crate::config::{BandpassFilterConfig, FilterBankConfig, OutputTransform};
use crate::error::{Error, Result};
use crate::processing::filter_bank::FilterBank;
use crate::processing::ring_buffer::RingBuffer;
use crate::utils::log::Logger;

use ndarray::{Array2, Axis};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<Error> for PyErr {
    fn from(err: Error) -> PyErr {
        match err {
            Error::IoError(_) => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

fn rows_to_array(rows: &[Vec<f64>], n_cols: usize) -> Result<Array2<f64>> {
    let mut array = Array2::zeros((rows.len(), n_cols));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n_cols {
            return Err(Error::ShapeMismatch {
                expected: vec![n_cols],
                actual: vec![row.len()],
            });
        }
        for (dst, &src) in array.row_mut(i).iter_mut().zip(row) {
            *dst = src;
        }
    }
    Ok(array)
}

/// `{name: [low_hz, high_hz]}` in insertion order.
fn bands_from_dict(bands: &Bound<'_, PyDict>) -> PyResult<Vec<BandpassFilterConfig>> {
    bands
        .iter()
        .map(|(name, range)| {
            let id: String = name.extract()?;
            let range: Vec<f64> = range.extract()?;
            match range.as_slice() {
                [f_low, f_high] => Ok(BandpassFilterConfig::new(&id, *f_low, *f_high)),
                _ => Err(Error::InvalidBand {
                    id,
                    reason: format!("expected [low_hz, high_hz], got {} values", range.len()),
                }
                .into()),
            }
        })
        .collect()
}

fn array_to_rows(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|row| row.to_vec()).collect()
}

// RING BUFFER -----------------------------------------------------------------

#[pyclass(name = "RingBuffer")]
pub struct PyRingBuffer {
    buffer: RingBuffer<f64>,
}

#[pymethods]
impl PyRingBuffer {
    #[new]
    pub fn new(capacity: usize, n_channels: usize) -> PyResult<Self> {
        Ok(PyRingBuffer {
            buffer: RingBuffer::new(capacity, &[n_channels], Logger::disabled())?,
        })
    }

    pub fn add_samples(&mut self, samples: Vec<Vec<f64>>, times: Vec<f64>) -> PyResult<()> {
        let n_channels = self.buffer.feature_shape()[0];
        let samples = rows_to_array(&samples, n_channels)?;
        self.buffer.add_samples(samples.view(), &times)?;
        Ok(())
    }

    pub fn unfold_buffer(&self) -> PyResult<Vec<Vec<f64>>> {
        let unfolded = self.buffer.unfold()?.into_dimensionality::<ndarray::Ix2>().map_err(Error::from)?;
        Ok(array_to_rows(&unfolded))
    }

    pub fn unfold_buffer_t(&self) -> Vec<f64> {
        self.buffer.unfold_times().to_vec()
    }

    #[getter]
    pub fn curr_i(&self) -> usize {
        self.buffer.write_index()
    }

    #[getter]
    pub fn last_t(&self) -> f64 {
        self.buffer.last_timestamp()
    }

    #[getter]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

// FILTER BANK -----------------------------------------------------------------

#[pyclass(name = "FilterBank")]
pub struct PyFilterBank {
    bank: FilterBank,
}

#[pymethods]
impl PyFilterBank {
    #[new]
    #[pyo3(signature = (bands, order=8, sfreq=1000.0, output="abs_ma", n_in_channels=1, filter_buffer_s=1.0, n_lookback=5))]
    pub fn new(
        bands: &Bound<'_, PyDict>,
        order: usize,
        sfreq: f64,
        output: &str,
        n_in_channels: usize,
        filter_buffer_s: f64,
        n_lookback: usize,
    ) -> PyResult<Self> {
        let config = FilterBankConfig {
            bands: bands_from_dict(bands)?,
            order,
            sample_rate_hz: sfreq,
            channel_count: n_in_channels,
            output_transform: output.parse::<OutputTransform>()?,
            ring_buffer_seconds: filter_buffer_s,
            lookback_samples: n_lookback,
        };
        Ok(PyFilterBank {
            bank: FilterBank::new(&config, Logger::disabled())?,
        })
    }

    pub fn filter(&mut self, data: Vec<Vec<f64>>, times: Vec<f64>) -> PyResult<()> {
        let data = rows_to_array(&data, self.bank.channel_names().len())?;
        self.bank.filter(data.view(), &times)?;
        Ok(())
    }

    /// Rows x channels x bands of post-processed new samples.
    pub fn get_data(&self) -> PyResult<Vec<Vec<Vec<f64>>>> {
        let data = self.bank.get_data()?;
        Ok(data
            .axis_iter(Axis(0))
            .map(|row| row.rows().into_iter().map(|ch| ch.to_vec()).collect())
            .collect())
    }

    pub fn consume(&mut self) {
        self.bank.consume();
    }

    pub fn set_output(&mut self, output: &str) -> PyResult<()> {
        self.bank.set_output_transform(output.parse::<OutputTransform>()?)?;
        Ok(())
    }

    #[getter]
    pub fn n_new(&self) -> usize {
        self.bank.pending_new_count()
    }

    #[setter]
    pub fn set_n_new(&mut self, n: usize) {
        self.bank.set_pending_new_count(n);
    }

    #[getter]
    pub fn ch_names(&self) -> Vec<String> {
        self.bank.channel_names().to_vec()
    }

    #[getter]
    pub fn band_names(&self) -> Vec<String> {
        self.bank.band_ids().into_iter().map(String::from).collect()
    }
}

/// A Python module implemented in Rust.
#[pymodule]
pub fn neurostream(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRingBuffer>()?;
    m.add_class::<PyFilterBank>()?;
    Ok(())
}
