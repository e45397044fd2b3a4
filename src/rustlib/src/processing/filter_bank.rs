use super::filters::bandpass::BandPassFilter;
use super::filters::sos::{SecondOrderSections, SectionState};
use super::ring_buffer::RingBuffer;
use super::transforms;
use crate::config::{FilterBankConfig, OutputTransform};
use crate::error::{Error, Result};
use crate::utils::log::Logger;

use ndarray::{s, Array3, ArrayView2, Axis, Ix3};
use std::collections::HashSet;

// -----------------------------------------------------------------------------
// FILTER BANK
// -----------------------------------------------------------------------------

/// A bank of causal band-pass filters over multi-channel data.
///
/// Every call to `filter` runs each band over each channel with the state
/// left behind by the previous call, so filtering a signal chunk by chunk
/// gives exactly the same output as filtering it in one go. Filtered rows
/// are stored as `(channels, bands)` in a ring buffer and read back through
/// the configured output transform by `get_data`.
#[derive(Debug)]
pub struct FilterBank {
    bands: Vec<BandPassFilter>,
    /// Indexed `[band][channel]`, one entry per second-order section.
    states: Vec<Vec<Vec<SectionState>>>,
    ring_buffer: RingBuffer<f64>,
    channel_names: Vec<String>,
    output_transform: OutputTransform,
    lookback: usize,
    pending_new_count: usize,
    logger: Logger,
}

impl FilterBank {
    /// Designs every band and allocates the output buffer.
    ///
    /// Invalid bands, duplicate band ids or an unusable buffer size are
    /// reported here, never on the first `filter` call.
    pub fn new(config: &FilterBankConfig, logger: Logger) -> Result<Self> {
        let logger = logger.named("filter_bank");

        if config.bands.is_empty() {
            return Err(Error::InvalidConfig(
                "filter bank needs at least one band".to_string(),
            ));
        }
        if config.channel_count == 0 {
            return Err(Error::InvalidConfig(
                "filter bank needs at least one channel".to_string(),
            ));
        }
        if config.output_transform == OutputTransform::AbsMovingAverage
            && config.lookback_samples == 0
        {
            return Err(Error::InvalidConfig(
                "lookback_samples must be at least 1 for abs_moving_average".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut bands = Vec::with_capacity(config.bands.len());
        for band in &config.bands {
            if !seen.insert(band.id.as_str()) {
                return Err(Error::InvalidBand {
                    id: band.id.clone(),
                    reason: "band id is declared twice".to_string(),
                });
            }
            bands.push(BandPassFilter::new(
                band.clone(),
                config.order,
                config.sample_rate_hz,
            )?);
        }

        let capacity_seconds = config.sample_rate_hz * config.ring_buffer_seconds;
        if !(capacity_seconds.is_finite() && capacity_seconds >= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "ring buffer of {} s at {} Hz holds no samples",
                config.ring_buffer_seconds, config.sample_rate_hz
            )));
        }
        let capacity = capacity_seconds as usize;

        let n_channels = config.channel_count;
        let states = bands
            .iter()
            .map(|band| vec![band.initial_state(); n_channels])
            .collect();
        let ring_buffer = RingBuffer::new(capacity, &[n_channels, bands.len()], logger.clone())?;

        logger.info(format!(
            "Created filter bank with {} bands x {} channels, order {}, {} Hz, buffer of {} samples",
            bands.len(),
            n_channels,
            config.order,
            config.sample_rate_hz,
            capacity
        ));

        Ok(Self {
            bands,
            states,
            ring_buffer,
            channel_names: (0..n_channels).map(|i| format!("ch_{}", i)).collect(),
            output_transform: config.output_transform,
            lookback: config.lookback_samples,
            pending_new_count: 0,
            logger,
        })
    }

    /// Filters a `rows x channels` chunk and appends the result to the buffer.
    ///
    /// Shape and length are checked before any state is touched; on error the
    /// filter states, the buffer and the pending count are left unchanged.
    pub fn filter(&mut self, data: ArrayView2<'_, f64>, times: &[f64]) -> Result<()> {
        let n_channels = self.channel_names.len();
        if data.ncols() != n_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![n_channels],
                actual: vec![data.ncols()],
            });
        }
        let n_samples = data.nrows();
        if n_samples != times.len() {
            return Err(Error::LengthMismatch {
                samples: n_samples,
                times: times.len(),
            });
        }

        // rows match the buffer's feature shape by construction, so past the
        // checks above the insert cannot fail
        let mut filtered = Array3::<f64>::zeros((n_samples, n_channels, self.bands.len()));
        for (b, band) in self.bands.iter().enumerate() {
            let sos = band.sos();
            for (c, state) in self.states[b].iter_mut().enumerate() {
                for (i, &x) in data.column(c).iter().enumerate() {
                    filtered[[i, c, b]] = sos.process_sample(x, state);
                }
            }
        }

        self.ring_buffer.add_samples(filtered.view(), times)?;
        self.pending_new_count += n_samples;
        Ok(())
    }

    /// Post-processed rows filtered since the last `consume`, oldest first,
    /// shaped `(rows, channels, bands)`.
    ///
    /// Up to `lookback_samples` extra rows of history feed the transform and
    /// are trimmed from the result. The pending count is left as is; call
    /// `consume` once the rows have been handled. Fewer rows than pending are
    /// returned when the buffer no longer holds them all.
    pub fn get_data(&self) -> Result<Array3<f64>> {
        let n_new = self.pending_new_count;
        let n_channels = self.channel_names.len();
        if n_new == 0 {
            return Ok(Array3::zeros((0, n_channels, self.bands.len())));
        }

        let n_rows = (n_new + self.lookback).min(self.ring_buffer.capacity());
        let history = self.ring_buffer.latest(n_rows)?.into_dimensionality::<Ix3>()?;
        let out = transforms::apply(self.output_transform, history.view(), self.lookback);

        let n_out = out.len_of(Axis(0));
        if n_out < n_new {
            self.logger.debug(format!(
                "{} rows pending but only {} available after the output transform",
                n_new, n_out
            ));
        }
        let start = n_out.saturating_sub(n_new);
        Ok(out.slice(s![start.., .., ..]).to_owned())
    }

    /// Marks every pending row as read.
    pub fn consume(&mut self) {
        self.pending_new_count = 0;
    }

    pub fn pending_new_count(&self) -> usize {
        self.pending_new_count
    }

    pub fn set_pending_new_count(&mut self, n: usize) {
        self.pending_new_count = n;
    }

    pub fn output_transform(&self) -> OutputTransform {
        self.output_transform
    }

    /// Switches the output transform.
    ///
    /// Fails if the moving average is selected with a zero lookback.
    pub fn set_output_transform(&mut self, transform: OutputTransform) -> Result<()> {
        if transform == OutputTransform::AbsMovingAverage && self.lookback == 0 {
            return Err(Error::InvalidConfig(
                "lookback_samples must be at least 1 for abs_moving_average".to_string(),
            ));
        }
        self.output_transform = transform;
        Ok(())
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Band ids in declaration order, i.e. the order of the band axis.
    pub fn band_ids(&self) -> Vec<&str> {
        self.bands.iter().map(|band| band.id()).collect()
    }

    pub fn bands(&self) -> &[BandPassFilter] {
        &self.bands
    }

    /// Coefficients of the band with the given id.
    pub fn sos(&self, id: &str) -> Option<&SecondOrderSections> {
        self.bands
            .iter()
            .find(|band| band.id() == id)
            .map(|band| band.sos())
    }

    pub fn ring_buffer(&self) -> &RingBuffer<f64> {
        &self.ring_buffer
    }
}
