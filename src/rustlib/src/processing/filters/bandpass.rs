use super::sos::{Biquad, SecondOrderSections, SectionState};
use crate::config::BandpassFilterConfig;
use crate::error::{Error, Result};

use num_complex::Complex64;
use std::f64::consts::PI;

// Sample rate of the normalized design domain (Nyquist == 1).
const FS_DESIGN: f64 = 2.0;

/// Causal Butterworth band-pass filter realized as second-order sections.
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    config: BandpassFilterConfig,
    order: usize,
    fs: f64,
    sos: SecondOrderSections,
}

impl BandPassFilter {
    /// Designs the filter, rejecting cutoffs outside `0 < f_low < f_high < fs / 2`.
    pub fn new(config: BandpassFilterConfig, order: usize, fs: f64) -> Result<Self> {
        validate(&config, order, fs)?;
        let sos = butterworth_bandpass(order, config.f_low, config.f_high, fs);

        Ok(BandPassFilter {
            config,
            order,
            fs,
            sos,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &BandpassFilterConfig {
        &self.config
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sos(&self) -> &SecondOrderSections {
        &self.sos
    }

    /// Initial filter state for one channel.
    pub fn initial_state(&self) -> Vec<SectionState> {
        self.sos.steady_state()
    }

    /// Frequency in Hz at which the pass band gain is exactly one.
    pub fn center_frequency(&self) -> f64 {
        let w_low = prewarp(self.config.f_low, self.fs);
        let w_high = prewarp(self.config.f_high, self.fs);
        let w_center = (w_low * w_high).sqrt();
        self.fs / PI * (w_center / (2.0 * FS_DESIGN)).atan()
    }
}

fn validate(config: &BandpassFilterConfig, order: usize, fs: f64) -> Result<()> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "sample rate must be positive, got {}",
            fs
        )));
    }
    if order == 0 {
        return Err(Error::InvalidConfig(
            "filter order must be at least 1".to_string(),
        ));
    }

    let nyquist = fs / 2.0;
    let invalid = |reason: String| Error::InvalidBand {
        id: config.id.clone(),
        reason,
    };
    if !(config.f_low.is_finite() && config.f_high.is_finite()) {
        return Err(invalid("cutoffs must be finite".to_string()));
    }
    if config.f_low <= 0.0 {
        return Err(invalid(format!(
            "low cutoff {} Hz must be above 0 Hz",
            config.f_low
        )));
    }
    if config.f_low >= config.f_high {
        return Err(invalid(format!(
            "low cutoff {} Hz must be below high cutoff {} Hz",
            config.f_low, config.f_high
        )));
    }
    if config.f_high >= nyquist {
        return Err(invalid(format!(
            "high cutoff {} Hz must be below the Nyquist frequency {} Hz",
            config.f_high, nyquist
        )));
    }
    Ok(())
}

/// Analog frequency in the normalized design domain for `freq` Hz.
fn prewarp(freq: f64, fs: f64) -> f64 {
    let wn = freq / (fs / 2.0);
    2.0 * FS_DESIGN * (PI * wn / FS_DESIGN).tan()
}

/// Digital Butterworth band-pass of the given order as `order` biquads.
///
/// Analog prototype -> band-pass transform -> bilinear transform. Each
/// section carries one zero at z = 1 and one at z = -1 plus a conjugate
/// pole pair; the overall gain sits in the first section and sections are
/// ordered with the poles closest to the unit circle last.
pub fn butterworth_bandpass(order: usize, f_low: f64, f_high: f64, fs: f64) -> SecondOrderSections {
    let w_low = prewarp(f_low, fs);
    let w_high = prewarp(f_high, fs);
    let bandwidth = w_high - w_low;
    let w_center = (w_low * w_high).sqrt();

    // Butterworth prototype poles, left half of the unit circle
    let n = order as f64;
    let mut analog_poles = Vec::with_capacity(2 * order);
    for k in 0..order {
        let m = -(n - 1.0) + 2.0 * k as f64;
        let prototype = -Complex64::from_polar(1.0, PI * m / (2.0 * n));

        // low-pass to band-pass: each prototype pole splits in two
        let shifted = prototype * (bandwidth / 2.0);
        let offset = (shifted * shifted - w_center * w_center).sqrt();
        analog_poles.push(shifted + offset);
        analog_poles.push(shifted - offset);
    }

    // bilinear transform; the `order` analog zeros at s = 0 map to z = 1
    // and the remaining `order` zeros at infinity map to z = -1
    let fs2 = 2.0 * FS_DESIGN;
    let denominator: Complex64 = analog_poles.iter().map(|&p| fs2 - p).product();
    let gain = bandwidth.powi(order as i32) * (fs2.powi(order as i32) / denominator).re;
    let digital_poles = analog_poles.iter().map(|&p| (fs2 + p) / (fs2 - p));

    let tolerance = 1e-10;
    let mut sections: Vec<(f64, Biquad)> = Vec::with_capacity(order);
    let mut real_poles = Vec::new();
    for pole in digital_poles {
        if pole.im > tolerance {
            let a = [1.0, -2.0 * pole.re, pole.norm_sqr()];
            sections.push((pole.norm(), Biquad::new([1.0, 0.0, -1.0], a)));
        } else if pole.im.abs() <= tolerance {
            real_poles.push(pole.re);
        }
    }

    real_poles.sort_by(|a, b| a.total_cmp(b));
    for pair in real_poles.chunks(2) {
        let p1 = pair[0];
        let p2 = pair.get(1).copied().unwrap_or(0.0);
        let a = [1.0, -(p1 + p2), p1 * p2];
        sections.push((p1.abs().max(p2.abs()), Biquad::new([1.0, 0.0, -1.0], a)));
    }

    sections.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut sections: Vec<Biquad> = sections.into_iter().map(|(_, s)| s).collect();
    if let Some(first) = sections.first_mut() {
        for b in first.b.iter_mut() {
            *b *= gain;
        }
    }

    SecondOrderSections::new(sections)
}
