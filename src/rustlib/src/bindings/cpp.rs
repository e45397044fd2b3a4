use crate::config::{self, BandpassFilterConfig, FilterBankConfig, OutputTransform};
use crate::error::{Error, Result};
use crate::processing::filter_bank::FilterBank;
use crate::utils::log::Logger;

use ndarray::ArrayView2;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};

// Output transform codes accepted by `create_filter_bank`.
pub const TRANSFORM_IDENTITY: c_int = 0;
pub const TRANSFORM_SQUARE: c_int = 1;
pub const TRANSFORM_ABS_MOVING_AVERAGE: c_int = 2;

pub struct FilterBankFFI {
    bank: FilterBank,
    logger: Logger,
}

impl FilterBankFFI {
    fn report<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.logger.error(e.to_string());
                None
            }
        }
    }
}

fn transform_from_code(code: c_int) -> Option<OutputTransform> {
    match code {
        TRANSFORM_IDENTITY => Some(OutputTransform::Identity),
        TRANSFORM_SQUARE => Some(OutputTransform::Square),
        TRANSFORM_ABS_MOVING_AVERAGE => Some(OutputTransform::AbsMovingAverage),
        _ => None,
    }
}

/// `n_samples * n_channels`, if a slice of that many `f64` can exist.
fn checked_value_count(n_samples: usize, n_channels: usize) -> Option<usize> {
    n_samples
        .checked_mul(n_channels)
        .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<f64>())
}

fn into_handle(bank: FilterBank, logger: Logger) -> *mut c_void {
    Box::into_raw(Box::new(FilterBankFFI { bank, logger })) as *mut c_void
}

/// Creates a filter bank with bands named `band_0..band_{n-1}`.
///
/// Returns null if the configuration is invalid.
///
/// # Safety
///
/// `f_low` and `f_high` must point to `n_bands` readable values each.
#[no_mangle]
pub unsafe extern "C" fn create_filter_bank(
    f_low: *const f64,
    f_high: *const f64,
    n_bands: usize,
    order: usize,
    sample_rate_hz: f64,
    channel_count: usize,
    output_transform: c_int,
    ring_buffer_seconds: f64,
    lookback_samples: usize,
) -> *mut c_void {
    if f_low.is_null() || f_high.is_null() {
        return std::ptr::null_mut();
    }
    let Some(output_transform) = transform_from_code(output_transform) else {
        return std::ptr::null_mut();
    };

    let f_low = std::slice::from_raw_parts(f_low, n_bands);
    let f_high = std::slice::from_raw_parts(f_high, n_bands);
    let config = FilterBankConfig {
        bands: f_low
            .iter()
            .zip(f_high)
            .enumerate()
            .map(|(i, (&lo, &hi))| BandpassFilterConfig::new(&format!("band_{}", i), lo, hi))
            .collect(),
        order,
        sample_rate_hz,
        channel_count,
        output_transform,
        ring_buffer_seconds,
        lookback_samples,
    };

    let logger = Logger::disabled();
    match FilterBank::new(&config, logger.clone()) {
        Ok(bank) => into_handle(bank, logger),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Creates a filter bank from the `filter_bank` section of a YAML config,
/// logging as configured in its `logging` section.
///
/// Returns null if the file cannot be read or the configuration is invalid.
///
/// # Safety
///
/// `config_path` must be a valid nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn create_filter_bank_from_config(config_path: *const c_char) -> *mut c_void {
    if config_path.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(path) = CStr::from_ptr(config_path).to_str() else {
        return std::ptr::null_mut();
    };
    let Ok(config) = config::load_config(path) else {
        return std::ptr::null_mut();
    };

    let logger = Logger::new(&config.logging).unwrap_or_else(|_| Logger::disabled());
    match FilterBank::new(&config.filter_bank, logger.clone()) {
        Ok(bank) => into_handle(bank, logger),
        Err(e) => {
            logger.error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// # Safety
///
/// `bank_ptr` must be null or a handle returned by one of the create
/// functions that has not been deleted yet.
#[no_mangle]
pub unsafe extern "C" fn delete_filter_bank(bank_ptr: *mut c_void) {
    if !bank_ptr.is_null() {
        drop(Box::from_raw(bank_ptr as *mut FilterBankFFI));
    }
}

/// Filters `n_samples` rows of row-major `n_samples x channel_count` data.
///
/// Returns 0 on success and -1 on error.
///
/// # Safety
///
/// `bank_ptr` must be a live handle, `data` must point to
/// `n_samples * channel_count` values and `times` to `n_samples` values.
#[no_mangle]
pub unsafe extern "C" fn filter_bank_filter(
    bank_ptr: *mut c_void,
    data: *const f64,
    times: *const f64,
    n_samples: usize,
) -> c_int {
    if bank_ptr.is_null() || data.is_null() || times.is_null() {
        return -1;
    }
    let handle = &mut *(bank_ptr as *mut FilterBankFFI);
    let n_channels = handle.bank.channel_names().len();
    let Some(n_values) = checked_value_count(n_samples, n_channels) else {
        handle.logger.error(format!(
            "{} samples x {} channels does not fit in memory",
            n_samples, n_channels
        ));
        return -1;
    };

    let data = std::slice::from_raw_parts(data, n_values);
    let times = std::slice::from_raw_parts(times, n_samples);
    let result = ArrayView2::from_shape((n_samples, n_channels), data)
        .map_err(Error::from)
        .and_then(|view| handle.bank.filter(view, times));

    match handle.report(result) {
        Some(()) => 0,
        None => -1,
    }
}

/// Writes the post-processed pending rows as row-major
/// `rows x channels x bands` into `out`.
///
/// Returns the number of rows written, or -1 if `out` is too small or the
/// read failed. The pending count is not reset, see `filter_bank_consume`.
///
/// # Safety
///
/// `bank_ptr` must be a live handle and `out` must point to `out_len`
/// writable values.
#[no_mangle]
pub unsafe extern "C" fn filter_bank_get_data(
    bank_ptr: *mut c_void,
    out: *mut f64,
    out_len: usize,
) -> isize {
    if bank_ptr.is_null() || out.is_null() {
        return -1;
    }
    let handle = &*(bank_ptr as *const FilterBankFFI);
    let Some(data) = handle.report(handle.bank.get_data()) else {
        return -1;
    };
    if data.len() > out_len {
        handle.logger.error(format!(
            "output buffer holds {} values, {} needed",
            out_len,
            data.len()
        ));
        return -1;
    }

    let out = std::slice::from_raw_parts_mut(out, out_len);
    for (dst, &src) in out.iter_mut().zip(data.iter()) {
        *dst = src;
    }
    data.shape()[0] as isize
}

/// # Safety
///
/// `bank_ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn filter_bank_pending(bank_ptr: *const c_void) -> usize {
    if bank_ptr.is_null() {
        return 0;
    }
    (*(bank_ptr as *const FilterBankFFI)).bank.pending_new_count()
}

/// # Safety
///
/// `bank_ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn filter_bank_consume(bank_ptr: *mut c_void) {
    if !bank_ptr.is_null() {
        (*(bank_ptr as *mut FilterBankFFI)).bank.consume();
    }
}
