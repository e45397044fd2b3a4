use neurostream::config::{BandpassFilterConfig, FilterBankConfig, OutputTransform};
use neurostream::processing::filters::bandpass::butterworth_bandpass;
use neurostream::{FilterBank, Logger};

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

const FS: f64 = 500.0;

fn config(transform: OutputTransform) -> FilterBankConfig {
    FilterBankConfig {
        bands: vec![
            BandpassFilterConfig::new("theta", 4.0, 8.0),
            BandpassFilterConfig::new("beta", 13.0, 30.0),
        ],
        order: 4,
        sample_rate_hz: FS,
        channel_count: 2,
        output_transform: transform,
        ring_buffer_seconds: 4.0,
        lookback_samples: 10,
    }
}

fn recording(n: usize) -> (Array2<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(11);
    let data = Array2::from_shape_fn((n, 2), |(i, c)| {
        let t = i as f64 / FS;
        (2.0 * PI * 6.0 * t).sin() * (c + 1) as f64 + 0.5 * (2.0 * PI * 20.0 * t).sin()
    }) + Array2::from_shape_fn((n, 2), |_| rng.gen_range(-0.1..0.1));
    let times = (0..n).map(|i| i as f64 / FS).collect();
    (data, times)
}

/// Feeds the recording in random chunk sizes and collects every pending row.
fn stream_through(bank: &mut FilterBank, data: &Array2<f64>, times: &[f64], seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut collected = Vec::new();
    let mut start = 0;
    while start < times.len() {
        let end = (start + rng.gen_range(1..60)).min(times.len());
        bank.filter(data.slice(ndarray::s![start..end, ..]), &times[start..end])
            .unwrap();
        let out = bank.get_data().unwrap();
        assert_eq!(out.len_of(Axis(0)), end - start);
        collected.extend(out.iter().copied());
        bank.consume();
        start = end;
    }
    collected
}

#[test]
fn chunked_output_matches_offline_filtering() {
    let (data, times) = recording(1500);
    let mut bank = FilterBank::new(&config(OutputTransform::Identity), Logger::disabled()).unwrap();
    let streamed = stream_through(&mut bank, &data, &times, 5);

    for (b, (lo, hi)) in [(4.0, 8.0), (13.0, 30.0)].into_iter().enumerate() {
        let sos = butterworth_bandpass(4, lo, hi, FS);
        for c in 0..2 {
            let mut state = sos.steady_state();
            let column: Vec<f64> = data.column(c).to_vec();
            let offline = sos.filter_signal(&column, &mut state);
            for (i, &expected) in offline.iter().enumerate() {
                let actual = streamed[(i * 2 + c) * 2 + b];
                assert!(
                    (actual - expected).abs() < 1e-12,
                    "band {} channel {} sample {}: {} vs {}",
                    b,
                    c,
                    i,
                    actual,
                    expected
                );
            }
        }
    }
}

#[test]
fn moving_average_is_aligned_to_the_newest_sample() {
    let (data, times) = recording(1200);
    let mut identity = FilterBank::new(&config(OutputTransform::Identity), Logger::disabled()).unwrap();
    identity.filter(data.view(), &times).unwrap();
    let filtered = identity.get_data().unwrap();

    let mut averaged =
        FilterBank::new(&config(OutputTransform::AbsMovingAverage), Logger::disabled()).unwrap();
    let streamed = stream_through(&mut averaged, &data, &times, 9);

    // rows from the lookback on have a full window of real history
    let w = 10;
    for i in (w - 1)..times.len() {
        for c in 0..2 {
            for b in 0..2 {
                let expected = (i + 1 - w..=i)
                    .map(|k| filtered[[k, c, b]].abs())
                    .sum::<f64>()
                    / w as f64;
                let actual = streamed[(i * 2 + c) * 2 + b];
                assert!((actual - expected).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn band_power_follows_the_input_rhythm() {
    let n = 2000;
    let data = Array2::from_shape_fn((n, 2), |(i, _)| (2.0 * PI * 6.0 * i as f64 / FS).sin());
    let times: Vec<f64> = (0..n).map(|i| i as f64 / FS).collect();

    let mut bank = FilterBank::new(&config(OutputTransform::Square), Logger::disabled()).unwrap();
    bank.filter(data.view(), &times).unwrap();
    let out = bank.get_data().unwrap();

    // mean power over the last second: sin^2 averages to 0.5 in the pass band
    let last = out.slice(ndarray::s![out.len_of(Axis(0)) - 500.., .., ..]);
    let theta = last.index_axis(Axis(2), 0).mean().unwrap();
    let beta = last.index_axis(Axis(2), 1).mean().unwrap();
    assert!((theta - 0.5).abs() < 0.05, "theta power {}", theta);
    assert!(beta < 0.01, "beta power {}", beta);
}
