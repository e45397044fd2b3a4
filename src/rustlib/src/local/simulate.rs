use neurostream::config::{self, Config};
use neurostream::error::Result;
use neurostream::processing::filter_bank::FilterBank;
use neurostream::stream::{ReplayRegistry, StreamInfo, StreamWatcher, ValueType};
use neurostream::utils::log::Logger;

use super::process_file::default_bands;

use colored::{Color, Colorize};
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::Path;
use std::thread;
use std::time::Duration;

const TICK_SECONDS: f64 = 0.05;
const BAR_COLORS: [Color; 6] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
];

/// Multi-channel test signal: a 10 Hz rhythm that waxes and wanes, a weaker
/// 20 Hz rhythm and uniform noise.
pub struct SyntheticSource {
    n_channels: usize,
    fs: f64,
    n_sent: usize,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(n_channels: usize, fs: f64, rng: StdRng) -> Self {
        Self {
            n_channels,
            fs,
            n_sent: 0,
            rng,
        }
    }

    pub fn next_chunk(&mut self, n_samples: usize) -> (Array2<f64>, Vec<f64>) {
        let mut data = Array2::zeros((n_samples, self.n_channels));
        let mut times = Vec::with_capacity(n_samples);

        for i in 0..n_samples {
            let t = (self.n_sent + i) as f64 / self.fs;
            let envelope = 0.5 + 0.5 * (2.0 * PI * 0.25 * t).sin();
            for c in 0..self.n_channels {
                let gain = 1.0 + c as f64 * 0.5;
                data[[i, c]] = gain * envelope * (2.0 * PI * 10.0 * t).sin()
                    + 0.3 * (2.0 * PI * 20.0 * t).sin()
                    + self.rng.gen_range(-0.5..0.5);
            }
            times.push(t);
        }
        self.n_sent += n_samples;
        (data, times)
    }
}

/// Streams a synthetic recording through a `StreamWatcher` into the filter
/// bank and prints the latest band power of the first channel.
pub fn run(config_path: Option<&Path>, seconds: f64) -> Result<()> {
    let mut config = match config_path {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if config.filter_bank.bands.is_empty() {
        config.filter_bank.bands = default_bands();
    }
    if config.stream.name.is_empty() {
        config.stream.name = "simulated_eeg".to_string();
    }
    let logger = Logger::new(&config.logging)?;

    let fs = config.filter_bank.sample_rate_hz;
    let n_channels = config.filter_bank.channel_count;
    let mut registry = ReplayRegistry::new();
    let outlet = registry.create_outlet(
        StreamInfo::new(&config.stream.name, n_channels, fs, ValueType::Float32).with_type("EEG"),
    );

    let mut watcher = StreamWatcher::new(config.stream.clone(), logger.clone());
    watcher.connect(&registry)?;
    let mut bank = FilterBank::new(&config.filter_bank, logger.clone())?;
    let band_ids: Vec<String> = bank.band_ids().into_iter().map(String::from).collect();

    let mut source = SyntheticSource::new(n_channels, fs, StdRng::from_entropy());
    let samples_per_tick = ((fs * TICK_SECONDS) as usize).max(1);
    let n_ticks = (seconds / TICK_SECONDS).ceil() as usize;

    for _ in 0..n_ticks {
        let (chunk, times) = source.next_chunk(samples_per_tick);
        outlet.push_chunk(chunk.view(), &times)?;

        watcher.update()?;
        let samples = watcher.new_samples()?;
        let times = watcher.new_times()?.to_vec();
        watcher.reset_n_new();
        if times.is_empty() {
            continue;
        }

        bank.filter(samples.view(), &times)?;
        let out = bank.get_data()?;
        bank.consume();
        println!("{}", band_bars(&band_ids, &out));

        thread::sleep(Duration::from_secs_f64(TICK_SECONDS));
    }

    watcher.disconnect();
    Ok(())
}

/// One colored bar per band for the newest row of channel 0.
fn band_bars(band_ids: &[String], out: &Array3<f64>) -> String {
    let Some(newest) = out.axis_iter(Axis(0)).last() else {
        return String::new();
    };

    // To ensure |repeat| stays on one line
    let max_len = 40;
    band_ids
        .iter()
        .enumerate()
        .map(|(b, id)| {
            let value = newest[[0, b]];
            let len = ((value * 40.0).max(0.0) as usize).min(max_len);
            let bar = format!("{:>6} {:<width$}", id, "|".repeat(len), width = max_len);
            bar.color(BAR_COLORS[b % BAR_COLORS.len()]).to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
