use neurostream::config::{self, BandpassFilterConfig, Config};
use neurostream::error::{Error, Result};
use neurostream::processing::filter_bank::FilterBank;
use neurostream::utils::log::Logger;

use ndarray::{Array2, Axis};
use std::path::Path;
use std::time::Instant;

/// Bands used when the config does not declare any.
pub fn default_bands() -> Vec<BandpassFilterConfig> {
    vec![
        BandpassFilterConfig::new("theta", 4.0, 8.0),
        BandpassFilterConfig::new("alpha", 8.0, 12.0),
        BandpassFilterConfig::new("beta", 12.0, 30.0),
        BandpassFilterConfig::new("gamma", 30.0, 80.0),
    ]
}

/// Replays a CSV recording through the filter bank and writes the
/// post-processed output.
///
/// The input has one header row and one column per channel; the sample rate
/// comes from the config. Each output row holds the sample time followed by
/// one column per `(channel, band)` pair.
pub fn run(signal_path: &Path, config_path: Option<&Path>, output_path: &Path) -> Result<()> {
    let mut config = match config_path {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if config.filter_bank.bands.is_empty() {
        config.filter_bank.bands = default_bands();
    }
    let logger = Logger::new(&config.logging)?.named("process_file");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(signal_path)?;
    let channel_names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if channel_names.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "{} has no channel columns",
            signal_path.display()
        )));
    }
    config.filter_bank.channel_count = channel_names.len();

    let fs = config.filter_bank.sample_rate_hz;
    let chunk_size = ((fs / 10.0) as usize).max(1);
    let mut bank = FilterBank::new(&config.filter_bank, logger.clone())?;

    let mut writer = csv::Writer::from_path(output_path)?;
    let mut header = vec!["time".to_string()];
    for ch in &channel_names {
        for band in bank.band_ids() {
            header.push(format!("{}_{}", ch, band));
        }
    }
    writer.write_record(&header)?;

    let mut chunk: Vec<f64> = Vec::with_capacity(chunk_size * channel_names.len());
    let mut times: Vec<f64> = Vec::with_capacity(chunk_size);
    let mut n_samples = 0usize;
    let mut chunk_count = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        for field in record.iter() {
            let value = field.parse::<f64>().unwrap_or_else(|_| {
                logger.warning(format!("Unparsable value {:?} on line {}, using 0", field, line + 2));
                0.0
            });
            chunk.push(value);
        }
        times.push(n_samples as f64 / fs);
        n_samples += 1;

        if times.len() == chunk_size {
            chunk_count += 1;
            let start_time = Instant::now();
            process_chunk(&mut bank, &mut chunk, &mut times, &mut writer)?;
            logger.debug(format!(
                "Processed chunk {} in {:?} - index: {}",
                chunk_count,
                start_time.elapsed(),
                n_samples
            ));
        }
    }
    if !times.is_empty() {
        process_chunk(&mut bank, &mut chunk, &mut times, &mut writer)?;
    }
    writer.flush()?;

    logger.info(format!(
        "Filtered {} samples x {} channels into {}",
        n_samples,
        channel_names.len(),
        output_path.display()
    ));
    Ok(())
}

fn process_chunk<W: std::io::Write>(
    bank: &mut FilterBank,
    chunk: &mut Vec<f64>,
    times: &mut Vec<f64>,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let n_rows = times.len();
    let data = Array2::from_shape_vec((n_rows, chunk.len() / n_rows.max(1)), std::mem::take(chunk))?;
    bank.filter(data.view(), times)?;
    let out = bank.get_data()?;
    bank.consume();

    // rows dropped by the transform are the oldest of the chunk
    let offset = n_rows - out.len_of(Axis(0));
    for (row, t) in out.axis_iter(Axis(0)).zip(&times[offset..]) {
        let mut record = vec![t.to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    times.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn filters_csv_recording() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("signal.csv");
        let output = dir.path().join("filtered.csv");

        let signal = Array2::from_shape_fn((250, 2), |(i, c)| {
            let v = (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 1000.0).sin();
            (c + 1) as f64 * v
        });
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "Fz, Cz").unwrap();
        for row in signal.rows() {
            writeln!(file, "{}, {}", row[0], row[1]).unwrap();
        }
        drop(file);

        let config_path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.logging.console = false;
        config.filter_bank.bands = vec![BandpassFilterConfig::new("alpha", 8.0, 12.0)];
        config.filter_bank.output_transform = neurostream::config::OutputTransform::Identity;
        config::save_config(&config, &config_path).unwrap();

        run(&input, Some(&config_path), &output).unwrap();

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["time", "Fz_alpha", "Cz_alpha"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 250);

        // same result as filtering the whole recording at once
        let times: Vec<f64> = (0..250).map(|i| i as f64 / 1000.0).collect();
        let mut fb_config = config.filter_bank.clone();
        fb_config.channel_count = 2;
        let mut bank = FilterBank::new(&fb_config, Logger::disabled()).unwrap();
        bank.filter(signal.view(), &times).unwrap();
        let expected = bank.get_data().unwrap();

        for (i, row) in rows.iter().enumerate() {
            let t: f64 = row[0].parse().unwrap();
            let fz: f64 = row[1].parse().unwrap();
            let cz: f64 = row[2].parse().unwrap();
            assert_eq!(t, times[i]);
            assert_eq!(fz, expected[[i, 0, 0]]);
            assert_eq!(cz, expected[[i, 1, 0]]);
        }
    }
}
