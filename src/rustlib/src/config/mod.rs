// src/rustlib/src/config/mod.rs
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub filter_bank: FilterBankConfig,
    pub stream: StreamWatcherConfig,
}

// LOGGING ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub console: bool,
    pub file: Option<String>,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            file: None,
            directory: "logs".to_string(),
        }
    }
}

// FILTER BANK -----------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BandpassFilterConfig {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(alias = "low_hz")]
    pub f_low: f64,
    #[serde(alias = "high_hz")]
    pub f_high: f64,
}

impl BandpassFilterConfig {
    pub fn new(id: &str, f_low: f64, f_high: f64) -> Self {
        Self {
            id: id.to_string(),
            f_low,
            f_high,
        }
    }
}

/// Post-processing applied by `FilterBank::get_data`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputTransform {
    #[serde(alias = "signal")]
    Identity,
    Square,
    #[serde(alias = "abs_ma")]
    AbsMovingAverage,
}

impl FromStr for OutputTransform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" | "signal" => Ok(OutputTransform::Identity),
            "square" => Ok(OutputTransform::Square),
            "abs_moving_average" | "abs_ma" => Ok(OutputTransform::AbsMovingAverage),
            other => Err(Error::InvalidConfig(format!(
                "unknown output transform '{}', use one of identity, square, abs_moving_average",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilterBankConfig {
    /// Declaration order is the band axis order of the output.
    #[serde(with = "band_map")]
    pub bands: Vec<BandpassFilterConfig>,
    pub order: usize,
    pub sample_rate_hz: f64,
    pub channel_count: usize,
    pub output_transform: OutputTransform,
    pub ring_buffer_seconds: f64,
    /// Only used by `OutputTransform::AbsMovingAverage`.
    pub lookback_samples: usize,
}

impl Default for FilterBankConfig {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            order: 8,
            sample_rate_hz: 1000.0,
            channel_count: 1,
            output_transform: OutputTransform::AbsMovingAverage,
            ring_buffer_seconds: 1.0,
            lookback_samples: 5,
        }
    }
}

/// `bands` is written as an ordered mapping `name: [low_hz, high_hz]`. A list
/// of `{id, f_low, f_high}` entries is read as well.
mod band_map {
    use super::BandpassFilterConfig;

    use serde::de::{self, MapAccess, SeqAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        bands: &[BandpassFilterConfig],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(bands.len()))?;
        for band in bands {
            map.serialize_entry(&band.id, &[band.f_low, band.f_high])?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<BandpassFilterConfig>, D::Error> {
        deserializer.deserialize_any(BandsVisitor)
    }

    struct BandsVisitor;

    impl<'de> Visitor<'de> for BandsVisitor {
        type Value = Vec<BandpassFilterConfig>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of band name to [low_hz, high_hz] or a list of bands")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut bands = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, range)) = map.next_entry::<String, Vec<f64>>()? {
                match range.as_slice() {
                    [f_low, f_high] => bands.push(BandpassFilterConfig::new(&id, *f_low, *f_high)),
                    _ => {
                        return Err(de::Error::custom(format!(
                            "band '{}' needs [low_hz, high_hz], got {} values",
                            id,
                            range.len()
                        )))
                    }
                }
            }
            Ok(bands)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut bands = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(band) = seq.next_element::<BandpassFilterConfig>()? {
                bands.push(band);
            }
            Ok(bands)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }
}

// STREAM WATCHER --------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamWatcherConfig {
    pub name: String,
    pub buffer_seconds: f64,
    /// Maximum number of samples pulled in one go.
    pub max_chunk_samples: usize,
    /// Ring buffer rows used when the producer reports an irregular rate.
    pub irregular_capacity: usize,
}

impl Default for StreamWatcherConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            buffer_seconds: 2.0,
            max_chunk_samples: 1024 * 32,
            irregular_capacity: 1000,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config_str = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&config_str)?)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    fs::write(path, yaml)?;
    Ok(())
}
