pub mod bindings;
pub mod config;
pub mod error;
pub mod processing;
pub mod stream;
pub mod utils;

pub use config::{load_config, save_config, Config};
pub use error::{Error, Result};
pub use processing::filter_bank::FilterBank;
pub use processing::ring_buffer::RingBuffer;
pub use stream::watcher::StreamWatcher;
pub use utils::log::Logger;
