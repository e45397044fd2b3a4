pub mod inlet;
pub mod replay;
pub mod watcher;

pub use inlet::{NumericChunkMut, NumericSample, StreamInfo, StreamInlet, StreamResolver, ValueType};
pub use replay::{ReplayInlet, ReplayOutlet, ReplayRegistry};
pub use watcher::{StreamWatcher, WatcherBuffer};
