pub mod filter_bank;
pub mod filters;
pub mod ring_buffer;
pub mod transforms;
