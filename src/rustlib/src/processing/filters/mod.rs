pub mod bandpass;
pub mod sos;
