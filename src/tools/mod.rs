//! Internal machinery for the encoder
pub mod ring_buffer;
pub mod match_finder;
