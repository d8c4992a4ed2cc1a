//! Configuration management for babble.
//!
//! Loads and saves application configuration from a TOML file in the user's
//! config directory.

pub mod file;

pub use file::{AudioConfig, BabbleConfig, RecorderConfig, WaveformMode};
