//! aie-ctl library
//!
//! Control core for AMD AI Engine array partitions: tile addressing, core
//! control, clock gating, partition lifecycle, interrupts and performance
//! counters, carried over pluggable register-access backends.

pub mod backend;
pub mod config;
pub mod control;
pub mod device;
pub mod error;

pub use backend::{Backend, BackendKind, BackendOptions, BackendRegistry, PollMode};
pub use device::{DeviceConfig, DeviceGeneration, DeviceInstance, TileLoc, TileType};
pub use error::{Error, Result};
