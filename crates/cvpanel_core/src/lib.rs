//! Control-voltage panel engine
//!
//! This crate provides the core of a headless 16-channel control-voltage
//! panel: modules, polyphonic cables, per-frame processing and JSON patch
//! persistence. It is a pure library with no audio I/O or UI concerns;
//! those belong to whatever embeds it.

pub mod dsp;
pub mod error;
pub mod patch;
pub mod poly;
pub mod types;

// Re-export commonly used items
pub use error::{Error, Result};
pub use patch::Patch;
pub use poly::{MAX_CHANNELS, PolyBus};
pub use types::{
    Module, ModuleSchema, ModuleState, PatchGraph, Sampleable, SampleableConstructor,
    SampleableMap, Signal,
};
