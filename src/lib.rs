//! Real-time audio engine core for a non-destructive, clip-based digital
//! audio workstation. This crate covers the engine layer only — widget
//! toolkit, window chrome, meters/visualizers, file browser, and preferences
//! UI are out of scope (see the project spec).

pub mod command_queue;
pub mod config;
pub mod device;
pub mod engine;
pub mod engine_state;
pub mod error;
pub mod graph;
pub mod graph_builder;
pub mod interpolators;
pub mod model;
pub mod platform_decoder;
pub mod preview;
pub mod ring_buffer;
pub mod sample_pool;
pub mod smoothing;
pub mod streaming_decoder;
pub mod telemetry;
pub mod wav;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
