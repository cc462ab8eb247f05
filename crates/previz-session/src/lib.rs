//! Previz Session - the harness-facing shell around the engine
//!
//! The file watcher, preview GUI, and exporters live outside the
//! engine; this crate is what they talk to. It owns the session state
//! machine (script execution, finalisation, preview), the bounded
//! control queue other threads signal through, engine configuration,
//! and export dispatch.

pub mod config;
pub mod control;
pub mod driver;
pub mod export;
pub mod state;

pub use config::EngineConfig;
pub use control::{ControlMessage, ControlQueue, ControlSender};
pub use driver::SessionDriver;
pub use export::{save, CollectingSink, FrameSink, SaveFormat, SaveOptions, SinkFactory};
pub use state::SessionPhase;
