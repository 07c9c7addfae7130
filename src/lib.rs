//! aos-replica
//!
//! A continuously synchronized local replica of a sequenced AO process:
//!
//! - **Bootstrap**: from scratch, a pinned or discovered checkpoint, or the live state service
//! - **Replay**: ordered catch-up and periodic polling of the sequencer log
//! - **Dry runs**: speculative execution against an isolated snapshot
//!
//! The engine lives in [`replica_core`]; this crate carries the command line
//! options, logging setup and the wiring of real HTTP transports.

pub mod args;
pub mod logging;
pub mod runtime;

pub use replica_core;
pub use replica_types;
