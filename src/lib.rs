//! mcam - Synchronized photo capture across many adb-connected Android devices.
//!
//! This library exposes the core of the `mcam` binary for use in tests and
//! embedding.
//!
//! # Modules
//!
//! - `bridge`: adb command/file-transfer abstraction, plus a scripted mock
//! - `device`: Discovery, position ordering, and health probes
//! - `machine`: Per-device capture state machine
//! - `session`: Concurrent prime/capture orchestration and the primed cache
//! - `server`: HTTP API
//! - `config`: Configuration file handling
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod bridge;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod image_ops;
pub mod logging;
pub mod machine;
pub mod server;
pub mod session;
