//! # procq application library
//!
//! Library surface of the procq binary: the HTTP API, the CLI, the
//! configuration loader, the evaluation engine seam, and the live
//! evaluation scheduler. The pure graph logic lives in `procq-core`;
//! everything async or network-aware lives here.

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod scheduler;
