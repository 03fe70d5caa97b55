//! hub-http - Notebook service backends
//!
//! `HttpBackend` speaks the notebook service's JSON API over reqwest.
//! `MemoryBackend` emulates the same service in-process for tests and
//! offline use.

pub mod client;
pub mod memory;
pub mod wire;

pub use client::HttpBackend;
pub use memory::{Call, Gate, MemoryBackend, Op};
