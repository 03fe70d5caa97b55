//! hub-core - Core types and traits for the research hub
//!
//! This crate provides the domain types, the remote-service boundary,
//! configuration, and error handling shared by every other hub crate.

pub mod codec;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use codec::{decode_file_path, encode_file_path, normalize_path, normalize_paths};
pub use config::*;
pub use error::{HubError, Result};
pub use traits::*;
pub use types::*;
